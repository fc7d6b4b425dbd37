use chrono::{NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub mod defaults;
pub mod parser;
pub mod substitution;
pub mod validator;

pub use defaults::*;
pub use parser::*;
pub use substitution::*;
pub use validator::*;

/// Root of the bridge configuration file.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BridgeConfig {
    pub bridge: BridgeInfo,
    #[serde(default)]
    pub store: StoreConfig,
    pub instruments: InstrumentsConfig,
    #[serde(default)]
    pub sources: SourcesConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub flow: FlowConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BridgeInfo {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub version: String,
}

/// Where the aggregated snapshot is published.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    /// `redis` or `memory`
    #[serde(rename = "type")]
    #[serde(default = "default_store_type")]
    pub store_type: String,
    #[serde(default)]
    pub redis: Option<RedisConfig>,
    #[serde(default = "default_snapshot_key")]
    pub snapshot_key: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            store_type: default_store_type(),
            redis: Some(RedisConfig::default()),
            snapshot_key: default_snapshot_key(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RedisConfig {
    pub host: String,
    #[serde(default = "default_redis_port")]
    pub port: u16,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub db_index: u8,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: default_redis_host(),
            port: default_redis_port(),
            password: String::new(),
            db_index: 0,
        }
    }
}

/// The two scored futures plus the symbols read from the realtime feed.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InstrumentsConfig {
    pub index_future: String,
    pub currency_future: String,
    pub spot_index: String,
    /// Symbols read from the feed on every primary cycle (futures, rates, spot)
    #[serde(default)]
    pub realtime_symbols: Vec<String>,
    /// Fixed blue-chip basket used for breadth and missing-symbol detection
    pub blue_chips: Vec<String>,
}

/// WebSource targets. Keys are target names, values are locators (URLs).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourcesConfig {
    #[serde(default)]
    pub macro_targets: BTreeMap<String, String>,
    #[serde(default)]
    pub global_targets: BTreeMap<String, String>,
    /// Blue-chip symbol -> locator used when the realtime feed misses it
    #[serde(default)]
    pub fallback_locators: BTreeMap<String, String>,
    #[serde(default)]
    pub calendar: CalendarSourceConfig,
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            macro_targets: BTreeMap::new(),
            global_targets: BTreeMap::new(),
            fallback_locators: BTreeMap::new(),
            calendar: CalendarSourceConfig::default(),
            request_timeout_seconds: default_request_timeout_seconds(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CalendarSourceConfig {
    pub url: String,
    #[serde(default = "default_calendar_currencies")]
    pub currencies: Vec<String>,
    #[serde(default = "default_calendar_min_impact")]
    pub min_impact: u8,
}

impl Default for CalendarSourceConfig {
    fn default() -> Self {
        Self {
            url: default_calendar_url(),
            currencies: default_calendar_currencies(),
            min_impact: default_calendar_min_impact(),
        }
    }
}

/// File-backed realtime feed written by the terminal-side exporter.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FeedConfig {
    pub quotes_path: String,
    pub history_dir: String,
    #[serde(default = "default_history_count")]
    pub history_count: usize,
    #[serde(default = "default_history_timeframes")]
    pub history_timeframes: Vec<String>,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            quotes_path: default_quotes_path(),
            history_dir: default_history_dir(),
            history_count: default_history_count(),
            history_timeframes: default_history_timeframes(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FlowConfig {
    pub directory: String,
    #[serde(default = "default_flow_file_prefix")]
    pub file_prefix: String,
    #[serde(default = "default_flow_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_flow_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            directory: default_flow_directory(),
            file_prefix: default_flow_file_prefix(),
            retry_attempts: default_flow_retry_attempts(),
            retry_backoff_ms: default_flow_retry_backoff_ms(),
        }
    }
}

/// Cadence of a jittered collection loop.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub struct LoopScheduleConfig {
    pub interval_seconds: u64,
    #[serde(default)]
    pub jitter_min_seconds: u64,
    #[serde(default)]
    pub jitter_max_seconds: u64,
}

impl LoopScheduleConfig {
    pub fn new(interval_seconds: u64, jitter_min_seconds: u64, jitter_max_seconds: u64) -> Self {
        Self {
            interval_seconds,
            jitter_min_seconds,
            jitter_max_seconds,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScheduleConfig {
    #[serde(rename = "macro", default = "default_macro_schedule")]
    pub macro_loop: LoopScheduleConfig,
    #[serde(default = "default_calendar_schedule")]
    pub calendar: LoopScheduleConfig,
    #[serde(default = "default_global_schedule")]
    pub global: LoopScheduleConfig,
    #[serde(default = "default_history_schedule")]
    pub history: LoopScheduleConfig,
    #[serde(default = "default_primary_interval_ms")]
    pub primary_interval_ms: u64,
    /// Delay before a loop retries after a failed iteration
    #[serde(default = "default_error_backoff_ms")]
    pub error_backoff_ms: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            macro_loop: default_macro_schedule(),
            calendar: default_calendar_schedule(),
            global: default_global_schedule(),
            history: default_history_schedule(),
            primary_interval_ms: default_primary_interval_ms(),
            error_backoff_ms: default_error_backoff_ms(),
        }
    }
}

/// Local exchange session used by the scorer's market-hours gate.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionConfig {
    #[serde(default = "default_utc_offset_hours")]
    pub utc_offset_hours: i32,
    #[serde(default = "default_trading_days")]
    pub trading_days: Vec<String>,
    /// "HH:MM", inclusive
    #[serde(default = "default_session_open")]
    pub open: String,
    /// "HH:MM", exclusive
    #[serde(default = "default_session_close")]
    pub close: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            utc_offset_hours: default_utc_offset_hours(),
            trading_days: default_trading_days(),
            open: default_session_open(),
            close: default_session_close(),
        }
    }
}

impl SessionConfig {
    pub fn parsed_trading_days(&self) -> Result<Vec<Weekday>, ValidationError> {
        self.trading_days
            .iter()
            .map(|day| {
                day.parse::<Weekday>()
                    .map_err(|_| ValidationError::InvalidTradingDay(day.clone()))
            })
            .collect()
    }

    pub fn parsed_open(&self) -> Result<NaiveTime, ValidationError> {
        parse_session_time(&self.open)
    }

    pub fn parsed_close(&self) -> Result<NaiveTime, ValidationError> {
        parse_session_time(&self.close)
    }
}

fn parse_session_time(value: &str) -> Result<NaiveTime, ValidationError> {
    NaiveTime::parse_from_str(value, "%H:%M").map_err(|e| ValidationError::InvalidTimeFormat {
        time: value.to_string(),
        message: e.to_string(),
    })
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScoringConfig {
    /// Macro target used as the global dollar proxy
    #[serde(default = "default_dollar_proxy")]
    pub dollar_proxy: String,
    /// Macro target tracking local interest rates
    #[serde(default = "default_local_rates")]
    pub local_rates: String,
    /// Number of D1 candles averaged into the flow volume reference
    #[serde(default = "default_volume_lookback")]
    pub volume_lookback: usize,
    /// Optional JSON file with pre-computed scores from the spreadsheet bridge
    #[serde(default)]
    pub external_scores_path: Option<String>,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            dollar_proxy: default_dollar_proxy(),
            local_rates: default_local_rates(),
            volume_lookback: default_volume_lookback(),
            external_scores_path: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MonitoringConfig {
    /// pretty, json or compact
    #[serde(default = "default_log_format")]
    pub log_format: String,
    #[serde(default)]
    pub metrics_port: Option<u16>,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            log_format: default_log_format(),
            metrics_port: None,
        }
    }
}
