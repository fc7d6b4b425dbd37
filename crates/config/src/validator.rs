use crate::*;
use regex::Regex;
use std::collections::HashSet;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Bridge name is required")]
    MissingBridgeName,

    #[error("Invalid version format: {0}. Must be in format X.Y.Z (e.g., 1.0.0)")]
    InvalidVersionFormat(String),

    #[error("Invalid store type: {0}. Must be one of: redis, memory")]
    InvalidStoreType(String),

    #[error("Store: {message}")]
    InvalidStore { message: String },

    #[error("Instrument '{field}': symbol is required")]
    MissingInstrumentSymbol { field: String },

    #[error("Index and currency futures must be distinct, both are '{0}'")]
    DuplicateInstrument(String),

    #[error("Blue-chip basket is empty")]
    EmptyBlueChips,

    #[error("Duplicate symbol '{symbol}' in {list}")]
    DuplicateSymbol { list: String, symbol: String },

    #[error("Source target '{name}': {message}")]
    InvalidSourceTarget { name: String, message: String },

    #[error("Schedule '{name}': {message}")]
    InvalidSchedule { name: String, message: String },

    #[error("Invalid trading day '{0}'. Use mon, tue, wed, thu, fri, sat or sun")]
    InvalidTradingDay(String),

    #[error("At least one trading day must be configured")]
    NoTradingDays,

    #[error("Invalid time format '{time}': {message}")]
    InvalidTimeFormat { time: String, message: String },

    #[error("Session open {open} must be before close {close}")]
    InvalidSessionWindow { open: String, close: String },

    #[error("utc_offset_hours must be between -12 and 14, got: {0}")]
    InvalidUtcOffset(i32),

    #[error("{field} must be a positive integer")]
    InvalidPositiveInteger { field: String },

    #[error("Invalid log format: {0}. Must be one of: pretty, json, compact")]
    InvalidLogFormat(String),

    #[error("Environment variable placeholder left unresolved in '{field}'")]
    UnresolvedEnvVar { field: String },
}

#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct ValidationReport {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self {
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, field: &str, message: &str) {
        self.warnings.push(ValidationWarning {
            field: field.to_string(),
            message: message.to_string(),
        });
    }
}

impl Default for ValidationReport {
    fn default() -> Self {
        Self::new()
    }
}

pub fn validate_config(config: &BridgeConfig) -> ValidationReport {
    let mut report = ValidationReport::new();

    validate_bridge(&config.bridge, &mut report);
    validate_store(&config.store, &mut report);
    validate_instruments(&config.instruments, &mut report);
    validate_sources(&config.sources, &config.instruments, &mut report);
    validate_feed(&config.feed, &mut report);
    validate_flow(&config.flow, &mut report);
    validate_schedule(&config.schedule, &mut report);
    validate_session(&config.session, &mut report);
    validate_scoring(&config.scoring, &mut report);
    validate_monitoring(&config.monitoring, &mut report);

    report
}

fn validate_bridge(bridge: &BridgeInfo, report: &mut ValidationReport) {
    if bridge.name.trim().is_empty() {
        report.add_error(ValidationError::MissingBridgeName);
    }

    let version_ok = Regex::new(r"^\d+\.\d+\.\d+$")
        .map(|re| re.is_match(&bridge.version))
        .unwrap_or(false);
    if !version_ok {
        report.add_error(ValidationError::InvalidVersionFormat(bridge.version.clone()));
    }
}

fn validate_store(store: &StoreConfig, report: &mut ValidationReport) {
    match store.store_type.as_str() {
        "redis" => match &store.redis {
            None => report.add_error(ValidationError::InvalidStore {
                message: "redis section is required when type is redis".to_string(),
            }),
            Some(redis) => {
                if redis.host.trim().is_empty() {
                    report.add_error(ValidationError::InvalidStore {
                        message: "redis.host is required".to_string(),
                    });
                }
                if has_unresolved_env_vars(&redis.host) {
                    report.add_error(ValidationError::UnresolvedEnvVar {
                        field: "store.redis.host".to_string(),
                    });
                }
                if has_unresolved_env_vars(&redis.password) {
                    report.add_error(ValidationError::UnresolvedEnvVar {
                        field: "store.redis.password".to_string(),
                    });
                }
            }
        },
        "memory" => {
            report.add_warning(
                "store.type",
                "In-memory store selected, snapshots are not visible to other processes",
            );
        }
        other => report.add_error(ValidationError::InvalidStoreType(other.to_string())),
    }

    if store.snapshot_key.trim().is_empty() {
        report.add_error(ValidationError::InvalidStore {
            message: "snapshot_key is required".to_string(),
        });
    }
}

fn validate_instruments(instruments: &InstrumentsConfig, report: &mut ValidationReport) {
    for (field, symbol) in [
        ("index_future", &instruments.index_future),
        ("currency_future", &instruments.currency_future),
        ("spot_index", &instruments.spot_index),
    ] {
        if symbol.trim().is_empty() {
            report.add_error(ValidationError::MissingInstrumentSymbol {
                field: field.to_string(),
            });
        }
    }

    if !instruments.index_future.is_empty()
        && instruments.index_future == instruments.currency_future
    {
        report.add_error(ValidationError::DuplicateInstrument(
            instruments.index_future.clone(),
        ));
    }

    if instruments.blue_chips.is_empty() {
        report.add_error(ValidationError::EmptyBlueChips);
    }

    check_duplicates("instruments.blue_chips", &instruments.blue_chips, report);
    check_duplicates(
        "instruments.realtime_symbols",
        &instruments.realtime_symbols,
        report,
    );

    for symbol in [&instruments.index_future, &instruments.currency_future] {
        if !symbol.is_empty() && !instruments.realtime_symbols.contains(symbol) {
            report.add_warning(
                "instruments.realtime_symbols",
                &format!("{} is not read from the realtime feed, its score will use zero prices", symbol),
            );
        }
    }
}

fn check_duplicates(list: &str, symbols: &[String], report: &mut ValidationReport) {
    let mut seen = HashSet::new();
    for symbol in symbols {
        if !seen.insert(symbol.as_str()) {
            report.add_error(ValidationError::DuplicateSymbol {
                list: list.to_string(),
                symbol: symbol.clone(),
            });
        }
    }
}

fn validate_sources(
    sources: &SourcesConfig,
    instruments: &InstrumentsConfig,
    report: &mut ValidationReport,
) {
    if sources.macro_targets.is_empty() {
        report.add_warning(
            "sources.macro_targets",
            "No macro targets configured, macro correlation will stay neutral",
        );
    }

    let all_targets = sources
        .macro_targets
        .iter()
        .chain(sources.global_targets.iter())
        .chain(sources.fallback_locators.iter());

    for (name, locator) in all_targets {
        if let Err(e) = url::Url::parse(locator) {
            report.add_error(ValidationError::InvalidSourceTarget {
                name: name.clone(),
                message: format!("invalid locator '{}': {}", locator, e),
            });
        }
    }

    if let Err(e) = url::Url::parse(&sources.calendar.url) {
        report.add_error(ValidationError::InvalidSourceTarget {
            name: "calendar".to_string(),
            message: format!("invalid url '{}': {}", sources.calendar.url, e),
        });
    }

    if sources.calendar.min_impact == 0 || sources.calendar.min_impact > 3 {
        report.add_error(ValidationError::InvalidSourceTarget {
            name: "calendar".to_string(),
            message: format!("min_impact must be between 1 and 3, got {}", sources.calendar.min_impact),
        });
    }

    if sources.request_timeout_seconds == 0 {
        report.add_error(ValidationError::InvalidPositiveInteger {
            field: "sources.request_timeout_seconds".to_string(),
        });
    }

    for symbol in &instruments.blue_chips {
        if !sources.fallback_locators.contains_key(symbol) {
            report.add_warning(
                "sources.fallback_locators",
                &format!("No fallback locator for blue chip {}", symbol),
            );
        }
    }
}

fn validate_feed(feed: &FeedConfig, report: &mut ValidationReport) {
    if feed.history_count == 0 {
        report.add_error(ValidationError::InvalidPositiveInteger {
            field: "feed.history_count".to_string(),
        });
    }

    if !feed.history_timeframes.iter().any(|tf| tf == "D1") {
        report.add_warning(
            "feed.history_timeframes",
            "D1 is not collected, volume reference and volatility regime stay empty",
        );
    }
}

fn validate_flow(flow: &FlowConfig, report: &mut ValidationReport) {
    if flow.retry_attempts == 0 {
        report.add_error(ValidationError::InvalidPositiveInteger {
            field: "flow.retry_attempts".to_string(),
        });
    }
}

fn validate_schedule(schedule: &ScheduleConfig, report: &mut ValidationReport) {
    for (name, loop_schedule) in [
        ("macro", &schedule.macro_loop),
        ("calendar", &schedule.calendar),
        ("global", &schedule.global),
        ("history", &schedule.history),
    ] {
        if loop_schedule.interval_seconds == 0 {
            report.add_error(ValidationError::InvalidSchedule {
                name: name.to_string(),
                message: "interval_seconds must be positive".to_string(),
            });
        }
        if loop_schedule.jitter_min_seconds > loop_schedule.jitter_max_seconds {
            report.add_error(ValidationError::InvalidSchedule {
                name: name.to_string(),
                message: format!(
                    "jitter_min_seconds ({}) exceeds jitter_max_seconds ({})",
                    loop_schedule.jitter_min_seconds, loop_schedule.jitter_max_seconds
                ),
            });
        }
    }

    if schedule.primary_interval_ms == 0 {
        report.add_error(ValidationError::InvalidPositiveInteger {
            field: "schedule.primary_interval_ms".to_string(),
        });
    }

    if schedule.error_backoff_ms == 0 {
        report.add_error(ValidationError::InvalidPositiveInteger {
            field: "schedule.error_backoff_ms".to_string(),
        });
    }
}

fn validate_session(session: &SessionConfig, report: &mut ValidationReport) {
    if !(-12..=14).contains(&session.utc_offset_hours) {
        report.add_error(ValidationError::InvalidUtcOffset(session.utc_offset_hours));
    }

    if session.trading_days.is_empty() {
        report.add_error(ValidationError::NoTradingDays);
    }
    if let Err(e) = session.parsed_trading_days() {
        report.add_error(e);
    }

    match (session.parsed_open(), session.parsed_close()) {
        (Ok(open), Ok(close)) => {
            if open >= close {
                report.add_error(ValidationError::InvalidSessionWindow {
                    open: session.open.clone(),
                    close: session.close.clone(),
                });
            }
        }
        (open, close) => {
            if let Err(e) = open {
                report.add_error(e);
            }
            if let Err(e) = close {
                report.add_error(e);
            }
        }
    }
}

fn validate_scoring(scoring: &ScoringConfig, report: &mut ValidationReport) {
    if scoring.volume_lookback == 0 {
        report.add_error(ValidationError::InvalidPositiveInteger {
            field: "scoring.volume_lookback".to_string(),
        });
    }
}

fn validate_monitoring(monitoring: &MonitoringConfig, report: &mut ValidationReport) {
    let valid_formats = ["pretty", "json", "compact"];
    if !valid_formats.contains(&monitoring.log_format.to_lowercase().as_str()) {
        report.add_error(ValidationError::InvalidLogFormat(monitoring.log_format.clone()));
    }
}
