use super::LoopScheduleConfig;

pub fn default_store_type() -> String {
    "redis".to_string()
}

pub fn default_snapshot_key() -> String {
    "market_data".to_string()
}

pub fn default_redis_host() -> String {
    "localhost".to_string()
}

pub fn default_redis_port() -> u16 {
    6379
}

pub fn default_request_timeout_seconds() -> u64 {
    15
}

pub fn default_calendar_url() -> String {
    "https://br.investing.com/economic-calendar/".to_string()
}

pub fn default_calendar_currencies() -> Vec<String> {
    vec!["USD".to_string(), "BRL".to_string()]
}

pub fn default_calendar_min_impact() -> u8 {
    2
}

pub fn default_quotes_path() -> String {
    "data/feed/quotes.json".to_string()
}

pub fn default_history_dir() -> String {
    "data/feed/history".to_string()
}

pub fn default_history_count() -> usize {
    100
}

pub fn default_history_timeframes() -> Vec<String> {
    vec!["D1".to_string(), "H1".to_string()]
}

pub fn default_flow_directory() -> String {
    "data/flow".to_string()
}

pub fn default_flow_file_prefix() -> String {
    "flow_data_".to_string()
}

pub fn default_flow_retry_attempts() -> u32 {
    3
}

pub fn default_flow_retry_backoff_ms() -> u64 {
    100
}

pub fn default_macro_schedule() -> LoopScheduleConfig {
    LoopScheduleConfig::new(300, 10, 30)
}

pub fn default_calendar_schedule() -> LoopScheduleConfig {
    LoopScheduleConfig::new(60, 5, 15)
}

pub fn default_global_schedule() -> LoopScheduleConfig {
    LoopScheduleConfig::new(120, 10, 30)
}

pub fn default_history_schedule() -> LoopScheduleConfig {
    LoopScheduleConfig::new(300, 0, 0)
}

pub fn default_primary_interval_ms() -> u64 {
    1_000
}

pub fn default_error_backoff_ms() -> u64 {
    1_000
}

pub fn default_utc_offset_hours() -> i32 {
    -3
}

pub fn default_trading_days() -> Vec<String> {
    ["mon", "tue", "wed", "thu", "fri"]
        .iter()
        .map(|d| d.to_string())
        .collect()
}

pub fn default_session_open() -> String {
    "09:00".to_string()
}

pub fn default_session_close() -> String {
    "18:00".to_string()
}

pub fn default_dollar_proxy() -> String {
    "DXY".to_string()
}

pub fn default_local_rates() -> String {
    "CUPOM_LIMPO".to_string()
}

pub fn default_volume_lookback() -> usize {
    20
}

pub fn default_log_format() -> String {
    "pretty".to_string()
}
