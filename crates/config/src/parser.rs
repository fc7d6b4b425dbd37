use crate::*;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing::{debug, info, instrument};

#[instrument(skip(path))]
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<BridgeConfig> {
    let path = path.as_ref();
    info!("Loading configuration from: {:?}", path);

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    debug!("Config file content length: {} bytes", content.len());
    parse_config(&content)
}

/// Parse configuration text after environment substitution.
pub fn parse_config(content: &str) -> Result<BridgeConfig> {
    let substituted = substitution::substitute_env_vars(content)?;
    debug!("Environment variable substitution completed");

    let config: BridgeConfig = serde_yaml::from_str(&substituted)
        .with_context(|| "Failed to parse YAML configuration")?;

    info!("Configuration loaded successfully");
    Ok(config)
}

fn targets(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
    entries
        .iter()
        .map(|(name, url)| (name.to_string(), url.to_string()))
        .collect()
}

#[instrument]
pub fn generate_default_config() -> BridgeConfig {
    let blue_chips: Vec<String> = [
        "VALE3", "PETR4", "ITUB4", "BBDC4", "BBAS3", "WEGE3", "SBSP3", "RENT3", "LREN3", "B3SA3",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    BridgeConfig {
        bridge: BridgeInfo {
            name: "Market Bridge".to_string(),
            description: "Index and currency futures aggregation bridge".to_string(),
            version: "1.0.0".to_string(),
        },
        store: StoreConfig::default(),
        instruments: InstrumentsConfig {
            index_future: "WIN$N".to_string(),
            currency_future: "WDO$N".to_string(),
            spot_index: "IBOV".to_string(),
            realtime_symbols: ["DI1F27", "DI1F29", "DI1F31", "WIN$N", "WDO$N", "IBOV"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            blue_chips,
        },
        sources: SourcesConfig {
            macro_targets: targets(&[
                ("SP500", "https://br.investing.com/indices/us-spx-500"),
                ("NASDAQ", "https://br.investing.com/indices/nq-100-futures"),
                ("DXY", "https://br.investing.com/indices/usdollar"),
                ("DOW_JONES", "https://br.investing.com/indices/us-30"),
                ("DAX40", "https://br.investing.com/indices/germany-30"),
                ("US10Y", "https://br.investing.com/rates-bonds/u.s.-10-year-bond-yield"),
                ("EWZ", "https://br.investing.com/etfs/ishares-brazil-index"),
                ("BRENT", "https://br.investing.com/commodities/brent-oil"),
                ("OURO", "https://br.investing.com/commodities/gold"),
                ("MINERIO_FERRO", "https://br.investing.com/commodities/iron-ore-62-cfr-futures"),
                ("CUPOM_LIMPO", "https://br.investing.com/rates-bonds/brazil-10-year-bond-yield"),
                ("PTAX", "https://economia.awesomeapi.com.br/json/last/USD-BRL"),
            ]),
            global_targets: targets(&[
                ("VIX", "https://www.investing.com/indices/volatility-s-p-500"),
                ("GOLD", "https://www.investing.com/commodities/gold"),
                ("NASDAQ100", "https://www.investing.com/indices/nq-100"),
            ]),
            fallback_locators: targets(&[
                ("VALE3", "https://br.investing.com/equities/vale-on"),
                ("PETR4", "https://br.investing.com/equities/petrobras-pn"),
                ("ITUB4", "https://br.investing.com/equities/itauunibanco-pn"),
                ("BBDC4", "https://br.investing.com/equities/bradesco-pn"),
                ("BBAS3", "https://br.investing.com/equities/banco-do-brasil-on"),
                ("WEGE3", "https://br.investing.com/equities/weg-on"),
                ("SBSP3", "https://br.investing.com/equities/sabesp-on"),
                ("RENT3", "https://br.investing.com/equities/localiza-rent-a-car-sa-on"),
                ("LREN3", "https://br.investing.com/equities/lojas-renner-on"),
            ]),
            calendar: CalendarSourceConfig::default(),
            request_timeout_seconds: default_request_timeout_seconds(),
        },
        feed: FeedConfig::default(),
        flow: FlowConfig::default(),
        schedule: ScheduleConfig::default(),
        session: SessionConfig::default(),
        scoring: ScoringConfig::default(),
        monitoring: MonitoringConfig::default(),
    }
}

#[instrument(skip(config))]
pub fn save_config<P: AsRef<Path> + std::fmt::Debug>(config: &BridgeConfig, path: P) -> Result<()> {
    let path = path.as_ref();
    info!("Saving configuration to: {:?}", path);

    let yaml = serde_yaml::to_string(config)
        .with_context(|| "Failed to serialize configuration to YAML")?;

    fs::write(path, yaml).with_context(|| format!("Failed to write config file: {:?}", path))?;

    info!("Configuration saved successfully");
    Ok(())
}
