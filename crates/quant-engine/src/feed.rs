//! Realtime feed capability and the file-backed adapter.
//!
//! The terminal-side exporter writes a quote document and per-symbol history
//! files; [`FileRealtimeFeed`] reads them. All calls block and are dispatched
//! from async code through `spawn_blocking`.

use crate::error::SourceError;
use crate::types::{Candle, Quote};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub trait RealtimeFeed: Send + Sync {
    /// Current quote for one symbol, `None` when the feed does not carry it.
    fn quote(&self, symbol: &str) -> Result<Option<Quote>, SourceError>;

    /// Up to `count` most recent candles for `symbol` on `timeframe`.
    fn history(&self, symbol: &str, timeframe: &str, count: usize) -> Result<Vec<Candle>, SourceError>;

    /// Quotes for many symbols. A failing symbol is skipped, not fatal.
    fn snapshot(&self, symbols: &[String]) -> Result<BTreeMap<String, Quote>, SourceError> {
        let mut quotes = BTreeMap::new();
        for symbol in symbols {
            match self.quote(symbol) {
                Ok(Some(quote)) => {
                    quotes.insert(symbol.clone(), quote);
                }
                Ok(None) => debug!(%symbol, "Symbol not carried by feed"),
                Err(e) => warn!(%symbol, error = %e, "Quote lookup failed"),
            }
        }
        Ok(quotes)
    }
}

pub struct FileRealtimeFeed {
    quotes_path: PathBuf,
    history_dir: PathBuf,
}

impl FileRealtimeFeed {
    pub fn new(quotes_path: impl Into<PathBuf>, history_dir: impl Into<PathBuf>) -> Self {
        Self {
            quotes_path: quotes_path.into(),
            history_dir: history_dir.into(),
        }
    }

    pub fn from_config(config: &config::FeedConfig) -> Self {
        Self::new(&config.quotes_path, &config.history_dir)
    }

    fn read_quotes(&self) -> Result<HashMap<String, Quote>, SourceError> {
        read_json(&self.quotes_path)
    }

    fn history_path(&self, symbol: &str, timeframe: &str) -> PathBuf {
        self.history_dir.join(format!("{}_{}.json", symbol, timeframe))
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, SourceError> {
    let location = path.display().to_string();
    let content = fs::read_to_string(path).map_err(|e| SourceError::io(location.clone(), e))?;
    serde_json::from_str(&content).map_err(|e| SourceError::parse(location, e))
}

impl RealtimeFeed for FileRealtimeFeed {
    fn quote(&self, symbol: &str) -> Result<Option<Quote>, SourceError> {
        Ok(self.read_quotes()?.remove(symbol))
    }

    fn history(&self, symbol: &str, timeframe: &str, count: usize) -> Result<Vec<Candle>, SourceError> {
        let path = self.history_path(symbol, timeframe);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let mut candles: Vec<Candle> = read_json(&path)?;
        candles.sort_by_key(|c| c.time);
        let skip = candles.len().saturating_sub(count);
        Ok(candles.split_off(skip))
    }

    fn snapshot(&self, symbols: &[String]) -> Result<BTreeMap<String, Quote>, SourceError> {
        let mut all = self.read_quotes()?;
        Ok(symbols
            .iter()
            .filter_map(|symbol| all.remove(symbol).map(|quote| (symbol.clone(), quote)))
            .collect())
    }
}
