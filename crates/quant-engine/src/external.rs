//! Optional pre-computed scores from the spreadsheet bridge.

use crate::error::SourceError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExternalScore {
    pub bull_power: f64,
    pub bear_power: f64,
}

pub trait ExternalScoreProvider: Send + Sync {
    /// Instrument symbol -> score. Blocking.
    fn scores(&self) -> Result<BTreeMap<String, ExternalScore>, SourceError>;
}

/// Reads `{"<SYMBOL>": {"bull_power": n, "bear_power": n}}`.
///
/// An absent file means no external scores, not an error.
pub struct FileScoreProvider {
    path: PathBuf,
}

impl FileScoreProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ExternalScoreProvider for FileScoreProvider {
    fn scores(&self) -> Result<BTreeMap<String, ExternalScore>, SourceError> {
        let location = self.path.display().to_string();
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(SourceError::io(location, e)),
        };
        serde_json::from_str(&content).map_err(|e| SourceError::parse(location, e))
    }
}
