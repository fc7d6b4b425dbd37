//! Order-flow signal capability backed by per-instrument JSON files.

use crate::error::SourceError;
use crate::types::{FlowState, ParticipantFlow};
use parking_lot::Mutex;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

pub trait FlowSignalStore: Send + Sync {
    /// The full flow state when any instrument changed since the last poll,
    /// `None` otherwise. Blocking.
    fn poll_for_update(&self) -> Option<FlowState>;
}

#[derive(Debug, Deserialize)]
struct FlowFile {
    flow: ParticipantFlow,
}

/// Polls `<directory>/<prefix><SYMBOL>.json` by modification time.
///
/// The writer replaces files while we read them, so a read that fails is
/// retried a few times before the cycle gives up and keeps the previous state.
pub struct FileFlowSignalStore {
    directory: PathBuf,
    file_prefix: String,
    symbols: Vec<String>,
    retry_attempts: u32,
    retry_backoff: Duration,
    seen: Mutex<HashMap<String, SystemTime>>,
    state: Mutex<FlowState>,
}

impl FileFlowSignalStore {
    pub fn new(directory: impl Into<PathBuf>, file_prefix: impl Into<String>, symbols: Vec<String>) -> Self {
        Self {
            directory: directory.into(),
            file_prefix: file_prefix.into(),
            symbols,
            retry_attempts: 3,
            retry_backoff: Duration::from_millis(100),
            seen: Mutex::new(HashMap::new()),
            state: Mutex::new(FlowState::new()),
        }
    }

    pub fn from_config(config: &config::FlowConfig, symbols: Vec<String>) -> Self {
        Self::new(&config.directory, config.file_prefix.clone(), symbols)
            .with_retry(config.retry_attempts, Duration::from_millis(config.retry_backoff_ms))
    }

    pub fn with_retry(mut self, attempts: u32, backoff: Duration) -> Self {
        self.retry_attempts = attempts.max(1);
        self.retry_backoff = backoff;
        self
    }

    fn path_for(&self, symbol: &str) -> PathBuf {
        self.directory.join(format!("{}{}.json", self.file_prefix, symbol))
    }

    fn read_with_retry(&self, path: &Path) -> Result<ParticipantFlow, SourceError> {
        let location = path.display().to_string();
        let mut last_error = SourceError::io(location.clone(), "no attempt made");

        for attempt in 1..=self.retry_attempts {
            let outcome = fs::read_to_string(path)
                .map_err(|e| SourceError::io(location.clone(), e))
                .and_then(|content| {
                    serde_json::from_str::<FlowFile>(&content).map_err(|e| SourceError::parse(location.clone(), e))
                });

            match outcome {
                Ok(file) => return Ok(file.flow),
                Err(e) => {
                    debug!(path = %location, attempt, error = %e, "Flow file read failed");
                    last_error = e;
                    if attempt < self.retry_attempts {
                        std::thread::sleep(self.retry_backoff);
                    }
                }
            }
        }

        Err(last_error)
    }
}

impl FlowSignalStore for FileFlowSignalStore {
    fn poll_for_update(&self) -> Option<FlowState> {
        let mut changed = false;

        for symbol in &self.symbols {
            let path = self.path_for(symbol);
            let modified = match fs::metadata(&path).and_then(|m| m.modified()) {
                Ok(modified) => modified,
                Err(_) => continue,
            };

            let is_newer = self
                .seen
                .lock()
                .get(symbol)
                .map_or(true, |previous| modified > *previous);
            if !is_newer {
                continue;
            }

            match self.read_with_retry(&path) {
                Ok(flow) => {
                    self.state.lock().insert(symbol.clone(), flow);
                    self.seen.lock().insert(symbol.clone(), modified);
                    changed = true;
                }
                Err(e) => {
                    warn!(%symbol, error = %e, "Giving up on flow file this cycle, keeping previous state");
                }
            }
        }

        changed.then(|| self.state.lock().clone())
    }
}
