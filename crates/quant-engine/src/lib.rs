//! Aggregation scheduler and signal-scoring engine.
//!
//! Five independently timed loops feed shared caches; the primary loop merges
//! them with the realtime feed into one [`Snapshot`] per cycle and publishes it.
//!
//! # Core Components
//!
//! - [`engine`] - loop orchestration and the caches they share
//! - [`scorer`] - market-hours gated bull/bear scoring and the decision rule
//! - [`calendar`] - smart polling decision for the economic calendar
//! - [`missing`] - primary-feed gap detection driving web fallbacks
//! - [`market`] - breadth, basis, volatility regime and volume reference
//! - [`feed`], [`web`], [`flow`], [`external`] - source capabilities and adapters
//! - [`store`] - snapshot publication (Redis or in-memory)
//!
//! # Key Invariants
//!
//! - Caches are replaced wholesale; readers never observe a half-written value
//! - A failed loop iteration never stops the process or another loop
//! - The scorer always produces a score, missing inputs count as neutral
//! - Nothing is published or cached after shutdown is signalled

pub mod cache;
pub mod calendar;
pub mod engine;
pub mod error;
pub mod external;
pub mod feed;
pub mod flow;
pub mod market;
pub mod missing;
pub mod scorer;
pub mod shutdown;
pub mod snapshot;
pub mod store;
pub mod types;
pub mod web;

pub use engine::{Engine, EngineDeps, EngineState, LoopKind};
pub use error::{EngineError, SourceError};
pub use scorer::{Decision, MarketStatus, QuantScore, Scorer, Sentiment, SessionGate};
pub use shutdown::ShutdownController;
pub use snapshot::Snapshot;
pub use store::{create_store, InMemoryStore, RedisStore, SnapshotStore, StoreError, StoreType};
pub use types::{CalendarEvent, Candle, IndicatorValue, InstrumentKind, ParticipantFlow, Quote};

pub type Result<T> = std::result::Result<T, EngineError>;
