//! Loop orchestration.
//!
//! [`Engine::run`] spawns one task per [`LoopKind`]. Loops share data only
//! through [`EngineState`]; an iteration that fails is logged and retried
//! after `error_backoff_ms` while every other loop carries on.

mod schedule;
mod state;

pub use schedule::{jitter, next_delay, LoopKind};
pub use state::{EngineState, IndicatorMap};

use crate::calendar::{filter_events, should_fetch};
use crate::external::{ExternalScoreProvider, FileScoreProvider};
use crate::feed::{FileRealtimeFeed, RealtimeFeed};
use crate::flow::{FileFlowSignalStore, FlowSignalStore};
use crate::missing::missing_symbols;
use crate::scorer::Scorer;
use crate::shutdown::run_until_shutdown;
use crate::snapshot::{CycleInputs, SnapshotAssembler};
use crate::store::{create_store, publish_json, SnapshotStore};
use crate::web::{HttpWebSource, WebSource};
use crate::Result;
use chrono::Utc;
use config::BridgeConfig;
use futures::future::join_all;
use futures::FutureExt;
use observability::{LoopMetrics, PublishMetrics};
use std::collections::{BTreeMap, BTreeSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// External capabilities the engine drives.
pub struct EngineDeps {
    pub feed: Arc<dyn RealtimeFeed>,
    pub web: Arc<dyn WebSource>,
    pub flow: Arc<dyn FlowSignalStore>,
    pub external: Option<Arc<dyn ExternalScoreProvider>>,
    pub store: Arc<dyn SnapshotStore>,
}

impl EngineDeps {
    /// Production adapters. `dry_run` publishes to memory instead of the configured store.
    pub async fn from_config(config: &BridgeConfig, dry_run: bool) -> Result<Self> {
        let timeout = Duration::from_secs(config.sources.request_timeout_seconds);
        let flow_symbols = vec![
            config.instruments.index_future.clone(),
            config.instruments.currency_future.clone(),
        ];

        let external = config
            .scoring
            .external_scores_path
            .as_ref()
            .map(|path| Arc::new(FileScoreProvider::new(path)) as Arc<dyn ExternalScoreProvider>);

        Ok(Self {
            feed: Arc::new(FileRealtimeFeed::from_config(&config.feed)),
            web: Arc::new(HttpWebSource::new(timeout)?),
            flow: Arc::new(FileFlowSignalStore::from_config(&config.flow, flow_symbols)),
            external,
            store: create_store(&config.store, dry_run).await?,
        })
    }
}

pub fn history_key(symbol: &str, timeframe: &str) -> String {
    format!("history:{}:{}", symbol, timeframe)
}

pub struct Engine {
    sources: config::SourcesConfig,
    feed_config: config::FeedConfig,
    schedule: config::ScheduleConfig,
    snapshot_key: String,
    /// Futures whose history is published: index first, then currency
    history_symbols: Vec<String>,
    assembler: SnapshotAssembler,
    state: Arc<EngineState>,
    deps: EngineDeps,
    publish_metrics: PublishMetrics,
}

impl Engine {
    pub fn new(config: &BridgeConfig, deps: EngineDeps) -> Result<Self> {
        let scorer = Scorer::from_config(&config.session, &config.scoring)?;
        let assembler = SnapshotAssembler::new(config.instruments.clone(), config.scoring.volume_lookback, scorer);

        let known_targets = config
            .sources
            .macro_targets
            .keys()
            .chain(config.sources.global_targets.keys());
        let state = Arc::new(EngineState::seeded(known_targets, Utc::now()));

        info!(
            store = deps.store.name(),
            macro_targets = config.sources.macro_targets.len(),
            global_targets = config.sources.global_targets.len(),
            blue_chips = config.instruments.blue_chips.len(),
            "Engine created"
        );

        Ok(Self {
            sources: config.sources.clone(),
            feed_config: config.feed.clone(),
            schedule: config.schedule.clone(),
            snapshot_key: config.store.snapshot_key.clone(),
            history_symbols: vec![
                config.instruments.index_future.clone(),
                config.instruments.currency_future.clone(),
            ],
            assembler,
            state,
            deps,
            publish_metrics: PublishMetrics::new(),
        })
    }

    pub fn state(&self) -> &Arc<EngineState> {
        &self.state
    }

    /// Run every loop until `shutdown` is cancelled.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        let mut tasks = JoinSet::new();
        for kind in LoopKind::ALL {
            let engine = Arc::clone(&self);
            let token = shutdown.child_token();
            tasks.spawn(async move {
                engine.supervise(kind, token).await;
                kind
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(kind) => debug!(loop_name = kind.name(), "Loop task finished"),
                Err(e) => error!(error = %e, "Loop task aborted"),
            }
        }
        info!("All loops stopped");
    }

    /// Run `kind` and restart it after a panic until `token` is cancelled.
    async fn supervise(&self, kind: LoopKind, token: CancellationToken) {
        let restart_delay = Duration::from_millis(self.schedule.error_backoff_ms);
        loop {
            let outcome = AssertUnwindSafe(self.run_loop(kind, token.clone())).catch_unwind().await;
            if outcome.is_ok() || token.is_cancelled() {
                return;
            }

            error!(loop_name = kind.name(), "Loop panicked, restarting after backoff");
            if run_until_shutdown(&token, tokio::time::sleep(restart_delay)).await.is_none() {
                return;
            }
        }
    }

    /// Drive one loop: iterate, sleep, repeat until cancelled.
    pub async fn run_loop(&self, kind: LoopKind, token: CancellationToken) {
        let metrics = LoopMetrics::new(kind.name());
        let error_backoff = Duration::from_millis(self.schedule.error_backoff_ms);
        info!(loop_name = kind.name(), "Loop started");

        while !token.is_cancelled() {
            let started = Instant::now();
            let delay = match run_until_shutdown(&token, self.run_cycle(kind, &token)).await {
                None => break,
                Some(Ok(())) => {
                    metrics.record_success(started.elapsed());
                    next_delay(&self.schedule, kind)
                }
                Some(Err(e)) => {
                    metrics.record_failure(started.elapsed());
                    error!(loop_name = kind.name(), error = %e, "Iteration failed, retrying after backoff");
                    error_backoff
                }
            };

            if run_until_shutdown(&token, tokio::time::sleep(delay)).await.is_none() {
                break;
            }
        }

        info!(loop_name = kind.name(), "Loop stopped");
    }

    /// One iteration of `kind`. Writes nothing once `token` is cancelled.
    pub async fn run_cycle(&self, kind: LoopKind, token: &CancellationToken) -> Result<()> {
        match kind {
            LoopKind::Macro => self.macro_cycle(token).await,
            LoopKind::Calendar => self.calendar_cycle(token).await,
            LoopKind::Global => self.global_cycle(token).await,
            LoopKind::History => self.history_cycle(token).await,
            LoopKind::Primary => self.primary_cycle(token).await,
        }
    }

    async fn fetch_targets(&self, kind: LoopKind, targets: &BTreeMap<String, String>) -> IndicatorMap {
        let fetches = targets.iter().map(|(name, locator)| async move {
            (name, self.deps.web.fetch_indicator(name, locator).await)
        });

        let mut fresh = IndicatorMap::new();
        for (name, result) in join_all(fetches).await {
            match result {
                Ok(value) => {
                    fresh.insert(name.clone(), value);
                }
                Err(e) => warn!(loop_name = kind.name(), indicator = %name, error = %e, "Source unavailable, keeping last value"),
            }
        }
        fresh
    }

    #[instrument(skip_all, fields(loop_name = "macro"))]
    async fn macro_cycle(&self, token: &CancellationToken) -> Result<()> {
        let fresh = self.fetch_targets(LoopKind::Macro, &self.sources.macro_targets).await;
        if token.is_cancelled() {
            return Ok(());
        }

        info!(
            fetched = fresh.len(),
            total = self.sources.macro_targets.len(),
            "Macro targets refreshed"
        );
        self.state.merge_macro(fresh);
        Ok(())
    }

    #[instrument(skip_all, fields(loop_name = "calendar"))]
    async fn calendar_cycle(&self, token: &CancellationToken) -> Result<()> {
        let now_local = self.assembler.scorer().gate().local_time(Utc::now());
        let cached = self.state.calendar();
        if !should_fetch(&cached, now_local) {
            debug!(cached = cached.len(), "No pending release, skipping calendar fetch");
            return Ok(());
        }

        let calendar = &self.sources.calendar;
        match self.deps.web.fetch_calendar(&calendar.url).await {
            Ok(events) => {
                let events = filter_events(events, &calendar.currencies, calendar.min_impact);
                if token.is_cancelled() {
                    return Ok(());
                }
                info!(events = events.len(), "Calendar refreshed");
                self.state.replace_calendar(events);
            }
            Err(e) => warn!(error = %e, "Calendar unavailable, keeping cache"),
        }
        Ok(())
    }

    #[instrument(skip_all, fields(loop_name = "global"))]
    async fn global_cycle(&self, token: &CancellationToken) -> Result<()> {
        // one view of the missing set for the whole pass
        let missing = self.state.missing().current.clone();
        let fresh = self.fetch_targets(LoopKind::Global, &self.sources.global_targets).await;

        let mut fallback = IndicatorMap::new();
        for symbol in &missing {
            let Some(locator) = self.sources.fallback_locators.get(symbol) else {
                warn!(%symbol, "No fallback locator for missing symbol");
                continue;
            };
            match self.deps.web.fetch_indicator(symbol, locator).await {
                Ok(value) => {
                    fallback.insert(symbol.clone(), value);
                }
                Err(e) => warn!(%symbol, error = %e, "Fallback fetch failed"),
            }
        }

        if token.is_cancelled() {
            return Ok(());
        }
        info!(
            fetched = fresh.len(),
            missing = missing.len(),
            recovered = fallback.len(),
            "Global targets refreshed"
        );
        self.state.merge_macro(fresh);
        self.state.merge_fallback(fallback);
        Ok(())
    }

    #[instrument(skip_all, fields(loop_name = "history"))]
    async fn history_cycle(&self, token: &CancellationToken) -> Result<()> {
        let mut published = 0u64;

        for symbol in &self.history_symbols {
            for timeframe in &self.feed_config.history_timeframes {
                let feed = Arc::clone(&self.deps.feed);
                let (s, tf, count) = (symbol.clone(), timeframe.clone(), self.feed_config.history_count);
                let candles = match tokio::task::spawn_blocking(move || feed.history(&s, &tf, count)).await? {
                    Ok(candles) => candles,
                    Err(e) => {
                        warn!(%symbol, %timeframe, error = %e, "History unavailable");
                        continue;
                    }
                };

                if candles.is_empty() {
                    warn!(%symbol, %timeframe, "Feed returned no candles");
                    continue;
                }
                if token.is_cancelled() {
                    return Ok(());
                }

                publish_json(self.deps.store.as_ref(), &history_key(symbol, timeframe), &candles).await?;
                published += 1;
                if timeframe == "D1" {
                    self.state.store_daily(symbol, candles);
                }
            }
        }

        self.publish_metrics.history_published(published);
        debug!(published, "History published");
        Ok(())
    }

    #[instrument(skip_all, fields(loop_name = "primary"))]
    async fn primary_cycle(&self, token: &CancellationToken) -> Result<()> {
        let symbols = self.assembler.feed_symbols();
        let feed = Arc::clone(&self.deps.feed);
        let flow = Arc::clone(&self.deps.flow);
        let external = self.deps.external.clone();

        let (quotes, flow_update, external_scores) = tokio::task::spawn_blocking(move || {
            let quotes = feed.snapshot(&symbols);
            let flow_update = flow.poll_for_update();
            let external_scores = match external.map(|provider| provider.scores()) {
                Some(Ok(scores)) => scores,
                Some(Err(e)) => {
                    warn!(error = %e, "External scores unavailable, using engine scores");
                    BTreeMap::new()
                }
                None => BTreeMap::new(),
            };
            (quotes, flow_update, external_scores)
        })
        .await?;

        if token.is_cancelled() {
            return Ok(());
        }
        if let Some(flows) = flow_update {
            debug!(instruments = flows.len(), "Flow state updated");
            self.state.replace_flows(flows);
        }

        // an unreachable feed leaves every blue chip missing, which hands them to the fallback loop
        let quotes = quotes.unwrap_or_else(|e| {
            warn!(error = %e, "Realtime feed unavailable, publishing from caches");
            BTreeMap::new()
        });
        let present: BTreeSet<String> = quotes
            .iter()
            .filter(|(_, quote)| quote.is_valid())
            .map(|(symbol, _)| symbol.clone())
            .collect();
        let missing = missing_symbols(self.assembler.blue_chips(), &present);
        self.publish_metrics.set_missing_symbols(missing.len());
        self.state.record_missing(missing);

        let tracker = self.state.missing();
        for symbol in tracker.newly_missing() {
            warn!(%symbol, "Symbol missing from realtime feed, fallback will be fetched");
        }
        for symbol in tracker.recovered() {
            info!(%symbol, "Symbol back on realtime feed");
        }

        let inputs = CycleInputs {
            quotes,
            fallback: (*self.state.fallback()).clone(),
            flows: (*self.state.flows()).clone(),
            macro_data: (*self.state.macro_data()).clone(),
            calendar: (*self.state.calendar()).clone(),
            daily_history: (*self.state.daily_history()).clone(),
            external: external_scores,
        };
        let snapshot = self.assembler.assemble(&inputs, Utc::now());
        let payload = serde_json::to_string(&snapshot)?;

        if token.is_cancelled() {
            return Ok(());
        }
        self.deps.store.publish(&self.snapshot_key, payload).await?;
        self.publish_metrics.snapshot_published();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SourceError;
    use crate::store::InMemoryStore;
    use crate::types::{CalendarEvent, Candle, FlowState, IndicatorValue, ParticipantFlow, Quote};
    use async_trait::async_trait;
    use config::{generate_default_config, LoopScheduleConfig};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct FakeFeed {
        quotes: Mutex<BTreeMap<String, Quote>>,
        history: BTreeMap<String, Vec<Candle>>,
        failing: AtomicBool,
        snapshot_calls: AtomicUsize,
    }

    impl RealtimeFeed for FakeFeed {
        fn quote(&self, symbol: &str) -> std::result::Result<Option<Quote>, SourceError> {
            Ok(self.quotes.lock().get(symbol).copied())
        }

        fn history(&self, symbol: &str, timeframe: &str, _count: usize) -> std::result::Result<Vec<Candle>, SourceError> {
            Ok(self
                .history
                .get(&format!("{}_{}", symbol, timeframe))
                .cloned()
                .unwrap_or_default())
        }

        fn snapshot(&self, symbols: &[String]) -> std::result::Result<BTreeMap<String, Quote>, SourceError> {
            self.snapshot_calls.fetch_add(1, Ordering::SeqCst);
            if self.failing.load(Ordering::SeqCst) {
                return Err(SourceError::Unavailable {
                    target: "feed".to_string(),
                    status: 0,
                });
            }
            let quotes = self.quotes.lock();
            Ok(symbols
                .iter()
                .filter_map(|s| quotes.get(s).map(|q| (s.clone(), *q)))
                .collect())
        }
    }

    #[derive(Default)]
    struct FakeWeb {
        values: BTreeMap<String, f64>,
        failing: Mutex<BTreeSet<String>>,
        calls: Mutex<Vec<String>>,
        events: Vec<CalendarEvent>,
        calendar_calls: AtomicUsize,
        panic_on_first_calendar: AtomicBool,
    }

    #[async_trait]
    impl WebSource for FakeWeb {
        async fn fetch_indicator(&self, name: &str, _locator: &str) -> std::result::Result<IndicatorValue, SourceError> {
            self.calls.lock().push(name.to_string());
            if self.failing.lock().contains(name) {
                return Err(SourceError::Unavailable {
                    target: name.to_string(),
                    status: 503,
                });
            }
            match self.values.get(name) {
                Some(value) => Ok(IndicatorValue::new(*value, 1.0, 0.5, Utc::now())),
                None => Err(SourceError::parse(name, "no price on page")),
            }
        }

        async fn fetch_calendar(&self, _locator: &str) -> std::result::Result<Vec<CalendarEvent>, SourceError> {
            self.calendar_calls.fetch_add(1, Ordering::SeqCst);
            if self.panic_on_first_calendar.swap(false, Ordering::SeqCst) {
                panic!("calendar page layout changed");
            }
            Ok(self.events.clone())
        }
    }

    #[derive(Default)]
    struct FakeFlow {
        pending: Mutex<Option<FlowState>>,
    }

    impl FlowSignalStore for FakeFlow {
        fn poll_for_update(&self) -> Option<FlowState> {
            self.pending.lock().take()
        }
    }

    struct Harness {
        engine: Arc<Engine>,
        feed: Arc<FakeFeed>,
        web: Arc<FakeWeb>,
        flow: Arc<FakeFlow>,
        store: Arc<InMemoryStore>,
    }

    fn quote(last: f64, session_close: f64) -> Quote {
        Quote {
            last,
            session_close,
            settlement: session_close,
            vwap: None,
        }
    }

    fn candle(time: i64, close: f64) -> Candle {
        Candle {
            time,
            open: close - 10.0,
            high: close + 50.0,
            low: close - 50.0,
            close,
            tick_volume: 1_000,
            real_volume: 5_000,
        }
    }

    fn test_config() -> BridgeConfig {
        let mut config = generate_default_config();
        config.store.store_type = "memory".to_string();
        config.instruments.realtime_symbols = vec!["WIN$N".to_string(), "WDO$N".to_string(), "IBOV".to_string()];
        config.instruments.blue_chips = vec!["VALE3".to_string(), "PETR4".to_string(), "B3SA3".to_string()];
        config.sources.macro_targets = [("DXY", "dxy"), ("SP500", "sp500")]
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        config.sources.global_targets = [("VIX".to_string(), "vix".to_string())].into_iter().collect();
        config.sources.fallback_locators = [("PETR4".to_string(), "petr4".to_string())].into_iter().collect();
        config.schedule.macro_loop = LoopScheduleConfig::new(60, 0, 0);
        config.schedule.calendar = LoopScheduleConfig::new(60, 0, 0);
        config.schedule.global = LoopScheduleConfig::new(60, 0, 0);
        config.schedule.history = LoopScheduleConfig::new(60, 0, 0);
        config.schedule.primary_interval_ms = 10;
        config.schedule.error_backoff_ms = 20;
        config
    }

    fn harness(feed: FakeFeed, web: FakeWeb) -> Harness {
        let feed = Arc::new(feed);
        let web = Arc::new(web);
        let flow = Arc::new(FakeFlow::default());
        let store = Arc::new(InMemoryStore::new());

        let deps = EngineDeps {
            feed: feed.clone(),
            web: web.clone(),
            flow: flow.clone(),
            external: None,
            store: store.clone(),
        };
        let engine = Arc::new(Engine::new(&test_config(), deps).unwrap());

        Harness {
            engine,
            feed,
            web,
            flow,
            store,
        }
    }

    fn market_feed() -> FakeFeed {
        let feed = FakeFeed::default();
        {
            let mut quotes = feed.quotes.lock();
            quotes.insert("WIN$N".to_string(), quote(128_500.0, 128_000.0));
            quotes.insert("WDO$N".to_string(), quote(5_010.0, 5_000.0));
            quotes.insert("IBOV".to_string(), quote(128_100.0, 127_800.0));
            quotes.insert("VALE3".to_string(), quote(61.2, 60.0));
        }
        feed
    }

    fn market_web() -> FakeWeb {
        FakeWeb {
            values: [("DXY", 104.2), ("SP500", 5_100.0), ("VIX", 14.5), ("PETR4", 38.4)]
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect(),
            ..FakeWeb::default()
        }
    }

    async fn published_snapshot(store: &InMemoryStore) -> serde_json::Value {
        let payload = store.fetch("market_data").await.unwrap().expect("snapshot published");
        serde_json::from_str(&payload).unwrap()
    }

    #[tokio::test]
    async fn test_macro_cache_seeded_with_every_target() {
        let h = harness(market_feed(), market_web());
        let macro_data = h.engine.state().macro_data();

        let names: Vec<&str> = macro_data.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["DXY", "SP500", "VIX"]);
        assert!(macro_data.values().all(|v| v.value == 0.0));
    }

    #[tokio::test]
    async fn test_primary_cycle_publishes_snapshot_and_tracks_missing() {
        let h = harness(market_feed(), market_web());
        *h.flow.pending.lock() = Some(
            [(
                "WIN$N".to_string(),
                ParticipantFlow {
                    foreign: 1_500.0,
                    institutional: -700.0,
                    retail: -800.0,
                },
            )]
            .into_iter()
            .collect(),
        );
        let token = CancellationToken::new();

        h.engine.run_cycle(LoopKind::Primary, &token).await.unwrap();

        let snapshot = published_snapshot(&h.store).await;
        assert_eq!(snapshot["mt5"]["WIN$N"]["valor"], 128_500.0);
        assert!(snapshot["blue_chips"].get("VALE3").is_some());
        assert!(snapshot["blue_chips"].get("PETR4").is_none());
        assert_eq!(snapshot["quant_dashboard"]["flows"]["WIN$N"]["FOREIGN"], 1_500.0);
        assert!(snapshot["macro"].get("DXY").is_some());

        let missing = h.engine.state().missing();
        let expected: BTreeSet<String> = ["B3SA3", "PETR4"].iter().map(|s| s.to_string()).collect();
        assert_eq!(missing.current, expected);
        assert_eq!(h.store.write_count("market_data"), 1);
    }

    #[tokio::test]
    async fn test_global_cycle_fills_located_missing_symbols() {
        let h = harness(market_feed(), market_web());
        let token = CancellationToken::new();

        h.engine.run_cycle(LoopKind::Primary, &token).await.unwrap();
        h.engine.run_cycle(LoopKind::Global, &token).await.unwrap();

        let calls = h.web.calls.lock().clone();
        assert!(calls.contains(&"VIX".to_string()));
        assert!(calls.contains(&"PETR4".to_string()));
        assert!(!calls.contains(&"B3SA3".to_string()));
        assert!(!calls.contains(&"VALE3".to_string()));
        assert_eq!(h.engine.state().macro_data()["VIX"].value, 14.5);

        h.engine.run_cycle(LoopKind::Primary, &token).await.unwrap();
        let snapshot = published_snapshot(&h.store).await;
        assert_eq!(snapshot["blue_chips"]["PETR4"]["valor"], 38.4);
    }

    #[tokio::test]
    async fn test_macro_failure_keeps_last_value() {
        let h = harness(market_feed(), market_web());
        let token = CancellationToken::new();

        h.engine.run_cycle(LoopKind::Macro, &token).await.unwrap();
        assert_eq!(h.engine.state().macro_data()["DXY"].value, 104.2);

        h.web.failing.lock().insert("DXY".to_string());
        h.engine.run_cycle(LoopKind::Macro, &token).await.unwrap();

        let macro_data = h.engine.state().macro_data();
        assert_eq!(macro_data["DXY"].value, 104.2);
        assert_eq!(macro_data["SP500"].value, 5_100.0);
        // global target untouched by the macro loop
        assert_eq!(macro_data["VIX"].value, 0.0);
    }

    #[tokio::test]
    async fn test_calendar_fetched_once_when_nothing_pending() {
        let mut web = market_web();
        web.events = vec![
            CalendarEvent {
                time: "10:00".to_string(),
                currency: "USD".to_string(),
                impact: 3,
                event: "Nonfarm Payrolls".to_string(),
                actual: "275K".to_string(),
                forecast: "200K".to_string(),
                previous: "229K".to_string(),
            },
            CalendarEvent {
                time: "11:00".to_string(),
                currency: "EUR".to_string(),
                impact: 3,
                event: "ECB Speech".to_string(),
                actual: String::new(),
                forecast: String::new(),
                previous: String::new(),
            },
        ];
        let h = harness(market_feed(), web);
        let token = CancellationToken::new();

        h.engine.run_cycle(LoopKind::Calendar, &token).await.unwrap();
        h.engine.run_cycle(LoopKind::Calendar, &token).await.unwrap();

        assert_eq!(h.web.calendar_calls.load(Ordering::SeqCst), 1);
        let calendar = h.engine.state().calendar();
        assert_eq!(calendar.len(), 1);
        assert_eq!(calendar[0].currency, "USD");
    }

    #[tokio::test]
    async fn test_history_cycle_publishes_series_and_daily_cache() {
        let mut feed = market_feed();
        feed.history.insert(
            "WIN$N_D1".to_string(),
            vec![candle(1, 127_000.0), candle(2, 127_500.0), candle(3, 128_000.0)],
        );
        let h = harness(feed, market_web());
        let token = CancellationToken::new();

        h.engine.run_cycle(LoopKind::History, &token).await.unwrap();

        assert_eq!(h.store.keys(), vec!["history:WIN$N:D1".to_string()]);
        let payload = h.store.fetch("history:WIN$N:D1").await.unwrap().unwrap();
        let candles: Vec<Candle> = serde_json::from_str(&payload).unwrap();
        assert_eq!(candles.len(), 3);
        assert_eq!(h.engine.state().daily_history()["WIN$N"].len(), 3);
    }

    #[tokio::test]
    async fn test_failing_loop_does_not_stall_others() {
        let feed = market_feed();
        feed.failing.store(true, Ordering::SeqCst);
        let h = harness(feed, market_web());
        let shutdown = CancellationToken::new();

        let handle = tokio::spawn(Arc::clone(&h.engine).run(shutdown.clone()));
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert!(h.feed.snapshot_calls.load(Ordering::SeqCst) >= 3);
        assert_eq!(h.engine.state().macro_data()["DXY"].value, 104.2);
        // snapshots keep flowing from the caches
        assert!(h.store.write_count("market_data") >= 3);
        let snapshot = published_snapshot(&h.store).await;
        assert_eq!(snapshot["macro"]["DXY"]["valor"], 104.2);
        assert!(snapshot["mt5"].as_object().unwrap().is_empty());

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("engine stops after cancel")
            .unwrap();
    }

    #[tokio::test]
    async fn test_feed_outage_hands_blue_chips_to_fallback() {
        let feed = market_feed();
        feed.failing.store(true, Ordering::SeqCst);
        let h = harness(feed, market_web());
        let token = CancellationToken::new();

        h.engine.run_cycle(LoopKind::Primary, &token).await.unwrap();
        let expected: BTreeSet<String> = ["B3SA3", "PETR4", "VALE3"].iter().map(|s| s.to_string()).collect();
        assert_eq!(h.engine.state().missing().current, expected);
        assert_eq!(h.store.write_count("market_data"), 1);

        h.engine.run_cycle(LoopKind::Global, &token).await.unwrap();
        let calls = h.web.calls.lock().clone();
        assert_eq!(calls, vec!["VIX".to_string(), "PETR4".to_string()]);

        h.engine.run_cycle(LoopKind::Primary, &token).await.unwrap();
        let snapshot = published_snapshot(&h.store).await;
        assert_eq!(snapshot["blue_chips"]["PETR4"]["valor"], 38.4);
        assert!(snapshot["blue_chips"].get("VALE3").is_none());
    }

    #[tokio::test]
    async fn test_panicked_loop_is_restarted() {
        let web = market_web();
        web.panic_on_first_calendar.store(true, Ordering::SeqCst);
        let h = harness(market_feed(), web);
        let shutdown = CancellationToken::new();

        let handle = tokio::spawn(Arc::clone(&h.engine).run(shutdown.clone()));
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(h.web.calendar_calls.load(Ordering::SeqCst), 2);
        assert!(h.store.write_count("market_data") > 0);

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("engine stops after cancel")
            .unwrap();
    }

    #[tokio::test]
    async fn test_no_publish_after_shutdown() {
        let h = harness(market_feed(), market_web());
        let shutdown = CancellationToken::new();

        let handle = tokio::spawn(Arc::clone(&h.engine).run(shutdown.clone()));
        tokio::time::sleep(Duration::from_millis(60)).await;
        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("engine stops after cancel")
            .unwrap();

        let published = h.store.write_count("market_data");
        assert!(published > 0);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(h.store.write_count("market_data"), published);
    }

    #[tokio::test]
    async fn test_cancelled_cycle_writes_nothing() {
        let h = harness(market_feed(), market_web());
        let token = CancellationToken::new();
        token.cancel();

        h.engine.run_cycle(LoopKind::Primary, &token).await.unwrap();
        h.engine.run_cycle(LoopKind::Macro, &token).await.unwrap();

        assert_eq!(h.store.write_count("market_data"), 0);
        assert_eq!(h.engine.state().macro_data()["DXY"].value, 0.0);
    }
}
