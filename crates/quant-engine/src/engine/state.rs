//! Caches shared between the collection loops.

use crate::cache::SharedCache;
use crate::missing::MissingTracker;
use crate::types::{CalendarEvent, Candle, FlowState, IndicatorValue};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

pub type IndicatorMap = BTreeMap<String, IndicatorValue>;

/// Owned by the engine; loops write through the crate-private setters and
/// everything else reads through the accessors.
#[derive(Debug, Default)]
pub struct EngineState {
    macro_data: SharedCache<IndicatorMap>,
    fallback: SharedCache<IndicatorMap>,
    calendar: SharedCache<Vec<CalendarEvent>>,
    flows: SharedCache<FlowState>,
    missing: SharedCache<MissingTracker>,
    daily_history: SharedCache<BTreeMap<String, Vec<Candle>>>,
}

impl EngineState {
    pub fn new() -> Self {
        Self::default()
    }

    /// State with a zero-valued macro entry for every known target.
    pub fn seeded<'a, I>(targets: I, now: DateTime<Utc>) -> Self
    where
        I: IntoIterator<Item = &'a String>,
    {
        let seed: IndicatorMap = targets
            .into_iter()
            .map(|name| (name.clone(), IndicatorValue::zero(now)))
            .collect();
        Self {
            macro_data: SharedCache::new(seed),
            ..Self::default()
        }
    }

    pub fn macro_data(&self) -> Arc<IndicatorMap> {
        self.macro_data.load()
    }

    pub fn fallback(&self) -> Arc<IndicatorMap> {
        self.fallback.load()
    }

    pub fn calendar(&self) -> Arc<Vec<CalendarEvent>> {
        self.calendar.load()
    }

    pub fn flows(&self) -> Arc<FlowState> {
        self.flows.load()
    }

    pub fn missing(&self) -> Arc<MissingTracker> {
        self.missing.load()
    }

    pub fn daily_history(&self) -> Arc<BTreeMap<String, Vec<Candle>>> {
        self.daily_history.load()
    }

    pub(crate) fn merge_macro(&self, fresh: IndicatorMap) {
        merge_into(&self.macro_data, fresh);
    }

    pub(crate) fn merge_fallback(&self, fresh: IndicatorMap) {
        merge_into(&self.fallback, fresh);
    }

    pub(crate) fn replace_calendar(&self, events: Vec<CalendarEvent>) {
        self.calendar.store(events);
    }

    pub(crate) fn replace_flows(&self, flows: FlowState) {
        self.flows.store(flows);
    }

    pub(crate) fn record_missing(&self, current: BTreeSet<String>) {
        self.missing.update(|tracker| tracker.advanced(current));
    }

    pub(crate) fn store_daily(&self, symbol: &str, candles: Vec<Candle>) {
        self.daily_history.update(|history| {
            let mut next = history.clone();
            next.insert(symbol.to_string(), candles);
            next
        });
    }
}

fn merge_into(cache: &SharedCache<IndicatorMap>, fresh: IndicatorMap) {
    if fresh.is_empty() {
        return;
    }
    cache.update(|current| {
        let mut next = current.clone();
        next.extend(fresh);
        next
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_seed_and_merge_keep_untouched_targets() {
        let t0 = Utc.with_ymd_and_hms(2024, 3, 4, 12, 0, 0).unwrap();
        let targets = vec!["DXY".to_string(), "SP500".to_string()];
        let state = EngineState::seeded(&targets, t0);

        assert_eq!(state.macro_data().len(), 2);
        assert_eq!(state.macro_data()["SP500"].value, 0.0);

        let mut fresh = IndicatorMap::new();
        fresh.insert("DXY".to_string(), IndicatorValue::new(104.2, -0.3, -0.29, t0));
        state.merge_macro(fresh);

        let data = state.macro_data();
        assert_eq!(data["DXY"].value, 104.2);
        assert_eq!(data["SP500"].value, 0.0);
    }

    #[test]
    fn test_missing_history_is_kept() {
        let state = EngineState::new();
        state.record_missing(["PETR4".to_string()].into_iter().collect());
        state.record_missing(BTreeSet::new());

        let tracker = state.missing();
        assert!(tracker.current.is_empty());
        assert!(tracker.previous.contains("PETR4"));
    }
}
