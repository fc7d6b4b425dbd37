//! Assembly of the unified snapshot published each primary cycle.

use crate::external::ExternalScore;
use crate::market::{compute_basis, compute_breadth, compute_volatility, volume_reference, Basis, Breadth, VolatilityRegime};
use crate::scorer::{QuantScore, ScoreInputs, Scorer};
use crate::types::{CalendarEvent, Candle, FlowState, IndicatorValue, InstrumentKind, Quote};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreSource {
    Engine,
    External,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantDashboard {
    pub flows: FlowState,
    /// Instrument symbol -> score
    pub score: BTreeMap<String, QuantScore>,
    pub source: ScoreSource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Realtime instruments, rates and the spot index
    pub mt5: BTreeMap<String, IndicatorValue>,
    pub blue_chips: BTreeMap<String, IndicatorValue>,
    pub breadth: Breadth,
    pub basis: Basis,
    pub volatility: Option<VolatilityRegime>,
    pub quant_dashboard: QuantDashboard,
    #[serde(rename = "macro")]
    pub macro_data: BTreeMap<String, IndicatorValue>,
    pub calendar: Vec<CalendarEvent>,
    pub timestamp: DateTime<Utc>,
}

/// Everything one primary cycle read from the feed and the caches.
#[derive(Debug, Clone, Default)]
pub struct CycleInputs {
    pub quotes: BTreeMap<String, Quote>,
    pub fallback: BTreeMap<String, IndicatorValue>,
    pub flows: FlowState,
    pub macro_data: BTreeMap<String, IndicatorValue>,
    pub calendar: Vec<CalendarEvent>,
    /// Symbol -> daily candles, oldest first
    pub daily_history: BTreeMap<String, Vec<Candle>>,
    pub external: BTreeMap<String, ExternalScore>,
}

pub struct SnapshotAssembler {
    instruments: config::InstrumentsConfig,
    volume_lookback: usize,
    scorer: Scorer,
}

impl SnapshotAssembler {
    pub fn new(instruments: config::InstrumentsConfig, volume_lookback: usize, scorer: Scorer) -> Self {
        Self {
            instruments,
            volume_lookback,
            scorer,
        }
    }

    pub fn scorer(&self) -> &Scorer {
        &self.scorer
    }

    /// Symbols requested from the feed each cycle: realtime symbols, then blue chips.
    pub fn feed_symbols(&self) -> Vec<String> {
        let mut symbols = self.instruments.realtime_symbols.clone();
        for symbol in &self.instruments.blue_chips {
            if !symbols.contains(symbol) {
                symbols.push(symbol.clone());
            }
        }
        symbols
    }

    pub fn blue_chips(&self) -> &[String] {
        &self.instruments.blue_chips
    }

    pub fn assemble(&self, inputs: &CycleInputs, now: DateTime<Utc>) -> Snapshot {
        let valid = |symbol: &str| inputs.quotes.get(symbol).filter(|q| q.is_valid());

        let mt5: BTreeMap<String, IndicatorValue> = self
            .instruments
            .realtime_symbols
            .iter()
            .filter_map(|symbol| valid(symbol).map(|q| (symbol.clone(), q.to_indicator(now))))
            .collect();

        let blue_chips: BTreeMap<String, IndicatorValue> = self
            .instruments
            .blue_chips
            .iter()
            .filter_map(|symbol| {
                valid(symbol)
                    .map(|q| q.to_indicator(now))
                    .or_else(|| inputs.fallback.get(symbol).cloned())
                    .map(|value| (symbol.clone(), value))
            })
            .collect();

        let index_quote = valid(&self.instruments.index_future);
        let spot_quote = valid(&self.instruments.spot_index);

        let index_change = index_quote.or(spot_quote).map_or(0.0, |q| q.percent_change());
        let breadth = compute_breadth(&self.instruments.blue_chips, &blue_chips, index_change);
        let basis = compute_basis(index_quote.map(|q| q.last), spot_quote.map(|q| q.last));
        let volatility = inputs
            .daily_history
            .get(&self.instruments.index_future)
            .and_then(|candles| compute_volatility(candles));

        let mut score = BTreeMap::new();
        let mut any_external = false;
        for (symbol, kind) in [
            (&self.instruments.index_future, InstrumentKind::IndexFuture),
            (&self.instruments.currency_future, InstrumentKind::CurrencyFuture),
        ] {
            let quote = valid(symbol);
            let score_inputs = ScoreInputs {
                instrument: kind,
                change_pct: quote.map_or(0.0, |q| q.percent_change()),
                flow: inputs.flows.get(symbol),
                volume_reference: inputs
                    .daily_history
                    .get(symbol)
                    .and_then(|candles| volume_reference(candles, self.volume_lookback)),
                macro_data: &inputs.macro_data,
                breadth: Some(&breadth),
                vwap_distance_pct: quote.and_then(|q| q.vwap_distance_pct()),
                settlement_distance_pct: quote.and_then(|q| q.settlement_distance_pct()),
            };

            let quant = match inputs.external.get(symbol) {
                Some(external) => {
                    any_external = true;
                    self.scorer.score_external(external, &score_inputs, now)
                }
                None => self.scorer.score(&score_inputs, now),
            };
            score.insert(symbol.clone(), quant);
        }

        Snapshot {
            mt5,
            blue_chips,
            breadth,
            basis,
            volatility,
            quant_dashboard: QuantDashboard {
                flows: inputs.flows.clone(),
                score,
                source: if any_external {
                    ScoreSource::External
                } else {
                    ScoreSource::Engine
                },
            },
            macro_data: inputs.macro_data.clone(),
            calendar: inputs.calendar.clone(),
            timestamp: now,
        }
    }
}
