//! Multi-factor directional scoring.
//!
//! Each instrument gets a bull and a bear power in `[0, 15]`. Outside the
//! trading session only the day's change counts; during the session flow,
//! macro correlation and an instrument specific factor add up. A single
//! decision rule turns the powers into a status, with a safety override when
//! strong bullish power meets heavy foreign selling.

use crate::error::EngineError;
use crate::external::ExternalScore;
use crate::market::Breadth;
use crate::types::{IndicatorValue, InstrumentKind, ParticipantFlow};
use chrono::{DateTime, Datelike, FixedOffset, NaiveDateTime, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const MAX_POWER: f64 = 15.0;
/// Minimum winning power for an authorized signal
pub const AUTHORIZATION_THRESHOLD: f64 = 7.0;
/// Bull power at which contrary foreign flow forces a divergence warning
pub const DIVERGENCE_POWER: f64 = 12.0;
/// Foreign selling, as a fraction of the volume reference, that counts as contrary
pub const DIVERGENCE_FLOW_FRACTION: f64 = 0.2;

const CLOSED_POINTS_PER_PCT: f64 = 10.0;
const FOREIGN_WEIGHT: f64 = 6.0;
const INSTITUTIONAL_WEIGHT: f64 = 3.0;
const MACRO_WEIGHT: f64 = 1.5;
const MACRO_THRESHOLD_PCT: f64 = 0.1;
const BREADTH_WEIGHT: f64 = 3.0;
const BREADTH_THRESHOLD: f64 = 0.2;
const DISTANCE_WEIGHT: f64 = 1.5;
const DISTANCE_THRESHOLD_PCT: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MarketStatus {
    Open,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Sentiment {
    Bullish,
    Bearish,
    Neutral,
    Warning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    BuyAuthorized,
    SellAuthorized,
    Wait,
    CriticalDivergence,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantScore {
    /// Power backing the decision, or the larger one on WAIT
    #[serde(rename = "score")]
    pub dominant_score: f64,
    pub bull_power: f64,
    pub bear_power: f64,
    pub max_score: f64,
    /// Fired rules in evaluation order
    #[serde(rename = "details")]
    pub trace: Vec<String>,
    pub sentiment: Sentiment,
    pub status: Decision,
    pub market_status: MarketStatus,
}

/// Trading-session predicate in the exchange's local time.
#[derive(Debug, Clone)]
pub struct SessionGate {
    offset: FixedOffset,
    trading_days: Vec<Weekday>,
    open: NaiveTime,
    close: NaiveTime,
}

impl SessionGate {
    pub fn new(
        utc_offset_hours: i32,
        trading_days: Vec<Weekday>,
        open: NaiveTime,
        close: NaiveTime,
    ) -> Result<Self, EngineError> {
        let offset = FixedOffset::east_opt(utc_offset_hours * 3600)
            .ok_or_else(|| EngineError::Config(format!("invalid UTC offset: {}h", utc_offset_hours)))?;
        Ok(Self {
            offset,
            trading_days,
            open,
            close,
        })
    }

    pub fn from_config(session: &config::SessionConfig) -> Result<Self, EngineError> {
        Self::new(
            session.utc_offset_hours,
            session.parsed_trading_days()?,
            session.parsed_open()?,
            session.parsed_close()?,
        )
    }

    pub fn local_time(&self, now: DateTime<Utc>) -> NaiveDateTime {
        now.with_timezone(&self.offset).naive_local()
    }

    /// Open on a trading day within `[open, close)`.
    pub fn status_at(&self, now: DateTime<Utc>) -> MarketStatus {
        let local = self.local_time(now);
        let time = local.time();
        if self.trading_days.contains(&local.weekday()) && time >= self.open && time < self.close {
            MarketStatus::Open
        } else {
            MarketStatus::Closed
        }
    }
}

/// Everything the scorer looks at for one instrument.
#[derive(Debug, Clone, Copy)]
pub struct ScoreInputs<'a> {
    pub instrument: InstrumentKind,
    /// Percent change versus the previous session close
    pub change_pct: f64,
    pub flow: Option<&'a ParticipantFlow>,
    /// Average daily volume the flow is measured against
    pub volume_reference: Option<f64>,
    pub macro_data: &'a BTreeMap<String, IndicatorValue>,
    pub breadth: Option<&'a Breadth>,
    pub vwap_distance_pct: Option<f64>,
    pub settlement_distance_pct: Option<f64>,
}

#[derive(Default)]
struct Tally {
    bull: f64,
    bear: f64,
    trace: Vec<String>,
}

impl Tally {
    fn bull(&mut self, points: f64, reason: String) {
        self.bull += points;
        self.trace.push(format!("{} (+{:.2} bull)", reason, points));
    }

    fn bear(&mut self, points: f64, reason: String) {
        self.bear += points;
        self.trace.push(format!("{} (+{:.2} bear)", reason, points));
    }

    fn note(&mut self, reason: String) {
        self.trace.push(reason);
    }
}

fn cap(power: f64) -> f64 {
    let capped = power.clamp(0.0, MAX_POWER);
    (capped * 100.0).round() / 100.0
}

/// Apply the decision rule to final powers.
///
/// Returns the status, its sentiment and the dominant score.
pub fn resolve(bull: f64, bear: f64, foreign_flow: f64, volume_reference: Option<f64>) -> (Decision, Sentiment, f64) {
    let contrary_foreign = volume_reference
        .filter(|r| *r > 0.0)
        .map_or(false, |r| foreign_flow < -DIVERGENCE_FLOW_FRACTION * r);

    if bull >= DIVERGENCE_POWER && contrary_foreign {
        (Decision::CriticalDivergence, Sentiment::Warning, bull)
    } else if bull >= AUTHORIZATION_THRESHOLD && bull > bear {
        (Decision::BuyAuthorized, Sentiment::Bullish, bull)
    } else if bear >= AUTHORIZATION_THRESHOLD && bear > bull {
        (Decision::SellAuthorized, Sentiment::Bearish, bear)
    } else {
        (Decision::Wait, Sentiment::Neutral, bull.max(bear))
    }
}

fn closed_sentiment(bull: f64, bear: f64) -> Sentiment {
    if bull > bear {
        Sentiment::Bullish
    } else if bear > bull {
        Sentiment::Bearish
    } else {
        Sentiment::Neutral
    }
}

pub struct Scorer {
    gate: SessionGate,
    dollar_proxy: String,
    local_rates: String,
}

impl Scorer {
    pub fn new(gate: SessionGate, dollar_proxy: impl Into<String>, local_rates: impl Into<String>) -> Self {
        Self {
            gate,
            dollar_proxy: dollar_proxy.into(),
            local_rates: local_rates.into(),
        }
    }

    pub fn from_config(session: &config::SessionConfig, scoring: &config::ScoringConfig) -> Result<Self, EngineError> {
        Ok(Self::new(
            SessionGate::from_config(session)?,
            scoring.dollar_proxy.clone(),
            scoring.local_rates.clone(),
        ))
    }

    pub fn gate(&self) -> &SessionGate {
        &self.gate
    }

    /// Score one instrument. The session is evaluated once, from `now`.
    pub fn score(&self, inputs: &ScoreInputs<'_>, now: DateTime<Utc>) -> QuantScore {
        match self.gate.status_at(now) {
            MarketStatus::Closed => closed_score(inputs.change_pct),
            MarketStatus::Open => self.open_score(inputs),
        }
    }

    /// Score from externally supplied powers, under the same session gate and decision rule.
    pub fn score_external(&self, external: &ExternalScore, inputs: &ScoreInputs<'_>, now: DateTime<Utc>) -> QuantScore {
        let bull = cap(external.bull_power);
        let bear = cap(external.bear_power);
        let mut trace = vec![format!(
            "External score: bull {:.2}, bear {:.2}",
            external.bull_power, external.bear_power
        )];

        if self.gate.status_at(now) == MarketStatus::Closed {
            trace.push("Market closed".to_string());
            return QuantScore {
                dominant_score: bull.max(bear),
                bull_power: bull,
                bear_power: bear,
                max_score: MAX_POWER,
                trace,
                sentiment: closed_sentiment(bull, bear),
                status: Decision::Wait,
                market_status: MarketStatus::Closed,
            };
        }

        let foreign = inputs.flow.map_or(0.0, |f| f.foreign);
        finish(bull, bear, foreign, inputs.volume_reference, trace)
    }

    fn open_score(&self, inputs: &ScoreInputs<'_>) -> QuantScore {
        let mut tally = Tally::default();

        apply_flow(&mut tally, inputs.flow, inputs.volume_reference);
        apply_macro(&mut tally, inputs, &self.dollar_proxy, "Dollar");
        apply_macro(&mut tally, inputs, &self.local_rates, "Local rates");
        match inputs.instrument {
            InstrumentKind::IndexFuture => apply_breadth(&mut tally, inputs.breadth),
            InstrumentKind::CurrencyFuture => {
                apply_distance(&mut tally, inputs.vwap_distance_pct, "VWAP");
                apply_distance(&mut tally, inputs.settlement_distance_pct, "Settlement");
            }
        }

        let foreign = inputs.flow.map_or(0.0, |f| f.foreign);
        finish(cap(tally.bull), cap(tally.bear), foreign, inputs.volume_reference, tally.trace)
    }
}

fn finish(bull: f64, bear: f64, foreign: f64, volume_reference: Option<f64>, mut trace: Vec<String>) -> QuantScore {
    let (status, sentiment, dominant_score) = resolve(bull, bear, foreign, volume_reference);
    if status == Decision::CriticalDivergence {
        trace.push(format!("Foreign flow {:+.0} contradicts bull power {:.2}", foreign, bull));
    }
    QuantScore {
        dominant_score,
        bull_power: bull,
        bear_power: bear,
        max_score: MAX_POWER,
        trace,
        sentiment,
        status,
        market_status: MarketStatus::Open,
    }
}

fn closed_score(change_pct: f64) -> QuantScore {
    let bull = if change_pct > 0.0 { cap(CLOSED_POINTS_PER_PCT * change_pct) } else { 0.0 };
    let bear = if change_pct < 0.0 { cap(CLOSED_POINTS_PER_PCT * change_pct.abs()) } else { 0.0 };

    QuantScore {
        dominant_score: bull.max(bear),
        bull_power: bull,
        bear_power: bear,
        max_score: MAX_POWER,
        trace: vec![format!("Market closed: session change {:+.2}%", change_pct)],
        sentiment: closed_sentiment(bull, bear),
        status: Decision::Wait,
        market_status: MarketStatus::Closed,
    }
}

fn apply_flow(tally: &mut Tally, flow: Option<&ParticipantFlow>, volume_reference: Option<f64>) {
    let Some(flow) = flow else {
        tally.note("No flow data: flow neutral".to_string());
        return;
    };
    let reference = match volume_reference {
        Some(reference) if reference > 0.0 => reference,
        _ => {
            tally.note("Volume reference unavailable: flow neutral".to_string());
            return;
        }
    };

    for (label, volume, weight) in [
        ("Foreign", flow.foreign, FOREIGN_WEIGHT),
        ("Institutional", flow.institutional, INSTITUTIONAL_WEIGHT),
    ] {
        if volume == 0.0 {
            continue;
        }
        let ratio = (volume.abs() / reference).min(1.0);
        let reason = format!("{} flow {:+.0} ({:.0}% of avg volume)", label, volume, ratio * 100.0);
        if volume > 0.0 {
            tally.bull(weight * ratio, reason);
        } else {
            tally.bear(weight * ratio, reason);
        }
    }

    if flow.retail != 0.0 {
        tally.note(format!("Retail flow {:+.0} (informational)", flow.retail));
    }
}

fn apply_macro(tally: &mut Tally, inputs: &ScoreInputs<'_>, target: &str, label: &str) {
    let Some(value) = inputs.macro_data.get(target) else {
        return;
    };
    let pct = value.percent_change;
    let rising = pct > MACRO_THRESHOLD_PCT;
    let falling = pct < -MACRO_THRESHOLD_PCT;

    // A stronger dollar or higher local rates weigh on equities and lift the currency future
    let (bullish, bearish) = match inputs.instrument {
        InstrumentKind::IndexFuture => (falling, rising),
        InstrumentKind::CurrencyFuture => (rising, falling),
    };

    let reason = format!("{} ({}) {:+.2}%", label, target, pct);
    if bullish {
        tally.bull(MACRO_WEIGHT, reason);
    } else if bearish {
        tally.bear(MACRO_WEIGHT, reason);
    }
}

fn apply_breadth(tally: &mut Tally, breadth: Option<&Breadth>) {
    let Some(breadth) = breadth else {
        return;
    };
    let net = breadth.net_fraction();
    let reason = format!("Breadth {} up / {} down (net {:+.2})", breadth.up, breadth.down, net);
    if net > BREADTH_THRESHOLD {
        tally.bull(BREADTH_WEIGHT * net.abs(), reason);
    } else if net < -BREADTH_THRESHOLD {
        tally.bear(BREADTH_WEIGHT * net.abs(), reason);
    }
}

fn apply_distance(tally: &mut Tally, distance_pct: Option<f64>, label: &str) {
    let Some(distance) = distance_pct else {
        return;
    };
    let reason = format!("Price vs {} {:+.2}%", label, distance);
    if distance > DISTANCE_THRESHOLD_PCT {
        tally.bull(DISTANCE_WEIGHT, reason);
    } else if distance < -DISTANCE_THRESHOLD_PCT {
        tally.bear(DISTANCE_WEIGHT, reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::BreadthSignal;
    use chrono::TimeZone;

    fn gate() -> SessionGate {
        SessionGate::new(
            -3,
            vec![Weekday::Mon, Weekday::Tue, Weekday::Wed, Weekday::Thu, Weekday::Fri],
            NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
        )
        .unwrap()
    }

    fn scorer() -> Scorer {
        Scorer::new(gate(), "DXY", "CUPOM_LIMPO")
    }

    /// Monday 2024-03-04 at the given local (UTC-3) time
    fn monday_local(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, h + 3, m, 0).unwrap()
    }

    fn saturday() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 9, 14, 0, 0).unwrap()
    }

    fn macro_value(pct: f64) -> IndicatorValue {
        IndicatorValue::new(100.0, pct, pct, monday_local(10, 0))
    }

    fn inputs<'a>(
        instrument: InstrumentKind,
        flow: Option<&'a ParticipantFlow>,
        macro_data: &'a BTreeMap<String, IndicatorValue>,
    ) -> ScoreInputs<'a> {
        ScoreInputs {
            instrument,
            change_pct: 0.0,
            flow,
            volume_reference: Some(1_000.0),
            macro_data,
            breadth: None,
            vwap_distance_pct: None,
            settlement_distance_pct: None,
        }
    }

    #[test]
    fn test_session_gate_bounds() {
        let gate = gate();
        assert_eq!(gate.status_at(monday_local(9, 0)), MarketStatus::Open);
        assert_eq!(gate.status_at(monday_local(17, 59)), MarketStatus::Open);
        assert_eq!(gate.status_at(monday_local(18, 0)), MarketStatus::Closed);
        assert_eq!(gate.status_at(monday_local(8, 59)), MarketStatus::Closed);
        assert_eq!(gate.status_at(saturday()), MarketStatus::Closed);
    }

    #[test]
    fn test_closed_market_uses_session_change() {
        let macro_data = BTreeMap::new();
        let mut input = inputs(InstrumentKind::IndexFuture, None, &macro_data);
        input.change_pct = 0.5;

        let score = scorer().score(&input, saturday());
        assert_eq!(score.bull_power, 5.0);
        assert_eq!(score.bear_power, 0.0);
        assert_eq!(score.status, Decision::Wait);
        assert_eq!(score.market_status, MarketStatus::Closed);
        assert_eq!(score.sentiment, Sentiment::Bullish);

        input.change_pct = -2.3;
        let score = scorer().score(&input, saturday());
        assert_eq!(score.bear_power, MAX_POWER);
        assert_eq!(score.sentiment, Sentiment::Bearish);
    }

    #[test]
    fn test_open_market_half_reference_foreign_flow() {
        let macro_data = BTreeMap::new();
        let flow = ParticipantFlow {
            foreign: 500.0,
            institutional: 0.0,
            retail: -500.0,
        };
        let score = scorer().score(&inputs(InstrumentKind::IndexFuture, Some(&flow), &macro_data), monday_local(10, 0));

        assert_eq!(score.bull_power, 3.0);
        assert_eq!(score.bear_power, 0.0);
        assert_eq!(score.status, Decision::Wait);
        assert_eq!(score.sentiment, Sentiment::Neutral);
        assert_eq!(score.dominant_score, 3.0);
        assert_eq!(score.market_status, MarketStatus::Open);
        assert!(score.trace.iter().any(|line| line.contains("informational")));
    }

    #[test]
    fn test_missing_reference_keeps_flow_neutral() {
        let macro_data = BTreeMap::new();
        let flow = ParticipantFlow {
            foreign: 5_000.0,
            institutional: 5_000.0,
            retail: 0.0,
        };
        let mut input = inputs(InstrumentKind::IndexFuture, Some(&flow), &macro_data);
        input.volume_reference = None;

        let score = scorer().score(&input, monday_local(11, 0));
        assert_eq!(score.bull_power, 0.0);
        assert_eq!(score.status, Decision::Wait);
    }

    #[test]
    fn test_index_future_combines_all_factors() {
        let macro_data: BTreeMap<String, IndicatorValue> = [
            ("DXY".to_string(), macro_value(-0.3)),
            ("CUPOM_LIMPO".to_string(), macro_value(0.2)),
        ]
        .into_iter()
        .collect();
        let flow = ParticipantFlow {
            foreign: 2_000.0,
            institutional: 300.0,
            retail: 0.0,
        };
        let breadth = Breadth {
            up: 6,
            down: 2,
            neutral: 2,
            signal: BreadthSignal::Buy,
            details: BTreeMap::new(),
        };
        let mut input = inputs(InstrumentKind::IndexFuture, Some(&flow), &macro_data);
        input.breadth = Some(&breadth);

        let score = scorer().score(&input, monday_local(10, 30));
        // foreign 6 + institutional 0.9 + dollar 1.5 + breadth 3 * 0.4
        assert!((score.bull_power - 9.6).abs() < 1e-9);
        assert_eq!(score.bear_power, 1.5);
        assert_eq!(score.status, Decision::BuyAuthorized);
        assert_eq!(score.sentiment, Sentiment::Bullish);
        assert_eq!(score.trace.len(), 5);
    }

    #[test]
    fn test_currency_future_reads_macro_the_other_way() {
        let macro_data: BTreeMap<String, IndicatorValue> =
            [("DXY".to_string(), macro_value(0.3))].into_iter().collect();
        let mut input = inputs(InstrumentKind::CurrencyFuture, None, &macro_data);
        input.vwap_distance_pct = Some(0.2);
        input.settlement_distance_pct = Some(-0.05);

        let score = scorer().score(&input, monday_local(15, 0));
        assert_eq!(score.bull_power, 3.0);
        assert_eq!(score.bear_power, 0.0);

        let mut input = inputs(InstrumentKind::IndexFuture, None, &macro_data);
        input.vwap_distance_pct = Some(0.2);
        let score = scorer().score(&input, monday_local(15, 0));
        assert_eq!(score.bull_power, 0.0);
        assert_eq!(score.bear_power, 1.5);
    }

    #[test]
    fn test_equal_powers_wait() {
        let (status, sentiment, dominant) = resolve(7.0, 7.0, 0.0, Some(1_000.0));
        assert_eq!(status, Decision::Wait);
        assert_eq!(sentiment, Sentiment::Neutral);
        assert_eq!(dominant, 7.0);

        assert_eq!(resolve(7.0, 6.9, 0.0, None).0, Decision::BuyAuthorized);
        assert_eq!(resolve(2.0, 8.0, 0.0, None).0, Decision::SellAuthorized);
    }

    #[test]
    fn test_divergence_override() {
        let (status, sentiment, dominant) = resolve(13.0, 0.0, -250.0, Some(1_000.0));
        assert_eq!(status, Decision::CriticalDivergence);
        assert_eq!(sentiment, Sentiment::Warning);
        assert_eq!(dominant, 13.0);

        // selling below the threshold does not trigger it
        assert_eq!(resolve(13.0, 0.0, -150.0, Some(1_000.0)).0, Decision::BuyAuthorized);
        // nor does it without a reference
        assert_eq!(resolve(13.0, 0.0, -250.0, None).0, Decision::BuyAuthorized);
    }

    #[test]
    fn test_external_scores_are_capped_and_resolved() {
        let macro_data = BTreeMap::new();
        let flow = ParticipantFlow {
            foreign: -300.0,
            institutional: 0.0,
            retail: 0.0,
        };
        let input = inputs(InstrumentKind::IndexFuture, Some(&flow), &macro_data);
        let external = ExternalScore {
            bull_power: 22.0,
            bear_power: 1.0,
        };

        let score = scorer().score_external(&external, &input, monday_local(10, 0));
        assert_eq!(score.bull_power, MAX_POWER);
        assert_eq!(score.status, Decision::CriticalDivergence);

        let closed = scorer().score_external(&external, &input, saturday());
        assert_eq!(closed.status, Decision::Wait);
        assert_eq!(closed.market_status, MarketStatus::Closed);
    }

    #[test]
    fn test_same_inputs_serialize_identically() {
        let macro_data: BTreeMap<String, IndicatorValue> =
            [("DXY".to_string(), macro_value(-0.25))].into_iter().collect();
        let flow = ParticipantFlow {
            foreign: 730.0,
            institutional: -120.0,
            retail: 90.0,
        };
        let input = inputs(InstrumentKind::IndexFuture, Some(&flow), &macro_data);
        let now = monday_local(12, 0);

        let first = serde_json::to_string(&scorer().score(&input, now)).unwrap();
        let second = serde_json::to_string(&scorer().score(&input, now)).unwrap();
        assert_eq!(first, second);

        let json: serde_json::Value = serde_json::from_str(&first).unwrap();
        assert_eq!(json["max_score"], 15.0);
        assert_eq!(json["status"], "WAIT");
        assert_eq!(json["market_status"], "OPEN");
        assert!(json["details"].is_array());
    }
}
