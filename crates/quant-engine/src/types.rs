//! Core data types shared by sources, caches, scorer and snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Latest reading of a price-like indicator.
///
/// Field names follow the dashboard contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorValue {
    #[serde(rename = "valor")]
    pub value: f64,
    #[serde(rename = "var")]
    pub absolute_change: f64,
    #[serde(rename = "var_pct")]
    pub percent_change: f64,
    #[serde(rename = "ajuste", default, skip_serializing_if = "Option::is_none")]
    pub settlement_price: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl IndicatorValue {
    pub fn new(value: f64, absolute_change: f64, percent_change: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            value,
            absolute_change,
            percent_change,
            settlement_price: None,
            timestamp,
        }
    }

    /// Placeholder used to seed caches before the first fetch.
    pub fn zero(timestamp: DateTime<Utc>) -> Self {
        Self::new(0.0, 0.0, 0.0, timestamp)
    }

    pub fn with_settlement(mut self, settlement: f64) -> Self {
        self.settlement_price = Some(settlement);
        self
    }
}

/// Point lookup result from the realtime feed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub last: f64,
    /// Previous session close, the reference for daily change
    #[serde(default)]
    pub session_close: f64,
    #[serde(default)]
    pub settlement: f64,
    #[serde(default)]
    pub vwap: Option<f64>,
}

impl Quote {
    /// A quote counts as present only with a positive last price.
    pub fn is_valid(&self) -> bool {
        self.last.is_finite() && self.last > 0.0
    }

    pub fn percent_change(&self) -> f64 {
        if self.session_close > 0.0 {
            (self.last - self.session_close) / self.session_close * 100.0
        } else {
            0.0
        }
    }

    /// Distance of the last price from the session VWAP, in percent.
    pub fn vwap_distance_pct(&self) -> Option<f64> {
        match self.vwap {
            Some(vwap) if vwap > 0.0 => Some((self.last - vwap) / vwap * 100.0),
            _ => None,
        }
    }

    /// Distance of the last price from the settlement price, in percent.
    pub fn settlement_distance_pct(&self) -> Option<f64> {
        (self.settlement > 0.0).then(|| (self.last - self.settlement) / self.settlement * 100.0)
    }

    pub fn to_indicator(&self, timestamp: DateTime<Utc>) -> IndicatorValue {
        let absolute_change = if self.session_close > 0.0 {
            self.last - self.session_close
        } else {
            0.0
        };
        let indicator = IndicatorValue::new(self.last, absolute_change, self.percent_change(), timestamp);
        if self.settlement > 0.0 {
            indicator.with_settlement(self.settlement)
        } else {
            indicator
        }
    }
}

/// One row of the economic calendar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEvent {
    /// "HH:MM" in exchange local time
    pub time: String,
    pub currency: String,
    /// Number of impact stars (1-3)
    pub impact: u8,
    pub event: String,
    #[serde(default)]
    pub actual: String,
    #[serde(default)]
    pub forecast: String,
    #[serde(default)]
    pub previous: String,
}

impl CalendarEvent {
    pub fn has_actual(&self) -> bool {
        !self.actual.trim().is_empty()
    }
}

/// Signed net contract delta per participant class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ParticipantFlow {
    #[serde(rename = "FOREIGN", default)]
    pub foreign: f64,
    #[serde(rename = "INSTITUTIONAL", default)]
    pub institutional: f64,
    #[serde(rename = "RETAIL", default)]
    pub retail: f64,
}

/// Instrument symbol -> participant flow
pub type FlowState = BTreeMap<String, ParticipantFlow>;

/// OHLCV bar as exported by the terminal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Bar open time, unix seconds
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default)]
    pub tick_volume: u64,
    #[serde(default)]
    pub real_volume: u64,
}

impl Candle {
    /// Exchange volume, or tick volume when the feed reports none.
    pub fn volume(&self) -> u64 {
        if self.real_volume > 0 {
            self.real_volume
        } else {
            self.tick_volume
        }
    }
}

/// Which of the two scored futures an instrument is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstrumentKind {
    IndexFuture,
    CurrencyFuture,
}
