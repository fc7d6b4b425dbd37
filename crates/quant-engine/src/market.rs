//! Market context derived from the feed: breadth, basis, volatility regime
//! and the rolling volume reference used to normalise flow.

use crate::types::{Candle, IndicatorValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Index move (percent) beyond which a weak basket counts as divergence
const DIVERGENCE_INDEX_MOVE: f64 = 0.2;
const STRONG_BREADTH: usize = 7;
const DIVERGENCE_BREADTH: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BreadthSignal {
    BearishDivergence,
    BullishDivergence,
    StrongBuy,
    StrongSell,
    Buy,
    Sell,
    Neutral,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Breadth {
    pub up: usize,
    pub down: usize,
    pub neutral: usize,
    pub signal: BreadthSignal,
    /// Symbol -> percent change, only for symbols with data
    pub details: BTreeMap<String, f64>,
}

impl Breadth {
    pub fn basket_size(&self) -> usize {
        self.up + self.down + self.neutral
    }

    /// (up - down) / basket size, 0 for an empty basket
    pub fn net_fraction(&self) -> f64 {
        match self.basket_size() {
            0 => 0.0,
            size => (self.up as f64 - self.down as f64) / size as f64,
        }
    }
}

/// Count the basket's advancers and decliners. Symbols without data count as neutral.
pub fn compute_breadth(
    basket: &[String],
    values: &BTreeMap<String, IndicatorValue>,
    index_change_pct: f64,
) -> Breadth {
    let mut up = 0;
    let mut down = 0;
    let mut neutral = 0;
    let mut details = BTreeMap::new();

    for symbol in basket {
        match values.get(symbol) {
            Some(value) => {
                let pct = value.percent_change;
                if pct > 0.0 {
                    up += 1;
                } else if pct < 0.0 {
                    down += 1;
                } else {
                    neutral += 1;
                }
                details.insert(symbol.clone(), pct);
            }
            None => neutral += 1,
        }
    }

    let signal = if index_change_pct > DIVERGENCE_INDEX_MOVE && up < DIVERGENCE_BREADTH {
        BreadthSignal::BearishDivergence
    } else if index_change_pct < -DIVERGENCE_INDEX_MOVE && up > DIVERGENCE_BREADTH {
        BreadthSignal::BullishDivergence
    } else if up >= STRONG_BREADTH {
        BreadthSignal::StrongBuy
    } else if down >= STRONG_BREADTH {
        BreadthSignal::StrongSell
    } else if up > down {
        BreadthSignal::Buy
    } else if down > up {
        BreadthSignal::Sell
    } else {
        BreadthSignal::Neutral
    };

    Breadth {
        up,
        down,
        neutral,
        signal,
        details,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BasisInterpretation {
    PremiumHigh,
    PremiumNormal,
    Flat,
    Discount,
    DiscountHigh,
    Neutral,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Basis {
    pub value: f64,
    pub interpretation: BasisInterpretation,
}

/// Index future minus spot index, in points.
pub fn compute_basis(future: Option<f64>, spot: Option<f64>) -> Basis {
    match (future, spot) {
        (Some(future), Some(spot)) if future > 0.0 && spot > 0.0 => {
            let value = future - spot;
            let interpretation = if value > 1500.0 {
                BasisInterpretation::PremiumHigh
            } else if value > 500.0 {
                BasisInterpretation::PremiumNormal
            } else if value < -500.0 {
                BasisInterpretation::DiscountHigh
            } else if value < 0.0 {
                BasisInterpretation::Discount
            } else {
                BasisInterpretation::Flat
            };
            Basis { value, interpretation }
        }
        _ => Basis {
            value: 0.0,
            interpretation: BasisInterpretation::Neutral,
        },
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VolatilityStatus {
    Expansion,
    Normal,
    Contraction,
}

impl VolatilityStatus {
    pub fn implication(&self) -> &'static str {
        match self {
            VolatilityStatus::Expansion => "Ranges widening: favour breakouts, widen stops",
            VolatilityStatus::Normal => "Ranges in line with the monthly average",
            VolatilityStatus::Contraction => "Ranges compressing: expect mean reversion or a squeeze",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolatilityRegime {
    pub status: VolatilityStatus,
    pub ratio: f64,
    pub atr5: f64,
    pub atr20: f64,
    pub implication: String,
}

fn true_ranges(candles: &[Candle]) -> Vec<f64> {
    candles
        .windows(2)
        .map(|pair| {
            let (prev, bar) = (pair[0], pair[1]);
            (bar.high - bar.low)
                .max((bar.high - prev.close).abs())
                .max((bar.low - prev.close).abs())
        })
        .collect()
}

fn mean_tail(values: &[f64], n: usize) -> f64 {
    let tail = &values[values.len() - n..];
    tail.iter().sum::<f64>() / n as f64
}

/// ATR(5) / ATR(20) over daily candles (oldest first). Needs 21 candles.
pub fn compute_volatility(candles: &[Candle]) -> Option<VolatilityRegime> {
    if candles.len() < 21 {
        return None;
    }
    let ranges = true_ranges(candles);
    let atr5 = mean_tail(&ranges, 5);
    let atr20 = mean_tail(&ranges, 20);
    if atr20 <= 0.0 {
        return None;
    }

    let ratio = atr5 / atr20;
    let status = if ratio > 1.2 {
        VolatilityStatus::Expansion
    } else if ratio < 0.8 {
        VolatilityStatus::Contraction
    } else {
        VolatilityStatus::Normal
    };

    Some(VolatilityRegime {
        status,
        ratio,
        atr5,
        atr20,
        implication: status.implication().to_string(),
    })
}

/// Mean daily volume of the last `lookback` candles.
pub fn volume_reference(candles: &[Candle], lookback: usize) -> Option<f64> {
    let take = candles.len().min(lookback);
    if take == 0 {
        return None;
    }
    let total: u64 = candles[candles.len() - take..].iter().map(Candle::volume).sum();
    let mean = total as f64 / take as f64;
    (mean > 0.0).then_some(mean)
}
