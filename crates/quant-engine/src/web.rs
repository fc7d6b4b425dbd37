//! Web source capability and the HTTP adapter.
//!
//! Locators are URLs. Quote APIs answer JSON, quote pages and the economic
//! calendar answer HTML which is read with a handful of anchored patterns.

use crate::error::SourceError;
use crate::types::{CalendarEvent, IndicatorValue};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use std::time::Duration;
use tracing::{debug, instrument, warn};

#[async_trait]
pub trait WebSource: Send + Sync {
    /// Fetch the current value of a named indicator.
    async fn fetch_indicator(&self, name: &str, locator: &str) -> Result<IndicatorValue, SourceError>;

    /// Fetch the full, unfiltered event list of a calendar page.
    async fn fetch_calendar(&self, locator: &str) -> Result<Vec<CalendarEvent>, SourceError>;
}

pub struct HttpWebSource {
    client: reqwest::Client,
}

impl HttpWebSource {
    pub fn new(timeout: Duration) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SourceError::Request {
                target: "http client".to_string(),
                message: e.to_string(),
            })?;
        Ok(Self { client })
    }

    async fn get_text(&self, target: &str, locator: &str) -> Result<String, SourceError> {
        let response = self
            .client
            .get(locator)
            .send()
            .await
            .map_err(|e| SourceError::Request {
                target: target.to_string(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Unavailable {
                target: target.to_string(),
                status: status.as_u16(),
            });
        }

        response.text().await.map_err(|e| SourceError::Request {
            target: target.to_string(),
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl WebSource for HttpWebSource {
    #[instrument(skip(self, locator))]
    async fn fetch_indicator(&self, name: &str, locator: &str) -> Result<IndicatorValue, SourceError> {
        let body = self.get_text(name, locator).await?;
        let now = Utc::now();
        let value = if body.trim_start().starts_with('{') {
            parse_quote_api(name, &body, now)?
        } else {
            parse_quote_page(name, &body, now)?
        };
        debug!(name, value = value.value, pct = value.percent_change, "Indicator fetched");
        Ok(value)
    }

    #[instrument(skip(self, locator))]
    async fn fetch_calendar(&self, locator: &str) -> Result<Vec<CalendarEvent>, SourceError> {
        let body = self.get_text("calendar", locator).await?;
        parse_calendar_page(&body)
    }
}

/// Parse a number written in the local convention ("1.234,56").
///
/// Strings without a decimal comma are read as plain decimals.
pub fn parse_local_number(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, '%' | '(' | ')' | '+' | ' ' | '\u{a0}'))
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    let normalized = if cleaned.contains(',') {
        cleaned.replace('.', "").replace(',', ".")
    } else {
        cleaned
    };
    normalized.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Quote APIs shaped like `{"USDBRL": {"bid": "5.43", "pctChange": "0.12", "varBid": "0.0065"}}`.
pub fn parse_quote_api(name: &str, body: &str, now: DateTime<Utc>) -> Result<IndicatorValue, SourceError> {
    let doc: serde_json::Value = serde_json::from_str(body).map_err(|e| SourceError::parse(name, e))?;
    let item = doc
        .as_object()
        .and_then(|pairs| pairs.values().next())
        .ok_or_else(|| SourceError::parse(name, "empty quote document"))?;

    let field = |key: &str| -> Option<f64> {
        match item.get(key)? {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    };

    let price = field("bid").ok_or_else(|| SourceError::parse(name, "missing bid"))?;
    let percent = field("pctChange").unwrap_or(0.0);
    let change = field("varBid").unwrap_or(0.0);
    Ok(IndicatorValue::new(price, change, percent, now))
}

fn strip_tags(fragment: &str) -> Result<String, regex::Error> {
    let tags = Regex::new(r"<[^>]*>")?;
    let text = tags.replace_all(fragment, "");
    Ok(text.replace("&nbsp;", " ").replace("&amp;", "&").trim().to_string())
}

fn data_test_text(html: &str, attr: &str) -> Result<Option<String>, regex::Error> {
    let pattern = format!(
        r#"(?s)data-test="{}"[^>]*>(.*?)</(?:span|div)>"#,
        regex::escape(attr)
    );
    let re = Regex::new(&pattern)?;
    match re.captures(html).and_then(|caps| caps.get(1)) {
        Some(m) => Ok(Some(strip_tags(m.as_str())?)),
        None => Ok(None),
    }
}

/// Quote pages exposing `data-test` price and percent-change attributes.
///
/// The absolute change is derived from price and percent.
pub fn parse_quote_page(name: &str, html: &str, now: DateTime<Utc>) -> Result<IndicatorValue, SourceError> {
    let price_text = match data_test_text(html, "instrument-price-last").map_err(|e| SourceError::parse(name, e))? {
        Some(text) => text,
        None => data_test_text(html, "instrument-header-last-price")
            .map_err(|e| SourceError::parse(name, e))?
            .ok_or_else(|| SourceError::parse(name, "price element not found"))?,
    };
    let price = parse_local_number(&price_text)
        .ok_or_else(|| SourceError::parse(name, format!("unreadable price '{}'", price_text)))?;

    let percent = data_test_text(html, "instrument-price-change-percent")
        .map_err(|e| SourceError::parse(name, e))?
        .and_then(|text| parse_local_number(&text))
        .unwrap_or_else(|| {
            warn!(name, "Percent change not found, using 0");
            0.0
        });

    Ok(IndicatorValue::new(price, price * percent / 100.0, percent, now))
}

fn cell_text(row: &str, class: &str) -> Result<Option<String>, regex::Error> {
    let pattern = format!(
        r#"(?s)<td[^>]*class="[^"]*\b{}\b[^"]*"[^>]*>(.*?)</td>"#,
        regex::escape(class)
    );
    let re = Regex::new(&pattern)?;
    Ok(re.captures(row).and_then(|caps| caps.get(1)).map(|m| m.as_str().to_string()))
}

/// Read every `js-event-item` row of the calendar table.
///
/// Impact is the number of full bull icons in the sentiment cell. Rows that
/// lack a time or currency are dropped.
pub fn parse_calendar_page(html: &str) -> Result<Vec<CalendarEvent>, SourceError> {
    let wrap = |e: regex::Error| SourceError::parse("calendar", e);
    let rows = Regex::new(r#"(?s)<tr[^>]*class="[^"]*js-event-item[^"]*"[^>]*>(.*?)</tr>"#).map_err(wrap)?;
    let anchor = Regex::new(r"(?s)<a[^>]*>(.*?)</a>").map_err(wrap)?;

    let mut events = Vec::new();
    for caps in rows.captures_iter(html) {
        let Some(row) = caps.get(1).map(|m| m.as_str()) else {
            continue;
        };

        let text = |class: &str| -> Result<String, SourceError> {
            match cell_text(row, class).map_err(wrap)? {
                Some(cell) => strip_tags(&cell).map_err(wrap),
                None => Ok(String::new()),
            }
        };

        let time = text("time")?;
        let currency = text("flagCur")?;
        if time.is_empty() || currency.is_empty() {
            continue;
        }

        let impact = cell_text(row, "sentiment")
            .map_err(wrap)?
            .map(|cell| cell.matches("grayFullBullishIcon").count())
            .unwrap_or(0);

        let event = match cell_text(row, "event").map_err(wrap)? {
            Some(cell) => match anchor.captures(&cell).and_then(|c| c.get(1)) {
                Some(m) => strip_tags(m.as_str()).map_err(wrap)?,
                None => strip_tags(&cell).map_err(wrap)?,
            },
            None => String::new(),
        };

        events.push(CalendarEvent {
            time,
            currency,
            impact: impact.min(u8::MAX as usize) as u8,
            event,
            actual: text("act")?,
            forecast: text("fore")?,
            previous: text("prev")?,
        });
    }

    debug!(count = events.len(), "Calendar rows parsed");
    Ok(events)
}
