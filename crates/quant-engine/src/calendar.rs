//! Smart polling for the economic calendar.
//!
//! The calendar page is expensive and rate limited, so it is only fetched
//! when there is nothing cached yet or when a high-impact release that
//! happened in the last half hour still shows no actual figure.

use crate::types::CalendarEvent;
use chrono::{Duration, NaiveDateTime, NaiveTime};

/// Minimum impact for an event to trigger a refetch
pub const RELEASE_IMPACT: u8 = 3;

/// How far back a release without an actual still triggers a refetch
pub const RELEASE_WINDOW_MINUTES: i64 = 30;

/// Decide whether the calendar should be fetched at `now_local`.
///
/// Event times that do not parse as "HH:MM" ("All Day", "Tentative") are
/// ignored. Both ends of the window are inclusive.
pub fn should_fetch(events: &[CalendarEvent], now_local: NaiveDateTime) -> bool {
    if events.is_empty() {
        return true;
    }

    let window = Duration::minutes(RELEASE_WINDOW_MINUTES);
    events.iter().any(|event| {
        if event.impact < RELEASE_IMPACT || event.has_actual() {
            return false;
        }
        let Ok(time) = NaiveTime::parse_from_str(event.time.trim(), "%H:%M") else {
            return false;
        };
        let elapsed = now_local - now_local.date().and_time(time);
        elapsed >= Duration::zero() && elapsed <= window
    })
}

/// Keep events in the wanted currencies with at least `min_impact` stars.
pub fn filter_events(events: Vec<CalendarEvent>, currencies: &[String], min_impact: u8) -> Vec<CalendarEvent> {
    events
        .into_iter()
        .filter(|e| e.impact >= min_impact && currencies.iter().any(|c| c == &e.currency))
        .collect()
}
