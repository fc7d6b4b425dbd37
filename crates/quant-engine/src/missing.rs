//! Detection of symbols the realtime feed failed to deliver.

use std::collections::BTreeSet;

/// `expected - present`
pub fn missing_symbols<'a, I>(expected: I, present: &BTreeSet<String>) -> BTreeSet<String>
where
    I: IntoIterator<Item = &'a String>,
{
    expected
        .into_iter()
        .filter(|symbol| !present.contains(*symbol))
        .cloned()
        .collect()
}

/// Latest missing set plus the one before it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MissingTracker {
    pub current: BTreeSet<String>,
    pub previous: BTreeSet<String>,
}

impl MissingTracker {
    /// Tracker after one more primary cycle.
    pub fn advanced(&self, current: BTreeSet<String>) -> Self {
        Self {
            previous: self.current.clone(),
            current,
        }
    }

    /// Symbols that went missing this cycle.
    pub fn newly_missing(&self) -> impl Iterator<Item = &String> {
        self.current.difference(&self.previous)
    }

    /// Symbols the feed delivered again this cycle.
    pub fn recovered(&self) -> impl Iterator<Item = &String> {
        self.previous.difference(&self.current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_difference_and_idempotence() {
        let expected: Vec<String> = ["VALE3", "PETR4", "ITUB4", "BBAS3"].iter().map(|s| s.to_string()).collect();
        let present = set(&["VALE3", "ITUB4", "WIN$N"]);

        let first = missing_symbols(&expected, &present);
        let second = missing_symbols(&expected, &present);
        assert_eq!(first, set(&["BBAS3", "PETR4"]));
        assert_eq!(first, second);

        assert!(missing_symbols(&expected, &set(&["VALE3", "PETR4", "ITUB4", "BBAS3"])).is_empty());
    }

    #[test]
    fn test_tracker_keeps_previous_cycle() {
        let tracker = MissingTracker::default()
            .advanced(set(&["PETR4"]))
            .advanced(set(&["BBAS3"]));

        assert_eq!(tracker.previous, set(&["PETR4"]));
        assert_eq!(tracker.current, set(&["BBAS3"]));
        assert_eq!(tracker.newly_missing().cloned().collect::<Vec<_>>(), vec!["BBAS3".to_string()]);
        assert_eq!(tracker.recovered().cloned().collect::<Vec<_>>(), vec!["PETR4".to_string()]);
    }
}
