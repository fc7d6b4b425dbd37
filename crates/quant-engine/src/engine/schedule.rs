//! Loop identities and their cadence.

use config::{LoopScheduleConfig, ScheduleConfig};
use rand::Rng;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoopKind {
    Macro,
    Calendar,
    Global,
    History,
    Primary,
}

impl LoopKind {
    pub const ALL: [LoopKind; 5] = [
        LoopKind::Macro,
        LoopKind::Calendar,
        LoopKind::Global,
        LoopKind::History,
        LoopKind::Primary,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            LoopKind::Macro => "macro",
            LoopKind::Calendar => "calendar",
            LoopKind::Global => "global",
            LoopKind::History => "history",
            LoopKind::Primary => "primary",
        }
    }
}

/// Uniform random extra delay in `[jitter_min, jitter_max]` seconds.
pub fn jitter(schedule: &LoopScheduleConfig) -> Duration {
    let (min, max) = (schedule.jitter_min_seconds, schedule.jitter_max_seconds);
    if max <= min {
        return Duration::from_secs(min);
    }
    let secs = rand::thread_rng().gen_range(min as f64..=max as f64);
    Duration::from_secs_f64(secs)
}

/// Delay before the next successful iteration of `kind`.
pub fn next_delay(schedule: &ScheduleConfig, kind: LoopKind) -> Duration {
    let loop_schedule = match kind {
        LoopKind::Primary => return Duration::from_millis(schedule.primary_interval_ms),
        LoopKind::Macro => &schedule.macro_loop,
        LoopKind::Calendar => &schedule.calendar,
        LoopKind::Global => &schedule.global,
        LoopKind::History => &schedule.history,
    };
    Duration::from_secs(loop_schedule.interval_seconds) + jitter(loop_schedule)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jitter_stays_in_bounds() {
        let schedule = LoopScheduleConfig::new(300, 10, 30);
        for _ in 0..1_000 {
            let extra = jitter(&schedule);
            assert!(extra >= Duration::from_secs(10) && extra <= Duration::from_secs(30));
        }
    }

    #[test]
    fn test_default_cadences() {
        let schedule = ScheduleConfig::default();
        assert_eq!(next_delay(&schedule, LoopKind::Primary), Duration::from_secs(1));
        assert_eq!(next_delay(&schedule, LoopKind::History), Duration::from_secs(300));

        let calendar = next_delay(&schedule, LoopKind::Calendar);
        assert!(calendar >= Duration::from_secs(65) && calendar <= Duration::from_secs(75));

        let global = next_delay(&schedule, LoopKind::Global);
        assert!(global >= Duration::from_secs(130) && global <= Duration::from_secs(150));
    }
}
