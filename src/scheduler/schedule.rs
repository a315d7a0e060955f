//! Decaying poll schedule applied after a campaign starts calling.

use crate::config::ScheduleConfig;
use std::time::Duration;

/// One schedule tier: poll every `interval` until `until` has elapsed
/// since calling started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollTier {
    /// Gap between polls.
    pub interval: Duration,
    /// Elapsed time at which the tier ends.
    pub until: Duration,
}

/// Poll offsets for one campaign plus the coarse sweep interval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollSchedule {
    tiers: Vec<PollTier>,
    sweep_interval: Duration,
    max_one_shot_polls: u32,
}

impl PollSchedule {
    /// Creates a schedule.
    #[must_use]
    pub const fn new(tiers: Vec<PollTier>, sweep_interval: Duration, max_one_shot_polls: u32) -> Self {
        Self {
            tiers,
            sweep_interval,
            max_one_shot_polls,
        }
    }

    /// Builds the schedule from configuration.
    #[must_use]
    pub fn from_config(config: &ScheduleConfig) -> Self {
        let tiers = config
            .tiers
            .iter()
            .map(|tier| PollTier {
                interval: Duration::from_secs(tier.interval_secs),
                until: Duration::from_secs(tier.until_secs),
            })
            .collect();
        Self::new(
            tiers,
            Duration::from_secs(config.sweep_interval_secs),
            config.max_one_shot_polls,
        )
    }

    /// Returns the interval of the recurring sweep.
    #[must_use]
    pub const fn sweep_interval(&self) -> Duration {
        self.sweep_interval
    }

    /// Returns the delays, measured from calling start, at which one-shot
    /// polls run.
    ///
    /// Offsets walk each tier in turn and stop at the one-shot ceiling;
    /// tiers ending before the previous tier's last offset are skipped.
    /// Zero intervals end the walk.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    /// use outcall::scheduler::{PollSchedule, PollTier};
    ///
    /// let schedule = PollSchedule::new(
    ///     vec![PollTier { interval: Duration::from_secs(10), until: Duration::from_secs(30) }],
    ///     Duration::from_secs(300),
    ///     40,
    /// );
    /// assert_eq!(
    ///     schedule.one_shot_offsets(),
    ///     vec![Duration::from_secs(10), Duration::from_secs(20), Duration::from_secs(30)],
    /// );
    /// ```
    #[must_use]
    pub fn one_shot_offsets(&self) -> Vec<Duration> {
        let ceiling = usize::try_from(self.max_one_shot_polls).unwrap_or(usize::MAX);
        let mut offsets = Vec::new();
        let mut elapsed = Duration::ZERO;
        for tier in &self.tiers {
            if tier.interval.is_zero() {
                break;
            }
            while elapsed + tier.interval <= tier.until {
                if offsets.len() >= ceiling {
                    return offsets;
                }
                elapsed += tier.interval;
                offsets.push(elapsed);
            }
        }
        offsets
    }
}
