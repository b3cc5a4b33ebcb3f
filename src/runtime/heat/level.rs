use std::fmt;

use serde::{Deserialize, Serialize};

/// Classification of an operation key by cumulative call count.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HeatLevel {
    #[default]
    Cold,
    Warm,
    Hot,
    Critical,
}

impl HeatLevel {
    /// HOT and CRITICAL operations protect their source module from unload.
    pub fn is_hot(self) -> bool {
        self >= Self::Hot
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cold => "COLD",
            Self::Warm => "WARM",
            Self::Hot => "HOT",
            Self::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for HeatLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Call-count boundaries between heat levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeatThresholds {
    pub warm: u64,
    pub hot: u64,
    pub critical: u64,
}

impl HeatThresholds {
    pub const fn new(warm: u64, hot: u64, critical: u64) -> Self {
        Self {
            warm,
            hot,
            critical,
        }
    }

    /// The level for a call count. Depends on nothing but `call_count`.
    pub fn level_for(&self, call_count: u64) -> HeatLevel {
        if call_count >= self.critical {
            HeatLevel::Critical
        } else if call_count >= self.hot {
            HeatLevel::Hot
        } else if call_count >= self.warm {
            HeatLevel::Warm
        } else {
            HeatLevel::Cold
        }
    }

    /// Smallest call count classified at `level`.
    pub fn floor_of(&self, level: HeatLevel) -> u64 {
        match level {
            HeatLevel::Cold => 0,
            HeatLevel::Warm => self.warm,
            HeatLevel::Hot => self.hot,
            HeatLevel::Critical => self.critical,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.warm > 0 && self.warm < self.hot && self.hot < self.critical
    }
}

impl Default for HeatThresholds {
    fn default() -> Self {
        Self::new(5, 20, 100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_is_monotonic_in_call_count() {
        let thresholds = HeatThresholds::default();
        let mut previous = HeatLevel::Cold;
        for count in 0..250 {
            let level = thresholds.level_for(count);
            assert!(level >= previous, "level dropped at count {count}");
            previous = level;
        }
    }

    #[test]
    fn boundaries_match_defaults() {
        let thresholds = HeatThresholds::default();
        assert_eq!(thresholds.level_for(4), HeatLevel::Cold);
        assert_eq!(thresholds.level_for(5), HeatLevel::Warm);
        assert_eq!(thresholds.level_for(19), HeatLevel::Warm);
        assert_eq!(thresholds.level_for(20), HeatLevel::Hot);
        assert_eq!(thresholds.level_for(100), HeatLevel::Critical);
    }

    #[test]
    fn floor_round_trips_through_level_for() {
        let thresholds = HeatThresholds::new(2, 3, 10);
        for level in [HeatLevel::Cold, HeatLevel::Warm, HeatLevel::Hot, HeatLevel::Critical] {
            assert_eq!(thresholds.level_for(thresholds.floor_of(level)), level);
        }
    }

    #[test]
    fn rejects_unordered_thresholds() {
        assert!(!HeatThresholds::new(0, 20, 100).is_valid());
        assert!(!HeatThresholds::new(20, 20, 100).is_valid());
        assert!(!HeatThresholds::new(5, 200, 100).is_valid());
        assert!(HeatThresholds::default().is_valid());
    }
}
