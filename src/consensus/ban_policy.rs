//! Ban duration policies.

use std::fmt;
use std::time::Duration;

/// Default ban length for [`FixedBan`].
pub const DEFAULT_BAN_PERIOD: Duration = Duration::from_secs(300);

/// Decides how long a backend stays banned.
pub trait BanPolicy: Send + Sync + fmt::Debug {
    /// Ban length for the `strikes`-th ban of a backend (1-based).
    /// `None` bans until a manual unban.
    fn ban_duration(&self, strikes: u32) -> Option<Duration>;
}

/// Every ban lasts the same time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedBan(pub Duration);

impl Default for FixedBan {
    fn default() -> Self {
        Self(DEFAULT_BAN_PERIOD)
    }
}

impl BanPolicy for FixedBan {
    fn ban_duration(&self, _strikes: u32) -> Option<Duration> {
        Some(self.0)
    }
}

/// Ban length doubles with each strike, capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExponentialBan {
    pub base: Duration,
    pub max: Duration,
}

impl BanPolicy for ExponentialBan {
    fn ban_duration(&self, strikes: u32) -> Option<Duration> {
        let exponent = strikes.saturating_sub(1).min(31);
        let factor = 2u32.saturating_pow(exponent);
        let delay = self.base.saturating_mul(factor);
        Some(delay.min(self.max))
    }
}

/// Bans never expire on their own.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndefiniteBan;

impl BanPolicy for IndefiniteBan {
    fn ban_duration(&self, _strikes: u32) -> Option<Duration> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_ban() {
        let policy = FixedBan::default();
        assert_eq!(policy.ban_duration(1), Some(Duration::from_secs(300)));
        assert_eq!(policy.ban_duration(7), Some(Duration::from_secs(300)));
    }

    #[test]
    fn test_exponential_ban() {
        let policy = ExponentialBan {
            base: Duration::from_secs(10),
            max: Duration::from_secs(100),
        };
        assert_eq!(policy.ban_duration(1), Some(Duration::from_secs(10)));
        assert_eq!(policy.ban_duration(2), Some(Duration::from_secs(20)));
        assert_eq!(policy.ban_duration(3), Some(Duration::from_secs(40)));
        assert_eq!(policy.ban_duration(5), Some(Duration::from_secs(100)));
        assert_eq!(policy.ban_duration(u32::MAX), Some(Duration::from_secs(100)));
    }

    #[test]
    fn test_indefinite_ban() {
        assert_eq!(IndefiniteBan.ban_duration(1), None);
    }
}
