//! Wall-clock source shared by the token engine and the user-info path.

use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use time::OffsetDateTime;

pub trait Clock: Send + Sync {
    fn now(&self) -> OffsetDateTime;
}

/// The system UTC clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// A clock frozen at a given instant. Used to pin expiry boundaries in tests.
#[derive(Clone, Copy)]
pub struct FixedClock(pub OffsetDateTime);

impl FixedClock {
    /// A fixed clock at the given unix timestamp (seconds).
    pub fn at_unix(seconds: i64) -> Self {
        FixedClock(OffsetDateTime::from_unix_timestamp(seconds).unwrap_or(OffsetDateTime::UNIX_EPOCH))
    }
}

impl fmt::Debug for FixedClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FixedClock({})", self.0.unix_timestamp())
    }
}

impl Clock for FixedClock {
    fn now(&self) -> OffsetDateTime {
        self.0
    }
}

/// A clock that only moves when told to, in whole seconds.
#[derive(Debug, Default)]
pub struct ManualClock(AtomicI64);

impl ManualClock {
    pub fn at_unix(seconds: i64) -> Self {
        ManualClock(AtomicI64::new(seconds))
    }

    pub fn set_unix(&self, seconds: i64) {
        self.0.store(seconds, Ordering::SeqCst);
    }

    pub fn advance(&self, seconds: i64) {
        self.0.fetch_add(seconds, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(self.0.load(Ordering::SeqCst))
            .unwrap_or(OffsetDateTime::UNIX_EPOCH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_moves_on_request() {
        let clock = ManualClock::at_unix(100);
        assert_eq!(clock.now().unix_timestamp(), 100);
        clock.advance(5);
        assert_eq!(clock.now().unix_timestamp(), 105);
        clock.set_unix(7);
        assert_eq!(clock.now().unix_timestamp(), 7);
    }

    #[test]
    fn fixed_clock_is_stable() {
        let clock = FixedClock::at_unix(1_700_000_000);
        assert_eq!(clock.now(), clock.now());
        assert_eq!(clock.now().unix_timestamp(), 1_700_000_000);
    }

    #[test]
    fn system_clock_moves_forward() {
        let a = SystemClock.now();
        let b = SystemClock.now();
        assert!(b >= a);
    }
}
