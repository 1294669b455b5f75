//! # Fix Time Reconciliation
//!
//! Providers may stamp fixes with a boot-relative monotonic reading instead
//! of wall-clock time. The collector expects Unix seconds, so the boot time
//! is derived from the two clocks at the moment each fix is converted.

use std::time::{Duration, Instant};

use tracing::warn;

use super::types::FixTime;

/// Source of the two clock readings needed to place a fix in wall time
pub trait Clock: Send + Sync {
    /// Current wall-clock time in milliseconds since the Unix epoch
    fn wall_clock_millis(&self) -> i64;

    /// Current monotonic time in milliseconds since boot
    fn since_boot_millis(&self) -> i64;
}

/// Clock backed by the host's real-time and boot clocks
///
/// "Since boot" is `CLOCK_BOOTTIME` on Linux and Android (it keeps counting
/// through suspend, like the provider timestamps it is paired with) and
/// `CLOCK_MONOTONIC` on other Unix hosts. If the host clock cannot be read,
/// the time since this clock was created is used instead.
#[derive(Debug, Clone)]
pub struct SystemClock {
    created: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self { created: Instant::now() }
    }

    /// Boot-relative reading for "now", in the format providers emit
    pub fn since_boot_nanos(&self) -> u64 {
        self.since_boot().as_nanos() as u64
    }

    fn since_boot(&self) -> Duration {
        match host_boot_clock() {
            Some(elapsed) => elapsed,
            None => self.created.elapsed(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn wall_clock_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    fn since_boot_millis(&self) -> i64 {
        self.since_boot().as_millis() as i64
    }
}

#[cfg(unix)]
fn host_boot_clock() -> Option<Duration> {
    use nix::time::{clock_gettime, ClockId};

    #[cfg(any(target_os = "linux", target_os = "android"))]
    let clock = ClockId::CLOCK_BOOTTIME;
    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    let clock = ClockId::CLOCK_MONOTONIC;

    match clock_gettime(clock) {
        Ok(now) => Some(Duration::new(now.tv_sec() as u64, now.tv_nsec() as u32)),
        Err(e) => {
            warn!("Cannot read host boot clock ({}), timing from process start", e);
            None
        }
    }
}

#[cfg(not(unix))]
fn host_boot_clock() -> Option<Duration> {
    None
}

/// Convert a fix time into whole Unix seconds
///
/// Boot-relative times are placed with
/// `(now_wall - now_monotonic) + fix_offset`. Both readings are taken on
/// every call; the boot instant drifts over long uptimes and is never cached.
///
/// # Examples
///
/// ```
/// use fix_relay::fix::clock::{reconcile_timestamp, SystemClock};
/// use fix_relay::fix::FixTime;
///
/// let clock = SystemClock::new();
/// let secs = reconcile_timestamp(&clock, FixTime::WallClockMillis(1_700_000_000_999));
/// assert_eq!(secs, 1_700_000_000);
/// ```
pub fn reconcile_timestamp(clock: &dyn Clock, time: FixTime) -> i64 {
    let wall_millis = match time {
        FixTime::WallClockMillis(millis) => millis,
        FixTime::SinceBootNanos(nanos) => {
            let boot_millis = clock.wall_clock_millis() - clock.since_boot_millis();
            boot_millis + (nanos / 1_000_000) as i64
        }
    };

    wall_millis.div_euclid(1000)
}

#[cfg(test)]
pub(crate) mod mocks {
    use super::*;
    use std::sync::atomic::{AtomicI64, Ordering};

    /// Clock with hand-set readings
    pub struct FixedClock {
        pub wall_millis: AtomicI64,
        pub boot_millis: AtomicI64,
    }

    impl FixedClock {
        pub fn new(wall_millis: i64, boot_millis: i64) -> Self {
            Self {
                wall_millis: AtomicI64::new(wall_millis),
                boot_millis: AtomicI64::new(boot_millis),
            }
        }

        pub fn set(&self, wall_millis: i64, boot_millis: i64) {
            self.wall_millis.store(wall_millis, Ordering::SeqCst);
            self.boot_millis.store(boot_millis, Ordering::SeqCst);
        }
    }

    impl Clock for FixedClock {
        fn wall_clock_millis(&self) -> i64 {
            self.wall_millis.load(Ordering::SeqCst)
        }

        fn since_boot_millis(&self) -> i64 {
            self.boot_millis.load(Ordering::SeqCst)
        }
    }
}
