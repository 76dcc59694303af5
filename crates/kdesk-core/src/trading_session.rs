//! Trading session utilities.
//!
//! The cash and F&O segments trade Monday to Friday, 09:15 to 15:30 local
//! exchange time. The check is done on the clock's own offset, so callers
//! decide which wall clock applies by choosing the [`Clock`].

use chrono::{DateTime, Datelike, FixedOffset, Local, TimeZone, Timelike, Weekday};
use parking_lot::Mutex;

/// Market open as HHMM.
pub const MARKET_OPEN_HHMM: u32 = 915;

/// Market close as HHMM (inclusive).
pub const MARKET_CLOSE_HHMM: u32 = 1530;

/// Trait for obtaining current local time, enabling testability.
pub trait Clock: Send + Sync {
    /// Returns the current wall-clock time with its UTC offset.
    fn now(&self) -> DateTime<FixedOffset>;
}

/// System clock implementation using the host's local time zone.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Local::now().fixed_offset()
    }
}

/// Clock pinned to a settable instant.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<FixedOffset>>,
}

impl FixedClock {
    pub fn new(now: DateTime<FixedOffset>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Move the clock to a new instant.
    pub fn set(&self, now: DateTime<FixedOffset>) {
        *self.now.lock() = now;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<FixedOffset> {
        *self.now.lock()
    }
}

/// Time of day as an HHMM integer (e.g. 09:15 -> 915).
#[must_use]
pub fn hhmm<Tz: TimeZone>(dt: &DateTime<Tz>) -> u32 {
    dt.hour() * 100 + dt.minute()
}

/// Check whether the market is open at the given instant.
///
/// True iff the weekday is Monday..Friday and HHMM is within
/// [`MARKET_OPEN_HHMM`, `MARKET_CLOSE_HHMM`] inclusive.
#[must_use]
pub fn is_market_open_at<Tz: TimeZone>(dt: &DateTime<Tz>) -> bool {
    let is_weekday = !matches!(dt.weekday(), Weekday::Sat | Weekday::Sun);
    let now = hhmm(dt);

    is_weekday && (MARKET_OPEN_HHMM..=MARKET_CLOSE_HHMM).contains(&now)
}

/// Check whether the market is open now according to `clock`.
#[must_use]
pub fn is_market_open(clock: &dyn Clock) -> bool {
    is_market_open_at(&clock.now())
}
