//! Date utilities.
//!
//! Due checks compare calendar days in the local time zone; the time of day
//! is ignored. All instants are stored as UTC.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Local, NaiveDate, NaiveTime, TimeZone, Utc};

/// Source of the current instant.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to. Clones share the same instant.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn set(&self, instant: DateTime<Utc>) {
        *self.lock() = instant;
    }

    pub fn advance(&self, by: std::time::Duration) {
        let by = Duration::from_std(by).unwrap_or(Duration::MAX);
        let mut now = self.lock();
        *now = now.checked_add_signed(by).unwrap_or(*now);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, DateTime<Utc>> {
        // The guarded value is a plain timestamp; a poisoned lock still holds a valid one.
        self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.lock()
    }
}

/// The local calendar day an instant falls on.
pub fn local_day(instant: DateTime<Utc>) -> NaiveDate {
    instant.with_timezone(&Local).date_naive()
}

/// The first instant of a local calendar day.
pub fn start_of_day(day: NaiveDate) -> DateTime<Utc> {
    let midnight = day.and_time(NaiveTime::MIN);
    Local
        .from_local_datetime(&midnight)
        .earliest()
        // Midnight can fall inside a DST gap; the day then starts an hour later.
        .or_else(|| {
            Local
                .from_local_datetime(&(midnight + Duration::hours(1)))
                .earliest()
        })
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&midnight))
}

/// Today, normalized to local start of day.
pub fn todays_date(clock: &dyn Clock) -> DateTime<Utc> {
    start_of_day(local_day(clock.now()))
}

/// Start of the local day `days` days away from the day `date` falls on.
///
/// Returns `None` when the target day is outside the calendar chrono can
/// represent.
pub fn change_date(date: DateTime<Utc>, days: i64) -> Option<DateTime<Utc>> {
    let offset = Duration::try_days(days)?;
    local_day(date).checked_add_signed(offset).map(start_of_day)
}

/// A date is due when its local calendar day is on or before `today`.
pub fn is_due(date: DateTime<Utc>, today: NaiveDate) -> bool {
    local_day(date) <= today
}
