//! Alarm patterns and next-occurrence resolution for the DS3231 RTC.
//!
//! The alarm registers hold no year and no month, and any field may be
//! masked. [`AlarmPattern`] is what the registers say; [`AlarmPattern::resolve`]
//! turns it into one concrete timestamp using the current time and the alarm's
//! fired flag:
//!
//! - an alarm that has **not** fired lies in the future, so a candidate in the
//!   past is moved one period forward;
//! - an alarm that **has** fired lies in the past, so a candidate in the future
//!   is moved one period back.
//!
//! The period is one month when a day of month or weekday is set, otherwise
//! one day, hour or minute depending on the coarsest field that is set.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

/// The decoded, unresolved content of an alarm slot.
///
/// Masked fields are `None`. At most one of `day` and `weekday` is set.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct AlarmPattern {
    /// Day of month (1-31)
    pub day: Option<u8>,
    /// Day of week (1-7, 1 = Monday)
    pub weekday: Option<u8>,
    pub hour: Option<u8>,
    pub minute: Option<u8>,
    /// Always `Some(0)` for alarm 2 unless every field is masked
    pub second: Option<u8>,
}

/// Enable and fired flags of one alarm.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct AlarmState {
    /// AxIE bit in the control register
    pub enabled: bool,
    /// AxF bit in the status register
    pub fired: bool,
}

impl AlarmState {
    /// Whether the alarm was armed and has gone off.
    pub fn triggered(&self) -> bool {
        self.enabled && self.fired
    }
}

impl AlarmPattern {
    /// Whether the alarm matches every second (nothing to resolve).
    pub fn every_second(&self) -> bool {
        self.second.is_none()
    }

    /// Resolves the pattern to the occurrence consistent with `state.fired`.
    ///
    /// `now` and the result are in the chip's time base.
    ///
    /// Returns `None` for an every-second pattern and for a pattern whose
    /// values cannot form a date and time (e.g. day 32 or hour 25).
    pub fn resolve(&self, state: AlarmState, now: NaiveDateTime) -> Option<NaiveDateTime> {
        let second = self.second?;
        let fired = state.fired;

        if self.day.is_some() || self.weekday.is_some() {
            let time = time_of_day(
                self.hour.unwrap_or(0),
                self.minute.unwrap_or(0),
                second,
            )?;
            return self.resolve_monthly(time, fired, now);
        }

        let (trial, period) = match (self.hour, self.minute) {
            (Some(hour), minute) => (
                now.date().and_time(time_of_day(hour, minute.unwrap_or(0), second)?),
                Duration::days(1),
            ),
            (None, Some(minute)) => (
                now.date()
                    .and_time(time_of_day(now.hour() as u8, minute, second)?),
                Duration::hours(1),
            ),
            (None, None) => (
                now.date()
                    .and_time(time_of_day(now.hour() as u8, now.minute() as u8, second)?),
                Duration::minutes(1),
            ),
        };

        if now > trial && !fired {
            Some(trial + period)
        } else if now < trial && fired {
            Some(trial - period)
        } else {
            Some(trial)
        }
    }

    fn resolve_monthly(
        &self,
        time: NaiveTime,
        fired: bool,
        mut now: NaiveDateTime,
    ) -> Option<NaiveDateTime> {
        let day = match (self.day, self.weekday) {
            (Some(day), _) => u32::from(day),
            (None, Some(weekday)) => {
                let today = i64::from(now.weekday().number_from_monday());
                now += Duration::days((i64::from(weekday) - today + 7).rem_euclid(7));
                now.day()
            }
            (None, None) => return None,
        };

        // A day past the end of the current month belongs to the previous
        // month once fired, to the next one otherwise.
        let toward_occurrence = if fired { -1 } else { 1 };
        let (year, month, trial) = settle(now.year(), now.month(), day, time, toward_occurrence)?;

        if now > trial && !fired {
            let (year, month) = step_month(year, month, 1);
            settle(year, month, day, time, 1).map(|(_, _, dt)| dt)
        } else if now < trial && fired {
            let (year, month) = step_month(year, month, -1);
            settle(year, month, day, time, -1).map(|(_, _, dt)| dt)
        } else {
            Some(trial)
        }
    }
}

fn time_of_day(hour: u8, minute: u8, second: u8) -> Option<NaiveTime> {
    NaiveTime::from_hms_opt(u32::from(hour), u32::from(minute), u32::from(second))
}

/// Moves `(year, month)` by `delta` months, rolling the year over.
fn step_month(year: i32, month: u32, delta: i32) -> (i32, u32) {
    let index = year * 12 + month as i32 - 1 + delta;
    (index.div_euclid(12), index.rem_euclid(12) as u32 + 1)
}

/// The first month from `(year, month)` on, stepping by `direction`, that
/// has the given day.
fn settle(
    mut year: i32,
    mut month: u32,
    day: u32,
    time: NaiveTime,
    direction: i32,
) -> Option<(i32, u32, NaiveDateTime)> {
    for _ in 0..12 {
        if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
            return Some((year, month, date.and_time(time)));
        }
        (year, month) = step_month(year, month, direction);
    }
    None
}
