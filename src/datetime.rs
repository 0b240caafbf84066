//! Date and time values exchanged with the DS3231 clock registers.
//!
//! [`RegisterTime`] is the decoded content of the seven timekeeping
//! registers, [`TimeFields`] is a partial update of them. [`TimeBase`] and
//! [`convert`] move naive timestamps between the chip's representation (UTC or
//! local wall clock) and the host's local time.
//!
//! # Error Handling
//!
//! Out-of-range writes are reported via [`RangeError`] before the bus is used.

use chrono::{
    Datelike, Duration, Local, LocalResult, NaiveDate, NaiveDateTime, TimeZone, Timelike, Utc,
};

use crate::bcd;
use crate::registers::{
    RegAddr, HOURS_MASK, HOURS_QUIRK_RAW, HOURS_QUIRK_SUBSTITUTE, MONTH_MASK, SECONDS_MASK,
};

/// The representation a naive timestamp is expressed in.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TimeBase {
    /// Coordinated universal time.
    Utc,
    /// The host's local wall clock.
    Local,
}

impl TimeBase {
    /// The current time in this representation.
    pub fn now(self) -> NaiveDateTime {
        match self {
            TimeBase::Utc => Utc::now().naive_utc(),
            TimeBase::Local => Local::now().naive_local(),
        }
    }
}

/// Converts `datetime` from the `from` representation to the `to` one.
///
/// The host's local timezone rule at the converted instant is used. A local
/// time that is repeated by a DST change maps to its earlier instant; one
/// skipped by a DST change is shifted by the offset in effect at that UTC
/// reading.
pub fn convert(datetime: NaiveDateTime, from: TimeBase, to: TimeBase) -> NaiveDateTime {
    match (from, to) {
        (TimeBase::Utc, TimeBase::Local) => Local.from_utc_datetime(&datetime).naive_local(),
        (TimeBase::Local, TimeBase::Utc) => match Local.from_local_datetime(&datetime) {
            LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => dt.naive_utc(),
            LocalResult::None => {
                let offset = Local.offset_from_utc_datetime(&datetime).local_minus_utc();
                datetime - Duration::seconds(i64::from(offset))
            }
        },
        _ => datetime,
    }
}

/// Decoded content of the seconds..year registers.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RegisterTime {
    /// Years since 2000 (0-99)
    pub year: u8,
    /// Month (1-12)
    pub month: u8,
    /// Day of month (1-31)
    pub day_of_month: u8,
    /// Day of week (1-7), 1 being Monday when written by this crate
    pub day_of_week: u8,
    /// Hour (0-23)
    pub hour: u8,
    /// Minute (0-59)
    pub minute: u8,
    /// Second (0-59)
    pub second: u8,
}

impl RegisterTime {
    /// Builds the calendar timestamp, or `None` if the registers do not hold
    /// a valid date and time.
    pub fn to_datetime(&self) -> Option<NaiveDateTime> {
        NaiveDate::from_ymd_opt(
            2000 + i32::from(self.year),
            u32::from(self.month),
            u32::from(self.day_of_month),
        )
        .and_then(|d| {
            d.and_hms_opt(
                u32::from(self.hour),
                u32::from(self.minute),
                u32::from(self.second),
            )
        })
    }
}

impl From<[u8; 7]> for RegisterTime {
    /// Decodes the raw registers starting at [`RegAddr::Seconds`].
    fn from(data: [u8; 7]) -> Self {
        let hours = if data[2] == HOURS_QUIRK_RAW {
            HOURS_QUIRK_SUBSTITUTE
        } else {
            data[2]
        };
        RegisterTime {
            second: bcd::decode(data[0] & SECONDS_MASK),
            minute: bcd::decode(data[1]),
            hour: bcd::decode(hours & HOURS_MASK),
            day_of_week: bcd::decode(data[3]),
            day_of_month: bcd::decode(data[4]),
            month: bcd::decode(data[5] & MONTH_MASK),
            year: bcd::decode(data[6]),
        }
    }
}

/// A partial update of the timekeeping registers.
///
/// Fields left as `None` are not written and keep their value on the chip.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct TimeFields {
    pub second: Option<u8>,
    pub minute: Option<u8>,
    pub hour: Option<u8>,
    pub day_of_week: Option<u8>,
    pub day_of_month: Option<u8>,
    pub month: Option<u8>,
    pub year: Option<u8>,
}

impl TimeFields {
    /// Every field of `datetime`, with the ISO day of week and the year modulo 100.
    pub fn from_datetime(datetime: &NaiveDateTime) -> Self {
        TimeFields {
            second: Some(datetime.second() as u8),
            minute: Some(datetime.minute() as u8),
            hour: Some(datetime.hour() as u8),
            day_of_week: Some(datetime.weekday().number_from_monday() as u8),
            day_of_month: Some(datetime.day() as u8),
            month: Some(datetime.month() as u8),
            year: Some(datetime.year().rem_euclid(100) as u8),
        }
    }

    /// Checks every present field and returns the register writes in the
    /// order they are issued.
    ///
    /// # Errors
    ///
    /// Returns the first field outside its range; nothing is encoded then.
    pub fn encode(&self) -> Result<Vec<(RegAddr, u8)>, RangeError> {
        let fields = [
            (self.second, RegAddr::Seconds, "seconds", 0, 59),
            (self.minute, RegAddr::Minutes, "minutes", 0, 59),
            (self.hour, RegAddr::Hours, "hours", 0, 23),
            (self.year, RegAddr::Year, "year", 0, 99),
            (self.month, RegAddr::Month, "month", 1, 12),
            (self.day_of_month, RegAddr::Date, "day_of_month", 1, 31),
            (self.day_of_week, RegAddr::Day, "day_of_week", 1, 7),
        ];
        let mut writes = Vec::with_capacity(fields.len());
        for (value, register, field, min, max) in fields {
            let Some(value) = value else { continue };
            if value < min || value > max {
                return Err(RangeError {
                    field,
                    value,
                    min,
                    max,
                });
            }
            writes.push((register, bcd::encode(value)));
        }
        Ok(writes)
    }
}

impl From<RegisterTime> for TimeFields {
    fn from(t: RegisterTime) -> Self {
        TimeFields {
            second: Some(t.second),
            minute: Some(t.minute),
            hour: Some(t.hour),
            day_of_week: Some(t.day_of_week),
            day_of_month: Some(t.day_of_month),
            month: Some(t.month),
            year: Some(t.year),
        }
    }
}

/// A field value outside the range the chip can hold.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RangeError {
    /// Name of the offending field
    pub field: &'static str,
    /// The rejected value
    pub value: u8,
    pub min: u8,
    pub max: u8,
}

impl core::fmt::Display for RangeError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "{} is out of range [{}, {}]: {}",
            self.field, self.min, self.max, self.value
        )
    }
}

impl std::error::Error for RangeError {}
