//! Register map and bitfield structures for the DS3231 RTC.
//!
//! Clock registers are decoded with plain masks and [`crate::bcd`]; the alarm,
//! control and status registers carry flag bits next to their values and are
//! modelled with `bitfield` wrappers.

use bitfield::bitfield;

/// Register addresses for the DS3231 RTC.
#[allow(unused)]
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum RegAddr {
    /// Seconds register (0-59)
    Seconds = 0x00,
    /// Minutes register (0-59)
    Minutes = 0x01,
    /// Hours register (0-23)
    Hours = 0x02,
    /// Day of week register (1-7)
    Day = 0x03,
    /// Date register (1-31)
    Date = 0x04,
    /// Month register (1-12)
    Month = 0x05,
    /// Year register (0-99)
    Year = 0x06,
    /// Alarm 1 seconds register
    Alarm1Seconds = 0x07,
    /// Alarm 1 minutes register
    Alarm1Minutes = 0x08,
    /// Alarm 1 hours register
    Alarm1Hours = 0x09,
    /// Alarm 1 day/date register
    Alarm1DayDate = 0x0A,
    /// Alarm 2 minutes register
    Alarm2Minutes = 0x0B,
    /// Alarm 2 hours register
    Alarm2Hours = 0x0C,
    /// Alarm 2 day/date register
    Alarm2DayDate = 0x0D,
    /// Control register
    Control = 0x0E,
    /// Control/Status register
    ControlStatus = 0x0F,
    /// Aging offset register
    AgingOffset = 0x10,
    /// Temperature MSB register
    MSBTemp = 0x11,
    /// Temperature LSB register
    LSBTemp = 0x12,
}

/// Value bits of the seconds register; bit 7 is not part of the count.
pub const SECONDS_MASK: u8 = 0x7F;
/// Value bits of the hours register in 24-hour mode.
pub const HOURS_MASK: u8 = 0x3F;
/// Value bits of the month register; bit 7 is the century flag.
pub const MONTH_MASK: u8 = 0x1F;

/// Raw hours value some modules report after power loss.
pub const HOURS_QUIRK_RAW: u8 = 0x64;
/// Value the quirky hours byte is read as.
pub const HOURS_QUIRK_SUBSTITUTE: u8 = 0x40;

/// One of the two hardware alarm channels.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AlarmSlot {
    /// Alarm 1: seconds, minutes, hours and day/date.
    One = 1,
    /// Alarm 2: minutes, hours and day/date, always at 00 seconds.
    Two = 2,
}

impl AlarmSlot {
    /// Bit of this alarm in the control (AxIE) and status (AxF) registers.
    pub const fn bit(self) -> u8 {
        self as u8 - 1
    }

    /// The alarm seconds register, only present on alarm 1.
    pub const fn seconds_register(self) -> Option<RegAddr> {
        match self {
            AlarmSlot::One => Some(RegAddr::Alarm1Seconds),
            AlarmSlot::Two => None,
        }
    }

    /// The alarm minutes register.
    pub const fn minutes_register(self) -> RegAddr {
        match self {
            AlarmSlot::One => RegAddr::Alarm1Minutes,
            AlarmSlot::Two => RegAddr::Alarm2Minutes,
        }
    }

    /// The alarm hours register.
    pub const fn hours_register(self) -> RegAddr {
        match self {
            AlarmSlot::One => RegAddr::Alarm1Hours,
            AlarmSlot::Two => RegAddr::Alarm2Hours,
        }
    }

    /// The alarm day/date register.
    pub const fn day_date_register(self) -> RegAddr {
        match self {
            AlarmSlot::One => RegAddr::Alarm1DayDate,
            AlarmSlot::Two => RegAddr::Alarm2DayDate,
        }
    }
}

impl TryFrom<u8> for AlarmSlot {
    type Error = u8;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            1 => Ok(AlarmSlot::One),
            2 => Ok(AlarmSlot::Two),
            other => Err(other),
        }
    }
}

impl core::fmt::Display for AlarmSlot {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", *self as u8)
    }
}

/// Day/Date select for alarm registers (DY/DT bit).
///
/// This controls whether the alarm day/date register matches against
/// the day of the week or the date of the month.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum DayDateSelect {
    /// Match against date of the month (1-31)
    Date = 0,
    /// Match against day of the week (1-7)
    Day = 1,
}

impl From<u8> for DayDateSelect {
    /// Creates a `DayDateSelect` from the single DY/DT bit.
    fn from(v: u8) -> Self {
        if v & 0x01 == 0 {
            DayDateSelect::Date
        } else {
            DayDateSelect::Day
        }
    }
}

impl From<DayDateSelect> for u8 {
    fn from(v: DayDateSelect) -> Self {
        v as u8
    }
}

// This macro generates the From<u8> and Into<u8> implementations for the
// register type
macro_rules! from_register_u8 {
    ($typ:ty) => {
        impl From<u8> for $typ {
            fn from(v: u8) -> Self {
                paste::paste!([< $typ >](v))
            }
        }
        impl From<$typ> for u8 {
            fn from(v: $typ) -> Self {
                v.0
            }
        }
    };
}

bitfield! {
    /// Control register.
    #[derive(Clone, Copy, Default, PartialEq)]
    pub struct Control(u8);
    impl Debug;
    /// Oscillator stopped while on battery (EOSC)
    pub oscillator_disable, set_oscillator_disable: 7;
    /// Square wave output on battery power (BBSQW)
    pub battery_backed_square_wave, set_battery_backed_square_wave: 6;
    /// Force temperature conversion (CONV)
    pub convert_temperature, set_convert_temperature: 5;
    /// Square wave rate select (RS2, RS1)
    pub rate_select, set_rate_select: 4, 3;
    /// INT/SQW pin drives the alarm interrupt (INTCN)
    pub interrupt_control, set_interrupt_control: 2;
    /// Alarm 2 interrupt enable (A2IE)
    pub alarm2_interrupt_enable, set_alarm2_interrupt_enable: 1;
    /// Alarm 1 interrupt enable (A1IE)
    pub alarm1_interrupt_enable, set_alarm1_interrupt_enable: 0;
}
from_register_u8!(Control);

impl Control {
    /// Enable bit of the given alarm.
    pub fn alarm_enabled(&self, slot: AlarmSlot) -> bool {
        self.0 & (1 << slot.bit()) != 0
    }

    /// Sets the enable bit of the given alarm, leaving every other bit alone.
    pub fn set_alarm_enabled(&mut self, slot: AlarmSlot, enabled: bool) {
        if enabled {
            self.0 |= 1 << slot.bit();
        } else {
            self.0 &= !(1 << slot.bit());
        }
    }
}

bitfield! {
    /// Status register for device state and flags.
    #[derive(Clone, Copy, Default, PartialEq)]
    pub struct Status(u8);
    impl Debug;
    /// Oscillator stop flag
    pub oscillator_stop_flag, set_oscillator_stop_flag: 7;
    /// Enable 32kHz output
    pub enable_32khz_output, set_enable_32khz_output: 3;
    /// Device busy flag
    pub busy, set_busy: 2;
    /// Alarm 2 triggered flag
    pub alarm2_flag, set_alarm2_flag: 1;
    /// Alarm 1 triggered flag
    pub alarm1_flag, set_alarm1_flag: 0;
}
from_register_u8!(Status);

impl Status {
    /// Fired flag of the given alarm.
    pub fn alarm_fired(&self, slot: AlarmSlot) -> bool {
        self.0 & (1 << slot.bit()) != 0
    }

    /// Sets the fired flag of the given alarm, leaving every other bit alone.
    pub fn set_alarm_fired(&mut self, slot: AlarmSlot, fired: bool) {
        if fired {
            self.0 |= 1 << slot.bit();
        } else {
            self.0 &= !(1 << slot.bit());
        }
    }
}

bitfield! {
    /// Temperature register (integer part).
    #[derive(Clone, Copy, Default, PartialEq)]
    pub struct Temperature(u8);
    impl Debug;
    /// Temperature value (-128 to +127)
    pub i8, temperature, set_temperature: 7, 0;
}
from_register_u8!(Temperature);

bitfield! {
    /// Temperature fraction register (quarter degrees in the top two bits).
    #[derive(Clone, Copy, Default, PartialEq)]
    pub struct TemperatureFraction(u8);
    impl Debug;
    /// Quarter degrees (0-3)
    pub quarters, set_quarters: 7, 6;
}
from_register_u8!(TemperatureFraction);

bitfield! {
    /// Alarm seconds, minutes or hours register with its mask bit.
    #[derive(Clone, Copy, Default, PartialEq)]
    pub struct AlarmField(u8);
    impl Debug;
    /// Mask bit (AxMy): the field is ignored when matching
    pub wildcard, set_wildcard: 7;
    /// BCD value
    pub bcd, set_bcd: 6, 0;
}
from_register_u8!(AlarmField);

bitfield! {
    /// Alarm day/date register with mask bit and DY/DT control.
    #[derive(Clone, Copy, Default, PartialEq)]
    pub struct AlarmDayDate(u8);
    impl Debug;
    /// Mask bit (AxM4): the day is ignored when matching
    pub wildcard, set_wildcard: 7;
    /// Day/Date select (1=day of week, 0=date of month)
    pub from into DayDateSelect, day_date_select, set_day_date_select: 6, 6;
    /// BCD date of month, or day of week when DY/DT=1
    pub bcd, set_bcd: 5, 0;
}
from_register_u8!(AlarmDayDate);
