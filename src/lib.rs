//! Wake a single-board computer from a DS3231 real-time clock alarm.
//!
//! The crate has two halves:
//!
//! - [`DS3231`], a register-level driver over any `embedded_hal::i2c::I2c`
//!   bus: clock read/write, alarm programming, alarm state and resolution of
//!   the programmed alarm to a concrete timestamp.
//! - [`wake::WakeOnRtc`], the boot and shutdown flows that use the alarm to
//!   tell a timer wake-up from a normal power-on and to arm the next one.
//!
//! # Example
//!
//! ```rust,ignore
//! use wake_on_rtc::{AlarmSlot, DeviceConfig, DS3231};
//!
//! let i2c = linux_embedded_hal::I2cdev::new("/dev/i2c-1")?;
//! let mut rtc = DS3231::new(i2c, DeviceConfig::default());
//!
//! let state = rtc.alarm_state(AlarmSlot::One)?;
//! if state.triggered() {
//!     println!("woken by alarm set for {}", rtc.alarm_datetime(AlarmSlot::One)?);
//! }
//! ```

pub mod alarm;
pub mod bcd;
pub mod config;
pub mod datetime;
pub mod host;
pub mod next_boot;
pub mod registers;
pub mod wake;

#[cfg(test)]
pub(crate) mod testing;

use chrono::NaiveDateTime;
use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use log::debug;

pub use alarm::{AlarmPattern, AlarmState};
pub use datetime::{convert, RangeError, RegisterTime, TimeBase, TimeFields};
pub use registers::{
    AlarmDayDate, AlarmField, AlarmSlot, Control, DayDateSelect, RegAddr, Status, Temperature,
    TemperatureFraction,
};

/// Bus address of the DS3231.
pub const DEFAULT_ADDRESS: u8 = 0x68;
/// Bus address of the AT24C32 EEPROM found on most DS3231 modules.
pub const DEFAULT_EEPROM_ADDRESS: u8 = 0x57;

const EEPROM_WRITE_CYCLE_MS: u32 = 200;

/// Per-instance settings of a [`DS3231`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    /// Bus address of the clock
    pub address: u8,
    /// Bus address of the companion EEPROM
    pub eeprom_address: u8,
    /// Representation the clock registers are kept in
    pub time_base: TimeBase,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS,
            eeprom_address: DEFAULT_EEPROM_ADDRESS,
            time_base: TimeBase::Utc,
        }
    }
}

/// Errors of the DS3231 driver.
#[derive(Debug)]
pub enum DS3231Error<I2CE> {
    /// The bus transfer failed
    I2c(I2CE),
    /// A value to be written is outside the register's range
    Range(RangeError),
    /// The clock registers do not hold a valid date and time
    InvalidDateTime(RegisterTime),
    /// The alarm registers cannot be resolved to a date and time
    InvalidAlarm(AlarmPattern),
}

impl<I2CE> From<I2CE> for DS3231Error<I2CE> {
    fn from(e: I2CE) -> Self {
        DS3231Error::I2c(e)
    }
}

impl<I2CE: core::fmt::Debug> core::fmt::Display for DS3231Error<I2CE> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            DS3231Error::I2c(e) => write!(f, "i2c transfer failed: {:?}", e),
            DS3231Error::Range(e) => write!(f, "{}", e),
            DS3231Error::InvalidDateTime(t) => write!(f, "clock holds an invalid date: {:?}", t),
            DS3231Error::InvalidAlarm(p) => write!(f, "alarm cannot be resolved: {:?}", p),
        }
    }
}

impl<I2CE: core::fmt::Debug> std::error::Error for DS3231Error<I2CE> {}

macro_rules! set_and_get_register {
    ($(($name:ident, $regaddr:expr, $typ:ty)),+) => {
        $(
            paste::item!{
                #[doc = concat!("Writes the ", stringify!($name), " register.")]
                pub fn [< set_ $name >](&mut self, value: $typ) -> Result<(), DS3231Error<I2C::Error>> {
                    self.write_register($regaddr, value.into())
                }
            }

            #[doc = concat!("Reads the ", stringify!($name), " register.")]
            pub fn $name(&mut self) -> Result<$typ, DS3231Error<I2C::Error>> {
                Ok(<$typ>::from(self.read_register($regaddr)?))
            }
        )+
    }
}

/// DS3231 Real-Time Clock driver.
pub struct DS3231<I2C: I2c> {
    i2c: I2C,
    config: DeviceConfig,
}

impl<I2C: I2c> DS3231<I2C> {
    pub fn new(i2c: I2C, config: DeviceConfig) -> Self {
        Self { i2c, config }
    }

    /// Representation the clock registers are kept in.
    pub fn time_base(&self) -> TimeBase {
        self.config.time_base
    }

    fn read_register(&mut self, register: RegAddr) -> Result<u8, DS3231Error<I2C::Error>> {
        let mut data = [0];
        self.i2c
            .write_read(self.config.address, &[register as u8], &mut data)?;
        Ok(data[0])
    }

    fn write_register(
        &mut self,
        register: RegAddr,
        value: u8,
    ) -> Result<(), DS3231Error<I2C::Error>> {
        self.i2c
            .write(self.config.address, &[register as u8, value])?;
        Ok(())
    }

    /// Reads and decodes the seconds..year registers.
    pub fn read_all(&mut self) -> Result<RegisterTime, DS3231Error<I2C::Error>> {
        let mut data = [0; 7];
        self.i2c
            .write_read(self.config.address, &[RegAddr::Seconds as u8], &mut data)?;
        let time = RegisterTime::from(data);
        debug!("raw={:02x?} time={:?}", data, time);
        Ok(time)
    }

    /// The clock's date and time as local wall clock time.
    pub fn datetime(&mut self) -> Result<NaiveDateTime, DS3231Error<I2C::Error>> {
        let time = self.read_all()?;
        let datetime = time
            .to_datetime()
            .ok_or(DS3231Error::InvalidDateTime(time))?;
        Ok(convert(datetime, self.config.time_base, TimeBase::Local))
    }

    /// Writes the present fields, leaving the other registers untouched.
    ///
    /// # Errors
    ///
    /// [`DS3231Error::Range`] if any present field is out of range; no
    /// register is written in that case.
    pub fn write_fields(&mut self, fields: &TimeFields) -> Result<(), DS3231Error<I2C::Error>> {
        let writes = fields.encode().map_err(DS3231Error::Range)?;
        for (register, value) in writes {
            self.write_register(register, value)?;
        }
        Ok(())
    }

    /// Sets the clock from a local wall clock timestamp.
    pub fn set_datetime(&mut self, local: &NaiveDateTime) -> Result<(), DS3231Error<I2C::Error>> {
        let datetime = convert(*local, TimeBase::Local, self.config.time_base);
        debug!("setting clock to {} ({:?})", datetime, self.config.time_base);
        self.write_fields(&TimeFields::from_datetime(&datetime))
    }

    /// Programs an exact-match alarm for a local wall clock timestamp.
    ///
    /// Only the day of month, hour, minute and (alarm 1) second are stored;
    /// every mask bit is cleared.
    pub fn set_alarm_time(
        &mut self,
        slot: AlarmSlot,
        local: &NaiveDateTime,
    ) -> Result<(), DS3231Error<I2C::Error>> {
        use chrono::{Datelike, Timelike};

        let at = convert(*local, TimeBase::Local, self.config.time_base);
        let field = |value: u32| {
            let mut field = AlarmField::default();
            field.set_bcd(bcd::encode(value as u8));
            u8::from(field)
        };

        if let Some(register) = slot.seconds_register() {
            self.write_register(register, field(at.second()))?;
        }
        self.write_register(slot.minutes_register(), field(at.minute()))?;
        self.write_register(slot.hours_register(), field(at.hour()))?;

        let mut day_date = AlarmDayDate::default();
        day_date.set_day_date_select(DayDateSelect::Date);
        day_date.set_bcd(bcd::encode(at.day() as u8));
        self.write_register(slot.day_date_register(), day_date.into())?;

        debug!("alarm {} registers set for {}", slot, at);
        Ok(())
    }

    /// Decodes the alarm registers without resolving them.
    ///
    /// Registers are read from seconds towards the day. The first masked field
    /// ends the read: fields read before it keep their values, the masked
    /// field and all later ones are reported as `None`.
    pub fn alarm_pattern(&mut self, slot: AlarmSlot) -> Result<AlarmPattern, DS3231Error<I2C::Error>> {
        let mut pattern = AlarmPattern::default();

        let second = match slot.seconds_register() {
            Some(register) => {
                let seconds = AlarmField::from(self.read_register(register)?);
                if seconds.wildcard() {
                    return Ok(pattern);
                }
                bcd::decode(seconds.bcd())
            }
            None => 0,
        };
        pattern.second = Some(second);

        let minutes = AlarmField::from(self.read_register(slot.minutes_register())?);
        if minutes.wildcard() {
            return Ok(pattern);
        }
        pattern.minute = Some(bcd::decode(minutes.bcd()));

        let hours = AlarmField::from(self.read_register(slot.hours_register())?);
        if hours.wildcard() {
            return Ok(pattern);
        }
        pattern.hour = Some(bcd::decode(hours.bcd()));

        let day_date = AlarmDayDate::from(self.read_register(slot.day_date_register())?);
        if day_date.wildcard() {
            return Ok(pattern);
        }
        match day_date.day_date_select() {
            DayDateSelect::Day => pattern.weekday = Some(bcd::decode(day_date.bcd())),
            DayDateSelect::Date => pattern.day = Some(bcd::decode(day_date.bcd())),
        }
        Ok(pattern)
    }

    /// The programmed alarm as a local timestamp.
    ///
    /// A pending alarm resolves to its next occurrence, a fired one to the
    /// occurrence that fired. An alarm matching every second has no single
    /// occurrence and reports the current local time.
    pub fn alarm_datetime(&mut self, slot: AlarmSlot) -> Result<NaiveDateTime, DS3231Error<I2C::Error>> {
        let pattern = self.alarm_pattern(slot)?;
        if pattern.every_second() {
            return Ok(TimeBase::Local.now());
        }
        let state = self.alarm_state(slot)?;
        let now = self.config.time_base.now();
        let at = pattern
            .resolve(state, now)
            .ok_or(DS3231Error::InvalidAlarm(pattern))?;
        debug!("alarm {} pattern={:?} state={:?} at={}", slot, pattern, state, at);
        Ok(convert(at, self.config.time_base, TimeBase::Local))
    }

    /// Enable and fired flags of the alarm.
    pub fn alarm_state(&mut self, slot: AlarmSlot) -> Result<AlarmState, DS3231Error<I2C::Error>> {
        let control = self.control()?;
        let status = self.status()?;
        Ok(AlarmState {
            enabled: control.alarm_enabled(slot),
            fired: status.alarm_fired(slot),
        })
    }

    /// Clears the alarm's fired flag, keeping every other status bit.
    pub fn clear_alarm(&mut self, slot: AlarmSlot) -> Result<(), DS3231Error<I2C::Error>> {
        let mut status = self.status()?;
        status.set_alarm_fired(slot, false);
        self.set_status(status)
    }

    /// Sets the alarm's interrupt enable bit, keeping every other control bit.
    pub fn set_alarm_enable(
        &mut self,
        slot: AlarmSlot,
        enabled: bool,
    ) -> Result<(), DS3231Error<I2C::Error>> {
        let mut control = self.control()?;
        control.set_alarm_enabled(slot, enabled);
        self.set_control(control)
    }

    /// Die temperature in degrees Celsius, in quarter degree steps.
    pub fn temperature(&mut self) -> Result<f32, DS3231Error<I2C::Error>> {
        let whole = Temperature::from(self.read_register(RegAddr::MSBTemp)?);
        let fraction = TemperatureFraction::from(self.read_register(RegAddr::LSBTemp)?);
        Ok(f32::from(whole.temperature()) + f32::from(fraction.quarters()) * 0.25)
    }

    /// Reads one byte of the companion EEPROM.
    pub fn read_eeprom_byte(&mut self, address: u16) -> Result<u8, DS3231Error<I2C::Error>> {
        let mut data = [0];
        self.i2c
            .write_read(self.config.eeprom_address, &address.to_be_bytes(), &mut data)?;
        Ok(data[0])
    }

    /// Writes one byte of the companion EEPROM and waits out its write cycle.
    pub fn write_eeprom_byte(
        &mut self,
        address: u16,
        value: u8,
        delay: &mut impl DelayNs,
    ) -> Result<(), DS3231Error<I2C::Error>> {
        let [high, low] = address.to_be_bytes();
        self.i2c
            .write(self.config.eeprom_address, &[high, low, value])?;
        delay.delay_ms(EEPROM_WRITE_CYCLE_MS);
        Ok(())
    }

    set_and_get_register!(
        (control, RegAddr::Control, Control),
        (status, RegAddr::ControlStatus, Status)
    );
}
