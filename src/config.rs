//! Service configuration read from an INI file.
//!
//! The `[GLOBAL]` keys have defaults that are visible from every section;
//! `[boot]` keys are optional and `[halt]` keys are required.

use std::path::Path;

use ini::Ini;

use crate::{AlarmSlot, DeviceConfig, TimeBase};

/// Where the service looks for its configuration.
pub const DEFAULT_PATH: &str = "/etc/wake-on-rtc.conf";

const DEFAULTS: [(&str, &str); 4] = [("debug", "0"), ("alarm", "1"), ("i2c", "1"), ("utc", "1")];

/// Errors of the configuration loader.
#[derive(Debug)]
pub enum ConfigError {
    /// The file could not be read or is not valid INI
    Load(ini::Error),
    /// A required key has no value
    Missing {
        section: &'static str,
        key: &'static str,
    },
    /// A value has the wrong form
    Invalid {
        section: &'static str,
        key: &'static str,
        value: String,
    },
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ConfigError::Load(e) => write!(f, "cannot load configuration: {}", e),
            ConfigError::Missing { section, key } => {
                write!(f, "missing option {} in section [{}]", key, section)
            }
            ConfigError::Invalid {
                section,
                key,
                value,
            } => write!(f, "invalid value for {} in section [{}]: {:?}", key, section, value),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Load(e) => Some(e),
            _ => None,
        }
    }
}

/// Immutable snapshot of the service configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Write a debug log file
    pub debug: bool,
    /// Alarm slot used for wake-ups
    pub alarm: AlarmSlot,
    /// Number of the `/dev/i2c-N` bus the RTC sits on
    pub i2c_bus: u8,
    /// The RTC keeps UTC rather than local time
    pub utc: bool,
    /// Command started at boot with the boot mode as argument
    pub boot_hook: Option<String>,
    /// Minutes after which an alarm boot halts again, 0 to disable
    pub auto_halt: u32,
    /// Command printing the next boot time
    pub next_boot: String,
    /// Minutes to wake up ahead of the next boot time
    pub lead_time: i64,
    /// Copy the system time to the RTC at shutdown
    pub set_hwclock: bool,
}

impl Config {
    /// Loads the configuration from an INI file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_file(path).map_err(ConfigError::Load)?;
        Self::from_ini(&ini)
    }

    /// Parses the configuration from INI text.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_str(text).map_err(|e| ConfigError::Load(ini::Error::Parse(e)))?;
        Self::from_ini(&ini)
    }

    fn from_ini(ini: &Ini) -> Result<Self, ConfigError> {
        let reader = Reader { ini };

        let alarm: u8 = reader.number("GLOBAL", "alarm")?;
        let alarm = AlarmSlot::try_from(alarm).map_err(|v| ConfigError::Invalid {
            section: "GLOBAL",
            key: "alarm",
            value: v.to_string(),
        })?;

        Ok(Config {
            debug: reader.flag("GLOBAL", "debug")?,
            alarm,
            i2c_bus: reader.number("GLOBAL", "i2c")?,
            utc: reader.flag("GLOBAL", "utc")?,
            boot_hook: reader
                .get("boot", "hook_cmd")
                .map(str::trim)
                .filter(|hook| !hook.is_empty())
                .map(str::to_string),
            auto_halt: match reader.get("boot", "auto_halt") {
                Some(_) => reader.number("boot", "auto_halt")?,
                None => 0,
            },
            next_boot: reader.required("halt", "next_boot")?.to_string(),
            lead_time: reader.number("halt", "lead_time")?,
            set_hwclock: reader.flag("halt", "set_hwclock")?,
        })
    }

    /// Representation the RTC keeps its time in.
    pub fn time_base(&self) -> TimeBase {
        if self.utc {
            TimeBase::Utc
        } else {
            TimeBase::Local
        }
    }

    /// Driver settings for the RTC described by this configuration.
    pub fn device_config(&self) -> DeviceConfig {
        DeviceConfig {
            time_base: self.time_base(),
            ..DeviceConfig::default()
        }
    }

    /// Path of the I2C bus device.
    pub fn i2c_device(&self) -> String {
        format!("/dev/i2c-{}", self.i2c_bus)
    }
}

struct Reader<'a> {
    ini: &'a Ini,
}

impl<'a> Reader<'a> {
    fn get(&self, section: &str, key: &str) -> Option<&'a str> {
        self.ini
            .section(Some(section))
            .and_then(|props| props.get(key))
            .or_else(|| {
                DEFAULTS
                    .iter()
                    .find(|(name, _)| *name == key)
                    .map(|(_, value)| *value)
            })
    }

    fn required(&self, section: &'static str, key: &'static str) -> Result<&'a str, ConfigError> {
        self.get(section, key)
            .ok_or(ConfigError::Missing { section, key })
    }

    fn number<T: core::str::FromStr>(
        &self,
        section: &'static str,
        key: &'static str,
    ) -> Result<T, ConfigError> {
        let value = self.required(section, key)?;
        value.trim().parse().map_err(|_| ConfigError::Invalid {
            section,
            key,
            value: value.to_string(),
        })
    }

    fn flag(&self, section: &'static str, key: &'static str) -> Result<bool, ConfigError> {
        Ok(self.number::<i64>(section, key)? != 0)
    }
}
