//! Boot and shutdown flows of the wake-on-RTC service.
//!
//! At shutdown the next boot time is asked from an external command and the
//! RTC alarm is armed for it. At boot the alarm's enable and fired flags tell
//! a timer wake-up ([`BootMode::Alarm`]) from a normal power-on; the alarm is
//! then cleared and disabled so the next power-on is not mistaken for a
//! wake-up.
//!
//! Everything outside the RTC goes through [`Host`].

use chrono::{NaiveDateTime, TimeDelta};
use embedded_hal::i2c::I2c;
use log::{debug, error, info, warn};

use crate::config::Config;
use crate::next_boot::{self, CommandOutput, NextBootError};
use crate::{DS3231Error, DS3231};

/// How the machine came up.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BootMode {
    /// Power-on by user or power supply
    Normal,
    /// Wake-up by the RTC alarm
    Alarm,
}

impl BootMode {
    /// The word written to the status file and passed to the boot hook.
    pub fn as_str(self) -> &'static str {
        match self {
            BootMode::Normal => "normal",
            BootMode::Alarm => "alarm",
        }
    }
}

impl core::fmt::Display for BootMode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The flow requested on the command line.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Directive {
    Start,
    Stop,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectiveError {
    /// Not exactly one argument was given
    Missing,
    Unsupported(String),
}

impl core::fmt::Display for DirectiveError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            DirectiveError::Missing => f.write_str("missing argument"),
            DirectiveError::Unsupported(arg) => write!(f, "unsupported argument: {}", arg),
        }
    }
}

impl std::error::Error for DirectiveError {}

impl Directive {
    /// Parses the process arguments, program name excluded.
    pub fn from_args<I>(args: I) -> Result<Self, DirectiveError>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mut args = args.into_iter();
        let (Some(arg), None) = (args.next(), args.next()) else {
            return Err(DirectiveError::Missing);
        };
        match arg.as_ref() {
            "start" => Ok(Directive::Start),
            "stop" => Ok(Directive::Stop),
            other => Err(DirectiveError::Unsupported(other.to_string())),
        }
    }
}

/// The outside world as seen by the service.
pub trait Host {
    /// The current local wall clock time.
    fn now(&self) -> NaiveDateTime;

    /// Runs the next-boot command to completion.
    fn run_next_boot(&mut self, command: &str) -> std::io::Result<CommandOutput>;

    /// Starts the boot hook with the boot mode as its argument, without waiting for it.
    fn spawn_boot_hook(&mut self, hook: &str, mode: BootMode) -> std::io::Result<()>;

    /// Schedules a power-off in one minute, without waiting for it.
    fn schedule_shutdown(&mut self) -> std::io::Result<()>;

    /// Persists the boot mode for other services.
    fn write_status(&mut self, mode: BootMode) -> std::io::Result<()>;
}

/// Failures that abort the boot flow.
#[derive(Debug)]
pub enum WakeError<E> {
    Rtc(DS3231Error<E>),
    /// The status file could not be written
    Status(std::io::Error),
}

impl<E> From<DS3231Error<E>> for WakeError<E> {
    fn from(e: DS3231Error<E>) -> Self {
        WakeError::Rtc(e)
    }
}

impl<E: core::fmt::Debug> core::fmt::Display for WakeError<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            WakeError::Rtc(e) => write!(f, "rtc: {}", e),
            WakeError::Status(e) => write!(f, "cannot write status file: {}", e),
        }
    }
}

impl<E: core::fmt::Debug> std::error::Error for WakeError<E> {}

/// The service, bound to one RTC and one host.
pub struct WakeOnRtc<I2C: I2c, H: Host> {
    rtc: DS3231<I2C>,
    host: H,
    config: Config,
}

impl<I2C: I2c, H: Host> WakeOnRtc<I2C, H> {
    pub fn new(rtc: DS3231<I2C>, host: H, config: Config) -> Self {
        Self { rtc, host, config }
    }

    /// Runs the flow selected by `directive`.
    pub fn run(&mut self, directive: Directive) -> Result<(), WakeError<I2C::Error>> {
        match directive {
            Directive::Start => self.start().map(|_| ()),
            Directive::Stop => {
                self.stop();
                Ok(())
            }
        }
    }

    /// Boot flow: determine the boot mode and disarm the alarm.
    ///
    /// # Errors
    ///
    /// Reading or clearing the alarm and writing the status file abort the
    /// flow. The boot hook and the auto-halt check only log their failures.
    pub fn start(&mut self) -> Result<BootMode, WakeError<I2C::Error>> {
        info!("processing system startup");
        let slot = self.config.alarm;

        let state = self.rtc.alarm_state(slot)?;
        let mode = if state.triggered() {
            BootMode::Alarm
        } else {
            BootMode::Normal
        };
        info!("startup-mode: {}", mode);

        if mode == BootMode::Alarm {
            match self.rtc.alarm_datetime(slot) {
                Ok(at) => debug!("alarm {} was set for {}", slot, at),
                Err(e) => warn!("cannot resolve alarm {}: {}", slot, e),
            }
        }

        self.rtc.clear_alarm(slot)?;
        self.rtc.set_alarm_enable(slot, false)?;
        info!("alarm {} cleared and disabled", slot);

        self.host.write_status(mode).map_err(WakeError::Status)?;

        if let Some(hook) = &self.config.boot_hook {
            info!("executing boot-hook {}", hook);
            if let Err(e) = self.host.spawn_boot_hook(hook, mode) {
                error!("error while executing boot-hook: {}", e);
            }
        }

        if mode == BootMode::Alarm && self.config.auto_halt > 0 {
            self.auto_halt();
        }
        Ok(mode)
    }

    fn auto_halt(&mut self) {
        info!("processing auto_halt: checking for next boot-time");
        let boot = match self.next_boot() {
            Ok(Some(boot)) => boot,
            Ok(None) => return,
            Err(e) => {
                error!("error while processing auto_halt: {}", e);
                return;
            }
        };

        let Some(limit) = TimeDelta::try_minutes(i64::from(self.config.auto_halt))
            .and_then(|halt| self.host.now().checked_add_signed(halt))
        else {
            warn!("auto_halt of {} minutes is out of range", self.config.auto_halt);
            return;
        };
        debug!("now+auto_halt: {}", limit);
        if boot > limit {
            warn!("next boot-time {} is after {}, shutting down", boot, limit);
            if let Err(e) = self.host.schedule_shutdown() {
                error!("error while scheduling shutdown: {}", e);
            }
        }
    }

    /// Shutdown flow: arm the alarm for the next boot and sync the RTC.
    ///
    /// Every step logs its failure and the flow goes on.
    pub fn stop(&mut self) {
        info!("processing system shutdown");
        let slot = self.config.alarm;

        match self.next_boot() {
            Ok(Some(at)) => {
                let armed = self
                    .rtc
                    .set_alarm_time(slot, &at)
                    .and_then(|_| self.rtc.set_alarm_enable(slot, true));
                match armed {
                    Ok(()) => info!("alarm {} set to {} and enabled", slot, at),
                    Err(e) => error!("error while setting alarm-time: {}", e),
                }
            }
            Ok(None) => info!("no next boot-time, alarm {} not armed", slot),
            Err(e) => error!("error while setting alarm-time: {}", e),
        }

        if self.config.set_hwclock {
            let now = self.host.now();
            match self.rtc.set_datetime(&now) {
                Ok(()) => info!("updated rtc-clock from system-time"),
                Err(e) => error!("error while updating rtc-clock: {}", e),
            }
        }
    }

    /// The next boot time less the lead time, if one is scheduled.
    fn next_boot(&mut self) -> Result<Option<NaiveDateTime>, NextBootError> {
        debug!("executing next_boot-hook {}", self.config.next_boot);
        let output = self
            .host
            .run_next_boot(&self.config.next_boot)
            .map_err(NextBootError::Spawn)?;
        let Some(boot) = next_boot::boot_time_from_output(&output)? else {
            return Ok(None);
        };
        let at = TimeDelta::try_minutes(self.config.lead_time)
            .and_then(|lead| boot.checked_sub_signed(lead))
            .ok_or(NextBootError::LeadTime(self.config.lead_time))?;
        debug!("boot time {} less lead time: {}", boot, at);
        Ok(Some(at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RegisterFile;
    use crate::{AlarmSlot, DeviceConfig, RegAddr, TimeBase};
    use chrono::NaiveDate;

    fn at(y: i32, m: u32, d: u32, hh: u32, mm: u32, ss: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(hh, mm, ss)
            .unwrap()
    }

    #[derive(Default)]
    struct FakeHost {
        now: Option<NaiveDateTime>,
        /// `None` makes the command fail to start
        next_boot: Option<CommandOutput>,
        next_boot_runs: Vec<String>,
        hooks: Vec<(String, BootMode)>,
        shutdowns: usize,
        status: Option<BootMode>,
        status_readonly: bool,
        hook_fails: bool,
        shutdown_fails: bool,
    }

    impl FakeHost {
        fn booting_at(now: NaiveDateTime, next_boot: &str) -> Self {
            FakeHost {
                now: Some(now),
                next_boot: Some(CommandOutput {
                    stdout: next_boot.to_string(),
                    stderr: String::new(),
                }),
                ..Default::default()
            }
        }
    }

    impl Host for FakeHost {
        fn now(&self) -> NaiveDateTime {
            self.now.unwrap()
        }

        fn run_next_boot(&mut self, command: &str) -> std::io::Result<CommandOutput> {
            self.next_boot_runs.push(command.to_string());
            self.next_boot
                .clone()
                .ok_or_else(|| std::io::Error::from(std::io::ErrorKind::NotFound))
        }

        fn spawn_boot_hook(&mut self, hook: &str, mode: BootMode) -> std::io::Result<()> {
            self.hooks.push((hook.to_string(), mode));
            if self.hook_fails {
                return Err(std::io::Error::from(std::io::ErrorKind::NotFound));
            }
            Ok(())
        }

        fn schedule_shutdown(&mut self) -> std::io::Result<()> {
            self.shutdowns += 1;
            if self.shutdown_fails {
                return Err(std::io::Error::from(std::io::ErrorKind::PermissionDenied));
            }
            Ok(())
        }

        fn write_status(&mut self, mode: BootMode) -> std::io::Result<()> {
            if self.status_readonly {
                return Err(std::io::Error::from(std::io::ErrorKind::PermissionDenied));
            }
            self.status = Some(mode);
            Ok(())
        }
    }

    fn config() -> Config {
        Config {
            debug: false,
            alarm: AlarmSlot::One,
            i2c_bus: 1,
            utc: false,
            boot_hook: Some("/usr/local/sbin/hook".to_string()),
            auto_halt: 30,
            next_boot: "/usr/local/sbin/next-boot".to_string(),
            lead_time: 10,
            set_hwclock: false,
        }
    }

    fn service(
        regs: RegisterFile,
        host: FakeHost,
        config: Config,
    ) -> WakeOnRtc<RegisterFile, FakeHost> {
        let rtc = DS3231::new(
            regs,
            DeviceConfig {
                time_base: TimeBase::Local,
                ..DeviceConfig::default()
            },
        );
        WakeOnRtc::new(rtc, host, config)
    }

    // INTCN with A1IE set, OSF with A1F set, alarm 1 on the 1st at 07:50:00
    fn alarm_one_fired() -> RegisterFile {
        RegisterFile::with(&[
            (RegAddr::Control as u8, 0x05),
            (RegAddr::ControlStatus as u8, 0x81),
            (RegAddr::Alarm1Minutes as u8, 0x50),
            (RegAddr::Alarm1Hours as u8, 0x07),
            (RegAddr::Alarm1DayDate as u8, 0x01),
        ])
    }

    #[test]
    fn test_directive_from_args() {
        assert_eq!(Directive::from_args(["start"]), Ok(Directive::Start));
        assert_eq!(Directive::from_args(["stop"]), Ok(Directive::Stop));
        assert_eq!(
            Directive::from_args(Vec::<String>::new()),
            Err(DirectiveError::Missing)
        );
        assert_eq!(
            Directive::from_args(["start", "now"]),
            Err(DirectiveError::Missing)
        );
        assert_eq!(
            Directive::from_args(["restart"]),
            Err(DirectiveError::Unsupported("restart".to_string()))
        );
    }

    #[test]
    fn test_start_after_alarm() {
        let host = FakeHost::booting_at(at(2024, 5, 1, 7, 50, 30), "");
        let mut wake = service(alarm_one_fired(), host, config());

        assert_eq!(wake.start().unwrap(), BootMode::Alarm);
        assert_eq!(wake.host.status, Some(BootMode::Alarm));
        assert_eq!(
            wake.host.hooks,
            vec![("/usr/local/sbin/hook".to_string(), BootMode::Alarm)]
        );

        let regs = &wake.rtc.i2c;
        assert_eq!(regs.reg(RegAddr::Control), 0x04);
        assert_eq!(regs.reg(RegAddr::ControlStatus), 0x80);
        // Alarm registers are left as they were
        assert_eq!(regs.reg(RegAddr::Alarm1Minutes), 0x50);
    }

    #[test]
    fn test_start_normal_when_fired_but_disabled() {
        let regs = RegisterFile::with(&[
            (RegAddr::Control as u8, 0x04),
            (RegAddr::ControlStatus as u8, 0x01),
        ]);
        let host = FakeHost::booting_at(at(2024, 5, 1, 7, 50, 30), "2024-05-01 20:00:00");
        let mut wake = service(regs, host, config());

        assert_eq!(wake.start().unwrap(), BootMode::Normal);
        assert_eq!(wake.host.status, Some(BootMode::Normal));
        assert_eq!(wake.rtc.i2c.reg(RegAddr::ControlStatus), 0x00);
        assert_eq!(wake.rtc.i2c.reg(RegAddr::Control), 0x04);
        // auto-halt only applies to alarm boots
        assert!(wake.host.next_boot_runs.is_empty());
        assert_eq!(wake.host.shutdowns, 0);
    }

    #[test]
    fn test_start_normal_when_enabled_but_not_fired() {
        let regs = RegisterFile::with(&[(RegAddr::Control as u8, 0x05)]);
        let host = FakeHost::booting_at(at(2024, 5, 1, 7, 50, 30), "");
        let mut wake = service(regs, host, config());

        assert_eq!(wake.start().unwrap(), BootMode::Normal);
        assert_eq!(wake.rtc.i2c.reg(RegAddr::Control), 0x04);
    }

    #[test]
    fn test_start_without_hook() {
        let host = FakeHost::booting_at(at(2024, 5, 1, 7, 50, 30), "");
        let mut wake = service(
            alarm_one_fired(),
            host,
            Config {
                boot_hook: None,
                ..config()
            },
        );

        wake.start().unwrap();
        assert!(wake.host.hooks.is_empty());
    }

    #[test]
    fn test_auto_halt_when_next_boot_is_far() {
        let host = FakeHost::booting_at(at(2024, 5, 1, 5, 0, 0), "2024-05-01 08:00:00\n");
        let mut wake = service(alarm_one_fired(), host, config());

        assert_eq!(wake.start().unwrap(), BootMode::Alarm);
        assert_eq!(
            wake.host.next_boot_runs,
            vec!["/usr/local/sbin/next-boot".to_string()]
        );
        assert_eq!(wake.host.shutdowns, 1);
    }

    #[test]
    fn test_no_auto_halt_when_next_boot_is_near() {
        let host = FakeHost::booting_at(at(2024, 5, 1, 5, 0, 0), "2024-05-01 05:10:00\n");
        let mut wake = service(alarm_one_fired(), host, config());

        wake.start().unwrap();
        assert_eq!(wake.host.next_boot_runs.len(), 1);
        assert_eq!(wake.host.shutdowns, 0);
    }

    #[test]
    fn test_no_auto_halt_when_disabled_or_unknown() {
        let host = FakeHost::booting_at(at(2024, 5, 1, 5, 0, 0), "2024-05-01 08:00:00\n");
        let mut wake = service(
            alarm_one_fired(),
            host,
            Config {
                auto_halt: 0,
                ..config()
            },
        );
        wake.start().unwrap();
        assert!(wake.host.next_boot_runs.is_empty());
        assert_eq!(wake.host.shutdowns, 0);

        let host = FakeHost::booting_at(at(2024, 5, 1, 5, 0, 0), "\n");
        let mut wake = service(alarm_one_fired(), host, config());
        wake.start().unwrap();
        assert_eq!(wake.host.shutdowns, 0);
    }

    #[test]
    fn test_auto_halt_failure_is_not_fatal() {
        let host = FakeHost {
            now: Some(at(2024, 5, 1, 5, 0, 0)),
            next_boot: Some(CommandOutput {
                stdout: String::new(),
                stderr: "calendar unavailable\n".to_string(),
            }),
            ..Default::default()
        };
        let mut wake = service(alarm_one_fired(), host, config());

        assert_eq!(wake.start().unwrap(), BootMode::Alarm);
        assert_eq!(wake.host.shutdowns, 0);
        assert_eq!(wake.host.status, Some(BootMode::Alarm));
    }

    #[test]
    fn test_failing_boot_hook_is_not_fatal() {
        let host = FakeHost {
            hook_fails: true,
            ..FakeHost::booting_at(at(2024, 5, 1, 5, 0, 0), "2024-05-01 08:00:00\n")
        };
        let mut wake = service(alarm_one_fired(), host, config());

        assert_eq!(wake.start().unwrap(), BootMode::Alarm);
        assert_eq!(wake.host.status, Some(BootMode::Alarm));
        assert_eq!(wake.host.hooks.len(), 1);
        // auto-halt still runs after the hook failed
        assert_eq!(wake.host.next_boot_runs.len(), 1);
        assert_eq!(wake.host.shutdowns, 1);
    }

    #[test]
    fn test_failing_shutdown_is_not_fatal() {
        let host = FakeHost {
            shutdown_fails: true,
            ..FakeHost::booting_at(at(2024, 5, 1, 5, 0, 0), "2024-05-01 08:00:00\n")
        };
        let mut wake = service(alarm_one_fired(), host, config());

        assert_eq!(wake.start().unwrap(), BootMode::Alarm);
        assert_eq!(wake.host.shutdowns, 1);
        assert_eq!(wake.host.status, Some(BootMode::Alarm));
    }

    #[test]
    fn test_start_fails_without_rtc() {
        let mut regs = alarm_one_fired();
        regs.offline = true;
        let host = FakeHost::booting_at(at(2024, 5, 1, 5, 0, 0), "");
        let mut wake = service(regs, host, config());

        assert!(matches!(wake.start(), Err(WakeError::Rtc(DS3231Error::I2c(_)))));
        assert_eq!(wake.host.status, None);
        assert!(wake.host.hooks.is_empty());
    }

    #[test]
    fn test_start_fails_when_status_cannot_be_written() {
        let host = FakeHost {
            status_readonly: true,
            ..FakeHost::booting_at(at(2024, 5, 1, 5, 0, 0), "")
        };
        let mut wake = service(alarm_one_fired(), host, config());

        assert!(matches!(wake.start(), Err(WakeError::Status(_))));
        // The alarm is disarmed before the status is persisted
        assert_eq!(wake.rtc.i2c.reg(RegAddr::Control), 0x04);
        assert!(wake.host.hooks.is_empty());
    }

    #[test]
    fn test_stop_arms_alarm_before_next_boot() {
        let regs = RegisterFile::with(&[(RegAddr::Control as u8, 0x04)]);
        let host = FakeHost::booting_at(at(2024, 4, 30, 22, 0, 0), "2024-05-01 08:00:00\n");
        let mut wake = service(regs, host, config());

        wake.stop();
        let regs = &wake.rtc.i2c;
        assert_eq!(regs.reg(RegAddr::Alarm1Seconds), 0x00);
        assert_eq!(regs.reg(RegAddr::Alarm1Minutes), 0x50);
        assert_eq!(regs.reg(RegAddr::Alarm1Hours), 0x07);
        assert_eq!(regs.reg(RegAddr::Alarm1DayDate), 0x01);
        assert_eq!(regs.reg(RegAddr::Control), 0x05);
        // set_hwclock is off
        assert_eq!(regs.reg(RegAddr::Hours), 0x00);
    }

    #[test]
    fn test_stop_uses_configured_slot() {
        let host = FakeHost::booting_at(at(2024, 4, 30, 22, 0, 0), "05/01/2024 08:00\n");
        let mut wake = service(
            RegisterFile::new(),
            host,
            Config {
                alarm: AlarmSlot::Two,
                ..config()
            },
        );

        wake.stop();
        let regs = &wake.rtc.i2c;
        assert_eq!(regs.reg(RegAddr::Alarm1Minutes), 0x00);
        assert_eq!(regs.reg(RegAddr::Alarm2Minutes), 0x50);
        assert_eq!(regs.reg(RegAddr::Alarm2Hours), 0x07);
        assert_eq!(regs.reg(RegAddr::Alarm2DayDate), 0x01);
        assert_eq!(regs.reg(RegAddr::Control), 0x02);
    }

    #[test]
    fn test_stop_without_next_boot_syncs_clock() {
        let host = FakeHost::booting_at(at(2024, 4, 30, 22, 15, 7), "");
        let mut wake = service(
            RegisterFile::new(),
            host,
            Config {
                set_hwclock: true,
                ..config()
            },
        );

        wake.stop();
        let regs = &wake.rtc.i2c;
        assert_eq!(regs.reg(RegAddr::Control), 0x00);
        assert_eq!(regs.reg(RegAddr::Alarm1Hours), 0x00);
        assert_eq!(
            wake.rtc.datetime().unwrap(),
            at(2024, 4, 30, 22, 15, 7)
        );
        // 2024-04-30 is a Tuesday
        assert_eq!(wake.rtc.i2c.reg(RegAddr::Day), 2);
    }

    #[test]
    fn test_stop_goes_on_after_next_boot_failure() {
        let host = FakeHost {
            now: Some(at(2024, 4, 30, 22, 0, 0)),
            next_boot: None,
            ..Default::default()
        };
        let mut wake = service(
            RegisterFile::new(),
            host,
            Config {
                set_hwclock: true,
                ..config()
            },
        );

        wake.stop();
        assert_eq!(wake.rtc.i2c.reg(RegAddr::Control), 0x00);
        assert_eq!(wake.rtc.i2c.reg(RegAddr::Hours), 0x22);
    }

    #[test]
    fn test_stop_out_of_range_lead_time_still_syncs_clock() {
        let host = FakeHost::booting_at(at(2024, 4, 30, 22, 0, 0), "2024-05-01 08:00:00\n");
        let mut wake = service(
            RegisterFile::new(),
            host,
            Config {
                lead_time: 1_000_000_000_000,
                set_hwclock: true,
                ..config()
            },
        );

        wake.stop();
        assert_eq!(wake.rtc.i2c.reg(RegAddr::Control), 0x00);
        assert_eq!(wake.rtc.i2c.reg(RegAddr::Alarm1Hours), 0x00);
        assert_eq!(wake.rtc.i2c.reg(RegAddr::Hours), 0x22);
    }

    #[test]
    fn test_out_of_range_lead_time_skips_auto_halt() {
        let host = FakeHost::booting_at(at(2024, 5, 1, 5, 0, 0), "2024-05-01 08:00:00\n");
        let mut wake = service(
            alarm_one_fired(),
            host,
            Config {
                lead_time: i64::MIN,
                ..config()
            },
        );

        assert_eq!(wake.start().unwrap(), BootMode::Alarm);
        assert_eq!(wake.host.next_boot_runs.len(), 1);
        assert_eq!(wake.host.shutdowns, 0);
    }

    #[test]
    fn test_stop_survives_missing_rtc() {
        let mut regs = RegisterFile::new();
        regs.offline = true;
        let host = FakeHost::booting_at(at(2024, 4, 30, 22, 0, 0), "2024-05-01 08:00:00\n");
        let mut wake = service(
            regs,
            host,
            Config {
                set_hwclock: true,
                ..config()
            },
        );

        wake.run(Directive::Stop).unwrap();
        assert_eq!(wake.host.next_boot_runs.len(), 1);
    }
}
