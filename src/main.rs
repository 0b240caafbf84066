//! `wake-on-rtc start|stop`, run once at boot and once at shutdown.
//!
//! The process exits 0 after either flow and after a missing or unsupported
//! argument, and non-zero when the boot flow cannot read or disarm the alarm
//! or write the status file. SIGTERM and SIGINT are not caught: the process
//! dies with the default signal disposition and the init system sees a
//! signal exit rather than 0. Log records are written unbuffered, so nothing
//! logged before the signal is lost.

use std::fs::OpenOptions;

use anyhow::{Context, Result};
use linux_embedded_hal::I2cdev;
use log::{debug, error, warn, LevelFilter};

use wake_on_rtc::config::{self, Config};
use wake_on_rtc::host::LinuxHost;
use wake_on_rtc::wake::{Directive, WakeOnRtc};
use wake_on_rtc::DS3231;

const LOG_PATH: &str = "/var/log/wake-on-rtc.log";

/// With `debug` set, log everything to [`LOG_PATH`]; otherwise only warnings
/// and errors go to stderr. `RUST_LOG` overrides the level.
fn init_logging(debug: bool) {
    let mut builder = env_logger::Builder::new();
    if debug {
        builder.filter_level(LevelFilter::Debug);
        match OpenOptions::new().create(true).append(true).open(LOG_PATH) {
            Ok(file) => {
                builder.target(env_logger::Target::Pipe(Box::new(file)));
            }
            Err(e) => eprintln!("cannot open {}: {}", LOG_PATH, e),
        }
    } else {
        builder.filter_level(LevelFilter::Warn);
    }
    builder.parse_default_env().init();
}

fn main() -> Result<()> {
    let config = Config::load(config::DEFAULT_PATH);
    init_logging(config.as_ref().map_or(false, |c| c.debug));
    let config = config.with_context(|| format!("reading {}", config::DEFAULT_PATH))?;
    debug!("config: {:?}", config);

    let directive = match Directive::from_args(std::env::args().skip(1)) {
        Ok(directive) => directive,
        Err(e) => {
            warn!("{}", e);
            return Ok(());
        }
    };

    let device = config.i2c_device();
    let i2c = I2cdev::new(&device).with_context(|| format!("opening {}", device))?;
    let rtc = DS3231::new(i2c, config.device_config());

    let mut service = WakeOnRtc::new(rtc, LinuxHost::new(), config);
    if let Err(e) = service.run(directive) {
        error!("error while executing service: {}", e);
        return Err(e.into());
    }
    Ok(())
}
