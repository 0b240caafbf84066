//! [`Host`] for a Linux system running the service from its init scripts.

use std::fs;
use std::io;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use chrono::NaiveDateTime;
use log::debug;

use crate::next_boot::CommandOutput;
use crate::wake::{BootMode, Host};
use crate::TimeBase;

/// Where the boot mode is left for other services.
pub const STATUS_PATH: &str = "/var/run/wake-on-rtc.status";

/// Runs commands through the system shell and keeps the status in a file.
#[derive(Debug, Clone)]
pub struct LinuxHost {
    status_path: PathBuf,
}

impl LinuxHost {
    pub fn new() -> Self {
        Self::with_status_path(STATUS_PATH)
    }

    pub fn with_status_path(path: impl Into<PathBuf>) -> Self {
        Self {
            status_path: path.into(),
        }
    }
}

impl Default for LinuxHost {
    fn default() -> Self {
        Self::new()
    }
}

impl Host for LinuxHost {
    fn now(&self) -> NaiveDateTime {
        TimeBase::Local.now()
    }

    fn run_next_boot(&mut self, command: &str) -> io::Result<CommandOutput> {
        let output = Command::new(command).stdin(Stdio::null()).output()?;
        debug!("{} exited with {}", command, output.status);
        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    fn spawn_boot_hook(&mut self, hook: &str, mode: BootMode) -> io::Result<()> {
        Command::new("sh")
            .arg("-c")
            .arg(format!("{} {}", hook, mode))
            .stdin(Stdio::null())
            .spawn()?;
        Ok(())
    }

    fn schedule_shutdown(&mut self) -> io::Result<()> {
        Command::new("shutdown")
            .args(["-P", "+1"])
            .stdin(Stdio::null())
            .spawn()?;
        Ok(())
    }

    fn write_status(&mut self, mode: BootMode) -> io::Result<()> {
        fs::write(&self.status_path, mode.as_str())
    }
}
