//! Output contract of the external next-boot command.
//!
//! The command prints the next time the machine has to be up, in one of
//! three date layouts, optionally followed by a time:
//!
//! | contains | layout            |
//! |----------|-------------------|
//! | `/`      | `MM/DD/YYYY`      |
//! | `-`      | `YYYY-MM-DD`      |
//! | neither  | `DD.MM.YYYY`      |
//!
//! A missing time means midnight and a time without seconds gets `:00`. A
//! two-digit year is accepted in place of the four-digit one. Anything the
//! command writes to stderr is treated as a failure, and output shorter than
//! eight characters means no boot is scheduled.

use chrono::NaiveDateTime;
use log::debug;

/// Raw output of one run of the next-boot command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Output shorter than this means no boot is scheduled.
const MIN_OUTPUT_LEN: usize = 8;

/// Errors of the next-boot query.
#[derive(Debug)]
pub enum NextBootError {
    /// The command could not be run
    Spawn(std::io::Error),
    /// The command wrote to stderr
    Stderr(String),
    /// The command's output is not a date and time
    Malformed(String),
    /// The boot time less this many minutes of lead time is not representable
    LeadTime(i64),
}

impl core::fmt::Display for NextBootError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            NextBootError::Spawn(e) => write!(f, "failed to run next_boot command: {}", e),
            NextBootError::Stderr(text) => write!(f, "next_boot command failed: {}", text.trim()),
            NextBootError::Malformed(text) => write!(f, "malformed boot time: {:?}", text),
            NextBootError::LeadTime(minutes) => {
                write!(f, "lead time of {} minutes is out of range", minutes)
            }
        }
    }
}

impl std::error::Error for NextBootError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            NextBootError::Spawn(e) => Some(e),
            _ => None,
        }
    }
}

/// Interprets one run of the next-boot command.
///
/// Returns `Ok(None)` when no boot is scheduled.
pub fn boot_time_from_output(output: &CommandOutput) -> Result<Option<NaiveDateTime>, NextBootError> {
    debug!("raw boot time: {:?}", output.stdout);
    if !output.stderr.is_empty() {
        return Err(NextBootError::Stderr(output.stderr.clone()));
    }
    if output.stdout.len() < MIN_OUTPUT_LEN {
        return Ok(None);
    }
    parse_boot_time(output.stdout.trim()).map(Some)
}

/// Parses a date and optional time in any of the supported layouts.
pub fn parse_boot_time(text: &str) -> Result<NaiveDateTime, NextBootError> {
    let malformed = || NextBootError::Malformed(text.to_string());

    let dashed = text.contains('-');
    let mut format = if text.contains('/') {
        String::from("%m/%d/%Y %H:%M:%S")
    } else if dashed {
        String::from("%Y-%m-%d %H:%M:%S")
    } else {
        String::from("%d.%m.%Y %H:%M:%S")
    };

    let mut full = text.to_string();
    if !full.contains(':') {
        full.push_str(" 00:00:00");
    }

    let (count, two_digit_year) = {
        let parts: Vec<&str> = full.split(['.', '/', ':', '-', ' ']).collect();
        let year = if dashed { parts.first() } else { parts.get(2) };
        (parts.len(), year.map_or(false, |y| y.len() == 2))
    };
    match count {
        5 => full.push_str(":00"),
        6 => {}
        _ => return Err(malformed()),
    }
    if two_digit_year {
        format = format.replace('Y', "y");
    }

    NaiveDateTime::parse_from_str(&full, &format).map_err(|_| malformed())
}
