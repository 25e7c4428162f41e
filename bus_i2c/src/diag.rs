//! Diagnostics
//!
//! Developer tools layered over the controller: a register dump, a bus
//! scan and per-address register access. Commands are parsed from a line
//! of text and produce a serializable [`DiagReport`].
//!
//! ```text
//! regs
//! scan
//! read <addr> <reg>
//! write <addr> <reg> <value>
//! speed <hz>
//! stats
//! ```
//!
//! Numbers are decimal or `0x`-prefixed hex.

use core::str::FromStr;

use hal::{HalResult, RegisterIo};
use log::info;
use serde::Serialize;

use crate::controller::{I2cController, I2cStats};
use crate::error::DiagError;
use crate::regs::{ControlFlags, StatusFlags, CLOCK, CONTROL, STATUS};

/// Snapshot of the controller registers
///
/// The data register is left out: reading it consumes a received byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RegisterDump {
    pub base: usize,
    pub status: u32,
    pub control: u32,
    pub clock: u32,
}

impl RegisterDump {
    /// Decoded status bits
    pub fn status_flags(&self) -> StatusFlags {
        StatusFlags::from_bits_truncate(self.status)
    }

    /// Decoded control bits
    pub fn control_flags(&self) -> ControlFlags {
        ControlFlags::from_bits_truncate(self.control)
    }
}

/// Reads, logs and returns the controller registers
pub fn log_registers<R: RegisterIo>(controller: &mut I2cController<R>) -> RegisterDump {
    let dump = RegisterDump {
        base: controller.config().base_address,
        status: controller.read_raw(STATUS),
        control: controller.read_raw(CONTROL),
        clock: controller.read_raw(CLOCK),
    };
    info!("i2c@{:#x} registers:", dump.base);
    info!("  status  {:#010x} {:?}", dump.status, dump.status_flags());
    info!(
        "  control {:#010x} {:?}",
        dump.control, dump.control_flags()
    );
    info!("  clock   {} Hz", dump.clock);
    dump
}

/// A parsed diagnostic command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagCommand {
    Registers,
    Scan,
    Read { address: u8, register: u8 },
    Write { address: u8, register: u8, value: u8 },
    Speed { hz: u32 },
    Stats,
}

impl FromStr for DiagCommand {
    type Err = DiagError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let name = words.next().ok_or(DiagError::Empty)?;

        let command = match name.to_ascii_lowercase().as_str() {
            "regs" => DiagCommand::Registers,
            "scan" => DiagCommand::Scan,
            "read" => DiagCommand::Read {
                address: number(words.next(), "addr")?,
                register: number(words.next(), "reg")?,
            },
            "write" => DiagCommand::Write {
                address: number(words.next(), "addr")?,
                register: number(words.next(), "reg")?,
                value: number(words.next(), "value")?,
            },
            "speed" => DiagCommand::Speed {
                hz: number(words.next(), "hz")?,
            },
            "stats" => DiagCommand::Stats,
            other => return Err(DiagError::UnknownCommand(other.to_string())),
        };

        match words.next() {
            Some(extra) => Err(DiagError::UnexpectedArgument(extra.to_string())),
            None => Ok(command),
        }
    }
}

fn number<T: TryFrom<u64>>(word: Option<&str>, name: &'static str) -> Result<T, DiagError> {
    let word = word.ok_or(DiagError::MissingArgument(name))?;
    let parsed = match word.strip_prefix("0x").or_else(|| word.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => word.parse(),
    };
    parsed
        .ok()
        .and_then(|value| T::try_from(value).ok())
        .ok_or_else(|| DiagError::InvalidNumber(word.to_string()))
}

/// Result of a diagnostic command
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "report", rename_all = "snake_case")]
pub enum DiagReport {
    Registers(RegisterDump),
    Scan { present: Vec<u8> },
    Read { address: u8, register: u8, value: u8 },
    Write { address: u8, register: u8, value: u8 },
    Speed { hz: u32 },
    Stats(I2cStats),
}

impl DiagReport {
    /// Serializes the report as JSON
    pub fn to_json(&self) -> Result<String, DiagError> {
        serde_json::to_string(self).map_err(|e| DiagError::Serialize(e.to_string()))
    }
}

/// Runs a command against the controller
pub fn execute<R: RegisterIo>(
    controller: &mut I2cController<R>,
    command: DiagCommand,
) -> HalResult<DiagReport> {
    let report = match command {
        DiagCommand::Registers => DiagReport::Registers(log_registers(controller)),
        DiagCommand::Scan => DiagReport::Scan {
            present: controller
                .scan_bus()
                .into_iter()
                .map(|address| address.get())
                .collect(),
        },
        DiagCommand::Read { address, register } => DiagReport::Read {
            address,
            register,
            value: controller.read_register(address, register)?,
        },
        DiagCommand::Write {
            address,
            register,
            value,
        } => {
            controller.write_register(address, register, value)?;
            DiagReport::Write {
                address,
                register,
                value,
            }
        }
        DiagCommand::Speed { hz } => {
            controller.set_speed(hz);
            DiagReport::Speed { hz }
        }
        DiagCommand::Stats => DiagReport::Stats(controller.stats()),
    };
    Ok(report)
}
