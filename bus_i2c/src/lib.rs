//! # I2C Bus Protocol Engine
//!
//! A start/address/data/stop bus master built on the HAL register
//! primitives, and the device driver that exposes it through the HAL
//! device contract.
//!
//! ## Philosophy
//!
//! - **Bounded**: every status wait has an iteration budget
//! - **Bus left clean**: once START is asserted, STOP follows on every path
//! - **Restart, never resume**: retries rerun the whole transaction
//! - **Testable**: [`sim::SimulatedController`] stands in for the hardware
//!
//! ## Example
//!
//! ```rust
//! use bus_i2c::{I2cConfig, I2cController, SimulatedController};
//!
//! let sim = SimulatedController::new(bus_i2c::regs::DEFAULT_BASE);
//! sim.attach(0x50);
//!
//! let mut i2c = I2cController::new(sim.clone(), I2cConfig::default());
//! i2c.init().unwrap();
//! i2c.write_register(0x50, 0x10, 0xAB).unwrap();
//! assert_eq!(i2c.read_register(0x50, 0x10), Ok(0xAB));
//! ```

pub mod config;
pub mod controller;
pub mod device;
pub mod diag;
pub mod error;
pub mod regs;
pub mod sim;

pub use config::{I2cConfig, I2cSpeed, I2C_MAX_RETRIES, I2C_SCAN_TIMEOUT, I2C_TIMEOUT};
pub use controller::{
    Direction, I2cController, I2cStats, Payload, PeripheralAddress, Phase, Transaction,
};
pub use device::I2cDevice;
pub use diag::{log_registers, DiagCommand, DiagReport, RegisterDump};
pub use error::{ConfigError, DiagError};
pub use sim::SimulatedController;
