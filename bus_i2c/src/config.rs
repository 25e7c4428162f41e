//! Controller configuration
//!
//! Defaults match the reference board. A config can be loaded from JSON;
//! fields left out keep their defaults.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::regs::DEFAULT_BASE;

/// Default per-wait poll budget
pub const I2C_TIMEOUT: u32 = 1_000_000;

/// Default attempt count for the retry wrappers
pub const I2C_MAX_RETRIES: u32 = 3;

/// Default per-wait poll budget while scanning
pub const I2C_SCAN_TIMEOUT: u32 = 1_000;

/// Named bus speed classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum I2cSpeed {
    /// 100 kHz
    Standard,
    /// 400 kHz
    Fast,
    /// 3.4 MHz
    High,
}

impl I2cSpeed {
    /// Returns the clock rate in Hz
    pub const fn hz(self) -> u32 {
        match self {
            I2cSpeed::Standard => 100_000,
            I2cSpeed::Fast => 400_000,
            I2cSpeed::High => 3_400_000,
        }
    }

    /// Returns the speed class with exactly this rate
    pub fn from_hz(hz: u32) -> Option<Self> {
        [I2cSpeed::Standard, I2cSpeed::Fast, I2cSpeed::High]
            .into_iter()
            .find(|speed| speed.hz() == hz)
    }
}

/// I2C controller configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct I2cConfig {
    /// Controller register base
    pub base_address: usize,

    /// Status polls allowed per wait during transfers
    pub timeout_budget: u32,

    /// Status polls allowed per wait during a bus scan
    pub scan_timeout_budget: u32,

    /// Attempts made by the retry wrappers
    pub max_retries: u32,

    /// Clock rate written by `init`
    pub default_speed_hz: u32,
}

impl Default for I2cConfig {
    fn default() -> Self {
        Self {
            base_address: DEFAULT_BASE,
            timeout_budget: I2C_TIMEOUT,
            scan_timeout_budget: I2C_SCAN_TIMEOUT,
            max_retries: I2C_MAX_RETRIES,
            default_speed_hz: I2cSpeed::Standard.hz(),
        }
    }
}

impl I2cConfig {
    /// Parses and validates a JSON config
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the values a controller cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_address % 4 != 0 {
            return Err(ConfigError::UnalignedBase(self.base_address));
        }
        if self.timeout_budget == 0 || self.scan_timeout_budget == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }

    /// Sets the register base
    pub fn with_base_address(mut self, base_address: usize) -> Self {
        self.base_address = base_address;
        self
    }

    /// Sets the transfer poll budget
    pub fn with_timeout_budget(mut self, budget: u32) -> Self {
        self.timeout_budget = budget;
        self
    }

    /// Sets the scan poll budget
    pub fn with_scan_timeout_budget(mut self, budget: u32) -> Self {
        self.scan_timeout_budget = budget;
        self
    }

    /// Sets the retry attempt count
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }
}
