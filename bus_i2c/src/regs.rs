//! I2C controller register map
//!
//! Four 32-bit registers at fixed offsets from the controller base.

use bitflags::bitflags;

/// Default controller base address
pub const DEFAULT_BASE: usize = 0x4000_3000;

/// Status register offset
pub const STATUS: usize = 0x00;
/// Control register offset
pub const CONTROL: usize = 0x04;
/// Data register offset
pub const DATA: usize = 0x08;
/// Clock divisor register offset
pub const CLOCK: usize = 0x0C;

/// Direction bit ORed into the address byte for reads
pub const READ_BIT: u8 = 0x01;

bitflags! {
    /// Status register bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct StatusFlags: u32 {
        /// Another transfer holds the bus
        const BUSY = 1 << 0;
        /// The last byte finished transferring
        const DONE = 1 << 1;
    }
}

bitflags! {
    /// Control register bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ControlFlags: u32 {
        /// Generate a START condition
        const START = 1 << 0;
        /// Generate a STOP condition
        const STOP = 1 << 1;
        /// Acknowledge received bytes automatically
        const ACK = 1 << 2;
    }
}
