//! 8259 Programmable Interrupt Controller
//!
//! Two cascaded PICs give 16 lines. Lines 0-7 are masked through the master
//! data port, lines 8-15 through the slave's. A set bit masks the line.

use hal::{HalError, HalResult};

use crate::port_io::PortIo;

/// Master PIC command port
pub const PIC1_COMMAND: u16 = 0x20;
/// Master PIC data (mask) port
pub const PIC1_DATA: u16 = 0x21;
/// Slave PIC command port
pub const PIC2_COMMAND: u16 = 0xA0;
/// Slave PIC data (mask) port
pub const PIC2_DATA: u16 = 0xA1;

/// Number of lines the cascaded pair can route
pub const PIC_LINES: usize = 16;

/// Vector the master's line 0 is remapped to
pub const IRQ_BASE_VECTOR: u8 = 32;

const ICW1_INIT: u8 = 0x10;
const ICW1_ICW4: u8 = 0x01;
const ICW4_8086: u8 = 0x01;
const EOI: u8 = 0x20;

/// Cascaded 8259 pair
#[derive(Debug)]
pub struct Pic8259<P> {
    io: P,
}

impl<P: PortIo> Pic8259<P> {
    /// Wraps a port accessor; does not touch the hardware
    pub fn new(io: P) -> Self {
        Self { io }
    }

    /// Reprograms both PICs to deliver at `master_offset`/`slave_offset`
    ///
    /// Masks are preserved across the initialization sequence.
    pub fn initialize(&mut self, master_offset: u8, slave_offset: u8) {
        let master_mask = self.io.inb(PIC1_DATA);
        let slave_mask = self.io.inb(PIC2_DATA);

        self.io.outb(PIC1_COMMAND, ICW1_INIT | ICW1_ICW4);
        self.io.outb(PIC2_COMMAND, ICW1_INIT | ICW1_ICW4);
        self.io.outb(PIC1_DATA, master_offset);
        self.io.outb(PIC2_DATA, slave_offset);
        // Slave sits on master line 2; slave cascade identity is 2.
        self.io.outb(PIC1_DATA, 1 << 2);
        self.io.outb(PIC2_DATA, 2);
        self.io.outb(PIC1_DATA, ICW4_8086);
        self.io.outb(PIC2_DATA, ICW4_8086);

        self.io.outb(PIC1_DATA, master_mask);
        self.io.outb(PIC2_DATA, slave_mask);
    }

    /// Sets or clears the mask bit of `line`
    pub fn set_masked(&mut self, line: usize, masked: bool) -> HalResult<()> {
        let (port, bit) = match line {
            0..=7 => (PIC1_DATA, line),
            8..=15 => (PIC2_DATA, line - 8),
            _ => return Err(HalError::OutOfRange(line)),
        };

        let mut mask = self.io.inb(port);
        if masked {
            mask |= 1 << bit;
        } else {
            mask &= !(1 << bit);
        }
        self.io.outb(port, mask);
        Ok(())
    }

    /// Returns whether `line` is masked
    pub fn is_masked(&mut self, line: usize) -> HalResult<bool> {
        match line {
            0..=7 => Ok(self.io.inb(PIC1_DATA) & (1 << line) != 0),
            8..=15 => Ok(self.io.inb(PIC2_DATA) & (1 << (line - 8)) != 0),
            _ => Err(HalError::OutOfRange(line)),
        }
    }

    /// Signals end of interrupt for `line`
    pub fn end_of_interrupt(&mut self, line: usize) {
        if line >= 8 {
            self.io.outb(PIC2_COMMAND, EOI);
        }
        self.io.outb(PIC1_COMMAND, EOI);
    }

    /// Returns the port accessor
    pub fn io(&self) -> &P {
        &self.io
    }
}
