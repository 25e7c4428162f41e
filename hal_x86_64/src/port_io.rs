//! Port I/O abstraction for x86_64
//!
//! Port-mapped register access for the legacy devices the core drives
//! directly (the 8259 PIC mask registers). A trait keeps real hardware and
//! test doubles interchangeable.
//!
//! ## Safety
//!
//! Port I/O operations directly interact with hardware. Only `RealPortIo`
//! executes `in`/`out`, and each instruction sits in its own small
//! `unsafe` block.

/// Port I/O trait
///
/// ## Implementation Notes
///
/// Implementations must guarantee:
/// - `inb` reads a byte from the specified port
/// - `outb` writes a byte to the specified port
/// - Operations complete synchronously before returning
pub trait PortIo {
    /// Reads a byte from an I/O port
    fn inb(&mut self, port: u16) -> u8;

    /// Writes a byte to an I/O port
    fn outb(&mut self, port: u16, value: u8);
}

/// Real hardware port I/O implementation
///
/// ## Safety
///
/// Only sound when running at ring 0 on x86 and accessing ports that belong
/// to the caller.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealPortIo;

impl RealPortIo {
    /// Creates a new real port I/O implementation
    pub fn new() -> Self {
        Self
    }
}

impl PortIo for RealPortIo {
    #[inline]
    fn inb(&mut self, port: u16) -> u8 {
        // SAFETY: callers only pass ports owned by the driver using them and
        // run with I/O privilege. `in al, dx` touches no memory or stack.
        unsafe {
            let value: u8;
            core::arch::asm!(
                "in al, dx",
                in("dx") port,
                out("al") value,
                options(nomem, nostack, preserves_flags)
            );
            value
        }
    }

    #[inline]
    fn outb(&mut self, port: u16, value: u8) {
        // SAFETY: as for `inb`; `out dx, al` touches no memory or stack.
        unsafe {
            core::arch::asm!(
                "out dx, al",
                in("dx") port,
                in("al") value,
                options(nomem, nostack, preserves_flags)
            );
        }
    }
}

/// Fake port I/O implementation for testing
///
/// Reads come from a script first. Once the script is exhausted a strict
/// fake panics, while a latching fake returns the last byte written to the
/// port (or `0xFF`, the value of a floating bus), so read-modify-write
/// sequences behave like real latched registers.
///
/// ## Example
///
/// ```rust
/// use hal_x86_64::port_io::{FakePortIo, PortIo};
///
/// let mut io = FakePortIo::latching();
/// io.outb(0x21, 0xFB);
/// assert_eq!(io.inb(0x21), 0xFB);
/// assert_eq!(io.inb(0xA1), 0xFF);
/// ```
#[derive(Debug, Default)]
pub struct FakePortIo {
    /// Scripted read values: (port, value)
    read_script: Vec<(u16, u8)>,
    /// Current read index
    read_index: usize,
    /// Captured write operations: (port, value)
    writes: Vec<(u16, u8)>,
    /// Fall back to the last written value when the script runs out
    latching: bool,
}

impl FakePortIo {
    /// Creates a strict fake: unscripted reads panic
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a latching fake: unscripted reads return the last write
    pub fn latching() -> Self {
        Self {
            latching: true,
            ..Self::default()
        }
    }

    /// Scripts a read operation
    pub fn script_read(&mut self, port: u16, value: u8) {
        self.read_script.push((port, value));
    }

    /// Scripts multiple read operations
    pub fn script_reads(&mut self, reads: &[(u16, u8)]) {
        self.read_script.extend_from_slice(reads);
    }

    /// Returns the number of scripted reads remaining
    pub fn remaining_reads(&self) -> usize {
        self.read_script.len() - self.read_index
    }

    /// Returns all captured write operations
    pub fn writes(&self) -> &[(u16, u8)] {
        &self.writes
    }

    /// Returns the last byte written to `port`
    pub fn last_write(&self, port: u16) -> Option<u8> {
        self.writes
            .iter()
            .rev()
            .find(|(p, _)| *p == port)
            .map(|(_, value)| *value)
    }

    /// Clears all captured writes
    pub fn clear_writes(&mut self) {
        self.writes.clear();
    }
}

impl PortIo for FakePortIo {
    fn inb(&mut self, port: u16) -> u8 {
        if self.read_index < self.read_script.len() {
            let (expected_port, value) = self.read_script[self.read_index];
            if port != expected_port {
                panic!(
                    "FakePortIo: Port mismatch at read_index={}: expected 0x{:04X}, got 0x{:04X}",
                    self.read_index, expected_port, port
                );
            }
            self.read_index += 1;
            return value;
        }

        if self.latching {
            return self.last_write(port).unwrap_or(0xFF);
        }

        panic!(
            "FakePortIo: No scripted read for port 0x{:04X} (read_index={}, script_len={})",
            port,
            self.read_index,
            self.read_script.len()
        );
    }

    fn outb(&mut self, port: u16, value: u8) {
        self.writes.push((port, value));
    }
}
