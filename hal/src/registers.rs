//! Register access primitives
//!
//! Typed 32-bit reads and writes over memory-mapped registers. Port-mapped
//! I/O is architecture-specific and lives in the architecture crates.
//!
//! ## Implementations
//!
//! - **Mmio**: volatile access to real hardware addresses
//! - **FakeRegisterFile**: shared in-memory register file for tests
//!
//! Implementations are cheap handles. Cloning one yields another view of
//! the same registers, the way two drivers alias one hardware block.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

/// Memory-mapped register access
///
/// ## Implementation Notes
///
/// Implementations must guarantee:
/// - Every call reaches the register (no caching, no elision)
/// - Operations complete synchronously before returning
pub trait RegisterIo {
    /// Reads a 32-bit register at an absolute address
    fn read32(&mut self, addr: usize) -> u32;

    /// Writes a 32-bit register at an absolute address
    fn write32(&mut self, addr: usize, value: u32);

    /// Read-modify-write of a register
    fn modify32(&mut self, addr: usize, f: impl FnOnce(u32) -> u32)
    where
        Self: Sized,
    {
        let value = self.read32(addr);
        self.write32(addr, f(value));
    }

    /// Sets `bits` in a register, leaving the others untouched
    fn set_bits32(&mut self, addr: usize, bits: u32) {
        let value = self.read32(addr);
        self.write32(addr, value | bits);
    }

    /// Clears `bits` in a register, leaving the others untouched
    fn clear_bits32(&mut self, addr: usize, bits: u32) {
        let value = self.read32(addr);
        self.write32(addr, value & !bits);
    }
}

/// Volatile memory-mapped register access
///
/// ## Safety
///
/// Constructing an `Mmio` asserts that every address later passed to it is
/// a mapped, 4-byte aligned device register.
#[derive(Debug, Clone, Copy)]
pub struct Mmio {
    _private: (),
}

impl Mmio {
    /// Creates a volatile register accessor
    ///
    /// # Safety
    ///
    /// The caller must only pass addresses of mapped device registers to the
    /// returned accessor.
    pub const unsafe fn new() -> Self {
        Self { _private: () }
    }
}

impl RegisterIo for Mmio {
    #[inline]
    fn read32(&mut self, addr: usize) -> u32 {
        // SAFETY: `Mmio::new` requires every address to be a mapped register.
        unsafe { core::ptr::read_volatile(addr as *const u32) }
    }

    #[inline]
    fn write32(&mut self, addr: usize, value: u32) {
        // SAFETY: `Mmio::new` requires every address to be a mapped register.
        unsafe { core::ptr::write_volatile(addr as *mut u32, value) }
    }
}

/// A window of registers at fixed offsets from a base address
#[derive(Debug, Clone)]
pub struct RegisterBlock<R> {
    io: R,
    base: usize,
}

impl<R: RegisterIo> RegisterBlock<R> {
    /// Creates a block over `io` starting at `base`
    pub fn new(io: R, base: usize) -> Self {
        Self { io, base }
    }

    /// Returns the base address
    pub fn base(&self) -> usize {
        self.base
    }

    /// Reads the register at `offset`
    pub fn read(&mut self, offset: usize) -> u32 {
        self.io.read32(self.base + offset)
    }

    /// Writes the register at `offset`
    pub fn write(&mut self, offset: usize, value: u32) {
        self.io.write32(self.base + offset, value);
    }

    /// Sets bits in the register at `offset`
    pub fn set_bits(&mut self, offset: usize, bits: u32) {
        self.io.set_bits32(self.base + offset, bits);
    }

    /// Clears bits in the register at `offset`
    pub fn clear_bits(&mut self, offset: usize, bits: u32) {
        self.io.clear_bits32(self.base + offset, bits);
    }

    /// Returns the underlying accessor
    pub fn io_mut(&mut self) -> &mut R {
        &mut self.io
    }
}

/// One recorded register access
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterAccess {
    Read { addr: usize, value: u32 },
    Write { addr: usize, value: u32 },
}

#[derive(Debug, Default)]
struct FakeRegisterState {
    values: BTreeMap<usize, u32>,
    log: Vec<RegisterAccess>,
}

/// Fake register file for testing
///
/// Unwritten registers read as zero. Every access is logged. Clones share
/// state, so a test can keep one handle while the code under test owns
/// another.
///
/// ## Example
///
/// ```rust
/// use hal::registers::{FakeRegisterFile, RegisterIo};
///
/// let mut regs = FakeRegisterFile::new();
/// let probe = regs.clone();
///
/// regs.write32(0x1000, 0xAB);
/// assert_eq!(probe.value(0x1000), 0xAB);
/// assert_eq!(probe.writes_to(0x1000), vec![0xAB]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct FakeRegisterFile {
    state: Rc<RefCell<FakeRegisterState>>,
}

impl FakeRegisterFile {
    /// Creates an empty register file
    pub fn new() -> Self {
        Self::default()
    }

    /// Presets a register without logging an access
    pub fn preset(&self, addr: usize, value: u32) {
        self.state.borrow_mut().values.insert(addr, value);
    }

    /// Returns the current value of a register without logging an access
    pub fn value(&self, addr: usize) -> u32 {
        self.state.borrow().values.get(&addr).copied().unwrap_or(0)
    }

    /// Returns all logged accesses in order
    pub fn accesses(&self) -> Vec<RegisterAccess> {
        self.state.borrow().log.clone()
    }

    /// Returns the values written to `addr`, in order
    pub fn writes_to(&self, addr: usize) -> Vec<u32> {
        self.state
            .borrow()
            .log
            .iter()
            .filter_map(|access| match *access {
                RegisterAccess::Write { addr: a, value } if a == addr => Some(value),
                _ => None,
            })
            .collect()
    }

    /// Returns how many times `addr` was read
    pub fn reads_of(&self, addr: usize) -> usize {
        self.state
            .borrow()
            .log
            .iter()
            .filter(|access| {
                matches!(access, RegisterAccess::Read { addr: a, .. } if *a == addr)
            })
            .count()
    }

    /// Clears the access log, keeping register values
    pub fn clear_log(&self) {
        self.state.borrow_mut().log.clear();
    }
}

impl RegisterIo for FakeRegisterFile {
    fn read32(&mut self, addr: usize) -> u32 {
        let mut state = self.state.borrow_mut();
        let value = state.values.get(&addr).copied().unwrap_or(0);
        state.log.push(RegisterAccess::Read { addr, value });
        value
    }

    fn write32(&mut self, addr: usize, value: u32) {
        let mut state = self.state.borrow_mut();
        state.values.insert(addr, value);
        state.log.push(RegisterAccess::Write { addr, value });
    }
}
