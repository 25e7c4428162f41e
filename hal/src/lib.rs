//! # Hardware Abstraction Layer (HAL)
//!
//! This crate is the architecture-neutral core shared by device drivers.
//!
//! ## Philosophy
//!
//! **Drivers plug into the core; the core never reaches into drivers.**
//!
//! A driver registers with the interrupt table to react to hardware events,
//! and implements the [`Driver`] contract to be operated through a uniform
//! [`Device`] handle. Architecture crates implement [`InterruptController`]
//! and [`RegisterIo`] for real hardware.
//!
//! ## Design Principles
//!
//! 1. **No architecture-specific assumptions**: port I/O, PIC masks and CPU
//!    flags live in the architecture crates
//! 2. **Trait-based**: every hardware access goes through a trait
//! 3. **Busy-polling, bounded**: every blocking loop is a [`poll_until`] with
//!    an explicit budget and an injectable [`Relax`] hook
//! 4. **Testable**: hardware can be replaced with fakes

pub mod context;
pub mod device;
pub mod error;
pub mod interrupts;
pub mod poll;
pub mod registers;
pub mod timer;

pub use context::HalContext;
pub use device::{
    Device, DeviceStatus, DeviceType, Driver, IoctlCommand, StatusCell, IRQ_VECTOR_OFFSET,
};
pub use error::{HalError, HalResult};
pub use interrupts::{
    Dispatch, InterruptController, InterruptTable, IrqContext, IrqDescriptor, IrqFlags,
    IrqHandler, MAX_LINES,
};
pub use poll::{poll_until, Relax, SpinRelax};
pub use registers::{FakeRegisterFile, Mmio, RegisterAccess, RegisterBlock, RegisterIo};
pub use timer::{TimerCallback, TimerDevice, TimerId, TimerTable, MAX_TIMERS};
