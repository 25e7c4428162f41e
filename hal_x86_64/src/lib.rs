//! # x86_64 Hardware Abstraction Layer
//!
//! This crate implements the HAL traits for the x86_64 architecture.
//!
//! ## Scope
//!
//! - [`port_io`]: `in`/`out` port access and a scriptable fake
//! - [`pic`]: the cascaded 8259 mask and end-of-interrupt registers
//! - [`cpu_flags`]: RFLAGS.IF save/restore
//! - [`interrupts`]: the [`hal::InterruptController`] built from the above
//!
//! Memory-mapped device registers need nothing architecture-specific and go
//! through [`hal::Mmio`].

use hal::HalContext;
use log::info;

pub mod cpu_flags;
pub mod interrupts;
pub mod pic;
pub mod port_io;

pub use cpu_flags::{CpuFlags, FakeCpuFlags, RealCpuFlags, RFLAGS_IF};
pub use interrupts::X86InterruptController;
pub use pic::{Pic8259, IRQ_BASE_VECTOR, PIC_LINES};
pub use port_io::{FakePortIo, PortIo, RealPortIo};

/// Interrupt controller for real hardware
pub type BootController = X86InterruptController<RealPortIo, RealCpuFlags>;

/// Builds a [`HalContext`] over an existing port accessor and flag source
///
/// Remaps the PICs to vectors 32..48 before handing the controller over.
pub fn context_with<P: PortIo, F: CpuFlags>(
    io: P,
    flags: F,
) -> HalContext<X86InterruptController<P, F>> {
    let mut controller = X86InterruptController::new(io, flags);
    controller
        .pic_mut()
        .initialize(IRQ_BASE_VECTOR, IRQ_BASE_VECTOR + 8);
    info!(
        "PIC remapped to vectors {}..{}",
        IRQ_BASE_VECTOR,
        IRQ_BASE_VECTOR as usize + PIC_LINES
    );
    HalContext::init(controller)
}

/// Builds the boot-time [`HalContext`] on real hardware
///
/// Only meaningful at ring 0.
pub fn boot_context() -> HalContext<BootController> {
    context_with(RealPortIo::new(), RealCpuFlags)
}
