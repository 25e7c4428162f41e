//! x86_64 interrupt controller
//!
//! Combines the 8259 mask registers with the CPU interrupt flag into the
//! [`InterruptController`] the HAL interrupt table drives.

use hal::{HalResult, InterruptController, IrqFlags};

use crate::cpu_flags::{CpuFlags, RFLAGS_IF};
use crate::pic::Pic8259;
use crate::port_io::PortIo;

/// PIC-backed interrupt controller
#[derive(Debug)]
pub struct X86InterruptController<P, F> {
    pic: Pic8259<P>,
    flags: F,
    ack_count: u64,
}

impl<P: PortIo, F: CpuFlags> X86InterruptController<P, F> {
    /// Creates a controller over a port accessor and CPU flag access
    pub fn new(io: P, flags: F) -> Self {
        Self {
            pic: Pic8259::new(io),
            flags,
            ack_count: 0,
        }
    }

    /// Returns the PIC
    pub fn pic(&self) -> &Pic8259<P> {
        &self.pic
    }

    /// Returns the PIC mutably
    pub fn pic_mut(&mut self) -> &mut Pic8259<P> {
        &mut self.pic
    }

    /// Returns the CPU flag accessor
    pub fn cpu_flags(&self) -> &F {
        &self.flags
    }

    /// Acknowledges `line` at the PIC after its handler ran
    pub fn acknowledge(&mut self, line: usize) {
        self.pic.end_of_interrupt(line);
        self.ack_count = self.ack_count.saturating_add(1);
    }

    /// Returns the number of acknowledgments sent
    pub fn ack_count(&self) -> u64 {
        self.ack_count
    }
}

impl<P: PortIo, F: CpuFlags> InterruptController for X86InterruptController<P, F> {
    fn set_masked(&mut self, line: usize, masked: bool) -> HalResult<()> {
        self.pic.set_masked(line, masked)
    }

    fn save_and_disable(&mut self) -> IrqFlags {
        IrqFlags(self.flags.save_and_cli())
    }

    fn restore(&mut self, flags: IrqFlags) {
        self.flags.restore(flags.0);
    }

    fn interrupts_enabled(&self) -> bool {
        self.flags.read() & RFLAGS_IF != 0
    }
}
