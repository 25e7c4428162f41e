//! CPU interrupt-flag control
//!
//! Save/restore of RFLAGS.IF, the global half of the interrupt critical
//! section. The per-line half is the PIC mask in [`crate::pic`].

/// Interrupt flag (IF) bit in RFLAGS
pub const RFLAGS_IF: usize = 1 << 9;

/// Access to the CPU's global interrupt flag
pub trait CpuFlags {
    /// Returns RFLAGS and clears IF, atomically with respect to interrupts
    fn save_and_cli(&mut self) -> usize;

    /// Writes back a value returned by [`CpuFlags::save_and_cli`]
    fn restore(&mut self, flags: usize);

    /// Returns the current RFLAGS
    fn read(&self) -> usize;
}

/// Real RFLAGS access through `pushfq`/`popfq`
#[derive(Debug, Default, Clone, Copy)]
pub struct RealCpuFlags;

impl CpuFlags for RealCpuFlags {
    #[inline]
    fn save_and_cli(&mut self) -> usize {
        let flags: usize;
        // SAFETY: pushes RFLAGS, pops it into a register and clears IF.
        // Only meaningful at ring 0; the stack use is balanced.
        unsafe {
            core::arch::asm!(
                "pushfq",
                "cli",
                "pop {}",
                out(reg) flags,
                options(nomem)
            );
        }
        flags
    }

    #[inline]
    fn restore(&mut self, flags: usize) {
        // SAFETY: writes back a value previously read from RFLAGS.
        unsafe {
            core::arch::asm!(
                "push {}",
                "popfq",
                in(reg) flags,
                options(nomem)
            );
        }
    }

    #[inline]
    fn read(&self) -> usize {
        let flags: usize;
        // SAFETY: reading RFLAGS has no side effects.
        unsafe {
            core::arch::asm!("pushfq", "pop {}", out(reg) flags, options(nomem, preserves_flags));
        }
        flags
    }
}

/// Fake RFLAGS for tests
#[derive(Debug, Clone, Copy)]
pub struct FakeCpuFlags {
    rflags: usize,
    saves: usize,
    restores: usize,
}

impl FakeCpuFlags {
    /// Creates fake flags with IF set or clear
    pub fn new(interrupts_enabled: bool) -> Self {
        // Bit 1 of RFLAGS is reserved and always reads as one.
        let mut rflags = 1 << 1;
        if interrupts_enabled {
            rflags |= RFLAGS_IF;
        }
        Self {
            rflags,
            saves: 0,
            restores: 0,
        }
    }

    /// Returns how many times flags were saved
    pub fn saves(&self) -> usize {
        self.saves
    }

    /// Returns how many times flags were restored
    pub fn restores(&self) -> usize {
        self.restores
    }
}

impl CpuFlags for FakeCpuFlags {
    fn save_and_cli(&mut self) -> usize {
        self.saves += 1;
        let saved = self.rflags;
        self.rflags &= !RFLAGS_IF;
        saved
    }

    fn restore(&mut self, flags: usize) {
        self.restores += 1;
        self.rflags = flags;
    }

    fn read(&self) -> usize {
        self.rflags
    }
}
