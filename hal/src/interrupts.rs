//! Interrupt dispatch
//!
//! A fixed-capacity table mapping interrupt lines to handlers, plus the
//! platform controller that owns the hardware mask register and the global
//! interrupt-enable flag.
//!
//! ## Design
//!
//! - Lookup is plain array indexing: dispatch never allocates and is safe to
//!   run from a trap handler
//! - Registering over a live line replaces the old descriptor (last writer wins)
//! - Handler failures are the handler's business; dispatch never reports them
//! - Callers that can race a trap must wrap `register`/`remove` in
//!   [`InterruptTable::critical_section`] or a save/restore pair

use log::{debug, error, info, warn};

use crate::error::{HalError, HalResult};

/// Number of interrupt lines in the table
pub const MAX_LINES: usize = 256;

/// Opaque word handed back to a handler on every dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IrqContext(pub usize);

/// Interrupt handler signature
pub type IrqHandler = fn(IrqContext);

/// Saved global interrupt-enable state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IrqFlags(pub usize);

/// Platform interrupt controller
///
/// Different architectures have different interrupt mechanisms, but all can
/// implement this trait: a per-line mask and a global enable flag.
pub trait InterruptController {
    /// Sets or clears the hardware mask bit for `line`
    ///
    /// Controllers with fewer pins than [`MAX_LINES`] return
    /// [`HalError::OutOfRange`] for lines they cannot route.
    fn set_masked(&mut self, line: usize, masked: bool) -> HalResult<()>;

    /// Captures the global interrupt-enable state and disables interrupts
    fn save_and_disable(&mut self) -> IrqFlags;

    /// Writes back a state captured by [`InterruptController::save_and_disable`]
    fn restore(&mut self, flags: IrqFlags);

    /// Returns whether interrupts are globally enabled
    fn interrupts_enabled(&self) -> bool;
}

/// Registered handler and metadata for one line
#[derive(Debug, Clone, Copy)]
pub struct IrqDescriptor {
    pub line: usize,
    pub handler: IrqHandler,
    pub context: IrqContext,
    pub priority: u32,
}

/// Result of dispatching one line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// The handler ran to completion
    Handled { priority: u32 },
    /// Nothing was registered on the line
    NoHandler,
}

/// Interrupt dispatch table
pub struct InterruptTable<C> {
    descriptors: [Option<IrqDescriptor>; MAX_LINES],
    controller: C,
    saved: Option<IrqFlags>,
}

impl<C: InterruptController> InterruptTable<C> {
    /// Creates an empty table over a platform controller
    pub fn new(controller: C) -> Self {
        info!("interrupt table initialized ({} lines)", MAX_LINES);
        Self {
            descriptors: [None; MAX_LINES],
            controller,
            saved: None,
        }
    }

    /// Registers `handler` on `line`, replacing any existing descriptor
    pub fn register(
        &mut self,
        line: usize,
        handler: IrqHandler,
        context: IrqContext,
        priority: u32,
    ) -> HalResult<()> {
        let slot = self
            .descriptors
            .get_mut(line)
            .ok_or(HalError::OutOfRange(line))?;

        if slot.is_some() {
            debug!("irq {}: replacing existing handler", line);
        }
        *slot = Some(IrqDescriptor {
            line,
            handler,
            context,
            priority,
        });
        info!("irq {}: handler set with priority {}", line, priority);
        Ok(())
    }

    /// Clears the descriptor on `line`
    ///
    /// An out-of-range line is logged and otherwise ignored.
    pub fn remove(&mut self, line: usize) {
        match self.descriptors.get_mut(line) {
            Some(slot) => {
                *slot = None;
                info!("irq {}: handler removed", line);
            }
            None => error!("irq {}: out of range for removal", line),
        }
    }

    /// Runs the handler registered on `line`, if any
    pub fn dispatch(&self, line: usize) -> Dispatch {
        match self.descriptors.get(line).copied().flatten() {
            Some(descriptor) => {
                (descriptor.handler)(descriptor.context);
                Dispatch::Handled {
                    priority: descriptor.priority,
                }
            }
            None => {
                warn!("irq {}: no handler registered", line);
                Dispatch::NoHandler
            }
        }
    }

    /// Unmasks `line` at the controller
    pub fn enable(&mut self, line: usize) -> HalResult<()> {
        Self::check_line(line)?;
        self.controller.set_masked(line, false)?;
        info!("irq {}: enabled", line);
        Ok(())
    }

    /// Masks `line` at the controller
    pub fn disable(&mut self, line: usize) -> HalResult<()> {
        Self::check_line(line)?;
        self.controller.set_masked(line, true)?;
        info!("irq {}: disabled", line);
        Ok(())
    }

    /// Saves the global enable state and disables all interrupts
    ///
    /// The table keeps a single save slot. Nesting deeper than one level is
    /// not supported; a second save before `restore` is only logged.
    pub fn save_and_disable_all(&mut self) -> IrqFlags {
        let flags = self.controller.save_and_disable();
        if self.saved.replace(flags).is_some() {
            warn!("nested save_and_disable_all: previous saved state overwritten");
        }
        flags
    }

    /// Writes back exactly the captured global enable state
    pub fn restore(&mut self, flags: IrqFlags) {
        self.saved = None;
        self.controller.restore(flags);
    }

    /// Runs `f` with interrupts disabled, restoring the previous state after
    pub fn critical_section<T>(&mut self, f: impl FnOnce(&mut Self) -> T) -> T {
        let flags = self.save_and_disable_all();
        let result = f(self);
        self.restore(flags);
        result
    }

    /// Returns the descriptor on `line`, if any
    pub fn descriptor(&self, line: usize) -> Option<&IrqDescriptor> {
        self.descriptors.get(line).and_then(Option::as_ref)
    }

    /// Returns the lines that currently have a handler
    pub fn registered_lines(&self) -> impl Iterator<Item = usize> + '_ {
        self.descriptors
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .map(|(line, _)| line)
    }

    /// Returns the platform controller
    pub fn controller(&self) -> &C {
        &self.controller
    }

    /// Returns the platform controller mutably
    pub fn controller_mut(&mut self) -> &mut C {
        &mut self.controller
    }

    /// Consumes the table, returning the platform controller
    pub fn into_controller(self) -> C {
        self.controller
    }

    fn check_line(line: usize) -> HalResult<()> {
        if line < MAX_LINES {
            Ok(())
        } else {
            error!("irq {}: out of range", line);
            Err(HalError::OutOfRange(line))
        }
    }
}
