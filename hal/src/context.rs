//! Process-wide HAL state
//!
//! The interrupt table and the software timers are single-instance state.
//! Instead of module-level globals they live in one explicitly created
//! [`HalContext`] that the platform passes to whoever needs it.

use log::info;

use crate::interrupts::{InterruptController, InterruptTable};
use crate::timer::TimerTable;

/// Owner of the interrupt table and the software timer table
pub struct HalContext<C> {
    pub interrupts: InterruptTable<C>,
    pub timers: TimerTable,
}

impl<C: InterruptController> HalContext<C> {
    /// Initializes the context over a platform interrupt controller
    ///
    /// Call once at boot, before any driver registers a handler.
    pub fn init(controller: C) -> Self {
        info!("HAL context initialized");
        Self {
            interrupts: InterruptTable::new(controller),
            timers: TimerTable::new(),
        }
    }

    /// Tears the context down
    ///
    /// Masks and removes every registered line and stops every timer, with
    /// interrupts disabled for the duration. Returns the controller.
    pub fn shutdown(mut self) -> C {
        let lines: Vec<usize> = self.interrupts.registered_lines().collect();
        self.interrupts.critical_section(|table| {
            for &line in &lines {
                // Lines the controller cannot route were never unmasked.
                let _ = table.disable(line);
                table.remove(line);
            }
        });
        self.timers.stop_all();
        info!("HAL context shut down ({} handlers removed)", lines.len());
        self.interrupts.into_controller()
    }
}
