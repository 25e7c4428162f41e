//! Bounded busy-polling
//!
//! Every blocking operation in the core is a tight poll loop on a single
//! execution context. The only yield point is an explicit [`Relax`] hook
//! called once per failed iteration, so hosts that need cooperative
//! yielding can inject one without changing the timing contract.

use crate::error::{HalError, HalResult};

/// Hook invoked between poll iterations
pub trait Relax {
    /// Called once after each iteration whose condition was false
    fn relax(&mut self);
}

/// Default relax hook: a CPU spin-loop hint
#[derive(Debug, Default, Clone, Copy)]
pub struct SpinRelax;

impl Relax for SpinRelax {
    #[inline]
    fn relax(&mut self) {
        core::hint::spin_loop();
    }
}

impl<F: FnMut()> Relax for F {
    fn relax(&mut self) {
        self()
    }
}

/// Polls `condition` until it holds, at most `budget` times
///
/// Returns the number of evaluations it took on success. Returns
/// [`HalError::Timeout`] after exactly `budget` false evaluations; a zero
/// budget times out without evaluating the condition.
pub fn poll_until<R, F>(budget: u32, relax: &mut R, mut condition: F) -> HalResult<u32>
where
    R: Relax + ?Sized,
    F: FnMut() -> bool,
{
    for attempt in 1..=budget {
        if condition() {
            return Ok(attempt);
        }
        relax.relax();
    }
    Err(HalError::Timeout)
}
