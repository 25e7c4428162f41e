//! # Timers
//!
//! A monotonic tick source and a fixed table of software timers driven by it.
//!
//! ## Philosophy
//!
//! **Time is a service, not a global variable.**
//!
//! [`TimerDevice`] provides access to a monotonic tick counter. It does NOT:
//! - Provide wall-clock time
//! - Block or sleep (polling only)
//! - Implement scheduling
//!
//! [`TimerTable`] holds up to [`MAX_TIMERS`] periodic callbacks. Someone
//! (a timer interrupt handler, or a polling loop) calls [`TimerTable::tick`]
//! once per tick; callbacks run synchronously from inside that call.

use log::{debug, warn};

use crate::error::{HalError, HalResult};

/// Number of software timer slots
pub const MAX_TIMERS: usize = 10;

/// Hardware timer device trait
///
/// Provides access to a monotonic tick counter. Ticks are cumulative
/// and never decrease.
///
/// # Implementation Notes
///
/// - Must be monotonic (never return a smaller value)
/// - Must not block
/// - Tick frequency is implementation-defined
pub trait TimerDevice {
    /// Returns the current tick count
    fn poll_ticks(&mut self) -> u64;
}

/// Software timer callback
pub type TimerCallback = fn();

/// Handle to a started software timer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerId(usize);

impl TimerId {
    /// Returns the slot index
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy)]
struct SoftTimer {
    interval: u32,
    callback: TimerCallback,
    counter: u32,
}

/// Fixed table of periodic software timers
#[derive(Debug)]
pub struct TimerTable {
    slots: [Option<SoftTimer>; MAX_TIMERS],
    /// Source reading at the previous `advance`; `None` until the first one
    last_ticks: Option<u64>,
}

impl TimerTable {
    /// Creates a table with every slot inactive
    pub const fn new() -> Self {
        Self {
            slots: [None; MAX_TIMERS],
            last_ticks: None,
        }
    }

    /// Starts a timer that fires `callback` every `interval` ticks
    ///
    /// Returns [`HalError::Busy`] when every slot is taken. An interval of
    /// zero fires on every tick.
    pub fn start(&mut self, interval: u32, callback: TimerCallback) -> HalResult<TimerId> {
        let index = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(HalError::Busy)?;

        self.slots[index] = Some(SoftTimer {
            interval,
            callback,
            counter: 0,
        });
        debug!("timer {}: started, interval {} ticks", index, interval);
        Ok(TimerId(index))
    }

    /// Stops a timer
    pub fn stop(&mut self, id: TimerId) -> HalResult<()> {
        let slot = self
            .slots
            .get_mut(id.0)
            .ok_or(HalError::OutOfRange(id.0))?;
        if slot.take().is_none() {
            warn!("timer {}: stop on inactive slot", id.0);
        }
        Ok(())
    }

    /// Stops every timer
    pub fn stop_all(&mut self) {
        self.slots = [None; MAX_TIMERS];
    }

    /// Returns whether a timer is running
    pub fn is_active(&self, id: TimerId) -> bool {
        matches!(self.slots.get(id.0), Some(Some(_)))
    }

    /// Returns the number of running timers
    pub fn active_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Advances every active timer by one tick, firing expired callbacks
    ///
    /// Returns the number of callbacks fired.
    pub fn tick(&mut self) -> usize {
        let mut fired = 0;
        for timer in self.slots.iter_mut().flatten() {
            timer.counter += 1;
            if timer.counter >= timer.interval {
                (timer.callback)();
                timer.counter = 0;
                fired += 1;
            }
        }
        fired
    }

    /// Catches up to a tick source, running one [`TimerTable::tick`] per
    /// elapsed tick since the previous call
    ///
    /// The first call only records the source's current reading as the
    /// baseline and fires nothing.
    pub fn advance<T: TimerDevice + ?Sized>(&mut self, source: &mut T) -> usize {
        let now = source.poll_ticks();
        let Some(last) = self.last_ticks.replace(now) else {
            debug!("timers: tick baseline {}", now);
            return 0;
        };
        (0..now.saturating_sub(last)).map(|_| self.tick()).sum()
    }
}

impl Default for TimerTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicUsize, Ordering};

    /// Simple test implementation for demonstration
    struct TestTimer {
        ticks: u64,
    }

    impl TestTimer {
        fn new() -> Self {
            Self { ticks: 0 }
        }

        fn advance(&mut self, delta: u64) {
            self.ticks += delta;
        }
    }

    impl TimerDevice for TestTimer {
        fn poll_ticks(&mut self) -> u64 {
            self.ticks
        }
    }

    static FAST_FIRES: AtomicUsize = AtomicUsize::new(0);
    static SLOW_FIRES: AtomicUsize = AtomicUsize::new(0);
    static ADVANCE_FIRES: AtomicUsize = AtomicUsize::new(0);

    fn fast() {
        FAST_FIRES.fetch_add(1, Ordering::SeqCst);
    }

    fn slow() {
        SLOW_FIRES.fetch_add(1, Ordering::SeqCst);
    }

    fn on_advance() {
        ADVANCE_FIRES.fetch_add(1, Ordering::SeqCst);
    }

    fn noop() {}

    #[test]
    fn test_timer_monotonic() {
        let mut timer = TestTimer::new();
        let t1 = timer.poll_ticks();
        timer.advance(100);
        let t2 = timer.poll_ticks();
        assert!(t2 >= t1);
        assert_eq!(t2 - t1, 100);
    }

    #[test]
    fn test_timers_fire_at_interval() {
        let mut table = TimerTable::new();
        table.start(2, fast).unwrap();
        table.start(5, slow).unwrap();

        for _ in 0..10 {
            table.tick();
        }

        assert_eq!(FAST_FIRES.load(Ordering::SeqCst), 5);
        assert_eq!(SLOW_FIRES.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_table_full_reports_busy() {
        let mut table = TimerTable::new();
        for _ in 0..MAX_TIMERS {
            table.start(1, noop).unwrap();
        }
        assert_eq!(table.start(1, noop), Err(HalError::Busy));
        assert_eq!(table.active_count(), MAX_TIMERS);
    }

    #[test]
    fn test_stop_frees_slot() {
        let mut table = TimerTable::new();
        let id = table.start(3, noop).unwrap();
        assert!(table.is_active(id));

        table.stop(id).unwrap();
        assert!(!table.is_active(id));
        assert_eq!(table.tick(), 0);

        let reused = table.start(3, noop).unwrap();
        assert_eq!(reused.index(), id.index());
    }

    #[test]
    fn test_stop_out_of_range() {
        let mut table = TimerTable::new();
        assert_eq!(
            table.stop(TimerId(MAX_TIMERS)),
            Err(HalError::OutOfRange(MAX_TIMERS))
        );
    }

    #[test]
    fn test_advance_catches_up_from_source() {
        let mut table = TimerTable::new();
        let mut source = TestTimer::new();
        table.start(4, on_advance).unwrap();
        assert_eq!(table.advance(&mut source), 0);

        source.advance(9);
        assert_eq!(table.advance(&mut source), 2);

        source.advance(3);
        assert_eq!(table.advance(&mut source), 1);
        assert_eq!(ADVANCE_FIRES.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_first_advance_sets_baseline() {
        let mut table = TimerTable::new();
        let mut source = TestTimer::new();
        source.advance(5_000_000);
        table.start(1000, noop).unwrap();

        assert_eq!(table.advance(&mut source), 0);
        assert_eq!(table.advance(&mut source), 0);

        source.advance(2500);
        assert_eq!(table.advance(&mut source), 2);
    }

    #[test]
    fn test_stop_all() {
        let mut table = TimerTable::new();
        table.start(1, noop).unwrap();
        table.start(1, noop).unwrap();
        table.stop_all();
        assert_eq!(table.active_count(), 0);
    }
}
