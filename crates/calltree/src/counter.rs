//! Per-node accounting: wall/cpu timers plus an operation count.

use std::ops::AddAssign;
use std::time::Duration;

use crate::clock::ClockKind;

/// State of one clock attached to a counter.
///
/// A timer that was never started is `Dummy` and contributes nothing. A
/// running timer remembers the reading it was (re)started at together with
/// everything accumulated by earlier runs, so re-entering a node resumes
/// rather than resets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Timer {
    /// Never started
    #[default]
    Dummy,
    /// Started and not yet stopped
    Running {
        /// Clock reading at the latest start
        baseline: Duration,
        /// Time accumulated by previous runs
        accumulated: Duration,
    },
    /// Stopped with a finalized total
    Stopped {
        /// Total accumulated time
        total: Duration,
    },
}

impl Timer {
    /// Whether the timer has never been started.
    #[inline]
    pub fn dummy(&self) -> bool {
        matches!(self, Self::Dummy)
    }

    /// Whether the timer is currently running.
    #[inline]
    pub fn running(&self) -> bool {
        matches!(self, Self::Running { .. })
    }

    /// Whether the timer holds a finalized total.
    #[inline]
    pub fn stopped(&self) -> bool {
        matches!(self, Self::Stopped { .. })
    }

    /// Start (or resume) the timer at reading `now`.
    ///
    /// Returns `false` and leaves the timer untouched if it is already running.
    pub fn start(&mut self, now: Duration) -> bool {
        let accumulated = match *self {
            Self::Running { .. } => return false,
            Self::Dummy => Duration::ZERO,
            Self::Stopped { total } => total,
        };
        *self = Self::Running {
            baseline: now,
            accumulated,
        };
        true
    }

    /// Stop the timer at reading `now`, folding the elapsed time into the total.
    ///
    /// A dummy or already stopped timer is left as is; returns whether a
    /// running timer was stopped.
    pub fn stop(&mut self, now: Duration) -> bool {
        match *self {
            Self::Running {
                baseline,
                accumulated,
            } => {
                *self = Self::Stopped {
                    total: accumulated + now.saturating_sub(baseline),
                };
                true
            }
            Self::Dummy | Self::Stopped { .. } => false,
        }
    }

    /// Finalized time: the total of a stopped timer, or what earlier runs of
    /// a running timer accumulated. Zero for a dummy.
    pub fn cumulative_time(&self) -> Duration {
        match *self {
            Self::Dummy => Duration::ZERO,
            Self::Running { accumulated, .. } => accumulated,
            Self::Stopped { total } => total,
        }
    }

    /// Time including the in-progress run, as seen at reading `now`.
    pub fn elapsed_at(&self, now: Duration) -> Duration {
        match *self {
            Self::Running {
                baseline,
                accumulated,
            } => accumulated + now.saturating_sub(baseline),
            _ => self.cumulative_time(),
        }
    }
}

/// The clocks and operation count attached to one node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Counter {
    wall: Timer,
    cpu: Timer,
    operations: u64,
    calls: u64,
}

impl Counter {
    /// Create a counter with every clock dummy.
    pub fn new() -> Self {
        Self::default()
    }

    /// The wall-clock timer.
    #[inline]
    pub fn get_wall(&self) -> &Timer {
        &self.wall
    }

    /// The CPU-time timer.
    #[inline]
    pub fn get_cpu(&self) -> &Timer {
        &self.cpu
    }

    /// Timer for `kind`.
    pub fn timer(&self, kind: ClockKind) -> &Timer {
        match kind {
            ClockKind::Wall => &self.wall,
            ClockKind::Cpu => &self.cpu,
        }
    }

    fn timer_mut(&mut self, kind: ClockKind) -> &mut Timer {
        match kind {
            ClockKind::Wall => &mut self.wall,
            ClockKind::Cpu => &mut self.cpu,
        }
    }

    /// Start the `kind` clock at reading `now`.
    ///
    /// Re-entrant starts are a no-op returning `false`. Starting the wall
    /// clock counts one call.
    pub fn start(&mut self, kind: ClockKind, now: Duration) -> bool {
        let started = self.timer_mut(kind).start(now);
        if started && kind == ClockKind::Wall {
            self.calls = self.calls.saturating_add(1);
        }
        started
    }

    /// Stop the `kind` clock at reading `now`.
    pub fn stop(&mut self, kind: ClockKind, now: Duration) -> bool {
        self.timer_mut(kind).stop(now)
    }

    /// Add to the operation count, whatever the clock state.
    #[inline]
    pub fn add_operations(&mut self, operations: u64) {
        self.operations = self.operations.saturating_add(operations);
    }

    /// Accumulated operation count.
    #[inline]
    pub fn operations(&self) -> u64 {
        self.operations
    }

    /// Number of times the counter was started.
    #[inline]
    pub fn calls(&self) -> u64 {
        self.calls
    }

    /// Whether any clock is running.
    pub fn running(&self) -> bool {
        self.wall.running() || self.cpu.running()
    }
}

impl AddAssign<u64> for Counter {
    fn add_assign(&mut self, operations: u64) {
        self.add_operations(operations);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_timer_starts_dummy() {
        let timer = Timer::default();
        assert!(timer.dummy());
        assert!(!timer.running());
        assert!(!timer.stopped());
        assert_eq!(timer.cumulative_time(), Duration::ZERO);
    }

    #[test]
    fn test_timer_start_stop() {
        let mut timer = Timer::default();
        assert!(timer.start(ms(10)));
        assert!(timer.running());
        assert_eq!(timer.elapsed_at(ms(15)), ms(5));

        assert!(timer.stop(ms(30)));
        assert!(timer.stopped());
        assert_eq!(timer.cumulative_time(), ms(20));
    }

    #[test]
    fn test_timer_resume_accumulates() {
        let mut timer = Timer::default();
        timer.start(ms(0));
        timer.stop(ms(10));
        timer.start(ms(100));
        assert_eq!(timer.cumulative_time(), ms(10));
        timer.stop(ms(105));
        assert_eq!(timer.cumulative_time(), ms(15));
    }

    #[test]
    fn test_timer_reentrant_start_is_noop() {
        let mut timer = Timer::default();
        timer.start(ms(0));
        assert!(!timer.start(ms(50)));
        timer.stop(ms(60));
        assert_eq!(timer.cumulative_time(), ms(60));
    }

    #[test]
    fn test_timer_stop_without_start() {
        let mut timer = Timer::default();
        assert!(!timer.stop(ms(10)));
        assert!(timer.dummy());

        timer.start(ms(0));
        timer.stop(ms(1));
        assert!(!timer.stop(ms(99)));
        assert_eq!(timer.cumulative_time(), ms(1));
    }

    #[test]
    fn test_counter_fresh() {
        let counter = Counter::new();
        assert!(counter.get_wall().dummy());
        assert!(counter.get_cpu().dummy());
        assert_eq!(counter.operations(), 0);
        assert_eq!(counter.calls(), 0);
    }

    #[test]
    fn test_counter_calls_follow_wall_starts() {
        let mut counter = Counter::new();
        counter.start(ClockKind::Wall, ms(0));
        counter.start(ClockKind::Cpu, ms(0));
        counter.start(ClockKind::Wall, ms(1));
        assert_eq!(counter.calls(), 1);

        counter.stop(ClockKind::Wall, ms(2));
        counter.start(ClockKind::Wall, ms(3));
        assert_eq!(counter.calls(), 2);
        assert!(counter.running());
    }

    #[test]
    fn test_counter_operations() {
        let mut counter = Counter::new();
        counter.add_operations(200);
        counter += 300;
        assert_eq!(counter.operations(), 500);

        counter.add_operations(u64::MAX);
        assert_eq!(counter.operations(), u64::MAX);
    }
}
