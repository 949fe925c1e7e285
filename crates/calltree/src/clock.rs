//! Clock sources for wall and CPU time.
//!
//! The profiler never reads the platform clocks directly; it asks a [`Clock`]
//! for the current readings. Both readings are monotonic durations measured
//! from an arbitrary, fixed origin, so only differences are meaningful.

use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Which of a counter's clocks an operation applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClockKind {
    /// Elapsed wall-clock time
    Wall,
    /// Process CPU time (user + system)
    Cpu,
}

/// A source of wall and CPU time readings.
pub trait Clock: Debug + Send + Sync {
    /// Current wall time.
    fn wall(&self) -> Duration;

    /// Current CPU time consumed by the process.
    fn cpu(&self) -> Duration;

    /// Reading for the given clock kind.
    fn read(&self, kind: ClockKind) -> Duration {
        match kind {
            ClockKind::Wall => self.wall(),
            ClockKind::Cpu => self.cpu(),
        }
    }
}

/// Clock backed by the operating system.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    /// Create a clock whose wall origin is now.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    #[inline]
    fn wall(&self) -> Duration {
        self.origin.elapsed()
    }

    #[inline]
    fn cpu(&self) -> Duration {
        process_cpu_time()
    }
}

#[cfg(unix)]
fn process_cpu_time() -> Duration {
    // SAFETY: `rusage` is plain old data; an all-zero value is valid.
    let mut usage: libc::rusage = unsafe { std::mem::zeroed() };
    // SAFETY: the pointer refers to a live, writable `rusage` and
    // `RUSAGE_SELF` is always an accepted target.
    let rc = unsafe { libc::getrusage(libc::RUSAGE_SELF, &mut usage) };
    if rc != 0 {
        return Duration::ZERO;
    }
    timeval_to_duration(usage.ru_utime) + timeval_to_duration(usage.ru_stime)
}

#[cfg(unix)]
fn timeval_to_duration(tv: libc::timeval) -> Duration {
    let secs = u64::try_from(tv.tv_sec).unwrap_or(0);
    let micros = u64::try_from(tv.tv_usec).unwrap_or(0);
    Duration::from_secs(secs) + Duration::from_micros(micros)
}

// No portable process CPU clock is wired up for other targets.
#[cfg(not(unix))]
fn process_cpu_time() -> Duration {
    Duration::ZERO
}

/// A clock that only moves when told to.
///
/// Used for deterministic tests and for replaying externally measured
/// timings. Share it through an `Arc` and advance it from the test body.
#[derive(Debug, Default)]
pub struct ManualClock {
    wall_nanos: AtomicU64,
    cpu_nanos: AtomicU64,
}

impl ManualClock {
    /// Create a clock reading zero on both clocks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the wall clock only.
    pub fn advance_wall(&self, by: Duration) {
        self.wall_nanos.fetch_add(duration_nanos(by), Ordering::Relaxed);
    }

    /// Advance the CPU clock only.
    pub fn advance_cpu(&self, by: Duration) {
        self.cpu_nanos.fetch_add(duration_nanos(by), Ordering::Relaxed);
    }

    /// Advance both clocks by the same amount (fully CPU-bound work).
    pub fn advance(&self, by: Duration) {
        self.advance_wall(by);
        self.advance_cpu(by);
    }
}

impl Clock for ManualClock {
    fn wall(&self) -> Duration {
        Duration::from_nanos(self.wall_nanos.load(Ordering::Relaxed))
    }

    fn cpu(&self) -> Duration {
        Duration::from_nanos(self.cpu_nanos.load(Ordering::Relaxed))
    }
}

fn duration_nanos(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}
