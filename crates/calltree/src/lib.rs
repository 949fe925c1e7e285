//! Call-Tree Profiler
//!
//! This crate provides low-overhead, always-on instrumentation for nested
//! regions of work:
//! - A call tree with one node per distinct call path
//! - Wall-clock and optional CPU time per node, plus a user-supplied
//!   operation count for throughput rates
//! - Depth limiting for deep or recursive call stacks
//! - Named, shared profilers through a process-wide registry
//! - Text reports, and merging of trees recorded by several processes
//!
//! # Example
//!
//! ```rust
//! use calltree::{profile_scope, Registry, ReportOptions};
//!
//! fn relax(iterations: u64) {
//!     let profiler = Registry::global().instance("solver", "Solver run");
//!     let mut region = profiler.push("relax");
//!     for _ in 0..iterations {
//!         // ... work ...
//!     }
//!     region += iterations;
//! }
//!
//! relax(100);
//!
//! let profiler = Registry::global().instance("solver", "Solver run");
//! {
//!     profile_scope!(profiler, "report");
//! }
//! println!("{}", profiler.render(&ReportOptions::default().with_verbosity(2)));
//! ```
//!
//! # Threads
//!
//! A [`Profiler`] models a single call stack and does no locking of its own.
//! Threads that instrument concurrently should each use their own profiler.
//! The [`Registry`] and [`ProfilerHandle`] are safe to share.

mod clock;
mod config;
mod counter;
mod error;
mod gather;
mod merge;
mod node;
mod profiler;
mod registry;
mod report;
mod snapshot;

pub use clock::{Clock, ClockKind, ManualClock, SystemClock};
pub use config::{ProfilerConfig, UNBOUNDED_DEPTH};
pub use counter::{Counter, Timer};
pub use error::{ProfilerError, ProfilerResult};
pub use gather::{ChannelGather, Gather, SingleProcess};
pub use merge::{merge_snapshots, Reduction};
pub use node::{CallTree, Node, NodeId, ROOT_NAME};
pub use profiler::{Profiler, Region};
pub use registry::{ProfilerHandle, Registry, SharedRegion};
pub use report::{render, ReportOptions, SortKey, DEFAULT_PRECISION, MAX_PRECISION};
pub use snapshot::{NodeSnapshot, TreeSnapshot};

/// Profile the rest of the enclosing scope as the region `name`.
///
/// Works with anything that has a `push(&str)` method returning a guard,
/// typically a [`ProfilerHandle`].
///
/// # Example
///
/// ```rust
/// use calltree::{profile_scope, ProfilerHandle, Profiler};
///
/// let profiler = ProfilerHandle::new(Profiler::new("example"));
///
/// fn assemble(profiler: &ProfilerHandle) {
///     profile_scope!(profiler, "assemble");
///     // ... work ...
/// } // region stopped here
///
/// assemble(&profiler);
/// ```
#[macro_export]
macro_rules! profile_scope {
    ($profiler:expr, $name:expr) => {
        let _region = $profiler.push($name);
    };
}
