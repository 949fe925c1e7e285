//! The profiler state machine.
//!
//! A [`Profiler`] turns a sequence of `start`/`stop` calls into mutations of
//! its call tree. It is idle when the active node is the root (depth 0) and
//! measuring at depth `d` after `d` unmatched starts.
//!
//! # Example
//!
//! ```rust
//! use calltree::Profiler;
//!
//! let mut profiler = Profiler::new("solver");
//!
//! profiler.start("assemble");
//! profiler.start("integrals");
//! profiler.stop(1_000).unwrap();
//! profiler.stop(0).unwrap();
//!
//! {
//!     let mut region = profiler.push("solve");
//!     region.add_operations(42);
//! } // stopped here
//!
//! println!("{}", profiler);
//! ```
//!
//! # Depth limit
//!
//! Starts beyond [`Profiler::get_max_depth`] are counted but do not descend:
//! the active node stays at the cutoff and keeps running, so the time of the
//! suppressed regions lands in it. Operations passed to the matching stops
//! are credited to the cutoff node as well.
//!
//! # Enabling and disabling
//!
//! Starts made while the profiler is disabled record nothing but are still
//! paired with their stops, so toggling inside open regions never shifts
//! which region a later stop closes.

use std::fmt;
use std::ops::{AddAssign, Deref, DerefMut};
use std::sync::Arc;
use std::time::Duration;

use crate::clock::{Clock, ClockKind, SystemClock};
use crate::config::{ProfilerConfig, UNBOUNDED_DEPTH};
use crate::counter::Counter;
use crate::error::{ProfilerError, ProfilerResult};
use crate::gather::Gather;
use crate::merge::{merge_snapshots, Reduction};
use crate::node::{CallTree, Node, NodeId};
use crate::report::{render, ReportOptions};
use crate::snapshot::{NodeSnapshot, TreeSnapshot};

/// How one open `start` was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Level {
    /// The active node moved down to a child
    Entered,
    /// Beyond the depth limit; only counted
    Suppressed,
    /// Started while disabled; only counted
    Inactive,
}

/// Call-tree profiler for a single thread of control.
#[derive(Debug)]
pub struct Profiler {
    description: String,
    tree: CallTree,
    active_node: NodeId,
    /// One entry per unmatched start, innermost last
    levels: Vec<Level>,
    max_depth: usize,
    track_cpu: bool,
    active: bool,
    stop_print: Option<usize>,
    report: ReportOptions,
    clock: Arc<dyn Clock>,
}

impl Profiler {
    /// Create a profiler measuring wall time only.
    pub fn new(description: impl Into<String>) -> Self {
        Self::with_config(ProfilerConfig::new(description))
    }

    /// Create a profiler from a config, reading the system clocks.
    pub fn with_config(config: ProfilerConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock::new()))
    }

    /// Create a profiler reading the given clock.
    pub fn with_clock(config: ProfilerConfig, clock: Arc<dyn Clock>) -> Self {
        let tree = CallTree::new();
        let root = tree.root();
        let mut profiler = Self {
            description: config.description,
            tree,
            active_node: root,
            levels: Vec::new(),
            max_depth: config.max_depth,
            track_cpu: config.track_cpu,
            active: config.active,
            stop_print: config.stop_print,
            report: config.report,
            clock,
        };
        profiler.start_clocks(root);
        profiler
    }

    /// Free-text label of this profiler.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Change the label.
    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = description.into();
    }

    /// The root node.
    #[inline]
    pub fn root(&self) -> NodeId {
        self.tree.root()
    }

    /// The node of the innermost open region, the root when idle.
    #[inline]
    pub fn active_node(&self) -> NodeId {
        self.active_node
    }

    /// The whole call tree.
    #[inline]
    pub fn tree(&self) -> &CallTree {
        &self.tree
    }

    /// Shorthand for `tree().node(id)`.
    #[inline]
    pub fn node(&self, id: NodeId) -> &Node {
        self.tree.node(id)
    }

    /// Counter of the active node.
    pub fn counter(&self) -> &Counter {
        self.tree.node(self.active_node).counter()
    }

    /// Number of unmatched starts, suppressed and disabled ones included.
    #[inline]
    pub fn get_current_depth(&self) -> usize {
        self.levels.len()
    }

    /// Deepest level at which nodes are created.
    #[inline]
    pub fn get_max_depth(&self) -> usize {
        self.max_depth
    }

    /// Change the depth limit for subsequent starts.
    pub fn set_max_depth(&mut self, max_depth: usize) {
        self.max_depth = max_depth;
    }

    /// Whether CPU time is measured.
    pub fn tracks_cpu(&self) -> bool {
        self.track_cpu
    }

    /// Whether start/stop currently record anything.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Turn recording on or off, keeping the tree recorded so far.
    pub fn set_enabled(&mut self, active: bool) {
        self.active = active;
    }

    /// Configure activity and depth in one call.
    ///
    /// `level == 0` deactivates the profiler. Any other level activates it
    /// with that depth limit. With `stop_print` set, each region stopped at
    /// a depth no greater than it is summarised in the log.
    pub fn set_active(&mut self, level: usize, stop_print: Option<usize>) {
        self.active = level > 0;
        if self.active {
            self.max_depth = level;
        }
        self.stop_print = stop_print;
    }

    /// Options used when the profiler is displayed.
    pub fn report_options(&self) -> &ReportOptions {
        &self.report
    }

    /// Replace the options used when the profiler is displayed.
    pub fn set_report_options(&mut self, options: ReportOptions) {
        self.report = options;
    }

    /// Enter the region `name` below the active node.
    pub fn start(&mut self, name: &str) {
        if !self.active {
            self.levels.push(Level::Inactive);
            return;
        }

        if self.levels.len() >= self.max_depth {
            self.levels.push(Level::Suppressed);
            tracing::debug!(
                target: "calltree",
                region = name,
                depth = self.levels.len(),
                max_depth = self.max_depth,
                "descent suppressed by depth limit"
            );
            return;
        }

        let target = self.tree.child(self.active_node, name);
        if !self.start_clocks(target) {
            tracing::debug!(target: "calltree", region = name, "region already running");
        }
        self.active_node = target;
        self.levels.push(Level::Entered);

        tracing::trace!(
            target: "calltree",
            region = name,
            depth = self.levels.len(),
            "region started"
        );
    }

    /// Leave the innermost region, crediting it with `operations`.
    ///
    /// The stop always closes the level opened by its matching start, even if
    /// the profiler was enabled or disabled in between. A region entered
    /// while enabled is closed and timed normally.
    ///
    /// Fails with [`ProfilerError::UnbalancedStop`] when no region is open
    /// and the profiler is enabled; the profiler is left untouched and stays
    /// usable. A disabled profiler ignores such stops.
    pub fn stop(&mut self, operations: u64) -> ProfilerResult<()> {
        let depth = self.levels.len();
        let Some(level) = self.levels.pop() else {
            if !self.active {
                return Ok(());
            }
            tracing::warn!(
                target: "calltree",
                profiler = %self.description,
                "stop without matching start"
            );
            return Err(ProfilerError::UnbalancedStop);
        };

        let node = self.active_node;
        match level {
            Level::Inactive => {}
            Level::Suppressed => {
                self.tree.node_mut(node).counter_mut().add_operations(operations);
            }
            Level::Entered => {
                self.stop_clocks(node);
                self.tree.node_mut(node).counter_mut().add_operations(operations);
                if self.stop_print.is_some_and(|limit| depth <= limit) {
                    self.print_stopped(node);
                }
                self.active_node = self.tree.parent(node).unwrap_or_else(|| self.tree.root());
                tracing::trace!(
                    target: "calltree",
                    region = self.tree.node(node).name(),
                    depth,
                    operations,
                    "region stopped"
                );
            }
        }
        Ok(())
    }

    /// Like [`Profiler::stop`], naming the region being left.
    ///
    /// The name is advisory: a mismatch is logged and the innermost region is
    /// stopped regardless.
    pub fn stop_named(&mut self, name: &str, operations: u64) -> ProfilerResult<()> {
        if self.active && self.levels.last() == Some(&Level::Entered) {
            let current = self.tree.node(self.active_node).name();
            if !name.is_empty() && current != name {
                tracing::warn!(
                    target: "calltree",
                    expected = name,
                    actual = current,
                    "stop name does not match the active region"
                );
            }
        }
        self.stop(operations)
    }

    /// Stop every open region, whether or not the profiler is active.
    pub fn stop_all(&mut self) {
        while !self.levels.is_empty() {
            let _ = self.stop(0);
        }
    }

    /// Enter `name` and return a guard that stops it when dropped.
    ///
    /// The guard dereferences to the profiler, so it can be inspected and
    /// nested from inside the region.
    pub fn push(&mut self, name: &str) -> Region<'_> {
        self.start(name);
        Region {
            profiler: self,
            operations: 0,
        }
    }

    /// Create the child `name` of the active node without starting it.
    ///
    /// Returns `None` when the profiler is inactive or the active node sits
    /// at the depth limit.
    pub fn declare(&mut self, name: &str) -> Option<NodeId> {
        if !self.active || self.levels.len() >= self.max_depth {
            return None;
        }
        Some(self.tree.child(self.active_node, name))
    }

    /// Credit operations to the active node directly.
    pub fn add_operations(&mut self, operations: u64) {
        self.tree
            .node_mut(self.active_node)
            .counter_mut()
            .add_operations(operations);
    }

    /// Discard the tree and start over with a new description.
    pub fn reset(&mut self, description: impl Into<String>) {
        self.description = description.into();
        self.tree = CallTree::new();
        self.active_node = self.tree.root();
        self.levels.clear();
        let root = self.tree.root();
        self.start_clocks(root);
    }

    /// Copy of the tree with running clocks read now.
    pub fn snapshot(&self) -> TreeSnapshot {
        let wall = self.clock.wall();
        let cpu = if self.track_cpu {
            self.clock.cpu()
        } else {
            Duration::ZERO
        };
        TreeSnapshot {
            description: self.description.clone(),
            root: self.snapshot_node(self.tree.root(), wall, cpu),
        }
    }

    fn snapshot_node(&self, id: NodeId, wall: Duration, cpu: Duration) -> NodeSnapshot {
        let node = self.tree.node(id);
        let counter = node.counter();
        NodeSnapshot {
            name: node.name().to_string(),
            calls: counter.calls(),
            wall: counter.get_wall().elapsed_at(wall),
            cpu: (!counter.get_cpu().dummy()).then(|| counter.get_cpu().elapsed_at(cpu)),
            operations: counter.operations(),
            children: node
                .children()
                .map(|child| self.snapshot_node(child, wall, cpu))
                .collect(),
        }
    }

    /// Render the tree as text.
    pub fn render(&self, options: &ReportOptions) -> String {
        render(&self.snapshot(), options)
    }

    /// Gather every process's tree and render the merged result.
    ///
    /// Returns `None` on processes other than the reporting one.
    pub fn report_global(
        &self,
        gather: &dyn Gather,
        reduction: Reduction,
        options: &ReportOptions,
    ) -> ProfilerResult<Option<String>> {
        let Some(trees) = gather.gather(self.snapshot())? else {
            return Ok(None);
        };
        Ok(merge_snapshots(&trees, reduction).map(|merged| render(&merged, options)))
    }

    fn start_clocks(&mut self, id: NodeId) -> bool {
        let wall = self.clock.wall();
        let cpu = self.track_cpu.then(|| self.clock.cpu());
        let counter = self.tree.node_mut(id).counter_mut();
        let started = counter.start(ClockKind::Wall, wall);
        if let Some(cpu) = cpu {
            counter.start(ClockKind::Cpu, cpu);
        }
        started
    }

    fn stop_clocks(&mut self, id: NodeId) {
        let wall = self.clock.wall();
        let cpu = self.track_cpu.then(|| self.clock.cpu());
        let counter = self.tree.node_mut(id).counter_mut();
        counter.stop(ClockKind::Wall, wall);
        if let Some(cpu) = cpu {
            counter.stop(ClockKind::Cpu, cpu);
        }
    }

    fn print_stopped(&self, id: NodeId) {
        let counter = self.tree.node(id).counter();
        let cpu = self.track_cpu.then(|| counter.get_cpu().cumulative_time().as_secs_f64());
        tracing::info!(
            target: "calltree",
            profiler = %self.description,
            region = %self.tree.path(id).join("."),
            calls = counter.calls(),
            wall_s = counter.get_wall().cumulative_time().as_secs_f64(),
            cpu_s = ?cpu,
            operations = counter.operations(),
            "region stopped"
        );
    }
}

impl Default for Profiler {
    fn default() -> Self {
        Self::with_config(ProfilerConfig::default())
    }
}

impl fmt::Display for Profiler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(&self.report))
    }
}

/// Scoped region returned by [`Profiler::push`].
///
/// Dropping the guard stops the region exactly once, on every exit path.
#[derive(Debug)]
pub struct Region<'a> {
    profiler: &'a mut Profiler,
    operations: u64,
}

impl Region<'_> {
    /// Operations credited to the region when it is stopped.
    pub fn add_operations(&mut self, operations: u64) {
        self.operations = self.operations.saturating_add(operations);
    }
}

impl AddAssign<u64> for Region<'_> {
    fn add_assign(&mut self, operations: u64) {
        self.add_operations(operations);
    }
}

impl Deref for Region<'_> {
    type Target = Profiler;

    fn deref(&self) -> &Profiler {
        self.profiler
    }
}

impl DerefMut for Region<'_> {
    fn deref_mut(&mut self) -> &mut Profiler {
        self.profiler
    }
}

impl Drop for Region<'_> {
    fn drop(&mut self) {
        // An unbalanced stop here means the region was stopped by hand; it is
        // already logged.
        let _ = self.profiler.stop(self.operations);
    }
}
