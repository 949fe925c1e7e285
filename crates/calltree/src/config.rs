//! Profiler configuration.

use serde::{Deserialize, Serialize};

use crate::report::ReportOptions;

/// Depth limit meaning "no limit".
pub const UNBOUNDED_DEPTH: usize = usize::MAX;

/// Settings a [`Profiler`](crate::Profiler) is created with.
///
/// Everything here can also be changed on a live profiler; the config only
/// fixes the starting point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProfilerConfig {
    /// Free-text label shown in reports
    pub description: String,
    /// Deepest level at which new nodes are created
    pub max_depth: usize,
    /// Whether CPU time is measured alongside wall time
    pub track_cpu: bool,
    /// Whether start/stop record anything
    pub active: bool,
    /// Log a summary for every region stopped at or above this depth
    pub stop_print: Option<usize>,
    /// Options used when the profiler is displayed
    pub report: ReportOptions,
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            description: String::new(),
            max_depth: UNBOUNDED_DEPTH,
            track_cpu: false,
            active: true,
            stop_print: None,
            report: ReportOptions::default(),
        }
    }
}

impl ProfilerConfig {
    /// Create a config with the given description.
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..Default::default()
        }
    }

    /// Limit the tracked depth.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Measure CPU time as well.
    pub fn with_cpu(mut self, track_cpu: bool) -> Self {
        self.track_cpu = track_cpu;
        self
    }

    /// Start active or inactive.
    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    /// Log region summaries down to `depth`.
    pub fn with_stop_print(mut self, depth: usize) -> Self {
        self.stop_print = Some(depth);
        self
    }

    /// Options used by `Display`.
    pub fn with_report(mut self, report: ReportOptions) -> Self {
        self.report = report;
        self
    }
}
