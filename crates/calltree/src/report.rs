//! Text rendering of call trees.
//!
//! A report is rendered from a [`TreeSnapshot`]: a header naming the profiler,
//! then one line per node, indented by depth, walked depth-first. Which
//! columns appear is controlled by [`ReportOptions::verbosity`]:
//!
//! | verbosity | columns                         |
//! |-----------|---------------------------------|
//! | 0         | calls, wall                     |
//! | 1         | calls, wall, cpu, ops           |
//! | 2+        | calls, wall, cpu, ops, rate     |
//!
//! Times are printed in seconds; the rate is operations per wall-clock second.

use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::time::Duration;

use crate::snapshot::{NodeSnapshot, TreeSnapshot};

/// Digits after the decimal point when none (or an invalid count) is given.
pub const DEFAULT_PRECISION: usize = 3;

/// Largest precision honoured; larger requests fall back to the default.
pub const MAX_PRECISION: usize = 9;

/// Order in which siblings are listed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    /// Order in which regions were first entered
    #[default]
    Insertion,
    /// Alphabetical by name
    Name,
    /// Longest wall time first
    Wall,
    /// Longest CPU time first
    Cpu,
    /// Most operations first
    Operations,
}

impl SortKey {
    /// Parse a key name, falling back to [`SortKey::Insertion`] for anything unknown.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "name" => Self::Name,
            "wall" | "time" => Self::Wall,
            "cpu" => Self::Cpu,
            "operations" | "ops" => Self::Operations,
            _ => Self::Insertion,
        }
    }

    /// Numeric code used by the flat API; unknown codes mean insertion order.
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => Self::Wall,
            2 => Self::Cpu,
            3 => Self::Operations,
            4 => Self::Name,
            _ => Self::Insertion,
        }
    }
}

/// How a report is rendered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReportOptions {
    /// Which columns are shown
    pub verbosity: u8,
    /// Report inclusive (true) or self-only (false) figures
    pub cumulative: bool,
    /// Digits after the decimal point for times and rates
    pub precision: usize,
    /// Sibling order
    pub sort: SortKey,
    /// Deepest level printed, `None` for everything
    pub max_depth: Option<usize>,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            verbosity: 1,
            cumulative: true,
            precision: DEFAULT_PRECISION,
            sort: SortKey::Insertion,
            max_depth: None,
        }
    }
}

impl ReportOptions {
    /// Create the default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the verbosity.
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Choose cumulative or exclusive figures.
    pub fn with_cumulative(mut self, cumulative: bool) -> Self {
        self.cumulative = cumulative;
        self
    }

    /// Set the precision.
    pub fn with_precision(mut self, precision: usize) -> Self {
        self.precision = precision;
        self
    }

    /// Set the sibling order.
    pub fn with_sort(mut self, sort: SortKey) -> Self {
        self.sort = sort;
        self
    }

    /// Limit the printed depth.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = Some(max_depth);
        self
    }

    /// Precision actually used: out-of-range requests fall back to the default.
    pub fn effective_precision(&self) -> usize {
        if self.precision > MAX_PRECISION {
            DEFAULT_PRECISION
        } else {
            self.precision
        }
    }
}

/// Figures reported for one node under the chosen mode.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Figures {
    calls: u64,
    wall: Duration,
    cpu: Option<Duration>,
    operations: u64,
}

impl Figures {
    fn of(node: &NodeSnapshot, cumulative: bool) -> Self {
        if cumulative {
            Self {
                calls: node.calls,
                wall: node.wall,
                cpu: node.cpu,
                operations: node.subtree_operations(),
            }
        } else {
            Self {
                calls: node.calls,
                wall: node.exclusive_wall(),
                cpu: node.exclusive_cpu(),
                operations: node.operations,
            }
        }
    }

    /// Operations per wall-clock second, `None` when no time elapsed.
    fn rate(&self) -> Option<f64> {
        let secs = self.wall.as_secs_f64();
        (secs > 0.0).then(|| self.operations as f64 / secs)
    }
}

struct Line {
    label: String,
    figures: Figures,
}

/// Render `snapshot` as text.
pub fn render(snapshot: &TreeSnapshot, options: &ReportOptions) -> String {
    let mut lines = Vec::new();
    collect_lines(&snapshot.root, 0, options, &mut lines);

    let width = lines.iter().map(|l| l.label.len()).max().unwrap_or(0);
    let precision = options.effective_precision();

    let mut output = format!("Profiler \"{}\"\n", snapshot.description);
    for line in &lines {
        // Writing to a String cannot fail.
        let _ = write!(output, "{:<width$}", line.label, width = width);
        write_columns(&mut output, &line.figures, options.verbosity, precision);
        output.push('\n');
    }
    output
}

fn collect_lines(
    node: &NodeSnapshot,
    depth: usize,
    options: &ReportOptions,
    lines: &mut Vec<Line>,
) {
    lines.push(Line {
        label: format!("{}{}", "  ".repeat(depth), node.name),
        figures: Figures::of(node, options.cumulative),
    });

    if options.max_depth.is_some_and(|max| depth >= max) {
        return;
    }

    for child in sorted_children(node, options) {
        collect_lines(child, depth + 1, options, lines);
    }
}

fn sorted_children<'a>(node: &'a NodeSnapshot, options: &ReportOptions) -> Vec<&'a NodeSnapshot> {
    let mut children: Vec<&NodeSnapshot> = node.children.iter().collect();
    let cumulative = options.cumulative;
    match options.sort {
        SortKey::Insertion => {}
        SortKey::Name => children.sort_by(|a, b| a.name.cmp(&b.name)),
        SortKey::Wall => children.sort_by(|a, b| {
            Figures::of(b, cumulative).wall.cmp(&Figures::of(a, cumulative).wall)
        }),
        SortKey::Cpu => children.sort_by(|a, b| {
            Figures::of(b, cumulative).cpu.cmp(&Figures::of(a, cumulative).cpu)
        }),
        SortKey::Operations => children.sort_by(|a, b| {
            Figures::of(b, cumulative)
                .operations
                .cmp(&Figures::of(a, cumulative).operations)
        }),
    }
    children
}

fn write_columns(output: &mut String, figures: &Figures, verbosity: u8, precision: usize) {
    let _ = write!(
        output,
        "  calls={:>6}  wall={:>w$.p$}",
        figures.calls,
        figures.wall.as_secs_f64(),
        w = precision + 6,
        p = precision
    );
    if verbosity >= 1 {
        if let Some(cpu) = figures.cpu {
            let _ = write!(
                output,
                "  cpu={:>w$.p$}",
                cpu.as_secs_f64(),
                w = precision + 6,
                p = precision
            );
        }
        let _ = write!(output, "  ops={:>10}", figures.operations);
    }
    if verbosity >= 2 {
        match figures.rate() {
            Some(rate) => {
                let _ = write!(output, "  rate={:.p$}", rate, p = precision);
            }
            None => output.push_str("  rate=-"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(name: &str, wall_ms: u64, operations: u64) -> NodeSnapshot {
        NodeSnapshot {
            name: name.to_string(),
            calls: 1,
            wall: Duration::from_millis(wall_ms),
            cpu: None,
            operations,
            children: Vec::new(),
        }
    }

    fn sample() -> TreeSnapshot {
        let mut root = leaf("All", 1000, 0);
        root.children = vec![
            leaf("fast", 200, 200),
            leaf("slow", 500, 500),
            leaf("medium", 300, 300),
        ];
        TreeSnapshot {
            description: "job".to_string(),
            root,
        }
    }

    /// Value printed after `key=`, ignoring alignment padding.
    fn field<'a>(line: &'a str, key: &str) -> &'a str {
        let marker = format!("{}=", key);
        let start = line.find(&marker).map(|i| i + marker.len()).unwrap_or(line.len());
        line[start..].split_whitespace().next().unwrap_or_default()
    }

    fn names_in_order(report: &str) -> Vec<String> {
        report
            .lines()
            .skip(1)
            .map(|l| l.split_whitespace().next().unwrap_or_default().to_string())
            .collect()
    }

    #[test]
    fn test_header_and_indentation() {
        let report = render(&sample(), &ReportOptions::default());
        let mut lines = report.lines();
        assert_eq!(lines.next(), Some("Profiler \"job\""));
        assert!(lines.next().unwrap().starts_with("All"));
        assert!(lines.next().unwrap().starts_with("  fast"));
    }

    #[test]
    fn test_sort_keys() {
        let snapshot = sample();
        let insertion = render(&snapshot, &ReportOptions::default());
        assert_eq!(names_in_order(&insertion), vec!["All", "fast", "slow", "medium"]);

        let by_name = render(&snapshot, &ReportOptions::default().with_sort(SortKey::Name));
        assert_eq!(names_in_order(&by_name), vec!["All", "fast", "medium", "slow"]);

        let by_wall = render(&snapshot, &ReportOptions::default().with_sort(SortKey::Wall));
        assert_eq!(names_in_order(&by_wall), vec!["All", "slow", "medium", "fast"]);
    }

    #[test]
    fn test_cumulative_versus_exclusive() {
        let snapshot = sample();
        let cumulative = render(&snapshot, &ReportOptions::default().with_verbosity(1));
        let root_line = cumulative.lines().nth(1).unwrap();
        assert_eq!(field(root_line, "wall"), "1.000");
        assert_eq!(field(root_line, "ops"), "1000");

        let exclusive = render(
            &snapshot,
            &ReportOptions::default().with_verbosity(1).with_cumulative(false),
        );
        let root_line = exclusive.lines().nth(1).unwrap();
        assert_eq!(field(root_line, "wall"), "0.000");
        assert_eq!(field(root_line, "ops"), "0");
    }

    #[test]
    fn test_verbosity_controls_columns() {
        let snapshot = sample();
        let terse = render(&snapshot, &ReportOptions::default().with_verbosity(0));
        assert!(!terse.contains("ops="));
        assert!(!terse.contains("rate="));

        let full = render(&snapshot, &ReportOptions::default().with_verbosity(2));
        let fast_line = full.lines().find(|l| l.trim_start().starts_with("fast")).unwrap();
        assert_eq!(field(fast_line, "rate"), "1000.000");
    }

    #[test]
    fn test_rate_without_time() {
        let mut snapshot = sample();
        snapshot.root.children[0].wall = Duration::ZERO;
        let report = render(&snapshot, &ReportOptions::default().with_verbosity(2));
        assert!(report.contains("rate=-"));
    }

    #[test]
    fn test_invalid_precision_falls_back() {
        let options = ReportOptions::default().with_precision(42);
        assert_eq!(options.effective_precision(), DEFAULT_PRECISION);

        let report = render(&sample(), &options);
        let fast_line = report.lines().find(|l| l.trim_start().starts_with("fast")).unwrap();
        assert_eq!(field(fast_line, "wall"), "0.200");

        let report = render(&sample(), &ReportOptions::default().with_precision(1));
        let fast_line = report.lines().find(|l| l.trim_start().starts_with("fast")).unwrap();
        assert_eq!(field(fast_line, "wall"), "0.2");
    }

    #[test]
    fn test_max_depth_limits_lines() {
        let report = render(&sample(), &ReportOptions::default().with_max_depth(0));
        assert_eq!(report.lines().count(), 2);
    }

    #[test]
    fn test_sort_key_fallbacks() {
        assert_eq!(SortKey::from_name("wall"), SortKey::Wall);
        assert_eq!(SortKey::from_name(" OPS "), SortKey::Operations);
        assert_eq!(SortKey::from_name("bogus"), SortKey::Insertion);
        assert_eq!(SortKey::from_code(4), SortKey::Name);
        assert_eq!(SortKey::from_code(-1), SortKey::Insertion);
    }

    #[test]
    fn test_options_serde_defaults_missing_fields() {
        let options: ReportOptions = serde_json::from_str(r#"{"sort":"wall"}"#).unwrap();
        assert_eq!(options.sort, SortKey::Wall);
        assert_eq!(options.precision, DEFAULT_PRECISION);
        assert!(options.cumulative);
    }
}
