//! Combining trees recorded by several processes.
//!
//! Trees are matched by path (the sequence of names from the root). The
//! result holds the union of all paths; where several trees share a path,
//! their figures are combined with a [`Reduction`].

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::snapshot::{NodeSnapshot, TreeSnapshot};

/// How figures at a shared path are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reduction {
    /// Add them up
    #[default]
    Sum,
    /// Keep the largest
    Max,
    /// Keep the smallest
    Min,
    /// Average over the trees that contain the path
    Mean,
}

#[derive(Debug)]
struct Accumulator {
    name: String,
    calls: u64,
    wall: Duration,
    cpu: Option<Duration>,
    operations: u64,
    contributors: u32,
    children: IndexMap<String, Accumulator>,
}

impl Accumulator {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            calls: 0,
            wall: Duration::ZERO,
            cpu: None,
            operations: 0,
            contributors: 0,
            children: IndexMap::new(),
        }
    }

    fn absorb(&mut self, node: &NodeSnapshot, reduction: Reduction) {
        if self.contributors == 0 {
            self.calls = node.calls;
            self.wall = node.wall;
            self.cpu = node.cpu;
            self.operations = node.operations;
        } else {
            match reduction {
                Reduction::Sum | Reduction::Mean => {
                    self.calls = self.calls.saturating_add(node.calls);
                    self.wall += node.wall;
                    self.cpu = combine(self.cpu, node.cpu, |a, b| a + b);
                    self.operations = self.operations.saturating_add(node.operations);
                }
                Reduction::Max => {
                    self.calls = self.calls.max(node.calls);
                    self.wall = self.wall.max(node.wall);
                    self.cpu = combine(self.cpu, node.cpu, Duration::max);
                    self.operations = self.operations.max(node.operations);
                }
                Reduction::Min => {
                    self.calls = self.calls.min(node.calls);
                    self.wall = self.wall.min(node.wall);
                    self.cpu = combine(self.cpu, node.cpu, Duration::min);
                    self.operations = self.operations.min(node.operations);
                }
            }
        }
        self.contributors += 1;

        for child in &node.children {
            self.children
                .entry(child.name.clone())
                .or_insert_with(|| Accumulator::new(&child.name))
                .absorb(child, reduction);
        }
    }

    fn finish(self, reduction: Reduction) -> NodeSnapshot {
        let averaged = reduction == Reduction::Mean && self.contributors > 1;
        let (calls, wall, cpu, operations) = if averaged {
            let n = self.contributors;
            (
                self.calls / u64::from(n),
                self.wall / n,
                self.cpu.map(|cpu| cpu / n),
                self.operations / u64::from(n),
            )
        } else {
            (self.calls, self.wall, self.cpu, self.operations)
        };

        NodeSnapshot {
            name: self.name,
            calls,
            wall,
            cpu,
            operations,
            children: self
                .children
                .into_values()
                .map(|child| child.finish(reduction))
                .collect(),
        }
    }
}

/// Combine two optional readings; a tree that did not track CPU time does
/// not erase another tree's figure.
fn combine(
    a: Option<Duration>,
    b: Option<Duration>,
    f: impl FnOnce(Duration, Duration) -> Duration,
) -> Option<Duration> {
    match (a, b) {
        (Some(a), Some(b)) => Some(f(a, b)),
        (a, b) => a.or(b),
    }
}

/// Merge `trees` into one, or `None` when there is nothing to merge.
///
/// Children appear in the order their paths were first seen, scanning the
/// trees in order. The description is taken from the first tree.
pub fn merge_snapshots(trees: &[TreeSnapshot], reduction: Reduction) -> Option<TreeSnapshot> {
    let first = trees.first()?;
    let mut root = Accumulator::new(&first.root.name);
    for tree in trees {
        root.absorb(&tree.root, reduction);
    }
    tracing::debug!(
        target: "calltree",
        trees = trees.len(),
        ?reduction,
        "merged call trees"
    );
    Some(TreeSnapshot {
        description: first.description.clone(),
        root: root.finish(reduction),
    })
}
