//! Owned, serializable copies of a profiler's tree.
//!
//! A snapshot freezes every counter at a single clock reading, so running
//! regions show the time spent up to that reading. Snapshots feed report
//! rendering and are what processes exchange when trees are merged.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ProfilerResult;

/// Frozen view of one node and its subtree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSnapshot {
    /// Node name
    pub name: String,
    /// Number of times the region was entered
    pub calls: u64,
    /// Inclusive wall time
    #[serde(with = "duration_serde")]
    pub wall: Duration,
    /// Inclusive CPU time, `None` when CPU time was not tracked
    #[serde(with = "duration_serde::option", default)]
    pub cpu: Option<Duration>,
    /// Operations credited to this node itself
    pub operations: u64,
    /// Children in insertion order
    pub children: Vec<NodeSnapshot>,
}

impl NodeSnapshot {
    /// Create a leaf with no recorded activity.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            calls: 0,
            wall: Duration::ZERO,
            cpu: None,
            operations: 0,
            children: Vec::new(),
        }
    }

    /// Wall time not spent in children.
    pub fn exclusive_wall(&self) -> Duration {
        let children: Duration = self.children.iter().map(|c| c.wall).sum();
        self.wall.saturating_sub(children)
    }

    /// CPU time not spent in children.
    pub fn exclusive_cpu(&self) -> Option<Duration> {
        let cpu = self.cpu?;
        let children: Duration = self.children.iter().filter_map(|c| c.cpu).sum();
        Some(cpu.saturating_sub(children))
    }

    /// Operations of this node and every descendant.
    pub fn subtree_operations(&self) -> u64 {
        self.children
            .iter()
            .fold(self.operations, |acc, c| acc.saturating_add(c.subtree_operations()))
    }

    /// Number of nodes in this subtree, this one included.
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(|c| c.node_count()).sum::<usize>()
    }

    /// Direct child called `name`.
    pub fn child(&self, name: &str) -> Option<&NodeSnapshot> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Follow a path of child names from this node.
    pub fn find<S: AsRef<str>>(&self, path: &[S]) -> Option<&NodeSnapshot> {
        path.iter()
            .try_fold(self, |node, name| node.child(name.as_ref()))
    }
}

/// Frozen view of a whole profiler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeSnapshot {
    /// Profiler description
    pub description: String,
    /// The root node
    pub root: NodeSnapshot,
}

impl TreeSnapshot {
    /// Encode as JSON for exchange between processes.
    pub fn to_json(&self) -> ProfilerResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode a snapshot produced by [`TreeSnapshot::to_json`].
    pub fn from_json(json: &str) -> ProfilerResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Follow a path of names below the root.
    pub fn find<S: AsRef<str>>(&self, path: &[S]) -> Option<&NodeSnapshot> {
        self.root.find(path)
    }
}

// Durations travel as integral nanoseconds.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        nanos(duration).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let nanos = u64::deserialize(deserializer)?;
        Ok(Duration::from_nanos(nanos))
    }

    fn nanos(duration: &Duration) -> u64 {
        u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
    }

    pub mod option {
        use super::*;

        pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            duration.as_ref().map(nanos).serialize(serializer)
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
        where
            D: Deserializer<'de>,
        {
            let nanos = Option::<u64>::deserialize(deserializer)?;
            Ok(nanos.map(Duration::from_nanos))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(
        name: &str,
        wall_ms: u64,
        operations: u64,
        children: Vec<NodeSnapshot>,
    ) -> NodeSnapshot {
        NodeSnapshot {
            name: name.to_string(),
            calls: 1,
            wall: Duration::from_millis(wall_ms),
            cpu: Some(Duration::from_millis(wall_ms / 2)),
            operations,
            children,
        }
    }

    #[test]
    fn test_exclusive_times() {
        let parent = node(
            "parent",
            100,
            1,
            vec![node("a", 30, 10, vec![]), node("b", 20, 5, vec![])],
        );
        assert_eq!(parent.exclusive_wall(), Duration::from_millis(50));
        assert_eq!(parent.exclusive_cpu(), Some(Duration::from_millis(25)));
        assert_eq!(parent.subtree_operations(), 16);
        assert_eq!(parent.node_count(), 3);
    }

    #[test]
    fn test_exclusive_never_negative() {
        let parent = node("parent", 10, 0, vec![node("child", 15, 0, vec![])]);
        assert_eq!(parent.exclusive_wall(), Duration::ZERO);
    }

    #[test]
    fn test_find_path() {
        let root = node("All", 10, 0, vec![node("a", 5, 0, vec![node("b", 1, 0, vec![])])]);
        assert_eq!(root.find(&["a", "b"]).map(|n| n.wall), Some(Duration::from_millis(1)));
        assert!(root.find(&["b"]).is_none());
    }

    #[test]
    fn test_json_keeps_untracked_cpu_absent() {
        let mut root = NodeSnapshot::new("All");
        root.wall = Duration::from_nanos(1_500);
        let snapshot = TreeSnapshot {
            description: "job".to_string(),
            root,
        };

        let json = snapshot.to_json().unwrap();
        assert!(json.contains("\"wall\":1500"));
        assert!(json.contains("\"cpu\":null"));
        assert_eq!(TreeSnapshot::from_json(&json).unwrap(), snapshot);
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        assert!(TreeSnapshot::from_json("{").is_err());
    }
}
