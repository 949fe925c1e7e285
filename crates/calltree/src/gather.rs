//! Moving per-process trees to the reporting process.
//!
//! The profiler only relies on the [`Gather`] contract: every process hands
//! in its local snapshot and the reporting process gets all of them back.
//! How the bytes travel is up to the implementation.

use std::fmt::Debug;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Mutex;

use crate::error::{ProfilerError, ProfilerResult};
use crate::snapshot::TreeSnapshot;

/// Collects one snapshot from every participating process.
pub trait Gather: Debug + Send + Sync {
    /// Contribute `local`.
    ///
    /// On the reporting process, returns every participant's snapshot with
    /// the local one first; elsewhere returns `None`.
    fn gather(&self, local: TreeSnapshot) -> ProfilerResult<Option<Vec<TreeSnapshot>>>;
}

/// The trivial gather of a run with one process.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleProcess;

impl Gather for SingleProcess {
    fn gather(&self, local: TreeSnapshot) -> ProfilerResult<Option<Vec<TreeSnapshot>>> {
        Ok(Some(vec![local]))
    }
}

/// In-process gather over channels, with threads standing in for processes.
///
/// Snapshots cross the channel JSON-encoded, the same form they would take
/// on a real transport. Rank 0 reports.
#[derive(Debug)]
pub struct ChannelGather {
    rank: usize,
    size: usize,
    sender: Sender<(usize, String)>,
    receiver: Option<Mutex<Receiver<(usize, String)>>>,
}

impl ChannelGather {
    /// Create one endpoint per rank, `size` in total, indexed by rank.
    pub fn group(size: usize) -> Vec<ChannelGather> {
        let (sender, receiver) = mpsc::channel();
        let mut receiver = Some(Mutex::new(receiver));
        (0..size)
            .map(|rank| ChannelGather {
                rank,
                size,
                sender: sender.clone(),
                receiver: if rank == 0 { receiver.take() } else { None },
            })
            .collect()
    }

    /// Rank of this endpoint.
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Number of ranks in the group.
    pub fn size(&self) -> usize {
        self.size
    }
}

impl Gather for ChannelGather {
    fn gather(&self, local: TreeSnapshot) -> ProfilerResult<Option<Vec<TreeSnapshot>>> {
        let Some(receiver) = &self.receiver else {
            self.sender
                .send((self.rank, local.to_json()?))
                .map_err(|e| ProfilerError::Transport(e.to_string()))?;
            return Ok(None);
        };

        let receiver = receiver
            .lock()
            .map_err(|_| ProfilerError::Transport("receiver lock poisoned".to_string()))?;

        let mut remote = Vec::with_capacity(self.size.saturating_sub(1));
        for _ in 1..self.size {
            let (rank, json) = receiver
                .recv()
                .map_err(|e| ProfilerError::Transport(e.to_string()))?;
            remote.push((rank, TreeSnapshot::from_json(&json)?));
        }
        remote.sort_by_key(|(rank, _)| *rank);

        tracing::debug!(target: "calltree", ranks = self.size, "gathered call trees");

        let mut trees = Vec::with_capacity(self.size);
        trees.push(local);
        trees.extend(remote.into_iter().map(|(_, tree)| tree));
        Ok(Some(trees))
    }
}
