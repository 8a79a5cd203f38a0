//! Engine trait and the controller that keeps the tree and engine in step.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::error::{TreeError, TreeResult};
use crate::model::{AffectedLeaf, Priority};
use crate::tree::PriorityTree;

/// Operations the download engine exposes to the tree.
#[async_trait]
pub trait DownloadEngine: Send + Sync {
    /// Apply a priority to one file of a download.
    async fn set_file_priority(
        &self,
        download_id: Uuid,
        file_index: u32,
        priority: Priority,
    ) -> anyhow::Result<()>;

    /// Completion fraction of every file, keyed by full `/`-separated path.
    async fn completion_snapshot(
        &self,
        download_id: Uuid,
    ) -> anyhow::Result<HashMap<String, f64>>;
}

/// A leaf whose engine update failed.
#[derive(Debug)]
pub struct LeafFailure {
    /// Leaf that could not be updated in the engine.
    pub leaf: AffectedLeaf,
    /// Engine failure reported for the leaf.
    pub error: TreeError,
}

/// Outcome of a priority change pushed to the engine.
#[derive(Debug)]
pub struct PriorityChangeReport {
    /// Priority that was requested.
    pub priority: Priority,
    /// Leaves the engine accepted, in visit order.
    pub applied: Vec<AffectedLeaf>,
    /// Leaves the engine rejected, in visit order.
    pub failed: Vec<LeafFailure>,
}

impl PriorityChangeReport {
    /// Whether every affected leaf reached the engine.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// Number of leaves touched by the change.
    #[must_use]
    pub fn total(&self) -> usize {
        self.applied.len() + self.failed.len()
    }
}

/// Applies priority changes to the tree and mirrors them into the engine.
///
/// The tree lock is only held for the local update; engine calls run after
/// it has been released.
#[derive(Clone)]
pub struct TreeSyncController {
    tree: Arc<RwLock<PriorityTree>>,
    engine: Arc<dyn DownloadEngine>,
}

impl TreeSyncController {
    /// Wrap a freshly built tree and the engine that owns its download.
    #[must_use]
    pub fn new(tree: PriorityTree, engine: Arc<dyn DownloadEngine>) -> Self {
        Self {
            tree: Arc::new(RwLock::new(tree)),
            engine,
        }
    }

    /// Shared handle to the tree for concurrent readers.
    #[must_use]
    pub fn tree(&self) -> Arc<RwLock<PriorityTree>> {
        Arc::clone(&self.tree)
    }

    /// Run `reader` against the tree under the read lock.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::TreeCorrupted`] if a writer panicked while
    /// holding the lock.
    pub fn read<R>(&self, reader: impl FnOnce(&PriorityTree) -> R) -> TreeResult<R> {
        let guard = self.read_guard()?;
        Ok(reader(&guard))
    }

    /// Set `priority` on the node at `path` and push it to the engine.
    ///
    /// The engine is called once per affected file, in the order returned by
    /// [`PriorityTree::set_priority`]. Engine failures are collected in the
    /// report; the tree keeps the new priority for every file either way.
    ///
    /// # Errors
    ///
    /// Returns the tree's error if the path is unknown or the subtree is
    /// corrupted. The engine is not called in that case.
    #[instrument(name = "tree_sync.request_priority_change", skip(self))]
    pub async fn request_priority_change(
        &self,
        path: &str,
        priority: Priority,
    ) -> TreeResult<PriorityChangeReport> {
        let (download_id, affected) = {
            let mut tree = self.write_guard()?;
            let affected = tree.set_priority(path, priority)?;
            (tree.download_id(), affected)
        };

        let mut applied = Vec::with_capacity(affected.len());
        let mut failed = Vec::new();
        for leaf in affected {
            match self
                .engine
                .set_file_priority(download_id, leaf.index, priority)
                .await
            {
                Ok(()) => applied.push(leaf),
                Err(err) => {
                    warn!(
                        %download_id,
                        file = %leaf.path,
                        index = leaf.index,
                        error = %err,
                        "engine rejected file priority"
                    );
                    failed.push(LeafFailure {
                        error: TreeError::engine("set_file_priority", Some(leaf.index), err),
                        leaf,
                    });
                }
            }
        }

        info!(
            %download_id,
            applied = applied.len(),
            failed = failed.len(),
            "priority change synchronised"
        );
        Ok(PriorityChangeReport {
            priority,
            applied,
            failed,
        })
    }

    /// Pull a completion snapshot from the engine and apply it to the tree.
    ///
    /// Returns the number of files whose completion was updated.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::EngineFailure`] if the snapshot cannot be
    /// fetched; the tree is left unchanged.
    #[instrument(name = "tree_sync.refresh_from_engine", skip(self))]
    pub async fn refresh_from_engine(&self) -> TreeResult<usize> {
        let download_id = self.read(PriorityTree::download_id)?;
        let snapshot = self
            .engine
            .completion_snapshot(download_id)
            .await
            .map_err(|err| TreeError::engine("completion_snapshot", None, err))?;

        let mut tree = self.write_guard()?;
        Ok(tree.refresh_progress(&snapshot))
    }

    /// Restore the previous local priority of every leaf the engine rejected.
    ///
    /// # Errors
    ///
    /// Returns the tree's error if a failed leaf no longer resolves to the
    /// same file; nothing is restored in that case.
    pub fn revert_failures(&self, report: &PriorityChangeReport) -> TreeResult<()> {
        if report.is_complete() {
            return Ok(());
        }
        let leaves: Vec<_> = report
            .failed
            .iter()
            .map(|failure| failure.leaf.clone())
            .collect();
        let mut tree = self.write_guard()?;
        tree.restore_priorities(&leaves)?;
        info!(
            download_id = %tree.download_id(),
            reverted = leaves.len(),
            "reverted rejected priorities"
        );
        Ok(())
    }

    fn read_guard(&self) -> TreeResult<RwLockReadGuard<'_, PriorityTree>> {
        self.tree.read().map_err(|_| poisoned())
    }

    fn write_guard(&self) -> TreeResult<RwLockWriteGuard<'_, PriorityTree>> {
        self.tree.write().map_err(|_| poisoned())
    }
}

fn poisoned() -> TreeError {
    TreeError::TreeCorrupted {
        path: String::new(),
        reason: "tree lock poisoned",
    }
}
