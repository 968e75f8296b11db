//! # Transfer Module
//!
//! State of a single multipart download: where it is in its lifecycle, how far
//! it got on disk, and the pieces that drive it to a terminal state.

pub mod complete;
pub mod part_task;
pub mod persistable;
pub mod scheduler;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use persistable::PersistableDownload;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferState {
    Waiting,
    InProgress,
    Completed,
    Failed,
    Canceled,
}

impl TransferState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TransferState::Completed | TransferState::Failed | TransferState::Canceled)
    }
}

/// The only states the finalization step may put a download in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalState {
    Completed,
    Failed,
}

impl From<TerminalState> for TransferState {
    fn from(value: TerminalState) -> Self {
        match value {
            TerminalState::Completed => TransferState::Completed,
            TerminalState::Failed => TransferState::Failed,
        }
    }
}

/// Write side of a download's progress as seen by the finalization step.
#[async_trait]
pub trait CompletionSink: Send + Sync {
    /// Record that every byte up to `file_position` is on disk once `part_number` finished.
    async fn record_checkpoint(&self, part_number: u32, file_position: u64);

    /// Move the download into its terminal state.
    async fn finish(&self, state: TerminalState);
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSnapshot {
    pub state: TransferState,
    pub persistable: PersistableDownload,
}

/// Progress of one download, safe to poll from other tasks while it is being written.
///
/// Every write replaces the state and the resume record under the same lock,
/// so a reader never observes a checkpoint half applied.
#[derive(Debug)]
pub struct DownloadProgress {
    inner: RwLock<ProgressSnapshot>,
}

impl DownloadProgress {
    pub fn new(persistable: PersistableDownload) -> Self {
        Self {
            inner: RwLock::new(ProgressSnapshot { state: TransferState::Waiting, persistable }),
        }
    }

    pub async fn start(&self) {
        self.transition(TransferState::InProgress).await;
    }

    pub async fn cancel(&self) {
        self.transition(TransferState::Canceled).await;
    }

    pub async fn state(&self) -> TransferState {
        self.inner.read().await.state
    }

    pub async fn snapshot(&self) -> ProgressSnapshot {
        self.inner.read().await.clone()
    }

    async fn transition(&self, next: TransferState) {
        let mut inner = self.inner.write().await;
        if inner.state.is_terminal() {
            warn!(current = ?inner.state, requested = ?next, "Download already reached a terminal state");
            return;
        }
        info!(from = ?inner.state, to = ?next, "Download state changed");
        inner.state = next;
    }
}

#[async_trait]
impl CompletionSink for DownloadProgress {
    async fn record_checkpoint(&self, part_number: u32, file_position: u64) {
        let mut inner = self.inner.write().await;
        inner.persistable.checkpoint(part_number, file_position);
        debug!(part_number, file_position, "Recorded resume checkpoint");
    }

    async fn finish(&self, state: TerminalState) {
        self.transition(state.into()).await;
    }
}
