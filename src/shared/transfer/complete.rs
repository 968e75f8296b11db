//! Finalization of a multipart download.
//!
//! Parts are downloaded concurrently by the scheduler, but they are settled
//! here one at a time in part order. Each finished part moves the resume
//! checkpoint forward, so the checkpoint only ever covers a contiguous prefix
//! of the destination file.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;

use derive_setters::Setters;
use tracing::{error, info, instrument, warn};

use super::part_task::PartTask;
use super::{CompletionSink, TerminalState};
use crate::shared::errors::{CompletionError, TransferError};
use crate::shared::locks::FileLock;

#[derive(Setters)]
#[setters(strip_option)]
pub struct CompleteMultipartDownloadBuilder<T> {
    ///Pending part tasks, ordered by ascending part number.
    tasks: Option<Vec<T>>,
    ///Lock held on the destination file, released once finalization is over.
    file_lock: Option<FileLock>,
    progress: Option<Arc<dyn CompletionSink>>,
    ///Part number of the first task.
    start_part_number: Option<u32>,
}

impl<T: PartTask> CompleteMultipartDownloadBuilder<T> {
    pub fn new() -> Self {
        Self { tasks: None, file_lock: None, progress: None, start_part_number: None }
    }

    pub fn build(self) -> Result<CompleteMultipartDownload<T>, TransferError> {
        let tasks = self.tasks.ok_or(TransferError::InvalidInput("Part tasks must be provided.".into()))?;
        let file_lock = self
            .file_lock
            .ok_or(TransferError::InvalidInput("Destination file lock must be provided.".into()))?;
        let progress = self
            .progress
            .ok_or(TransferError::InvalidInput("Download progress must be provided.".into()))?;
        let current_part_number = self
            .start_part_number
            .ok_or(TransferError::InvalidInput("Start part number must be provided.".into()))?;
        let last_offset = u32::try_from(tasks.len().saturating_sub(1)).ok();
        if last_offset.and_then(|offset| current_part_number.checked_add(offset)).is_none() {
            return Err(TransferError::InvalidInput(format!(
                "{} parts starting at part number {current_part_number} overflow the part numbering.",
                tasks.len()
            )));
        }
        Ok(CompleteMultipartDownload { tasks, file_lock, progress, current_part_number })
    }
}

impl<T: PartTask> Default for CompleteMultipartDownloadBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Waits on the parts of a download and settles it as completed or failed.
pub struct CompleteMultipartDownload<T> {
    tasks: Vec<T>,
    file_lock: FileLock,
    progress: Arc<dyn CompletionSink>,
    current_part_number: u32,
}

/// Parts not yet settled together with the destination lock.
///
/// Dropping it before every part is settled cancels the remaining parts
/// first, then the lock guard is dropped with it.
struct UnsettledParts<T: PartTask> {
    pending: VecDeque<T>,
    file_lock: Option<FileLock>,
}

impl<T: PartTask> UnsettledParts<T> {
    fn cancel_pending(&mut self) {
        for task in self.pending.drain(..) {
            task.cancel();
        }
    }
}

impl<T: PartTask> Drop for UnsettledParts<T> {
    fn drop(&mut self) {
        if !self.pending.is_empty() {
            warn!(parts = self.pending.len(), "Finalization stopped early, canceling unsettled parts");
            self.cancel_pending();
        }
    }
}

impl<T: PartTask> CompleteMultipartDownload<T> {
    pub fn builder() -> CompleteMultipartDownloadBuilder<T> {
        CompleteMultipartDownloadBuilder::new()
    }

    /// Await every part in order and return the destination path.
    ///
    /// The first failing part cancels every part after it, marks the download
    /// failed and is returned wrapped in a [`CompletionError`]. The destination
    /// lock is released last, whichever way this returns. If the future is
    /// dropped or the progress sink panics, the parts still running are
    /// canceled before the lock is let go.
    #[instrument(name = "complete_multipart_download", skip(self), fields(destination = %self.file_lock.path().display(), parts = self.tasks.len(), start_part = self.current_part_number))]
    pub async fn complete(self) -> Result<PathBuf, CompletionError> {
        let Self { tasks, file_lock, progress, mut current_part_number } = self;

        let destination = file_lock.path().to_path_buf();
        let mut unsettled = UnsettledParts { pending: tasks.into(), file_lock: Some(file_lock) };
        let mut last_file_position = 0u64;
        let mut failure = None;

        while let Some(task) = unsettled.pending.front_mut() {
            let joined = task.join().await;
            unsettled.pending.pop_front();
            match joined {
                Ok(file_position) => {
                    if file_position < last_file_position {
                        warn!(part_number = current_part_number, file_position, last_file_position, "Part ended before the previous checkpoint");
                    }
                    progress.record_checkpoint(current_part_number, file_position).await;
                    last_file_position = file_position;
                    // Checked by the builder for every part but the last one.
                    current_part_number = current_part_number.saturating_add(1);
                }
                Err(err) => {
                    error!(part_number = current_part_number, error = %err, "Part download failed, canceling remaining parts");
                    unsettled.cancel_pending();
                    failure = Some(CompletionError::new(current_part_number, err));
                    break;
                }
            }
        }

        let result = match failure {
            None => {
                progress.finish(TerminalState::Completed).await;
                info!(destination = %destination.display(), "Multipart download completed");
                Ok(destination)
            }
            Some(err) => {
                progress.finish(TerminalState::Failed).await;
                Err(err)
            }
        };
        if let Some(file_lock) = unsettled.file_lock.take() {
            file_lock.release();
        }
        result
    }
}
