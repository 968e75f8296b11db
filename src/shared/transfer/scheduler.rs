use std::sync::Arc;

use derive_getters::Getters;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tracing::{Instrument, debug, info_span};
use url::Url;

use crate::shared::errors::TransferError;
use crate::shared::fs::FsOps;
use crate::shared::network::DataTransport;
use crate::shared::progress_tracker::ProgressTracker;

/// Inclusive byte range of one part, numbered from 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Getters)]
pub struct PartRange {
    part_number: u32,
    start: u64,
    end: u64,
}

impl PartRange {
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    ///Always false, a part covers at least one byte.
    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }
}

///This function will take a ``total_size`` and a ``part_size``
/// and generate the parts covering ``[0, total_size)``.
pub fn split_parts(total_size: u64, part_size: u64) -> Result<Vec<PartRange>, TransferError> {
    if part_size == 0 {
        return Err(TransferError::InvalidInput("Part size must be greater than zero.".into()));
    }
    let mut parts = Vec::new();
    let mut start = 0u64;
    let mut part_number = 1u32;
    while start < total_size {
        let end = start.saturating_add(part_size - 1).min(total_size - 1);
        parts.push(PartRange { part_number, start, end });
        start = end + 1;
        part_number += 1;
    }
    Ok(parts)
}

/// Starts part downloads and hands back their join handles in part order.
pub struct PartScheduler<T, F> {
    transport: Arc<T>,
    fs: Arc<F>,
    permits: Arc<Semaphore>,
    tracker: Arc<dyn ProgressTracker>,
}

impl<T, F> PartScheduler<T, F>
where
    T: DataTransport + 'static,
    F: FsOps + 'static,
{
    pub fn new(transport: Arc<T>, fs: Arc<F>, max_concurrent_parts: usize, tracker: Arc<dyn ProgressTracker>) -> Self {
        Self {
            transport,
            fs,
            permits: Arc::new(Semaphore::new(max_concurrent_parts.max(1))),
            tracker,
        }
    }

    ///Spawn one task per part. Each resolves to the file position right after its last byte.
    pub fn schedule(&self, source: Url, parts: Vec<PartRange>) -> Vec<JoinHandle<Result<u64, TransferError>>> {
        debug!(parts = parts.len(), "Scheduling part downloads");
        parts
            .into_iter()
            .map(|part| {
                let transport = self.transport.clone();
                let fs = self.fs.clone();
                let permits = self.permits.clone();
                let tracker = self.tracker.clone();
                let source = source.clone();
                let span = info_span!("part", part_number = part.part_number, start = part.start, end = part.end);
                tokio::spawn(
                    async move {
                        // Only `max_concurrent_parts` parts hold a permit at a time, the rest wait here.
                        let _permit = permits
                            .acquire_owned()
                            .await
                            .map_err(|err| TransferError::Fatal(format!("Part scheduler closed: {err}")))?;
                        fetch_part(transport.as_ref(), fs.as_ref(), tracker.as_ref(), source, part).await
                    }
                    .instrument(span),
                )
            })
            .collect()
    }
}

async fn fetch_part<T, F>(
    transport: &T,
    fs: &F,
    tracker: &dyn ProgressTracker,
    source: Url,
    part: PartRange,
) -> Result<u64, TransferError>
where
    T: DataTransport + ?Sized,
    F: FsOps + ?Sized,
{
    let mut stream = transport.receive_range(source, [part.start, part.end]).await?;
    let mut pos = part.start;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        let len = chunk.len() as u64;
        if pos + len > part.end + 1 {
            return Err(TransferError::Fatal(format!(
                "Part {} received more bytes than its range {}-{}",
                part.part_number, part.start, part.end
            )));
        }
        fs.write_at(pos, chunk).await?;
        pos += len;
        tracker.update(len).await;
    }
    fs.flush().await?;

    let received = pos - part.start;
    if received != part.len() {
        return Err(TransferError::ShortPart { part_number: part.part_number, received, expected: part.len() });
    }
    debug!(received, "Part downloaded");
    Ok(pos)
}
