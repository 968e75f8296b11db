use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tracing::{error, info, instrument, warn};
use url::Url;

use super::cli::LocalArgs;
use crate::shared::fs::{FsOps, local::LocalFs};
use crate::shared::locks::{FileLock, FileLocks};
use crate::shared::network::DataTransport;
use crate::shared::network::factory::handle_http;
use crate::shared::progress_tracker::{CliProgressTracker, ProgressTracker};
use crate::shared::transfer::complete::CompleteMultipartDownload;
use crate::shared::transfer::persistable::PersistableDownload;
use crate::shared::transfer::scheduler::{PartScheduler, split_parts};
use crate::shared::transfer::{DownloadProgress, TransferState};

#[instrument(skip_all, fields(url = %args.url, output = %args.output.display()))]
pub async fn handle(args: LocalArgs) -> Result<()> {
    let transport = Arc::new(handle_http(args.http_args.clone(), args.transport)?);

    let url = args.url.clone();
    let destination = args.output.clone();
    let part_size = *args.transfer_args.part_size();
    let total_size = transport
        .total_bytes(url.clone())
        .await?
        .context("Server did not report a download size, multipart download needs it")?;

    let file_lock = FileLock::acquire(FileLocks::shared(), destination.clone())?;
    let resume_path = args
        .transfer_args
        .checked_resume_dir()
        .map(|dir| resume_record_path(&dir, &destination));

    let persistable = match &resume_path {
        Some(path) => load_resume_record(path, &url, &destination, total_size, part_size).await,
        None => None,
    }
    .unwrap_or_else(|| PersistableDownload::new(url.clone(), destination.clone(), total_size, part_size));
    let start_part_number = persistable.next_part_number();
    let already_downloaded = *persistable.last_file_position();

    let fs = Arc::new(LocalFs::open(&destination).await?);
    fs.set_len(total_size).await?;

    let parts: Vec<_> = split_parts(total_size, part_size)?
        .into_iter()
        .filter(|part| *part.part_number() >= start_part_number)
        .collect();
    info!(total_size, part_size, start_part_number, remaining_parts = parts.len(), "Starting multipart download");

    let tracker = Arc::new(CliProgressTracker::new(total_size, destination.clone())?);
    tracker.start(already_downloaded).await;
    let progress = Arc::new(DownloadProgress::new(persistable));
    progress.start().await;

    let scheduler = PartScheduler::new(
        transport,
        fs.clone(),
        *args.transfer_args.max_concurrent_parts(),
        tracker.clone(),
    );
    let tasks = scheduler.schedule(url, parts);
    let coordinator = CompleteMultipartDownload::builder()
        .tasks(tasks)
        .file_lock(file_lock)
        .progress(progress.clone())
        .start_part_number(start_part_number)
        .build()?;

    let outcome = tokio::select! {
        outcome = coordinator.complete() => Some(outcome),
        _ = tokio::signal::ctrl_c() => {
            warn!("Received Ctrl+C! Saving progress before shutting down...");
            progress.cancel().await;
            None
        }
    };
    fs.close_fs().await?;

    let snapshot = progress.snapshot().await;
    match outcome {
        Some(Ok(path)) => {
            if let Some(resume_path) = &resume_path {
                remove_resume_record(resume_path).await;
            }
            tracker.finish().await;
            info!(path = %path.display(), "Saved download");
            Ok(())
        }
        Some(Err(err)) => {
            tracker.fail(&err.to_string()).await;
            save_resume_record(resume_path.as_deref(), &snapshot.persistable).await;
            Err(err.into())
        }
        None => {
            tracker.fail("Download interrupted").await;
            save_resume_record(resume_path.as_deref(), &snapshot.persistable).await;
            if snapshot.state != TransferState::Canceled {
                warn!(state = ?snapshot.state, "Interrupted download was not marked canceled");
            }
            bail!("Download interrupted by user")
        }
    }
}

fn resume_record_path(resume_dir: &Path, destination: &Path) -> PathBuf {
    let name = destination
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| "download".to_string());
    resume_dir.join(format!("{name}.resume.json"))
}

async fn load_resume_record(
    path: &Path,
    url: &Url,
    destination: &Path,
    total_size: u64,
    part_size: u64,
) -> Option<PersistableDownload> {
    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        return None;
    }
    match PersistableDownload::load(path).await {
        Ok(record) if record.matches(url, destination, total_size, part_size) => {
            if !destination_holds_checkpoint(destination, &record).await {
                warn!(path = %path.display(), destination = %destination.display(), "Destination no longer holds the recorded parts, starting over");
                return None;
            }
            info!(path = %path.display(), next_part = record.next_part_number(), "Resuming download from record");
            Some(record)
        }
        Ok(_) => {
            warn!(path = %path.display(), "Resume record belongs to another download, starting over");
            None
        }
        Err(err) => {
            warn!(path = %path.display(), error = %err, "Can't read resume record, starting over");
            None
        }
    }
}

///A record is only trusted while the destination still has every byte up to its checkpoint.
async fn destination_holds_checkpoint(destination: &Path, record: &PersistableDownload) -> bool {
    if record.last_part_number().is_none() {
        return true;
    }
    match tokio::fs::metadata(destination).await {
        Ok(metadata) => metadata.is_file() && metadata.len() >= *record.last_file_position(),
        Err(_) => false,
    }
}

async fn save_resume_record(path: Option<&Path>, record: &PersistableDownload) {
    let Some(path) = path else {
        warn!("No resume directory, progress of this download is lost");
        return;
    };
    if let Err(err) = record.save(path).await {
        error!(path = %path.display(), error = %err, "Can't save resume record");
    }
}

async fn remove_resume_record(path: &Path) {
    if tokio::fs::try_exists(path).await.unwrap_or(false) {
        if let Err(err) = tokio::fs::remove_file(path).await {
            warn!(path = %path.display(), error = %err, "Can't remove resume record");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::save_to_local::cli::TransferArgs;
    use crate::shared::network::factory::TransportType;
    use crate::shared::network::http::config::{HttpArgs, RetryArgs};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn local_args(url: Url, output: PathBuf, resume_dir: PathBuf) -> LocalArgs {
        LocalArgs {
            url,
            output,
            http_args: HttpArgs { retry_args: RetryArgs::new(0, 1), ..HttpArgs::default() },
            transfer_args: TransferArgs { part_size: 4, max_concurrent_parts: 2, resume_dir: Some(resume_dir) },
            transport: TransportType::Http,
        }
    }

    async fn mount_parts(server: &MockServer, body: &[u8], part_size: usize) {
        Mock::given(method("HEAD"))
            .and(path("/data.bin"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.to_vec()))
            .mount(server)
            .await;
        for (idx, chunk) in body.chunks(part_size).enumerate() {
            let start = idx * part_size;
            let end = start + chunk.len() - 1;
            Mock::given(method("GET"))
                .and(path("/data.bin"))
                .and(header("range", format!("bytes={start}-{end}").as_str()))
                .respond_with(ResponseTemplate::new(206).set_body_bytes(chunk.to_vec()))
                .mount(server)
                .await;
        }
    }

    #[test]
    fn test_resume_record_path() {
        let path = resume_record_path(Path::new("/cache/.mpdl"), Path::new("/downloads/video.mp4"));
        assert_eq!(path, PathBuf::from("/cache/.mpdl/video.mp4.resume.json"));
    }

    #[tokio::test]
    async fn test_download_completes_and_unlocks() -> Result<()> {
        let server = MockServer::start().await;
        let body = b"0123456789abcdefghij";
        mount_parts(&server, body, 4).await;
        let dir = tempfile::tempdir()?;
        let output = dir.path().join("data.bin");
        let resume_dir = dir.path().join("resume");
        let url = Url::parse(&format!("{}/data.bin", server.uri()))?;

        handle(local_args(url, output.clone(), resume_dir.clone())).await?;

        assert_eq!(tokio::fs::read(&output).await?, body);
        assert!(!FileLocks::shared().is_locked(&output));
        assert!(!resume_record_path(&resume_dir, &output).exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_part_saves_resume_record() -> Result<()> {
        let server = MockServer::start().await;
        let body = b"0123456789abcdefghij";
        // Only the first two parts are served, the third one gets a 404.
        mount_parts(&server, &body[..8], 4).await;
        Mock::given(method("HEAD"))
            .and(path("/data.bin"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.to_vec()))
            .with_priority(1)
            .mount(&server)
            .await;
        let dir = tempfile::tempdir()?;
        let output = dir.path().join("data.bin");
        let resume_dir = dir.path().join("resume");
        let url = Url::parse(&format!("{}/data.bin", server.uri()))?;

        let result = handle(local_args(url.clone(), output.clone(), resume_dir.clone())).await;

        assert!(result.is_err());
        assert!(!FileLocks::shared().is_locked(&output));
        let record = PersistableDownload::load(&resume_record_path(&resume_dir, &output)).await?;
        assert!(record.matches(&url, &output, 20, 4));
        assert_eq!(*record.last_part_number(), Some(2));
        assert_eq!(*record.last_file_position(), 8);
        Ok(())
    }

    #[tokio::test]
    async fn test_deleted_destination_restarts_download() -> Result<()> {
        let server = MockServer::start().await;
        let body = b"0123456789abcdefghij";
        mount_parts(&server, &body[..8], 4).await;
        Mock::given(method("HEAD"))
            .and(path("/data.bin"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.to_vec()))
            .with_priority(1)
            .mount(&server)
            .await;
        let dir = tempfile::tempdir()?;
        let output = dir.path().join("data.bin");
        let resume_dir = dir.path().join("resume");
        let url = Url::parse(&format!("{}/data.bin", server.uri()))?;

        assert!(handle(local_args(url.clone(), output.clone(), resume_dir.clone())).await.is_err());
        assert!(resume_record_path(&resume_dir, &output).exists());

        tokio::fs::remove_file(&output).await?;
        mount_parts(&server, body, 4).await;
        handle(local_args(url, output.clone(), resume_dir.clone())).await?;

        assert_eq!(tokio::fs::read(&output).await?, body);
        assert!(!resume_record_path(&resume_dir, &output).exists());
        Ok(())
    }
}
