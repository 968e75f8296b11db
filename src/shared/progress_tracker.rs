use std::path::PathBuf;

use async_trait::async_trait;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{error, info};

use crate::shared::errors::TransferError;

/// Trait for byte progress reporting that any UI/interface can implement
/// This allows decoupling download logic from specific UI implementations (indicatif, GUI, web, etc.)
#[async_trait]
pub trait ProgressTracker: Send + Sync {
    ///Bytes that were already on disk before this run, e.g from a resumed download.
    async fn start(&self, already_downloaded: u64);
    /// Update progress with bytes written for a specific part
    async fn update(&self, bytes_written: u64);

    async fn fail(&self, message: &str);

    /// Mark entire download as complete
    async fn finish(&self);
}

/// No-op progress tracker for when progress tracking is not needed
pub struct NoOpProgressTracker;

#[async_trait]
impl ProgressTracker for NoOpProgressTracker {
    async fn start(&self, _already_downloaded: u64) {}

    async fn update(&self, _bytes_written: u64) {}

    async fn fail(&self, _message: &str) {}

    async fn finish(&self) {}
}

pub struct CliProgressTracker {
    progress_bar: ProgressBar,
    download_path: PathBuf,
    download_name: String,
    total_bytes: u64,
}
impl CliProgressTracker {
    // Create a new progress tracker
    /// # Parameters
    /// * `total_bytes` - Total size of the download in bytes
    /// * `download_path` - Path to the download.
    pub fn new(total_bytes: u64, download_path: PathBuf) -> Result<Self, TransferError> {
        let progress_bar = ProgressBar::new(total_bytes);
        let style = ProgressStyle::with_template("[{elapsed_precise}] {bar:40.cyan/blue} {bytes:>9}/{total_bytes:9} {binary_bytes_per_sec} {msg}")
            .map_err(|err| TransferError::ParseError(format!("Invalid progress bar template: {err}")))?
            .progress_chars("##-");
        progress_bar.set_style(style);
        let download_name = download_path
            .file_name()
            .ok_or(TransferError::ParseError(format!(
                "Invalid download path {}, can't get file name",
                download_path.display()
            )))?
            .to_string_lossy()
            .to_string();
        Ok(Self { progress_bar, download_path, download_name, total_bytes })
    }
}

#[async_trait]
impl ProgressTracker for CliProgressTracker {
    async fn start(&self, already_downloaded: u64) {
        self.progress_bar.set_position(already_downloaded);
        self.progress_bar.set_message(self.download_name.clone());
    }

    async fn update(&self, bytes_written: u64) {
        self.progress_bar.inc(bytes_written);
    }

    async fn fail(&self, message: &str) {
        self.progress_bar.abandon_with_message(format!("{}", message.red()));
        error!(download_name = self.download_name, "Download failed: {message}");
    }

    async fn finish(&self) {
        let colored_string = format!(
            "Download '{}' Completed.\nTotal size: {}\nFile path: {}",
            self.download_name,
            self.total_bytes,
            self.download_path.display()
        )
        .purple();
        self.progress_bar.finish_with_message(colored_string.to_string());

        info!(
            total_bytes = self.total_bytes,
            download_name = self.download_name,
            download_path = self.download_path.to_str(),
            "Download completed successfully"
        );
    }
}
