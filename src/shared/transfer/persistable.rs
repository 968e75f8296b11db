use std::io::{Cursor, SeekFrom};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use derive_getters::Getters;
use serde::{Deserialize, Serialize};
use tokio::fs::OpenOptions;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, instrument};
use url::Url;

use crate::shared::errors::TransferError;

///This is the resume record that gets serialized
/// and deserialized on-demand so an interrupted download can pick up
/// after its last fully downloaded part.
#[derive(Deserialize, Serialize, Getters, Debug, Clone, PartialEq)]
pub struct PersistableDownload {
    /// Source of the download.
    url: Url,
    /// Path of the destination file.
    destination: PathBuf,
    ///Total download file size.
    total_size: u64,
    ///Size of every part except possibly the last one.
    part_size: u64,
    ///Last part whose bytes are all on disk.
    last_part_number: Option<u32>,
    ///File position right after `last_part_number`.
    last_file_position: u64,
    ///Date the download started.
    started_on: DateTime<Local>,
}

impl PersistableDownload {
    pub fn new(url: Url, destination: PathBuf, total_size: u64, part_size: u64) -> Self {
        Self {
            url,
            destination,
            total_size,
            part_size,
            last_part_number: None,
            last_file_position: 0,
            started_on: Local::now(),
        }
    }

    pub(crate) fn checkpoint(&mut self, part_number: u32, file_position: u64) {
        self.last_part_number = Some(part_number);
        self.last_file_position = file_position;
    }

    /// Part number the next run should start from.
    pub fn next_part_number(&self) -> u32 {
        self.last_part_number.map_or(1, |part| part + 1)
    }

    ///Whether this record describes the same download, so it can be resumed.
    pub fn matches(&self, url: &Url, destination: &Path, total_size: u64, part_size: u64) -> bool {
        &self.url == url
            && self.destination == destination
            && self.total_size == total_size
            && self.part_size == part_size
    }

    ///This method will take a reader i.e a type implementing
    /// ``tokio::io::AsyncRead`` and load json string
    /// representation of ``PersistableDownload``.
    #[instrument(name = "load_resume_record", skip(reader))]
    pub async fn load_from<R>(reader: &mut R) -> Result<Self, TransferError>
    where
        R: AsyncRead + AsyncSeek + Unpin,
    {
        let mut buf = String::new();
        // Seek back to start because write advances cursor to end
        debug!("Seeking to position 0 on Reader...");
        reader.seek(SeekFrom::Start(0)).await?;
        let bytes_count = reader.read_to_string(&mut buf).await?;
        debug!("Read {bytes_count} bytes of resume record to String buffer.");

        let record: PersistableDownload = serde_json::from_str(buf.trim())?;
        Ok(record)
    }

    ///This method will take a writer i.e a type implementing
    /// ``tokio::io::AsyncWrite`` and write to the writer a json string
    /// representation of ``PersistableDownload``.
    #[instrument(name = "save_resume_record", skip(self, writer), fields(last_part = ?self.last_part_number))]
    pub async fn save_to<W>(&self, writer: &mut W) -> Result<(), TransferError>
    where
        W: AsyncWrite + AsyncSeek + Unpin,
    {
        let record_json = serde_json::to_string(self)?;
        let mut record_cursor = Cursor::new(record_json.into_bytes());
        debug!("Seeking to position 0 on Writer...");
        writer.seek(SeekFrom::Start(0)).await?;
        writer.write_all_buf(&mut record_cursor).await?;
        writer.flush().await?;

        Ok(())
    }

    pub async fn load(path: &Path) -> Result<Self, TransferError> {
        let mut handle = OpenOptions::new().read(true).open(path).await?;
        Self::load_from(&mut handle).await
    }

    ///Write the record to `path`, replacing any previous record.
    pub async fn save(&self, path: &Path) -> Result<(), TransferError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut handle = OpenOptions::new().create(true).write(true).truncate(true).open(path).await?;
        self.save_to(&mut handle).await?;
        info!(path = %path.display(), "Saved resume record");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    fn record() -> PersistableDownload {
        let url = Url::parse("http://127.0.0.1:8080/fake_mp4.mp4").expect("valid url");
        PersistableDownload::new(url, PathBuf::from("/tmp/fake_mp4.mp4"), 38560, 1024)
    }

    #[test]
    fn test_next_part_number() {
        let mut record = record();
        assert_eq!(record.next_part_number(), 1);
        record.checkpoint(3, 3072);
        assert_eq!(record.next_part_number(), 4);
        assert_eq!(*record.last_file_position(), 3072);
    }

    #[test]
    fn test_matches_same_download_only() {
        let record = record();
        let url = record.url().clone();
        assert!(record.matches(&url, Path::new("/tmp/fake_mp4.mp4"), 38560, 1024));
        assert!(!record.matches(&url, Path::new("/tmp/fake_mp4.mp4"), 38560, 2048));
        assert!(!record.matches(&url, Path::new("/tmp/other.mp4"), 38560, 1024));
    }

    #[tokio::test]
    async fn test_resume_record_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("nested").join("fake_mp4.mp4.resume.json");
        let mut saved = record();
        saved.checkpoint(7, 7168);
        saved.save(&path).await?;

        // A shorter record must not leave trailing bytes of the previous one behind.
        let mut shorter = record();
        shorter.checkpoint(1, 1024);
        shorter.save(&path).await?;

        let loaded = PersistableDownload::load(&path).await?;
        assert_eq!(loaded, shorter);
        Ok(())
    }
}
