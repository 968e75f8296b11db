use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt, BufWriter};
use tokio::sync::Mutex;
use tracing::{debug, instrument, trace};

use crate::shared::{errors::TransferError, fs::FsOps};

/// Destination file shared by every part of a download.
///
/// **NB:** only one part can write at a time, the others wait on the lock.
/// Seeking flushes whatever the previous writer left in the buffer, so each
/// write lands at its own offset.
pub struct LocalFs {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl LocalFs {
    ///Open `path` for writing without truncating it, creating it and its parent directories if needed.
    #[instrument(name = "local_fs_open", skip_all, fields(path = %path.display()))]
    pub async fn open(path: &Path) -> Result<Self, TransferError> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            debug!("Making sure directory {} exists ...", parent.display());
            tokio::fs::create_dir_all(parent).await?;
        }
        let handle = OpenOptions::new().create(true).truncate(false).read(true).write(true).open(path).await?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(BufWriter::with_capacity(128 * 1024, handle)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    ///Flush the in-memory buffer and sync the file to disk.
    pub async fn close_fs(&self) -> Result<(), TransferError> {
        let mut writer = self.writer.lock().await;
        writer.flush().await?;
        writer.get_ref().sync_all().await?;
        Ok(())
    }
}

#[async_trait]
impl FsOps for LocalFs {
    async fn write_at(&self, pos: u64, bytes: Bytes) -> Result<(), TransferError> {
        let mut writer = self.writer.lock().await;
        // Let the cursor point to the current part offset.
        writer.seek(SeekFrom::Start(pos)).await?;
        writer.write_all(&bytes).await?;
        trace!(pos, len = bytes.len(), "Wrote chunk");
        Ok(())
    }

    async fn set_len(&self, len: u64) -> Result<(), TransferError> {
        let mut writer = self.writer.lock().await;
        writer.flush().await?;
        writer.get_ref().set_len(len).await?;
        Ok(())
    }

    async fn flush(&self) -> Result<(), TransferError> {
        self.writer.lock().await.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_out_of_order_writes() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("parts").join("out.bin");
        let fs = Arc::new(LocalFs::open(&path).await?);
        fs.set_len(12).await?;

        let mut handles = vec![];
        for (pos, chunk) in [(8u64, "ijkl"), (0, "abcd"), (4, "efgh")] {
            let fs_clone = fs.clone();
            handles.push(tokio::spawn(async move { fs_clone.write_at(pos, Bytes::from_static(chunk.as_bytes())).await }));
        }
        for handle in handles {
            handle.await??;
        }
        fs.close_fs().await?;

        assert_eq!(tokio::fs::read(&path).await?, b"abcdefghijkl");
        Ok(())
    }

    #[tokio::test]
    async fn test_open_keeps_existing_bytes() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("resumed.bin");
        tokio::fs::write(&path, b"done----").await?;

        let fs = LocalFs::open(&path).await?;
        fs.write_at(4, Bytes::from_static(b"more")).await?;
        fs.close_fs().await?;

        assert_eq!(tokio::fs::read(&path).await?, b"donemore");
        Ok(())
    }
}
