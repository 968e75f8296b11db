pub mod local;

use async_trait::async_trait;
use bytes::Bytes;

use crate::shared::errors::TransferError;

#[async_trait]
pub trait FsOps: Send + Sync {
    ///Write `bytes` starting at byte offset `pos` of the file.
    async fn write_at(&self, pos: u64, bytes: Bytes) -> Result<(), TransferError>;
    ///Preallocate or truncate the file to `len` bytes.
    async fn set_len(&self, len: u64) -> Result<(), TransferError>;
    async fn flush(&self) -> Result<(), TransferError>;
}
