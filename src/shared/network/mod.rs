use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use tokio_stream::Stream;
use url::Url;

use crate::shared::errors::TransferError;

#[cfg(feature="local")]
pub mod http;

#[cfg(feature="local")]
pub mod factory;

pub type BytesStream = Pin<Box<dyn Stream<Item = Result<Bytes, TransferError>> + Send + 'static>>;

#[async_trait]
pub trait DataTransport: Send + Sync {
    ///Stream the inclusive byte range ``[start, end]`` of `source`.
    async fn receive_range(&self, source: Url, range: [u64; 2]) -> Result<BytesStream, TransferError>;
    ///Size of `source` in bytes, if the server reports it.
    async fn total_bytes(&self, source: Url) -> Result<Option<u64>, TransferError>;
}
