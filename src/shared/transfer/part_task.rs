use async_trait::async_trait;
use tokio::task::JoinHandle;

use crate::shared::errors::TransferError;

/// A part download that has already been started somewhere else.
///
/// `join` waits for the part and yields the file position right after its last byte.
/// `cancel` is only a request, a part that already finished ignores it.
#[async_trait]
pub trait PartTask: Send {
    async fn join(&mut self) -> Result<u64, TransferError>;

    fn cancel(&self);
}

#[async_trait]
impl PartTask for JoinHandle<Result<u64, TransferError>> {
    async fn join(&mut self) -> Result<u64, TransferError> {
        match self.await {
            Ok(result) => result,
            Err(err) if err.is_cancelled() => Err(TransferError::Canceled),
            Err(err) => Err(TransferError::TaskJoin(err)),
        }
    }

    fn cancel(&self) {
        self.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_join_handle_yields_position() {
        let mut handle: JoinHandle<Result<u64, TransferError>> = tokio::spawn(async { Ok(1024) });
        assert_eq!(handle.join().await.ok(), Some(1024));
    }

    #[tokio::test]
    async fn test_aborted_handle_is_canceled() {
        let mut handle: JoinHandle<Result<u64, TransferError>> = tokio::spawn(async {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
            Ok(1024)
        });
        handle.cancel();
        assert!(matches!(handle.join().await, Err(TransferError::Canceled)));
    }

    #[tokio::test]
    async fn test_panicked_part_is_join_error() {
        let mut handle: JoinHandle<Result<u64, TransferError>> = tokio::spawn(async { panic!("part exploded") });
        assert!(matches!(handle.join().await, Err(TransferError::TaskJoin(_))));
    }
}
