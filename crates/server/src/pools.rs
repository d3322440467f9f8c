//! Bounded reader pools: one for `cat`/`grep`/`map` reads, one for tails.

use std::path::Path;
use std::sync::Arc;

use protocol::ReadMode;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::messenger::Messenger;

#[derive(Debug)]
pub(crate) struct ReaderPools {
    cats: Arc<Semaphore>,
    tails: Arc<Semaphore>,
}

impl ReaderPools {
    pub(crate) fn new(max_cats: usize, max_tails: usize) -> Self {
        Self {
            cats: Arc::new(Semaphore::new(max_cats.max(1))),
            tails: Arc::new(Semaphore::new(max_tails.max(1))),
        }
    }

    /// Takes a reader slot, telling the client when it has to queue.
    /// `None` when cancelled while waiting.
    pub(crate) async fn acquire(
        &self,
        mode: ReadMode,
        path: &Path,
        messenger: &Messenger,
        cancel: &CancellationToken,
    ) -> Option<OwnedSemaphorePermit> {
        let pool = if mode.is_tail() { &self.tails } else { &self.cats };
        if let Ok(permit) = Arc::clone(pool).try_acquire_owned() {
            return Some(permit);
        }
        messenger
            .info(format!(
                "Server limit reached, queueing {} ({} readers busy)",
                path.display(),
                mode
            ))
            .await;
        tokio::select! {
            () = cancel.cancelled() => None,
            permit = Arc::clone(pool).acquire_owned() => permit.ok(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use protocol::Frame;
    use tokio::sync::mpsc;

    use super::*;

    #[tokio::test]
    async fn full_pool_queues_with_a_message() {
        let pools = ReaderPools::new(1, 1);
        let (tx, mut rx) = mpsc::channel(4);
        let messenger = Messenger::new(tx, Arc::from("h"));
        let cancel = CancellationToken::new();
        let path = Path::new("/var/log/a.log");

        let held = pools.acquire(ReadMode::Cat, path, &messenger, &cancel).await.unwrap();
        let tail = pools.acquire(ReadMode::Tail, path, &messenger, &cancel).await;
        assert!(tail.is_some());

        let waiter = {
            let messenger = messenger.clone();
            let cancel = cancel.clone();
            async move {
                pools
                    .acquire(ReadMode::Grep, Path::new("/var/log/a.log"), &messenger, &cancel)
                    .await
                    .is_some()
            }
        };
        let release = async {
            let frame = rx.recv().await.unwrap();
            assert!(matches!(frame, Frame::Server { ref text, .. } if text.starts_with("INFO|Server limit reached")));
            tokio::time::sleep(Duration::from_millis(5)).await;
            drop(held);
        };
        let (acquired, ()) = tokio::join!(waiter, release);
        assert!(acquired);
    }

    #[tokio::test]
    async fn cancelled_waiters_give_up() {
        let pools = ReaderPools::new(1, 1);
        let (tx, _rx) = mpsc::channel(4);
        let messenger = Messenger::new(tx, Arc::from("h"));
        let cancel = CancellationToken::new();
        let _held = pools
            .acquire(ReadMode::Tail, Path::new("a"), &messenger, &cancel)
            .await;
        cancel.cancel();
        assert!(pools
            .acquire(ReadMode::Tail, Path::new("b"), &messenger, &cancel)
            .await
            .is_none());
    }
}
