use std::{future::Future, sync::Arc, time::Duration};

use tokio::time::sleep;
use tracing::{info, warn};

use crate::{
    dao::{chat_store::ChatStore, storage::StorageError},
    state::store::StoreHandle,
};

const INITIAL_DELAY: Duration = Duration::from_millis(1_000);
const MAX_DELAY: Duration = Duration::from_secs(10);
const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(5);
const MAX_RECONNECT_ATTEMPTS: u32 = 3;

/// Connect the chat store, install it into `handle` and keep health-checking
/// it, flipping degraded mode while it is unreachable.
pub async fn run<F, Fut>(handle: StoreHandle, mut connect: F)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Arc<dyn ChatStore>, StorageError>> + Send,
{
    let mut delay = INITIAL_DELAY;

    loop {
        match connect().await {
            Ok(store) => {
                handle.install(store.clone()).await;
                info!("chat store connected; leaving degraded mode");
                delay = INITIAL_DELAY;

                monitor(&handle, store.as_ref()).await;
                warn!("exhausted chat store reconnect attempts; reconnecting from scratch");
            }
            Err(err) => {
                handle.update_degraded(true);
                warn!(error = %err, "chat store connection attempt failed");
            }
        }
        sleep(delay).await;
        delay = (delay * 2).min(MAX_DELAY);
    }
}

/// Health-check loop. Returns once reconnecting in place has failed
/// [`MAX_RECONNECT_ATTEMPTS`] times in a row.
async fn monitor(handle: &StoreHandle, store: &dyn ChatStore) {
    loop {
        match store.health_check().await {
            Ok(()) => {
                if handle.is_degraded() {
                    info!("chat store healthy again; leaving degraded mode");
                    handle.update_degraded(false);
                }
                sleep(HEALTH_POLL_INTERVAL).await;
            }
            Err(err) => {
                warn!(error = %err, "chat store health check failed; entering degraded mode");
                handle.update_degraded(true);
                if !reconnect(store).await {
                    return;
                }
                info!("chat store reconnection succeeded after health check failure");
                handle.update_degraded(false);
                sleep(HEALTH_POLL_INTERVAL).await;
            }
        }
    }
}

async fn reconnect(store: &dyn ChatStore) -> bool {
    let mut delay = INITIAL_DELAY;
    for attempt in 0..MAX_RECONNECT_ATTEMPTS {
        match store.try_reconnect().await {
            Ok(()) => return true,
            Err(err) => {
                warn!(attempt, error = %err, "chat store reconnect attempt failed");
                sleep(delay).await;
                delay = (delay * 2).min(MAX_DELAY);
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::dao::chat_store::memory::MemoryChatStore;

    #[tokio::test(start_paused = true)]
    async fn installs_store_after_failed_attempts() {
        let handle = StoreHandle::new();
        let attempts = Arc::new(AtomicUsize::new(0));

        let counter = attempts.clone();
        let supervisor = tokio::spawn(run(handle.clone(), move || {
            let attempt = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 2 {
                    Err(StorageError::unavailable(
                        "connection refused".into(),
                        std::io::Error::other("refused"),
                    ))
                } else {
                    Ok(Arc::new(MemoryChatStore::new()) as Arc<dyn ChatStore>)
                }
            }
        }));

        let mut degraded = handle.degraded_watcher();
        assert!(*degraded.borrow_and_update());
        degraded.changed().await.unwrap();

        assert!(!handle.is_degraded());
        assert!(handle.require().await.is_ok());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        supervisor.abort();
    }
}
