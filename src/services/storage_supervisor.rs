//! Background task keeping a live store installed and the degraded flag current.

use std::{future::Future, sync::Arc, time::Duration};

use tokio::time::sleep;
use tracing::{info, warn};

use crate::{
    dao::{live_store::LiveStore, storage::StorageError},
    state::SharedState,
};

const INITIAL_DELAY: Duration = Duration::from_millis(1_000);
const MAX_DELAY: Duration = Duration::from_secs(10);
const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(5);
const MAX_RECONNECT_ATTEMPTS: u32 = 3;

/// Connect through `connect`, poll the installed store and fall back to degraded mode.
///
/// While degraded every read and write route answers with a storage-unavailable error;
/// the task keeps retrying with exponential backoff until the backend answers again.
pub async fn run<F, Fut>(state: SharedState, mut connect: F)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Arc<dyn LiveStore>, StorageError>> + Send,
{
    let mut delay = INITIAL_DELAY;

    loop {
        match connect().await {
            Ok(store) => {
                state.install_store(store.clone()).await;
                info!("live store connected; leaving degraded mode");
                delay = INITIAL_DELAY;

                watch(&state, store.as_ref()).await;

                warn!("exhausted storage reconnect attempts; dropping the live store");
                state.clear_store().await;
            }
            Err(err) => warn!(error = %err, "storage connection attempt failed"),
        }

        sleep(delay).await;
        delay = next_delay(delay);
    }
}

/// Poll `store` until it stays unreachable through every reconnect attempt.
async fn watch(state: &SharedState, store: &dyn LiveStore) {
    loop {
        if store.health_check().await.is_ok() {
            if state.is_degraded().await {
                info!("storage healthy again; leaving degraded mode");
                state.update_degraded(false).await;
            }
            sleep(HEALTH_POLL_INTERVAL).await;
            continue;
        }

        if !reconnect(state, store).await {
            return;
        }
        state.update_degraded(false).await;
        sleep(HEALTH_POLL_INTERVAL).await;
    }
}

/// Retry the backend connection a bounded number of times; degraded from the first failure.
async fn reconnect(state: &SharedState, store: &dyn LiveStore) -> bool {
    let mut delay = INITIAL_DELAY;

    for attempt in 0..MAX_RECONNECT_ATTEMPTS {
        match store.try_reconnect().await {
            Ok(()) => {
                info!(attempt, "storage reconnected after failed health check");
                return true;
            }
            Err(err) => {
                if attempt == 0 {
                    warn!(attempt, error = %err, "storage reconnect failed; entering degraded mode");
                    state.update_degraded(true).await;
                } else {
                    warn!(attempt, error = %err, "storage reconnect attempt failed");
                }
                sleep(delay).await;
                delay = next_delay(delay);
            }
        }
    }

    false
}

fn next_delay(delay: Duration) -> Duration {
    (delay * 2).min(MAX_DELAY)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::{
        config::AppConfig,
        dao::live_store::memory::MemoryLiveStore,
        services::access::ConfigAccessControl,
        state::AppState,
    };

    #[test]
    fn backoff_doubles_up_to_the_cap() {
        assert_eq!(next_delay(INITIAL_DELAY), Duration::from_secs(2));
        assert_eq!(next_delay(Duration::from_secs(8)), MAX_DELAY);
        assert_eq!(next_delay(MAX_DELAY), MAX_DELAY);
    }

    #[tokio::test]
    async fn leaves_degraded_mode_once_a_connection_succeeds() {
        let state = AppState::new(
            AppConfig::default(),
            Arc::new(ConfigAccessControl::new(Vec::new())),
        );
        let mut degraded = state.degraded_watcher();
        assert!(*degraded.borrow());

        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();
        let task = tokio::spawn(run(state.clone(), move || {
            let attempt = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt == 0 {
                    Err(StorageError::malformed("backend not ready"))
                } else {
                    Ok(Arc::new(MemoryLiveStore::new()) as Arc<dyn LiveStore>)
                }
            }
        }));

        degraded.wait_for(|value| !*value).await.unwrap();
        assert!(state.store().await.is_some());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        task.abort();
    }
}
