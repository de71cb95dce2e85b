use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Report `ok` or `degraded`, probing the installed store on the way.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    match state.store().await {
        Some(store) => {
            if let Err(err) = store.health_check().await {
                warn!(error = %err, "live store health check failed");
            }
        }
        None => warn!("no live store installed (degraded mode)"),
    }

    if state.is_degraded().await {
        HealthResponse::degraded()
    } else {
        HealthResponse::ok()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::live_store::memory::MemoryLiveStore,
        services::access::ConfigAccessControl,
        state::AppState,
    };

    #[tokio::test]
    async fn degraded_until_a_store_is_installed() {
        let state = AppState::new(
            AppConfig::default(),
            Arc::new(ConfigAccessControl::new(Vec::new())),
        );
        assert_eq!(health_status(&state).await.status, "degraded");

        state.install_store(Arc::new(MemoryLiveStore::new())).await;
        assert_eq!(health_status(&state).await.status, "ok");
    }
}
