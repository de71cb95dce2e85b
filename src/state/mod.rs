/// Cached, ordered question catalogs.
pub mod catalog;
/// Buzzer epochs delimited by reset markers.
pub mod epoch;
mod sse;
/// Session lifecycle transitions.
pub mod state_machine;

use std::sync::Arc;

use tokio::sync::{RwLock, watch};
use tracing::debug;
use uuid::Uuid;

use crate::{
    config::AppConfig,
    dao::{live_store::LiveStore, models::SessionEntity},
    error::ServiceError,
    services::{access::AccessControl, sse_events},
};

pub use self::sse::{EventBus, SseHub};
use self::catalog::{CatalogCache, MatchCatalog};

/// Handle cloned into every handler.
pub type SharedState = Arc<AppState>;

/// Attempts of a session compare-and-swap before giving up with [`ServiceError::Contention`].
pub const MAX_SESSION_ATTEMPTS: usize = 5;
const EVENT_CAPACITY: usize = 64;

/// Central application state: storage handle, per-match event hubs and caches.
pub struct AppState {
    store: RwLock<Option<Arc<dyn LiveStore>>>,
    degraded: watch::Sender<bool>,
    events: EventBus,
    catalogs: CatalogCache,
    config: Arc<AppConfig>,
    access: Arc<dyn AccessControl>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(config: AppConfig, access: Arc<dyn AccessControl>) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            store: RwLock::new(None),
            degraded: degraded_tx,
            events: EventBus::new(EVENT_CAPACITY),
            catalogs: CatalogCache::new(config.catalog_cache_ttl),
            config: Arc::new(config),
            access,
        })
    }

    /// Obtain a handle to the current store, if one is installed.
    pub async fn store(&self) -> Option<Arc<dyn LiveStore>> {
        let guard = self.store.read().await;
        guard.as_ref().cloned()
    }

    /// Current store, or [`ServiceError::Degraded`] when none is installed.
    pub async fn require_store(&self) -> Result<Arc<dyn LiveStore>, ServiceError> {
        self.store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a new store implementation and leave degraded mode.
    pub async fn install_store(&self, store: Arc<dyn LiveStore>) {
        {
            let mut guard = self.store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false).await;
    }

    /// Remove the current store and enter degraded mode.
    pub async fn clear_store(&self) {
        {
            let mut guard = self.store.write().await;
            guard.take();
        }
        self.update_degraded(true).await;
    }

    /// Current degraded flag.
    pub async fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub async fn update_degraded(&self, value: bool) {
        let changed = self.degraded.send_if_modified(|current| {
            if *current == value {
                return false;
            }
            *current = value;
            true
        });

        if changed {
            sse_events::broadcast_system_status(self, value);
        }
    }

    /// Change bus of every match.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Immutable runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Moderator token check.
    pub fn access(&self) -> &dyn AccessControl {
        self.access.as_ref()
    }

    /// Catalog of a match, served from cache while fresh.
    pub async fn catalog(&self, match_id: Uuid) -> Result<Arc<MatchCatalog>, ServiceError> {
        if let Some(catalog) = self.catalogs.get(match_id) {
            return Ok(catalog);
        }

        let store = self.require_store().await?;
        let questions = store.list_questions(match_id).await?;
        let catalog = MatchCatalog::build(match_id, questions)
            .map_err(|err| ServiceError::InvalidState(format!("question catalog: {err}")))?;
        let catalog = Arc::new(catalog);
        self.catalogs.put(catalog.clone());
        Ok(catalog)
    }

    /// Drop the cached catalog of a match after a question write.
    pub fn invalidate_catalog(&self, match_id: Uuid) {
        self.catalogs.invalidate(match_id);
    }

    /// Current session of a match.
    pub async fn session(&self, match_id: Uuid) -> Result<SessionEntity, ServiceError> {
        let store = self.require_store().await?;
        store
            .find_session(match_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("no session for match {match_id}")))
    }

    /// Run a named transition against the session with optimistic concurrency.
    ///
    /// `mutate` receives a fresh copy on every attempt and may reject the transition;
    /// the write only lands if nobody committed in between. The committed session is
    /// published on the match bus.
    pub async fn mutate_session<T, F>(
        &self,
        match_id: Uuid,
        mut mutate: F,
    ) -> Result<(SessionEntity, T), ServiceError>
    where
        F: FnMut(&mut SessionEntity) -> Result<T, ServiceError>,
    {
        let store = self.require_store().await?;

        for attempt in 1..=MAX_SESSION_ATTEMPTS {
            let current = store
                .find_session(match_id)
                .await?
                .ok_or_else(|| ServiceError::NotFound(format!("no session for match {match_id}")))?;

            let mut next = current.clone();
            let value = mutate(&mut next)?;
            next.version = current.version + 1;
            next.updated_at = now_ms();

            if store
                .compare_and_swap_session(next.clone(), current.version)
                .await?
            {
                sse_events::broadcast_session(self, &next);
                return Ok((next, value));
            }

            debug!(%match_id, attempt, "session changed concurrently; retrying transition");
        }

        Err(ServiceError::Contention)
    }
}

/// Current wall-clock time in unix milliseconds.
pub fn now_ms() -> i64 {
    (time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}
