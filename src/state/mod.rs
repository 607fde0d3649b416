pub mod handle;
pub mod interruption;
pub mod normalize;
pub mod rotation;
pub mod scoring;
pub mod session;
pub mod state_machine;

use std::{future::Future, sync::Arc, time::Duration};

use rand::{SeedableRng, rngs::StdRng};
use tokio::sync::{Mutex, RwLock, watch};
use tokio::time::timeout;
use tracing::{info, warn};

use crate::{
    config::AppConfig,
    dao::{session_store::SessionStore, storage::StorageResult},
    error::ServiceError,
    state::{
        handle::{Actor, SessionHandle},
        state_machine::{GameEvent, Phase, PlanContext},
    },
};

/// Application state shared by every handler.
pub type SharedState = Arc<AppState>;

/// Central application state: storage handle, configuration and the shared random source.
pub struct AppState {
    session_store: RwLock<Option<Arc<dyn SessionStore>>>,
    degraded: watch::Sender<bool>,
    config: Arc<AppConfig>,
    rng: Mutex<StdRng>,
    store_timeout: Option<Duration>,
}

impl AppState {
    /// Construct a new [`AppState`] with built-in defaults.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new() -> SharedState {
        Self::with_config(AppConfig::default())
    }

    /// Construct a new [`AppState`] from a loaded configuration.
    pub fn with_config(config: AppConfig) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        let rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Arc::new(Self {
            session_store: RwLock::new(None),
            degraded: degraded_tx,
            store_timeout: Some(config.store_timeout),
            config: Arc::new(config),
            rng: Mutex::new(rng),
        })
    }

    /// Shared configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Obtain a handle to the current session store, if one is installed.
    pub async fn session_store(&self) -> Option<Arc<dyn SessionStore>> {
        let guard = self.session_store.read().await;
        guard.as_ref().cloned()
    }

    /// Session store, or [`ServiceError::Degraded`] while none is usable.
    pub async fn require_session_store(&self) -> Result<Arc<dyn SessionStore>, ServiceError> {
        if self.is_degraded().await {
            return Err(ServiceError::Degraded);
        }
        self.session_store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a new session store implementation and leave degraded mode.
    pub async fn set_session_store(&self, store: Arc<dyn SessionStore>) {
        {
            let mut guard = self.session_store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false).await;
    }

    /// Remove the current session store and enter degraded mode.
    pub async fn clear_session_store(&self) {
        {
            let mut guard = self.session_store.write().await;
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
        self.degraded.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        });
    }

    /// Bound a store call by the configured timeout.
    async fn bounded<T>(
        &self,
        call: impl Future<Output = StorageResult<T>>,
    ) -> Result<T, ServiceError> {
        match self.store_timeout {
            Some(limit) => timeout(limit, call)
                .await
                .map_err(|_| ServiceError::Timeout)?
                .map_err(Into::into),
            None => call.await.map_err(Into::into),
        }
    }

    /// Read a fresh snapshot of `session_id`.
    pub async fn fetch_session(&self, session_id: &str) -> Result<SessionHandle, ServiceError> {
        let store = self.require_session_store().await?;
        let document = self
            .bounded(store.fetch(session_id))
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("session {session_id}")))?;
        Ok(SessionHandle::from_document(session_id, document)?)
    }

    /// Apply one player action: fetch a fresh snapshot, plan the transition and
    /// commit it as a single conditional write.
    ///
    /// Nothing is written when planning fails or when the session changed
    /// between the read and the write.
    pub async fn run_transition(
        &self,
        session_id: &str,
        actor: &Actor,
        event: GameEvent,
    ) -> Result<Phase, ServiceError> {
        let store = self.require_session_store().await?;
        let handle = self.fetch_session(session_id).await?;

        let planned = {
            let mut rng = self.rng.lock().await;
            let mut ctx = PlanContext {
                rules: &self.config.rules,
                scoring: &self.config.scoring,
                decoys: &self.config.decoys,
                rng: &mut *rng,
            };
            state_machine::plan(&handle, actor, event, &mut ctx)
        };

        let plan = match planned {
            Ok(plan) => plan,
            Err(err) => {
                warn!(
                    session_id,
                    actor = %actor.username,
                    error = %err,
                    "transition rejected"
                );
                return Err(err.into());
            }
        };

        let committed = self
            .bounded(store.commit(session_id, plan.preconditions, plan.batch))
            .await;
        if let Err(err) = committed {
            warn!(
                session_id,
                actor = %actor.username,
                plan_id = %plan.id,
                event = ?plan.event,
                error = %err,
                "transition commit failed"
            );
            return Err(err);
        }

        info!(
            session_id,
            actor = %actor.username,
            plan_id = %plan.id,
            event = ?plan.event,
            from = ?plan.from,
            to = ?plan.to,
            "transition committed"
        );
        Ok(plan.to)
    }
}
