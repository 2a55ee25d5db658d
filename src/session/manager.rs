use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, Weak};

use chrono::{Duration, Utc};
use tokio::sync::{watch, Mutex, RwLock};

use crate::client::auth::AuthEndpoints;
use crate::config;
use crate::error::PortalError;

use super::scheduler::{ScheduledRefresh, Scheduler, TokioScheduler};
use super::store::SessionStore;
use super::{PortalRole, PortalSession, PortalUser};

/// Broadcast to dependents whenever the session changes, instead of letting
/// them share mutable state with the manager.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Anonymous,
    Authenticated(PortalUser),
}

/// Owns the single portal session: the in-memory value, the persisted slot,
/// the proactive refresh timer, and the change notifications.
///
/// All operations are serialized around the read-modify-persist sequence, so
/// concurrent refresh triggers (timer, reactive 401, explicit call) cannot
/// corrupt the slot. Exactly one refresh attempt is made per triggering
/// event; a failed refresh always forces logout.
pub struct SessionManager {
    auth: AuthEndpoints,
    store: SessionStore,
    scheduler: Box<dyn Scheduler>,
    refresh_margin: Duration,

    active: RwLock<Option<PortalSession>>,
    /// Serializes login/refresh/logout around the slot.
    op_lock: Mutex<()>,
    timer: StdMutex<Option<ScheduledRefresh>>,
    /// Bumped on every session change; a timer that fires with a stale
    /// generation is a no-op.
    timer_generation: AtomicU64,
    state_tx: watch::Sender<SessionState>,
    weak: Weak<SessionManager>,
}

impl SessionManager {
    pub fn new() -> Result<Arc<Self>, PortalError> {
        let margin = Duration::seconds(config::config().session.refresh_margin_secs);
        Ok(Self::with_parts(
            AuthEndpoints::from_config(),
            SessionStore::from_config()?,
            Box::new(TokioScheduler),
            margin,
        ))
    }

    /// Assemble a manager from explicit parts. This is the seam tests use to
    /// point at a scratch store and a controllable scheduler.
    pub fn with_parts(
        auth: AuthEndpoints,
        store: SessionStore,
        scheduler: Box<dyn Scheduler>,
        refresh_margin: Duration,
    ) -> Arc<Self> {
        let (state_tx, _) = watch::channel(SessionState::Anonymous);
        Arc::new_cyclic(|weak| Self {
            auth,
            store,
            scheduler,
            refresh_margin,
            active: RwLock::new(None),
            op_lock: Mutex::new(()),
            timer: StdMutex::new(None),
            timer_generation: AtomicU64::new(0),
            state_tx,
            weak: weak.clone(),
        })
    }

    /// Exchange credentials for a fresh session. On success the new session
    /// unconditionally replaces whatever was there before; on failure
    /// nothing is stored.
    pub async fn login(
        &self,
        portal_id: &str,
        password: &str,
        role: PortalRole,
    ) -> Result<PortalSession, PortalError> {
        let session = self.auth.login(portal_id, password, role).await?;

        let _guard = self.op_lock.lock().await;
        self.store.save(&session)?;
        self.set_active(Some(session.clone())).await;
        self.arm_refresh_timer(&session);
        tracing::info!(
            "logged in as {} ({}) for contract {}",
            session.user.name,
            session.user.role,
            session.user.contract_id
        );
        Ok(session)
    }

    /// Log out. The server call is best-effort: its failure is logged and
    /// swallowed, local state is cleared regardless. Safe to call twice.
    pub async fn logout(&self) {
        let _guard = self.op_lock.lock().await;

        let token = match self.active.read().await.as_ref() {
            Some(session) => Some(session.access_token.clone()),
            None => self.store.load().map(|session| session.access_token),
        };

        if let Some(token) = token {
            if let Err(e) = self.auth.logout(&token).await {
                tracing::warn!("server logout failed, clearing local session anyway: {}", e);
            }
        }

        self.clear_locked().await;
    }

    /// One refresh attempt: swap the token pair in place, re-persist, re-arm
    /// the proactive timer. Any failure clears the session (fail closed);
    /// the user snapshot is never touched.
    pub async fn refresh_session(&self) -> Result<(), PortalError> {
        let _guard = self.op_lock.lock().await;

        let current = match self.active.read().await.clone() {
            Some(session) => Some(session),
            None => self.store.load(),
        };
        let Some(mut session) = current else {
            return Err(PortalError::NotAuthenticated);
        };

        match self.auth.refresh(&session.refresh_token).await {
            Ok(tokens) => {
                session.access_token = tokens.access_token;
                session.refresh_token = tokens.refresh_token;
                session.expires_at = tokens.expires_at;

                self.store.save(&session)?;
                self.set_active(Some(session.clone())).await;
                self.arm_refresh_timer(&session);
                tracing::debug!("session refreshed, now valid until {}", session.expires_at);
                Ok(())
            }
            Err(e) => {
                tracing::warn!("refresh failed, forcing logout: {}", e);
                self.clear_locked().await;
                match e {
                    PortalError::Network(msg) => Err(PortalError::Network(msg)),
                    _ => Err(PortalError::SessionExpired),
                }
            }
        }
    }

    /// Startup reconciliation. Runs once per process, before any proactive
    /// timer is armed:
    ///
    /// - no persisted session: stay anonymous;
    /// - persisted and unexpired: verify against the info endpoint, adopt if
    ///   live, otherwise attempt one refresh;
    /// - persisted but expired: attempt one refresh.
    ///
    /// A failed refresh leaves the slot cleared; the outcome is always a
    /// definite state, never an error.
    pub async fn restore(&self) -> SessionState {
        let Some(session) = self.store.load() else {
            return SessionState::Anonymous;
        };

        if !session.is_expired(Utc::now()) {
            match self.auth.info(&session.access_token).await {
                Ok(_) => {
                    let _guard = self.op_lock.lock().await;
                    self.set_active(Some(session.clone())).await;
                    self.arm_refresh_timer(&session);
                    return SessionState::Authenticated(session.user);
                }
                Err(PortalError::Network(e)) => {
                    // Unexpired token and an unreachable server: adopt it and
                    // let the reactive 401 path settle things once the server
                    // is back.
                    tracing::warn!("liveness check unreachable, adopting persisted session: {}", e);
                    let _guard = self.op_lock.lock().await;
                    self.set_active(Some(session.clone())).await;
                    self.arm_refresh_timer(&session);
                    return SessionState::Authenticated(session.user);
                }
                Err(_) => {
                    tracing::debug!("server rejected persisted token, attempting refresh");
                }
            }
        }

        match self.refresh_session().await {
            Ok(()) => self.state(),
            Err(e) => {
                tracing::info!("startup refresh failed, starting anonymous: {}", e);
                SessionState::Anonymous
            }
        }
    }

    pub async fn session(&self) -> Option<PortalSession> {
        self.active.read().await.clone()
    }

    pub async fn access_token(&self) -> Option<String> {
        self.active.read().await.as_ref().map(|s| s.access_token.clone())
    }

    pub async fn is_authenticated(&self) -> bool {
        self.active.read().await.is_some()
    }

    /// The persisted slot as last written, without touching the network.
    /// This is the accessor other components use instead of reading storage
    /// directly.
    pub fn persisted_session(&self) -> Option<PortalSession> {
        self.store.load()
    }

    pub fn state(&self) -> SessionState {
        self.state_tx.borrow().clone()
    }

    /// Watch session changes. Receivers see `Anonymous`/`Authenticated`
    /// transitions for login, refresh-forced logout, and explicit logout.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    async fn set_active(&self, session: Option<PortalSession>) {
        let state = match &session {
            Some(s) => SessionState::Authenticated(s.user.clone()),
            None => SessionState::Anonymous,
        };
        *self.active.write().await = session;
        self.state_tx.send_replace(state);
    }

    /// Clear everything while already holding `op_lock`.
    async fn clear_locked(&self) {
        self.cancel_timer();
        self.set_active(None).await;
        if let Err(e) = self.store.clear() {
            tracing::warn!("failed to clear session slot: {}", e);
        }
    }

    /// Arm the proactive one-shot refresh at `expires_at - margin`. A margin
    /// already in the past arms nothing; the reactive path covers it.
    /// Replacing the slot cancels any previous timer.
    fn arm_refresh_timer(&self, session: &PortalSession) {
        let generation = self.timer_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let remaining = session.refresh_due(self.refresh_margin) - Utc::now();

        let mut slot = self.timer.lock().unwrap();
        if remaining <= Duration::zero() {
            *slot = None;
            return;
        }
        let delay = match remaining.to_std() {
            Ok(delay) => delay,
            Err(_) => {
                *slot = None;
                return;
            }
        };

        let weak = self.weak.clone();
        let task = Box::pin(async move {
            let Some(manager) = weak.upgrade() else { return };
            if manager.timer_generation.load(Ordering::SeqCst) != generation {
                return;
            }
            if let Err(e) = manager.refresh_session().await {
                tracing::warn!("scheduled refresh failed: {}", e);
            }
        });

        tracing::debug!("proactive refresh armed in {}s", delay.as_secs());
        *slot = Some(self.scheduler.schedule_once(delay, task));
    }

    fn cancel_timer(&self) {
        self.timer_generation.fetch_add(1, Ordering::SeqCst);
        *self.timer.lock().unwrap() = None;
    }
}
