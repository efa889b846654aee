//! Login/logout fan-out.
//!
//! [`AuthBus::publish`] sends an [`AuthEvent`] to every [`AuthListener`] over a
//! `tokio::sync::broadcast` channel and records it as the latest event in a
//! `tokio::sync::watch` snapshot.  A listener that falls behind the broadcast
//! buffer re-applies the snapshot instead of the missed events, so delivery is
//! at-least-once and handlers must be idempotent ([`AuthSession::apply`] is).

use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::{broadcast, watch};

/// Default broadcast buffer per listener.
pub const DEFAULT_CAPACITY: usize = 16;

// ---------------------------------------------------------------------------
// AuthEvent
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    LoggedIn { token: String },
    LoggedOut,
}

// ---------------------------------------------------------------------------
// AuthSession
// ---------------------------------------------------------------------------

/// Shared holder for the current bearer token.
///
/// Cheap to clone; every clone sees the same token.
#[derive(Debug, Clone, Default)]
pub struct AuthSession {
    token: Arc<RwLock<Option<String>>>,
}

impl AuthSession {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: Arc::new(RwLock::new(token.filter(|t| !t.is_empty()))),
        }
    }

    /// Current token, if logged in.
    pub fn token(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_logged_in(&self) -> bool {
        self.token().is_some()
    }

    /// Apply an event.  Returns `true` if the token changed.
    ///
    /// Re-applying the current state is a no-op.
    pub fn apply(&self, event: &AuthEvent) -> bool {
        let mut guard = self.token.write().unwrap_or_else(PoisonError::into_inner);
        let next = match event {
            AuthEvent::LoggedIn { token } if !token.is_empty() => Some(token.clone()),
            AuthEvent::LoggedIn { .. } | AuthEvent::LoggedOut => None,
        };
        if *guard == next {
            return false;
        }
        *guard = next;
        true
    }
}

// ---------------------------------------------------------------------------
// AuthBus
// ---------------------------------------------------------------------------

/// Publisher side.  Dropping the bus ends every listener's loop.
pub struct AuthBus {
    tx: broadcast::Sender<AuthEvent>,
    latest: watch::Sender<Option<AuthEvent>>,
}

impl AuthBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        let (latest, _) = watch::channel(None);
        Self { tx, latest }
    }

    /// Fan `event` out to all listeners and remember it as the latest.
    pub fn publish(&self, event: AuthEvent) {
        log::debug!("auth event published: {}", describe(&event));
        self.latest.send_replace(Some(event.clone()));
        // No listeners is fine; the snapshot still records the event.
        let _ = self.tx.send(event);
    }

    /// Most recently published event.
    pub fn latest(&self) -> Option<AuthEvent> {
        self.latest.borrow().clone()
    }

    pub fn subscribe(&self) -> AuthListener {
        AuthListener {
            rx: self.tx.subscribe(),
            latest: self.latest.subscribe(),
        }
    }
}

impl Default for AuthBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// AuthListener
// ---------------------------------------------------------------------------

pub struct AuthListener {
    rx: broadcast::Receiver<AuthEvent>,
    latest: watch::Receiver<Option<AuthEvent>>,
}

impl AuthListener {
    /// Next event, or `None` once the bus is gone.
    ///
    /// After a lag the latest snapshot is returned in place of the dropped
    /// events.
    pub async fn recv(&mut self) -> Option<AuthEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    log::warn!("auth listener lagged by {missed} events; resyncing");
                    let snapshot = self.latest.borrow_and_update().clone();
                    if snapshot.is_some() {
                        return snapshot;
                    }
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Keep `session` in sync with the bus until it closes.
    pub async fn run(mut self, session: AuthSession) {
        while let Some(event) = self.recv().await {
            if session.apply(&event) {
                log::info!("auth state changed: {}", describe(&event));
            }
        }
        log::debug!("auth bus closed, listener exiting");
    }
}

fn describe(event: &AuthEvent) -> &'static str {
    match event {
        AuthEvent::LoggedIn { .. } => "logged in",
        AuthEvent::LoggedOut => "logged out",
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
