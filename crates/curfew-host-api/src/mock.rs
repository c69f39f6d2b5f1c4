//! Mock host collaborators for testing

use async_trait::async_trait;
use curfew_util::{AccountId, Secret};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::{
    HostError, HostResult, LiveSession, LiveSessionId, SessionBackend, SessionState,
    ShutdownPrimitive,
};

/// In-memory session backend for unit/integration testing
pub struct MockBackend {
    next_id: AtomicU64,
    sessions: Arc<Mutex<Vec<LiveSession>>>,
    secrets: Arc<Mutex<HashMap<AccountId, Secret>>>,
    secret_writes: Arc<Mutex<Vec<AccountId>>>,
    closed: Arc<Mutex<Vec<LiveSessionId>>>,

    /// Configure enumeration to fail
    pub fail_enumerate: Arc<Mutex<bool>>,

    /// Configure session close to fail
    pub fail_close: Arc<Mutex<bool>>,

    /// Accounts whose secret updates fail
    pub fail_secret_for: Arc<Mutex<HashSet<AccountId>>>,

    /// Configure every call to never complete
    pub hang: Arc<Mutex<bool>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            sessions: Arc::new(Mutex::new(Vec::new())),
            secrets: Arc::new(Mutex::new(HashMap::new())),
            secret_writes: Arc::new(Mutex::new(Vec::new())),
            closed: Arc::new(Mutex::new(Vec::new())),
            fail_enumerate: Arc::new(Mutex::new(false)),
            fail_close: Arc::new(Mutex::new(false)),
            fail_secret_for: Arc::new(Mutex::new(HashSet::new())),
            hang: Arc::new(Mutex::new(false)),
        }
    }

    /// Simulate a login by `owner`
    pub fn login(&self, owner: &AccountId) -> LiveSessionId {
        let id = LiveSessionId::new(self.next_id.fetch_add(1, Ordering::SeqCst).to_string());
        self.sessions.lock().unwrap().push(LiveSession {
            id: id.clone(),
            owner: owner.clone(),
            state: SessionState::Active,
        });
        id
    }

    /// Make secret updates for `account` fail (or succeed again)
    pub fn set_secret_failure(&self, account: &AccountId, fail: bool) {
        let mut set = self.fail_secret_for.lock().unwrap();
        if fail {
            set.insert(account.clone());
        } else {
            set.remove(account);
        }
    }

    /// Sessions still open
    pub fn live_sessions(&self) -> Vec<LiveSession> {
        self.sessions.lock().unwrap().clone()
    }

    /// Sessions that were closed, in order
    pub fn closed_sessions(&self) -> Vec<LiveSessionId> {
        self.closed.lock().unwrap().clone()
    }

    /// The last secret applied to `account`
    pub fn secret_of(&self, account: &AccountId) -> Option<Secret> {
        self.secrets.lock().unwrap().get(account).cloned()
    }

    /// How many successful secret updates `account` received
    pub fn secret_writes(&self, account: &AccountId) -> usize {
        self.secret_writes
            .lock()
            .unwrap()
            .iter()
            .filter(|a| *a == account)
            .count()
    }

    async fn maybe_hang(&self) {
        let hang = *self.hang.lock().unwrap();
        if hang {
            std::future::pending::<()>().await;
        }
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionBackend for MockBackend {
    async fn enumerate_live_sessions(&self) -> HostResult<Vec<LiveSession>> {
        self.maybe_hang().await;
        if *self.fail_enumerate.lock().unwrap() {
            return Err(HostError::EnumerateFailed("Mock enumeration failure".into()));
        }
        Ok(self.live_sessions())
    }

    async fn close_session(&self, id: &LiveSessionId) -> HostResult<()> {
        self.maybe_hang().await;
        if *self.fail_close.lock().unwrap() {
            return Err(HostError::CloseFailed {
                session: id.clone(),
                message: "Mock close failure".into(),
            });
        }

        let mut sessions = self.sessions.lock().unwrap();
        let before = sessions.len();
        sessions.retain(|s| &s.id != id);
        if sessions.len() == before {
            return Err(HostError::CloseFailed {
                session: id.clone(),
                message: "no such session".into(),
            });
        }
        self.closed.lock().unwrap().push(id.clone());
        Ok(())
    }

    async fn set_account_secret(&self, account: &AccountId, secret: &Secret) -> HostResult<()> {
        self.maybe_hang().await;
        if self.fail_secret_for.lock().unwrap().contains(account) {
            return Err(HostError::SecretFailed {
                account: account.clone(),
                message: "Mock secret failure".into(),
            });
        }
        self.secrets
            .lock()
            .unwrap()
            .insert(account.clone(), secret.clone());
        self.secret_writes.lock().unwrap().push(account.clone());
        Ok(())
    }
}

/// A recorded call to the mock shutdown primitive
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownCall {
    Initiate { delay: Duration, message: String },
    Abort,
}

/// Recording shutdown primitive for testing
pub struct MockShutdown {
    calls: Arc<Mutex<Vec<ShutdownCall>>>,

    /// Configure every call to fail
    pub fail: Arc<Mutex<bool>>,
}

impl MockShutdown {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            fail: Arc::new(Mutex::new(false)),
        }
    }

    pub fn calls(&self) -> Vec<ShutdownCall> {
        self.calls.lock().unwrap().clone()
    }
}

impl Default for MockShutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ShutdownPrimitive for MockShutdown {
    async fn initiate(&self, delay: Duration, message: &str) -> HostResult<()> {
        if *self.fail.lock().unwrap() {
            return Err(HostError::ShutdownFailed("Mock shutdown failure".into()));
        }
        self.calls.lock().unwrap().push(ShutdownCall::Initiate {
            delay,
            message: message.to_string(),
        });
        Ok(())
    }

    async fn abort(&self) -> HostResult<()> {
        if *self.fail.lock().unwrap() {
            return Err(HostError::ShutdownFailed("Mock abort failure".into()));
        }
        self.calls.lock().unwrap().push(ShutdownCall::Abort);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_login_and_close() {
        let backend = MockBackend::new();
        let kid = AccountId::new("kid1");
        let id = backend.login(&kid);

        let sessions = backend.enumerate_live_sessions().await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].owner, kid);

        backend.close_session(&id).await.unwrap();
        assert!(backend.live_sessions().is_empty());
        assert_eq!(backend.closed_sessions(), vec![id.clone()]);

        // Closing twice reports the missing session
        assert!(backend.close_session(&id).await.is_err());
    }

    #[tokio::test]
    async fn mock_secret_failure_switch() {
        let backend = MockBackend::new();
        let kid = AccountId::new("kid1");

        backend.set_secret_failure(&kid, true);
        assert!(
            backend
                .set_account_secret(&kid, &Secret::new("x"))
                .await
                .is_err()
        );
        assert_eq!(backend.secret_writes(&kid), 0);

        backend.set_secret_failure(&kid, false);
        backend
            .set_account_secret(&kid, &Secret::new("y"))
            .await
            .unwrap();
        assert_eq!(backend.secret_of(&kid), Some(Secret::new("y")));
    }

    #[tokio::test]
    async fn mock_shutdown_records_calls() {
        let shutdown = MockShutdown::new();
        shutdown
            .initiate(Duration::from_secs(300), "bye")
            .await
            .unwrap();
        shutdown.abort().await.unwrap();

        assert_eq!(
            shutdown.calls(),
            vec![
                ShutdownCall::Initiate {
                    delay: Duration::from_secs(300),
                    message: "bye".into()
                },
                ShutdownCall::Abort
            ]
        );
    }
}
