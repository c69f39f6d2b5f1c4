//! Session registry
//!
//! The registry is the single owner of the grant table. Every mutating
//! operation holds the write lock for its whole critical section, backend
//! calls included, so grant, lock, lock-all and extend are serialized.
//!
//! Expiry reaches `lock` from two independent paths: the per-grant timer and
//! the periodic sweep. Both may fire for the same grant; `lock` is idempotent
//! and only the path that actually removes the grant emits `GrantExpired`.

use chrono::{DateTime, Local};
use curfew_config::ManagedAccount;
use curfew_host_api::{HostError, HostResult, SessionBackend};
use curfew_util::{AccountId, Secret, format_clock_time};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{RwLock, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::{CoreEvent, ExpiryTrigger};

/// Default bound on a single host backend call
pub const DEFAULT_HOST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Unknown account: {0}")]
    UnknownAccount(AccountId),

    #[error("No active grant for {0}")]
    NoGrant(AccountId),

    #[error(
        "Access for {account} is open until {}, but the temporary secret was not applied: {source}",
        format_clock_time(.deadline)
    )]
    SecretNotApplied {
        account: AccountId,
        deadline: DateTime<Local>,
        source: HostError,
    },

    #[error("Revocation for {account} was incomplete: {}", .failures.join("; "))]
    Enforcement {
        account: AccountId,
        had_grant: bool,
        failures: Vec<String>,
    },
}

/// A time-bounded access permission for one account
#[derive(Debug, Clone)]
pub struct Grant {
    pub account: AccountId,
    pub started_at: Instant,
    pub started_wall: DateTime<Local>,
    pub duration: Duration,
    /// Cleared on the value being removed by a lock; never false in the table
    pub active: bool,
    generation: u64,
}

impl Grant {
    fn new(account: AccountId, duration: Duration, generation: u64) -> Self {
        Self {
            account,
            started_at: Instant::now(),
            started_wall: curfew_util::now(),
            duration,
            active: true,
            generation,
        }
    }

    pub fn deadline(&self) -> Instant {
        self.started_at + self.duration
    }

    pub fn wall_deadline(&self) -> DateTime<Local> {
        chrono::Duration::from_std(self.duration)
            .ok()
            .and_then(|d| self.started_wall.checked_add_signed(d))
            .unwrap_or(self.started_wall)
    }

    pub fn remaining(&self, now: Instant) -> Duration {
        self.deadline().saturating_duration_since(now)
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        self.deadline() <= now
    }
}

/// Deferred callback that locks a grant at its deadline
#[derive(Debug)]
struct PendingTimer {
    generation: u64,
    handle: JoinHandle<()>,
}

impl PendingTimer {
    fn cancel(self) {
        debug!(generation = self.generation, "Cancelling pending timer");
        self.handle.abort();
    }
}

#[derive(Debug, Default)]
struct RegistryState {
    grants: HashMap<AccountId, Grant>,
    timers: HashMap<AccountId, PendingTimer>,
}

/// Result of a successful grant
#[derive(Debug, Clone)]
pub struct GrantReceipt {
    pub account: AccountId,
    pub display_name: String,
    pub duration: Duration,
    pub deadline: DateTime<Local>,
    /// Single-use secret now valid for the account
    pub secret: Secret,
}

/// Result of a lock
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LockOutcome {
    /// Whether a grant was in the table
    pub had_grant: bool,
    pub sessions_closed: usize,
}

/// Result of revoking everything
#[derive(Debug, Clone, Default)]
pub struct LockAllReport {
    pub grants_cleared: usize,
    pub sessions_closed: usize,
    pub restored: Vec<AccountId>,
    pub failures: Vec<String>,
}

impl LockAllReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Result of re-applying fallback secrets
#[derive(Debug, Clone, Default)]
pub struct RestoreReport {
    pub restored: Vec<AccountId>,
    pub failed: Vec<(AccountId, String)>,
}

/// Authoritative table of active grants
pub struct SessionRegistry {
    backend: Arc<dyn SessionBackend>,
    accounts: Vec<ManagedAccount>,
    state: RwLock<RegistryState>,
    events: mpsc::UnboundedSender<CoreEvent>,
    next_generation: AtomicU64,
    /// Upper bound for any single backend call
    host_timeout: Duration,
    this: Weak<SessionRegistry>,
}

impl SessionRegistry {
    /// Create a registry and the receiving end of its event stream
    pub fn new(
        backend: Arc<dyn SessionBackend>,
        accounts: Vec<ManagedAccount>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<CoreEvent>) {
        Self::with_host_timeout(backend, accounts, DEFAULT_HOST_TIMEOUT)
    }

    pub fn with_host_timeout(
        backend: Arc<dyn SessionBackend>,
        accounts: Vec<ManagedAccount>,
        host_timeout: Duration,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<CoreEvent>) {
        let (events, event_rx) = mpsc::unbounded_channel();

        let registry = Arc::new_cyclic(|this| Self {
            backend,
            accounts,
            state: RwLock::new(RegistryState::default()),
            events,
            next_generation: AtomicU64::new(1),
            host_timeout,
            this: this.clone(),
        });

        (registry, event_rx)
    }

    /// Configured accounts, in configuration order
    pub fn accounts(&self) -> &[ManagedAccount] {
        &self.accounts
    }

    /// Resolve a managed account by ID
    pub fn resolve(&self, id: &AccountId) -> Option<&ManagedAccount> {
        self.accounts.iter().find(|a| &a.id == id)
    }

    fn require(&self, id: &AccountId) -> Result<&ManagedAccount, RegistryError> {
        self.resolve(id)
            .ok_or_else(|| RegistryError::UnknownAccount(id.clone()))
    }

    /// Await a backend call for at most the host timeout. The write lock is
    /// held across backend calls, so a hung host command must not hold it forever.
    async fn host<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = HostResult<T>>,
    ) -> HostResult<T> {
        match tokio::time::timeout(self.host_timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    operation,
                    limit_secs = self.host_timeout.as_secs(),
                    "Host call timed out"
                );
                Err(HostError::TimedOut {
                    operation,
                    limit: self.host_timeout,
                })
            }
        }
    }

    fn generation(&self) -> u64 {
        self.next_generation.fetch_add(1, Ordering::SeqCst)
    }

    /// Open access to `account` for `duration`, replacing any existing grant.
    ///
    /// The grant is recorded even if the temporary secret cannot be applied;
    /// that failure is reported as `SecretNotApplied`.
    pub async fn grant(
        &self,
        account: &AccountId,
        duration: Duration,
    ) -> Result<GrantReceipt, RegistryError> {
        let managed = self.require(account)?;
        let mut state = self.state.write().await;

        if let Some(old) = state.timers.remove(account) {
            old.cancel();
        }

        let generation = self.generation();
        let grant = Grant::new(account.clone(), duration, generation);
        let deadline = grant.wall_deadline();
        let replaced = state.grants.insert(account.clone(), grant).is_some();
        let timer = self.arm_timer(account.clone(), duration, generation);
        state.timers.insert(account.clone(), timer);

        info!(
            account = %account,
            duration_secs = duration.as_secs(),
            replaced,
            deadline = %format_clock_time(&deadline),
            "Grant issued"
        );

        let secret = Secret::generate();
        let apply = self.backend.set_account_secret(account, &secret);
        if let Err(e) = self.host("set secret", apply).await {
            warn!(account = %account, error = %e, "Failed to apply temporary secret");
            return Err(RegistryError::SecretNotApplied {
                account: account.clone(),
                deadline,
                source: e,
            });
        }

        Ok(GrantReceipt {
            account: account.clone(),
            display_name: managed.display_name.clone(),
            duration,
            deadline,
            secret,
        })
    }

    /// Revoke access to `account`. Idempotent.
    ///
    /// Closes the account's live sessions and restores its fallback secret
    /// whether or not a grant exists. The grant is removed even when the
    /// backend fails; failures are reported as `Enforcement`.
    pub async fn lock(&self, account: &AccountId) -> Result<LockOutcome, RegistryError> {
        // Without a generation guard the revoke always runs.
        self.revoke(account, None)
            .await
            .map(|outcome| outcome.unwrap_or_default())
    }

    /// With a `guard`, only the grant of that generation is revoked;
    /// `Ok(None)` means it was already gone or replaced.
    async fn revoke(
        &self,
        account: &AccountId,
        guard: Option<u64>,
    ) -> Result<Option<LockOutcome>, RegistryError> {
        let managed = self.require(account)?;
        let mut state = self.state.write().await;

        if let Some(expected) = guard {
            let current = state.grants.get(account).map(|g| g.generation);
            if current != Some(expected) {
                debug!(
                    account = %account,
                    expected,
                    current = ?current,
                    "Skipping revoke for a superseded grant"
                );
                return Ok(None);
            }
        }

        let mut removed = state.grants.remove(account);
        if let Some(grant) = removed.as_mut() {
            grant.active = false;
        }
        if let Some(timer) = state.timers.remove(account) {
            timer.cancel();
        }

        let mut failures = Vec::new();
        let sessions_closed = self.close_sessions_of(account, &mut failures).await;

        let restore = self.backend.set_account_secret(account, &managed.fallback_secret);
        if let Err(e) = self.host("restore secret", restore).await {
            failures.push(e.to_string());
        }
        drop(state);

        let had_grant = removed.is_some();
        if failures.is_empty() {
            info!(account = %account, had_grant, sessions_closed, "Account locked");
            Ok(Some(LockOutcome {
                had_grant,
                sessions_closed,
            }))
        } else {
            warn!(account = %account, had_grant, failures = ?failures, "Account locked with errors");
            Err(RegistryError::Enforcement {
                account: account.clone(),
                had_grant,
                failures,
            })
        }
    }

    async fn close_sessions_of(&self, account: &AccountId, failures: &mut Vec<String>) -> usize {
        let sessions = match self
            .host("enumerate sessions", self.backend.enumerate_live_sessions())
            .await
        {
            Ok(sessions) => sessions,
            Err(e) => {
                failures.push(e.to_string());
                return 0;
            }
        };

        let mut closed = 0;
        for session in sessions.iter().filter(|s| &s.owner == account) {
            match self
                .host("close session", self.backend.close_session(&session.id))
                .await
            {
                Ok(()) => closed += 1,
                Err(e) => failures.push(e.to_string()),
            }
        }
        closed
    }

    /// Revoke every managed account and clear the grant table.
    ///
    /// Keeps going past individual failures; the fallback secret of every
    /// account is re-applied.
    pub async fn lock_all(&self) -> LockAllReport {
        let mut state = self.state.write().await;
        let mut report = LockAllReport::default();

        for (_, timer) in state.timers.drain() {
            timer.cancel();
        }
        for (_, mut grant) in state.grants.drain() {
            grant.active = false;
            report.grants_cleared += 1;
        }

        match self
            .host("enumerate sessions", self.backend.enumerate_live_sessions())
            .await
        {
            Ok(sessions) => {
                for session in sessions.iter().filter(|s| self.resolve(&s.owner).is_some()) {
                    match self
                        .host("close session", self.backend.close_session(&session.id))
                        .await
                    {
                        Ok(()) => report.sessions_closed += 1,
                        Err(e) => report.failures.push(e.to_string()),
                    }
                }
            }
            Err(e) => report.failures.push(e.to_string()),
        }

        for account in &self.accounts {
            let restore = self
                .backend
                .set_account_secret(&account.id, &account.fallback_secret);
            match self.host("restore secret", restore).await {
                Ok(()) => report.restored.push(account.id.clone()),
                Err(e) => report.failures.push(e.to_string()),
            }
        }
        drop(state);

        info!(
            grants_cleared = report.grants_cleared,
            sessions_closed = report.sessions_closed,
            restored = report.restored.len(),
            failures = report.failures.len(),
            "All accounts locked"
        );
        report
    }

    /// Push the deadline of an existing grant out by `extra`
    pub async fn extend(
        &self,
        account: &AccountId,
        extra: Duration,
    ) -> Result<DateTime<Local>, RegistryError> {
        self.require(account)?;
        let mut state = self.state.write().await;
        let now = Instant::now();
        let generation = self.generation();

        let grant = state
            .grants
            .get_mut(account)
            .ok_or_else(|| RegistryError::NoGrant(account.clone()))?;

        let remaining = grant.remaining(now) + extra;
        grant.duration = now.duration_since(grant.started_at) + remaining;
        grant.generation = generation;
        let deadline = grant.wall_deadline();

        if let Some(old) = state.timers.remove(account) {
            old.cancel();
        }
        let timer = self.arm_timer(account.clone(), remaining, generation);
        state.timers.insert(account.clone(), timer);

        info!(
            account = %account,
            extra_secs = extra.as_secs(),
            remaining_secs = remaining.as_secs(),
            "Grant extended"
        );
        Ok(deadline)
    }

    /// Grants still before their deadline, ordered by account
    pub async fn active_grants(&self) -> Vec<Grant> {
        self.active_grants_at(Instant::now()).await
    }

    pub async fn active_grants_at(&self, now: Instant) -> Vec<Grant> {
        let state = self.state.read().await;
        let mut grants: Vec<Grant> = state
            .grants
            .values()
            .filter(|g| !g.is_expired(now))
            .cloned()
            .collect();
        grants.sort_by(|a, b| a.account.cmp(&b.account));
        grants
    }

    /// Grants whose deadline has passed but which are still in the table
    pub async fn expired_grants(&self) -> Vec<Grant> {
        self.expired_grants_at(Instant::now()).await
    }

    pub async fn expired_grants_at(&self, now: Instant) -> Vec<Grant> {
        let state = self.state.read().await;
        state
            .grants
            .values()
            .filter(|g| g.is_expired(now))
            .cloned()
            .collect()
    }

    /// Lock `grant` because it ran out, and tell operators about it.
    ///
    /// Returns true if this call removed the grant. A grant that was replaced
    /// since `grant` was observed is left alone.
    pub async fn expire(&self, grant: &Grant, trigger: ExpiryTrigger) -> bool {
        self.expire_generation(&grant.account, grant.generation, trigger)
            .await
    }

    async fn expire_generation(
        &self,
        account: &AccountId,
        generation: u64,
        trigger: ExpiryTrigger,
    ) -> bool {
        let display_name = self
            .resolve(account)
            .map(|a| a.display_name.clone())
            .unwrap_or_else(|| account.to_string());

        match self.revoke(account, Some(generation)).await {
            Ok(Some(outcome)) if outcome.had_grant => {
                info!(account = %account, trigger = %trigger, "Grant expired");
                self.emit(CoreEvent::GrantExpired {
                    account: account.clone(),
                    display_name,
                    trigger,
                    sessions_closed: outcome.sessions_closed,
                });
                true
            }
            Ok(Some(_)) => {
                debug!(account = %account, trigger = %trigger, "Grant already revoked");
                false
            }
            Ok(None) => false,
            Err(RegistryError::Enforcement {
                had_grant: true,
                failures,
                ..
            }) => {
                self.emit(CoreEvent::EnforcementFailed {
                    account: account.clone(),
                    display_name,
                    failures,
                });
                true
            }
            Err(e) => {
                warn!(account = %account, trigger = %trigger, error = %e, "Expiry revoke failed");
                false
            }
        }
    }

    fn emit(&self, event: CoreEvent) {
        if self.events.send(event).is_err() {
            debug!("No event listener attached");
        }
    }

    fn arm_timer(&self, account: AccountId, after: Duration, generation: u64) -> PendingTimer {
        let registry = self.this.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let Some(registry) = registry.upgrade() else {
                return;
            };
            // The revoke runs on its own task so cancelling this timer cannot cut it short.
            tokio::spawn(async move {
                registry
                    .expire_generation(&account, generation, ExpiryTrigger::Timer)
                    .await;
            });
        });

        PendingTimer { generation, handle }
    }

    /// Re-apply the configured fallback secret for one account
    pub async fn restore_secret(&self, account: &AccountId) -> Result<(), RegistryError> {
        let managed = self.require(account)?;
        let _state = self.state.write().await;

        let restore = self.backend.set_account_secret(account, &managed.fallback_secret);
        self.host("restore secret", restore)
            .await
            .map_err(|e| {
                warn!(account = %account, error = %e, "Failed to restore fallback secret");
                RegistryError::Enforcement {
                    account: account.clone(),
                    had_grant: false,
                    failures: vec![e.to_string()],
                }
            })?;

        info!(account = %account, "Fallback secret restored");
        Ok(())
    }

    /// Re-apply every configured fallback secret
    pub async fn restore_all_secrets(&self) -> RestoreReport {
        let _state = self.state.write().await;
        let mut report = RestoreReport::default();

        for account in &self.accounts {
            let restore = self
                .backend
                .set_account_secret(&account.id, &account.fallback_secret);
            match self.host("restore secret", restore).await {
                Ok(()) => report.restored.push(account.id.clone()),
                Err(e) => {
                    warn!(account = %account.id, error = %e, "Failed to restore fallback secret");
                    report.failed.push((account.id.clone(), e.to_string()));
                }
            }
        }

        info!(
            restored = report.restored.len(),
            failed = report.failed.len(),
            "Fallback secrets restored"
        );
        report
    }

    /// Drop all grants and timers without touching the host
    pub async fn discard_all(&self) -> usize {
        let mut state = self.state.write().await;
        for (_, timer) in state.timers.drain() {
            timer.cancel();
        }
        let count = state.grants.len();
        state.grants.clear();
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use curfew_host_api::MockBackend;
    use curfew_util::minutes;

    fn accounts() -> Vec<ManagedAccount> {
        vec![
            ManagedAccount::new("kid1", "Alice", "fallback-1"),
            ManagedAccount::new("kid2", "Bob", "fallback-2"),
            ManagedAccount::new("kid3", "Carol", "fallback-3"),
        ]
    }

    fn setup() -> (
        Arc<SessionRegistry>,
        Arc<MockBackend>,
        mpsc::UnboundedReceiver<CoreEvent>,
    ) {
        let backend = Arc::new(MockBackend::new());
        let (registry, rx) = SessionRegistry::new(backend.clone(), accounts());
        (registry, backend, rx)
    }

    fn kid(n: u8) -> AccountId {
        AccountId::new(format!("kid{}", n))
    }

    #[tokio::test(start_paused = true)]
    async fn grant_then_active_has_exactly_one() {
        let (registry, _backend, _rx) = setup();

        for (n, mins) in [(1, 1), (2, 240), (3, 480)] {
            registry.grant(&kid(n), minutes(mins)).await.unwrap();
            let active = registry.active_grants().await;
            let mine: Vec<_> = active.iter().filter(|g| g.account == kid(n)).collect();
            assert_eq!(mine.len(), 1);
            assert_eq!(mine[0].duration, minutes(mins));
            assert!(mine[0].active);
        }
    }

    #[tokio::test]
    async fn grant_unknown_account_fails() {
        let (registry, backend, _rx) = setup();
        let ghost = AccountId::new("ghost");

        let result = registry.grant(&ghost, minutes(10)).await;
        assert!(matches!(result, Err(RegistryError::UnknownAccount(_))));
        assert!(registry.active_grants().await.is_empty());
        assert_eq!(backend.secret_writes(&ghost), 0);
    }

    #[tokio::test]
    async fn grant_applies_temporary_secret() {
        let (registry, backend, _rx) = setup();

        let receipt = registry.grant(&kid(1), minutes(30)).await.unwrap();
        assert_eq!(receipt.display_name, "Alice");
        assert_eq!(backend.secret_of(&kid(1)), Some(receipt.secret.clone()));
        assert_ne!(receipt.secret, Secret::new("fallback-1"));
    }

    #[tokio::test]
    async fn grant_secret_failure_still_records() {
        let (registry, backend, _rx) = setup();
        backend.set_secret_failure(&kid(1), true);

        let result = registry.grant(&kid(1), minutes(30)).await;
        assert!(matches!(result, Err(RegistryError::SecretNotApplied { .. })));
        assert_eq!(registry.active_grants().await.len(), 1);
    }

    #[tokio::test]
    async fn lock_twice_succeeds() {
        let (registry, backend, _rx) = setup();
        registry.grant(&kid(1), minutes(30)).await.unwrap();
        backend.login(&kid(1));

        let first = registry.lock(&kid(1)).await.unwrap();
        assert!(first.had_grant);
        assert_eq!(first.sessions_closed, 1);

        let second = registry.lock(&kid(1)).await.unwrap();
        assert!(!second.had_grant);
        assert_eq!(second.sessions_closed, 0);

        assert!(registry.active_grants().await.is_empty());
        assert_eq!(backend.secret_of(&kid(1)), Some(Secret::new("fallback-1")));
    }

    #[tokio::test]
    async fn lock_without_grant_restores_secret() {
        let (registry, backend, _rx) = setup();

        let outcome = registry.lock(&kid(2)).await.unwrap();
        assert!(!outcome.had_grant);
        assert_eq!(backend.secret_of(&kid(2)), Some(Secret::new("fallback-2")));
    }

    #[tokio::test]
    async fn lock_removes_grant_even_when_backend_fails() {
        let (registry, backend, _rx) = setup();
        registry.grant(&kid(1), minutes(30)).await.unwrap();
        backend.login(&kid(1));
        *backend.fail_close.lock().unwrap() = true;

        let result = registry.lock(&kid(1)).await;
        assert!(matches!(
            result,
            Err(RegistryError::Enforcement { had_grant: true, .. })
        ));
        assert!(registry.active_grants().await.is_empty());
        // Secret restore still ran after the close failure
        assert_eq!(backend.secret_of(&kid(1)), Some(Secret::new("fallback-1")));
    }

    #[tokio::test]
    async fn regrant_overwrites() {
        let (registry, _backend, _rx) = setup();

        registry.grant(&kid(1), minutes(10)).await.unwrap();
        registry.grant(&kid(1), minutes(5)).await.unwrap();

        let active = registry.active_grants().await;
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].duration, minutes(5));
    }

    #[tokio::test]
    async fn expired_only_at_deadline() {
        let (registry, _backend, _rx) = setup();
        registry.grant(&kid(1), minutes(10)).await.unwrap();
        let start = registry.active_grants().await[0].started_at;

        assert!(
            registry
                .expired_grants_at(start + Duration::from_secs(599))
                .await
                .is_empty()
        );
        assert!(
            registry
                .active_grants_at(start + Duration::from_secs(599))
                .await
                .len()
                == 1
        );

        let expired = registry.expired_grants_at(start + minutes(10)).await;
        assert_eq!(expired.len(), 1);
        assert!(
            registry
                .active_grants_at(start + minutes(10))
                .await
                .is_empty()
        );
    }

    #[tokio::test]
    async fn lock_all_continues_past_secret_failure() {
        let (registry, backend, _rx) = setup();
        for n in 1..=3 {
            registry.grant(&kid(n), minutes(30)).await.unwrap();
            backend.login(&kid(n));
        }
        backend.set_secret_failure(&kid(2), true);

        let report = registry.lock_all().await;
        assert_eq!(report.grants_cleared, 3);
        assert_eq!(report.sessions_closed, 3);
        assert_eq!(report.restored, vec![kid(1), kid(3)]);
        assert_eq!(report.failures.len(), 1);
        assert!(registry.active_grants().await.is_empty());
        assert_eq!(backend.secret_of(&kid(3)), Some(Secret::new("fallback-3")));
    }

    #[tokio::test]
    async fn lock_all_restores_every_secret_when_close_fails() {
        let (registry, backend, _rx) = setup();
        for n in 1..=3 {
            registry.grant(&kid(n), minutes(30)).await.unwrap();
            backend.login(&kid(n));
        }
        *backend.fail_close.lock().unwrap() = true;

        let report = registry.lock_all().await;
        assert!(!report.is_clean());
        assert_eq!(report.restored.len(), 3);
        for (n, secret) in [(1, "fallback-1"), (2, "fallback-2"), (3, "fallback-3")] {
            assert_eq!(backend.secret_of(&kid(n)), Some(Secret::new(secret)));
        }
        assert!(registry.active_grants().await.is_empty());
    }

    #[tokio::test]
    async fn lock_all_leaves_unmanaged_sessions() {
        let (registry, backend, _rx) = setup();
        backend.login(&AccountId::new("parent"));
        backend.login(&kid(1));

        let report = registry.lock_all().await;
        assert_eq!(report.sessions_closed, 1);
        assert_eq!(backend.live_sessions().len(), 1);
        assert_eq!(backend.live_sessions()[0].owner.as_str(), "parent");
    }

    #[tokio::test]
    async fn extend_requires_grant() {
        let (registry, _backend, _rx) = setup();
        let result = registry.extend(&kid(1), minutes(15)).await;
        assert!(matches!(result, Err(RegistryError::NoGrant(_))));

        let result = registry.extend(&AccountId::new("ghost"), minutes(15)).await;
        assert!(matches!(result, Err(RegistryError::UnknownAccount(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn extend_moves_deadline() {
        let (registry, _backend, mut rx) = setup();
        registry.grant(&kid(1), minutes(1)).await.unwrap();

        tokio::time::sleep(Duration::from_secs(30)).await;
        registry.extend(&kid(1), minutes(1)).await.unwrap();

        let grant = &registry.active_grants().await[0];
        assert_eq!(grant.duration, Duration::from_secs(120));

        // The first deadline passes without a revoke
        tokio::time::sleep(Duration::from_secs(45)).await;
        assert_eq!(registry.active_grants().await.len(), 1);
        assert!(rx.try_recv().is_err());

        tokio::time::sleep(Duration::from_secs(50)).await;
        assert!(registry.active_grants().await.is_empty());
        assert!(matches!(
            rx.try_recv(),
            Ok(CoreEvent::GrantExpired {
                trigger: ExpiryTrigger::Timer,
                ..
            })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn timer_revokes_at_deadline() {
        let (registry, backend, mut rx) = setup();
        registry.grant(&kid(1), minutes(1)).await.unwrap();
        backend.login(&kid(1));

        tokio::time::sleep(Duration::from_secs(61)).await;

        assert!(registry.active_grants().await.is_empty());
        assert!(backend.live_sessions().is_empty());
        assert_eq!(backend.secret_of(&kid(1)), Some(Secret::new("fallback-1")));

        let event = rx.try_recv().unwrap();
        assert_eq!(
            event,
            CoreEvent::GrantExpired {
                account: kid(1),
                display_name: "Alice".into(),
                trigger: ExpiryTrigger::Timer,
                sessions_closed: 1,
            }
        );
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn replaced_grant_outlives_old_timer() {
        let (registry, _backend, mut rx) = setup();
        registry.grant(&kid(1), minutes(1)).await.unwrap();

        tokio::time::sleep(Duration::from_secs(30)).await;
        registry.grant(&kid(1), minutes(10)).await.unwrap();

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(registry.active_grants().await.len(), 1);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn expire_with_stale_snapshot_is_ignored() {
        let (registry, _backend, mut rx) = setup();
        registry.grant(&kid(1), minutes(1)).await.unwrap();
        let stale = registry.active_grants().await[0].clone();
        registry.grant(&kid(1), minutes(10)).await.unwrap();

        assert!(!registry.expire(&stale, ExpiryTrigger::Sweep).await);
        assert_eq!(registry.active_grants().await.len(), 1);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn double_expire_notifies_once() {
        let (registry, _backend, mut rx) = setup();
        registry.grant(&kid(1), minutes(1)).await.unwrap();
        let grant = registry.active_grants().await[0].clone();

        assert!(registry.expire(&grant, ExpiryTrigger::Sweep).await);
        assert!(!registry.expire(&grant, ExpiryTrigger::Timer).await);

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn restore_all_reports_failures() {
        let (registry, backend, _rx) = setup();
        backend.set_secret_failure(&kid(3), true);

        let report = registry.restore_all_secrets().await;
        assert_eq!(report.restored, vec![kid(1), kid(2)]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, kid(3));

        assert!(registry.restore_secret(&kid(1)).await.is_ok());
        assert!(registry.restore_secret(&kid(3)).await.is_err());
    }

    #[tokio::test]
    async fn discard_all_leaves_host_untouched() {
        let (registry, backend, _rx) = setup();
        registry.grant(&kid(1), minutes(5)).await.unwrap();
        let writes = backend.secret_writes(&kid(1));

        assert_eq!(registry.discard_all().await, 1);
        assert!(registry.active_grants().await.is_empty());
        assert_eq!(backend.secret_writes(&kid(1)), writes);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_backend_times_out_and_frees_the_table() {
        let (registry, backend, _rx) = setup();
        *backend.hang.lock().unwrap() = true;

        let result = registry.grant(&kid(1), minutes(10)).await;
        assert!(matches!(
            result,
            Err(RegistryError::SecretNotApplied {
                source: HostError::TimedOut { .. },
                ..
            })
        ));
        assert_eq!(registry.active_grants().await.len(), 1);

        let result = registry.lock(&kid(1)).await;
        assert!(matches!(
            result,
            Err(RegistryError::Enforcement { had_grant: true, ref failures, .. })
                if failures.len() == 2
        ));
        assert!(registry.active_grants().await.is_empty());

        let report = registry.lock_all().await;
        assert_eq!(report.failures.len(), 4);
    }
}
