//! Cooperative cancellation for in-flight sends.
//!
//! A session has at most one live [`CancellationToken`]. Issuing a new token
//! cancels the previous one, which is how a new send supersedes a reply that is
//! still streaming. Tokens are advisory: holders poll [`CancellationToken::is_cancelled`]
//! or await [`CancellationToken::cancelled`], and nothing is torn down for them.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio_util::sync::{CancellationToken as Flag, WaitForCancellationFutureOwned};

static NEXT_TOKEN_ID: AtomicU64 = AtomicU64::new(1);

/// A pollable marker telling an operation that it has been superseded or aborted.
///
/// Clones share the same flag. Only the [`CancellationManager`] that issued a
/// token can cancel it.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    id: u64,
    flag: Flag,
}

impl CancellationToken {
    fn new() -> Self {
        Self {
            id: NEXT_TOKEN_ID.fetch_add(1, Ordering::Relaxed),
            flag: Flag::new(),
        }
    }

    /// Returns true once the token has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.flag.is_cancelled()
    }

    /// Resolves once the token is cancelled.
    pub async fn cancelled(&self) {
        self.flag.cancelled().await
    }

    /// An owned future that resolves on cancellation, for `take_until` and friends.
    pub fn cancelled_owned(&self) -> WaitForCancellationFutureOwned {
        self.flag.clone().cancelled_owned()
    }

    /// True if `other` is a clone of this token.
    pub fn same_as(&self, other: &CancellationToken) -> bool {
        self.id == other.id
    }

    fn cancel(&self) {
        self.flag.cancel();
    }
}

/// Owns the session's single active token.
#[derive(Debug, Default)]
pub struct CancellationManager {
    current: Mutex<Option<CancellationToken>>,
}

impl CancellationManager {
    /// Creates a manager with no active token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels the active token, if any, and installs a fresh one.
    pub fn issue_token(&self) -> CancellationToken {
        let token = CancellationToken::new();
        let mut current = self.lock();
        if let Some(previous) = current.replace(token.clone()) {
            previous.cancel();
        }
        token
    }

    /// Cancels and forgets the active token. Does nothing when idle.
    pub fn cancel_active(&self) {
        if let Some(previous) = self.lock().take() {
            previous.cancel();
        }
    }

    /// Runs `f` and clears the reference if `token` is still the active token
    /// or no token is active; returns whether `f` ran.
    ///
    /// `f` runs under the manager's lock, so a concurrent [`issue_token`] is
    /// ordered entirely before or after it.
    ///
    /// [`issue_token`]: CancellationManager::issue_token
    pub fn release<F: FnOnce()>(&self, token: &CancellationToken, f: F) -> bool {
        let mut current = self.lock();
        match current.as_ref() {
            Some(active) if !active.same_as(token) => false,
            _ => {
                f();
                *current = None;
                true
            }
        }
    }

    /// True while a token is active.
    pub fn is_active(&self) -> bool {
        self.lock().is_some()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<CancellationToken>> {
        // The guarded value is a plain Option, so a poisoned lock is still consistent.
        self.current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
