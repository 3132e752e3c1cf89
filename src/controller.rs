//! The session controller: validates a send, records it, streams the reply
//! into the log and cleans up after failures and cancellation.

use std::sync::{Arc, RwLock};
use std::time::Instant;

use tokio::sync::watch;

use crate::accumulator::{StreamAccumulator, StreamEnd};
use crate::attachment::{Attachment, encode_attachments};
use crate::cancellation::{CancellationManager, CancellationToken};
use crate::classify::ErrorKind;
use crate::observability::{
    SEND_ABORTS, SEND_DURATION, SEND_ERRORS, SEND_REJECTED, SEND_REQUESTS, SEND_SUPERSEDED,
};
use crate::provider::{FragmentStream, ModelProvider};
use crate::settings::{ProviderKind, ProviderResolver};
use crate::state::SessionStore;
use crate::types::{ContentItem, SessionState};
use crate::{Error, Result};

/// How an accepted send ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// The reply streamed to completion.
    Completed,
    /// The send was cancelled with [`ChatController::abort`] or [`ChatController::reset`].
    Aborted,
    /// A newer send replaced this one before it finished.
    Superseded,
    /// The send failed; the formatted error is in the session state.
    Failed(ErrorKind),
}

/// Owns one conversation and drives sends against a model provider.
///
/// Share it as `Arc<ChatController>`. At most one send is live: starting a
/// new one cancels the previous, whose remaining fragments are dropped.
pub struct ChatController {
    store: SessionStore,
    cancellation: CancellationManager,
    provider: RwLock<Arc<dyn ModelProvider>>,
}

impl ChatController {
    /// A controller with an empty session talking to `provider`.
    pub fn new(provider: Arc<dyn ModelProvider>) -> Self {
        Self {
            store: SessionStore::new(),
            cancellation: CancellationManager::new(),
            provider: RwLock::new(provider),
        }
    }

    /// A controller for the provider `resolver` builds for `kind`.
    pub async fn from_resolver(resolver: &ProviderResolver, kind: ProviderKind) -> Result<Self> {
        Ok(Self::new(resolver.resolve(kind).await?))
    }

    /// The provider used by the next send.
    pub fn provider(&self) -> Arc<dyn ModelProvider> {
        match self.provider.read() {
            Ok(provider) => Arc::clone(&provider),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Use `provider` for subsequent sends. An in-flight send keeps its provider.
    pub fn set_provider(&self, provider: Arc<dyn ModelProvider>) {
        tracing::info!(provider = provider.name(), "switching provider");
        match self.provider.write() {
            Ok(mut current) => *current = provider,
            Err(poisoned) => *poisoned.into_inner() = provider,
        }
    }

    /// A clone of the current session state.
    pub fn snapshot(&self) -> SessionState {
        self.store.snapshot()
    }

    /// A receiver notified after every state change.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.store.subscribe()
    }

    /// True while a send holds the active token.
    pub fn is_busy(&self) -> bool {
        self.cancellation.is_active()
    }

    /// Send `text` and `attachments`, streaming the reply into the log.
    ///
    /// Returns `Err` only when the input is rejected: blank text with no
    /// attachments is an [`Error::Validation`] and leaves the state untouched.
    /// Every other failure is recorded in the session and reported as
    /// [`SendOutcome::Failed`].
    #[tracing::instrument(skip_all, fields(attachments = attachments.len()))]
    pub async fn send(&self, text: &str, attachments: &[Attachment]) -> Result<SendOutcome> {
        if text.trim().is_empty() && attachments.is_empty() {
            SEND_REJECTED.click();
            return Err(Error::validation(
                "message must contain text or at least one attachment",
                Some("text".to_string()),
            ));
        }
        SEND_REQUESTS.click();
        let started = Instant::now();

        let token = self.cancellation.issue_token();
        self.store.set_loading(true);
        self.store.set_error(None);

        let result = self.run(&token, text, attachments).await;
        let outcome = self.finish(&token, result);
        SEND_DURATION.add(started.elapsed().as_secs_f64());
        tracing::debug!(?outcome, "send finished");
        Ok(outcome)
    }

    /// Cancel the active send, if any, and clear the loading flag right away.
    pub fn abort(&self) {
        if self.cancellation.is_active() {
            tracing::info!("aborting active send");
        }
        self.cancellation.cancel_active();
        self.store.set_loading(false);
    }

    /// Cancel any active send and clear the session.
    pub fn reset(&self) {
        self.cancellation.cancel_active();
        self.store.reset();
    }

    async fn run(
        &self,
        token: &CancellationToken,
        text: &str,
        attachments: &[Attachment],
    ) -> Result<StreamEnd> {
        let mut items = Vec::with_capacity(attachments.len() + 1);
        if !text.trim().is_empty() {
            items.push(ContentItem::text(text));
        }
        items.extend(encode_attachments(attachments).await?);

        // A superseded reply keeps what it streamed but stops loading.
        let Some(history) = self.store.begin_exchange_unless_cancelled(token, items) else {
            return Ok(StreamEnd::Cancelled);
        };

        let provider = self.provider();
        tracing::debug!(provider = provider.name(), messages = history.len(), "dispatching");
        let fragments = tokio::select! {
            _ = token.cancelled() => return Ok(StreamEnd::Cancelled),
            fragments = provider.stream(&history, token) => fragments?,
        };
        self.accumulate(token, fragments).await
    }

    async fn accumulate(
        &self,
        token: &CancellationToken,
        fragments: FragmentStream,
    ) -> Result<StreamEnd> {
        let mut accumulator = StreamAccumulator::new(&self.store, token);
        let end = accumulator.run(fragments).await;
        tracing::debug!(fragments = accumulator.fragments_applied(), "stream ended");
        end
    }

    fn finish(&self, token: &CancellationToken, result: Result<StreamEnd>) -> SendOutcome {
        let failure = match result {
            Ok(StreamEnd::Completed) => None,
            Ok(StreamEnd::Cancelled) => Some(ErrorKind::AbortSignal),
            Err(err) if token.is_cancelled() => {
                tracing::debug!(error = %err, "error after cancellation ignored");
                Some(ErrorKind::AbortSignal)
            }
            Err(err) => {
                let kind = ErrorKind::classify(&err);
                if !kind.is_abort() {
                    tracing::warn!(error = %err, kind = %kind, "send failed");
                }
                Some(kind)
            }
        };
        let store = &self.store;
        let released = self.cancellation.release(token, || {
            if let Some(message) = failure.as_ref().and_then(ErrorKind::session_message) {
                store.set_error(Some(message));
            }
            store.finalize_assistant();
            store.set_loading(false);
        });
        match failure {
            None => SendOutcome::Completed,
            Some(ErrorKind::AbortSignal) if released => {
                SEND_ABORTS.click();
                SendOutcome::Aborted
            }
            Some(ErrorKind::AbortSignal) => {
                SEND_SUPERSEDED.click();
                SendOutcome::Superseded
            }
            Some(_) if !released => {
                SEND_SUPERSEDED.click();
                SendOutcome::Superseded
            }
            Some(kind) => {
                SEND_ERRORS.click();
                SendOutcome::Failed(kind)
            }
        }
    }
}

impl std::fmt::Debug for ChatController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatController")
            .field("provider", &self.provider().name())
            .field("busy", &self.is_busy())
            .finish()
    }
}
