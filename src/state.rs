//! The session state store.
//!
//! [`SessionStore`] is the only writer of a session's [`SessionState`]. Each
//! operation runs as a single critical section inside a `tokio::sync::watch`
//! channel, so partial updates are never observable and every subscriber is
//! woken after each effective change.

use tokio::sync::watch;

use crate::cancellation::CancellationToken;
use crate::types::{ContentItem, Message, SessionState};

/// Serialized, observable storage for one conversation.
#[derive(Debug)]
pub struct SessionStore {
    state: watch::Sender<SessionState>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        let (state, _) = watch::channel(SessionState::default());
        Self { state }
    }

    /// A clone of the current state.
    pub fn snapshot(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// The log up to and including the latest user message, without a loading placeholder.
    pub fn history(&self) -> Vec<Message> {
        self.state.borrow().history().to_vec()
    }

    /// A receiver that is notified after every change.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Appends a user message. Empty content is ignored.
    pub fn append_user(&self, items: Vec<ContentItem>) {
        if items.is_empty() {
            return;
        }
        self.state.send_modify(|state| state.log.push(Message::user(items)));
    }

    /// Appends an empty, loading assistant message.
    pub fn append_assistant_placeholder(&self) {
        self.state
            .send_modify(|state| state.log.push(Message::placeholder()));
    }

    /// Appends `text` to the trailing assistant message while it is loading.
    ///
    /// Does nothing if the log does not end with a loading assistant message.
    pub fn apply_delta(&self, text: &str) {
        self.state
            .send_if_modified(|state| push_delta(&mut state.log, text));
    }

    /// Like [`apply_delta`](Self::apply_delta), but only if `token` has not been
    /// cancelled; the check and the append happen in one critical section.
    ///
    /// Returns false if the token was cancelled.
    pub fn apply_delta_unless_cancelled(&self, token: &CancellationToken, text: &str) -> bool {
        let mut cancelled = false;
        self.state.send_if_modified(|state| {
            if token.is_cancelled() {
                cancelled = true;
                return false;
            }
            push_delta(&mut state.log, text)
        });
        !cancelled
    }

    /// Marks the trailing assistant message as finished. Idempotent.
    pub fn finalize_assistant(&self) {
        self.state
            .send_if_modified(|state| finish_trailing(&mut state.log));
    }

    /// Like [`finalize_assistant`](Self::finalize_assistant), but only if
    /// `token` has not been cancelled.
    ///
    /// Returns false if the token was cancelled.
    pub fn finalize_assistant_unless_cancelled(&self, token: &CancellationToken) -> bool {
        let mut cancelled = false;
        self.state.send_if_modified(|state| {
            if token.is_cancelled() {
                cancelled = true;
                return false;
            }
            finish_trailing(&mut state.log)
        });
        !cancelled
    }

    /// Starts an exchange for `token`: finalizes a leftover reply, appends the
    /// user message and a loading placeholder, and returns the history to send.
    ///
    /// All of it happens in one critical section. Returns `None`, leaving the
    /// log untouched, if the token was cancelled.
    pub fn begin_exchange_unless_cancelled(
        &self,
        token: &CancellationToken,
        items: Vec<ContentItem>,
    ) -> Option<Vec<Message>> {
        let mut history = None;
        self.state.send_if_modified(|state| {
            if token.is_cancelled() {
                return false;
            }
            finish_trailing(&mut state.log);
            if !items.is_empty() {
                state.log.push(Message::user(items));
            }
            history = Some(state.history().to_vec());
            state.log.push(Message::placeholder());
            true
        });
        history
    }

    /// Replaces the error field.
    pub fn set_error(&self, error: Option<String>) {
        self.state.send_if_modified(|state| {
            if state.error == error {
                return false;
            }
            state.error = error;
            true
        });
    }

    /// Replaces the loading flag.
    pub fn set_loading(&self, loading: bool) {
        self.state.send_if_modified(|state| {
            if state.loading == loading {
                return false;
            }
            state.loading = loading;
            true
        });
    }

    /// Clears the log, the error and the loading flag.
    pub fn reset(&self) {
        self.state.send_modify(|state| *state = SessionState::default());
    }
}

fn finish_trailing(log: &mut [Message]) -> bool {
    match log.last_mut() {
        Some(Message::Assistant { is_loading, .. }) if *is_loading => {
            *is_loading = false;
            true
        }
        _ => false,
    }
}

fn push_delta(log: &mut [Message], text: &str) -> bool {
    match log.last_mut() {
        Some(Message::Assistant {
            content,
            is_loading: true,
        }) => {
            if text.is_empty() {
                return false;
            }
            content.push_str(text);
            true
        }
        _ => false,
    }
}
