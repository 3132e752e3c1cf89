//! A streaming, cancellable chat session controller for remote language models.
//!
//! A [`ChatController`] owns one conversation. [`ChatController::send`] records
//! the user's message (text plus encoded image attachments), asks a
//! [`ModelProvider`] for a reply and folds the streamed fragments into the
//! trailing assistant message. Only one send is live at a time: a new send or
//! [`ChatController::abort`] cancels the previous one, and its late fragments
//! are dropped. Front ends observe [`SessionState`] through
//! [`ChatController::subscribe`].

// Public modules
pub mod accumulator;
pub mod attachment;
pub mod cancellation;
pub mod chat;
pub mod classify;
pub mod controller;
pub mod error;
pub mod provider;
pub mod settings;
pub mod sse;
pub mod state;
pub mod types;

mod observability;

// Re-exports
pub use accumulator::{StreamAccumulator, StreamEnd};
pub use attachment::{Attachment, encode_attachments};
pub use cancellation::{CancellationManager, CancellationToken};
pub use classify::ErrorKind;
pub use controller::{ChatController, SendOutcome};
pub use error::{Error, Result};
pub use observability::register_biometrics;
pub use provider::{FragmentStream, GoogleGenerativeAi, ModelProvider, OpenAiCompatible};
pub use settings::{AppSettings, ProviderKind, ProviderResolver, SettingsStore};
pub use state::SessionStore;
pub use types::*;
