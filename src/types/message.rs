use serde::{Deserialize, Serialize};

use crate::types::ContentItem;

/// Role of a message in the session log.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// User role.
    User,

    /// Assistant role.
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// A message in the session log.
///
/// User messages are immutable once appended. Assistant messages start as an
/// empty, loading placeholder and grow as fragments stream in; `is_loading`
/// flips to `false` exactly once.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Message {
    /// A message written by the user.
    User {
        /// Ordered, non-empty content items.
        content: Vec<ContentItem>,
    },

    /// A reply from the model.
    Assistant {
        /// Text accumulated so far.
        content: String,
        /// True while fragments may still be appended.
        is_loading: bool,
    },
}

impl Message {
    /// Create a user message from content items.
    pub fn user(content: Vec<ContentItem>) -> Self {
        Message::User { content }
    }

    /// Create a user message holding a single text item.
    pub fn user_text(text: impl Into<String>) -> Self {
        Message::User {
            content: vec![ContentItem::text(text)],
        }
    }

    /// Create a finished assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Message::Assistant {
            content: content.into(),
            is_loading: false,
        }
    }

    /// Create the empty, loading assistant placeholder.
    pub fn placeholder() -> Self {
        Message::Assistant {
            content: String::new(),
            is_loading: true,
        }
    }

    /// The role of this message.
    pub fn role(&self) -> Role {
        match self {
            Message::User { .. } => Role::User,
            Message::Assistant { .. } => Role::Assistant,
        }
    }

    /// True for an assistant message that is still receiving fragments.
    pub fn is_loading(&self) -> bool {
        matches!(
            self,
            Message::Assistant {
                is_loading: true,
                ..
            }
        )
    }

    /// All text carried by this message, items joined with newlines.
    pub fn text(&self) -> String {
        match self {
            Message::User { content } => content
                .iter()
                .filter_map(ContentItem::as_text)
                .collect::<Vec<_>>()
                .join("\n"),
            Message::Assistant { content, .. } => content.clone(),
        }
    }

    /// The assistant content, if this is an assistant message.
    pub fn assistant_content(&self) -> Option<&str> {
        match self {
            Message::Assistant { content, .. } => Some(content),
            Message::User { .. } => None,
        }
    }
}
