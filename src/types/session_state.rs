use serde::{Deserialize, Serialize};

use crate::types::Message;

/// A snapshot of the conversation owned by a controller.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionState {
    /// The ordered conversation log.
    pub log: Vec<Message>,

    /// True while a send is in progress.
    pub loading: bool,

    /// The most recent user-visible failure, if any.
    pub error: Option<String>,
}

impl SessionState {
    /// Content of the trailing assistant message, if the log ends with one.
    pub fn last_assistant_content(&self) -> Option<&str> {
        self.log.last().and_then(Message::assistant_content)
    }

    /// The log without a trailing loading placeholder.
    pub fn history(&self) -> &[Message] {
        match self.log.last() {
            Some(last) if last.is_loading() => &self.log[..self.log.len() - 1],
            _ => &self.log,
        }
    }
}
