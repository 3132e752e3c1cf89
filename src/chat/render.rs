//! Terminal output for the chat application.

use std::io::{self, Write};

use crate::types::SessionState;

/// ANSI escape code for dim text (used for notices).
const ANSI_DIM: &str = "\x1b[2m";

/// ANSI escape code for red text (used for errors).
const ANSI_RED: &str = "\x1b[31m";

/// ANSI escape code for cyan text (used for the assistant label).
const ANSI_CYAN: &str = "\x1b[36m";

/// ANSI escape code to reset all styling.
const ANSI_RESET: &str = "\x1b[0m";

/// Plain text renderer with optional ANSI styling.
#[derive(Debug, Clone, Copy)]
pub struct PlainTextRenderer {
    use_color: bool,
}

impl PlainTextRenderer {
    /// Creates a renderer, styling output only when `use_color` is set.
    pub fn with_color(use_color: bool) -> Self {
        Self { use_color }
    }

    fn styled(&self, style: &str, text: &str) -> String {
        if self.use_color {
            format!("{style}{text}{ANSI_RESET}")
        } else {
            text.to_string()
        }
    }

    /// Prints an informational notice.
    pub fn print_info(&self, info: &str) {
        println!("{}", self.styled(ANSI_DIM, info));
    }

    /// Prints an error.
    pub fn print_error(&self, error: &str) {
        eprintln!("{}", self.styled(ANSI_RED, error));
    }

    /// Prints the label that precedes a streamed reply.
    pub fn start_reply(&self) {
        print!("{}", self.styled(ANSI_CYAN, "Assistant: "));
        let _ = io::stdout().flush();
    }

    /// Prints streamed text without a newline.
    pub fn print_text(&self, text: &str) {
        print!("{text}");
        let _ = io::stdout().flush();
    }

    /// Ends a streamed reply, noting when it was cut short.
    pub fn finish_reply(&self, interrupted: bool) {
        if interrupted {
            println!("{}", self.styled(ANSI_DIM, " [interrupted]"));
        } else {
            println!();
        }
        println!();
    }
}

/// Tracks how much of one reply has been printed.
///
/// The reply is the assistant message that follows the user message appended
/// by the send that began after [`ReplyTracker::begin`].
#[derive(Debug, Default)]
pub struct ReplyTracker {
    reply_index: usize,
    printed: usize,
}

impl ReplyTracker {
    /// Starts tracking the reply to a send about to begin on `state`.
    pub fn begin(state: &SessionState) -> Self {
        Self {
            reply_index: state.log.len() + 1,
            printed: 0,
        }
    }

    /// Text appended to the reply since the last call.
    pub fn advance(&mut self, state: &SessionState) -> Option<String> {
        let content = state.log.get(self.reply_index)?.assistant_content()?;
        let fresh = content.get(self.printed..)?;
        if fresh.is_empty() {
            return None;
        }
        self.printed = content.len();
        Some(fresh.to_string())
    }

    /// Bytes of the reply printed so far.
    pub fn printed(&self) -> usize {
        self.printed
    }
}
