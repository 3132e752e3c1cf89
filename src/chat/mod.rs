//! Chat application module for interactive conversations in the terminal.
//!
//! This module provides the pieces behind the `colloquy-chat` REPL:
//!
//! - Streaming replies printed as they arrive
//! - Image attachments queued by path
//! - Slash commands for session control
//! - Provider selection from the settings file
//!
//! # Architecture
//!
//! - [`config`]: CLI argument parsing and configuration
//! - [`session`]: the controller plus provider resolution and queued attachments
//! - [`commands`]: slash command parsing
//! - [`render`]: terminal output

mod commands;
mod config;
mod render;
mod session;

pub use commands::{ChatCommand, help_text, parse_command};
pub use config::{ChatArgs, ChatConfig, DEFAULT_SETTINGS_PATH};
pub use render::{PlainTextRenderer, ReplyTracker};
pub use session::ChatSession;
