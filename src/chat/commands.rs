//! Slash command parsing for the chat application.
//!
//! Lines starting with `/` control the session and are never sent to the
//! model.

use crate::settings::ProviderKind;

/// A parsed chat command.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatCommand {
    /// Clear the conversation.
    Clear,

    /// Queue an image to go out with the next message.
    Attach(String),

    /// Drop every queued attachment.
    Detach,

    /// List queued attachments.
    Attachments,

    /// Switch to another provider.
    Provider(ProviderKind),

    /// Display help information.
    Help,

    /// Exit the chat application.
    Quit,

    /// Report a parsing error back to the caller.
    Invalid(String),
}

/// Parses user input for slash commands.
///
/// Returns `Some(ChatCommand)` if the input is a command, or `None` if it
/// should be sent as a message.
///
/// # Examples
///
/// ```
/// # use colloquy::chat::parse_command;
/// assert!(parse_command("/quit").is_some());
/// assert!(parse_command("/attach cat.png").is_some());
/// assert!(parse_command("What is in this picture?").is_none());
/// ```
pub fn parse_command(input: &str) -> Option<ChatCommand> {
    let input = input.trim();
    let rest = input.strip_prefix('/')?;

    let mut parts = rest.splitn(2, ' ');
    let command = parts.next()?.to_lowercase();
    let argument = parts.next().map(|s| s.trim()).filter(|s| !s.is_empty());

    let result = match command.as_str() {
        "clear" => ChatCommand::Clear,
        "attach" => match argument {
            Some(path) => ChatCommand::Attach(unquote(path).to_string()),
            None => ChatCommand::Invalid("/attach requires a file path".to_string()),
        },
        "detach" => ChatCommand::Detach,
        "attachments" => ChatCommand::Attachments,
        "provider" => match argument.map(str::parse::<ProviderKind>) {
            Some(Ok(kind)) => ChatCommand::Provider(kind),
            Some(Err(err)) => ChatCommand::Invalid(format!("/provider: {err}")),
            None => ChatCommand::Invalid(
                "/provider requires one of ollama, groq or google".to_string(),
            ),
        },
        "help" | "?" => ChatCommand::Help,
        "quit" | "exit" | "q" => ChatCommand::Quit,
        _ => ChatCommand::Invalid(format!("Unknown command: /{}", command)),
    };

    Some(result)
}

fn unquote(path: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = path
            .strip_prefix(quote)
            .and_then(|p| p.strip_suffix(quote))
        {
            return inner;
        }
    }
    path
}

/// Returns help text describing available commands.
pub fn help_text() -> &'static str {
    r#"Available commands:
  /attach <path>         Attach an image to the next message
  /detach                Drop queued attachments
  /attachments           List queued attachments
  /provider <name>       Switch provider (ollama, groq, google)
  /clear                 Clear conversation history
  /help                  Show this help message
  /quit                  Exit the chat
Press Ctrl+C while a reply is streaming to stop it."#
}
