//! Interactive chat with a local or hosted language model.
//!
//! # Usage
//!
//! ```bash
//! # Talk to a local Ollama server with the configured model
//! colloquy-chat
//!
//! # Use Groq; the API key comes from the settings file
//! colloquy-chat --provider groq
//!
//! # Use another settings file and model
//! colloquy-chat --settings ~/.config/colloquy.json --model qwen2.5
//!
//! # Disable colors (useful for piping output)
//! colloquy-chat --no-color
//! ```
//!
//! # Commands
//!
//! While chatting, you can use slash commands:
//! - `/help` - Show available commands
//! - `/attach <path>` - Attach an image to the next message
//! - `/provider <name>` - Switch provider
//! - `/clear` - Clear conversation history
//! - `/quit` - Exit the application
//!
//! Ctrl+C while a reply is streaming stops the reply. Set `RUST_LOG=colloquy=debug`
//! to see what the controller is doing.

use std::sync::Arc;

use arrrg::CommandLine;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing_subscriber::EnvFilter;

use colloquy::chat::{
    ChatArgs, ChatCommand, ChatConfig, ChatSession, PlainTextRenderer, ReplyTracker, help_text,
    parse_command,
};
use colloquy::{ChatController, SendOutcome};

/// Main entry point for the colloquy-chat application.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let (args, _) = ChatArgs::from_command_line_relaxed("colloquy-chat [OPTIONS]");
    let config = ChatConfig::try_from(args)?;
    let renderer = PlainTextRenderer::with_color(config.use_color);

    let mut session = match ChatSession::open(&config).await {
        Ok(session) => session,
        Err(err) => {
            renderer.print_error(&format!("Failed to start: {err}"));
            renderer.print_info(&format!(
                "Provider settings live in {}",
                config.settings_path.display()
            ));
            std::process::exit(1);
        }
    };
    let mut rl = DefaultEditor::new()?;

    // Ctrl+C during a reply stops the reply, not the program.
    let interrupt = Arc::clone(session.controller());
    ctrlc::set_handler(move || interrupt.abort())?;

    println!(
        "Colloquy Chat (provider: {}, model: {})",
        session.provider(),
        session.model().await
    );
    println!("Type /help for commands, /quit to exit\n");

    loop {
        let readline = rl.readline("You: ");

        match readline {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() && session.attachments().is_empty() {
                    continue;
                }
                if !line.is_empty() {
                    let _ = rl.add_history_entry(line);
                }

                if let Some(cmd) = parse_command(line) {
                    match cmd {
                        ChatCommand::Quit => {
                            println!("Goodbye!");
                            break;
                        }
                        ChatCommand::Clear => {
                            session.clear();
                            renderer.print_info("Conversation cleared.");
                        }
                        ChatCommand::Help => {
                            for line in help_text().lines() {
                                println!("    {}", line);
                            }
                        }
                        ChatCommand::Attach(path) => match session.attach(&path).await {
                            Ok(()) => renderer.print_info(&format!(
                                "Attached {path} ({} queued)",
                                session.attachments().len()
                            )),
                            Err(err) => renderer.print_error(&err.to_string()),
                        },
                        ChatCommand::Detach => {
                            let dropped = session.detach();
                            renderer.print_info(&format!("Dropped {dropped} attachment(s)."));
                        }
                        ChatCommand::Attachments => {
                            if session.attachments().is_empty() {
                                renderer.print_info("No attachments queued.");
                            }
                            for path in session.attachments() {
                                println!("    {}", path.display());
                            }
                        }
                        ChatCommand::Provider(kind) => match session.switch_provider(kind).await {
                            Ok(()) => renderer.print_info(&format!(
                                "Provider changed to: {kind} (model: {})",
                                session.model().await
                            )),
                            Err(err) => renderer.print_error(&err.to_string()),
                        },
                        ChatCommand::Invalid(msg) => renderer.print_error(&msg),
                    }
                    continue;
                }

                let attachments = session.take_attachments();
                stream_reply(session.controller(), &renderer, line, attachments).await;
            }
            Err(ReadlineError::Interrupted) => {
                // Ctrl+C at the prompt clears the line.
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("Goodbye!");
                break;
            }
            Err(err) => {
                renderer.print_error(&format!("Error reading input: {err}"));
                break;
            }
        }
    }

    Ok(())
}

/// Sends one message and prints the reply as it streams in.
async fn stream_reply(
    controller: &Arc<ChatController>,
    renderer: &PlainTextRenderer,
    text: &str,
    attachments: Vec<colloquy::Attachment>,
) {
    let mut updates = controller.subscribe();
    let mut tracker = ReplyTracker::begin(&updates.borrow_and_update());

    let sender = Arc::clone(controller);
    let text = text.to_string();
    let mut send = tokio::spawn(async move { sender.send(&text, &attachments).await });

    renderer.start_reply();
    let result = loop {
        tokio::select! {
            result = &mut send => break result,
            changed = updates.changed() => {
                if changed.is_err() {
                    break (&mut send).await;
                }
                let fresh = tracker.advance(&updates.borrow_and_update());
                if let Some(fresh) = fresh {
                    renderer.print_text(&fresh);
                }
            }
        }
    };
    if let Some(fresh) = tracker.advance(&controller.snapshot()) {
        renderer.print_text(&fresh);
    }

    match result {
        Ok(Ok(SendOutcome::Completed)) => renderer.finish_reply(false),
        Ok(Ok(SendOutcome::Aborted | SendOutcome::Superseded)) => renderer.finish_reply(true),
        Ok(Ok(SendOutcome::Failed(kind))) => {
            renderer.finish_reply(false);
            renderer.print_error(&kind.to_string());
        }
        Ok(Err(err)) => {
            renderer.finish_reply(false);
            renderer.print_error(&err.to_string());
        }
        Err(err) => {
            renderer.finish_reply(false);
            renderer.print_error(&format!("send task failed: {err}"));
        }
    }
}
