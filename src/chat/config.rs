//! Configuration types for the chat application.
//!
//! This module provides CLI argument parsing via `arrrg` and the resolved
//! configuration the binary runs with.

use std::path::PathBuf;

use arrrg_derive::CommandLine;

use crate::settings::ProviderKind;
use crate::{Error, Result};

/// Settings file used when `--settings` is not given.
pub const DEFAULT_SETTINGS_PATH: &str = ".settings.json";

/// Command-line arguments for the colloquy-chat tool.
#[derive(CommandLine, Debug, Default, PartialEq, Eq)]
pub struct ChatArgs {
    /// Provider to talk to.
    #[arrrg(optional, "Provider: ollama, groq or google (default: ollama)", "PROVIDER")]
    pub provider: Option<String>,

    /// Path to the settings file.
    #[arrrg(optional, "Settings file (default: .settings.json)", "PATH")]
    pub settings: Option<String>,

    /// Model override for this run.
    #[arrrg(optional, "Model to use instead of the configured one", "MODEL")]
    pub model: Option<String>,

    /// Disable ANSI colors and styles.
    #[arrrg(flag, "Disable ANSI colors/styles")]
    pub no_color: bool,
}

/// Configuration for a chat run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatConfig {
    /// The provider to start with.
    pub provider: ProviderKind,

    /// Where provider settings are loaded from.
    pub settings_path: PathBuf,

    /// Model override applied to whichever provider is active.
    pub model: Option<String>,

    /// Whether to use ANSI colors and styles in output.
    pub use_color: bool,
}

impl ChatConfig {
    /// Creates a ChatConfig with default values.
    ///
    /// Defaults:
    /// - Provider: ollama
    /// - Settings: `.settings.json`
    /// - Color: enabled
    pub fn new() -> Self {
        Self {
            provider: ProviderKind::Ollama,
            settings_path: PathBuf::from(DEFAULT_SETTINGS_PATH),
            model: None,
            use_color: true,
        }
    }

    /// Sets the provider.
    pub fn with_provider(mut self, provider: ProviderKind) -> Self {
        self.provider = provider;
        self
    }

    /// Sets the settings path.
    pub fn with_settings_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.settings_path = path.into();
        self
    }

    /// Sets the model override.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Disables ANSI color output.
    pub fn without_color(mut self) -> Self {
        self.use_color = false;
        self
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl TryFrom<ChatArgs> for ChatConfig {
    type Error = Error;

    fn try_from(args: ChatArgs) -> Result<Self> {
        let provider = match args.provider.as_deref() {
            Some(name) => name.parse()?,
            None => ProviderKind::Ollama,
        };
        Ok(ChatConfig {
            provider,
            settings_path: args
                .settings
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SETTINGS_PATH)),
            model: args.model.filter(|model| !model.trim().is_empty()),
            use_color: !args.no_color,
        })
    }
}
