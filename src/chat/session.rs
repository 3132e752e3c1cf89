//! Chat session management.
//!
//! [`ChatSession`] wires a [`ChatController`] to the settings-backed provider
//! resolver and keeps the attachments queued for the next message.

use std::path::PathBuf;
use std::sync::Arc;

use crate::attachment::Attachment;
use crate::chat::config::ChatConfig;
use crate::controller::ChatController;
use crate::settings::{ProviderKind, ProviderResolver, SettingsStore};
use crate::{Error, Result};

/// A conversation plus the front-end state around it.
pub struct ChatSession {
    controller: Arc<ChatController>,
    resolver: ProviderResolver,
    provider: ProviderKind,
    model: Option<String>,
    attachments: Vec<PathBuf>,
}

impl ChatSession {
    /// Opens a session for `config`, resolving its provider from the settings file.
    pub async fn open(config: &ChatConfig) -> Result<Self> {
        let store = Arc::new(SettingsStore::new(config.settings_path.clone()));
        let resolver = ProviderResolver::new(store);
        let model = config.model.clone();
        let provider = resolve(&resolver, config.provider, model.as_deref()).await?;
        Ok(Self {
            controller: Arc::new(ChatController::new(provider)),
            resolver,
            provider: config.provider,
            model,
            attachments: Vec::new(),
        })
    }

    /// The controller driving this conversation.
    pub fn controller(&self) -> &Arc<ChatController> {
        &self.controller
    }

    /// The active provider.
    pub fn provider(&self) -> ProviderKind {
        self.provider
    }

    /// The model the active provider is using.
    pub async fn model(&self) -> String {
        match &self.model {
            Some(model) => model.clone(),
            None => self
                .resolver
                .store()
                .settings()
                .await
                .model(self.provider)
                .to_string(),
        }
    }

    /// Switches to `kind` for subsequent messages. The model override is dropped.
    pub async fn switch_provider(&mut self, kind: ProviderKind) -> Result<()> {
        let provider = resolve(&self.resolver, kind, None).await?;
        self.controller.set_provider(provider);
        self.provider = kind;
        self.model = None;
        Ok(())
    }

    /// Queues the image at `path` for the next message.
    pub async fn attach(&mut self, path: impl Into<PathBuf>) -> Result<()> {
        let path = path.into();
        let metadata = tokio::fs::metadata(&path).await.map_err(|e| {
            Error::validation(
                format!("cannot attach {}: {e}", path.display()),
                Some("path".to_string()),
            )
        })?;
        if !metadata.is_file() {
            return Err(Error::validation(
                format!("cannot attach {}: not a file", path.display()),
                Some("path".to_string()),
            ));
        }
        self.attachments.push(path);
        Ok(())
    }

    /// Drops queued attachments, returning how many there were.
    pub fn detach(&mut self) -> usize {
        let count = self.attachments.len();
        self.attachments.clear();
        count
    }

    /// Paths queued for the next message.
    pub fn attachments(&self) -> &[PathBuf] {
        &self.attachments
    }

    /// Takes the queued attachments for a send.
    pub fn take_attachments(&mut self) -> Vec<Attachment> {
        self.attachments
            .drain(..)
            .map(Attachment::from_path)
            .collect()
    }

    /// Clears the conversation and queued attachments.
    pub fn clear(&mut self) {
        self.controller.reset();
        self.attachments.clear();
    }
}

async fn resolve(
    resolver: &ProviderResolver,
    kind: ProviderKind,
    model: Option<&str>,
) -> Result<Arc<dyn crate::provider::ModelProvider>> {
    let mut settings = resolver.store().settings().await;
    if let Some(model) = model {
        settings.set_model(kind, model);
    }
    ProviderResolver::build(kind, &settings)
}
