//! Provider settings and the resolver that turns them into providers.
//!
//! Settings live in a JSON file shaped like
//!
//! ```json
//! {"app_settings": {"providers": {
//!     "ollama": {"base_url": "http://localhost:11434/v1/", "model": "llama3.2"},
//!     "groq": {"api_key": "", "model": "llama-3.3-70b-versatile"},
//!     "google": {"api_key": "", "model": "gemini-1.5-flash"}
//! }}}
//! ```
//!
//! The file is read at most once per [`SettingsStore`]; later reads are served
//! from memory.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::provider::{GoogleGenerativeAi, ModelProvider, OpenAiCompatible};
use crate::provider::{GOOGLE_BASE_URL, OLLAMA_BASE_URL};
use crate::{Error, Result};

/// Default Ollama model.
pub const DEFAULT_OLLAMA_MODEL: &str = "llama3.2";
/// Default Groq model.
pub const DEFAULT_GROQ_MODEL: &str = "llama-3.3-70b-versatile";
/// Default Gemini model.
pub const DEFAULT_GOOGLE_MODEL: &str = "gemini-1.5-flash";

/////////////////////////////////////////// ProviderKind ///////////////////////////////////////////

/// The providers the settings file knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// A local Ollama server.
    Ollama,
    /// Groq's hosted API.
    Groq,
    /// Google's Generative Language API.
    Google,
}

impl ProviderKind {
    /// Every provider kind, in display order.
    pub const ALL: [ProviderKind; 3] = [ProviderKind::Ollama, ProviderKind::Groq, ProviderKind::Google];

    /// The lowercase name used on the command line and in the settings file.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Ollama => "ollama",
            ProviderKind::Groq => "groq",
            ProviderKind::Google => "google",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ollama" => Ok(ProviderKind::Ollama),
            "groq" => Ok(ProviderKind::Groq),
            "google" | "gemini" => Ok(ProviderKind::Google),
            other => Err(Error::configuration(
                format!("unknown provider {other:?}; expected ollama, groq or google"),
                Some("provider".to_string()),
            )),
        }
    }
}

/////////////////////////////////////////// AppSettings ////////////////////////////////////////////

/// Settings for a local Ollama server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OllamaSettings {
    /// OpenAI-compatible endpoint, e.g. `http://localhost:11434/v1/`.
    #[serde(default = "default_ollama_base_url")]
    pub base_url: String,
    /// Model name.
    #[serde(default = "default_ollama_model")]
    pub model: String,
}

impl Default for OllamaSettings {
    fn default() -> Self {
        Self {
            base_url: default_ollama_base_url(),
            model: default_ollama_model(),
        }
    }
}

/// Settings for Groq.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroqSettings {
    /// API key; empty until the user provides one.
    #[serde(default)]
    pub api_key: String,
    /// Model name.
    #[serde(default = "default_groq_model")]
    pub model: String,
}

impl Default for GroqSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: default_groq_model(),
        }
    }
}

/// Settings for Google's Generative Language API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoogleSettings {
    /// API key; empty until the user provides one.
    #[serde(default)]
    pub api_key: String,
    /// Model name.
    #[serde(default = "default_google_model")]
    pub model: String,
}

impl Default for GoogleSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: default_google_model(),
        }
    }
}

/// Per-provider settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// Ollama.
    #[serde(default)]
    pub ollama: OllamaSettings,
    /// Groq.
    #[serde(default)]
    pub groq: GroqSettings,
    /// Google.
    #[serde(default)]
    pub google: GoogleSettings,
}

/// Everything the application persists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppSettings {
    /// Provider settings keyed by provider name.
    #[serde(default)]
    pub providers: ProviderSettings,
}

impl AppSettings {
    /// The model configured for `kind`.
    pub fn model(&self, kind: ProviderKind) -> &str {
        match kind {
            ProviderKind::Ollama => &self.providers.ollama.model,
            ProviderKind::Groq => &self.providers.groq.model,
            ProviderKind::Google => &self.providers.google.model,
        }
    }

    /// Overrides the model configured for `kind`.
    pub fn set_model(&mut self, kind: ProviderKind, model: impl Into<String>) {
        let model = model.into();
        match kind {
            ProviderKind::Ollama => self.providers.ollama.model = model,
            ProviderKind::Groq => self.providers.groq.model = model,
            ProviderKind::Google => self.providers.google.model = model,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SettingsFile {
    #[serde(default)]
    app_settings: Option<AppSettings>,
}

fn default_ollama_base_url() -> String {
    OLLAMA_BASE_URL.to_string()
}

fn default_ollama_model() -> String {
    DEFAULT_OLLAMA_MODEL.to_string()
}

fn default_groq_model() -> String {
    DEFAULT_GROQ_MODEL.to_string()
}

fn default_google_model() -> String {
    DEFAULT_GOOGLE_MODEL.to_string()
}

////////////////////////////////////////// SettingsStore ///////////////////////////////////////////

/// Loads settings from disk once and caches them.
#[derive(Debug)]
pub struct SettingsStore {
    path: PathBuf,
    cached: Mutex<Option<AppSettings>>,
}

impl SettingsStore {
    /// A store backed by `path`. Nothing is read until [`SettingsStore::settings`].
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cached: Mutex::new(None),
        }
    }

    /// The backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The current settings, loading them on first use.
    ///
    /// A missing file or one without settings yields the defaults, which are
    /// then written back. An unreadable or malformed file yields the defaults
    /// and is left untouched.
    pub async fn settings(&self) -> AppSettings {
        let mut cached = self.cached.lock().await;
        self.ensure_loaded(&mut cached).await.clone()
    }

    /// Applies `f` to the settings and saves them.
    pub async fn update<F>(&self, f: F) -> Result<AppSettings>
    where
        F: FnOnce(&mut AppSettings),
    {
        let mut cached = self.cached.lock().await;
        let settings = self.ensure_loaded(&mut cached).await;
        f(settings);
        let settings = settings.clone();
        write_settings(&self.path, &settings).await?;
        Ok(settings)
    }

    /// Writes the current settings to disk.
    pub async fn save(&self) -> Result<()> {
        let mut cached = self.cached.lock().await;
        let settings = self.ensure_loaded(&mut cached).await.clone();
        write_settings(&self.path, &settings).await
    }

    async fn ensure_loaded<'a>(&self, cached: &'a mut Option<AppSettings>) -> &'a mut AppSettings {
        if cached.is_none() {
            *cached = Some(self.load().await);
        }
        cached.get_or_insert_with(AppSettings::default)
    }

    async fn load(&self) -> AppSettings {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return self.create_defaults().await;
            }
            Err(err) => {
                tracing::warn!(path = %self.path.display(), error = %err, "failed to load settings; using defaults");
                return AppSettings::default();
            }
        };
        match serde_json::from_str::<SettingsFile>(&contents) {
            Ok(SettingsFile {
                app_settings: Some(settings),
            }) => {
                tracing::debug!(path = %self.path.display(), "loaded settings");
                settings
            }
            Ok(SettingsFile { app_settings: None }) => self.create_defaults().await,
            Err(err) => {
                tracing::warn!(path = %self.path.display(), error = %err, "failed to parse settings; using defaults");
                AppSettings::default()
            }
        }
    }

    async fn create_defaults(&self) -> AppSettings {
        let settings = AppSettings::default();
        if let Err(err) = write_settings(&self.path, &settings).await {
            tracing::warn!(path = %self.path.display(), error = %err, "failed to save settings");
        } else {
            tracing::info!(path = %self.path.display(), "wrote default settings");
        }
        settings
    }
}

async fn write_settings(path: &Path, settings: &AppSettings) -> Result<()> {
    let file = SettingsFile {
        app_settings: Some(settings.clone()),
    };
    let json = serde_json::to_string_pretty(&file)?;
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await.map_err(|e| {
            Error::io(format!("failed to create {}", parent.display()), e)
        })?;
    }
    tokio::fs::write(path, json)
        .await
        .map_err(|e| Error::io(format!("failed to write {}", path.display()), e))
}

///////////////////////////////////////// ProviderResolver /////////////////////////////////////////

/// Builds ready-to-use providers from stored settings.
#[derive(Debug, Clone)]
pub struct ProviderResolver {
    store: Arc<SettingsStore>,
}

impl ProviderResolver {
    /// A resolver reading from `store`.
    pub fn new(store: Arc<SettingsStore>) -> Self {
        Self { store }
    }

    /// The underlying settings store.
    pub fn store(&self) -> &Arc<SettingsStore> {
        &self.store
    }

    /// A provider for `kind` configured from the stored settings.
    ///
    /// Hosted providers without an API key fail with [`Error::Configuration`].
    pub async fn resolve(&self, kind: ProviderKind) -> Result<Arc<dyn ModelProvider>> {
        let settings = self.store.settings().await;
        Self::build(kind, &settings)
    }

    /// Like [`resolve`](Self::resolve) from explicit settings.
    pub fn build(kind: ProviderKind, settings: &AppSettings) -> Result<Arc<dyn ModelProvider>> {
        let provider: Arc<dyn ModelProvider> = match kind {
            ProviderKind::Ollama => {
                let ollama = &settings.providers.ollama;
                Arc::new(OpenAiCompatible::ollama(&ollama.base_url, ollama.model.clone())?)
            }
            ProviderKind::Groq => {
                let groq = &settings.providers.groq;
                require_key(kind, &groq.api_key)?;
                Arc::new(OpenAiCompatible::groq(groq.api_key.clone(), groq.model.clone())?)
            }
            ProviderKind::Google => {
                let google = &settings.providers.google;
                require_key(kind, &google.api_key)?;
                Arc::new(GoogleGenerativeAi::with_base_url(
                    GOOGLE_BASE_URL,
                    google.api_key.clone(),
                    google.model.clone(),
                    crate::provider::DEFAULT_CONNECT_TIMEOUT,
                )?)
            }
        };
        tracing::debug!(provider = %kind, model = settings.model(kind), "resolved provider");
        Ok(provider)
    }
}

fn require_key(kind: ProviderKind, api_key: &str) -> Result<()> {
    if api_key.trim().is_empty() {
        return Err(Error::configuration(
            format!("no API key configured for {kind}"),
            Some(format!("providers.{kind}.api_key")),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "colloquy-settings-{}-{}",
            std::process::id(),
            name
        ));
        let _ = std::fs::remove_dir_all(&dir);
        dir.join("settings.json")
    }

    #[test]
    fn provider_kind_parses() {
        assert_eq!("ollama".parse::<ProviderKind>().unwrap(), ProviderKind::Ollama);
        assert_eq!(" Groq ".parse::<ProviderKind>().unwrap(), ProviderKind::Groq);
        assert_eq!("google".parse::<ProviderKind>().unwrap(), ProviderKind::Google);
        let err = "openai".parse::<ProviderKind>().unwrap_err();
        assert!(err.is_configuration());
        assert_eq!(ProviderKind::Google.to_string(), "google");
    }

    #[test]
    fn defaults_match_file_layout() {
        let file = SettingsFile {
            app_settings: Some(AppSettings::default()),
        };
        let value = serde_json::to_value(&file).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"app_settings": {"providers": {
                "ollama": {"base_url": "http://localhost:11434/v1/", "model": "llama3.2"},
                "groq": {"api_key": "", "model": "llama-3.3-70b-versatile"},
                "google": {"api_key": "", "model": "gemini-1.5-flash"}
            }}})
        );
    }

    #[tokio::test]
    async fn missing_file_writes_defaults() {
        let path = temp_path("missing");
        let store = SettingsStore::new(&path);
        assert_eq!(store.settings().await, AppSettings::default());
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("app_settings"));
        std::fs::remove_dir_all(path.parent().unwrap()).unwrap();
    }

    #[tokio::test]
    async fn malformed_file_yields_defaults_and_is_kept() {
        let path = temp_path("malformed");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{not json").unwrap();

        let store = SettingsStore::new(&path);
        assert_eq!(store.settings().await, AppSettings::default());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{not json");
        std::fs::remove_dir_all(path.parent().unwrap()).unwrap();
    }

    #[tokio::test]
    async fn partial_file_fills_in_defaults() {
        let path = temp_path("partial");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(
            &path,
            r#"{"app_settings":{"providers":{"groq":{"api_key":"gsk"}}}}"#,
        )
        .unwrap();

        let settings = SettingsStore::new(&path).settings().await;
        assert_eq!(settings.providers.groq.api_key, "gsk");
        assert_eq!(settings.providers.groq.model, DEFAULT_GROQ_MODEL);
        assert_eq!(settings.providers.ollama, OllamaSettings::default());
        std::fs::remove_dir_all(path.parent().unwrap()).unwrap();
    }

    #[tokio::test]
    async fn settings_are_cached_after_first_load() {
        let path = temp_path("cached");
        let store = SettingsStore::new(&path);
        let first = store.settings().await;
        std::fs::write(&path, r#"{"app_settings":{"providers":{"groq":{"api_key":"changed"}}}}"#)
            .unwrap();
        assert_eq!(store.settings().await, first);
        std::fs::remove_dir_all(path.parent().unwrap()).unwrap();
    }

    #[tokio::test]
    async fn update_persists() {
        let path = temp_path("update");
        let store = SettingsStore::new(&path);
        store
            .update(|settings| settings.providers.google.api_key = "g-key".to_string())
            .await
            .unwrap();

        let reloaded = SettingsStore::new(&path).settings().await;
        assert_eq!(reloaded.providers.google.api_key, "g-key");
        std::fs::remove_dir_all(path.parent().unwrap()).unwrap();
    }

    #[tokio::test]
    async fn resolve_requires_hosted_keys() {
        let path = temp_path("resolve");
        let resolver = ProviderResolver::new(Arc::new(SettingsStore::new(&path)));

        let ollama = resolver.resolve(ProviderKind::Ollama).await.unwrap();
        assert_eq!(ollama.name(), "ollama");
        let err = match resolver.resolve(ProviderKind::Groq).await {
            Ok(_) => panic!("groq without a key must not resolve"),
            Err(err) => err,
        };
        assert!(err.is_configuration());
        assert!(resolver.resolve(ProviderKind::Google).await.is_err());

        resolver
            .store()
            .update(|settings| settings.providers.groq.api_key = "gsk".to_string())
            .await
            .unwrap();
        let groq = resolver.resolve(ProviderKind::Groq).await.unwrap();
        assert_eq!(groq.name(), "groq");
        std::fs::remove_dir_all(path.parent().unwrap()).unwrap();
    }

    #[test]
    fn model_override() {
        let mut settings = AppSettings::default();
        settings.set_model(ProviderKind::Ollama, "qwen2.5");
        assert_eq!(settings.model(ProviderKind::Ollama), "qwen2.5");
        assert_eq!(settings.model(ProviderKind::Google), DEFAULT_GOOGLE_MODEL);
    }
}
