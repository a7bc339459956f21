//! Application configuration for coursepress.
//!
//! User config lives at `~/.coursepress/coursepress.toml`.
//! CLI flags override config file values, which override defaults.
//! Secrets never live in the file: it only names the env vars that hold them.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{PublishError, Result};
use crate::options::GenerationOptions;
use crate::types::ContentGenerationMethod;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "coursepress.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".coursepress";

// ---------------------------------------------------------------------------
// Config structs (matching coursepress.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Remote object store (the CMS).
    #[serde(default)]
    pub remote: RemoteConfig,

    /// Primary text-generation provider.
    #[serde(default = "default_primary_provider")]
    pub primary_provider: ProviderConfig,

    /// Search-capable provider for web context and references.
    #[serde(default = "default_web_provider")]
    pub web_provider: ProviderConfig,

    /// Publish behaviour.
    #[serde(default)]
    pub publish: PublishConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            remote: RemoteConfig::default(),
            primary_provider: default_primary_provider(),
            web_provider: default_web_provider(),
            publish: PublishConfig::default(),
        }
    }
}

/// `[remote]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// REST root of the remote store, e.g. `https://cms.example.com/wp-json`.
    #[serde(default)]
    pub base_url: String,

    /// Principal used for basic auth.
    #[serde(default)]
    pub username: String,

    /// Name of the env var holding the application password.
    #[serde(default = "default_remote_password_env")]
    pub password_env: String,

    /// Namespace the typed collections live under.
    #[serde(default = "default_api_root")]
    pub api_root: String,

    /// Endpoint that links a parent to a child. Defaults to `<base_url>/coursepress/v1/link`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_webhook_url: Option<String>,

    /// Per-level collection names.
    #[serde(default)]
    pub collections: CollectionsConfig,

    /// Per-request timeout. Unset means a call may take as long as it takes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            username: String::new(),
            password_env: default_remote_password_env(),
            api_root: default_api_root(),
            link_webhook_url: None,
            collections: CollectionsConfig::default(),
            timeout_secs: None,
        }
    }
}

fn default_remote_password_env() -> String {
    "COURSEPRESS_REMOTE_PASSWORD".into()
}
fn default_api_root() -> String {
    "wp/v2".into()
}

/// `[remote.collections]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionsConfig {
    #[serde(default = "default_root_collection")]
    pub root: String,
    #[serde(default = "default_chapter_collection")]
    pub chapter: String,
    #[serde(default = "default_topic_collection")]
    pub topic: String,
    #[serde(default = "default_lesson_collection")]
    pub lesson: String,
}

impl Default for CollectionsConfig {
    fn default() -> Self {
        Self {
            root: default_root_collection(),
            chapter: default_chapter_collection(),
            topic: default_topic_collection(),
            lesson: default_lesson_collection(),
        }
    }
}

fn default_root_collection() -> String {
    "books".into()
}
fn default_chapter_collection() -> String {
    "chapters".into()
}
fn default_topic_collection() -> String {
    "topics".into()
}
fn default_lesson_collection() -> String {
    "lessons".into()
}

/// `[primary_provider]` / `[web_provider]` sections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// API base URL (OpenAI-compatible).
    pub base_url: String,

    /// Name of the env var holding the primary API key.
    pub api_key_env: String,

    /// Name of the env var holding the fallback API key, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_api_key_env: Option<String>,

    /// Default generation options for this provider.
    #[serde(default)]
    pub options: GenerationOptions,

    /// Per-request timeout. Unset means no timeout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

fn default_primary_provider() -> ProviderConfig {
    ProviderConfig {
        base_url: "https://api.openai.com/v1".into(),
        api_key_env: "OPENAI_API_KEY".into(),
        fallback_api_key_env: Some("OPENAI_FALLBACK_API_KEY".into()),
        options: GenerationOptions::default(),
        timeout_secs: None,
    }
}

fn default_web_provider() -> ProviderConfig {
    ProviderConfig {
        base_url: "https://api.perplexity.ai".into(),
        api_key_env: "PERPLEXITY_API_KEY".into(),
        fallback_api_key_env: Some("PERPLEXITY_FALLBACK_API_KEY".into()),
        options: GenerationOptions::default(),
        timeout_secs: None,
    }
}

/// Which node keys a lesson's library lookup consults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LibraryInheritance {
    /// Lesson key, then chapter key. Topic keys are stored but ignored.
    #[default]
    LessonChapter,
    /// Lesson key, then topic key, then chapter key.
    LessonTopicChapter,
}

/// `[publish]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PublishConfig {
    /// Used when the outline does not say.
    #[serde(default)]
    pub content_generation_method: ContentGenerationMethod,

    /// Used when the outline does not say.
    #[serde(default)]
    pub include_web_references: bool,

    #[serde(default)]
    pub library_inheritance: LibraryInheritance,
}

// ---------------------------------------------------------------------------
// Credentials (resolved from env vars named in the config)
// ---------------------------------------------------------------------------

/// A secret API key. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

/// Primary + optional fallback key for one provider.
#[derive(Debug, Clone, Default)]
pub struct CredentialPair {
    pub primary: Option<ApiKey>,
    pub fallback: Option<ApiKey>,
}

impl CredentialPair {
    pub fn new(primary: Option<ApiKey>, fallback: Option<ApiKey>) -> Self {
        Self { primary, fallback }
    }

    pub fn is_empty(&self) -> bool {
        self.primary.is_none() && self.fallback.is_none()
    }
}

/// Username + application password for the remote store.
#[derive(Clone)]
pub struct RemoteCredentials {
    pub username: String,
    pub password: ApiKey,
}

impl std::fmt::Debug for RemoteCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteCredentials")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// Every credential a publish run may use.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub remote: RemoteCredentials,
    pub primary: CredentialPair,
    /// Present when at least one web provider key is set.
    pub web: Option<CredentialPair>,
}

/// Resolve credentials from the process environment.
pub fn resolve_credentials(
    config: &AppConfig,
    method: ContentGenerationMethod,
) -> Result<Credentials> {
    resolve_credentials_with(config, method, env_lookup)
}

/// Resolve credentials through `lookup` and enforce what `method` requires.
///
/// Fails before any remote call when a required credential class is absent.
pub fn resolve_credentials_with(
    config: &AppConfig,
    method: ContentGenerationMethod,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<Credentials> {
    let remote = resolve_remote_with(&config.remote, &lookup)?;

    let primary = provider_keys_with(&config.primary_provider, &lookup);
    if primary.is_empty() {
        return Err(PublishError::config(format!(
            "primary provider API key not found. Set the {} environment variable.",
            config.primary_provider.api_key_env
        )));
    }

    let web = Some(provider_keys_with(&config.web_provider, &lookup)).filter(|p| !p.is_empty());
    if method.uses_web_context() && web.is_none() {
        return Err(PublishError::config(format!(
            "hybrid generation needs a web provider key. Set the {} environment variable.",
            config.web_provider.api_key_env
        )));
    }

    Ok(Credentials {
        remote,
        primary,
        web,
    })
}

/// Remote-store credentials alone, for commands that never call a provider.
pub fn resolve_remote_credentials(config: &RemoteConfig) -> Result<RemoteCredentials> {
    resolve_remote_with(config, &env_lookup)
}

/// Primary/fallback keys for one provider. Empty when neither env var is set.
pub fn provider_keys(provider: &ProviderConfig) -> CredentialPair {
    provider_keys_with(provider, &env_lookup)
}

fn env_lookup(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

fn lookup_key(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<ApiKey> {
    lookup(name).filter(|v| !v.trim().is_empty()).map(ApiKey::new)
}

fn resolve_remote_with(
    remote: &RemoteConfig,
    lookup: &impl Fn(&str) -> Option<String>,
) -> Result<RemoteCredentials> {
    if remote.base_url.trim().is_empty() {
        return Err(PublishError::config(
            "remote store not configured. Set [remote].base_url in coursepress.toml",
        ));
    }
    Url::parse(&remote.base_url).map_err(|e| {
        PublishError::config(format!("invalid [remote].base_url '{}': {e}", remote.base_url))
    })?;
    if remote.username.trim().is_empty() {
        return Err(PublishError::config(
            "remote store username not configured. Set [remote].username",
        ));
    }
    let password = lookup_key(lookup, &remote.password_env).ok_or_else(|| {
        PublishError::config(format!(
            "remote store password not found. Set the {} environment variable.",
            remote.password_env
        ))
    })?;

    Ok(RemoteCredentials {
        username: remote.username.clone(),
        password,
    })
}

fn provider_keys_with(
    provider: &ProviderConfig,
    lookup: &impl Fn(&str) -> Option<String>,
) -> CredentialPair {
    CredentialPair::new(
        lookup_key(lookup, &provider.api_key_env),
        provider
            .fallback_api_key_env
            .as_deref()
            .and_then(|name| lookup_key(lookup, name)),
    )
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.coursepress/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| PublishError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.coursepress/coursepress.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| PublishError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| PublishError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| PublishError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| PublishError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| PublishError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
