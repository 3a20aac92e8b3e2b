//! TOML Configuration File Support
//!
//! Configuration loading for the reader, from a TOML file at
//! `~/.config/arcana/reader.toml`.
//!
//! # Configuration Priority
//!
//! Configuration values are loaded with the following priority (highest first):
//! 1. CLI arguments (applied with [`ConfigOverrides`])
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! # XDG Base Directory Compliance
//!
//! - `$XDG_CONFIG_HOME/arcana/reader.toml` (typically `~/.config/arcana/reader.toml`)
//! - `ARCANA_CONFIG` points somewhere else
//!
//! # Example Configuration
//!
//! ```toml
//! [service]
//! backend = "gemini"
//! model = "gemini-2.5-flash-preview-04-17"
//! api_key = "..."
//!
//! [ollama]
//! host = "localhost"
//! port = 11434
//!
//! [reading]
//! language = "zh-Hant"
//! auto_interpret = false
//! max_message_chars = 4000
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backend::BackendConfig;
use crate::conductor::{ReaderConfig, DEFAULT_MAX_MESSAGE_CHARS, DEFAULT_MODEL};
use crate::language::Language;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Tracks where a configuration value came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// Service section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceToml {
    /// Backend kind: `gemini` or `ollama`
    pub backend: Option<String>,

    /// Model identifier
    pub model: Option<String>,

    /// Gemini API key
    pub api_key: Option<String>,

    /// Gemini base URL
    pub base_url: Option<String>,
}

/// Ollama section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaToml {
    /// Ollama host
    pub host: Option<String>,

    /// Ollama port
    pub port: Option<u16>,
}

/// Reading section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadingToml {
    /// Working language tag
    pub language: Option<String>,

    /// Request the interpretation as soon as the spread is complete
    pub auto_interpret: Option<bool>,

    /// Longest chat message accepted, in characters
    pub max_message_chars: Option<usize>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ArcanaToml {
    /// Service configuration section
    pub service: ServiceToml,

    /// Ollama configuration section
    pub ollama: OllamaToml,

    /// Reading configuration section
    pub reading: ReadingToml,
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// Model used with Ollama when none is configured
pub const DEFAULT_OLLAMA_MODEL: &str = "llama3.2";

/// Backend kinds the reader can talk to
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BackendKind {
    /// Google Gemini REST API
    #[default]
    Gemini,
    /// Local Ollama server
    Ollama,
}

impl BackendKind {
    /// Model used with this backend unless one is configured
    #[must_use]
    pub fn default_model(self) -> &'static str {
        match self {
            Self::Gemini => DEFAULT_MODEL,
            Self::Ollama => DEFAULT_OLLAMA_MODEL,
        }
    }
}

impl std::str::FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "gemini" => Ok(Self::Gemini),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::ValidationError(format!(
                "unknown backend '{other}' (expected gemini or ollama)"
            ))),
        }
    }
}

/// Centralized configuration for the reader
///
/// Use [`load_config`] to load it with proper priority handling.
#[derive(Clone, Debug)]
pub struct ArcanaConfig {
    /// Which backend to use
    pub backend: BackendKind,

    /// Model identifier
    pub model: String,

    /// Gemini API key (empty when not configured)
    pub api_key: String,

    /// Gemini base URL override
    pub base_url: Option<String>,

    /// Ollama host
    pub ollama_host: String,

    /// Ollama port
    pub ollama_port: u16,

    /// Working language
    pub language: Language,

    /// Request the interpretation as soon as the spread is complete
    pub auto_interpret: bool,

    /// Longest chat message accepted, in characters
    pub max_message_chars: usize,

    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,

    /// Source of configuration values
    source: ConfigSource,

    /// Whether the model was set by the file, the environment or the CLI
    model_explicit: bool,
}

impl Default for ArcanaConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Gemini,
            model: DEFAULT_MODEL.to_string(),
            api_key: String::new(),
            base_url: None,
            ollama_host: "localhost".to_string(),
            ollama_port: 11434,
            language: Language::default(),
            auto_interpret: false,
            max_message_chars: DEFAULT_MAX_MESSAGE_CHARS,
            config_file_path: None,
            source: ConfigSource::Default,
            model_explicit: false,
        }
    }
}

impl ArcanaConfig {
    /// Create a new configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the primary source of this configuration
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Set the configuration source
    pub fn set_source(&mut self, source: ConfigSource) {
        self.source = source;
    }

    /// Backend connection settings
    #[must_use]
    pub fn backend_config(&self) -> BackendConfig {
        match self.backend {
            BackendKind::Gemini => BackendConfig::Gemini {
                api_key: self.api_key.clone(),
                base_url: self.base_url.clone(),
            },
            BackendKind::Ollama => {
                BackendConfig::ollama(self.ollama_host.clone(), self.ollama_port)
            }
        }
    }

    /// Pick the backend's default model unless one was configured
    fn resolve_model(&mut self) {
        if !self.model_explicit {
            self.model = self.backend.default_model().to_string();
        }
    }

    /// Settings the Conductor needs
    #[must_use]
    pub fn reader_config(&self) -> ReaderConfig {
        ReaderConfig {
            model: self.model.clone(),
            language: self.language,
            auto_interpret: self.auto_interpret,
            max_message_chars: self.max_message_chars,
        }
    }

    /// Check values that parse but make no sense
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] for an empty model, a Gemini
    /// model on the Ollama backend or a zero message limit.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model.trim().is_empty() {
            return Err(ConfigError::ValidationError("model must not be empty".into()));
        }
        if self.backend == BackendKind::Ollama && self.model.trim().starts_with("gemini-") {
            return Err(ConfigError::ValidationError(format!(
                "model '{}' is a Gemini model; set a model Ollama serves",
                self.model
            )));
        }
        if self.max_message_chars == 0 {
            return Err(ConfigError::ValidationError(
                "max_message_chars must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `ARCANA_CONFIG` when set, otherwise
/// `$XDG_CONFIG_HOME/arcana/reader.toml`.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("ARCANA_CONFIG") {
        return Some(PathBuf::from(path));
    }
    dirs::config_dir().map(|p| p.join("arcana").join("reader.toml"))
}

/// Load configuration from all sources with proper priority
///
/// CLI overrides are not handled here; apply [`ConfigOverrides`] after.
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed or holds
/// invalid values. A missing config file is not an error.
pub fn load_config() -> Result<ArcanaConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path, then the process environment
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<ArcanaConfig, ConfigError> {
    load_config_with_env(path, |key| std::env::var(key).ok())
}

/// Load configuration from a path and an environment lookup
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed.
pub fn load_config_with_env<F>(path: Option<PathBuf>, env: F) -> Result<ArcanaConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    // Start with defaults
    let mut config = ArcanaConfig::default();

    // Try to load from file
    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: ArcanaToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, &toml_config)?;
            config.config_file_path = Some(config_path.clone());
            config.source = ConfigSource::File;

            tracing::info!(
                path = %config_path.display(),
                "Loaded configuration from file"
            );
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    // Apply environment variables (overrides file values)
    apply_env_config(&mut config, env)?;

    config.resolve_model();
    config.validate()?;
    Ok(config)
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(config: &mut ArcanaConfig, toml: &ArcanaToml) -> Result<(), ConfigError> {
    // Service settings
    if let Some(ref backend) = toml.service.backend {
        config.backend = backend.parse()?;
    }
    if let Some(ref model) = toml.service.model {
        config.model = model.clone();
        config.model_explicit = true;
    }
    if let Some(ref key) = toml.service.api_key {
        config.api_key = key.clone();
    }
    if toml.service.base_url.is_some() {
        config.base_url = toml.service.base_url.clone();
    }

    // Ollama settings
    if let Some(ref host) = toml.ollama.host {
        config.ollama_host = host.clone();
    }
    if let Some(port) = toml.ollama.port {
        config.ollama_port = port;
    }

    // Reading settings
    if let Some(ref language) = toml.reading.language {
        config.language = language.parse().map_err(ConfigError::ValidationError)?;
    }
    if let Some(auto) = toml.reading.auto_interpret {
        config.auto_interpret = auto;
    }
    if let Some(max) = toml.reading.max_message_chars {
        config.max_message_chars = max;
    }

    Ok(())
}

/// Apply environment variable overrides to the config
fn apply_env_config<F>(config: &mut ArcanaConfig, env: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    // Service settings from environment
    if let Some(backend) = env("ARCANA_BACKEND") {
        config.backend = backend.parse()?;
        config.source = ConfigSource::Env;
    }
    if let Some(model) = env("ARCANA_MODEL") {
        config.model = model;
        config.model_explicit = true;
        config.source = ConfigSource::Env;
    }
    if let Some(key) = env("GEMINI_API_KEY").or_else(|| env("API_KEY")) {
        config.api_key = key;
        config.source = ConfigSource::Env;
    }
    if let Some(url) = env("GEMINI_BASE_URL") {
        config.base_url = Some(url);
        config.source = ConfigSource::Env;
    }

    // Ollama settings from environment
    if let Some(host) = env("OLLAMA_HOST") {
        config.ollama_host = host;
        config.source = ConfigSource::Env;
    }
    if let Some(port) = env("OLLAMA_PORT") {
        if let Ok(p) = port.parse::<u16>() {
            config.ollama_port = p;
            config.source = ConfigSource::Env;
        }
    }

    // Reading settings from environment
    if let Some(language) = env("ARCANA_LANGUAGE") {
        config.language = language.parse().map_err(ConfigError::ValidationError)?;
        config.source = ConfigSource::Env;
    }
    if let Some(auto) = env("ARCANA_AUTO_INTERPRET") {
        config.auto_interpret = auto == "1" || auto.to_lowercase() == "true";
        config.source = ConfigSource::Env;
    }
    if let Some(max) = env("ARCANA_MAX_MESSAGE_CHARS") {
        if let Ok(n) = max.parse::<usize>() {
            config.max_message_chars = n;
            config.source = ConfigSource::Env;
        }
    }

    Ok(())
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Builder for applying CLI overrides to configuration
///
/// Use this after [`load_config`] to apply command-line argument overrides.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Backend override
    pub backend: Option<BackendKind>,

    /// Model override
    pub model: Option<String>,

    /// Language override
    pub language: Option<Language>,

    /// Auto-interpret override
    pub auto_interpret: Option<bool>,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set backend override
    #[must_use]
    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Set model override
    #[must_use]
    pub fn with_model(mut self, model: String) -> Self {
        self.model = Some(model);
        self
    }

    /// Set language override
    #[must_use]
    pub fn with_language(mut self, language: Language) -> Self {
        self.language = Some(language);
        self
    }

    /// Set auto-interpret override
    #[must_use]
    pub fn with_auto_interpret(mut self, enabled: bool) -> Self {
        self.auto_interpret = Some(enabled);
        self
    }

    /// Apply overrides to a configuration
    pub fn apply(&self, config: &mut ArcanaConfig) {
        if self.backend.is_some()
            || self.model.is_some()
            || self.language.is_some()
            || self.auto_interpret.is_some()
        {
            config.source = ConfigSource::Cli;
        }

        if let Some(backend) = self.backend {
            config.backend = backend;
        }

        if let Some(ref model) = self.model {
            config.model = model.clone();
            config.model_explicit = true;
        }
        config.resolve_model();

        if let Some(language) = self.language {
            config.language = language;
        }

        if let Some(enabled) = self.auto_interpret {
            config.auto_interpret = enabled;
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn env_of(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    fn toml_file(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    // =========================================================================
    // Default Configuration Tests
    // =========================================================================

    #[test]
    fn test_default_config() {
        let config = ArcanaConfig::default();

        assert_eq!(config.backend, BackendKind::Gemini);
        assert_eq!(config.model, "gemini-2.5-flash-preview-04-17");
        assert_eq!(config.language, Language::TraditionalChinese);
        assert!(!config.auto_interpret);
        assert_eq!(config.max_message_chars, 4000);
        assert_eq!(config.source(), ConfigSource::Default);
    }

    #[test]
    fn test_default_config_path() {
        let path = default_config_path();
        // Depends on environment
        if let Some(p) = path {
            assert!(p.to_string_lossy().ends_with(".toml"));
        }
    }

    // =========================================================================
    // TOML Parsing Tests
    // =========================================================================

    #[test]
    fn test_parse_valid_toml() {
        let file = toml_file(
            r#"
[service]
backend = "ollama"
model = "llama3.2"

[ollama]
host = "tarot.local"
port = 8080

[reading]
language = "en"
auto_interpret = true
max_message_chars = 500
"#,
        );

        let config = load_config_with_env(Some(file.path().to_path_buf()), no_env).unwrap();

        assert_eq!(config.backend, BackendKind::Ollama);
        assert_eq!(config.model, "llama3.2");
        assert_eq!(config.backend_config(), BackendConfig::ollama("tarot.local", 8080));
        assert_eq!(config.language, Language::English);
        assert!(config.auto_interpret);
        assert_eq!(config.max_message_chars, 500);
        assert_eq!(config.source(), ConfigSource::File);
        assert_eq!(config.config_file_path, Some(file.path().to_path_buf()));
    }

    #[test]
    fn test_parse_partial_toml() {
        let file = toml_file("[reading]\nlanguage = \"en\"\n");

        let config = load_config_with_env(Some(file.path().to_path_buf()), no_env).unwrap();

        assert_eq!(config.language, Language::English);
        // Defaults preserved
        assert_eq!(config.backend, BackendKind::Gemini);
        assert_eq!(config.max_message_chars, 4000);
    }

    #[test]
    fn test_missing_file_graceful() {
        let path = PathBuf::from("/nonexistent/path/reader.toml");
        let config = load_config_with_env(Some(path), no_env).unwrap();
        assert_eq!(config.source(), ConfigSource::Default);
        assert!(config.config_file_path.is_none());
    }

    #[test]
    fn test_malformed_toml_error() {
        let file = toml_file("[reading\nlanguage = ");
        let result = load_config_with_env(Some(file.path().to_path_buf()), no_env);
        assert!(matches!(result.unwrap_err(), ConfigError::ParseError(_)));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let file = toml_file("[service]\nbackend = \"oracle\"\n");
        let result = load_config_with_env(Some(file.path().to_path_buf()), no_env);
        assert!(matches!(result.unwrap_err(), ConfigError::ValidationError(_)));

        let file = toml_file("[reading]\nmax_message_chars = 0\n");
        let result = load_config_with_env(Some(file.path().to_path_buf()), no_env);
        assert!(matches!(result.unwrap_err(), ConfigError::ValidationError(_)));

        let file = toml_file("[reading]\nlanguage = \"klingon\"\n");
        let result = load_config_with_env(Some(file.path().to_path_buf()), no_env);
        assert!(matches!(result.unwrap_err(), ConfigError::ValidationError(_)));
    }

    // =========================================================================
    // Priority Ordering Tests
    // =========================================================================

    #[test]
    fn test_env_overrides_file() {
        let file = toml_file("[service]\nmodel = \"file-model\"\napi_key = \"file-key\"\n");
        let env = env_of(&[("ARCANA_MODEL", "env-model"), ("API_KEY", "env-key")]);

        let config = load_config_with_env(Some(file.path().to_path_buf()), env).unwrap();

        assert_eq!(config.model, "env-model");
        assert_eq!(config.api_key, "env-key");
        assert_eq!(config.source(), ConfigSource::Env);
    }

    #[test]
    fn test_gemini_key_preferred_over_api_key() {
        let env = env_of(&[("GEMINI_API_KEY", "gemini"), ("API_KEY", "generic")]);
        let config = load_config_with_env(None, env).unwrap();
        assert_eq!(config.backend_config(), BackendConfig::gemini("gemini"));
    }

    #[test]
    fn test_cli_overrides_env() {
        let env = env_of(&[("ARCANA_MODEL", "env-model"), ("ARCANA_LANGUAGE", "zh-Hant")]);
        let mut config = load_config_with_env(None, env).unwrap();

        ConfigOverrides::new()
            .with_model("cli-model".to_string())
            .with_language(Language::English)
            .with_auto_interpret(true)
            .apply(&mut config);

        assert_eq!(config.model, "cli-model");
        assert_eq!(config.language, Language::English);
        assert!(config.auto_interpret);
        assert_eq!(config.source(), ConfigSource::Cli);

        let reader = config.reader_config();
        assert_eq!(reader.model, "cli-model");
        assert!(reader.auto_interpret);
    }

    // =========================================================================
    // Backend Model Resolution Tests
    // =========================================================================

    #[test]
    fn test_ollama_from_env_gets_ollama_default_model() {
        let env = env_of(&[("ARCANA_BACKEND", "ollama")]);
        let config = load_config_with_env(None, env).unwrap();

        assert_eq!(config.backend, BackendKind::Ollama);
        assert_eq!(config.model, DEFAULT_OLLAMA_MODEL);
        assert_ne!(config.model, DEFAULT_MODEL);
    }

    #[test]
    fn test_ollama_from_file_without_model_gets_ollama_default() {
        let file = toml_file("[service]\nbackend = \"ollama\"\n");
        let config = load_config_with_env(Some(file.path().to_path_buf()), no_env).unwrap();
        assert_eq!(config.model, DEFAULT_OLLAMA_MODEL);
    }

    #[test]
    fn test_explicit_model_survives_backend_choice() {
        let env = env_of(&[("ARCANA_BACKEND", "ollama"), ("ARCANA_MODEL", "mistral")]);
        let config = load_config_with_env(None, env).unwrap();
        assert_eq!(config.model, "mistral");

        let file = toml_file("[service]\nmodel = \"qwen2.5\"\n");
        let mut config = load_config_with_env(Some(file.path().to_path_buf()), no_env).unwrap();
        ConfigOverrides::new()
            .with_backend(BackendKind::Ollama)
            .apply(&mut config);
        assert_eq!(config.model, "qwen2.5");
    }

    #[test]
    fn test_cli_backend_switch_changes_default_model() {
        let mut config = load_config_with_env(None, no_env).unwrap();
        assert_eq!(config.model, DEFAULT_MODEL);

        ConfigOverrides::new()
            .with_backend(BackendKind::Ollama)
            .apply(&mut config);

        assert_eq!(config.model, DEFAULT_OLLAMA_MODEL);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_ollama_with_gemini_model_rejected() {
        let env = env_of(&[
            ("ARCANA_BACKEND", "ollama"),
            ("ARCANA_MODEL", "gemini-2.5-flash-preview-04-17"),
        ]);
        let result = load_config_with_env(None, env);
        assert!(matches!(result.unwrap_err(), ConfigError::ValidationError(_)));

        let mut config = ArcanaConfig::default();
        ConfigOverrides::new()
            .with_backend(BackendKind::Ollama)
            .with_model(DEFAULT_MODEL.to_string())
            .apply(&mut config);
        assert!(matches!(config.validate(), Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_empty_overrides_keep_source() {
        let mut config = ArcanaConfig::default();
        ConfigOverrides::new().apply(&mut config);
        assert_eq!(config.source(), ConfigSource::Default);
    }

    #[test]
    fn test_config_source_display() {
        assert_eq!(ConfigSource::Cli.to_string(), "CLI");
        assert_eq!(ConfigSource::Env.to_string(), "environment");
        assert_eq!(ConfigSource::File.to_string(), "config file");
        assert_eq!(ConfigSource::Default.to_string(), "default");
    }
}
