//! Configuration System
//!
//! Loads orchestrator configuration from YAML, TOML or JSON.
//!
//! ## Features
//!
//! - Auto-detection of format from file extension
//! - Environment variable substitution (`${VAR}` and `$VAR` syntax), so
//!   webhook secrets never have to live in the file itself
//! - Configuration merging from multiple sources
//! - [`OrchestratorConfig`] schema with validation

mod schema;

pub use config::FileFormat;
pub use schema::{
    CircuitSettings, MaintenanceSettings, OrchestratorConfig, PayloadDialect, ProviderSettings,
    RecoverySettings, SelectionWeights, WebhookProviderConfig,
};

use config::{Config as Cfg, Environment, File};
use error_stack::Report;
use regex::Regex;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::LazyLock;

use crate::error::{KernelError, KernelResult};

/// Configuration loading error
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parsing error: {0}")]
    Parse(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Result type for config operations
pub type ConfigResult<T> = Result<T, ConfigError>;

static BRACED_VAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("braced env var pattern is valid")
});

static BARE_VAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$([A-Za-z_][A-Za-z0-9_]*)\b").expect("bare env var pattern is valid")
});

/// Detect configuration format from file extension
///
/// # Supported Extensions
///
/// - YAML: `.yaml`, `.yml`
/// - TOML: `.toml`
/// - JSON: `.json`
pub fn detect_format(path: &str) -> ConfigResult<FileFormat> {
    let ext = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .ok_or_else(|| ConfigError::UnsupportedFormat("No file extension found".to_string()))?;

    match ext.to_lowercase().as_str() {
        "yaml" | "yml" => Ok(FileFormat::Yaml),
        "toml" => Ok(FileFormat::Toml),
        "json" => Ok(FileFormat::Json),
        _ => Err(ConfigError::UnsupportedFormat(ext.to_string())),
    }
}

/// Substitute environment variables in a string
///
/// Supports both `${VAR_NAME}` and `$VAR_NAME`. Unknown variables are left
/// untouched.
///
/// ```rust,ignore
/// use vgen_kernel::config::substitute_env_vars;
///
/// std::env::set_var("PRIMARY_WEBHOOK_SECRET", "s3cret");
/// let result = substitute_env_vars("secret = \"${PRIMARY_WEBHOOK_SECRET}\"");
/// assert_eq!(result, "secret = \"s3cret\"");
/// ```
pub fn substitute_env_vars(content: &str) -> String {
    let braced = BRACED_VAR.replace_all(content, |caps: &regex::Captures| {
        std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
    });

    BARE_VAR
        .replace_all(&braced, |caps: &regex::Captures| {
            std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
        })
        .into_owned()
}

fn deserialize<T>(builder: config::ConfigBuilder<config::builder::DefaultState>) -> ConfigResult<T>
where
    T: DeserializeOwned,
{
    let config = builder
        .build()
        .map_err(|e| ConfigError::Parse(e.to_string()))?;

    config
        .try_deserialize()
        .map_err(|e| ConfigError::Serialization(e.to_string()))
}

/// Load configuration from a file, detecting the format from its extension.
pub fn load_config<T>(path: &str) -> ConfigResult<T>
where
    T: DeserializeOwned,
{
    let format = detect_format(path)?;
    let content = std::fs::read_to_string(path)?;
    let substituted = substitute_env_vars(&content);

    deserialize(Cfg::builder().add_source(File::from_str(&substituted, format)))
}

/// Load configuration from a string with explicit format
///
/// ```rust,ignore
/// use vgen_kernel::config::{from_str, FileFormat, OrchestratorConfig};
///
/// let toml = r#"
/// [recovery]
/// retry_attempts = 2
/// "#;
///
/// let config: OrchestratorConfig = from_str(toml, FileFormat::Toml)?;
/// ```
pub fn from_str<T>(content: &str, format: FileFormat) -> ConfigResult<T>
where
    T: DeserializeOwned,
{
    let substituted = substitute_env_vars(content);
    deserialize(Cfg::builder().add_source(File::from_str(&substituted, format)))
}

/// Merge multiple configuration sources
///
/// Later sources override earlier ones (defaults -> site -> local).
pub fn merge_configs<T>(sources: &[(&str, FileFormat)]) -> ConfigResult<T>
where
    T: DeserializeOwned,
{
    let mut builder = Cfg::builder();

    for (content, format) in sources {
        let substituted = substitute_env_vars(content);
        builder = builder.add_source(File::from_str(&substituted, *format));
    }

    deserialize(builder)
}

/// Load configuration from multiple files with later files overriding earlier ones
pub fn load_merged<T>(paths: &[&str]) -> ConfigResult<T>
where
    T: DeserializeOwned,
{
    let mut builder = Cfg::builder();

    for path in paths {
        let format = detect_format(path)?;
        let content = std::fs::read_to_string(path)?;
        let substituted = substitute_env_vars(&content);
        builder = builder.add_source(File::from_str(&substituted, format));
    }

    deserialize(builder)
}

/// Load configuration with environment variable overrides
///
/// Variables use the given prefix and `__` for nesting, e.g.
/// `VGEN_RECOVERY__RETRY_ATTEMPTS=2`.
pub fn load_with_env<T>(path: &str, env_prefix: &str) -> ConfigResult<T>
where
    T: DeserializeOwned,
{
    let format = detect_format(path)?;
    let content = std::fs::read_to_string(path)?;
    let substituted = substitute_env_vars(&content);

    deserialize(
        Cfg::builder()
            .add_source(File::from_str(&substituted, format))
            .add_source(
                Environment::with_prefix(env_prefix)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            ),
    )
}

/// Load and validate an [`OrchestratorConfig`].
pub fn load_orchestrator_config(path: &str) -> KernelResult<OrchestratorConfig> {
    let config: OrchestratorConfig = load_config(path)
        .map_err(KernelError::from)
        .map_err(Report::new)
        .map_err(|report| report.attach(format!("loading orchestrator config from {path}")))?;

    config
        .validate()
        .map_err(KernelError::from)
        .map_err(Report::new)
        .map_err(|report| report.attach(format!("validating orchestrator config from {path}")))?;

    Ok(config)
}
