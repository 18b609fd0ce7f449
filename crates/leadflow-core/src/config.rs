use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{LeadflowError, Result};

/// Top-level leadflow configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub workflow: WorkflowConfig,
    #[serde(default)]
    pub log: LogConfig,
}

/// Where CRM documents live.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite database path. `~/` is expanded.
    #[serde(default = "default_store_path")]
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

/// Handler behaviour knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Welcome message used when neither the unit, the WhatsApp configuration
    /// nor the node supplies one. Placeholders: `{nome}`, `{cognome}`, `{unit_name}`.
    #[serde(default = "default_message_template")]
    pub default_message_template: String,
    /// Lower-case keywords that mark a reply as positive (substring match).
    #[serde(default = "default_positive_keywords")]
    pub positive_keywords: Vec<String>,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            default_message_template: default_message_template(),
            positive_keywords: default_positive_keywords(),
        }
    }
}

/// Log filter for the CLI subscriber.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// `EnvFilter` directive, overridden by `RUST_LOG`.
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

fn default_store_path() -> String { "~/.leadflow/leadflow.db".to_string() }
fn default_log_filter() -> String { "leadflow=info,warn".to_string() }

pub fn default_message_template() -> String {
    "Ciao {nome}! Grazie per averci contattato. Sono l'assistente virtuale di {unit_name}. \
     Ti andrebbe di rispondere a qualche domanda per aiutarti al meglio?"
        .to_string()
}

pub fn default_positive_keywords() -> Vec<String> {
    ["si", "sì", "ok", "certo", "va bene", "yes", "perfetto", "dai"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| LeadflowError::ConfigNotFound(path.display().to_string()))?;

        // Expand ${ENV_VAR} references
        let expanded = expand_env_vars(&content);

        let config: Self =
            toml::from_str(&expanded).map_err(|e| LeadflowError::Config(e.to_string()))?;
        debug!(path = %path.display(), "Config loaded");
        Ok(config)
    }

    /// Load config if the file exists, defaults otherwise.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            debug!(path = %path.display(), "No config file, using defaults");
            Ok(Self::default())
        }
    }

    /// Resolve the database path (expand ~).
    pub fn store_path(&self) -> PathBuf {
        let p = &self.store.path;
        if let Some(rest) = p.strip_prefix("~/") {
            if let Some(home) = dirs_home() {
                return home.join(rest);
            }
        }
        PathBuf::from(p)
    }
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                Err(_) => {
                    // Keep original if env var not set
                    result.push_str(&format!("${{{}}}", var_name));
                }
            }
        } else {
            result.push(c);
        }
    }
    result
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}
