use thiserror::Error;

#[derive(Debug, Error)]
pub enum LeadflowError {
    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // Storage errors
    #[error("Database error: {0}")]
    Database(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    // Workflow errors
    #[error("Invalid config for node {node_id}: {message}")]
    InvalidNodeConfig { node_id: String, message: String },

    #[error("Template not found: {0}")]
    TemplateNotFound(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, LeadflowError>;
