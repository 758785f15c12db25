use std::path::PathBuf;

/// Configuration problems detected while resolving settings at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Reasons a terminal model reply could not be turned into a validated record.
///
/// These are recoverable: the user sees the message together with the raw reply and the
/// conversation continues.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("no JSON object found in the reply")]
    NoJsonObject,
    #[error("malformed JSON: {0}")]
    MalformedJson(#[source] serde_json::Error),
    #[error("expected a JSON object at the top level")]
    NotAnObject,
    #[error("invalid date for `{field}`: '{value}' is not an ISO-8601 date (YYYY-MM-DD)")]
    InvalidDate { field: String, value: String },
    #[error("unknown field `{field}` at {path}")]
    UnknownField { path: String, field: String },
    #[error("schema mismatch at {path}: {message}")]
    Schema { path: String, message: String },
}

/// Failures while loading, filling, generating or writing PDF forms.
#[derive(Debug, thiserror::Error)]
pub enum FormError {
    #[error("failed to load form template {path}: {source}", path = path.display())]
    TemplateLoad {
        path: PathBuf,
        #[source]
        source: lopdf::Error,
    },
    #[error("failed to create output directory: {0}")]
    OutputDir(std::io::Error),
    #[error("failed to write form {path}: {source}", path = path.display())]
    Save {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to resolve output path: {0}")]
    Resolve(std::io::Error),
    #[error("malformed PDF structure: {0}")]
    Structure(lopdf::Error),
}

/// Failures of the hosted language-model call.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("model request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("model endpoint returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("model returned no choices")]
    EmptyResponse,
}

/// Failures of the record store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to create storage directory: {0}")]
    DirCreation(std::io::Error),
    #[error("failed to write record file: {0}")]
    FileWrite(std::io::Error),
    #[error("failed to read record file: {0}")]
    FileRead(std::io::Error),
    #[error("failed to serialize record: {0}")]
    Serialization(serde_json::Error),
    #[error("failed to deserialize record: {0}")]
    Deserialization(serde_json::Error),
    #[error("failed to allocate a unique record directory after {0} attempts")]
    Allocation(usize),
}

/// Errors surfaced by the intake orchestrator to its caller.
///
/// Validation failures are not in this list: they are part of a normal reply.
#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    #[error("language model error: {0}")]
    Model(#[from] ModelError),
    #[error("form error: {0}")]
    Form(#[from] FormError),
    #[error("failed to serialize record: {0}")]
    Serialization(serde_json::Error),
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

pub type IntakeResult<T> = std::result::Result<T, IntakeError>;
