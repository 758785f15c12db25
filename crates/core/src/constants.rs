//! Constants used throughout the intake core crate.
//!
//! Path, filename and protocol constants live here so every module agrees on them.

/// Literal token in an inbound message that forces the turn to be treated as terminal.
pub const END_INTAKE_MARKER: &str = "**END INTAKE**";

/// Separator used when a list value is flattened into one form field.
pub const LIST_SEPARATOR: &str = ", ";

/// Default directory for filled forms when no explicit directory is configured.
pub const DEFAULT_OUTPUT_DIR: &str = "data/forms";

/// Default directory for stored records when no explicit directory is configured.
pub const DEFAULT_DATA_DIR: &str = "data/records";

/// Directory (under the data directory) holding validated intake records.
pub const PATIENTS_DIR_NAME: &str = "patients";

/// Directory (under the data directory) holding conversation references.
pub const CONVERSATIONS_DIR_NAME: &str = "conversations";

/// Filename of a stored intake record.
pub const RECORD_JSON_FILENAME: &str = "record.json";

/// Filename of a stored conversation reference.
pub const CONVERSATION_JSON_FILENAME: &str = "conversation.json";

/// Default idle lifetime of a conversation session, in seconds.
pub const DEFAULT_SESSION_TTL_SECS: u64 = 3600;

/// Default maximum number of live conversation sessions.
pub const DEFAULT_SESSION_CAPACITY: usize = 10_000;

/// Default chat model.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Default OpenAI-compatible API base URL.
pub const DEFAULT_MODEL_BASE_URL: &str = "https://api.openai.com/v1";

/// Default model request timeout, in seconds.
pub const DEFAULT_MODEL_TIMEOUT_SECS: u64 = 120;

/// Fields the validator converts from ISO-8601 strings before building the record.
pub const DATE_FIELDS: [&str; 2] = ["dob", "signature_date"];

/// Directory holding the blank form templates, relative to the working directory.
pub const DEFAULT_TEMPLATE_DIR: &str = "templates";

/// Sampling temperature for the chat model. Intake answers must be reproducible.
pub const MODEL_TEMPERATURE: f32 = 0.0;
