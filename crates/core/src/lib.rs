//! # Intake Core
//!
//! Core logic of the conversational patient-intake assistant.
//!
//! A patient chats with a language model that collects a structured medical history. When
//! the conversation ends, the model's JSON reply is validated against a strict schema,
//! persisted, and projected into a fillable PDF form. English and Spanish share one
//! canonical schema; [`Locale`] maps field names, prompts and messages.
//!
//! - [`IntakeService`]: one conversation turn per call, with per-user history in a bounded
//!   [`SessionStore`]
//! - [`validate_output`] / [`serialize_record`]: JSON to record and back
//! - [`flatten`], [`fill_form`], [`generate_template`]: PDF form projection
//!
//! **No transport concerns**: HTTP routing and outbound messaging belong in `api-rest`.

pub mod completion;
pub mod config;
pub mod constants;
pub mod error;
pub mod flatten;
pub mod form;
pub mod intake;
pub mod llm;
pub mod locale;
pub mod schema;
pub mod session;
pub mod store;
pub mod validation;

pub use completion::{extract_json, is_terminal};
pub use config::{env_lookup, CoreConfig, ModelConfig};
pub use error::{
    ConfigError, FormError, IntakeError, IntakeResult, ModelError, StoreError, ValidationError,
};
pub use flatten::{flatten, FieldNode, FormFields};
pub use form::{fill_form, generate_template, read_form_values};
pub use intake::{IntakeReply, IntakeService};
pub use llm::{ChatTurn, LanguageModel, OpenAiChatClient, Role};
pub use locale::Locale;
pub use schema::PatientHistory;
pub use session::{SessionLimits, SessionStore};
pub use store::{FileRecordStore, MemoryRecordStore, RecordStore};
pub use validation::{serialize_record, validate_output};

pub use intake_uuid::RecordId;
