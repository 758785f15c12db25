//! The intake orchestrator.
//!
//! [`IntakeService::handle_message`] runs one conversation turn for one user:
//!
//! 1. the user's history is checked out of the [`SessionStore`] (same-user turns queue here);
//! 2. the model is asked for a reply given the locale's system instructions and the history;
//! 3. the (input, reply) pair is appended to the history;
//! 4. a non-terminal reply is returned verbatim;
//! 5. a terminal reply is validated. On success the form is filled, then the record is
//!    persisted (best effort) and the history is cleared. On failure the error is returned
//!    together with the raw reply and the history is kept so the user can correct it.
//!
//! Model and form failures are returned as [`IntakeError`]; in both cases the history is
//! left as it was before the failing step.

use crate::completion::is_terminal;
use crate::config::CoreConfig;
use crate::error::{IntakeError, IntakeResult, ValidationError};
use crate::form::fill_form;
use crate::llm::{ChatTurn, LanguageModel};
use crate::locale::Locale;
use crate::schema::PatientHistory;
use crate::session::SessionStore;
use crate::store::RecordStore;
use crate::validation::{serialize_record, validate_output};
use intake_types::NonEmptyText;
use intake_uuid::RecordId;
use std::path::PathBuf;

/// Outcome of one conversation turn.
#[derive(Debug)]
pub enum IntakeReply {
    /// The conversation goes on; the model's reply is passed through unchanged.
    Continue(String),
    /// The record was validated and its form written.
    Completed {
        record: Box<PatientHistory>,
        json: String,
        pdf_path: PathBuf,
        /// `None` when persistence failed.
        record_id: Option<RecordId>,
        locale: Locale,
    },
    /// A terminal reply could not be turned into a record.
    Rejected {
        error: ValidationError,
        raw_output: String,
        locale: Locale,
    },
}

impl IntakeReply {
    /// Text to send back to the user.
    pub fn message(&self) -> String {
        match self {
            IntakeReply::Continue(reply) => reply.clone(),
            IntakeReply::Completed {
                json,
                pdf_path,
                locale,
                ..
            } => locale.completed_message(json, pdf_path),
            IntakeReply::Rejected {
                error,
                raw_output,
                locale,
            } => locale.rejected_message(error, raw_output),
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, IntakeReply::Completed { .. })
    }
}

pub struct IntakeService<M, S> {
    config: CoreConfig,
    model: M,
    store: S,
    sessions: SessionStore,
}

impl<M: LanguageModel, S: RecordStore> IntakeService<M, S> {
    pub fn new(config: CoreConfig, model: M, store: S) -> Self {
        let sessions = SessionStore::new(config.session_limits());
        Self {
            config,
            model,
            store,
            sessions,
        }
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn locale(&self) -> Locale {
        self.config.locale()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Copy of a user's current conversation.
    pub async fn history(&self, user_id: &str) -> Vec<ChatTurn> {
        self.sessions.snapshot(user_id).await
    }

    /// Runs one turn for `user_id`.
    ///
    /// # Errors
    ///
    /// Returns [`IntakeError::InvalidInput`] for a blank user identifier,
    /// [`IntakeError::Model`] when the model call fails and [`IntakeError::Form`] when the
    /// form cannot be filled. Validation failures are not errors: they come back as
    /// [`IntakeReply::Rejected`].
    pub async fn handle_message(&self, user_id: &str, text: &str) -> IntakeResult<IntakeReply> {
        let user = NonEmptyText::new(user_id)
            .map_err(|_| IntakeError::InvalidInput("user identifier cannot be empty".into()))?;
        let locale = self.config.locale();

        let mut history = self.sessions.checkout(user.as_str()).await;
        tracing::debug!(user = %user.masked(), turns = history.len(), "intake turn started");

        let reply = self
            .model
            .complete(locale.system_prompt(), &history, text)
            .await?;

        history.push(ChatTurn::human(text));
        history.push(ChatTurn::assistant(reply.clone()));

        if !is_terminal(text, &reply) {
            return Ok(IntakeReply::Continue(reply));
        }

        let record = match validate_output(&reply, locale) {
            Ok(record) => record,
            Err(error) => {
                tracing::warn!(user = %user.masked(), error = %error, "terminal reply failed validation");
                return Ok(IntakeReply::Rejected {
                    error,
                    raw_output: reply,
                    locale,
                });
            }
        };

        let json = serialize_record(&record, locale).map_err(IntakeError::Serialization)?;

        let output = self
            .config
            .output_dir()
            .join(format!("intake_{}_{}.pdf", locale.code(), RecordId::new()));
        let pdf_path = fill_form(&record, locale, self.config.template_path(), &output)?;

        let record_id = match self.store.store_record(&record, locale) {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::error!(user = %user.masked(), error = %e, "failed to persist intake record");
                None
            }
        };

        history.clear();
        tracing::info!(
            user = %user.masked(),
            record_id = ?record_id.map(|id| id.to_string()),
            "intake completed"
        );

        Ok(IntakeReply::Completed {
            record: Box::new(record),
            json,
            pdf_path,
            record_id,
            locale,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ModelError, StoreError};
    use crate::form::{generate_template, read_form_values};
    use crate::session::SessionLimits;
    use crate::store::MemoryRecordStore;
    use chrono::NaiveDate;
    use std::collections::VecDeque;
    use std::path::Path;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tempfile::TempDir;

    /// Replies from a script and remembers the history of every call.
    #[derive(Default)]
    struct ScriptedModel {
        replies: Mutex<VecDeque<Option<String>>>,
        seen: Mutex<Vec<Vec<ChatTurn>>>,
    }

    impl ScriptedModel {
        fn new(replies: &[&str]) -> Self {
            Self {
                replies: Mutex::new(replies.iter().map(|r| Some((*r).to_owned())).collect()),
                seen: Mutex::default(),
            }
        }

        fn failing_then(replies: &[&str]) -> Self {
            let model = Self::new(replies);
            model.replies.lock().unwrap().push_front(None);
            model
        }

        fn seen(&self) -> Vec<Vec<ChatTurn>> {
            self.seen.lock().unwrap().clone()
        }
    }

    impl LanguageModel for ScriptedModel {
        async fn complete(
            &self,
            _system: &str,
            history: &[ChatTurn],
            _input: &str,
        ) -> Result<String, ModelError> {
            self.seen.lock().unwrap().push(history.to_vec());
            match self.replies.lock().unwrap().pop_front() {
                Some(Some(reply)) => Ok(reply),
                _ => Err(ModelError::EmptyResponse),
            }
        }
    }

    struct FailingStore;

    impl RecordStore for FailingStore {
        fn store_record(&self, _: &PatientHistory, _: Locale) -> Result<RecordId, StoreError> {
            Err(StoreError::Allocation(5))
        }

        fn store_conversation_reference(
            &self,
            _: &str,
            _: &str,
            _: &str,
        ) -> Result<RecordId, StoreError> {
            Err(StoreError::Allocation(5))
        }
    }

    fn config(temp: &TempDir, locale: Locale) -> CoreConfig {
        let template = temp.path().join(locale.template_file_name());
        generate_template(locale, &template).unwrap();
        config_with_template(temp, locale, template)
    }

    fn config_with_template(temp: &TempDir, locale: Locale, template: PathBuf) -> CoreConfig {
        CoreConfig::new(
            locale,
            template,
            temp.path().join("forms"),
            temp.path().join("records"),
            SessionLimits {
                ttl: Duration::from_secs(3600),
                capacity: 100,
            },
        )
        .unwrap()
    }

    const JANE: &str = r#"  {"name": "Jane Doe", "dob": "1990-01-01"}  "#;

    #[tokio::test]
    async fn second_turn_sees_the_first_exchange() {
        let temp = TempDir::new().unwrap();
        let model = ScriptedModel::new(&["What is your name?", "And your date of birth?"]);
        let service = IntakeService::new(config(&temp, Locale::En), model, MemoryRecordStore::new());

        let first = service.handle_message("+15550100", "hello").await.unwrap();
        assert_eq!(first.message(), "What is your name?");
        service.handle_message("+15550100", "Jane Doe").await.unwrap();

        let seen = service.model.seen();
        assert!(seen[0].is_empty());
        assert_eq!(
            seen[1],
            vec![
                ChatTurn::human("hello"),
                ChatTurn::assistant("What is your name?")
            ]
        );
    }

    #[tokio::test]
    async fn bare_json_reply_completes_the_intake() {
        let temp = TempDir::new().unwrap();
        let model = ScriptedModel::new(&["Welcome!", JANE, "Hello again"]);
        let service = IntakeService::new(config(&temp, Locale::En), model, MemoryRecordStore::new());

        service.handle_message("u1", "hi").await.unwrap();
        let reply = service.handle_message("u1", "that's all").await.unwrap();

        let IntakeReply::Completed {
            record,
            json,
            pdf_path,
            record_id,
            ..
        } = &reply
        else {
            panic!("expected completion, got {reply:?}");
        };
        let expected = PatientHistory::new(
            "Jane Doe",
            NaiveDate::from_ymd_opt(1990, 1, 1).unwrap(),
        );
        assert_eq!(**record, expected);
        assert!(json.contains("\"name\": \"Jane Doe\""));
        assert!(pdf_path.is_absolute());
        assert!(pdf_path.is_file());
        assert!(pdf_path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("intake_en_"));

        let stored = service.store().records();
        assert_eq!(stored.len(), 1);
        assert_eq!(Some(stored[0].id), *record_id);

        let values = read_form_values(pdf_path).unwrap();
        assert_eq!(values.get("name").map(String::as_str), Some("Jane Doe"));
        assert_eq!(values.get("dob").map(String::as_str), Some("1990-01-01"));

        let message = reply.message();
        assert!(message.starts_with("Patient intake form completed and validated:\n"));
        assert!(message.ends_with(&format!("PDF form generated at: {}", pdf_path.display())));

        // History was cleared.
        assert!(service.history("u1").await.is_empty());
        service.handle_message("u1", "hi").await.unwrap();
        assert!(service.model.seen()[2].is_empty());
    }

    #[tokio::test]
    async fn end_marker_without_json_is_rejected_and_history_kept() {
        let temp = TempDir::new().unwrap();
        let model = ScriptedModel::new(&["Name?", "I could not build the record."]);
        let service = IntakeService::new(config(&temp, Locale::En), model, MemoryRecordStore::new());

        service.handle_message("u1", "hi").await.unwrap();
        let reply = service
            .handle_message("u1", "Jane **END INTAKE**")
            .await
            .unwrap();

        assert!(matches!(
            reply,
            IntakeReply::Rejected {
                error: ValidationError::NoJsonObject,
                ..
            }
        ));
        let message = reply.message();
        assert!(message.starts_with("Patient provided this information, but validation failed: "));
        assert!(message.ends_with("\n\nI could not build the record."));

        assert_eq!(
            service.history("u1").await,
            vec![
                ChatTurn::human("hi"),
                ChatTurn::assistant("Name?"),
                ChatTurn::human("Jane **END INTAKE**"),
                ChatTurn::assistant("I could not build the record."),
            ]
        );
        assert!(service.store().records().is_empty());
    }

    #[tokio::test]
    async fn rejected_attempt_can_be_corrected_in_the_same_session() {
        let temp = TempDir::new().unwrap();
        let model = ScriptedModel::new(&[
            r#"{"name": "Jane Doe", "dob": "01/01/1990"}"#,
            r#"{"name": "Jane Doe", "dob": "1990-01-01"}"#,
        ]);
        let service = IntakeService::new(config(&temp, Locale::En), model, MemoryRecordStore::new());

        let rejected = service.handle_message("u1", "done").await.unwrap();
        let IntakeReply::Rejected { error, .. } = &rejected else {
            panic!("expected rejection, got {rejected:?}");
        };
        assert!(matches!(error, ValidationError::InvalidDate { field, .. } if field == "dob"));
        assert_eq!(service.history("u1").await.len(), 2);

        let completed = service.handle_message("u1", "dob is 1990-01-01").await.unwrap();
        assert!(completed.is_completed());
        assert_eq!(service.model.seen()[1].len(), 2);
        assert!(service.history("u1").await.is_empty());
    }

    #[tokio::test]
    async fn model_failure_propagates_and_leaves_history_untouched() {
        let temp = TempDir::new().unwrap();
        let model = ScriptedModel::failing_then(&["Name?"]);
        let service = IntakeService::new(config(&temp, Locale::En), model, MemoryRecordStore::new());

        let err = service.handle_message("u1", "hi").await.unwrap_err();
        assert!(matches!(err, IntakeError::Model(ModelError::EmptyResponse)));
        assert!(service.history("u1").await.is_empty());

        service.handle_message("u1", "hi").await.unwrap();
        assert_eq!(service.history("u1").await.len(), 2);
    }

    #[tokio::test]
    async fn persistence_failure_does_not_block_completion() {
        let temp = TempDir::new().unwrap();
        let model = ScriptedModel::new(&[JANE]);
        let service = IntakeService::new(config(&temp, Locale::En), model, FailingStore);

        let reply = service.handle_message("u1", "done").await.unwrap();
        let IntakeReply::Completed {
            record_id, pdf_path, ..
        } = &reply
        else {
            panic!("expected completion, got {reply:?}");
        };
        assert!(record_id.is_none());
        assert!(pdf_path.is_file());
        assert!(service.history("u1").await.is_empty());
    }

    #[tokio::test]
    async fn form_failure_is_an_error_and_keeps_history() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("missing.pdf");
        let model = ScriptedModel::new(&[JANE]);
        let service = IntakeService::new(
            config_with_template(&temp, Locale::En, missing),
            model,
            MemoryRecordStore::new(),
        );

        let err = service.handle_message("u1", "done").await.unwrap_err();
        assert!(matches!(err, IntakeError::Form(_)));
        assert_eq!(service.history("u1").await.len(), 2);
    }

    #[tokio::test]
    async fn failed_fills_store_nothing() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("missing.pdf");
        let model = ScriptedModel::new(&[JANE, JANE]);
        let service = IntakeService::new(
            config_with_template(&temp, Locale::En, missing),
            model,
            MemoryRecordStore::new(),
        );

        for _ in 0..2 {
            let err = service.handle_message("u1", "done").await.unwrap_err();
            assert!(matches!(err, IntakeError::Form(_)));
        }

        assert!(service.store().records().is_empty());
        assert_eq!(service.history("u1").await.len(), 4);
    }

    #[tokio::test]
    async fn spanish_intake_uses_spanish_keys_and_messages() {
        let temp = TempDir::new().unwrap();
        let model = ScriptedModel::new(&[
            r#"Listo: {"nombre": "Juan Pérez", "fecha_nacimiento": "1985-06-15", "sexo": "M"}"#,
        ]);
        let service = IntakeService::new(config(&temp, Locale::Es), model, MemoryRecordStore::new());

        let reply = service
            .handle_message("+34600000000", "eso es todo **END INTAKE**")
            .await
            .unwrap();
        let IntakeReply::Completed {
            record,
            json,
            pdf_path,
            ..
        } = &reply
        else {
            panic!("expected completion, got {reply:?}");
        };
        assert_eq!(record.name, "Juan Pérez");
        assert_eq!(record.sex.as_deref(), Some("M"));
        assert!(json.contains("\"fecha_nacimiento\": \"1985-06-15\""));
        assert!(pdf_path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("intake_es_"));
        assert!(reply
            .message()
            .starts_with("Formulario de admisión completado y validado:\n"));

        let values = read_form_values(pdf_path).unwrap();
        assert_eq!(values.get("nombre").map(String::as_str), Some("Juan Pérez"));
    }

    #[tokio::test]
    async fn blank_user_identifier_is_rejected() {
        let temp = TempDir::new().unwrap();
        let service = IntakeService::new(
            config_with_template(&temp, Locale::En, Path::new("unused.pdf").to_path_buf()),
            ScriptedModel::new(&["unused"]),
            MemoryRecordStore::new(),
        );

        let err = service.handle_message("  ", "hi").await.unwrap_err();
        assert!(matches!(err, IntakeError::InvalidInput(_)));
        assert!(service.model.seen().is_empty());
    }

    #[tokio::test]
    async fn filling_twice_gives_identical_values() {
        let temp = TempDir::new().unwrap();
        let model = ScriptedModel::new(&[JANE, JANE]);
        let service = IntakeService::new(config(&temp, Locale::En), model, MemoryRecordStore::new());

        let first = service.handle_message("a", "done").await.unwrap();
        let second = service.handle_message("b", "done").await.unwrap();
        let (
            IntakeReply::Completed { pdf_path: p1, .. },
            IntakeReply::Completed { pdf_path: p2, .. },
        ) = (&first, &second)
        else {
            panic!("expected two completions");
        };
        assert_ne!(p1, p2);
        assert_eq!(read_form_values(p1).unwrap(), read_form_values(p2).unwrap());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_turns_for_one_user_are_serialised() {
        let temp = TempDir::new().unwrap();
        let model = ScriptedModel::new(&["one", "two"]);
        let service = Arc::new(IntakeService::new(
            config(&temp, Locale::En),
            model,
            MemoryRecordStore::new(),
        ));

        let tasks: Vec<_> = ["first", "second"]
            .into_iter()
            .map(|text| {
                let service = Arc::clone(&service);
                tokio::spawn(async move { service.handle_message("u1", text).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let mut lengths: Vec<usize> = service.model.seen().iter().map(Vec::len).collect();
        lengths.sort_unstable();
        assert_eq!(lengths, vec![0, 2]);
        assert_eq!(service.history("u1").await.len(), 4);
    }
}
