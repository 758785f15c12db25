//! Validation and coercion of terminal model replies.
//!
//! A terminal reply is expected to embed one JSON object holding the collected record. The
//! object is located with [`extract_json`], its keys are mapped from the active locale to
//! the canonical schema names, the date fields are coerced, and the strict schema is
//! applied. Every failure is a [`ValidationError`] whose paths and field names are
//! expressed in the active locale, so the message can be shown to the patient as-is.

use crate::completion::extract_json;
use crate::constants::DATE_FIELDS;
use crate::error::ValidationError;
use crate::locale::Locale;
use crate::schema::PatientHistory;
use chrono::NaiveDate;
use serde_json::{Map, Value};

const ROOT_PATH: &str = "<root>";

/// Builds a validated record from a model reply.
///
/// `dob` and `signature_date` must be `YYYY-MM-DD` when present and non-empty. Other
/// values are checked by the schema itself, which rejects unknown fields.
///
/// # Errors
///
/// Returns [`ValidationError`] when no object can be extracted, the JSON is malformed,
/// a date is not ISO-8601, or the object does not match the schema.
pub fn validate_output(output: &str, locale: Locale) -> Result<PatientHistory, ValidationError> {
    let json = extract_json(output).ok_or(ValidationError::NoJsonObject)?;
    let value: Value = serde_json::from_str(json).map_err(ValidationError::MalformedJson)?;
    if !value.is_object() {
        return Err(ValidationError::NotAnObject);
    }

    let mut value = match locale {
        Locale::En => value,
        Locale::Es => canonicalize_keys(value, locale, "")?,
    };
    coerce_dates(&mut value, locale)?;

    match serde_path_to_error::deserialize::<_, PatientHistory>(value) {
        Ok(record) => Ok(record),
        Err(err) => {
            let path = err.path().to_string();
            let source = err.into_inner();
            let path = if path.is_empty() || path == "." {
                ROOT_PATH.to_owned()
            } else {
                locale.field_path(&path)
            };
            Err(ValidationError::Schema {
                path,
                message: localize_message(&source.to_string(), locale),
            })
        }
    }
}

/// Pretty-printed JSON of a record, keyed with the locale's field names.
///
/// Absent optional fields are written as `null` and empty lists as `[]`, so the output
/// always lists the full schema and validates back to the same record.
pub fn serialize_record(record: &PatientHistory, locale: Locale) -> Result<String, serde_json::Error> {
    match locale {
        Locale::En => serde_json::to_string_pretty(record),
        Locale::Es => {
            let value = localize_keys(serde_json::to_value(record)?, locale);
            serde_json::to_string_pretty(&value)
        }
    }
}

fn coerce_dates(value: &mut Value, locale: Locale) -> Result<(), ValidationError> {
    let Some(object) = value.as_object_mut() else {
        return Ok(());
    };
    for field in DATE_FIELDS {
        let Some(Value::String(text)) = object.get_mut(field) else {
            continue;
        };
        if text.is_empty() {
            continue;
        }
        let date = is_iso_date_shape(text)
            .then(|| NaiveDate::parse_from_str(text, "%Y-%m-%d").ok())
            .flatten()
            .ok_or_else(|| ValidationError::InvalidDate {
                field: locale.field_name(field).unwrap_or(field).to_owned(),
                value: text.clone(),
            })?;
        *text = date.format("%Y-%m-%d").to_string();
    }
    Ok(())
}

/// Exactly `YYYY-MM-DD`: zero-padded, no sign, no surrounding whitespace.
fn is_iso_date_shape(text: &str) -> bool {
    let bytes = text.as_bytes();
    bytes.len() == 10
        && bytes.iter().enumerate().all(|(i, b)| match i {
            4 | 7 => *b == b'-',
            _ => b.is_ascii_digit(),
        })
}

/// Rewrites every object key from `locale` names to canonical names.
fn canonicalize_keys(value: Value, locale: Locale, path: &str) -> Result<Value, ValidationError> {
    match value {
        Value::Object(object) => {
            let mut canonical = Map::with_capacity(object.len());
            for (key, child) in object {
                let Some(name) = locale.canonical_name(&key) else {
                    return Err(ValidationError::UnknownField {
                        path: if path.is_empty() {
                            ROOT_PATH.to_owned()
                        } else {
                            path.to_owned()
                        },
                        field: key,
                    });
                };
                let child_path = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{path}.{key}")
                };
                canonical.insert(name.to_owned(), canonicalize_keys(child, locale, &child_path)?);
            }
            Ok(Value::Object(canonical))
        }
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(index, item)| canonicalize_keys(item, locale, &format!("{path}[{index}]")))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        other => Ok(other),
    }
}

/// Rewrites every canonical object key to its `locale` name.
fn localize_keys(value: Value, locale: Locale) -> Value {
    match value {
        Value::Object(object) => Value::Object(
            object
                .into_iter()
                .map(|(key, child)| {
                    let name = locale.field_name(&key).map_or(key, str::to_owned);
                    (name, localize_keys(child, locale))
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| localize_keys(item, locale))
                .collect(),
        ),
        other => other,
    }
}

/// Replaces canonical field names quoted in backticks by serde with their localized names.
fn localize_message(message: &str, locale: Locale) -> String {
    if locale == Locale::En {
        return message.to_owned();
    }
    message
        .split('`')
        .enumerate()
        .map(|(i, part)| match i % 2 {
            1 => locale.field_name(part).unwrap_or(part),
            _ => part,
        })
        .collect::<Vec<_>>()
        .join("`")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{LifestyleInfo, MedicationEntry, ReviewOfSystems, WomenHealthInfo};

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn full_record() -> PatientHistory {
        let mut record = PatientHistory::new("María Pérez", date("1985-03-14"));
        record.sex = Some("F".into());
        record.phone_number = Some("+34 600 000 000".into());
        record.reason_for_visit = Some("Persistent cough {3 weeks}".into());
        record.pre_conditions = vec!["asthma".into()];
        record.allergies_medications = vec!["penicillin".into()];
        record.prescriptions = vec![MedicationEntry {
            name: "Salbutamol".into(),
            dosage: Some("100 mcg".into()),
            schedule: None,
        }];
        record.family_history_diabetes = Some(true);
        record.lifestyle = Some(LifestyleInfo {
            smoke_tobacco: false,
            tobacco_quantity_per_day: None,
            tobacco_duration_years: None,
            drink_alcohol: true,
            alcohol_drinks_per_week: Some("2".into()),
            recreational_drugs: false,
            drug_type_and_frequency: None,
            exercise_habits: Some("walks daily".into()),
            diet_description: None,
        });
        record.woman_health = Some(WomenHealthInfo {
            pregnant_or_possibly_pregnant: Some(false),
            ..Default::default()
        });
        record.review_of_systems = Some(ReviewOfSystems {
            cough: true,
            other_symptoms: Some("night sweats".into()),
            ..Default::default()
        });
        record.red_flags = vec!["cough > 3 weeks".into()];
        record.signature = Some("María Pérez".into());
        record.signature_date = Some(date("2024-05-06"));
        record
    }

    #[test]
    fn minimal_reply_with_whitespace_validates() {
        let record =
            validate_output("  {\"name\": \"Jane Doe\", \"dob\": \"1990-01-01\"}  ", Locale::En)
                .unwrap();
        assert_eq!(record, PatientHistory::new("Jane Doe", date("1990-01-01")));
    }

    #[test]
    fn object_is_extracted_from_prose() {
        let reply = "Thanks! Here is the summary:\n{\"name\": \"Jane\", \"dob\": \"1990-01-01\"}\nBye";
        assert_eq!(validate_output(reply, Locale::En).unwrap().name, "Jane");
    }

    #[test]
    fn reply_without_braces_is_rejected() {
        let err = validate_output("Thank you, that's all.", Locale::En).unwrap_err();
        assert!(matches!(err, ValidationError::NoJsonObject));
    }

    #[test]
    fn malformed_json_is_rejected() {
        let err = validate_output("{\"name\": \"Jane\",}", Locale::En).unwrap_err();
        assert!(matches!(err, ValidationError::MalformedJson(_)));
    }

    #[test]
    fn bad_dates_are_rejected_with_localized_field() {
        let err = validate_output("{\"name\": \"Jane\", \"dob\": \"01/02/1990\"}", Locale::En)
            .unwrap_err();
        match err {
            ValidationError::InvalidDate { field, value } => {
                assert_eq!(field, "dob");
                assert_eq!(value, "01/02/1990");
            }
            other => panic!("unexpected error: {other}"),
        }

        let err = validate_output(
            "{\"nombre\": \"Ana\", \"fecha_nacimiento\": \"1990-01-01\", \"fecha_firma\": \"mañana\"}",
            Locale::Es,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ValidationError::InvalidDate { ref field, .. } if field == "fecha_firma"
        ));
    }

    #[test]
    fn unpadded_dates_are_rejected() {
        for dob in ["1990-1-1", "1990-01-1", " 1990-01-01", "+1990-01-01", "1990/01/01"] {
            let output = format!("{{\"name\": \"Jane\", \"dob\": \"{dob}\"}}");
            let err = validate_output(&output, Locale::En).unwrap_err();
            assert!(
                matches!(err, ValidationError::InvalidDate { ref field, ref value } if field == "dob" && value == dob),
                "{dob} was accepted"
            );
        }

        let history =
            validate_output("{\"name\": \"Jane\", \"dob\": \"1990-01-01\"}", Locale::En).unwrap();
        assert_eq!(history.dob.to_string(), "1990-01-01");
    }

    #[test]
    fn empty_dob_fails_schema_validation() {
        let err = validate_output("{\"name\": \"Jane\", \"dob\": \"\"}", Locale::En).unwrap_err();
        assert!(matches!(err, ValidationError::Schema { ref path, .. } if path == "dob"));
    }

    #[test]
    fn missing_name_reports_root_path() {
        let err = validate_output("{\"dob\": \"1990-01-01\"}", Locale::En).unwrap_err();
        match err {
            ValidationError::Schema { path, message } => {
                assert_eq!(path, "<root>");
                assert!(message.contains("`name`"), "{message}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn type_mismatch_reports_nested_path() {
        let reply = r#"{"name": "Jane", "dob": "1990-01-01",
            "lifestyle": {"smoke_tobacco": "often", "drink_alcohol": false, "recreational_drugs": false}}"#;
        let err = validate_output(reply, Locale::En).unwrap_err();
        assert!(
            matches!(err, ValidationError::Schema { ref path, .. } if path == "lifestyle.smoke_tobacco"),
            "{err}"
        );
    }

    #[test]
    fn spanish_paths_and_messages_are_localized() {
        let reply = r#"{"nombre": "Ana", "fecha_nacimiento": "1990-01-01",
            "estilo_vida": {"fuma_tabaco": "a veces", "consume_alcohol": false, "usa_drogas_recreativas": false}}"#;
        let err = validate_output(reply, Locale::Es).unwrap_err();
        assert!(
            matches!(err, ValidationError::Schema { ref path, .. } if path == "estilo_vida.fuma_tabaco"),
            "{err}"
        );

        let err = validate_output("{\"fecha_nacimiento\": \"1990-01-01\"}", Locale::Es).unwrap_err();
        assert!(err.to_string().contains("`nombre`"), "{err}");
    }

    #[test]
    fn spanish_unknown_keys_are_rejected_with_path() {
        let reply = r#"{"nombre": "Ana", "fecha_nacimiento": "1990-01-01",
            "medicamentos_recetados": [{"nombre": "X", "frecuencia": "diaria"}]}"#;
        match validate_output(reply, Locale::Es).unwrap_err() {
            ValidationError::UnknownField { path, field } => {
                assert_eq!(path, "medicamentos_recetados[0]");
                assert_eq!(field, "frecuencia");
            }
            other => panic!("unexpected error: {other}"),
        }

        // English keys are not accepted in Spanish mode.
        let err = validate_output("{\"name\": \"Ana\", \"dob\": \"1990-01-01\"}", Locale::Es)
            .unwrap_err();
        assert!(matches!(err, ValidationError::UnknownField { ref path, .. } if path == "<root>"));
    }

    #[test]
    fn english_unknown_keys_are_rejected_by_schema() {
        let err = validate_output(
            "{\"name\": \"Jane\", \"dob\": \"1990-01-01\", \"nickname\": \"J\"}",
            Locale::En,
        )
        .unwrap_err();
        assert!(err.to_string().contains("nickname"));
    }

    #[test]
    fn spanish_reply_builds_canonical_record() {
        let reply = r#"{"nombre": "Ana", "fecha_nacimiento": "1990-01-01",
            "estilo_vida": {"fuma_tabaco": true, "consume_alcohol": false, "usa_drogas_recreativas": false},
            "medicamentos_recetados": [{"nombre": "Metformina", "dosis": "500 mg"}]}"#;
        let record = validate_output(reply, Locale::Es).unwrap();
        assert!(record.lifestyle.unwrap().smoke_tobacco);
        assert_eq!(record.prescriptions[0].name, "Metformina");
        assert_eq!(record.prescriptions[0].dosage.as_deref(), Some("500 mg"));
    }

    #[test]
    fn serialization_round_trips_in_every_locale() {
        let minimal = PatientHistory::new("Jane Doe", date("1990-01-01"));
        for locale in Locale::ALL {
            for record in [&minimal, &full_record()] {
                let json = serialize_record(record, locale).unwrap();
                assert_eq!(&validate_output(&json, locale).unwrap(), record);
            }
        }
    }

    #[test]
    fn serialization_lists_the_full_schema() {
        let record = PatientHistory::new("Jane Doe", date("1990-01-01"));

        let value: Value =
            serde_json::from_str(&serialize_record(&record, Locale::En).unwrap()).unwrap();
        assert_eq!(value["dob"], "1990-01-01");
        assert_eq!(value["sex"], Value::Null);
        assert_eq!(value["pre_conditions"], Value::Array(Vec::new()));

        let value: Value =
            serde_json::from_str(&serialize_record(&record, Locale::Es).unwrap()).unwrap();
        assert_eq!(value["nombre"], "Jane Doe");
        assert_eq!(value["fecha_nacimiento"], "1990-01-01");
        assert_eq!(value["banderas_rojas"], Value::Array(Vec::new()));
        assert!(value.get("name").is_none());
    }
}
