//! Field flattener: projects a nested record onto `(dotted.path, text)` pairs.
//!
//! Every schema type implements [`FormFields`], listing its attributes as [`FieldNode`]s.
//! [`flatten`] walks those nodes depth-first and yields one pair per populated leaf:
//!
//! - nested records recurse with `key.` appended to the prefix,
//! - absent values, empty text and empty lists are omitted (they must not overwrite a form
//!   default),
//! - booleans become the literal words `True` / `False`,
//! - dates become `YYYY-MM-DD`,
//! - lists are joined with `", "` into one free-text value.
//!
//! The walk is lazy (a record's entries are only listed when the walk reaches it) and
//! restartable (the iterator is `Clone`, and `flatten` can be called again). Records are
//! owned trees, so the walk always terminates.

use crate::constants::LIST_SEPARATOR;
use chrono::NaiveDate;
use std::borrow::Cow;
use std::fmt::Display;

/// One attribute of a record, as seen by the flattener.
#[derive(Clone)]
pub enum FieldNode<'a> {
    Absent,
    Text(&'a str),
    Flag(bool),
    Date(NaiveDate),
    List(Vec<Cow<'a, str>>),
    Record(&'a dyn FormFields),
}

impl<'a> FieldNode<'a> {
    pub fn text(value: &'a Option<String>) -> Self {
        value.as_deref().map_or(Self::Absent, Self::Text)
    }

    pub fn flag(value: Option<bool>) -> Self {
        value.map_or(Self::Absent, Self::Flag)
    }

    pub fn date(value: Option<NaiveDate>) -> Self {
        value.map_or(Self::Absent, Self::Date)
    }

    pub fn list(values: &'a [String]) -> Self {
        Self::List(values.iter().map(|v| Cow::Borrowed(v.as_str())).collect())
    }

    /// A list whose items render through `Display`.
    pub fn display_list<T: Display>(values: &'a [T]) -> Self {
        Self::List(values.iter().map(|v| Cow::Owned(v.to_string())).collect())
    }

    pub fn record<T: FormFields>(value: &'a Option<T>) -> Self {
        match value {
            Some(record) => Self::Record(record),
            None => Self::Absent,
        }
    }
}

/// Capability of a record to list its attributes for form projection.
pub trait FormFields {
    /// Attributes in declaration order, keyed by canonical attribute name.
    fn entries(&self) -> Vec<(&'static str, FieldNode<'_>)>;
}

/// Depth-first iterator over the populated leaves of a record.
#[derive(Clone)]
pub struct Flatten<'a> {
    stack: Vec<Frame<'a>>,
}

#[derive(Clone)]
struct Frame<'a> {
    prefix: String,
    entries: std::vec::IntoIter<(&'static str, FieldNode<'a>)>,
}

/// Starts a walk over `record`, producing canonical dotted paths.
pub fn flatten(record: &dyn FormFields) -> Flatten<'_> {
    Flatten {
        stack: vec![Frame {
            prefix: String::new(),
            entries: record.entries().into_iter(),
        }],
    }
}

impl Iterator for Flatten<'_> {
    type Item = (String, String);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let frame = self.stack.last_mut()?;
            let Some((key, node)) = frame.entries.next() else {
                self.stack.pop();
                continue;
            };
            let path = format!("{}{}", frame.prefix, key);

            match node {
                FieldNode::Absent => continue,
                FieldNode::Text("") => continue,
                FieldNode::Text(text) => return Some((path, text.to_owned())),
                FieldNode::Flag(flag) => {
                    let word = if flag { "True" } else { "False" };
                    return Some((path, word.to_owned()));
                }
                FieldNode::Date(date) => return Some((path, date.format("%Y-%m-%d").to_string())),
                FieldNode::List(items) => {
                    if items.is_empty() {
                        continue;
                    }
                    return Some((path, items.join(LIST_SEPARATOR)));
                }
                FieldNode::Record(record) => {
                    self.stack.push(Frame {
                        prefix: format!("{path}."),
                        entries: record.entries().into_iter(),
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{EmergencyContact, LifestyleInfo, MedicationEntry, PatientHistory};
    use std::collections::BTreeMap;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn as_map(record: &PatientHistory) -> BTreeMap<String, String> {
        flatten(record).collect()
    }

    #[test]
    fn minimal_record_emits_only_mandatory_fields() {
        let record = PatientHistory::new("Jane Doe", date("1990-01-01"));
        let pairs: Vec<_> = flatten(&record).collect();
        assert_eq!(
            pairs,
            vec![
                ("name".to_string(), "Jane Doe".to_string()),
                ("dob".to_string(), "1990-01-01".to_string()),
            ]
        );
    }

    #[test]
    fn nested_records_use_dotted_paths() {
        let mut record = PatientHistory::new("Jane Doe", date("1990-01-01"));
        record.emergency_contact = Some(EmergencyContact {
            name: "John Doe".into(),
            phone_number: "555-0100".into(),
        });
        record.lifestyle = Some(LifestyleInfo {
            smoke_tobacco: true,
            tobacco_quantity_per_day: Some("5".into()),
            tobacco_duration_years: None,
            drink_alcohol: false,
            alcohol_drinks_per_week: None,
            recreational_drugs: false,
            drug_type_and_frequency: None,
            exercise_habits: None,
            diet_description: None,
        });

        let fields = as_map(&record);
        assert_eq!(fields["emergency_contact.name"], "John Doe");
        assert_eq!(fields["emergency_contact.phone_number"], "555-0100");
        assert_eq!(fields["lifestyle.smoke_tobacco"], "True");
        assert_eq!(fields["lifestyle.drink_alcohol"], "False");
        assert_eq!(fields["lifestyle.tobacco_quantity_per_day"], "5");
        assert!(!fields.contains_key("lifestyle.tobacco_duration_years"));
        assert!(!fields.contains_key("woman_health"));
    }

    #[test]
    fn absent_and_empty_values_are_omitted() {
        let mut record = PatientHistory::new("Jane Doe", date("1990-01-01"));
        record.family_history_diabetes = Some(false);
        record.allergies_foods = Vec::new();

        let fields = as_map(&record);
        assert_eq!(fields["family_history_diabetes"], "False");
        for path in [
            "sex",
            "allergies_foods",
            "family_history_stroke",
            "signature_date",
            "emergency_contact",
        ] {
            assert!(
                !fields.keys().any(|k| k == path || k.starts_with(&format!("{path}."))),
                "{path} should not be emitted"
            );
        }
    }

    #[test]
    fn lists_are_joined_with_comma_space() {
        let mut record = PatientHistory::new("Jane Doe", date("1990-01-01"));
        record.allergies_medications = vec!["penicillin".into(), "sulfa".into()];
        record.prescriptions = vec![
            MedicationEntry {
                name: "Lisinopril".into(),
                dosage: Some("10 mg".into()),
                schedule: None,
            },
            MedicationEntry {
                name: "Aspirin".into(),
                dosage: None,
                schedule: None,
            },
        ];

        let fields = as_map(&record);
        assert_eq!(fields["allergies_medications"], "penicillin, sulfa");
        assert_eq!(fields["prescriptions"], "Lisinopril (10 mg), Aspirin");
    }

    #[test]
    fn empty_text_is_omitted() {
        let mut record = PatientHistory::new("Jane Doe", date("1990-01-01"));
        record.address = Some(String::new());
        assert!(!as_map(&record).contains_key("address"));
    }

    #[test]
    fn walk_is_restartable() {
        let mut record = PatientHistory::new("Jane Doe", date("1990-01-01"));
        record.signature_date = Some(date("2024-05-06"));

        let walk = flatten(&record);
        let first: Vec<_> = walk.clone().collect();
        let second: Vec<_> = walk.collect();
        assert_eq!(first, second);
        assert_eq!(first.last().unwrap().1, "2024-05-06");
    }
}
