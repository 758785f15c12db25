//! Patient-history record collected by the intake conversation.
//!
//! One canonical schema serves every locale: attribute names here are the English field
//! names, and [`crate::locale::Locale`] maps them to the localized names used on the wire
//! and on the PDF form.
//!
//! All structs are strict (`deny_unknown_fields`). `name` and `dob` are the only mandatory
//! top-level fields; lists default to empty, everything else to absent.

#![warn(missing_docs)]

use crate::flatten::{FieldNode, FormFields};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Person to contact in an emergency.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EmergencyContact {
    /// Emergency contact's full name
    pub name: String,
    /// Emergency contact's phone number
    pub phone_number: String,
}

/// A prescription, supplement or alternative treatment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MedicationEntry {
    /// Medication name
    pub name: String,
    /// Dosage information
    #[serde(default)]
    pub dosage: Option<String>,
    /// Administration schedule
    #[serde(default)]
    pub schedule: Option<String>,
}

impl fmt::Display for MedicationEntry {
    /// `name`, or `name (dosage, schedule)` with only the parts that are present.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let details: Vec<&str> = [self.dosage.as_deref(), self.schedule.as_deref()]
            .into_iter()
            .flatten()
            .filter(|s| !s.trim().is_empty())
            .collect();
        if details.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{} ({})", self.name, details.join(", "))
        }
    }
}

/// Tobacco, alcohol, drug use, exercise and diet.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LifestyleInfo {
    /// Does the patient use tobacco?
    pub smoke_tobacco: bool,
    /// Number of tobacco units per day
    #[serde(default)]
    pub tobacco_quantity_per_day: Option<String>,
    /// How long have they smoked?
    #[serde(default)]
    pub tobacco_duration_years: Option<String>,
    /// Does the patient drink alcohol?
    pub drink_alcohol: bool,
    /// Number of alcoholic drinks per week
    #[serde(default)]
    pub alcohol_drinks_per_week: Option<String>,
    /// Does the patient use recreational drugs?
    pub recreational_drugs: bool,
    /// Type and frequency of recreational drug use
    #[serde(default)]
    pub drug_type_and_frequency: Option<String>,
    /// Describe exercise habits
    #[serde(default)]
    pub exercise_habits: Option<String>,
    /// Describe typical diet
    #[serde(default)]
    pub diet_description: Option<String>,
}

/// Gynecological history.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WomenHealthInfo {
    /// Date of last menstrual period
    #[serde(default)]
    pub last_menstrual_period: Option<String>,
    /// Pregnancy status
    #[serde(default)]
    pub pregnant_or_possibly_pregnant: Option<bool>,
    /// Date of last mammogram or Pap smear
    #[serde(default)]
    pub last_mammogram_pap_smear: Option<String>,
}

/// Symptom checklist. Every flag defaults to `false`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ReviewOfSystems {
    /// Fever or chills
    pub fever_or_chills: bool,
    /// Fatigue or weakness
    pub fatigue_or_weakness: bool,
    /// Unexplained weight loss or gain
    pub weight_loss_or_gain: bool,
    /// Chest pain
    pub chest_pain: bool,
    /// Shortness of breath
    pub shortness_of_breath: bool,
    /// Cough
    pub cough: bool,
    /// Headache
    pub headache: bool,
    /// Vision changes
    pub vision_changes: bool,
    /// Hearing changes
    pub hearing_changes: bool,
    /// Abdominal pain
    pub abdominal_pain: bool,
    /// Nausea or vomiting
    pub nausea_or_vomiting: bool,
    /// Joint pain
    pub joint_pain: bool,
    /// Skin rashes
    pub skin_rashes: bool,
    /// Dizziness or fainting
    pub dizziness_or_fainting: bool,
    /// Mood changes
    pub mood_changes: bool,
    /// Any symptom not listed above
    pub other_symptoms: Option<String>,
}

/// Structured triage information extracted from the intake conversation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PatientHistory {
    /// Full legal name of the patient
    pub name: String,
    /// Date of birth in ISO-8601 format
    pub dob: NaiveDate,
    /// Sex assigned at birth or gender identity
    #[serde(default)]
    pub sex: Option<String>,
    /// Home address
    #[serde(default)]
    pub address: Option<String>,
    /// Phone number
    #[serde(default)]
    pub phone_number: Option<String>,
    /// Email address
    #[serde(default)]
    pub email_address: Option<String>,
    /// Person to reach in an emergency
    #[serde(default)]
    pub emergency_contact: Option<EmergencyContact>,
    /// Primary care physician name
    #[serde(default)]
    pub primary_care_physician: Option<String>,

    /// Chief complaint or reason for appointment
    #[serde(default)]
    pub reason_for_visit: Option<String>,
    /// Duration of main concern
    #[serde(default)]
    pub duration_of_concern: Option<String>,
    /// Detailed symptoms
    #[serde(default)]
    pub symptoms_description: Option<String>,

    /// Chronic diagnoses or notable medical history
    #[serde(default)]
    pub pre_conditions: Vec<String>,
    /// Major surgeries or hospitalizations
    #[serde(default)]
    pub surgeries_or_hospitalizations: Option<String>,
    /// Serious injuries or accidents
    #[serde(default)]
    pub serious_injuries_or_accidents: Option<String>,

    /// Medication allergies
    #[serde(default)]
    pub allergies_medications: Vec<String>,
    /// Food allergies
    #[serde(default)]
    pub allergies_foods: Vec<String>,
    /// Environmental allergies
    #[serde(default)]
    pub allergies_environment: Vec<String>,
    /// Current or past infectious diseases
    #[serde(default)]
    pub infectious_diseases: Vec<String>,

    /// Physician-prescribed drugs taken regularly
    #[serde(default)]
    pub prescriptions: Vec<MedicationEntry>,
    /// OTC vitamins, herbal or alternative products
    #[serde(default)]
    pub supplements: Vec<MedicationEntry>,
    /// Treatments outside evidence-based medicine
    #[serde(default)]
    pub alternative_medicine: Vec<MedicationEntry>,

    /// Family history of heart disease
    #[serde(default)]
    pub family_history_heart_disease: Option<bool>,
    /// Family history of diabetes
    #[serde(default)]
    pub family_history_diabetes: Option<bool>,
    /// Family history of cancer (type)
    #[serde(default)]
    pub family_history_cancer: Option<String>,
    /// Family history of high blood pressure
    #[serde(default)]
    pub family_history_high_blood_pressure: Option<bool>,
    /// Family history of stroke
    #[serde(default)]
    pub family_history_stroke: Option<bool>,
    /// Family history of mental health conditions
    #[serde(default)]
    pub family_history_mental_health: Option<bool>,
    /// Other relevant family history
    #[serde(default)]
    pub family_history_other: Option<String>,

    /// Tobacco, alcohol, drug use, exercise and diet
    #[serde(default)]
    pub lifestyle: Option<LifestyleInfo>,

    /// Date of last physical exam
    #[serde(default)]
    pub last_physical_exam: Option<String>,
    /// Date of last blood test
    #[serde(default)]
    pub last_blood_test: Option<String>,
    /// Date of last major vaccination
    #[serde(default)]
    pub last_vaccination: Option<String>,
    /// Women's health history
    #[serde(default)]
    pub woman_health: Option<WomenHealthInfo>,

    /// Symptom checklist
    #[serde(default)]
    pub review_of_systems: Option<ReviewOfSystems>,

    /// Other information the patient wants the doctor to know
    #[serde(default)]
    pub additional_comments: Option<String>,

    /// Potential clinical concerns flagged for MD review
    #[serde(default)]
    pub red_flags: Vec<String>,

    /// Patient/guardian signature
    #[serde(default)]
    pub signature: Option<String>,
    /// Signature date (ISO-8601)
    #[serde(default)]
    pub signature_date: Option<NaiveDate>,
}

impl PatientHistory {
    /// A record carrying only the mandatory fields.
    pub fn new(name: impl Into<String>, dob: NaiveDate) -> Self {
        Self {
            name: name.into(),
            dob,
            sex: None,
            address: None,
            phone_number: None,
            email_address: None,
            emergency_contact: None,
            primary_care_physician: None,
            reason_for_visit: None,
            duration_of_concern: None,
            symptoms_description: None,
            pre_conditions: Vec::new(),
            surgeries_or_hospitalizations: None,
            serious_injuries_or_accidents: None,
            allergies_medications: Vec::new(),
            allergies_foods: Vec::new(),
            allergies_environment: Vec::new(),
            infectious_diseases: Vec::new(),
            prescriptions: Vec::new(),
            supplements: Vec::new(),
            alternative_medicine: Vec::new(),
            family_history_heart_disease: None,
            family_history_diabetes: None,
            family_history_cancer: None,
            family_history_high_blood_pressure: None,
            family_history_stroke: None,
            family_history_mental_health: None,
            family_history_other: None,
            lifestyle: None,
            last_physical_exam: None,
            last_blood_test: None,
            last_vaccination: None,
            woman_health: None,
            review_of_systems: None,
            additional_comments: None,
            red_flags: Vec::new(),
            signature: None,
            signature_date: None,
        }
    }
}

// ============================================================================
// Form projection
// ============================================================================

impl FormFields for EmergencyContact {
    fn entries(&self) -> Vec<(&'static str, FieldNode<'_>)> {
        vec![
            ("name", FieldNode::Text(&self.name)),
            ("phone_number", FieldNode::Text(&self.phone_number)),
        ]
    }
}

impl FormFields for LifestyleInfo {
    fn entries(&self) -> Vec<(&'static str, FieldNode<'_>)> {
        vec![
            ("smoke_tobacco", FieldNode::Flag(self.smoke_tobacco)),
            (
                "tobacco_quantity_per_day",
                FieldNode::text(&self.tobacco_quantity_per_day),
            ),
            (
                "tobacco_duration_years",
                FieldNode::text(&self.tobacco_duration_years),
            ),
            ("drink_alcohol", FieldNode::Flag(self.drink_alcohol)),
            (
                "alcohol_drinks_per_week",
                FieldNode::text(&self.alcohol_drinks_per_week),
            ),
            ("recreational_drugs", FieldNode::Flag(self.recreational_drugs)),
            (
                "drug_type_and_frequency",
                FieldNode::text(&self.drug_type_and_frequency),
            ),
            ("exercise_habits", FieldNode::text(&self.exercise_habits)),
            ("diet_description", FieldNode::text(&self.diet_description)),
        ]
    }
}

impl FormFields for WomenHealthInfo {
    fn entries(&self) -> Vec<(&'static str, FieldNode<'_>)> {
        vec![
            (
                "last_menstrual_period",
                FieldNode::text(&self.last_menstrual_period),
            ),
            (
                "pregnant_or_possibly_pregnant",
                FieldNode::flag(self.pregnant_or_possibly_pregnant),
            ),
            (
                "last_mammogram_pap_smear",
                FieldNode::text(&self.last_mammogram_pap_smear),
            ),
        ]
    }
}

impl FormFields for ReviewOfSystems {
    fn entries(&self) -> Vec<(&'static str, FieldNode<'_>)> {
        vec![
            ("fever_or_chills", FieldNode::Flag(self.fever_or_chills)),
            ("fatigue_or_weakness", FieldNode::Flag(self.fatigue_or_weakness)),
            ("weight_loss_or_gain", FieldNode::Flag(self.weight_loss_or_gain)),
            ("chest_pain", FieldNode::Flag(self.chest_pain)),
            ("shortness_of_breath", FieldNode::Flag(self.shortness_of_breath)),
            ("cough", FieldNode::Flag(self.cough)),
            ("headache", FieldNode::Flag(self.headache)),
            ("vision_changes", FieldNode::Flag(self.vision_changes)),
            ("hearing_changes", FieldNode::Flag(self.hearing_changes)),
            ("abdominal_pain", FieldNode::Flag(self.abdominal_pain)),
            ("nausea_or_vomiting", FieldNode::Flag(self.nausea_or_vomiting)),
            ("joint_pain", FieldNode::Flag(self.joint_pain)),
            ("skin_rashes", FieldNode::Flag(self.skin_rashes)),
            (
                "dizziness_or_fainting",
                FieldNode::Flag(self.dizziness_or_fainting),
            ),
            ("mood_changes", FieldNode::Flag(self.mood_changes)),
            ("other_symptoms", FieldNode::text(&self.other_symptoms)),
        ]
    }
}

impl FormFields for PatientHistory {
    fn entries(&self) -> Vec<(&'static str, FieldNode<'_>)> {
        vec![
            ("name", FieldNode::Text(&self.name)),
            ("dob", FieldNode::Date(self.dob)),
            ("sex", FieldNode::text(&self.sex)),
            ("address", FieldNode::text(&self.address)),
            ("phone_number", FieldNode::text(&self.phone_number)),
            ("email_address", FieldNode::text(&self.email_address)),
            ("emergency_contact", FieldNode::record(&self.emergency_contact)),
            (
                "primary_care_physician",
                FieldNode::text(&self.primary_care_physician),
            ),
            ("reason_for_visit", FieldNode::text(&self.reason_for_visit)),
            ("duration_of_concern", FieldNode::text(&self.duration_of_concern)),
            ("symptoms_description", FieldNode::text(&self.symptoms_description)),
            ("pre_conditions", FieldNode::list(&self.pre_conditions)),
            (
                "surgeries_or_hospitalizations",
                FieldNode::text(&self.surgeries_or_hospitalizations),
            ),
            (
                "serious_injuries_or_accidents",
                FieldNode::text(&self.serious_injuries_or_accidents),
            ),
            ("allergies_medications", FieldNode::list(&self.allergies_medications)),
            ("allergies_foods", FieldNode::list(&self.allergies_foods)),
            ("allergies_environment", FieldNode::list(&self.allergies_environment)),
            ("infectious_diseases", FieldNode::list(&self.infectious_diseases)),
            ("prescriptions", FieldNode::display_list(&self.prescriptions)),
            ("supplements", FieldNode::display_list(&self.supplements)),
            (
                "alternative_medicine",
                FieldNode::display_list(&self.alternative_medicine),
            ),
            (
                "family_history_heart_disease",
                FieldNode::flag(self.family_history_heart_disease),
            ),
            (
                "family_history_diabetes",
                FieldNode::flag(self.family_history_diabetes),
            ),
            ("family_history_cancer", FieldNode::text(&self.family_history_cancer)),
            (
                "family_history_high_blood_pressure",
                FieldNode::flag(self.family_history_high_blood_pressure),
            ),
            ("family_history_stroke", FieldNode::flag(self.family_history_stroke)),
            (
                "family_history_mental_health",
                FieldNode::flag(self.family_history_mental_health),
            ),
            ("family_history_other", FieldNode::text(&self.family_history_other)),
            ("lifestyle", FieldNode::record(&self.lifestyle)),
            ("last_physical_exam", FieldNode::text(&self.last_physical_exam)),
            ("last_blood_test", FieldNode::text(&self.last_blood_test)),
            ("last_vaccination", FieldNode::text(&self.last_vaccination)),
            ("woman_health", FieldNode::record(&self.woman_health)),
            ("review_of_systems", FieldNode::record(&self.review_of_systems)),
            ("additional_comments", FieldNode::text(&self.additional_comments)),
            ("red_flags", FieldNode::list(&self.red_flags)),
            ("signature", FieldNode::text(&self.signature)),
            ("signature_date", FieldNode::date(self.signature_date)),
        ]
    }
}
