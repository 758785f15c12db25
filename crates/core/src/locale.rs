//! Locale table.
//!
//! The schema has one canonical set of attribute names (English). Each locale provides:
//! the localized name of every attribute, the tokens that tick a checkbox, the user-facing
//! completion messages, and the instructions sent to the language model.
//!
//! Name mapping is per key segment and bijective, so a dotted path translates one segment
//! at a time: `lifestyle.smoke_tobacco` <-> `estilo_vida.fuma_tabaco`.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    En,
    Es,
}

/// Canonical attribute name and its Spanish counterpart.
const FIELD_NAMES: &[(&str, &str)] = &[
    // PatientHistory
    ("name", "nombre"),
    ("dob", "fecha_nacimiento"),
    ("sex", "sexo"),
    ("address", "direccion"),
    ("phone_number", "telefono"),
    ("email_address", "correo_electronico"),
    ("emergency_contact", "contacto_emergencia"),
    ("primary_care_physician", "medico_cabecera"),
    ("reason_for_visit", "motivo_consulta"),
    ("duration_of_concern", "duracion_malestar"),
    ("symptoms_description", "descripcion_sintomas"),
    ("pre_conditions", "condiciones_previas"),
    ("surgeries_or_hospitalizations", "cirugias_hospitalizaciones"),
    ("serious_injuries_or_accidents", "lesiones_accidentes_graves"),
    ("allergies_medications", "alergias_medicamentos"),
    ("allergies_foods", "alergias_alimentos"),
    ("allergies_environment", "alergias_ambientales"),
    ("infectious_diseases", "enfermedades_infecciosas"),
    ("prescriptions", "medicamentos_recetados"),
    ("supplements", "suplementos"),
    ("alternative_medicine", "medicina_alternativa"),
    ("family_history_heart_disease", "antecedentes_familiares_cardiacos"),
    ("family_history_diabetes", "antecedentes_familiares_diabetes"),
    ("family_history_cancer", "antecedentes_familiares_cancer"),
    ("family_history_high_blood_pressure", "antecedentes_familiares_hipertension"),
    ("family_history_stroke", "antecedentes_familiares_embolia"),
    ("family_history_mental_health", "antecedentes_familiares_salud_mental"),
    ("family_history_other", "antecedentes_familiares_otros"),
    ("lifestyle", "estilo_vida"),
    ("last_physical_exam", "ultimo_examen_fisico"),
    ("last_blood_test", "ultimo_examen_sangre"),
    ("last_vaccination", "ultima_vacunacion"),
    ("woman_health", "salud_mujer"),
    ("review_of_systems", "revision_sistemas"),
    ("additional_comments", "comentarios_adicionales"),
    ("red_flags", "banderas_rojas"),
    ("signature", "firma"),
    ("signature_date", "fecha_firma"),
    // MedicationEntry ("name" shared above)
    ("dosage", "dosis"),
    ("schedule", "horario"),
    // LifestyleInfo
    ("smoke_tobacco", "fuma_tabaco"),
    ("tobacco_quantity_per_day", "cantidad_tabaco_por_dia"),
    ("tobacco_duration_years", "anos_fumando"),
    ("drink_alcohol", "consume_alcohol"),
    ("alcohol_drinks_per_week", "bebidas_alcohol_semana"),
    ("recreational_drugs", "usa_drogas_recreativas"),
    ("drug_type_and_frequency", "tipo_y_frecuencia_droga"),
    ("exercise_habits", "habitos_ejercicio"),
    ("diet_description", "descripcion_dieta"),
    // WomenHealthInfo
    ("last_menstrual_period", "ultima_menstruacion"),
    ("pregnant_or_possibly_pregnant", "embarazada_o_posiblemente"),
    ("last_mammogram_pap_smear", "ultimo_mamograma_papanicolaou"),
    // ReviewOfSystems
    ("fever_or_chills", "fiebre_o_escalofrios"),
    ("fatigue_or_weakness", "fatiga_o_debilidad"),
    ("weight_loss_or_gain", "perdida_o_aumento_peso"),
    ("chest_pain", "dolor_pecho"),
    ("shortness_of_breath", "dificultad_respirar"),
    ("cough", "tos"),
    ("headache", "dolor_cabeza"),
    ("vision_changes", "cambios_vision"),
    ("hearing_changes", "cambios_audicion"),
    ("abdominal_pain", "dolor_abdominal"),
    ("nausea_or_vomiting", "nausea_o_vomito"),
    ("joint_pain", "dolor_articular"),
    ("skin_rashes", "erupciones_cutaneas"),
    ("dizziness_or_fainting", "mareo_o_desmayo"),
    ("mood_changes", "cambios_humor"),
    ("other_symptoms", "otros_sintomas"),
];

const AFFIRMATIVE_EN: &[&str] = &["true", "yes", "1"];

// "sí" appears twice: precomposed U+00ED and `i` + combining acute U+0301.
const AFFIRMATIVE_ES: &[&str] = &["true", "yes", "1", "si", "s\u{00ED}", "si\u{0301}"];

const SYSTEM_PROMPT_EN: &str = include_str!("../prompts/intake_en.txt");
const SYSTEM_PROMPT_ES: &str = include_str!("../prompts/intake_es.txt");

impl Locale {
    pub const ALL: [Locale; 2] = [Locale::En, Locale::Es];

    /// Two-letter code used in configuration and file names.
    pub fn code(self) -> &'static str {
        match self {
            Locale::En => "en",
            Locale::Es => "es",
        }
    }

    /// Localized name of a canonical attribute, if the attribute exists.
    pub fn field_name(self, canonical: &str) -> Option<&'static str> {
        let (en, es) = FIELD_NAMES.iter().find(|(en, _)| *en == canonical)?;
        Some(match self {
            Locale::En => en,
            Locale::Es => es,
        })
    }

    /// Canonical attribute for a localized name, if this locale knows the name.
    pub fn canonical_name(self, localized: &str) -> Option<&'static str> {
        FIELD_NAMES
            .iter()
            .find(|(en, es)| match self {
                Locale::En => *en == localized,
                Locale::Es => *es == localized,
            })
            .map(|(en, _)| *en)
    }

    /// Translates a canonical dotted path to this locale.
    ///
    /// Sequence indices (`prescriptions[0]`) are kept; unknown segments pass through.
    pub fn field_path(self, canonical_path: &str) -> String {
        canonical_path
            .split('.')
            .map(|segment| {
                let (key, index) = segment.split_at(segment.find('[').unwrap_or(segment.len()));
                format!("{}{index}", self.field_name(key).unwrap_or(key))
            })
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Tokens that, compared against lower-cased text, tick a checkbox.
    pub fn affirmative_tokens(self) -> &'static [&'static str] {
        match self {
            Locale::En => AFFIRMATIVE_EN,
            Locale::Es => AFFIRMATIVE_ES,
        }
    }

    pub fn is_affirmative(self, text: &str) -> bool {
        let lowered = text.to_lowercase();
        self.affirmative_tokens().contains(&lowered.as_str())
    }

    /// Instructions given to the language model at the start of every turn.
    pub fn system_prompt(self) -> &'static str {
        match self {
            Locale::En => SYSTEM_PROMPT_EN,
            Locale::Es => SYSTEM_PROMPT_ES,
        }
    }

    /// Reply sent once a record has been validated and its form generated.
    pub fn completed_message(self, json: &str, pdf_path: &Path) -> String {
        match self {
            Locale::En => format!(
                "Patient intake form completed and validated:\n{json}\n\nPDF form generated at: {}",
                pdf_path.display()
            ),
            Locale::Es => format!(
                "Formulario de admisión completado y validado:\n{json}\n\nFormulario PDF generado en: {}",
                pdf_path.display()
            ),
        }
    }

    /// Reply sent when a terminal reply failed validation.
    pub fn rejected_message(self, error: &dyn fmt::Display, raw_output: &str) -> String {
        match self {
            Locale::En => format!(
                "Patient provided this information, but validation failed: {error}\n\n{raw_output}"
            ),
            Locale::Es => format!(
                "El paciente proporcionó esta información, pero la validación falló: {error}\n\n{raw_output}"
            ),
        }
    }

    /// Word printed before the page number in form footers.
    pub fn page_word(self) -> &'static str {
        match self {
            Locale::En => "Page",
            Locale::Es => "Página",
        }
    }

    /// Default file name of the blank form template.
    pub fn template_file_name(self) -> String {
        format!("intake_form_{}.pdf", self.code())
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Locale {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "en" => Ok(Locale::En),
            "es" => Ok(Locale::Es),
            other => Err(ConfigError::Invalid {
                name: "INTAKE_LOCALE",
                reason: format!("unsupported locale '{other}' (expected 'en' or 'es')"),
            }),
        }
    }
}
