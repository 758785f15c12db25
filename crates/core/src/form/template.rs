//! Blank intake form generator.
//!
//! Draws an A4 form with one coloured header bar per section, a label per field, and an
//! AcroForm widget per field named with the locale's dotted field path. Both locales share
//! the same layout table.

use super::{encode_text, save_document};
use crate::error::FormError;
use crate::locale::Locale;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};
use std::path::{Path, PathBuf};

const MM: f32 = 72.0 / 25.4;
const PAGE_WIDTH: f32 = 595.28;
const PAGE_HEIGHT: f32 = 841.89;
const MARGIN: f32 = 20.0 * MM;
const X_FIELD: f32 = MARGIN + 70.0 * MM;
const FIELD_WIDTH: f32 = PAGE_WIDTH - X_FIELD - MARGIN;
const BOTTOM_RESERVE: f32 = 50.0;

const BAR_HEIGHT: f32 = 18.0;
const LINE_GAP: f32 = 12.0;
const LINE_HEIGHT: f32 = 12.0;
const CHECKBOX_SIZE: f32 = 10.0;

const LABEL_SIZE: f32 = 9.0;
const HEADING_SIZE: f32 = 11.5;
const FOOTER_SIZE: f32 = 8.0;

// #0078b6
const BAR_COLOR: [f32; 3] = [0.0, 0.471, 0.714];
const BORDER_COLOR: [f32; 3] = [0.663, 0.663, 0.663];
const FIELD_FILL: [f32; 3] = [0.961, 0.961, 0.961];

/// `Ff` bit for multi-line text fields.
const MULTILINE_FLAG: i64 = 1 << 12;

/// Page resource names.
const LABEL_FONT: &[u8] = b"F1";
const HEADING_FONT: &[u8] = b"F2";
const FOOTER_FONT: &[u8] = b"F3";

#[derive(Clone, Copy)]
enum Input {
    Line,
    Block(f32),
    Check,
}

struct FieldSpec {
    path: &'static str,
    /// English, Spanish.
    label: [&'static str; 2],
    input: Input,
}

struct SectionSpec {
    heading: [&'static str; 2],
    fields: &'static [FieldSpec],
}

const fn line(path: &'static str, en: &'static str, es: &'static str) -> FieldSpec {
    FieldSpec {
        path,
        label: [en, es],
        input: Input::Line,
    }
}

const fn block(path: &'static str, en: &'static str, es: &'static str, height: f32) -> FieldSpec {
    FieldSpec {
        path,
        label: [en, es],
        input: Input::Block(height),
    }
}

const fn check(path: &'static str, en: &'static str, es: &'static str) -> FieldSpec {
    FieldSpec {
        path,
        label: [en, es],
        input: Input::Check,
    }
}

const SECTIONS: &[SectionSpec] = &[
    SectionSpec {
        heading: ["Patient Demographics", "Datos del Paciente"],
        fields: &[
            line("name", "Full Name:", "Nombre completo:"),
            line("dob", "Date of Birth (YYYY-MM-DD):", "Fecha de nacimiento (AAAA-MM-DD):"),
            line("sex", "Sex/Gender:", "Sexo / Género:"),
            line("address", "Address:", "Dirección:"),
            line("phone_number", "Phone Number:", "Teléfono:"),
            line("email_address", "Email:", "Correo electrónico:"),
        ],
    },
    SectionSpec {
        heading: ["Emergency Contact & PCP", "Contacto de Emergencia y Médico"],
        fields: &[
            line("emergency_contact.name", "EC Name:", "Nombre contacto de emergencia:"),
            line(
                "emergency_contact.phone_number",
                "EC Phone:",
                "Teléfono contacto de emergencia:",
            ),
            line("primary_care_physician", "Primary Care Physician:", "Médico de cabecera:"),
        ],
    },
    SectionSpec {
        heading: ["Visit Details", "Motivo de Consulta"],
        fields: &[
            line("reason_for_visit", "Reason for visit:", "Motivo de consulta:"),
            line("duration_of_concern", "Duration of concern:", "Duración del malestar:"),
            block(
                "symptoms_description",
                "Symptoms description:",
                "Descripción de síntomas:",
                45.0,
            ),
        ],
    },
    SectionSpec {
        heading: ["Medical History & Medications", "Historial Médico y Medicamentos"],
        fields: &[
            block("pre_conditions", "Pre-existing conditions:", "Condiciones previas:", 40.0),
            block(
                "surgeries_or_hospitalizations",
                "Surgeries / Hospitalizations:",
                "Cirugías / Hospitalizaciones:",
                40.0,
            ),
            block(
                "serious_injuries_or_accidents",
                "Serious injuries or accidents:",
                "Lesiones o accidentes graves:",
                35.0,
            ),
            block("prescriptions", "Current prescriptions:", "Medicamentos recetados:", 40.0),
            block("supplements", "Supplements:", "Suplementos:", 35.0),
            block("alternative_medicine", "Alternative medicine:", "Medicina alternativa:", 35.0),
            block(
                "allergies_medications",
                "Medication allergies:",
                "Alergias a medicamentos:",
                35.0,
            ),
            block("allergies_foods", "Food allergies:", "Alergias alimentarias:", 35.0),
            block(
                "allergies_environment",
                "Environmental allergies:",
                "Alergias ambientales:",
                35.0,
            ),
            block(
                "infectious_diseases",
                "Infectious diseases:",
                "Enfermedades infecciosas:",
                35.0,
            ),
        ],
    },
    SectionSpec {
        heading: ["Family History", "Antecedentes Familiares"],
        fields: &[
            check("family_history_heart_disease", "Heart disease", "Enfermedad cardíaca"),
            check("family_history_diabetes", "Diabetes", "Diabetes"),
            check("family_history_high_blood_pressure", "High blood pressure", "Hipertensión"),
            check("family_history_stroke", "Stroke", "Embolia / Derrame"),
            check(
                "family_history_mental_health",
                "Mental health conditions",
                "Trastornos de salud mental",
            ),
            line("family_history_cancer", "Cancer (type):", "Cáncer (tipo):"),
            line("family_history_other", "Other:", "Otros:"),
        ],
    },
    SectionSpec {
        heading: ["Recent Exams & Vaccinations", "Exámenes y Vacunas"],
        fields: &[
            line("last_physical_exam", "Last physical exam:", "Último examen físico:"),
            line("last_blood_test", "Last blood test:", "Último análisis de sangre:"),
            line("last_vaccination", "Last major vaccination:", "Última vacunación importante:"),
        ],
    },
    SectionSpec {
        heading: ["Lifestyle", "Estilo de Vida"],
        fields: &[
            check("lifestyle.smoke_tobacco", "Smoke tobacco", "Fuma tabaco"),
            line(
                "lifestyle.tobacco_quantity_per_day",
                "Tobacco quantity/day:",
                "Cantidad tabaco/día:",
            ),
            line("lifestyle.tobacco_duration_years", "Tobacco duration (yrs):", "Años fumando:"),
            check("lifestyle.drink_alcohol", "Drink alcohol", "Consume alcohol"),
            line(
                "lifestyle.alcohol_drinks_per_week",
                "Drinks per week:",
                "Bebidas alcohólicas/semana:",
            ),
            check(
                "lifestyle.recreational_drugs",
                "Use recreational drugs",
                "Usa drogas recreativas",
            ),
            line(
                "lifestyle.drug_type_and_frequency",
                "Drug type & frequency:",
                "Tipo y frecuencia de droga:",
            ),
            block("lifestyle.exercise_habits", "Exercise habits:", "Hábitos de ejercicio:", 40.0),
            block(
                "lifestyle.diet_description",
                "Diet description:",
                "Descripción de la dieta:",
                40.0,
            ),
        ],
    },
    SectionSpec {
        heading: ["Women's Health", "Salud de la Mujer"],
        fields: &[
            line(
                "woman_health.last_menstrual_period",
                "Last menstrual period:",
                "Última menstruación:",
            ),
            check(
                "woman_health.pregnant_or_possibly_pregnant",
                "Pregnant or possibly pregnant",
                "Embarazada o posiblemente embarazada",
            ),
            line(
                "woman_health.last_mammogram_pap_smear",
                "Last mammogram / Pap smear:",
                "Último mamograma / Papanicolaou:",
            ),
        ],
    },
    SectionSpec {
        heading: ["Review of Systems", "Revisión de Sistemas"],
        fields: &[
            check("review_of_systems.fever_or_chills", "Fever or chills", "Fiebre o escalofríos"),
            check(
                "review_of_systems.fatigue_or_weakness",
                "Fatigue or weakness",
                "Fatiga o debilidad",
            ),
            check(
                "review_of_systems.weight_loss_or_gain",
                "Weight loss or gain",
                "Pérdida o aumento de peso",
            ),
            check("review_of_systems.chest_pain", "Chest pain", "Dolor de pecho"),
            check(
                "review_of_systems.shortness_of_breath",
                "Shortness of breath",
                "Dificultad para respirar",
            ),
            check("review_of_systems.cough", "Cough", "Tos"),
            check("review_of_systems.headache", "Headache", "Dolor de cabeza"),
            check("review_of_systems.vision_changes", "Vision changes", "Cambios en la visión"),
            check(
                "review_of_systems.hearing_changes",
                "Hearing changes",
                "Cambios en la audición",
            ),
            check("review_of_systems.abdominal_pain", "Abdominal pain", "Dolor abdominal"),
            check(
                "review_of_systems.nausea_or_vomiting",
                "Nausea or vomiting",
                "Náusea o vómito",
            ),
            check("review_of_systems.joint_pain", "Joint pain", "Dolor articular"),
            check("review_of_systems.skin_rashes", "Skin rashes", "Erupciones cutáneas"),
            check(
                "review_of_systems.dizziness_or_fainting",
                "Dizziness or fainting",
                "Mareo o desmayo",
            ),
            check("review_of_systems.mood_changes", "Mood changes", "Cambios de humor"),
            block("review_of_systems.other_symptoms", "Other symptoms:", "Otros síntomas:", 40.0),
        ],
    },
    SectionSpec {
        heading: ["Additional Comments & Red Flags", "Comentarios y Banderas Rojas"],
        fields: &[
            block(
                "additional_comments",
                "Additional comments:",
                "Comentarios adicionales:",
                50.0,
            ),
            block(
                "red_flags",
                "Red flags for MD review:",
                "Banderas rojas para revisión médica:",
                50.0,
            ),
        ],
    },
    SectionSpec {
        heading: ["Signature", "Firma"],
        fields: &[
            line("signature", "Signature:", "Firma:"),
            line(
                "signature_date",
                "Signature Date (YYYY-MM-DD):",
                "Fecha de firma (AAAA-MM-DD):",
            ),
        ],
    },
];

fn pick(labels: [&'static str; 2], locale: Locale) -> &'static str {
    match locale {
        Locale::En => labels[0],
        Locale::Es => labels[1],
    }
}

/// Writes the blank intake form for `locale` to `output` and returns its absolute path.
pub fn generate_template(locale: Locale, output: &Path) -> Result<PathBuf, FormError> {
    let mut builder = FormBuilder::new(locale);
    for section in SECTIONS {
        builder.header(pick(section.heading, locale));
        for field in section.fields {
            let label = pick(field.label, locale);
            let name = locale.field_path(field.path);
            match field.input {
                Input::Line => builder.text_field(label, &name, LINE_HEIGHT, false),
                Input::Block(height) => builder.text_field(label, &name, height, true),
                Input::Check => builder.checkbox(label, &name),
            }
        }
    }

    let mut doc = builder.finish()?;
    let path = save_document(&mut doc, output)?;
    tracing::info!(path = %path.display(), locale = %locale, "generated intake form template");
    Ok(path)
}

struct PageDraft {
    id: ObjectId,
    operations: Vec<Operation>,
    annotations: Vec<Object>,
}

struct FormBuilder {
    doc: Document,
    locale: Locale,
    pages_id: ObjectId,
    page_fonts: Dictionary,
    form_fonts: Dictionary,
    check_on: ObjectId,
    check_off: ObjectId,
    finished: Vec<PageDraft>,
    page: PageDraft,
    fields: Vec<Object>,
    y: f32,
}

impl FormBuilder {
    fn new(locale: Locale) -> Self {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();

        let font = |doc: &mut Document, base: &[u8]| {
            doc.add_object(dictionary! {
                "Type" => Object::Name(b"Font".to_vec()),
                "Subtype" => Object::Name(b"Type1".to_vec()),
                "BaseFont" => Object::Name(base.to_vec()),
                "Encoding" => Object::Name(b"WinAnsiEncoding".to_vec()),
            })
        };
        let helvetica = font(&mut doc, b"Helvetica");
        let helvetica_bold = font(&mut doc, b"Helvetica-Bold");
        let helvetica_oblique = font(&mut doc, b"Helvetica-Oblique");
        let zapf = doc.add_object(dictionary! {
            "Type" => Object::Name(b"Font".to_vec()),
            "Subtype" => Object::Name(b"Type1".to_vec()),
            "BaseFont" => Object::Name(b"ZapfDingbats".to_vec()),
        });

        let page_fonts = dictionary! {
            LABEL_FONT.to_vec() => Object::Reference(helvetica),
            HEADING_FONT.to_vec() => Object::Reference(helvetica_bold),
            FOOTER_FONT.to_vec() => Object::Reference(helvetica_oblique),
        };
        let form_fonts = dictionary! {
            "Helv" => Object::Reference(helvetica),
            "ZaDb" => Object::Reference(zapf),
        };

        let check_on = checkbox_appearance(&mut doc, zapf, true);
        let check_off = checkbox_appearance(&mut doc, zapf, false);
        let page = PageDraft {
            id: doc.new_object_id(),
            operations: Vec::new(),
            annotations: Vec::new(),
        };

        Self {
            doc,
            locale,
            pages_id,
            page_fonts,
            form_fonts,
            check_on,
            check_off,
            finished: Vec::new(),
            page,
            fields: Vec::new(),
            y: PAGE_HEIGHT - MARGIN,
        }
    }

    fn ensure_space(&mut self, required: f32) {
        if self.y - required < MARGIN + BOTTOM_RESERVE {
            self.new_page();
        }
    }

    fn new_page(&mut self) {
        self.footer();
        let next = PageDraft {
            id: self.doc.new_object_id(),
            operations: Vec::new(),
            annotations: Vec::new(),
        };
        self.finished.push(std::mem::replace(&mut self.page, next));
        self.y = PAGE_HEIGHT - MARGIN;
    }

    fn footer(&mut self) {
        let text = format!("{} {}", self.locale.page_word(), self.finished.len() + 1);
        // Helvetica averages roughly half an em per glyph.
        let width = text.chars().count() as f32 * FOOTER_SIZE * 0.5;
        let x = (PAGE_WIDTH - width) / 2.0;
        self.text(FOOTER_FONT, FOOTER_SIZE, x, MARGIN / 2.2, &text);
    }

    fn header(&mut self, heading: &str) {
        self.ensure_space(BAR_HEIGHT + LINE_GAP);
        let top = self.y;
        self.page.operations.extend([
            Operation::new("rg", numbers(&BAR_COLOR)),
            Operation::new(
                "re",
                numbers(&[MARGIN, top - BAR_HEIGHT, PAGE_WIDTH - 2.0 * MARGIN, BAR_HEIGHT]),
            ),
            Operation::new("f", Vec::new()),
            Operation::new("rg", numbers(&[1.0, 1.0, 1.0])),
        ]);
        self.text(
            HEADING_FONT,
            HEADING_SIZE,
            MARGIN + 4.0,
            top - BAR_HEIGHT / 2.0 - 4.0,
            &heading.to_uppercase(),
        );
        self.page
            .operations
            .push(Operation::new("rg", numbers(&[0.0, 0.0, 0.0])));
        self.y -= BAR_HEIGHT + LINE_GAP;
    }

    fn text_field(&mut self, label: &str, name: &str, height: f32, multiline: bool) {
        self.ensure_space(height + LINE_GAP);
        let top = self.y;
        self.text(LABEL_FONT, LABEL_SIZE, MARGIN, top, label);

        let bottom = top - height - 2.0;
        let mut widget = self.widget_base(
            label,
            name,
            [X_FIELD, bottom, X_FIELD + FIELD_WIDTH, bottom + height],
        );
        widget.set("FT", Object::Name(b"Tx".to_vec()));
        widget.set("DA", Object::string_literal("/Helv 9 Tf 0 g"));
        widget.set(
            "MK",
            dictionary! {
                "BC" => reals(&BORDER_COLOR),
                "BG" => reals(&FIELD_FILL),
            },
        );
        if multiline {
            widget.set("Ff", Object::Integer(MULTILINE_FLAG));
        }
        self.add_widget(widget);
        self.y -= height + LINE_GAP;
    }

    fn checkbox(&mut self, label: &str, name: &str) {
        self.ensure_space(LINE_GAP);
        let top = self.y;
        self.text(LABEL_FONT, LABEL_SIZE, MARGIN, top, label);

        let bottom = top - CHECKBOX_SIZE + 2.0;
        let mut widget = self.widget_base(
            label,
            name,
            [X_FIELD, bottom, X_FIELD + CHECKBOX_SIZE, bottom + CHECKBOX_SIZE],
        );
        widget.set("FT", Object::Name(b"Btn".to_vec()));
        widget.set("DA", Object::string_literal("/ZaDb 0 Tf 0 g"));
        widget.set(
            "MK",
            dictionary! {
                "BC" => reals(&BORDER_COLOR),
                "BG" => reals(&[1.0, 1.0, 1.0]),
                // ZapfDingbats check mark
                "CA" => Object::string_literal("4"),
            },
        );
        widget.set(
            "AP",
            dictionary! {
                "N" => dictionary! {
                    "Yes" => Object::Reference(self.check_on),
                    "Off" => Object::Reference(self.check_off),
                },
            },
        );
        widget.set("V", Object::Name(b"Off".to_vec()));
        widget.set("AS", Object::Name(b"Off".to_vec()));
        self.add_widget(widget);
        self.y -= LINE_GAP;
    }

    fn widget_base(&self, label: &str, name: &str, rect: [f32; 4]) -> Dictionary {
        dictionary! {
            "Type" => Object::Name(b"Annot".to_vec()),
            "Subtype" => Object::Name(b"Widget".to_vec()),
            "T" => encode_text(name),
            "TU" => encode_text(label.trim_end_matches(':')),
            "Rect" => reals(&rect),
            // Print
            "F" => Object::Integer(4),
            "P" => Object::Reference(self.page.id),
            "BS" => dictionary! {
                "W" => Object::Real(0.5),
                "S" => Object::Name(b"S".to_vec()),
            },
        }
    }

    fn add_widget(&mut self, widget: Dictionary) {
        let id = self.doc.add_object(widget);
        self.page.annotations.push(Object::Reference(id));
        self.fields.push(Object::Reference(id));
    }

    fn text(&mut self, font: &[u8], size: f32, x: f32, y: f32, text: &str) {
        self.page.operations.extend([
            Operation::new("BT", Vec::new()),
            Operation::new("Tf", vec![Object::Name(font.to_vec()), Object::Real(size)]),
            Operation::new("Td", vec![Object::Real(x), Object::Real(y)]),
            Operation::new("Tj", vec![Object::String(win_ansi(text), StringFormat::Literal)]),
            Operation::new("ET", Vec::new()),
        ]);
    }

    fn finish(mut self) -> Result<Document, FormError> {
        self.footer();
        let Self {
            mut doc,
            pages_id,
            page_fonts,
            form_fonts,
            mut finished,
            page,
            fields,
            ..
        } = self;
        finished.push(page);

        let kids: Vec<Object> = finished.iter().map(|p| Object::Reference(p.id)).collect();
        let count = kids.len() as i64;
        for draft in finished {
            let content = Content {
                operations: draft.operations,
            }
            .encode()
            .map_err(FormError::Structure)?;
            let content_id = doc.add_object(Stream::new(Dictionary::new(), content));
            doc.objects.insert(
                draft.id,
                Object::Dictionary(dictionary! {
                    "Type" => Object::Name(b"Page".to_vec()),
                    "Parent" => Object::Reference(pages_id),
                    "MediaBox" => reals(&[0.0, 0.0, PAGE_WIDTH, PAGE_HEIGHT]),
                    "Contents" => Object::Reference(content_id),
                    "Resources" => dictionary! { "Font" => page_fonts.clone() },
                    "Annots" => Object::Array(draft.annotations),
                }),
            );
        }
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => Object::Name(b"Pages".to_vec()),
                "Kids" => Object::Array(kids),
                "Count" => Object::Integer(count),
            }),
        );

        let acro_form = doc.add_object(dictionary! {
            "Fields" => Object::Array(fields),
            "NeedAppearances" => Object::Boolean(true),
            "DA" => Object::string_literal("/Helv 0 Tf 0 g"),
            "DR" => dictionary! { "Font" => form_fonts },
        });
        let catalog = doc.add_object(dictionary! {
            "Type" => Object::Name(b"Catalog".to_vec()),
            "Pages" => Object::Reference(pages_id),
            "AcroForm" => Object::Reference(acro_form),
        });
        doc.trailer.set("Root", Object::Reference(catalog));
        Ok(doc)
    }
}

/// Form XObject drawing an empty box, or a box with a check mark.
fn checkbox_appearance(doc: &mut Document, zapf: ObjectId, checked: bool) -> ObjectId {
    let mut content = String::from("q 0.663 0.663 0.663 RG 0.5 w 0.25 0.25 9.5 9.5 re S Q\n");
    if checked {
        content.push_str("q 0 g BT /ZaDb 8 Tf 1.6 2 Td (4) Tj ET Q\n");
    }
    let stream = Stream::new(
        dictionary! {
            "Type" => Object::Name(b"XObject".to_vec()),
            "Subtype" => Object::Name(b"Form".to_vec()),
            "BBox" => reals(&[0.0, 0.0, CHECKBOX_SIZE, CHECKBOX_SIZE]),
            "Resources" => dictionary! {
                "Font" => dictionary! { "ZaDb" => Object::Reference(zapf) },
            },
        },
        content.into_bytes(),
    );
    doc.add_object(stream)
}

fn numbers(values: &[f32]) -> Vec<Object> {
    values.iter().map(|&v| Object::Real(v)).collect()
}

fn reals(values: &[f32]) -> Object {
    Object::Array(numbers(values))
}

/// Single-byte text for the WinAnsi-encoded base fonts. Latin-1 maps directly; anything
/// else becomes `?`.
fn win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
        .collect()
}
