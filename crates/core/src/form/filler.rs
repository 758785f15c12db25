use super::{decode_text, encode_text, save_document};
use crate::error::FormError;
use crate::flatten::{flatten, FormFields};
use crate::locale::Locale;
use lopdf::{Dictionary, Document, Object, ObjectId};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

const OFF_STATE: &[u8] = b"Off";
const DEFAULT_ON_STATE: &[u8] = b"Yes";

/// Parent chains deeper than this are treated as malformed.
const MAX_FIELD_DEPTH: usize = 16;

enum WidgetKind {
    Text,
    Checkbox { on_state: Vec<u8> },
}

struct Widget {
    id: ObjectId,
    kind: WidgetKind,
}

/// Fills the widgets of `template` from `record` and writes the result to `output`.
///
/// Each flattened `(path, text)` pair is matched against the widget named by the path in
/// `locale` naming. Checkboxes are switched to their on state when `text` is one of the
/// locale's affirmative tokens and to `Off` otherwise. Text widgets receive the raw text and
/// lose their cached appearance. The form is flagged `NeedAppearances` so viewers redraw
/// every field.
///
/// # Errors
///
/// Returns [`FormError`] if the template cannot be loaded, its catalog is malformed, or the
/// output cannot be written.
pub fn fill_form(
    record: &dyn FormFields,
    locale: Locale,
    template: &Path,
    output: &Path,
) -> Result<PathBuf, FormError> {
    let mut doc = load(template)?;
    let widgets = widget_index(&doc);

    let mut filled = 0usize;
    let mut skipped = 0usize;
    for (path, text) in flatten(record) {
        let name = locale.field_path(&path);
        let Some(widget) = widgets.get(&name) else {
            tracing::debug!(field = %name, "no widget for field, skipped");
            skipped += 1;
            continue;
        };
        let Ok(Object::Dictionary(dict)) = doc.get_object_mut(widget.id) else {
            continue;
        };

        match &widget.kind {
            WidgetKind::Checkbox { on_state } => {
                let state = if locale.is_affirmative(&text) {
                    on_state.clone()
                } else {
                    OFF_STATE.to_vec()
                };
                dict.set("V", Object::Name(state.clone()));
                dict.set("AS", Object::Name(state));
            }
            WidgetKind::Text => {
                dict.set("V", encode_text(&text));
                dict.remove(b"AP");
            }
        }
        filled += 1;
    }

    let field_ids: Vec<ObjectId> = widgets.values().map(|w| w.id).collect();
    set_need_appearances(&mut doc, &field_ids)?;

    let written = save_document(&mut doc, output)?;
    tracing::info!(
        path = %written.display(),
        locale = %locale,
        filled,
        skipped,
        "filled intake form"
    );
    Ok(written)
}

/// Current value of every named widget in the PDF at `path`.
///
/// Text widgets report their text (empty when unset); checkboxes report their appearance
/// state name (`Off` when unset).
pub fn read_form_values(path: &Path) -> Result<BTreeMap<String, String>, FormError> {
    let doc = load(path)?;
    let values = widget_index(&doc)
        .into_iter()
        .map(|(name, widget)| {
            let value = doc
                .get_object(widget.id)
                .and_then(Object::as_dict)
                .map(|dict| widget_value(dict, &widget.kind))
                .unwrap_or_default();
            (name, value)
        })
        .collect();
    Ok(values)
}

fn load(path: &Path) -> Result<Document, FormError> {
    Document::load(path).map_err(|source| FormError::TemplateLoad {
        path: path.to_path_buf(),
        source,
    })
}

/// Named widget annotations, keyed by their exact (case-sensitive) `T` entry.
fn widget_index(doc: &Document) -> HashMap<String, Widget> {
    doc.objects
        .iter()
        .filter_map(|(&id, object)| {
            let Object::Dictionary(dict) = object else {
                return None;
            };
            if !matches!(dict.get(b"Subtype"), Ok(Object::Name(subtype)) if subtype == b"Widget") {
                return None;
            }
            let Ok(Object::String(name, _)) = dict.get(b"T") else {
                return None;
            };

            let kind = match field_type(doc, dict, 0) {
                Some(ft) if ft == b"Btn" => WidgetKind::Checkbox {
                    on_state: on_state(doc, dict),
                },
                _ => WidgetKind::Text,
            };
            Some((decode_text(name), Widget { id, kind }))
        })
        .collect()
}

/// `FT` of the widget, inherited from its `Parent` field when absent.
fn field_type(doc: &Document, dict: &Dictionary, depth: usize) -> Option<Vec<u8>> {
    if let Ok(Object::Name(ft)) = dict.get(b"FT") {
        return Some(ft.clone());
    }
    if depth >= MAX_FIELD_DEPTH {
        return None;
    }
    let parent = resolve_dict(doc, dict.get(b"Parent").ok()?)?;
    field_type(doc, parent, depth + 1)
}

/// First normal-appearance state other than `Off`, or `Yes`.
fn on_state(doc: &Document, dict: &Dictionary) -> Vec<u8> {
    dict.get(b"AP")
        .ok()
        .and_then(|ap| resolve_dict(doc, ap))
        .and_then(|ap| ap.get(b"N").ok())
        .and_then(|normal| resolve_dict(doc, normal))
        .and_then(|normal| {
            normal
                .iter()
                .map(|(state, _)| state)
                .find(|state| state.as_slice() != OFF_STATE)
                .cloned()
        })
        .unwrap_or_else(|| DEFAULT_ON_STATE.to_vec())
}

fn resolve_dict<'a>(doc: &'a Document, object: &'a Object) -> Option<&'a Dictionary> {
    match object {
        Object::Dictionary(dict) => Some(dict),
        Object::Reference(id) => match doc.get_object(*id).ok()? {
            Object::Dictionary(dict) => Some(dict),
            _ => None,
        },
        _ => None,
    }
}

fn widget_value(dict: &Dictionary, kind: &WidgetKind) -> String {
    match kind {
        WidgetKind::Checkbox { .. } => match dict.get(b"AS").or_else(|_| dict.get(b"V")) {
            Ok(Object::Name(state)) => String::from_utf8_lossy(state).into_owned(),
            _ => String::from_utf8_lossy(OFF_STATE).into_owned(),
        },
        WidgetKind::Text => match dict.get(b"V") {
            Ok(Object::String(bytes, _)) => decode_text(bytes),
            _ => String::new(),
        },
    }
}

/// Sets `NeedAppearances` on the document's AcroForm, creating the AcroForm if missing.
fn set_need_appearances(doc: &mut Document, field_ids: &[ObjectId]) -> Result<(), FormError> {
    let root_id = doc
        .trailer
        .get(b"Root")
        .and_then(Object::as_reference)
        .map_err(FormError::Structure)?;
    let existing = doc
        .get_object(root_id)
        .and_then(Object::as_dict)
        .map_err(FormError::Structure)?
        .get(b"AcroForm")
        .ok()
        .cloned();

    let acro_form = match existing {
        Some(Object::Reference(form_id)) => {
            doc.get_object_mut(form_id)
                .and_then(Object::as_dict_mut)
                .map_err(FormError::Structure)?
                .set("NeedAppearances", Object::Boolean(true));
            return Ok(());
        }
        Some(Object::Dictionary(mut form)) => {
            form.set("NeedAppearances", Object::Boolean(true));
            form
        }
        _ => {
            let mut form = Dictionary::new();
            form.set(
                "Fields",
                Object::Array(field_ids.iter().map(|&id| Object::Reference(id)).collect()),
            );
            form.set("NeedAppearances", Object::Boolean(true));
            form
        }
    };

    doc.get_object_mut(root_id)
        .and_then(Object::as_dict_mut)
        .map_err(FormError::Structure)?
        .set("AcroForm", Object::Dictionary(acro_form));
    Ok(())
}
