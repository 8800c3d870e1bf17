//! Strict validation of suggestion JSON, whether it came from the model or
//! from a confirm request.
//!
//! Decoding is closed at every level: an unknown key in the envelope, in
//! `context`, or in any payload shape is rejected. The envelope is checked
//! first, then the payload is decoded into the struct selected by `type`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::models::inbox::SuggestionType;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("ai_schema_invalid: {reason}")]
pub struct SchemaError {
    pub reason: String,
}

impl SchemaError {
    fn new(reason: impl Into<String>) -> Self {
        SchemaError {
            reason: reason.into(),
        }
    }
}

// ──────────────────────────────────────────────
// Envelope
// ──────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    title: String,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    context: Option<EnvelopeContext>,
    needs_review: bool,
    payload: Value,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct EnvelopeContext {
    #[serde(default)]
    flag_id: Option<String>,
    #[serde(default)]
    subflag_id: Option<String>,
}

const REQUIRED_KEYS: [(&str, &str); 4] = [
    ("type", "type_required"),
    ("title", "title_required"),
    ("needs_review", "needs_review_required"),
    ("payload", "payload_required"),
];

// ──────────────────────────────────────────────
// Payload shapes
// ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPayload {
    pub due_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReminderPayload {
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPayload {
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
    pub all_day: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShoppingItemPayload {
    pub title: String,
    pub quantity: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShoppingPayload {
    pub items: Vec<ShoppingItemPayload>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotePayload {
    pub content: String,
}

/// A payload already checked against the shape its `type` demands.
#[derive(Debug, Clone, PartialEq)]
pub enum SuggestionPayload {
    Task(TaskPayload),
    Reminder(ReminderPayload),
    Event(EventPayload),
    Shopping(ShoppingPayload),
    Note(NotePayload),
}

impl SuggestionPayload {
    pub fn kind(&self) -> SuggestionType {
        match self {
            SuggestionPayload::Task(_) => SuggestionType::Task,
            SuggestionPayload::Reminder(_) => SuggestionType::Reminder,
            SuggestionPayload::Event(_) => SuggestionType::Event,
            SuggestionPayload::Shopping(_) => SuggestionType::Shopping,
            SuggestionPayload::Note(_) => SuggestionType::Note,
        }
    }

    /// Normalized JSON form: camelCase keys, UTC timestamps, defaults filled in.
    pub fn to_json(&self) -> Value {
        match self {
            SuggestionPayload::Task(p) => json!(p),
            SuggestionPayload::Reminder(p) => json!(p),
            SuggestionPayload::Event(p) => json!(p),
            SuggestionPayload::Shopping(p) => json!(p),
            SuggestionPayload::Note(p) => json!(p),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedSuggestion {
    pub title: String,
    pub confidence: Option<f64>,
    /// Context ids exactly as the producer wrote them; not yet checked
    /// against anything the user owns.
    pub flag_id: Option<String>,
    pub subflag_id: Option<String>,
    pub needs_review: bool,
    pub payload: SuggestionPayload,
}

impl ValidatedSuggestion {
    pub fn kind(&self) -> SuggestionType {
        self.payload.kind()
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct RawTask {
    #[serde(default)]
    due_at: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawReminder {
    #[serde(default)]
    at: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct RawEvent {
    #[serde(default)]
    start: Option<String>,
    #[serde(default)]
    end: Option<String>,
    #[serde(default)]
    all_day: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawShopping {
    #[serde(default)]
    items: Option<Vec<RawShoppingItem>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawShoppingItem {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    quantity: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawNote {
    #[serde(default)]
    content: Option<String>,
}

// ──────────────────────────────────────────────
// Validation
// ──────────────────────────────────────────────

/// Validates raw model output.
pub fn validate(raw: &str) -> Result<ValidatedSuggestion, SchemaError> {
    let value: Value =
        serde_json::from_str(raw.trim()).map_err(|e| SchemaError::new(e.to_string()))?;
    validate_value(value)
}

/// Validates an envelope that is already parsed JSON.
pub fn validate_value(value: Value) -> Result<ValidatedSuggestion, SchemaError> {
    let Some(object) = value.as_object() else {
        return Err(SchemaError::new("not_an_object"));
    };
    for (key, reason) in REQUIRED_KEYS {
        if !object.contains_key(key) {
            return Err(SchemaError::new(reason));
        }
    }

    let envelope: Envelope =
        serde_json::from_value(value).map_err(|e| SchemaError::new(e.to_string()))?;

    if envelope.kind.trim().is_empty() {
        return Err(SchemaError::new("type_required"));
    }
    let title = envelope.title.trim();
    if title.is_empty() {
        return Err(SchemaError::new("title_required"));
    }
    if let Some(c) = envelope.confidence {
        if !(0.0..=1.0).contains(&c) {
            return Err(SchemaError::new("confidence_out_of_range"));
        }
    }

    let payload = validate_payload(&envelope.kind, envelope.payload)?;
    let (flag_id, subflag_id) = match envelope.context {
        Some(ctx) => (ctx.flag_id, ctx.subflag_id),
        None => (None, None),
    };

    Ok(ValidatedSuggestion {
        title: title.to_string(),
        confidence: envelope.confidence,
        flag_id,
        subflag_id,
        needs_review: envelope.needs_review,
        payload,
    })
}

fn validate_payload(kind: &str, payload: Value) -> Result<SuggestionPayload, SchemaError> {
    if payload.is_null() {
        return Err(SchemaError::new("payload_required"));
    }
    match kind {
        "task" => {
            let raw: RawTask = decode_closed(payload)?;
            let due_at = raw.due_at.as_deref().map(parse_timestamp).transpose()?;
            Ok(SuggestionPayload::Task(TaskPayload { due_at }))
        }
        "reminder" => {
            let raw: RawReminder = decode_closed(payload)?;
            let at = non_blank(raw.at).ok_or_else(|| SchemaError::new("reminder_at_required"))?;
            Ok(SuggestionPayload::Reminder(ReminderPayload {
                at: parse_timestamp(&at)?,
            }))
        }
        "event" => {
            let raw: RawEvent = decode_closed(payload)?;
            let start =
                non_blank(raw.start).ok_or_else(|| SchemaError::new("event_start_required"))?;
            let start = parse_timestamp(&start)?;
            let end = match non_blank(raw.end) {
                Some(end) => {
                    let end = parse_timestamp(&end)?;
                    if end < start {
                        return Err(SchemaError::new("event_end_before_start"));
                    }
                    Some(end)
                }
                None => None,
            };
            Ok(SuggestionPayload::Event(EventPayload {
                start,
                end,
                all_day: raw.all_day.unwrap_or(false),
            }))
        }
        "shopping" => {
            let raw: RawShopping = decode_closed(payload)?;
            let raw_items = raw.items.unwrap_or_default();
            if raw_items.is_empty() {
                return Err(SchemaError::new("shopping_items_required"));
            }
            let items = raw_items
                .into_iter()
                .map(|item| {
                    let title = non_blank(item.title)
                        .ok_or_else(|| SchemaError::new("shopping_item_title_required"))?;
                    Ok(ShoppingItemPayload {
                        title,
                        quantity: non_blank(item.quantity),
                    })
                })
                .collect::<Result<Vec<_>, SchemaError>>()?;
            Ok(SuggestionPayload::Shopping(ShoppingPayload { items }))
        }
        "note" => {
            let raw: RawNote = decode_closed(payload)?;
            let content =
                non_blank(raw.content).ok_or_else(|| SchemaError::new("note_content_required"))?;
            Ok(SuggestionPayload::Note(NotePayload { content }))
        }
        _ => Err(SchemaError::new("invalid_type")),
    }
}

fn decode_closed<T: serde::de::DeserializeOwned>(payload: Value) -> Result<T, SchemaError> {
    serde_json::from_value(payload).map_err(|e| SchemaError::new(e.to_string()))
}

/// Trimmed value, or `None` when absent or blank.
fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// RFC3339 with or without fractional seconds, normalized to UTC.
fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, SchemaError> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| SchemaError::new("invalid_timestamp"))
}
