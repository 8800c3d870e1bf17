use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Lifecycle of an inbox item.
///
/// ```text
/// NEW -> PROCESSING -> SUGGESTED | NEEDS_REVIEW -> CONFIRMED | DISMISSED
///                      NEEDS_REVIEW -> PROCESSING (explicit reprocess)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InboxStatus {
    New,
    Processing,
    Suggested,
    NeedsReview,
    Confirmed,
    Dismissed,
}

impl InboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InboxStatus::New => "NEW",
            InboxStatus::Processing => "PROCESSING",
            InboxStatus::Suggested => "SUGGESTED",
            InboxStatus::NeedsReview => "NEEDS_REVIEW",
            InboxStatus::Confirmed => "CONFIRMED",
            InboxStatus::Dismissed => "DISMISSED",
        }
    }

    /// CONFIRMED and DISMISSED never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, InboxStatus::Confirmed | InboxStatus::Dismissed)
    }
}

impl FromStr for InboxStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NEW" => Ok(InboxStatus::New),
            "PROCESSING" => Ok(InboxStatus::Processing),
            "SUGGESTED" => Ok(InboxStatus::Suggested),
            "NEEDS_REVIEW" => Ok(InboxStatus::NeedsReview),
            "CONFIRMED" => Ok(InboxStatus::Confirmed),
            "DISMISSED" => Ok(InboxStatus::Dismissed),
            _ => Err(UnknownVariant(s.to_string())),
        }
    }
}

impl fmt::Display for InboxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the raw text was captured from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InboxSource {
    Manual,
    /// Shared link from another app.
    Share,
    /// Text recognized from an image.
    Ocr,
}

impl InboxSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            InboxSource::Manual => "manual",
            InboxSource::Share => "share",
            InboxSource::Ocr => "ocr",
        }
    }
}

impl FromStr for InboxSource {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "manual" => Ok(InboxSource::Manual),
            "share" => Ok(InboxSource::Share),
            "ocr" => Ok(InboxSource::Ocr),
            _ => Err(UnknownVariant(s.to_string())),
        }
    }
}

impl fmt::Display for InboxSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The five shapes a suggestion can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionType {
    Task,
    Reminder,
    Event,
    Shopping,
    Note,
}

impl SuggestionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SuggestionType::Task => "task",
            SuggestionType::Reminder => "reminder",
            SuggestionType::Event => "event",
            SuggestionType::Shopping => "shopping",
            SuggestionType::Note => "note",
        }
    }
}

impl FromStr for SuggestionType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "task" => Ok(SuggestionType::Task),
            "reminder" => Ok(SuggestionType::Reminder),
            "event" => Ok(SuggestionType::Event),
            "shopping" => Ok(SuggestionType::Shopping),
            "note" => Ok(SuggestionType::Note),
            _ => Err(UnknownVariant(s.to_string())),
        }
    }
}

impl fmt::Display for SuggestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown variant '{0}'")]
pub struct UnknownVariant(pub String);

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboxItem {
    pub id: Uuid,
    pub user_id: Uuid,
    pub source: InboxSource,
    pub raw_text: String,
    pub raw_media_url: Option<String>,
    pub status: InboxStatus,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewInboxItem {
    pub user_id: Uuid,
    pub source: InboxSource,
    pub raw_text: String,
    pub raw_media_url: Option<String>,
}

/// One classification attempt. Append-only: rows are never updated.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiSuggestion {
    pub id: Uuid,
    pub user_id: Uuid,
    pub inbox_item_id: Uuid,
    #[serde(rename = "type")]
    pub kind: SuggestionType,
    pub title: String,
    pub confidence: Option<f64>,
    pub flag_id: Option<Uuid>,
    pub subflag_id: Option<Uuid>,
    pub needs_review: bool,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAiSuggestion {
    pub user_id: Uuid,
    pub inbox_item_id: Uuid,
    pub kind: SuggestionType,
    pub title: String,
    pub confidence: Option<f64>,
    pub flag_id: Option<Uuid>,
    pub subflag_id: Option<Uuid>,
    pub needs_review: bool,
    pub payload: Value,
}
