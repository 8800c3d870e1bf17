//! Rows materialized when an inbox item is confirmed. Each one points back at
//! the item it came from; the link is informational and does not cascade.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Optional (flag, subflag) pair stamped on a created entity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextRef {
    pub flag_id: Option<Uuid>,
    pub subflag_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub due_at: Option<DateTime<Utc>>,
    pub flag_id: Option<Uuid>,
    pub subflag_id: Option<Uuid>,
    pub source_inbox_item_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewTask {
    pub user_id: Uuid,
    pub title: String,
    pub due_at: Option<DateTime<Utc>>,
    pub context: ContextRef,
    pub source_inbox_item_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Reminder {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub remind_at: Option<DateTime<Utc>>,
    pub flag_id: Option<Uuid>,
    pub subflag_id: Option<Uuid>,
    pub source_inbox_item_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewReminder {
    pub user_id: Uuid,
    pub title: String,
    pub remind_at: DateTime<Utc>,
    pub context: ContextRef,
    pub source_inbox_item_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
    pub all_day: bool,
    pub flag_id: Option<Uuid>,
    pub subflag_id: Option<Uuid>,
    pub source_inbox_item_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewEvent {
    pub user_id: Uuid,
    pub title: String,
    pub start_at: DateTime<Utc>,
    pub end_at: Option<DateTime<Utc>>,
    pub all_day: bool,
    pub context: ContextRef,
    pub source_inbox_item_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ShoppingList {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub flag_id: Option<Uuid>,
    pub subflag_id: Option<Uuid>,
    pub source_inbox_item_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewShoppingList {
    pub user_id: Uuid,
    pub title: String,
    pub context: ContextRef,
    pub source_inbox_item_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ShoppingItem {
    pub id: Uuid,
    pub user_id: Uuid,
    pub list_id: Uuid,
    pub title: String,
    pub quantity: Option<String>,
    pub checked: bool,
    pub sort_order: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewShoppingItem {
    pub user_id: Uuid,
    pub list_id: Uuid,
    pub title: String,
    pub quantity: Option<String>,
    pub sort_order: i32,
}
