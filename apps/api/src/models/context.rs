use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Flag {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub sort_order: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Subflag {
    pub id: Uuid,
    pub user_id: Uuid,
    pub flag_id: Uuid,
    pub name: String,
    pub sort_order: i32,
    pub created_at: DateTime<Utc>,
}

/// Keyword -> (flag, subflag?) mapping owned by a user. A subflag, when set,
/// always belongs to `flag_id`; the write path enforces that.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ContextRule {
    pub id: Uuid,
    pub user_id: Uuid,
    pub keyword: String,
    pub flag_id: Uuid,
    pub subflag_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}
