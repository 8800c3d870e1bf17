//! Storage seam for the triage pipeline.
//!
//! Everything is scoped by `(user_id, id)`: a row owned by another user is
//! indistinguishable from a missing one. Multi-row writes go through
//! [`TxRunner::begin`]; the returned [`TxRepositories`] commits explicitly and
//! rolls back when dropped.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::models::context::{ContextRule, Flag, Subflag};
use crate::models::entities::{
    Event, NewEvent, NewReminder, NewShoppingItem, NewShoppingList, NewTask, Reminder,
    ShoppingItem, ShoppingList, Task,
};
use crate::models::inbox::{
    AiSuggestion, InboxItem, InboxSource, InboxStatus, NewAiSuggestion, NewInboxItem,
};
use crate::models::user::UserProfile;

pub mod postgres;

#[cfg(test)]
pub mod memory;

pub const DEFAULT_PAGE_LIMIT: i64 = 50;
pub const MAX_PAGE_LIMIT: i64 = 200;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found")]
    NotFound,

    #[error("invalid cursor")]
    InvalidCursor,

    #[error("corrupt row: {0}")]
    Decode(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    /// Zero or negative means the default page size.
    pub limit: i64,
    pub cursor: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
}

impl ListOptions {
    /// Resolves the options to a clamped `(limit, offset)` pair.
    /// Cursors are opaque to callers but are decimal offsets underneath.
    pub fn limit_offset(&self) -> Result<(i64, i64), StoreError> {
        let limit = if self.limit <= 0 {
            DEFAULT_PAGE_LIMIT
        } else {
            self.limit.min(MAX_PAGE_LIMIT)
        };
        let offset = match self.cursor.as_deref().map(str::trim) {
            None | Some("") => 0,
            Some(raw) => match raw.parse::<i64>() {
                Ok(n) if n >= 0 => n,
                _ => return Err(StoreError::InvalidCursor),
            },
        };
        Ok((limit, offset))
    }
}

impl<T> Page<T> {
    /// Builds a page; a short page means there is nothing after it.
    pub fn from_offset(items: Vec<T>, offset: i64, limit: i64) -> Self {
        let count = items.len() as i64;
        let next_cursor = (count >= limit).then(|| (offset + count).to_string());
        Self { items, next_cursor }
    }
}

#[derive(Debug, Clone, Default)]
pub struct InboxFilter {
    pub status: Option<InboxStatus>,
    pub source: Option<InboxSource>,
}

/// Read access to a user's profile and classification contexts.
#[async_trait]
pub trait ContextRepository: Send + Sync {
    async fn get_profile(&self, user_id: Uuid) -> Result<UserProfile, StoreError>;

    async fn get_flag(&self, user_id: Uuid, id: Uuid) -> Result<Flag, StoreError>;

    async fn get_subflag(&self, user_id: Uuid, id: Uuid) -> Result<Subflag, StoreError>;

    async fn list_flags(&self, user_id: Uuid, opts: &ListOptions)
        -> Result<Page<Flag>, StoreError>;

    async fn list_subflags(
        &self,
        user_id: Uuid,
        flag_id: Uuid,
        opts: &ListOptions,
    ) -> Result<Page<Subflag>, StoreError>;

    async fn list_context_rules(
        &self,
        user_id: Uuid,
        opts: &ListOptions,
    ) -> Result<Page<ContextRule>, StoreError>;
}

#[async_trait]
pub trait InboxRepository: Send + Sync {
    async fn create_item(&self, item: NewInboxItem) -> Result<InboxItem, StoreError>;

    async fn get_item(&self, user_id: Uuid, id: Uuid) -> Result<InboxItem, StoreError>;

    /// Writes `status`, `last_error`, `raw_text`, `raw_media_url` and `source`.
    async fn update_item(&self, item: &InboxItem) -> Result<InboxItem, StoreError>;

    async fn list_items(
        &self,
        user_id: Uuid,
        filter: &InboxFilter,
        opts: &ListOptions,
    ) -> Result<Page<InboxItem>, StoreError>;

    async fn latest_suggestion(
        &self,
        user_id: Uuid,
        inbox_item_id: Uuid,
    ) -> Result<Option<AiSuggestion>, StoreError>;
}

/// Opens a unit of work. Backends without real transactions still hand out a
/// `TxRepositories`; they just apply writes on `commit`.
#[async_trait]
pub trait TxRunner: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn TxRepositories>, StoreError>;
}

/// Repositories bound to one open transaction.
#[async_trait]
pub trait TxRepositories: Send {
    async fn create_suggestion(
        &mut self,
        suggestion: NewAiSuggestion,
    ) -> Result<AiSuggestion, StoreError>;

    async fn update_item(&mut self, item: &InboxItem) -> Result<InboxItem, StoreError>;

    async fn create_task(&mut self, task: NewTask) -> Result<Task, StoreError>;

    async fn create_reminder(&mut self, reminder: NewReminder) -> Result<Reminder, StoreError>;

    async fn create_event(&mut self, event: NewEvent) -> Result<Event, StoreError>;

    async fn create_shopping_list(
        &mut self,
        list: NewShoppingList,
    ) -> Result<ShoppingList, StoreError>;

    async fn create_shopping_item(
        &mut self,
        item: NewShoppingItem,
    ) -> Result<ShoppingItem, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}
