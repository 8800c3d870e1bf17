use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{FromRow, PgExecutor, PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::models::context::{ContextRule, Flag, Subflag};
use crate::models::entities::{
    Event, NewEvent, NewReminder, NewShoppingItem, NewShoppingList, NewTask, Reminder,
    ShoppingItem, ShoppingList, Task,
};
use crate::models::inbox::{AiSuggestion, InboxItem, NewAiSuggestion, NewInboxItem};
use crate::models::user::UserProfile;
use crate::repository::{
    ContextRepository, InboxFilter, InboxRepository, ListOptions, Page, StoreError,
    TxRepositories, TxRunner,
};

/// PostgreSQL-backed store. Implements every repository seam over one pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Repositories bound to an open transaction. Dropped without `commit` means
/// rolled back.
pub struct PgTx {
    tx: Transaction<'static, Postgres>,
}

// Enum columns are TEXT; rows are decoded as strings and parsed afterwards.

#[derive(FromRow)]
struct InboxItemRecord {
    id: Uuid,
    user_id: Uuid,
    source: String,
    raw_text: String,
    raw_media_url: Option<String>,
    status: String,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<InboxItemRecord> for InboxItem {
    type Error = StoreError;

    fn try_from(row: InboxItemRecord) -> Result<Self, Self::Error> {
        Ok(InboxItem {
            id: row.id,
            user_id: row.user_id,
            source: row
                .source
                .parse()
                .map_err(|e| StoreError::Decode(format!("inbox_items.source: {e}")))?,
            raw_text: row.raw_text,
            raw_media_url: row.raw_media_url,
            status: row
                .status
                .parse()
                .map_err(|e| StoreError::Decode(format!("inbox_items.status: {e}")))?,
            last_error: row.last_error,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
struct SuggestionRecord {
    id: Uuid,
    user_id: Uuid,
    inbox_item_id: Uuid,
    #[sqlx(rename = "type")]
    kind: String,
    title: String,
    confidence: Option<f64>,
    flag_id: Option<Uuid>,
    subflag_id: Option<Uuid>,
    needs_review: bool,
    payload_json: Value,
    created_at: DateTime<Utc>,
}

impl TryFrom<SuggestionRecord> for AiSuggestion {
    type Error = StoreError;

    fn try_from(row: SuggestionRecord) -> Result<Self, Self::Error> {
        Ok(AiSuggestion {
            id: row.id,
            user_id: row.user_id,
            inbox_item_id: row.inbox_item_id,
            kind: row
                .kind
                .parse()
                .map_err(|e| StoreError::Decode(format!("ai_suggestions.type: {e}")))?,
            title: row.title,
            confidence: row.confidence,
            flag_id: row.flag_id,
            subflag_id: row.subflag_id,
            needs_review: row.needs_review,
            payload: row.payload_json,
            created_at: row.created_at,
        })
    }
}

async fn update_inbox_item<'e>(
    executor: impl PgExecutor<'e>,
    item: &InboxItem,
) -> Result<InboxItem, StoreError> {
    let row: Option<InboxItemRecord> = sqlx::query_as(
        r#"
        UPDATE inbox_items
        SET source = $1, raw_text = $2, raw_media_url = $3, status = $4, last_error = $5,
            updated_at = now()
        WHERE id = $6 AND user_id = $7
        RETURNING id, user_id, source, raw_text, raw_media_url, status, last_error,
                  created_at, updated_at
        "#,
    )
    .bind(item.source.as_str())
    .bind(&item.raw_text)
    .bind(&item.raw_media_url)
    .bind(item.status.as_str())
    .bind(&item.last_error)
    .bind(item.id)
    .bind(item.user_id)
    .fetch_optional(executor)
    .await?;

    row.ok_or(StoreError::NotFound)?.try_into()
}

#[async_trait]
impl ContextRepository for PgStore {
    async fn get_profile(&self, user_id: Uuid) -> Result<UserProfile, StoreError> {
        sqlx::query_as::<_, UserProfile>("SELECT id, locale, timezone FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound)
    }

    async fn get_flag(&self, user_id: Uuid, id: Uuid) -> Result<Flag, StoreError> {
        sqlx::query_as::<_, Flag>(
            "SELECT id, user_id, name, sort_order, created_at FROM flags WHERE id = $1 AND user_id = $2",
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound)
    }

    async fn get_subflag(&self, user_id: Uuid, id: Uuid) -> Result<Subflag, StoreError> {
        sqlx::query_as::<_, Subflag>(
            r#"
            SELECT id, user_id, flag_id, name, sort_order, created_at
            FROM subflags
            WHERE id = $1 AND user_id = $2
            "#,
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound)
    }

    async fn list_flags(
        &self,
        user_id: Uuid,
        opts: &ListOptions,
    ) -> Result<Page<Flag>, StoreError> {
        let (limit, offset) = opts.limit_offset()?;
        let flags = sqlx::query_as::<_, Flag>(
            r#"
            SELECT id, user_id, name, sort_order, created_at
            FROM flags
            WHERE user_id = $1
            ORDER BY sort_order ASC, created_at ASC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(Page::from_offset(flags, offset, limit))
    }

    async fn list_subflags(
        &self,
        user_id: Uuid,
        flag_id: Uuid,
        opts: &ListOptions,
    ) -> Result<Page<Subflag>, StoreError> {
        let (limit, offset) = opts.limit_offset()?;
        let subflags = sqlx::query_as::<_, Subflag>(
            r#"
            SELECT id, user_id, flag_id, name, sort_order, created_at
            FROM subflags
            WHERE user_id = $1 AND flag_id = $2
            ORDER BY sort_order ASC, created_at ASC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(user_id)
        .bind(flag_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(Page::from_offset(subflags, offset, limit))
    }

    async fn list_context_rules(
        &self,
        user_id: Uuid,
        opts: &ListOptions,
    ) -> Result<Page<ContextRule>, StoreError> {
        let (limit, offset) = opts.limit_offset()?;
        let rules = sqlx::query_as::<_, ContextRule>(
            r#"
            SELECT id, user_id, keyword, flag_id, subflag_id, created_at
            FROM context_rules
            WHERE user_id = $1
            ORDER BY created_at ASC, id ASC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(Page::from_offset(rules, offset, limit))
    }
}

#[async_trait]
impl InboxRepository for PgStore {
    async fn create_item(&self, item: NewInboxItem) -> Result<InboxItem, StoreError> {
        let row: InboxItemRecord = sqlx::query_as(
            r#"
            INSERT INTO inbox_items (id, user_id, source, raw_text, raw_media_url, status)
            VALUES ($1, $2, $3, $4, $5, 'NEW')
            RETURNING id, user_id, source, raw_text, raw_media_url, status, last_error,
                      created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(item.user_id)
        .bind(item.source.as_str())
        .bind(&item.raw_text)
        .bind(&item.raw_media_url)
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn get_item(&self, user_id: Uuid, id: Uuid) -> Result<InboxItem, StoreError> {
        let row: Option<InboxItemRecord> = sqlx::query_as(
            r#"
            SELECT id, user_id, source, raw_text, raw_media_url, status, last_error,
                   created_at, updated_at
            FROM inbox_items
            WHERE id = $1 AND user_id = $2
            "#,
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        row.ok_or(StoreError::NotFound)?.try_into()
    }

    async fn update_item(&self, item: &InboxItem) -> Result<InboxItem, StoreError> {
        update_inbox_item(&self.pool, item).await
    }

    async fn list_items(
        &self,
        user_id: Uuid,
        filter: &InboxFilter,
        opts: &ListOptions,
    ) -> Result<Page<InboxItem>, StoreError> {
        let (limit, offset) = opts.limit_offset()?;
        let rows: Vec<InboxItemRecord> = sqlx::query_as(
            r#"
            SELECT id, user_id, source, raw_text, raw_media_url, status, last_error,
                   created_at, updated_at
            FROM inbox_items
            WHERE user_id = $1
              AND ($2::text IS NULL OR status = $2)
              AND ($3::text IS NULL OR source = $3)
            ORDER BY created_at DESC, id DESC
            LIMIT $4 OFFSET $5
            "#,
        )
        .bind(user_id)
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.source.map(|s| s.as_str()))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let items = rows
            .into_iter()
            .map(InboxItem::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Page::from_offset(items, offset, limit))
    }

    async fn latest_suggestion(
        &self,
        user_id: Uuid,
        inbox_item_id: Uuid,
    ) -> Result<Option<AiSuggestion>, StoreError> {
        let row: Option<SuggestionRecord> = sqlx::query_as(
            r#"
            SELECT id, user_id, inbox_item_id, type, title, confidence, flag_id, subflag_id,
                   needs_review, payload_json, created_at
            FROM ai_suggestions
            WHERE user_id = $1 AND inbox_item_id = $2
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .bind(inbox_item_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(AiSuggestion::try_from).transpose()
    }
}

#[async_trait]
impl TxRunner for PgStore {
    async fn begin(&self) -> Result<Box<dyn TxRepositories>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTx { tx }))
    }
}

#[async_trait]
impl TxRepositories for PgTx {
    async fn create_suggestion(
        &mut self,
        suggestion: NewAiSuggestion,
    ) -> Result<AiSuggestion, StoreError> {
        let row: SuggestionRecord = sqlx::query_as(
            r#"
            INSERT INTO ai_suggestions
                (id, user_id, inbox_item_id, type, title, confidence, flag_id, subflag_id,
                 needs_review, payload_json)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING id, user_id, inbox_item_id, type, title, confidence, flag_id, subflag_id,
                      needs_review, payload_json, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(suggestion.user_id)
        .bind(suggestion.inbox_item_id)
        .bind(suggestion.kind.as_str())
        .bind(&suggestion.title)
        .bind(suggestion.confidence)
        .bind(suggestion.flag_id)
        .bind(suggestion.subflag_id)
        .bind(suggestion.needs_review)
        .bind(&suggestion.payload)
        .fetch_one(&mut *self.tx)
        .await?;
        row.try_into()
    }

    async fn update_item(&mut self, item: &InboxItem) -> Result<InboxItem, StoreError> {
        update_inbox_item(&mut *self.tx, item).await
    }

    async fn create_task(&mut self, task: NewTask) -> Result<Task, StoreError> {
        Ok(sqlx::query_as::<_, Task>(
            r#"
            INSERT INTO tasks (id, user_id, title, due_at, flag_id, subflag_id, source_inbox_item_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, user_id, title, due_at, flag_id, subflag_id, source_inbox_item_id,
                      created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(task.user_id)
        .bind(&task.title)
        .bind(task.due_at)
        .bind(task.context.flag_id)
        .bind(task.context.subflag_id)
        .bind(task.source_inbox_item_id)
        .fetch_one(&mut *self.tx)
        .await?)
    }

    async fn create_reminder(&mut self, reminder: NewReminder) -> Result<Reminder, StoreError> {
        Ok(sqlx::query_as::<_, Reminder>(
            r#"
            INSERT INTO reminders
                (id, user_id, title, remind_at, flag_id, subflag_id, source_inbox_item_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, user_id, title, remind_at, flag_id, subflag_id, source_inbox_item_id,
                      created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(reminder.user_id)
        .bind(&reminder.title)
        .bind(reminder.remind_at)
        .bind(reminder.context.flag_id)
        .bind(reminder.context.subflag_id)
        .bind(reminder.source_inbox_item_id)
        .fetch_one(&mut *self.tx)
        .await?)
    }

    async fn create_event(&mut self, event: NewEvent) -> Result<Event, StoreError> {
        Ok(sqlx::query_as::<_, Event>(
            r#"
            INSERT INTO events
                (id, user_id, title, start_at, end_at, all_day, flag_id, subflag_id,
                 source_inbox_item_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id, user_id, title, start_at, end_at, all_day, flag_id, subflag_id,
                      source_inbox_item_id, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(event.user_id)
        .bind(&event.title)
        .bind(event.start_at)
        .bind(event.end_at)
        .bind(event.all_day)
        .bind(event.context.flag_id)
        .bind(event.context.subflag_id)
        .bind(event.source_inbox_item_id)
        .fetch_one(&mut *self.tx)
        .await?)
    }

    async fn create_shopping_list(
        &mut self,
        list: NewShoppingList,
    ) -> Result<ShoppingList, StoreError> {
        Ok(sqlx::query_as::<_, ShoppingList>(
            r#"
            INSERT INTO shopping_lists
                (id, user_id, title, flag_id, subflag_id, source_inbox_item_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, user_id, title, flag_id, subflag_id, source_inbox_item_id, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(list.user_id)
        .bind(&list.title)
        .bind(list.context.flag_id)
        .bind(list.context.subflag_id)
        .bind(list.source_inbox_item_id)
        .fetch_one(&mut *self.tx)
        .await?)
    }

    async fn create_shopping_item(
        &mut self,
        item: NewShoppingItem,
    ) -> Result<ShoppingItem, StoreError> {
        Ok(sqlx::query_as::<_, ShoppingItem>(
            r#"
            INSERT INTO shopping_items
                (id, user_id, list_id, title, quantity, checked, sort_order)
            VALUES ($1, $2, $3, $4, $5, false, $6)
            RETURNING id, user_id, list_id, title, quantity, checked, sort_order, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(item.user_id)
        .bind(item.list_id)
        .bind(&item.title)
        .bind(&item.quantity)
        .bind(item.sort_order)
        .fetch_one(&mut *self.tx)
        .await?)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }
}
