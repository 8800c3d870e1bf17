//! Inbox triage orchestrator.
//!
//! Owns the inbox item lifecycle. Reprocess runs matcher, prompt builder,
//! completion client and schema validator in that order; confirm re-validates
//! the caller's payload and materializes it. Every multi-row write goes
//! through one [`TxRunner`] transaction.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::context::catalog::load_catalog;
use crate::context::matcher::match_rule;
use crate::context::resolve::resolve_context;
use crate::errors::AppError;
use crate::llm_client::CompletionClient;
use crate::models::entities::{
    ContextRef, Event, NewEvent, NewReminder, NewShoppingItem, NewShoppingList, NewTask, Reminder,
    ShoppingItem, ShoppingList, Task,
};
use crate::models::inbox::{
    AiSuggestion, InboxItem, InboxSource, InboxStatus, NewAiSuggestion, NewInboxItem,
    SuggestionType,
};
use crate::repository::{
    ContextRepository, InboxFilter, InboxRepository, ListOptions, Page, TxRepositories, TxRunner,
};

use super::prompts::{build_prompt, ContextHint, PromptInput};
use super::schema::{self, SuggestionPayload, ValidatedSuggestion};

/// Longest `last_error` kept on an item, in characters.
pub const MAX_LAST_ERROR_CHARS: usize = 500;

pub type Clock = fn() -> DateTime<Utc>;

#[derive(Debug, Clone, Default)]
pub struct CreateInboxItem {
    pub source: Option<String>,
    pub raw_text: String,
    pub raw_media_url: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct InboxQuery {
    pub status: Option<String>,
    pub source: Option<String>,
    pub limit: Option<i64>,
    pub cursor: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ConfirmInput {
    pub kind: String,
    pub title: String,
    pub flag_id: Option<String>,
    pub subflag_id: Option<String>,
    pub payload: Value,
}

/// An inbox item together with its most recent suggestion.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InboxItemView {
    #[serde(flatten)]
    pub item: InboxItem,
    pub suggestion: Option<AiSuggestion>,
}

/// Exactly one of the entity fields is set, matching `kind`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmResult {
    #[serde(rename = "type")]
    pub kind: SuggestionType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<Task>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reminder: Option<Reminder>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<Event>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shopping_list: Option<ShoppingList>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub shopping_items: Vec<ShoppingItem>,
}

impl ConfirmResult {
    fn empty(kind: SuggestionType) -> Self {
        ConfirmResult {
            kind,
            task: None,
            reminder: None,
            event: None,
            shopping_list: None,
            shopping_items: Vec::new(),
        }
    }
}

pub struct InboxTriage {
    contexts: Arc<dyn ContextRepository>,
    inbox: Arc<dyn InboxRepository>,
    tx: Arc<dyn TxRunner>,
    client: Option<Arc<dyn CompletionClient>>,
    clock: Clock,
}

impl InboxTriage {
    pub fn new(
        contexts: Arc<dyn ContextRepository>,
        inbox: Arc<dyn InboxRepository>,
        tx: Arc<dyn TxRunner>,
        client: Option<Arc<dyn CompletionClient>>,
    ) -> Self {
        Self {
            contexts,
            inbox,
            tx,
            client,
            clock: Utc::now,
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    // ──────────────────────────────────────────────
    // Queries
    // ──────────────────────────────────────────────

    pub async fn create_item(
        &self,
        user_id: Uuid,
        input: CreateInboxItem,
    ) -> Result<InboxItem, AppError> {
        let raw_text = input.raw_text.trim();
        if raw_text.is_empty() {
            return Err(AppError::MissingRequiredFields);
        }
        let source = match input.source.as_deref().map(str::trim) {
            None | Some("") => InboxSource::Manual,
            Some(s) => s.parse().map_err(|_| AppError::InvalidSource)?,
        };
        let raw_media_url = input
            .raw_media_url
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty());

        let item = self
            .inbox
            .create_item(NewInboxItem {
                user_id,
                source,
                raw_text: raw_text.to_string(),
                raw_media_url,
            })
            .await?;
        info!("Inbox item {} created (source={})", item.id, item.source);
        Ok(item)
    }

    pub async fn list_items(
        &self,
        user_id: Uuid,
        query: InboxQuery,
    ) -> Result<Page<InboxItemView>, AppError> {
        let filter = InboxFilter {
            status: parse_filter(query.status.as_deref(), AppError::InvalidStatus)?,
            source: parse_filter(query.source.as_deref(), AppError::InvalidSource)?,
        };
        let opts = ListOptions {
            limit: query.limit.unwrap_or(0),
            cursor: query.cursor,
        };

        let page = self.inbox.list_items(user_id, &filter, &opts).await?;
        let mut items = Vec::with_capacity(page.items.len());
        for item in page.items {
            let suggestion = self.inbox.latest_suggestion(user_id, item.id).await?;
            items.push(InboxItemView { item, suggestion });
        }
        Ok(Page {
            items,
            next_cursor: page.next_cursor,
        })
    }

    pub async fn get_item(&self, user_id: Uuid, id: Uuid) -> Result<InboxItemView, AppError> {
        let item = self.inbox.get_item(user_id, id).await?;
        let suggestion = self.inbox.latest_suggestion(user_id, id).await?;
        Ok(InboxItemView { item, suggestion })
    }

    // ──────────────────────────────────────────────
    // Reprocess
    // ──────────────────────────────────────────────

    /// Classifies the item again.
    ///
    /// Provider and schema failures are not errors for the caller: the item
    /// lands in NEEDS_REVIEW with the diagnostic in `last_error`. Errors are
    /// returned only for bad input, missing wiring and storage failures.
    pub async fn reprocess(&self, user_id: Uuid, id: Uuid) -> Result<InboxItemView, AppError> {
        let client = self
            .client
            .clone()
            .ok_or(AppError::DependencyMissing("completion client"))?;

        let mut item = self.inbox.get_item(user_id, id).await?;
        if item.status.is_terminal() {
            return Err(AppError::InvalidStatus);
        }

        item.status = InboxStatus::Processing;
        item.last_error = None;
        let mut item = self.inbox.update_item(&item).await?;

        let profile = self.contexts.get_profile(user_id).await?;
        let catalog = load_catalog(self.contexts.as_ref(), user_id).await?;
        let options = catalog.options();
        let hint = match_rule(&item.raw_text, &catalog.rules).map(|m| ContextHint::from(&m));

        let prompt = build_prompt(&PromptInput {
            raw_text: &item.raw_text,
            locale: &profile.locale,
            timezone: &profile.timezone,
            now: Some((self.clock)()),
            contexts: &options,
            rules: &catalog.rules,
            hint,
        });

        let completion = match client.complete(&prompt).await {
            Ok(c) => c,
            Err(e) => return self.fail_processing(item, &e.to_string()).await,
        };
        let validated = match schema::validate(&completion.content) {
            Ok(v) => v,
            Err(e) => return self.fail_processing(item, &e.to_string()).await,
        };

        let (flag_id, subflag_id) =
            catalog.retain_known(validated.flag_id.as_deref(), validated.subflag_id.as_deref());
        let new_suggestion = suggestion_row(user_id, item.id, &validated, flag_id, subflag_id);

        let mut tx = self.tx.begin().await?;
        let suggestion = tx.create_suggestion(new_suggestion).await?;
        item.status = if suggestion.needs_review {
            InboxStatus::NeedsReview
        } else {
            InboxStatus::Suggested
        };
        item.last_error = None;
        let item = tx.update_item(&item).await?;
        tx.commit().await?;

        info!(
            "Inbox item {} reprocessed: status={}, type={}, model={}",
            item.id, item.status, suggestion.kind, completion.model
        );
        Ok(InboxItemView {
            item,
            suggestion: Some(suggestion),
        })
    }

    async fn fail_processing(
        &self,
        mut item: InboxItem,
        cause: &str,
    ) -> Result<InboxItemView, AppError> {
        let text = truncate_chars(cause, MAX_LAST_ERROR_CHARS);
        warn!("Inbox item {} needs review: {text}", item.id);
        item.status = InboxStatus::NeedsReview;
        item.last_error = Some(text);
        let item = self.inbox.update_item(&item).await?;
        Ok(InboxItemView {
            item,
            suggestion: None,
        })
    }

    // ──────────────────────────────────────────────
    // Confirm / dismiss
    // ──────────────────────────────────────────────

    pub async fn confirm(
        &self,
        user_id: Uuid,
        id: Uuid,
        input: ConfirmInput,
    ) -> Result<ConfirmResult, AppError> {
        let title = input.title.trim();
        if title.is_empty() || input.kind.trim().is_empty() {
            return Err(AppError::MissingRequiredFields);
        }
        let kind: SuggestionType = input.kind.parse().map_err(|_| AppError::InvalidType)?;
        if kind == SuggestionType::Note {
            return Err(AppError::InvalidType);
        }

        let mut item = self.inbox.get_item(user_id, id).await?;
        if item.status.is_terminal() {
            return Err(AppError::InvalidStatus);
        }
        if input.payload.is_null() {
            return Err(AppError::MissingRequiredFields);
        }

        let envelope = json!({
            "type": kind.as_str(),
            "title": title,
            "needs_review": false,
            "payload": input.payload,
        });
        let validated =
            schema::validate_value(envelope).map_err(|e| AppError::InvalidPayload(e.to_string()))?;

        let context = resolve_context(
            self.contexts.as_ref(),
            user_id,
            input.flag_id.as_deref(),
            input.subflag_id.as_deref(),
        )
        .await?;

        let mut tx = self.tx.begin().await?;
        let result =
            materialize(tx.as_mut(), user_id, item.id, &validated, context).await?;
        tx.create_suggestion(suggestion_row(
            user_id,
            item.id,
            &validated,
            context.flag_id,
            context.subflag_id,
        ))
        .await?;
        item.status = InboxStatus::Confirmed;
        item.last_error = None;
        tx.update_item(&item).await?;
        tx.commit().await?;

        info!("Inbox item {} confirmed as {}", item.id, result.kind);
        Ok(result)
    }

    /// Dismissing twice is fine; dismissing a confirmed item is not.
    pub async fn dismiss(&self, user_id: Uuid, id: Uuid) -> Result<InboxItem, AppError> {
        let mut item = self.inbox.get_item(user_id, id).await?;
        if item.status == InboxStatus::Confirmed {
            return Err(AppError::InvalidStatus);
        }
        item.status = InboxStatus::Dismissed;
        item.last_error = None;
        let item = self.inbox.update_item(&item).await?;
        info!("Inbox item {} dismissed", item.id);
        Ok(item)
    }
}

/// Writes the entity family for `validated` inside `tx`.
async fn materialize(
    tx: &mut dyn TxRepositories,
    user_id: Uuid,
    inbox_item_id: Uuid,
    validated: &ValidatedSuggestion,
    context: ContextRef,
) -> Result<ConfirmResult, AppError> {
    let title = validated.title.clone();
    let mut result = ConfirmResult::empty(validated.kind());

    match &validated.payload {
        SuggestionPayload::Task(p) => {
            let task = tx
                .create_task(NewTask {
                    user_id,
                    title,
                    due_at: p.due_at,
                    context,
                    source_inbox_item_id: inbox_item_id,
                })
                .await?;
            result.task = Some(task);
        }
        SuggestionPayload::Reminder(p) => {
            let reminder = tx
                .create_reminder(NewReminder {
                    user_id,
                    title,
                    remind_at: p.at,
                    context,
                    source_inbox_item_id: inbox_item_id,
                })
                .await?;
            result.reminder = Some(reminder);
        }
        SuggestionPayload::Event(p) => {
            let event = tx
                .create_event(NewEvent {
                    user_id,
                    title,
                    start_at: p.start,
                    end_at: p.end,
                    all_day: p.all_day,
                    context,
                    source_inbox_item_id: inbox_item_id,
                })
                .await?;
            result.event = Some(event);
        }
        SuggestionPayload::Shopping(p) => {
            let list = tx
                .create_shopping_list(NewShoppingList {
                    user_id,
                    title,
                    context,
                    source_inbox_item_id: inbox_item_id,
                })
                .await?;
            for (idx, entry) in p.items.iter().enumerate() {
                let created = tx
                    .create_shopping_item(NewShoppingItem {
                        user_id,
                        list_id: list.id,
                        title: entry.title.clone(),
                        quantity: entry.quantity.clone(),
                        sort_order: idx as i32,
                    })
                    .await?;
                result.shopping_items.push(created);
            }
            result.shopping_list = Some(list);
        }
        SuggestionPayload::Note(_) => return Err(AppError::InvalidType),
    }

    Ok(result)
}

fn suggestion_row(
    user_id: Uuid,
    inbox_item_id: Uuid,
    validated: &ValidatedSuggestion,
    flag_id: Option<Uuid>,
    subflag_id: Option<Uuid>,
) -> NewAiSuggestion {
    NewAiSuggestion {
        user_id,
        inbox_item_id,
        kind: validated.kind(),
        title: validated.title.clone(),
        confidence: validated.confidence,
        flag_id,
        subflag_id,
        needs_review: validated.needs_review,
        payload: validated.payload.to_json(),
    }
}

fn parse_filter<T: std::str::FromStr>(
    raw: Option<&str>,
    invalid: AppError,
) -> Result<Option<T>, AppError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => s.parse().map(Some).map_err(|_| invalid),
    }
}

/// Cuts at a char boundary so multi-byte text never splits.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
