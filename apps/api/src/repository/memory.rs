//! In-memory store for tests. A transaction works on a snapshot of the whole
//! state and swaps it in on commit, so a dropped transaction leaves no trace.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::models::context::{ContextRule, Flag, Subflag};
use crate::models::entities::{
    Event, NewEvent, NewReminder, NewShoppingItem, NewShoppingList, NewTask, Reminder,
    ShoppingItem, ShoppingList, Task,
};
use crate::models::inbox::{AiSuggestion, InboxItem, NewAiSuggestion, NewInboxItem, InboxStatus};
use crate::models::user::UserProfile;
use crate::repository::{
    ContextRepository, InboxFilter, InboxRepository, ListOptions, Page, StoreError,
    TxRepositories, TxRunner,
};

#[derive(Debug, Clone, Default)]
pub struct MemoryState {
    pub profiles: HashMap<Uuid, UserProfile>,
    pub flags: Vec<Flag>,
    pub subflags: Vec<Subflag>,
    pub rules: Vec<ContextRule>,
    pub items: Vec<InboxItem>,
    pub suggestions: Vec<AiSuggestion>,
    pub tasks: Vec<Task>,
    pub reminders: Vec<Reminder>,
    pub events: Vec<Event>,
    pub shopping_lists: Vec<ShoppingList>,
    pub shopping_items: Vec<ShoppingItem>,
    /// Shopping item title whose insert fails, to exercise rollback.
    pub fail_shopping_item: Option<String>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().expect("memory store poisoned")
    }

    pub fn add_user(&self, locale: &str, timezone: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.state().profiles.insert(
            id,
            UserProfile {
                id,
                locale: locale.to_string(),
                timezone: timezone.to_string(),
            },
        );
        id
    }

    pub fn add_flag(&self, user_id: Uuid, name: &str) -> Flag {
        let mut state = self.state();
        let flag = Flag {
            id: Uuid::new_v4(),
            user_id,
            name: name.to_string(),
            sort_order: state.flags.len() as i32,
            created_at: Utc::now(),
        };
        state.flags.push(flag.clone());
        flag
    }

    pub fn add_subflag(&self, user_id: Uuid, flag_id: Uuid, name: &str) -> Subflag {
        let mut state = self.state();
        let subflag = Subflag {
            id: Uuid::new_v4(),
            user_id,
            flag_id,
            name: name.to_string(),
            sort_order: state.subflags.len() as i32,
            created_at: Utc::now(),
        };
        state.subflags.push(subflag.clone());
        subflag
    }

    pub fn add_rule(
        &self,
        user_id: Uuid,
        keyword: &str,
        flag_id: Uuid,
        subflag_id: Option<Uuid>,
    ) -> ContextRule {
        let rule = ContextRule {
            id: Uuid::new_v4(),
            user_id,
            keyword: keyword.to_string(),
            flag_id,
            subflag_id,
            created_at: Utc::now(),
        };
        self.state().rules.push(rule.clone());
        rule
    }

    pub fn set_status(&self, user_id: Uuid, id: Uuid, status: InboxStatus) {
        let mut state = self.state();
        if let Some(item) = state
            .items
            .iter_mut()
            .find(|i| i.id == id && i.user_id == user_id)
        {
            item.status = status;
        }
    }
}

fn paginate<T: Clone>(rows: Vec<T>, opts: &ListOptions) -> Result<Page<T>, StoreError> {
    let (limit, offset) = opts.limit_offset()?;
    let items: Vec<T> = rows
        .into_iter()
        .skip(offset as usize)
        .take(limit as usize)
        .collect();
    Ok(Page::from_offset(items, offset, limit))
}

fn update_in(state: &mut MemoryState, item: &InboxItem) -> Result<InboxItem, StoreError> {
    let stored = state
        .items
        .iter_mut()
        .find(|i| i.id == item.id && i.user_id == item.user_id)
        .ok_or(StoreError::NotFound)?;
    stored.source = item.source;
    stored.raw_text = item.raw_text.clone();
    stored.raw_media_url = item.raw_media_url.clone();
    stored.status = item.status;
    stored.last_error = item.last_error.clone();
    stored.updated_at = Utc::now();
    Ok(stored.clone())
}

#[async_trait]
impl ContextRepository for MemoryStore {
    async fn get_profile(&self, user_id: Uuid) -> Result<UserProfile, StoreError> {
        self.state()
            .profiles
            .get(&user_id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn get_flag(&self, user_id: Uuid, id: Uuid) -> Result<Flag, StoreError> {
        self.state()
            .flags
            .iter()
            .find(|f| f.id == id && f.user_id == user_id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn get_subflag(&self, user_id: Uuid, id: Uuid) -> Result<Subflag, StoreError> {
        self.state()
            .subflags
            .iter()
            .find(|s| s.id == id && s.user_id == user_id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn list_flags(
        &self,
        user_id: Uuid,
        opts: &ListOptions,
    ) -> Result<Page<Flag>, StoreError> {
        let rows = self
            .state()
            .flags
            .iter()
            .filter(|f| f.user_id == user_id)
            .cloned()
            .collect();
        paginate(rows, opts)
    }

    async fn list_subflags(
        &self,
        user_id: Uuid,
        flag_id: Uuid,
        opts: &ListOptions,
    ) -> Result<Page<Subflag>, StoreError> {
        let rows = self
            .state()
            .subflags
            .iter()
            .filter(|s| s.user_id == user_id && s.flag_id == flag_id)
            .cloned()
            .collect();
        paginate(rows, opts)
    }

    async fn list_context_rules(
        &self,
        user_id: Uuid,
        opts: &ListOptions,
    ) -> Result<Page<ContextRule>, StoreError> {
        let rows = self
            .state()
            .rules
            .iter()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        paginate(rows, opts)
    }
}

#[async_trait]
impl InboxRepository for MemoryStore {
    async fn create_item(&self, item: NewInboxItem) -> Result<InboxItem, StoreError> {
        let now = Utc::now();
        let created = InboxItem {
            id: Uuid::new_v4(),
            user_id: item.user_id,
            source: item.source,
            raw_text: item.raw_text,
            raw_media_url: item.raw_media_url,
            status: InboxStatus::New,
            last_error: None,
            created_at: now,
            updated_at: now,
        };
        self.state().items.push(created.clone());
        Ok(created)
    }

    async fn get_item(&self, user_id: Uuid, id: Uuid) -> Result<InboxItem, StoreError> {
        self.state()
            .items
            .iter()
            .find(|i| i.id == id && i.user_id == user_id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn update_item(&self, item: &InboxItem) -> Result<InboxItem, StoreError> {
        update_in(&mut self.state(), item)
    }

    async fn list_items(
        &self,
        user_id: Uuid,
        filter: &InboxFilter,
        opts: &ListOptions,
    ) -> Result<Page<InboxItem>, StoreError> {
        let rows = self
            .state()
            .items
            .iter()
            .rev()
            .filter(|i| i.user_id == user_id)
            .filter(|i| filter.status.map_or(true, |s| i.status == s))
            .filter(|i| filter.source.map_or(true, |s| i.source == s))
            .cloned()
            .collect();
        paginate(rows, opts)
    }

    async fn latest_suggestion(
        &self,
        user_id: Uuid,
        inbox_item_id: Uuid,
    ) -> Result<Option<AiSuggestion>, StoreError> {
        Ok(self
            .state()
            .suggestions
            .iter()
            .filter(|s| s.user_id == user_id && s.inbox_item_id == inbox_item_id)
            .max_by_key(|s| s.created_at)
            .cloned())
    }
}

pub struct MemoryTx {
    store: MemoryStore,
    working: MemoryState,
}

#[async_trait]
impl TxRunner for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn TxRepositories>, StoreError> {
        let working = self.state().clone();
        Ok(Box::new(MemoryTx {
            store: self.clone(),
            working,
        }))
    }
}

#[async_trait]
impl TxRepositories for MemoryTx {
    async fn create_suggestion(
        &mut self,
        suggestion: NewAiSuggestion,
    ) -> Result<AiSuggestion, StoreError> {
        let created = AiSuggestion {
            id: Uuid::new_v4(),
            user_id: suggestion.user_id,
            inbox_item_id: suggestion.inbox_item_id,
            kind: suggestion.kind,
            title: suggestion.title,
            confidence: suggestion.confidence,
            flag_id: suggestion.flag_id,
            subflag_id: suggestion.subflag_id,
            needs_review: suggestion.needs_review,
            payload: suggestion.payload,
            created_at: Utc::now(),
        };
        self.working.suggestions.push(created.clone());
        Ok(created)
    }

    async fn update_item(&mut self, item: &InboxItem) -> Result<InboxItem, StoreError> {
        update_in(&mut self.working, item)
    }

    async fn create_task(&mut self, task: NewTask) -> Result<Task, StoreError> {
        let created = Task {
            id: Uuid::new_v4(),
            user_id: task.user_id,
            title: task.title,
            due_at: task.due_at,
            flag_id: task.context.flag_id,
            subflag_id: task.context.subflag_id,
            source_inbox_item_id: Some(task.source_inbox_item_id),
            created_at: Utc::now(),
        };
        self.working.tasks.push(created.clone());
        Ok(created)
    }

    async fn create_reminder(&mut self, reminder: NewReminder) -> Result<Reminder, StoreError> {
        let created = Reminder {
            id: Uuid::new_v4(),
            user_id: reminder.user_id,
            title: reminder.title,
            remind_at: Some(reminder.remind_at),
            flag_id: reminder.context.flag_id,
            subflag_id: reminder.context.subflag_id,
            source_inbox_item_id: Some(reminder.source_inbox_item_id),
            created_at: Utc::now(),
        };
        self.working.reminders.push(created.clone());
        Ok(created)
    }

    async fn create_event(&mut self, event: NewEvent) -> Result<Event, StoreError> {
        let created = Event {
            id: Uuid::new_v4(),
            user_id: event.user_id,
            title: event.title,
            start_at: Some(event.start_at),
            end_at: event.end_at,
            all_day: event.all_day,
            flag_id: event.context.flag_id,
            subflag_id: event.context.subflag_id,
            source_inbox_item_id: Some(event.source_inbox_item_id),
            created_at: Utc::now(),
        };
        self.working.events.push(created.clone());
        Ok(created)
    }

    async fn create_shopping_list(
        &mut self,
        list: NewShoppingList,
    ) -> Result<ShoppingList, StoreError> {
        let created = ShoppingList {
            id: Uuid::new_v4(),
            user_id: list.user_id,
            title: list.title,
            flag_id: list.context.flag_id,
            subflag_id: list.context.subflag_id,
            source_inbox_item_id: Some(list.source_inbox_item_id),
            created_at: Utc::now(),
        };
        self.working.shopping_lists.push(created.clone());
        Ok(created)
    }

    async fn create_shopping_item(
        &mut self,
        item: NewShoppingItem,
    ) -> Result<ShoppingItem, StoreError> {
        if self.working.fail_shopping_item.as_deref() == Some(item.title.as_str()) {
            return Err(StoreError::Database(sqlx::Error::Protocol(
                "injected shopping item failure".to_string(),
            )));
        }
        let created = ShoppingItem {
            id: Uuid::new_v4(),
            user_id: item.user_id,
            list_id: item.list_id,
            title: item.title,
            quantity: item.quantity,
            checked: false,
            sort_order: item.sort_order,
            created_at: Utc::now(),
        };
        self.working.shopping_items.push(created.clone());
        Ok(created)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryTx { store, working } = *self;
        *store.state() = working;
        Ok(())
    }
}
