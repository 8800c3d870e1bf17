use std::future::Future;

use uuid::Uuid;

use crate::models::context::{ContextRule, Flag, Subflag};
use crate::repository::{ContextRepository, ListOptions, Page, StoreError};

/// Page size used when draining a paginated listing.
pub const LIST_ALL_PAGE_SIZE: i64 = 200;

/// One selectable classification offered to the model: a flag on its own, or
/// a flag narrowed by one of its subflags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextOption {
    pub flag_id: Uuid,
    pub flag_name: String,
    pub subflag_id: Option<Uuid>,
    pub subflag_name: Option<String>,
}

/// Everything a user has configured for classification, fully loaded.
#[derive(Debug, Clone, Default)]
pub struct ContextCatalog {
    pub flags: Vec<Flag>,
    pub subflags: Vec<Subflag>,
    pub rules: Vec<ContextRule>,
}

async fn drain<T, F, Fut>(mut fetch: F) -> Result<Vec<T>, StoreError>
where
    F: FnMut(ListOptions) -> Fut,
    Fut: Future<Output = Result<Page<T>, StoreError>>,
{
    let mut out = Vec::new();
    let mut cursor: Option<String> = None;
    loop {
        let page = fetch(ListOptions {
            limit: LIST_ALL_PAGE_SIZE,
            cursor: cursor.take(),
        })
        .await?;
        out.extend(page.items);
        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => return Ok(out),
        }
    }
}

pub async fn list_all_flags(
    repo: &dyn ContextRepository,
    user_id: Uuid,
) -> Result<Vec<Flag>, StoreError> {
    drain(|opts| async move { repo.list_flags(user_id, &opts).await }).await
}

pub async fn list_all_subflags(
    repo: &dyn ContextRepository,
    user_id: Uuid,
    flag_id: Uuid,
) -> Result<Vec<Subflag>, StoreError> {
    drain(|opts| async move { repo.list_subflags(user_id, flag_id, &opts).await }).await
}

pub async fn list_all_rules(
    repo: &dyn ContextRepository,
    user_id: Uuid,
) -> Result<Vec<ContextRule>, StoreError> {
    drain(|opts| async move { repo.list_context_rules(user_id, &opts).await }).await
}

/// Loads flags, the subflags of every flag, and all keyword rules.
pub async fn load_catalog(
    repo: &dyn ContextRepository,
    user_id: Uuid,
) -> Result<ContextCatalog, StoreError> {
    let flags = list_all_flags(repo, user_id).await?;
    let mut subflags = Vec::new();
    for flag in &flags {
        subflags.extend(list_all_subflags(repo, user_id, flag.id).await?);
    }
    let rules = list_all_rules(repo, user_id).await?;

    tracing::debug!(
        "Loaded context catalog for {user_id}: {} flags, {} subflags, {} rules",
        flags.len(),
        subflags.len(),
        rules.len()
    );

    Ok(ContextCatalog {
        flags,
        subflags,
        rules,
    })
}

impl ContextCatalog {
    /// Flattens the catalog: each flag, followed by one entry per subflag.
    pub fn options(&self) -> Vec<ContextOption> {
        let mut out = Vec::with_capacity(self.flags.len() + self.subflags.len());
        for flag in &self.flags {
            out.push(ContextOption {
                flag_id: flag.id,
                flag_name: flag.name.clone(),
                subflag_id: None,
                subflag_name: None,
            });
            for sub in self.subflags.iter().filter(|s| s.flag_id == flag.id) {
                out.push(ContextOption {
                    flag_id: flag.id,
                    flag_name: flag.name.clone(),
                    subflag_id: Some(sub.id),
                    subflag_name: Some(sub.name.clone()),
                });
            }
        }
        out
    }

    /// Keeps only the ids that name something in this catalog.
    ///
    /// Unlike [`super::resolve::resolve_context`] this never fails: ids the
    /// model invented are dropped. A subflag whose parent disagrees with the
    /// given flag is dropped; a subflag on its own brings its parent along.
    pub fn retain_known(
        &self,
        flag_id: Option<&str>,
        subflag_id: Option<&str>,
    ) -> (Option<Uuid>, Option<Uuid>) {
        let flag = parse_id(flag_id).filter(|id| self.flags.iter().any(|f| f.id == *id));
        let sub = parse_id(subflag_id).and_then(|id| self.subflags.iter().find(|s| s.id == id));

        match (flag, sub) {
            (Some(f), Some(s)) if s.flag_id == f => (Some(f), Some(s.id)),
            (Some(f), _) => (Some(f), None),
            (None, Some(s)) => (Some(s.flag_id), Some(s.id)),
            (None, None) => (None, None),
        }
    }
}

fn parse_id(raw: Option<&str>) -> Option<Uuid> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|s| Uuid::parse_str(s).ok())
}
