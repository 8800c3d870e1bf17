use uuid::Uuid;

use crate::errors::AppError;
use crate::models::entities::ContextRef;
use crate::repository::{ContextRepository, StoreError};

/// Resolves caller-supplied flag/subflag ids for a confirmed entity.
///
/// Blank ids are treated as absent. A subflag alone implies its parent flag;
/// when both are given the subflag must belong to that flag. Anything that
/// does not parse or does not exist for the user is `InvalidReference`.
pub async fn resolve_context(
    repo: &dyn ContextRepository,
    user_id: Uuid,
    flag_id: Option<&str>,
    subflag_id: Option<&str>,
) -> Result<ContextRef, AppError> {
    let flag_id = parse_ref(flag_id)?;
    let subflag_id = parse_ref(subflag_id)?;

    let flag = match flag_id {
        Some(id) => Some(repo.get_flag(user_id, id).await.map_err(reference_error)?),
        None => None,
    };

    let Some(sub_id) = subflag_id else {
        return Ok(ContextRef {
            flag_id: flag.map(|f| f.id),
            subflag_id: None,
        });
    };

    let sub = repo
        .get_subflag(user_id, sub_id)
        .await
        .map_err(reference_error)?;

    match flag {
        Some(f) if f.id != sub.flag_id => Err(AppError::InvalidReference),
        _ => Ok(ContextRef {
            flag_id: Some(sub.flag_id),
            subflag_id: Some(sub.id),
        }),
    }
}

fn parse_ref(raw: Option<&str>) -> Result<Option<Uuid>, AppError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => Uuid::parse_str(s)
            .map(Some)
            .map_err(|_| AppError::InvalidReference),
    }
}

fn reference_error(err: StoreError) -> AppError {
    match err {
        StoreError::NotFound => AppError::InvalidReference,
        other => other.into(),
    }
}
