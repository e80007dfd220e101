use std::collections::HashSet;

use tracing::{info, instrument};

use crate::auth::{Identity, Permission};
use crate::error::AppError;
use crate::models::{Coach, School};
use crate::storage::{Collection, JsonStore};

fn ensure_unique<'a>(ids: impl Iterator<Item = &'a str>, what: &str) -> Result<(), AppError> {
    let mut seen = HashSet::new();
    for id in ids {
        if id.trim().is_empty() {
            return Err(AppError::Validation(format!("{} id must not be empty", what)));
        }
        if !seen.insert(id) {
            return Err(AppError::Validation(format!("Duplicate {} id '{}'", what, id)));
        }
    }
    Ok(())
}

/// Replaces the whole school roster with the edited table. Coach lists have
/// already been normalized while deserializing each row.
#[instrument(skip_all, fields(ps_number = %identity.ps_number, rows = rows.len()))]
pub async fn replace_schools(
    store: &JsonStore,
    identity: &Identity,
    rows: Vec<School>,
) -> Result<Vec<School>, AppError> {
    identity.require_permission(Permission::ManageSchools)?;
    ensure_unique(rows.iter().map(|s| s.id.as_str()), "School")?;

    let _guard = store.write_lock().await;
    store.save(Collection::Schools, &rows).await?;
    info!("Replaced school roster");

    Ok(rows)
}

#[instrument(skip_all, fields(ps_number = %identity.ps_number, rows = rows.len()))]
pub async fn replace_coaches(
    store: &JsonStore,
    identity: &Identity,
    rows: Vec<Coach>,
) -> Result<Vec<Coach>, AppError> {
    identity.require_permission(Permission::ManageCoaches)?;
    ensure_unique(rows.iter().map(|c| c.ps_number.as_str()), "Coach")?;

    let _guard = store.write_lock().await;
    store.save(Collection::Coaches, &rows).await?;
    info!("Replaced coach roster");

    Ok(rows)
}
