use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use validator::Validate;

use crate::auth::{Identity, Permission};
use crate::error::AppError;
use crate::models::{Material, Request, RequestChanges, School, StoredRequest};
use crate::storage::{Collection, JsonStore};

pub fn visible_schools<'a>(identity: &Identity, schools: &'a [School]) -> Vec<&'a School> {
    if identity.is_admin() {
        return schools.iter().collect();
    }

    schools
        .iter()
        .filter(|school| school.has_coach(&identity.ps_number))
        .collect()
}

pub fn materials_by_category<'a>(materials: &'a [Material], category: &str) -> Vec<&'a Material> {
    materials
        .iter()
        .filter(|material| material.category == category)
        .collect()
}

/// Distinct categories in catalog order.
pub fn categories(materials: &[Material]) -> Vec<&str> {
    let mut seen = HashSet::new();
    materials
        .iter()
        .map(|material| material.category.as_str())
        .filter(|category| seen.insert(*category))
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct BatchItem {
    #[validate(length(min = 1, message = "Choose a school"))]
    pub school_id: String,
    #[validate(length(min = 1, message = "Choose a category"))]
    pub category: String,
    #[validate(length(min = 1, message = "Choose a material"))]
    pub material: String,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: u32,
}

#[instrument(skip_all, fields(ps_number = %identity.ps_number, school_id = %item.school_id))]
pub fn add_to_batch(
    batch: &mut Vec<Request>,
    identity: &Identity,
    item: BatchItem,
    schools: &[School],
    materials: &[Material],
) -> Result<Request, AppError> {
    identity.require_permission(Permission::SubmitRequests)?;
    item.validate()?;

    let school_visible = visible_schools(identity, schools)
        .iter()
        .any(|school| school.id == item.school_id);
    if !school_visible {
        return Err(AppError::Authorization(format!(
            "School {} is not assigned to {}",
            item.school_id, identity.ps_number
        )));
    }

    let in_catalog = materials_by_category(materials, &item.category)
        .iter()
        .any(|material| material.item == item.material);
    if !in_catalog {
        return Err(AppError::Validation(format!(
            "Material '{}' is not listed under '{}'",
            item.material, item.category
        )));
    }

    let request = Request::new_pending(
        &identity.ps_number,
        &item.school_id,
        &item.category,
        &item.material,
        item.quantity,
    );
    batch.push(request.clone());
    info!(request_id = %request.id, batch_len = batch.len(), "Added request to batch");

    Ok(request)
}

pub fn remove_from_batch(batch: &mut Vec<Request>, request_id: &str) -> bool {
    let before = batch.len();
    batch.retain(|request| request.id != request_id);
    batch.len() != before
}

/// Loads the request collection ahead of a rewrite, giving legacy records an
/// id and a Pending status. The file is rewritten once when anything had to
/// be filled in. Any record that cannot be read is an error, so no caller
/// ever saves over it.
///
/// Callers must hold the store's write lock.
#[instrument(skip(store))]
pub async fn load_requests(store: &JsonStore) -> Result<Vec<Request>, AppError> {
    let stored: Vec<StoredRequest> = store.load_for_update(Collection::Requests).await?;

    let backfilled = stored.iter().filter(|r| r.needs_backfill()).count();
    let requests = stored
        .into_iter()
        .enumerate()
        .map(|(index, record)| {
            Request::try_from(record).map_err(|reason| {
                AppError::CorruptData(format!("requests record {}: {}", index, reason))
            })
        })
        .collect::<Result<Vec<Request>, AppError>>()?;

    if backfilled > 0 {
        warn!(backfilled, "Backfilled requests missing an id or status");
        store.save(Collection::Requests, &requests).await?;
    }

    Ok(requests)
}

/// Read-only view of the request collection. Unreadable records, and records
/// still waiting for an id, are skipped with a warning.
#[instrument(skip(store))]
pub async fn read_requests(store: &JsonStore) -> Vec<Request> {
    let stored: Vec<StoredRequest> = store.load(Collection::Requests).await;

    stored
        .into_iter()
        .filter_map(|record| {
            if !record.has_id() {
                warn!("Skipped request without an id");
                return None;
            }
            Request::try_from(record)
                .inspect_err(|reason| warn!(%reason, "Skipped invalid request"))
                .ok()
        })
        .collect()
}

/// Appends the whole batch to the stored requests and empties it. On a
/// storage failure the batch is left as it was.
#[instrument(skip_all, fields(batch_len = batch.len()))]
pub async fn submit_batch(store: &JsonStore, batch: &mut Vec<Request>) -> Result<usize, AppError> {
    if batch.is_empty() {
        return Err(AppError::Validation("Batch is empty".to_string()));
    }

    let _guard = store.write_lock().await;
    let mut requests = load_requests(store).await?;
    requests.extend(batch.iter().cloned());
    store.save(Collection::Requests, &requests).await?;

    let submitted = batch.len();
    batch.clear();
    info!(submitted, "Submitted batch");

    Ok(submitted)
}

pub fn list_visible<'a>(identity: &Identity, requests: &'a [Request]) -> Vec<&'a Request> {
    if identity.has_permission(Permission::ViewAllRequests) {
        return requests.iter().collect();
    }

    requests
        .iter()
        .filter(|request| request.is_owned_by(&identity.ps_number))
        .collect()
}

/// Admins may change any request; owners only while it is still Pending.
pub fn can_modify(identity: &Identity, request: &Request) -> bool {
    identity.has_permission(Permission::EditAnyRequest)
        || (identity.has_permission(Permission::EditOwnPendingRequests)
            && request.is_owned_by(&identity.ps_number)
            && request.is_pending())
}

#[derive(Debug, Clone, PartialEq)]
pub enum EditOutcome {
    Applied(Request),
    Denied,
    NotFound,
}

#[instrument(skip(identity, requests, changes), fields(ps_number = %identity.ps_number))]
pub fn edit_request(
    identity: &Identity,
    requests: &mut [Request],
    request_id: &str,
    changes: RequestChanges,
) -> Result<EditOutcome, AppError> {
    changes.validate()?;

    let Some(request) = requests.iter_mut().find(|r| r.id == request_id) else {
        return Ok(EditOutcome::NotFound);
    };

    if !can_modify(identity, request) {
        warn!(owner = %request.ps_number, status = %request.status, "Edit refused");
        return Ok(EditOutcome::Denied);
    }

    let changes_status = changes.status.is_some_and(|status| status != request.status);
    if changes_status && !identity.has_permission(Permission::EditAnyRequest) {
        warn!("Only administrators may change request status");
        return Ok(EditOutcome::Denied);
    }

    changes.apply_to(request);
    info!(status = %request.status, "Edited request");

    Ok(EditOutcome::Applied(request.clone()))
}

#[instrument(skip(store, identity, changes), fields(ps_number = %identity.ps_number))]
pub async fn edit_stored_request(
    store: &JsonStore,
    identity: &Identity,
    request_id: &str,
    changes: RequestChanges,
) -> Result<EditOutcome, AppError> {
    let _guard = store.write_lock().await;
    let mut requests = load_requests(store).await?;

    let outcome = edit_request(identity, &mut requests, request_id, changes)?;
    if let EditOutcome::Applied(_) = outcome {
        store.save(Collection::Requests, &requests).await?;
    }

    Ok(outcome)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeleteSummary {
    pub deleted: Vec<String>,
    pub retained: Vec<String>,
    pub missing: Vec<String>,
}

pub fn delete_requests(
    identity: &Identity,
    requests: &mut Vec<Request>,
    request_ids: &[String],
) -> DeleteSummary {
    let wanted: HashSet<&str> = request_ids.iter().map(String::as_str).collect();
    let mut summary = DeleteSummary::default();

    requests.retain(|request| {
        if !wanted.contains(request.id.as_str()) {
            return true;
        }

        let deletable = request.is_pending()
            && (identity.has_permission(Permission::EditAnyRequest)
                || request.is_owned_by(&identity.ps_number));

        if deletable {
            summary.deleted.push(request.id.clone());
        } else {
            summary.retained.push(request.id.clone());
        }

        !deletable
    });

    let found: HashSet<&str> = summary
        .deleted
        .iter()
        .chain(&summary.retained)
        .map(String::as_str)
        .collect();
    let mut reported = HashSet::new();
    let missing = request_ids
        .iter()
        .filter(|id| !found.contains(id.as_str()) && reported.insert(id.as_str()))
        .cloned()
        .collect();
    summary.missing = missing;

    summary
}

#[instrument(skip(store, identity), fields(ps_number = %identity.ps_number))]
pub async fn delete_stored_requests(
    store: &JsonStore,
    identity: &Identity,
    request_ids: &[String],
) -> Result<DeleteSummary, AppError> {
    let _guard = store.write_lock().await;
    let mut requests = load_requests(store).await?;

    let summary = delete_requests(identity, &mut requests, request_ids);
    if !summary.deleted.is_empty() {
        store.save(Collection::Requests, &requests).await?;
    }

    if !summary.retained.is_empty() {
        warn!(retained = summary.retained.len(), "Some requests were not deletable");
    }
    info!(deleted = summary.deleted.len(), "Deleted requests");

    Ok(summary)
}
