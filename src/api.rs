use rocket::State;
use rocket::http::{Cookie, CookieJar, SameSite, Status};
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use serde::{Deserialize, Serialize};
use tracing::info;
use validator::Validate;

use crate::auth::{CurrentSession, Identity, Permission, SESSION_COOKIE, SessionStore, authenticate};
use crate::config::PortalConfig;
use crate::models::{Coach, Material, Request, RequestChanges, School, User};
use crate::schools::{replace_coaches, replace_schools};
use crate::storage::{Collection, JsonStore};
use crate::sync::{RemoteMirror, RemoteProbe, SyncReport, probe, sync_to_cloud};
use crate::validation::{
    ApiError, AppErrorExt, JsonValidateExt, PermissionCheckExt, ToValidationResponse,
    ValidationResponse,
};
use crate::workflow::{
    BatchItem, DeleteSummary, EditOutcome, add_to_batch, categories, delete_stored_requests,
    edit_stored_request, list_visible, materials_by_category, read_requests, remove_from_batch,
    submit_batch, visible_schools,
};

#[derive(Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "PS number is required"))]
    ps_number: String,
    password: String,
}

#[derive(Serialize, Deserialize)]
pub struct LoginResponse {
    pub success: bool,
    pub identity: Option<Identity>,
    pub error: Option<String>,
}

#[post("/login", data = "<login>")]
pub async fn api_login(
    login: Json<LoginRequest>,
    cookies: &CookieJar<'_>,
    store: &State<JsonStore>,
    sessions: &State<SessionStore>,
    config: &State<PortalConfig>,
) -> Result<Json<LoginResponse>, ApiError> {
    let validated = login.validate_custom()?;

    let users: Vec<User> = store.load(Collection::Users).await;
    let coaches: Vec<Coach> = store.load(Collection::Coaches).await;

    match authenticate(&users, &coaches, &validated.ps_number, &validated.password) {
        Some(identity) => {
            sessions.purge_expired().await;
            let token = sessions.create(identity.clone()).await;

            cookies.add_private(
                Cookie::build((SESSION_COOKIE, token))
                    .same_site(SameSite::Lax)
                    .http_only(true)
                    .max_age(rocket::time::Duration::minutes(config.session_ttl_minutes)),
            );

            Ok(Json(LoginResponse {
                success: true,
                identity: Some(identity),
                error: None,
            }))
        }
        None => {
            info!(ps_number = %validated.ps_number, "Login rejected");
            Ok(Json(LoginResponse {
                success: false,
                identity: None,
                error: Some("Invalid PS number or password".to_string()),
            }))
        }
    }
}

#[post("/logout")]
pub async fn api_logout(cookies: &CookieJar<'_>, sessions: &State<SessionStore>) -> Status {
    let token = cookies
        .get_private(SESSION_COOKIE)
        .map(|cookie| cookie.value().to_string());

    if let Some(token) = token {
        sessions.invalidate(&token).await;
    }

    cookies.remove_private(Cookie::build(SESSION_COOKIE));
    Status::Ok
}

#[get("/me")]
pub async fn api_me(identity: Identity) -> Json<Identity> {
    Json(identity)
}

#[get("/health")]
pub fn health() -> &'static str {
    "OK"
}

#[get("/schools")]
pub async fn api_get_schools(identity: Identity, store: &State<JsonStore>) -> Json<Vec<School>> {
    let schools: Vec<School> = store.load(Collection::Schools).await;

    Json(
        visible_schools(&identity, &schools)
            .into_iter()
            .cloned()
            .collect(),
    )
}

#[get("/materials/categories")]
pub async fn api_get_categories(_identity: Identity, store: &State<JsonStore>) -> Json<Vec<String>> {
    let materials: Vec<Material> = store.load(Collection::Materials).await;

    Json(
        categories(&materials)
            .into_iter()
            .map(String::from)
            .collect(),
    )
}

#[get("/materials?<category>")]
pub async fn api_get_materials(
    category: Option<String>,
    _identity: Identity,
    store: &State<JsonStore>,
) -> Json<Vec<Material>> {
    let materials: Vec<Material> = store.load(Collection::Materials).await;

    match category {
        Some(category) => Json(
            materials_by_category(&materials, &category)
                .into_iter()
                .cloned()
                .collect(),
        ),
        None => Json(materials),
    }
}

fn session_gone() -> ApiError {
    Status::Unauthorized.to_validation_response()
}

#[get("/batch")]
pub async fn api_get_batch(
    session: CurrentSession,
    sessions: &State<SessionStore>,
) -> Result<Json<Vec<Request>>, ApiError> {
    sessions
        .with_batch(&session.token, |batch| batch.clone())
        .await
        .map(Json)
        .ok_or_else(session_gone)
}

#[post("/batch", data = "<item>")]
pub async fn api_add_to_batch(
    item: Json<BatchItem>,
    session: CurrentSession,
    store: &State<JsonStore>,
    sessions: &State<SessionStore>,
) -> Result<Custom<Json<Request>>, ApiError> {
    let item = item.validate_custom()?;

    let schools: Vec<School> = store.load(Collection::Schools).await;
    let materials: Vec<Material> = store.load(Collection::Materials).await;

    let added = sessions
        .with_batch(&session.token, |batch| {
            add_to_batch(batch, &session.identity, item, &schools, &materials)
        })
        .await
        .ok_or_else(session_gone)?
        .validate_custom()?;

    Ok(Custom(Status::Created, Json(added)))
}

#[delete("/batch/<id>")]
pub async fn api_remove_from_batch(
    id: &str,
    session: CurrentSession,
    sessions: &State<SessionStore>,
) -> Result<Status, ApiError> {
    let removed = sessions
        .with_batch(&session.token, |batch| remove_from_batch(batch, id))
        .await
        .ok_or_else(session_gone)?;

    if removed {
        Ok(Status::NoContent)
    } else {
        Err(Status::NotFound.to_validation_response())
    }
}

#[delete("/batch")]
pub async fn api_clear_batch(
    session: CurrentSession,
    sessions: &State<SessionStore>,
) -> Result<Status, ApiError> {
    sessions
        .with_batch(&session.token, |batch| batch.clear())
        .await
        .ok_or_else(session_gone)?;

    Ok(Status::NoContent)
}

#[derive(Serialize, Deserialize)]
pub struct SubmitResponse {
    pub submitted: usize,
}

#[post("/batch/submit")]
pub async fn api_submit_batch(
    session: CurrentSession,
    store: &State<JsonStore>,
    sessions: &State<SessionStore>,
) -> Result<Json<SubmitResponse>, ApiError> {
    let mut batch = sessions
        .with_batch(&session.token, std::mem::take)
        .await
        .ok_or_else(session_gone)?;

    match submit_batch(store, &mut batch).await {
        Ok(submitted) => Ok(Json(SubmitResponse { submitted })),
        Err(err) => {
            // Put the unsent requests back ahead of anything added meanwhile.
            sessions
                .with_batch(&session.token, |current| {
                    let newer = std::mem::take(current);
                    *current = batch;
                    current.extend(newer);
                })
                .await;
            Err(err.to_validation_response())
        }
    }
}

#[get("/requests")]
pub async fn api_get_requests(
    identity: Identity,
    store: &State<JsonStore>,
) -> Json<Vec<Request>> {
    let requests = read_requests(store).await;

    Json(
        list_visible(&identity, &requests)
            .into_iter()
            .cloned()
            .collect(),
    )
}

#[put("/requests/<id>", data = "<changes>")]
pub async fn api_edit_request(
    id: &str,
    changes: Json<RequestChanges>,
    identity: Identity,
    store: &State<JsonStore>,
) -> Result<Json<Request>, ApiError> {
    let changes = changes.validate_custom()?;

    match edit_stored_request(store, &identity, id, changes)
        .await
        .validate_custom()?
    {
        EditOutcome::Applied(request) => Ok(Json(request)),
        EditOutcome::Denied => Err(Custom(
            Status::Forbidden,
            Json(ValidationResponse::with_error(
                "request",
                "Only the owner may change a Pending request; other changes need an administrator",
            )),
        )),
        EditOutcome::NotFound => Err(Status::NotFound.to_validation_response()),
    }
}

#[derive(Deserialize)]
pub struct DeleteRequestsBody {
    ids: Vec<String>,
}

#[post("/requests/delete", data = "<body>")]
pub async fn api_delete_requests(
    body: Json<DeleteRequestsBody>,
    identity: Identity,
    store: &State<JsonStore>,
) -> Result<Json<DeleteSummary>, ApiError> {
    let summary = delete_stored_requests(store, &identity, &body.ids)
        .await
        .validate_custom()?;

    Ok(Json(summary))
}

#[get("/admin/schools")]
pub async fn api_admin_get_schools(
    identity: Identity,
    store: &State<JsonStore>,
) -> Result<Json<Vec<School>>, ApiError> {
    identity
        .require_permission(Permission::ManageSchools)
        .validate_custom()?;

    Ok(Json(store.load(Collection::Schools).await))
}

#[put("/admin/schools", data = "<rows>")]
pub async fn api_admin_replace_schools(
    rows: Json<Vec<School>>,
    identity: Identity,
    store: &State<JsonStore>,
) -> Result<Json<Vec<School>>, ApiError> {
    let schools = replace_schools(store, &identity, rows.into_inner())
        .await
        .validate_custom()?;

    Ok(Json(schools))
}

#[get("/admin/coaches")]
pub async fn api_admin_get_coaches(
    identity: Identity,
    store: &State<JsonStore>,
) -> Result<Json<Vec<Coach>>, ApiError> {
    identity
        .require_permission(Permission::ManageCoaches)
        .validate_custom()?;

    Ok(Json(store.load(Collection::Coaches).await))
}

#[put("/admin/coaches", data = "<rows>")]
pub async fn api_admin_replace_coaches(
    rows: Json<Vec<Coach>>,
    identity: Identity,
    store: &State<JsonStore>,
) -> Result<Json<Vec<Coach>>, ApiError> {
    let coaches = replace_coaches(store, &identity, rows.into_inner())
        .await
        .validate_custom()?;

    Ok(Json(coaches))
}

#[post("/admin/sync")]
pub async fn api_admin_sync(
    identity: Identity,
    store: &State<JsonStore>,
    remote: &State<RemoteMirror>,
) -> Result<Json<SyncReport>, ApiError> {
    identity
        .require_permission(Permission::SyncRemote)
        .validate_custom()?;

    let requests = read_requests(store).await;

    let report = sync_to_cloud(remote.table(), &requests)
        .await
        .validate_custom()?;

    Ok(Json(report))
}

#[get("/admin/sync/status")]
pub async fn api_admin_sync_status(
    identity: Identity,
    remote: &State<RemoteMirror>,
) -> Result<Json<RemoteProbe>, ApiError> {
    identity
        .require_permission(Permission::SyncRemote)
        .validate_custom()?;

    Ok(Json(probe(remote.table()).await))
}
