use rocket::Request;
use rocket::http::Status;
use rocket::request::{FromRequest, Outcome};
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use serde_json::{Value, json};
use tracing::{Instrument, instrument};

use crate::models::{Coach, User};

use super::{Identity, SessionStore};

pub const SESSION_COOKIE: &str = "session_token";

/// Checks a credential pair against the users file first, then against the
/// coach roster where a coach's own PS number doubles as their password.
#[instrument(skip_all, fields(ps_number = %ps_number))]
pub fn authenticate(
    users: &[User],
    coaches: &[Coach],
    ps_number: &str,
    password: &str,
) -> Option<Identity> {
    let user = users
        .iter()
        .find(|u| u.ps_number == ps_number && password_matches(&u.password, password));

    if let Some(user) = user {
        tracing::info!(credential = %user.credential, "Authenticated from users file");
        return Some(Identity {
            ps_number: user.ps_number.clone(),
            credential: user.credential,
            name: user.name.clone(),
        });
    }

    let coach = coaches
        .iter()
        .find(|c| c.ps_number == ps_number && password == c.ps_number)?;

    tracing::info!("Authenticated coach with self-service credential");
    Some(Identity {
        ps_number: coach.ps_number.clone(),
        credential: super::Credential::Coach,
        name: coach.name.clone(),
    })
}

fn is_bcrypt_hash(stored: &str) -> bool {
    ["$2a$", "$2b$", "$2y$"]
        .iter()
        .any(|prefix| stored.starts_with(prefix))
}

fn password_matches(stored: &str, supplied: &str) -> bool {
    if is_bcrypt_hash(stored) {
        bcrypt::verify(supplied, stored).unwrap_or(false)
    } else {
        stored == supplied
    }
}

/// The live session behind a request: its cookie token and who owns it.
pub struct CurrentSession {
    pub token: String,
    pub identity: Identity,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for CurrentSession {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        resolve_session(request)
            .instrument(tracing::info_span!("session_auth_guard"))
            .await
    }
}

async fn resolve_session(request: &Request<'_>) -> Outcome<CurrentSession, ()> {
    let token = match request.cookies().get_private(SESSION_COOKIE) {
        Some(cookie) => cookie.value().to_string(),
        None => return Outcome::Error((Status::Unauthorized, ())),
    };

    let sessions = match request.rocket().state::<SessionStore>() {
        Some(sessions) => sessions,
        None => {
            tracing::error!("Session store not found in managed state");
            return Outcome::Error((Status::InternalServerError, ()));
        }
    };

    match sessions.identity(&token).await {
        Some(identity) => {
            tracing::debug!(ps_number = %identity.ps_number, credential = %identity.credential, "Session resolved");
            Outcome::Success(CurrentSession { token, identity })
        }
        None => {
            tracing::warn!("Unknown or expired session token");
            Outcome::Error((Status::Unauthorized, ()))
        }
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Identity {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        request
            .guard::<CurrentSession>()
            .await
            .map(|session| session.identity)
    }
}

#[catch(401)]
pub fn unauthorized_api(_req: &Request) -> Custom<Json<Value>> {
    let error_json = json!({
        "error": "Unauthorized",
        "message": "Authentication required"
    });

    Custom(Status::Unauthorized, Json(error_json))
}

#[catch(403)]
pub fn forbidden_api(_req: &Request) -> Custom<Json<Value>> {
    let error_json = json!({
        "error": "Forbidden",
        "message": "You don't have permission to perform this action"
    });

    Custom(Status::Forbidden, Json(error_json))
}
