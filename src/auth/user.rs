use rocket::http::Status;
use serde::{Deserialize, Serialize};

use super::{Credential, Permission};

/// Who is acting in the current session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Identity {
    pub ps_number: String,
    pub credential: Credential,
    pub name: String,
}

impl Identity {
    pub fn has_permission(&self, permission: Permission) -> bool {
        self.credential.has_permission(permission)
    }

    pub fn is_admin(&self) -> bool {
        self.credential == Credential::Admin
    }

    pub fn require_permission(&self, permission: Permission) -> Result<(), Status> {
        if self.credential.has_permission(permission) {
            Ok(())
        } else {
            tracing::warn!(
                ps_number = %self.ps_number,
                credential = %self.credential.as_str(),
                permission = ?permission,
                "Permission denied"
            );
            Err(Status::Forbidden)
        }
    }
}
