use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    SubmitRequests,
    ViewOwnRequests,
    EditOwnPendingRequests,

    ViewAllRequests,
    EditAnyRequest,
    ManageSchools,
    ManageCoaches,
    SyncRemote,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Credential {
    Coach,
    Admin,
}

static COACH_PERMISSIONS: Lazy<HashSet<Permission>> = Lazy::new(|| {
    let mut permissions = HashSet::new();

    permissions.insert(Permission::SubmitRequests);
    permissions.insert(Permission::ViewOwnRequests);
    permissions.insert(Permission::EditOwnPendingRequests);

    permissions
});

static ADMIN_PERMISSIONS: Lazy<HashSet<Permission>> = Lazy::new(|| {
    let mut permissions = HashSet::new();

    permissions.extend(COACH_PERMISSIONS.iter().copied());

    permissions.insert(Permission::ViewAllRequests);
    permissions.insert(Permission::EditAnyRequest);
    permissions.insert(Permission::ManageSchools);
    permissions.insert(Permission::ManageCoaches);
    permissions.insert(Permission::SyncRemote);

    permissions
});

impl Credential {
    pub fn permissions(&self) -> &'static HashSet<Permission> {
        match self {
            Credential::Coach => &COACH_PERMISSIONS,
            Credential::Admin => &ADMIN_PERMISSIONS,
        }
    }

    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions().contains(&permission)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Credential::Coach => "Coach",
            Credential::Admin => "Admin",
        }
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
