use std::fmt;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;
use validator::Validate;

use crate::auth::Credential;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub ps_number: String,
    pub password: String,
    pub credential: Credential,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Coach {
    pub ps_number: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct School {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub city: String,
    #[serde(default, deserialize_with = "deserialize_coaches")]
    pub coaches: Vec<String>,
}

impl School {
    pub fn has_coach(&self, ps_number: &str) -> bool {
        self.coaches.iter().any(|c| c == ps_number)
    }
}

/// The coaches column arrives either as a proper list or as the free text an
/// admin typed into the roster table.
#[derive(Deserialize)]
#[serde(untagged)]
enum CoachField {
    List(Vec<String>),
    Text(String),
}

fn deserialize_coaches<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<CoachField>::deserialize(deserializer)? {
        Some(CoachField::List(list)) => list,
        Some(CoachField::Text(text)) => parse_coach_list(&text),
        None => Vec::new(),
    })
}

pub fn parse_coach_list(text: &str) -> Vec<String> {
    text.split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(String::from)
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Material {
    pub category: String,
    #[serde(default)]
    pub subcategory: String,
    pub item: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
    Delivered,
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestStatus::Pending => write!(f, "Pending"),
            RequestStatus::Approved => write!(f, "Approved"),
            RequestStatus::Rejected => write!(f, "Rejected"),
            RequestStatus::Delivered => write!(f, "Delivered"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Request {
    pub id: String,
    pub school_id: String,
    pub category: String,
    pub material: String, // Denormalized item label
    pub quantity: u32,
    pub date: String,
    pub ps_number: String,
    pub status: RequestStatus,
    /// Columns this service does not know about, kept so a rewrite does not drop them.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Request {
    pub fn new_pending(
        ps_number: &str,
        school_id: &str,
        category: &str,
        material: &str,
        quantity: u32,
    ) -> Self {
        Self {
            id: new_request_id(),
            school_id: school_id.to_string(),
            category: category.to_string(),
            material: material.to_string(),
            quantity,
            date: submission_timestamp(),
            ps_number: ps_number.to_string(),
            status: RequestStatus::Pending,
            extra: Map::new(),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == RequestStatus::Pending
    }

    pub fn is_owned_by(&self, ps_number: &str) -> bool {
        self.ps_number == ps_number
    }
}

/// Shape of a request as found on disk. Older files may lack `id` or
/// `status`; every other field is required.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredRequest {
    pub id: Option<String>,
    pub school_id: String,
    pub category: String,
    pub material: String,
    pub quantity: u32,
    #[serde(default)]
    pub date: String,
    pub ps_number: String,
    pub status: Option<RequestStatus>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl StoredRequest {
    pub fn has_id(&self) -> bool {
        self.id.as_deref().is_some_and(|id| !id.is_empty())
    }

    pub fn needs_backfill(&self) -> bool {
        !self.has_id() || self.status.is_none()
    }
}

/// Fills in a missing id or status. Records that break the quantity or
/// owner rules are refused rather than repaired.
impl TryFrom<StoredRequest> for Request {
    type Error = String;

    fn try_from(stored: StoredRequest) -> Result<Self, Self::Error> {
        if stored.quantity == 0 {
            return Err("quantity must be at least 1".to_string());
        }
        if stored.ps_number.trim().is_empty() {
            return Err("ps_number is empty".to_string());
        }

        Ok(Self {
            id: stored
                .id
                .filter(|id| !id.is_empty())
                .unwrap_or_else(new_request_id),
            school_id: stored.school_id,
            category: stored.category,
            material: stored.material,
            quantity: stored.quantity,
            date: stored.date,
            ps_number: stored.ps_number,
            status: stored.status.unwrap_or_default(),
            extra: stored.extra,
        })
    }
}

/// Fields a caller may change on an existing request. Anything else in the
/// payload is rejected at deserialization.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct RequestChanges {
    #[validate(length(min = 1, message = "School must not be empty"))]
    pub school_id: Option<String>,
    pub category: Option<String>,
    #[validate(length(min = 1, message = "Material must not be empty"))]
    pub material: Option<String>,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: Option<u32>,
    pub status: Option<RequestStatus>,
    pub date: Option<String>,
}

impl RequestChanges {
    pub fn apply_to(self, request: &mut Request) {
        if let Some(school_id) = self.school_id {
            request.school_id = school_id;
        }
        if let Some(category) = self.category {
            request.category = category;
        }
        if let Some(material) = self.material {
            request.material = material;
        }
        if let Some(quantity) = self.quantity {
            request.quantity = quantity;
        }
        if let Some(status) = self.status {
            request.status = status;
        }
        if let Some(date) = self.date {
            request.date = date;
        }
    }
}

pub fn new_request_id() -> String {
    Uuid::new_v4().to_string()
}

pub fn submission_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}
