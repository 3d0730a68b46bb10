//! Graph object models
//!
//! Typed views of the Graph objects this workspace reads. Field names follow
//! the Graph wire format (snake_case), optional fields default when the
//! caller did not request them.

use serde::{Deserialize, Serialize};

use super::newtypes::{AccessToken, GraphId};

/// The authenticated user, from `GET me?fields=id,name,email,picture`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: GraphId,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub picture: Option<PagePicture>,
}

/// Picture wrapper as returned by Graph (`{"data": {"url": ...}}`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PagePicture {
    pub data: PictureData,
}

/// Picture payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PictureData {
    pub url: String,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
}

/// A Facebook Page the user administers, from `GET me/accounts`
///
/// `access_token` is the page-scoped token used for lead reads. It is never
/// serialized back out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub id: GraphId,
    pub name: String,
    #[serde(default, skip_serializing)]
    pub access_token: Option<AccessToken>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub fan_count: Option<u64>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub verification_status: Option<String>,
    #[serde(default)]
    pub picture: Option<PagePicture>,
    /// Page tasks granted to the user on this page (e.g. `ACCESS_LEAD_GEN`)
    #[serde(default)]
    pub tasks: Vec<String>,
}

impl Page {
    /// Whether the user has been granted `task` on this page.
    pub fn has_task(&self, task: &str) -> bool {
        self.tasks.iter().any(|t| t == task)
    }
}

/// A lead generation form, from `GET {page-id}/leadgen_forms`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadgenForm {
    pub id: GraphId,
    pub name: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub leads_count: Option<u64>,
    #[serde(default)]
    pub created_time: Option<String>,
}

/// A single form answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldValue {
    pub name: String,
    #[serde(default)]
    pub values: Vec<String>,
}

/// A lead submission, from `GET {form-id}/leads`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    pub id: GraphId,
    pub created_time: String,
    #[serde(default)]
    pub ad_id: Option<String>,
    #[serde(default)]
    pub form_id: Option<String>,
    #[serde(default)]
    pub field_data: Vec<FieldValue>,
}

impl Lead {
    /// Returns the first value submitted for `field`, if any.
    pub fn field(&self, field: &str) -> Option<&str> {
        self.field_data
            .iter()
            .find(|f| f.name == field)
            .and_then(|f| f.values.first())
            .map(String::as_str)
    }
}

/// Status of a single OAuth scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionStatus {
    Granted,
    Declined,
    Expired,
    #[serde(other)]
    Unknown,
}

/// One entry of `GET me/permissions`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionEntry {
    pub permission: String,
    pub status: PermissionStatus,
}
