//! Domain types
//!
//! - Newtypes for opaque credentials and Graph object identifiers
//! - Response models for the Graph objects this workspace reads
//! - Permission sets (OAuth scopes and page tasks)
//! - Domain-specific error types

pub mod errors;
pub mod graph_objects;
pub mod newtypes;
pub mod permissions;

pub use errors::DomainError;
pub use graph_objects::{
    FieldValue, Lead, LeadgenForm, Page, PagePicture, PermissionEntry, PermissionStatus,
    UserProfile,
};
pub use newtypes::{AccessToken, GraphId};
pub use permissions::{PermissionSet, ACCESS_LEAD_GEN};
