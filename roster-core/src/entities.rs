//! Core entity structures

use crate::{MemberId, OrganizationId};
use serde::{Deserialize, Serialize};

/// Organization - owner of zero or more members.
///
/// Deleting an organization deletes every member that references it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub id: OrganizationId,
    pub name: String,
    pub address: String,
    pub country: Option<String>,
}

/// Member - belongs to exactly one organization and never outlives it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: MemberId,
    pub organization_id: OrganizationId,
    pub name: String,
    pub age: i32,
    pub position: String,
}
