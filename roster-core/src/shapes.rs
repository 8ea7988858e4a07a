//! Request and response shapes, and the mapping between shapes and entities.
//!
//! Create/update shapes are what clients send; response shapes are what the
//! API returns. Missing text fields deserialize to empty strings and a missing
//! age to `None` so that validation, not the parser, reports every absent
//! field at once.

use crate::error::Violations;
use crate::validation::{
    CheckRange, CheckText, Validate, MEMBER_AGE_MAX, MEMBER_AGE_MIN, MEMBER_NAME_MAX,
    MEMBER_POSITION_MAX, ORGANIZATION_ADDRESS_MAX, ORGANIZATION_COUNTRY_MAX,
    ORGANIZATION_NAME_MAX,
};
use crate::{EntityIdType, Member, MemberId, Organization, OrganizationId};
use serde::{Deserialize, Serialize};

// ============================================================================
// ORGANIZATION SHAPES
// ============================================================================

/// Request to create an organization, optionally with its first members.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct CreateOrganization {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub country: Option<String>,
    /// Members created together with the organization
    #[serde(default)]
    pub members: Vec<CreateMember>,
}

/// Request to replace an organization's fields.
///
/// Members listed here are added to the organization; existing members are
/// left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct UpdateOrganization {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub members: Vec<CreateMember>,
}

/// Organization as returned by the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct OrganizationResponse {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub id: OrganizationId,
    pub name: String,
    pub address: String,
    pub country: Option<String>,
}

fn validate_organization_fields(
    name: &str,
    address: &str,
    country: &Option<String>,
    members: &[CreateMember],
) -> Result<(), Violations> {
    let mut violations = Violations::new();
    name.check_required("name", &mut violations);
    name.check_max_chars("name", ORGANIZATION_NAME_MAX, &mut violations);
    address.check_required("address", &mut violations);
    address.check_max_chars("address", ORGANIZATION_ADDRESS_MAX, &mut violations);
    country.check_max_chars("country", ORGANIZATION_COUNTRY_MAX, &mut violations);
    for (i, member) in members.iter().enumerate() {
        if let Err(nested) = member.validate() {
            violations.extend_nested(&format!("members[{}]", i), nested);
        }
    }
    violations.into_result()
}

impl Validate for CreateOrganization {
    fn validate(&self) -> Result<(), Violations> {
        validate_organization_fields(&self.name, &self.address, &self.country, &self.members)
    }
}

impl Validate for UpdateOrganization {
    fn validate(&self) -> Result<(), Violations> {
        validate_organization_fields(&self.name, &self.address, &self.country, &self.members)
    }
}

impl CreateOrganization {
    /// Build the organization and its nested members with fresh ids.
    pub fn into_entities(self) -> (Organization, Vec<Member>) {
        let organization = Organization {
            id: OrganizationId::now_v7(),
            name: self.name,
            address: self.address,
            country: self.country,
        };
        let members = self
            .members
            .into_iter()
            .map(|m| m.into_member(organization.id))
            .collect();
        (organization, members)
    }
}

impl UpdateOrganization {
    /// Copy the scalar fields onto an existing organization.
    pub fn apply_to(&self, organization: &mut Organization) {
        organization.name = self.name.clone();
        organization.address = self.address.clone();
        organization.country = self.country.clone();
    }

    /// Members to add to the organization, with fresh ids.
    pub fn new_members(&self, organization_id: OrganizationId) -> Vec<Member> {
        self.members
            .iter()
            .cloned()
            .map(|m| m.into_member(organization_id))
            .collect()
    }
}

impl From<&Organization> for OrganizationResponse {
    fn from(o: &Organization) -> Self {
        Self {
            id: o.id,
            name: o.name.clone(),
            address: o.address.clone(),
            country: o.country.clone(),
        }
    }
}

// ============================================================================
// MEMBER SHAPES
// ============================================================================

/// Request to create a member of an organization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct CreateMember {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub age: Option<i32>,
    #[serde(default)]
    pub position: String,
}

/// Update shape of a member: the fields a replace or a patch may change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct UpdateMember {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub age: Option<i32>,
    #[serde(default)]
    pub position: String,
}

/// Member as returned by the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct MemberResponse {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub id: MemberId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub organization_id: OrganizationId,
    pub name: String,
    pub age: i32,
    pub position: String,
}

fn validate_member_fields(name: &str, age: Option<i32>, position: &str) -> Result<(), Violations> {
    let mut violations = Violations::new();
    name.check_required("name", &mut violations);
    name.check_max_chars("name", MEMBER_NAME_MAX, &mut violations);
    match age {
        Some(age) => age.check_range("age", MEMBER_AGE_MIN, MEMBER_AGE_MAX, &mut violations),
        None => violations.push("age", "The age field is required."),
    }
    position.check_required("position", &mut violations);
    position.check_max_chars("position", MEMBER_POSITION_MAX, &mut violations);
    violations.into_result()
}

impl Validate for CreateMember {
    fn validate(&self) -> Result<(), Violations> {
        validate_member_fields(&self.name, self.age, &self.position)
    }
}

impl Validate for UpdateMember {
    fn validate(&self) -> Result<(), Violations> {
        validate_member_fields(&self.name, self.age, &self.position)
    }
}

impl CreateMember {
    /// Build a member of `organization_id` with a fresh id.
    ///
    /// Callers validate first; an absent age maps to 0.
    pub fn into_member(self, organization_id: OrganizationId) -> Member {
        Member {
            id: MemberId::now_v7(),
            organization_id,
            name: self.name,
            age: self.age.unwrap_or_default(),
            position: self.position,
        }
    }
}

impl UpdateMember {
    /// Copy the update-shape fields onto a member.
    pub fn apply_to(&self, member: &mut Member) {
        member.name = self.name.clone();
        if let Some(age) = self.age {
            member.age = age;
        }
        member.position = self.position.clone();
    }
}

impl From<&Member> for UpdateMember {
    fn from(m: &Member) -> Self {
        Self {
            name: m.name.clone(),
            age: Some(m.age),
            position: m.position.clone(),
        }
    }
}

impl From<&Member> for MemberResponse {
    fn from(m: &Member) -> Self {
        Self {
            id: m.id,
            organization_id: m.organization_id,
            name: m.name.clone(),
            age: m.age,
            position: m.position.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_member() -> CreateMember {
        CreateMember {
            name: "Sam Raiden".to_string(),
            age: Some(26),
            position: "Developer".to_string(),
        }
    }

    #[test]
    fn test_missing_fields_all_reported() {
        let req: CreateMember = serde_json::from_str("{}").expect("defaults apply");
        let violations = req.validate().expect_err("empty member is invalid");
        let fields: Vec<_> = violations.iter().map(|v| v.field.clone()).collect();
        assert_eq!(fields, vec!["name", "age", "position"]);
    }

    #[test]
    fn test_organization_nested_member_violations_prefixed() {
        let req = CreateOrganization {
            name: "Acme".to_string(),
            address: "1 Main St".to_string(),
            country: None,
            members: vec![
                valid_member(),
                CreateMember {
                    age: Some(-3),
                    ..valid_member()
                },
            ],
        };
        let violations = req.validate().expect_err("second member is invalid");
        assert_eq!(violations.len(), 1);
        assert_eq!(
            violations.iter().next().map(|v| v.field.as_str()),
            Some("members[1].age")
        );
    }

    #[test]
    fn test_create_organization_builds_owned_members() {
        let req = CreateOrganization {
            name: "Acme".to_string(),
            address: "1 Main St".to_string(),
            country: Some("USA".to_string()),
            members: vec![valid_member(), valid_member()],
        };
        let (organization, members) = req.into_entities();
        assert_eq!(members.len(), 2);
        assert!(members.iter().all(|m| m.organization_id == organization.id));
        assert_ne!(members[0].id, members[1].id);
    }

    #[test]
    fn test_update_member_projection_round_trip() {
        let member = valid_member().into_member(OrganizationId::now_v7());
        let mut projection = UpdateMember::from(&member);
        projection.age = Some(31);
        let mut updated = member.clone();
        projection.apply_to(&mut updated);
        assert_eq!(updated.age, 31);
        assert_eq!(updated.id, member.id);
        assert_eq!(updated.organization_id, member.organization_id);
    }

    #[test]
    fn test_update_organization_keeps_id() {
        let (mut organization, _) = CreateOrganization {
            name: "Acme".to_string(),
            address: "1 Main St".to_string(),
            ..Default::default()
        }
        .into_entities();
        let id = organization.id;
        UpdateOrganization {
            name: "Acme Corp".to_string(),
            address: "2 Main St".to_string(),
            country: Some("USA".to_string()),
            members: vec![],
        }
        .apply_to(&mut organization);
        assert_eq!(organization.id, id);
        assert_eq!(organization.name, "Acme Corp");
    }
}
