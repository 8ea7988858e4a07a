//! OpenAPI Specification for the Roster API
//!
//! Generated by utoipa from the route annotations and the request/response
//! shapes of roster-core.

use utoipa::OpenApi;

use crate::error::{ApiError, ErrorCode, ErrorDetails};
use crate::routes::{member, organization};

use roster_core::{
    CreateMember, CreateOrganization, MemberResponse, OrganizationResponse, PatchOp,
    PatchOperation, UpdateMember, UpdateOrganization, Violation,
};

/// OpenAPI document for the Roster API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Roster API",
        version = "0.1.0",
        description = "Organizations and their members",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "http://localhost:3000", description = "Local Development")
    ),
    tags(
        (name = "Organizations", description = "Organization management, single and in collections"),
        (name = "Members", description = "Members scoped to their organization")
    ),
    paths(
        // === Organization Routes ===
        organization::list_organizations,
        organization::get_organization,
        organization::create_organization,
        organization::update_organization,
        organization::delete_organization,
        organization::get_organization_collection,
        organization::create_organization_collection,

        // === Member Routes ===
        member::list_members,
        member::get_member,
        member::create_member,
        member::update_member,
        member::patch_member,
        member::delete_member,
    ),
    components(
        schemas(
            // === Error Types ===
            ApiError, ErrorCode, ErrorDetails, Violation,

            // === Organization Types ===
            CreateOrganization, UpdateOrganization, OrganizationResponse,

            // === Member Types ===
            CreateMember, UpdateMember, MemberResponse,

            // === Patch Types ===
            PatchOperation, PatchOp,
        )
    )
)]
pub struct ApiDoc;

impl ApiDoc {
    /// Generate OpenAPI spec as JSON string.
    pub fn to_json() -> Result<String, serde_json::Error> {
        let openapi = Self::openapi();
        serde_json::to_string_pretty(&openapi)
    }
}
