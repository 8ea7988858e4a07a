//! Roster Core - Entity Types, Shapes, Validation and Patching
//!
//! Pure data structures and the rules that apply to them. This crate does
//! no I/O; persistence lives in roster-storage and HTTP in roster-api.

pub mod entities;
pub mod error;
pub mod identity;
pub mod patch;
pub mod shapes;
pub mod validation;

pub use entities::{Member, Organization};
pub use error::{PatchError, PatchOutcomeError, Violation, Violations};
pub use identity::{EntityIdType, EntityKind, MemberId, OrganizationId};
pub use patch::{PatchDocument, PatchOp, PatchOperation};
pub use shapes::{
    CreateMember, CreateOrganization, MemberResponse, OrganizationResponse, UpdateMember,
    UpdateOrganization,
};
pub use validation::Validate;
