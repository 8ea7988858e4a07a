//! Roster API - REST Layer and Request Filter Pipeline
//!
//! axum routes over organizations and their members. Every route that names
//! an entity or carries a body runs an ordered filter pipeline first:
//! existence checks, then payload validation, then the handler, whose single
//! save is the only commit point of the request.

pub mod config;
pub mod error;
pub mod extractors;
pub mod openapi;
pub mod pipeline;
pub mod routes;
pub mod telemetry;

// Re-export commonly used types
pub use config::ApiConfig;
pub use error::{ApiError, ApiResult, ErrorCode, ErrorDetails};
pub use extractors::{PathId, PathIds};
pub use openapi::ApiDoc;
pub use pipeline::{
    Flow, MemberOfOrganizationExists, MutationIntent, OrganizationExists, Outcome,
    PayloadValidation, Phase, Pipeline, PipelineState, RequestContext, Stage,
};
pub use routes::create_api_router;
pub use telemetry::{init_tracing, TelemetryConfig};
