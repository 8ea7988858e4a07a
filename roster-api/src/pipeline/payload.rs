//! Payload validation stage.
//!
//! Works for any body shape that deserializes and implements [`Validate`]:
//! an absent or `null` body is a 400 naming the operation, a body that does
//! not parse or breaks rules is a 422 carrying every violation.

use crate::error::{ApiError, ApiResult};
use crate::pipeline::{Flow, Phase, RequestContext, Stage};
use async_trait::async_trait;
use axum::body::Bytes;
use roster_core::{PatchDocument, Validate, Violations};
use roster_storage::FetchMode;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;

/// Whether a body counts as absent: empty, whitespace or the literal `null`.
fn is_null_body(body: Option<&Bytes>) -> bool {
    match body {
        None => true,
        Some(bytes) => {
            let trimmed = bytes.trim_ascii();
            trimmed.is_empty() || trimmed == b"null"
        }
    }
}

/// Decode and validate a request body into `B`.
pub fn parse_payload<B>(body: Option<&Bytes>, operation: &str) -> ApiResult<B>
where
    B: DeserializeOwned + Validate,
{
    if is_null_body(body) {
        tracing::error!(operation, "Object sent from client is null");
        return Err(ApiError::missing_payload(operation));
    }
    let bytes = body.map(|b| &b[..]).unwrap_or_default();

    let payload: B = match serde_json::from_slice(bytes) {
        Ok(payload) => payload,
        Err(err) => {
            let mut violations = Violations::new();
            violations.push("body", err.to_string());
            tracing::error!(operation, error = %err, "Invalid model state for the object");
            return Err(ApiError::validation_failed(operation, &violations));
        }
    };

    if let Err(violations) = payload.validate() {
        tracing::error!(
            operation,
            violations = violations.len(),
            "Invalid model state for the object"
        );
        return Err(ApiError::validation_failed(operation, &violations));
    }
    Ok(payload)
}

/// Decode a JSON Patch body. Absent or `null` documents are a 400.
pub fn parse_patch_document(body: Option<&Bytes>, operation: &str) -> ApiResult<PatchDocument> {
    if is_null_body(body) {
        tracing::error!(operation, "Patch document sent from client is null");
        return Err(ApiError::new(
            crate::error::ErrorCode::MissingPayload,
            format!("Patch document is null. Operation: {}", operation),
        ));
    }
    let bytes = body.map(|b| &b[..]).unwrap_or_default();
    serde_json::from_slice(bytes).map_err(|err| {
        tracing::error!(operation, error = %err, "Malformed patch document");
        ApiError::new(
            crate::error::ErrorCode::InvalidPatch,
            format!("Malformed patch document: {}", err),
        )
    })
}

/// Parses and validates the body into `ctx.payload`.
pub struct PayloadValidation<B> {
    _shape: PhantomData<fn() -> B>,
}

impl<B> PayloadValidation<B> {
    pub fn new() -> Self {
        Self {
            _shape: PhantomData,
        }
    }
}

impl<B> Default for PayloadValidation<B> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<M, B> Stage<M, B> for PayloadValidation<B>
where
    M: FetchMode,
    B: DeserializeOwned + Validate + Send + Sync + 'static,
{
    fn name(&self) -> &'static str {
        "payload-validation"
    }

    fn phase(&self) -> Phase {
        Phase::Payload
    }

    async fn run(&self, ctx: &mut RequestContext<M, B>) -> Flow {
        let payload = match parse_payload::<B>(ctx.body(), ctx.operation()) {
            Ok(payload) => payload,
            Err(error) => return Flow::ShortCircuit(error),
        };
        match ctx.payload.put(payload) {
            Ok(()) => Flow::Continue,
            Err(error) => Flow::ShortCircuit(error),
        }
    }
}
