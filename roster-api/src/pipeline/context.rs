//! Typed per-request context threaded through the pipeline.

use crate::error::{ApiError, ApiResult};
use crate::pipeline::MutationIntent;
use axum::body::Bytes;
use roster_core::{Member, MemberId, Organization, OrganizationId};
use roster_storage::{EntityStore, FetchMode, RepositoryManager};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

// ============================================================================
// SLOT
// ============================================================================

enum SlotState<T> {
    Empty,
    Filled(T),
    Taken,
}

/// A value written once by a stage and taken once by the handler.
pub struct Slot<T> {
    name: &'static str,
    state: SlotState<T>,
}

impl<T> Slot<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            state: SlotState::Empty,
        }
    }

    /// Store a value. A second write fails instead of overwriting.
    pub fn put(&mut self, value: T) -> ApiResult<()> {
        match self.state {
            SlotState::Empty => {
                self.state = SlotState::Filled(value);
                Ok(())
            }
            _ => Err(ApiError::internal_error(format!(
                "Request context slot '{}' written twice",
                self.name
            ))),
        }
    }

    /// Move the value out. Fails if nothing was stored or it was already taken.
    pub fn take(&mut self) -> ApiResult<T> {
        match std::mem::replace(&mut self.state, SlotState::Taken) {
            SlotState::Filled(value) => Ok(value),
            SlotState::Empty => {
                self.state = SlotState::Empty;
                Err(ApiError::internal_error(format!(
                    "Request context slot '{}' read before it was populated",
                    self.name
                )))
            }
            SlotState::Taken => Err(ApiError::internal_error(format!(
                "Request context slot '{}' read twice",
                self.name
            ))),
        }
    }

    pub fn is_filled(&self) -> bool {
        matches!(self.state, SlotState::Filled(_))
    }

    /// Whether a stage ever stored a value, taken or not.
    pub fn was_populated(&self) -> bool {
        !matches!(self.state, SlotState::Empty)
    }
}

// ============================================================================
// REQUEST CONTEXT
// ============================================================================

/// Everything one request carries from filter stages to its handler.
///
/// `M` is the fetch mode of the route: resolved entities are
/// `M::Handle<Organization>` / `M::Handle<Member>`. `B` is the validated
/// payload type (`()` for routes without a body).
pub struct RequestContext<M: FetchMode, B> {
    intent: MutationIntent,
    operation: &'static str,
    organization_id: Option<OrganizationId>,
    member_id: Option<MemberId>,
    body: Option<Bytes>,
    repositories: RepositoryManager,
    flushed: Arc<AtomicBool>,
    pub organization: Slot<M::Handle<Organization>>,
    pub member: Slot<M::Handle<Member>>,
    pub payload: Slot<B>,
}

impl<M: FetchMode, B> RequestContext<M, B> {
    pub fn new(
        store: Arc<dyn EntityStore>,
        intent: MutationIntent,
        operation: &'static str,
    ) -> Self {
        Self {
            intent,
            operation,
            organization_id: None,
            member_id: None,
            body: None,
            repositories: RepositoryManager::new(store),
            flushed: Arc::new(AtomicBool::new(false)),
            organization: Slot::new("organization"),
            member: Slot::new("member"),
            payload: Slot::new("payload"),
        }
    }

    pub fn with_organization_id(mut self, id: OrganizationId) -> Self {
        self.organization_id = Some(id);
        self
    }

    pub fn with_member_id(mut self, id: MemberId) -> Self {
        self.member_id = Some(id);
        self
    }

    pub fn with_body(mut self, body: Bytes) -> Self {
        self.body = Some(body);
        self
    }

    pub fn intent(&self) -> MutationIntent {
        self.intent
    }

    /// Operation name used in log lines and client error messages.
    pub fn operation(&self) -> &'static str {
        self.operation
    }

    /// Organization id from the path. Missing means the route is miswired.
    pub fn organization_id(&self) -> ApiResult<OrganizationId> {
        self.organization_id.ok_or_else(|| {
            ApiError::internal_error(format!(
                "Operation {} has no organization id in its path",
                self.operation
            ))
        })
    }

    pub fn member_id(&self) -> ApiResult<MemberId> {
        self.member_id.ok_or_else(|| {
            ApiError::internal_error(format!(
                "Operation {} has no member id in its path",
                self.operation
            ))
        })
    }

    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    pub fn repositories(&self) -> &RepositoryManager {
        &self.repositories
    }

    /// Resolved organization, as stored by the existence stage.
    pub fn take_organization(&mut self) -> ApiResult<M::Handle<Organization>> {
        self.organization.take()
    }

    /// Resolved member, as stored by the existence stage.
    pub fn take_member(&mut self) -> ApiResult<M::Handle<Member>> {
        self.member.take()
    }

    /// Validated payload, as stored by the payload stage.
    pub fn take_payload(&mut self) -> ApiResult<B> {
        self.payload.take()
    }

    /// Flush every pending change of this request.
    pub async fn save(&self) -> ApiResult<usize> {
        let written = self.repositories.save().await?;
        self.flushed.store(true, Ordering::SeqCst);
        Ok(written)
    }

    pub(crate) fn flush_marker(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.flushed)
    }
}
