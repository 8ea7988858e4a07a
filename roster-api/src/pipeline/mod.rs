//! Request Filter Pipeline
//!
//! Every write route and every single-entity read runs through a
//! [`Pipeline`]: an ordered list of stages built once at route registration.
//! Existence stages run first, then payload stages, then the handler. The
//! first stage that short-circuits ends the request with its error and the
//! handler never runs.
//!
//! The fetch mode `M` of a pipeline decides whether existence stages hand the
//! handler tracked or detached entities. [`Pipeline::for_method`] refuses a
//! mode that disagrees with the verb, so a PUT or PATCH route cannot be wired
//! with read-only fetches and a GET cannot pay for change tracking.

pub mod context;
pub mod existence;
pub mod payload;

pub use context::{RequestContext, Slot};
pub use existence::{MemberOfOrganizationExists, OrganizationExists};
pub use payload::{parse_patch_document, PayloadValidation};

use crate::error::{ApiError, ApiResult};
use async_trait::async_trait;
use axum::http::Method;
use roster_storage::{EntityStore, FetchMode};
use std::future::Future;
use std::marker::PhantomData;
use std::sync::atomic::Ordering;
use std::sync::Arc;

// ============================================================================
// INTENT, PHASES AND FLOW
// ============================================================================

/// What the caller intends to do with the entities a request resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationIntent {
    ReadOnly,
    Replace,
    Partial,
}

impl MutationIntent {
    /// PUT replaces, PATCH partially updates, every other verb only reads.
    pub fn from_method(method: &Method) -> Self {
        if method == Method::PUT {
            MutationIntent::Replace
        } else if method == Method::PATCH {
            MutationIntent::Partial
        } else {
            MutationIntent::ReadOnly
        }
    }

    /// Whether resolved entities must be fetched as tracked handles.
    pub fn requires_tracking(&self) -> bool {
        !matches!(self, MutationIntent::ReadOnly)
    }
}

/// Ordering class of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    Existence,
    Payload,
}

/// Result of running one stage.
#[derive(Debug)]
pub enum Flow {
    Continue,
    ShortCircuit(ApiError),
}

/// Progress of one request through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Received,
    ExistenceChecked,
    PayloadValidated,
    HandlerExecuted,
    Flushed,
    ShortCircuited,
}

/// One pre-handler filter.
#[async_trait]
pub trait Stage<M: FetchMode, B>: Send + Sync {
    fn name(&self) -> &'static str;

    fn phase(&self) -> Phase;

    async fn run(&self, ctx: &mut RequestContext<M, B>) -> Flow;
}

/// Final state and result of a pipeline run.
#[derive(Debug)]
pub struct Outcome<T> {
    pub state: PipelineState,
    pub result: ApiResult<T>,
}

// ============================================================================
// PIPELINE
// ============================================================================

/// Ordered stages for one route.
pub struct Pipeline<M: FetchMode, B> {
    operation: &'static str,
    intent: MutationIntent,
    stages: Vec<Box<dyn Stage<M, B>>>,
    _mode: PhantomData<fn() -> M>,
}

impl<M, B> Pipeline<M, B>
where
    M: FetchMode,
    B: Send + Sync + 'static,
{
    /// Start a pipeline for a route served under `method`.
    pub fn for_method(method: Method, operation: &'static str) -> ApiResult<Self> {
        let intent = MutationIntent::from_method(&method);
        if intent.requires_tracking() != M::TRACKING {
            return Err(ApiError::internal_error(format!(
                "Operation {} ({}) is wired with {} fetches",
                operation,
                method,
                if M::TRACKING { "tracked" } else { "detached" }
            )));
        }
        Ok(Self {
            operation,
            intent,
            stages: Vec::new(),
            _mode: PhantomData,
        })
    }

    /// Add a stage. Stages are kept existence-first, in insertion order
    /// within a phase.
    pub fn stage(mut self, stage: impl Stage<M, B> + 'static) -> Self {
        let phase = stage.phase();
        let at = self
            .stages
            .iter()
            .position(|s| s.phase() > phase)
            .unwrap_or(self.stages.len());
        self.stages.insert(at, Box::new(stage));
        self
    }

    pub fn operation(&self) -> &'static str {
        self.operation
    }

    pub fn intent(&self) -> MutationIntent {
        self.intent
    }

    /// Stage names in execution order.
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Fresh context for one request of this route.
    pub fn context(&self, store: Arc<dyn EntityStore>) -> RequestContext<M, B> {
        RequestContext::new(store, self.intent, self.operation)
    }

    /// Run the stages, then the handler, and return only the result.
    pub async fn execute<T, F, Fut>(&self, ctx: RequestContext<M, B>, handler: F) -> ApiResult<T>
    where
        F: FnOnce(RequestContext<M, B>) -> Fut + Send,
        Fut: Future<Output = ApiResult<T>> + Send,
        T: Send,
    {
        self.run(ctx, handler).await.result
    }

    /// Run the stages, then the handler, reporting where the request ended.
    pub async fn run<T, F, Fut>(&self, mut ctx: RequestContext<M, B>, handler: F) -> Outcome<T>
    where
        F: FnOnce(RequestContext<M, B>) -> Fut + Send,
        Fut: Future<Output = ApiResult<T>> + Send,
        T: Send,
    {
        tracing::debug!(
            operation = self.operation,
            state = ?PipelineState::Received,
            "Request received"
        );

        for stage in &self.stages {
            match stage.run(&mut ctx).await {
                Flow::Continue => {}
                Flow::ShortCircuit(error) => {
                    tracing::debug!(
                        operation = self.operation,
                        stage = stage.name(),
                        code = %error.code,
                        "Pipeline short-circuited"
                    );
                    return Outcome {
                        state: PipelineState::ShortCircuited,
                        result: Err(error),
                    };
                }
            }
        }
        let state = if self.has_phase(Phase::Payload) {
            PipelineState::PayloadValidated
        } else {
            PipelineState::ExistenceChecked
        };
        tracing::debug!(operation = self.operation, ?state, "Filters passed");

        let flushed = ctx.flush_marker();
        let result = handler(ctx).await;
        let state = if result.is_ok() && flushed.load(Ordering::SeqCst) {
            PipelineState::Flushed
        } else {
            PipelineState::HandlerExecuted
        };
        Outcome { state, result }
    }

    fn has_phase(&self, phase: Phase) -> bool {
        self.stages.iter().any(|s| s.phase() == phase)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use roster_storage::{Detached, InMemoryEntityStore, Tracking};
    use std::sync::atomic::AtomicUsize;

    struct Fixed {
        name: &'static str,
        phase: Phase,
        fail: bool,
        log: Arc<std::sync::Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl<M: FetchMode> Stage<M, ()> for Fixed {
        fn name(&self) -> &'static str {
            self.name
        }

        fn phase(&self) -> Phase {
            self.phase
        }

        async fn run(&self, _ctx: &mut RequestContext<M, ()>) -> Flow {
            self.log
                .lock()
                .unwrap_or_else(|err| err.into_inner())
                .push(self.name);
            if self.fail {
                Flow::ShortCircuit(ApiError::from_code(ErrorCode::EntityNotFound))
            } else {
                Flow::Continue
            }
        }
    }

    fn store() -> Arc<dyn EntityStore> {
        Arc::new(InMemoryEntityStore::new())
    }

    #[test]
    fn test_intent_from_method() {
        assert_eq!(MutationIntent::from_method(&Method::PUT), MutationIntent::Replace);
        assert_eq!(MutationIntent::from_method(&Method::PATCH), MutationIntent::Partial);
        assert_eq!(MutationIntent::from_method(&Method::GET), MutationIntent::ReadOnly);
        assert_eq!(MutationIntent::from_method(&Method::DELETE), MutationIntent::ReadOnly);
        assert_eq!(MutationIntent::from_method(&Method::POST), MutationIntent::ReadOnly);
    }

    #[test]
    fn test_fetch_mode_must_match_verb() {
        assert!(Pipeline::<Tracking, ()>::for_method(Method::PUT, "Put").is_ok());
        assert!(Pipeline::<Tracking, ()>::for_method(Method::PATCH, "Patch").is_ok());
        assert!(Pipeline::<Detached, ()>::for_method(Method::GET, "Get").is_ok());
        assert!(Pipeline::<Detached, ()>::for_method(Method::PUT, "Put").is_err());
        assert!(Pipeline::<Tracking, ()>::for_method(Method::DELETE, "Delete").is_err());
    }

    #[tokio::test]
    async fn test_existence_stages_run_before_payload_stages() {
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));
        let fixed = |name, phase| Fixed {
            name,
            phase,
            fail: false,
            log: Arc::clone(&log),
        };
        let pipeline = Pipeline::<Tracking, ()>::for_method(Method::PUT, "Put")
            .expect("valid wiring")
            .stage(fixed("payload", Phase::Payload))
            .stage(fixed("organization", Phase::Existence))
            .stage(fixed("member", Phase::Existence));
        assert_eq!(pipeline.stage_names(), vec!["organization", "member", "payload"]);

        let outcome = pipeline
            .run(pipeline.context(store()), |_ctx| async { Ok(()) })
            .await;
        assert_eq!(outcome.state, PipelineState::HandlerExecuted);
        assert_eq!(
            *log.lock().unwrap_or_else(|err| err.into_inner()),
            vec!["organization", "member", "payload"]
        );
    }

    #[tokio::test]
    async fn test_short_circuit_skips_later_stages_and_handler() {
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));
        let calls = Arc::new(AtomicUsize::new(0));
        let pipeline = Pipeline::<Detached, ()>::for_method(Method::GET, "Get")
            .expect("valid wiring")
            .stage(Fixed {
                name: "first",
                phase: Phase::Existence,
                fail: true,
                log: Arc::clone(&log),
            })
            .stage(Fixed {
                name: "second",
                phase: Phase::Payload,
                fail: false,
                log: Arc::clone(&log),
            });

        let handler_calls = Arc::clone(&calls);
        let outcome = pipeline
            .run(pipeline.context(store()), move |_ctx| async move {
                handler_calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;

        assert_eq!(outcome.state, PipelineState::ShortCircuited);
        assert_eq!(
            outcome.result.expect_err("short-circuited").code,
            ErrorCode::EntityNotFound
        );
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(*log.lock().unwrap_or_else(|err| err.into_inner()), vec!["first"]);
    }

    #[tokio::test]
    async fn test_save_in_handler_ends_flushed() {
        let pipeline =
            Pipeline::<Detached, ()>::for_method(Method::DELETE, "Delete").expect("valid wiring");
        let outcome = pipeline
            .run(pipeline.context(store()), |ctx| async move {
                ctx.save().await?;
                Ok(())
            })
            .await;
        assert_eq!(outcome.state, PipelineState::Flushed);
    }
}
