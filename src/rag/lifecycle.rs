//! Per-request lifecycle state machine
//!
//! Valid transitions:
//! 1. Received       → Retrieving      (on: StartRetrieval)
//! 2. Retrieving     → Assembling      (on: PassagesRetrieved)
//! 3. Assembling     → Prompting       (on: ContextAssembled)
//! 4. Prompting      → Generating      (on: PromptBuilt)
//! 5. Generating     → PostProcessing  (on: GenerationComplete)
//! 6. PostProcessing → Delivered       (on: AnswerReady)
//! 7. \*              → Failed(kind)    (on: Fail(kind), from any non-terminal state)
//! 8. Delivered and Failed are terminal (self-loops)

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::errors::{ErrorKind, PipelineError, Result};

/// Request processing states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestState {
    Received,
    Retrieving,
    Assembling,
    Prompting,
    Generating,
    PostProcessing,
    /// Answer handed to the caller (terminal)
    Delivered,
    /// Unrecoverable error at some stage (terminal)
    Failed(ErrorKind),
}

/// Events that drive the request forward
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageEvent {
    StartRetrieval,
    PassagesRetrieved,
    ContextAssembled,
    PromptBuilt,
    GenerationComplete,
    AnswerReady,
    Fail(ErrorKind),
}

impl RequestState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestState::Delivered | RequestState::Failed(_))
    }

    /// Attempt a transition, rejecting out-of-order stage events
    pub fn transition(&self, event: StageEvent) -> Result<RequestState> {
        use RequestState::*;
        use StageEvent::*;

        let next_state = match (*self, event) {
            (Delivered, _) => Delivered,
            (Failed(kind), _) => Failed(kind),

            (_, Fail(kind)) => Failed(kind),

            (Received, StartRetrieval) => Retrieving,
            (Retrieving, PassagesRetrieved) => Assembling,
            (Assembling, ContextAssembled) => Prompting,
            (Prompting, PromptBuilt) => Generating,
            (Generating, GenerationComplete) => PostProcessing,
            (PostProcessing, AnswerReady) => Delivered,

            (from, event) => {
                return Err(PipelineError::InvalidTransition {
                    from: format!("{:?}", from),
                    to: format!("(via {:?})", event),
                    reason: format!("No valid transition from {:?} on {:?}", from, event),
                });
            }
        };

        Ok(next_state)
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            RequestState::Received => "Received",
            RequestState::Retrieving => "Retrieving passages",
            RequestState::Assembling => "Assembling context",
            RequestState::Prompting => "Building prompt",
            RequestState::Generating => "Generating answer",
            RequestState::PostProcessing => "Formatting answer",
            RequestState::Delivered => "Delivered",
            RequestState::Failed(_) => "Failed",
        }
    }
}

/// Tracks one request's path through the pipeline
#[derive(Debug, Clone)]
pub struct RequestLifecycle {
    request_id: Uuid,
    state: RequestState,
    started: Instant,
    history: Vec<(RequestState, Duration)>,
}

impl RequestLifecycle {
    pub fn new() -> Self {
        Self {
            request_id: Uuid::new_v4(),
            state: RequestState::Received,
            started: Instant::now(),
            history: vec![(RequestState::Received, Duration::ZERO)],
        }
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn state(&self) -> RequestState {
        self.state
    }

    pub fn history(&self) -> &[(RequestState, Duration)] {
        &self.history
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Apply a stage event and record the resulting state
    pub fn apply(&mut self, event: StageEvent) -> Result<RequestState> {
        let next = self.state.transition(event)?;
        if next != self.state {
            tracing::debug!(
                request_id = %self.request_id,
                from = ?self.state,
                to = ?next,
                "request state transition"
            );
            self.history.push((next, self.started.elapsed()));
            self.state = next;
        }
        Ok(next)
    }

    /// Move to `Failed(kind)`; never fails since every state accepts it
    pub fn fail(&mut self, kind: ErrorKind) -> RequestState {
        self.apply(StageEvent::Fail(kind)).unwrap_or(self.state)
    }
}

impl Default for RequestLifecycle {
    fn default() -> Self {
        Self::new()
    }
}
