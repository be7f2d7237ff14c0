mod completion_client;
pub mod sanitize;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::engine::EngineEvent;
use crate::error::ErrorKind;
use crate::prompts::ActionId;
use crate::state::Generation;

pub use completion_client::{CompletionClient, DEFAULT_REQUEST_TIMEOUT, TOP_P};

/// Everything one rewrite needs, captured from a single settings snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct RewriteRequest {
    pub endpoint: String,
    pub system_prompt: String,
    pub instruction: String,
    pub text: String,
    pub max_tokens: u32,
    pub temperature: f64,
}

impl RewriteRequest {
    pub fn user_message(&self) -> String {
        format!("{}:\n\n{}", self.instruction, self.text)
    }
}

#[async_trait]
pub trait Rewriter: Send + Sync + 'static {
    /// Returns sanitized text, or `ErrorKind::Cancelled` once `cancel` fires.
    async fn rewrite(
        &self,
        request: RewriteRequest,
        cancel: CancellationToken,
    ) -> Result<String, ErrorKind>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOrigin {
    Speculative,
    Session,
}

/// Message posted back to the control task when a rewrite task ends.
#[derive(Debug, Clone)]
pub struct RewriteOutcome {
    pub origin: RequestOrigin,
    pub generation: Generation,
    pub ticket: u64,
    pub action: ActionId,
    pub result: Result<String, ErrorKind>,
    pub elapsed: Duration,
}

/// Handle kept by the owner of an in-flight rewrite.
#[derive(Debug, Clone)]
pub struct InFlight {
    pub ticket: u64,
    pub cancel: CancellationToken,
}

/// Spawns rewrite tasks. Tasks never touch engine state; they only post outcomes.
#[derive(Clone)]
pub struct RewriteDispatcher {
    rewriter: Arc<dyn Rewriter>,
    events: mpsc::UnboundedSender<EngineEvent>,
    next_ticket: Arc<AtomicU64>,
}

impl RewriteDispatcher {
    pub fn new(rewriter: Arc<dyn Rewriter>, events: mpsc::UnboundedSender<EngineEvent>) -> Self {
        Self {
            rewriter,
            events,
            next_ticket: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn dispatch(
        &self,
        origin: RequestOrigin,
        generation: Generation,
        action: ActionId,
        request: RewriteRequest,
    ) -> InFlight {
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed) + 1;
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let rewriter = Arc::clone(&self.rewriter);
        let events = self.events.clone();

        debug!(?origin, generation, ticket, %action, "dispatching rewrite");
        tokio::spawn(async move {
            let started = Instant::now();
            let result = rewriter.rewrite(request, task_cancel.clone()).await;
            let result = if task_cancel.is_cancelled() {
                Err(ErrorKind::Cancelled)
            } else {
                result
            };

            let outcome = RewriteOutcome {
                origin,
                generation,
                ticket,
                action,
                result,
                elapsed: started.elapsed(),
            };
            if events.send(EngineEvent::RewriteFinished(outcome)).is_err() {
                debug!(generation, ticket, "engine stopped before rewrite finished");
            }
        });

        InFlight { ticket, cancel }
    }
}
