use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::Settings;
use crate::network::{InFlight, RequestOrigin, RewriteDispatcher, RewriteOutcome};
use crate::prompts::{ActionId, build_request};
use crate::state::{ClipboardSnapshot, Generation, RequestState};

struct SpeculativeRequest {
    state: RequestState,
    in_flight: InFlight,
}

/// Fires the default-action rewrite the moment a copy is accepted.
///
/// Only the newest generation is tracked. Starting generation N+1 cancels N,
/// and anything N reports afterwards is discarded by [`SpeculativeExecutor::apply`].
pub struct SpeculativeExecutor {
    dispatcher: RewriteDispatcher,
    current: Option<SpeculativeRequest>,
}

impl SpeculativeExecutor {
    pub fn new(dispatcher: RewriteDispatcher) -> Self {
        Self {
            dispatcher,
            current: None,
        }
    }

    pub fn start(
        &mut self,
        generation: Generation,
        snapshot: &ClipboardSnapshot,
        settings: &Settings,
    ) {
        self.cancel_current();

        let action = settings.default_action();
        let request = build_request(settings, &action, &snapshot.text);
        info!(
            generation,
            %action,
            chars = snapshot.text.chars().count(),
            "starting speculative rewrite"
        );

        let in_flight = self.dispatcher.dispatch(
            RequestOrigin::Speculative,
            generation,
            action.clone(),
            request,
        );
        self.current = Some(SpeculativeRequest {
            state: RequestState::pending(generation, action),
            in_flight,
        });
    }

    /// Advisory cancellation; a late reply for `generation` is still dropped.
    pub fn cancel(&mut self, generation: Generation) {
        if let Some(current) = self
            .current
            .as_mut()
            .filter(|current| current.state.generation == generation)
        {
            current.in_flight.cancel.cancel();
            if current.state.is_pending() {
                current.state.mark_cancelled();
            }
        }
    }

    pub fn cancel_all(&mut self) {
        self.cancel_current();
    }

    pub fn current_state(&self, generation: Generation) -> RequestState {
        match &self.current {
            Some(current) if current.state.generation == generation => current.state.clone(),
            Some(current) => RequestState::superseded(generation, current.state.action.clone()),
            None => RequestState::superseded(generation, ActionId::Improve),
        }
    }

    pub fn cancel_handle(&self, generation: Generation) -> Option<CancellationToken> {
        self.current
            .as_ref()
            .filter(|current| current.state.generation == generation)
            .map(|current| current.in_flight.cancel.clone())
    }

    /// Applies a finished speculative rewrite. Returns the new state, or `None`
    /// when the outcome belongs to a superseded generation or request.
    pub fn apply(&mut self, outcome: &RewriteOutcome) -> Option<RequestState> {
        let current = self.current.as_mut()?;
        if current.state.generation != outcome.generation
            || current.in_flight.ticket != outcome.ticket
        {
            debug!(
                generation = outcome.generation,
                current = current.state.generation,
                ticket = outcome.ticket,
                "dropping stale speculative result"
            );
            return None;
        }
        if !current.state.is_pending() {
            return None;
        }

        current.state.resolve(outcome.result.clone());
        debug!(
            generation = outcome.generation,
            status = ?current.state.status,
            elapsed_ms = outcome.elapsed.as_millis() as u64,
            "speculative rewrite resolved"
        );
        Some(current.state.clone())
    }

    fn cancel_current(&mut self) {
        if let Some(current) = self.current.as_mut() {
            current.in_flight.cancel.cancel();
            if current.state.is_pending() {
                current.state.mark_cancelled();
                debug!(
                    generation = current.state.generation,
                    "cancelled superseded speculative rewrite"
                );
            }
        }
    }
}
