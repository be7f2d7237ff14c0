use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::engine::UserIntent;
use crate::error::ErrorKind;
use crate::network::{RequestOrigin, RewriteDispatcher, RewriteOutcome};
use crate::prompts::{ActionId, build_request};
use crate::state::{
    ClipboardSnapshot, Generation, PresentationSession, RequestState, RequestStatus, RuntimeState,
    SessionPhase,
};

/// What the presentation collaborator is asked to render when a session opens.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionView {
    pub generation: Generation,
    pub action: String,
    pub original_text: String,
    pub result: Option<String>,
    pub still_working: bool,
    pub progress_label: &'static str,
}

/// Rendering side of a session. Implementations must not block.
pub trait Presenter: Send + 'static {
    fn open(&mut self, view: SessionView);
    fn update_result(&mut self, text: &str, still_working: bool);
    fn close(&mut self);
    /// Notice shown outside a session, e.g. when the write-back failed.
    fn notify_failure(&mut self, message: &str);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    /// Another session is opening or open.
    Rejected,
    ShownCached,
    AwaitingSpeculative,
    Refetching,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptedText {
    pub text: String,
    pub paste_also: bool,
}

struct ActiveRequest {
    ticket: u64,
    cancel: CancellationToken,
    state: RequestState,
}

struct OpenSession {
    session: PresentationSession,
    active: Option<ActiveRequest>,
    awaiting_speculative: bool,
    speculative_cancel: Option<CancellationToken>,
    ready_text: Option<String>,
}

impl OpenSession {
    fn cancel_requests(&mut self) {
        if let Some(active) = self.active.take() {
            active.cancel.cancel();
            debug!(
                generation = self.session.generation,
                ticket = active.ticket,
                "cancelled session request"
            );
        }
        if self.awaiting_speculative {
            self.awaiting_speculative = false;
            if let Some(cancel) = self.speculative_cancel.take() {
                cancel.cancel();
            }
        }
    }
}

/// Owns the single result session: opening, re-requests, accept and dismiss.
pub struct PresentationCoordinator<P: Presenter> {
    runtime: Arc<RuntimeState>,
    dispatcher: RewriteDispatcher,
    presenter: P,
    slot: Option<OpenSession>,
}

impl<P: Presenter> PresentationCoordinator<P> {
    pub fn new(runtime: Arc<RuntimeState>, dispatcher: RewriteDispatcher, presenter: P) -> Self {
        Self {
            runtime,
            dispatcher,
            presenter,
            slot: None,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.slot
            .as_ref()
            .map(|slot| slot.session.phase)
            .unwrap_or(SessionPhase::Closed)
    }

    pub fn session(&self) -> Option<&PresentationSession> {
        self.slot.as_ref().map(|slot| &slot.session)
    }

    /// Opens a session for `generation` from whatever the speculative request
    /// has produced so far. Silent no-op while another session holds the slot.
    pub fn present(
        &mut self,
        generation: Generation,
        snapshot: &ClipboardSnapshot,
        speculative: RequestState,
        speculative_cancel: Option<CancellationToken>,
        settings: &Settings,
    ) -> PresentOutcome {
        if !self.runtime.try_open_session() {
            debug!(generation, "session already open, ignoring presentation");
            return PresentOutcome::Rejected;
        }

        let mut slot = OpenSession {
            session: PresentationSession {
                phase: SessionPhase::Opening,
                generation,
                action: speculative.action.clone(),
                original_text: snapshot.text.clone(),
            },
            active: None,
            awaiting_speculative: false,
            speculative_cancel: None,
            ready_text: None,
        };

        let outcome = match speculative.status {
            RequestStatus::Succeeded => {
                slot.ready_text = speculative.result.clone();
                PresentOutcome::ShownCached
            }
            RequestStatus::Pending => {
                slot.awaiting_speculative = true;
                slot.speculative_cancel = speculative_cancel;
                PresentOutcome::AwaitingSpeculative
            }
            RequestStatus::Failed | RequestStatus::Cancelled => {
                let action = settings.default_action();
                self.start_request(&mut slot, action, settings);
                PresentOutcome::Refetching
            }
        };

        let view = SessionView {
            generation,
            action: slot.session.action.to_string(),
            original_text: slot.session.original_text.clone(),
            result: slot.ready_text.clone(),
            still_working: slot.ready_text.is_none(),
            progress_label: slot.session.action.progress_label(),
        };

        slot.session.phase = SessionPhase::Open;
        info!(generation, ?outcome, "presentation session opened");
        self.presenter.open(view);
        self.slot = Some(slot);
        outcome
    }

    /// Feeds a resolved speculative state into a session that is waiting on it.
    pub fn on_speculative_resolved(&mut self, state: &RequestState, settings: &Settings) {
        let Some(slot) = self.slot.as_mut().filter(|slot| {
            slot.session.is_open()
                && slot.awaiting_speculative
                && slot.session.generation == state.generation
        }) else {
            return;
        };

        match state.status {
            RequestStatus::Pending => {}
            RequestStatus::Succeeded => {
                slot.awaiting_speculative = false;
                slot.speculative_cancel = None;
                slot.ready_text = state.result.clone();
                if let Some(text) = &slot.ready_text {
                    self.presenter.update_result(text, false);
                }
            }
            RequestStatus::Failed => {
                slot.awaiting_speculative = false;
                slot.speculative_cancel = None;
                let message = state.result.clone().unwrap_or_default();
                self.presenter.update_result(&message, false);
            }
            RequestStatus::Cancelled => {
                let action = slot.session.action.clone();
                self.reissue(action, settings);
            }
        }
    }

    /// The speculation a waiting session relied on was cancelled by a newer copy.
    pub fn on_speculation_superseded(&mut self, settings: &Settings) {
        let Some(slot) = self
            .slot
            .as_mut()
            .filter(|slot| slot.session.is_open() && slot.awaiting_speculative)
        else {
            return;
        };

        debug!(
            generation = slot.session.generation,
            "awaited speculation superseded, issuing session request"
        );
        let action = slot.session.action.clone();
        self.reissue(action, settings);
    }

    /// Applies a session request outcome. Returns false when it was stale.
    pub fn on_session_result(&mut self, outcome: RewriteOutcome) -> bool {
        let Some(slot) = self.slot.as_mut().filter(|slot| {
            slot.session.is_open()
                && slot.session.generation == outcome.generation
                && slot
                    .active
                    .as_ref()
                    .is_some_and(|active| active.ticket == outcome.ticket)
        }) else {
            return false;
        };
        let Some(mut active) = slot.active.take() else {
            return false;
        };

        active.state.resolve(outcome.result);
        match active.state.status {
            RequestStatus::Succeeded => {
                slot.ready_text = active.state.result.clone();
                if let Some(text) = &slot.ready_text {
                    self.presenter.update_result(text, false);
                }
            }
            RequestStatus::Failed => {
                let message = active.state.result.clone().unwrap_or_default();
                self.presenter.update_result(&message, false);
            }
            RequestStatus::Cancelled | RequestStatus::Pending => {}
        }
        true
    }

    /// Handles one user intent. Returns the text to write back on accept.
    pub fn handle_intent(
        &mut self,
        intent: UserIntent,
        settings: &Settings,
    ) -> Option<AcceptedText> {
        if self.phase() != SessionPhase::Open {
            debug!(?intent, "no open session, ignoring intent");
            return None;
        }

        match intent {
            UserIntent::Retry => {
                let action = self.session()?.action.clone();
                self.reissue(action, settings);
                None
            }
            UserIntent::SwitchAction(action) => {
                self.reissue(action, settings);
                None
            }
            UserIntent::CustomInstruction(instruction) => {
                let instruction = instruction.trim();
                if instruction.is_empty() {
                    debug!("ignoring blank custom instruction");
                    return None;
                }
                self.reissue(ActionId::Custom(instruction.to_string()), settings);
                None
            }
            UserIntent::Accept { paste_also } => self.begin_accept(paste_also),
            UserIntent::Dismiss => {
                self.close_session("dismissed");
                None
            }
        }
    }

    /// Finishes an accept once the write-back has run.
    pub fn complete_accept(&mut self, result: &Result<u32, ErrorKind>) {
        if self.phase() != SessionPhase::Closing {
            return;
        }

        self.close_session("accepted");
        if let Err(err) = result {
            warn!("write-back failed: {err}");
            self.presenter.notify_failure(&err.user_message());
        }
    }

    pub fn shutdown(&mut self) {
        if self.slot.is_some() {
            self.close_session("shutdown");
        }
    }

    fn begin_accept(&mut self, paste_also: bool) -> Option<AcceptedText> {
        let slot = self.slot.as_mut()?;
        let Some(text) = slot
            .ready_text
            .clone()
            .filter(|text| !text.trim().is_empty())
        else {
            debug!(
                generation = slot.session.generation,
                "accept ignored, no usable result yet"
            );
            return None;
        };

        slot.cancel_requests();
        slot.session.phase = SessionPhase::Closing;
        Some(AcceptedText { text, paste_also })
    }

    fn reissue(&mut self, action: ActionId, settings: &Settings) {
        let Some(mut slot) = self.slot.take() else {
            return;
        };

        self.start_request(&mut slot, action, settings);
        let label = format!("⏳ {}...", slot.session.action.progress_label());
        self.presenter.update_result(&label, true);
        self.slot = Some(slot);
    }

    fn start_request(&self, slot: &mut OpenSession, action: ActionId, settings: &Settings) {
        slot.cancel_requests();
        slot.ready_text = None;

        let generation = slot.session.generation;
        let request = build_request(settings, &action, &slot.session.original_text);
        let in_flight = self.dispatcher.dispatch(
            RequestOrigin::Session,
            generation,
            action.clone(),
            request,
        );

        info!(generation, ticket = in_flight.ticket, %action, "issuing session rewrite");
        slot.active = Some(ActiveRequest {
            ticket: in_flight.ticket,
            cancel: in_flight.cancel,
            state: RequestState::pending(generation, action.clone()),
        });
        slot.session.action = action;
    }

    fn close_session(&mut self, reason: &str) {
        if let Some(mut slot) = self.slot.take() {
            slot.session.phase = SessionPhase::Closing;
            slot.cancel_requests();
            self.presenter.close();
            info!(
                generation = slot.session.generation,
                reason, "presentation session closed"
            );
        }
        self.runtime.release_session();
    }
}
