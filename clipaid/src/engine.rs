use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::input::{
    CLIPBOARD_RETRY_ATTEMPTS, CLIPBOARD_RETRY_DELAY, ClipboardPort, write_with_retry,
};
use crate::metrics::{PerformanceReport, RuntimeMetrics};
use crate::network::{RequestOrigin, RewriteDispatcher, RewriteOutcome, Rewriter};
use crate::presentation::{AcceptedText, PresentOutcome, PresentationCoordinator, Presenter};
use crate::prompts::ActionId;
use crate::speculative::SpeculativeExecutor;
use crate::state::{AppState, CursorPosition, Generation};
use crate::watcher::{ChangeDecision, ClipboardWatcher, DebounceDecision};

const PASTE_DELAY: Duration = Duration::from_millis(100);

/// Intents sent back by the presentation collaborator.
#[derive(Debug, Clone, PartialEq)]
pub enum UserIntent {
    Accept { paste_also: bool },
    Dismiss,
    SwitchAction(ActionId),
    Retry,
    CustomInstruction(String),
}

/// Every input the control task reacts to.
#[derive(Debug)]
pub enum EngineEvent {
    ClipboardChanged { text: String },
    DebounceElapsed { generation: Generation },
    RewriteFinished(RewriteOutcome),
    User(UserIntent),
    SettingsChanged(Settings),
    Shutdown,
}

/// Control task state. Only [`Engine::handle`] mutates it.
pub struct Engine<C: ClipboardPort, P: Presenter> {
    clipboard: Arc<C>,
    settings: Settings,
    watcher: ClipboardWatcher,
    executor: SpeculativeExecutor,
    presentation: PresentationCoordinator<P>,
    metrics: RuntimeMetrics,
}

impl<C: ClipboardPort, P: Presenter> Engine<C, P> {
    pub fn new(
        state: &AppState,
        clipboard: Arc<C>,
        presenter: P,
        rewriter: Arc<dyn Rewriter>,
        settings: Settings,
        events: mpsc::UnboundedSender<EngineEvent>,
    ) -> Self {
        let runtime = state.runtime();
        let dispatcher = RewriteDispatcher::new(rewriter, events.clone());

        Self {
            clipboard,
            settings,
            watcher: ClipboardWatcher::new(Arc::clone(&runtime), events),
            executor: SpeculativeExecutor::new(dispatcher.clone()),
            presentation: PresentationCoordinator::new(runtime, dispatcher, presenter),
            metrics: RuntimeMetrics::new(),
        }
    }

    pub async fn run(
        mut self,
        mut events: mpsc::UnboundedReceiver<EngineEvent>,
    ) -> PerformanceReport {
        info!("clipboard engine started");
        while let Some(event) = events.recv().await {
            if self.handle(event).await.is_break() {
                break;
            }
        }

        self.stop();
        info!("clipboard engine stopped");
        self.metrics.report()
    }

    pub async fn handle(&mut self, event: EngineEvent) -> ControlFlow<()> {
        match event {
            EngineEvent::ClipboardChanged { text } => self.on_clipboard_changed(text),
            EngineEvent::DebounceElapsed { generation } => self.on_debounce_elapsed(generation),
            EngineEvent::RewriteFinished(outcome) => self.on_rewrite_finished(outcome),
            EngineEvent::User(intent) => {
                if let Some(accepted) = self.presentation.handle_intent(intent, &self.settings) {
                    self.write_back(accepted).await;
                }
            }
            EngineEvent::SettingsChanged(settings) => {
                info!(
                    endpoint = %settings.endpoint,
                    default_action = %settings.default_action,
                    "settings snapshot replaced"
                );
                self.settings = settings;
            }
            EngineEvent::Shutdown => {
                self.stop();
                return ControlFlow::Break(());
            }
        }

        ControlFlow::Continue(())
    }

    pub fn report(&self) -> PerformanceReport {
        self.metrics.report()
    }

    fn on_clipboard_changed(&mut self, text: String) {
        let cursor = self.read_cursor();
        match self.watcher.on_raw_change(text, cursor, Instant::now()) {
            ChangeDecision::Accepted {
                generation,
                snapshot,
            } => {
                self.metrics.record_accepted_copy();
                self.executor.start(generation, &snapshot, &self.settings);
                self.presentation.on_speculation_superseded(&self.settings);
            }
            ChangeDecision::Rejected(_) => self.metrics.record_rejected_copy(),
            ChangeDecision::IgnoredOwnWrite => {}
        }
    }

    fn on_debounce_elapsed(&mut self, generation: Generation) {
        let cursor = self.read_cursor();
        match self.watcher.on_debounce_elapsed(generation, cursor) {
            DebounceDecision::Present(snapshot) => {
                let state = self.executor.current_state(generation);
                let cancel = self.executor.cancel_handle(generation);
                let outcome = self.presentation.present(
                    generation,
                    &snapshot,
                    state,
                    cancel,
                    &self.settings,
                );
                match outcome {
                    PresentOutcome::ShownCached => self.metrics.record_speculative_hit(),
                    PresentOutcome::AwaitingSpeculative => self.metrics.record_speculative_wait(),
                    PresentOutcome::Refetching => self.metrics.record_refetch(),
                    PresentOutcome::Rejected => {}
                }
            }
            DebounceDecision::Suppressed => {
                info!(generation, "copy looked incidental, presentation suppressed");
                self.metrics.record_suppressed_presentation();
            }
            DebounceDecision::Stale => debug!(generation, "ignoring stale debounce expiry"),
        }
    }

    fn on_rewrite_finished(&mut self, outcome: RewriteOutcome) {
        let cancelled = outcome
            .result
            .as_ref()
            .is_err_and(|err| err.is_cancelled());

        match outcome.origin {
            RequestOrigin::Speculative => {
                if !cancelled {
                    self.metrics.record_speculative_request(outcome.elapsed);
                }
                match self.executor.apply(&outcome) {
                    Some(state) => self
                        .presentation
                        .on_speculative_resolved(&state, &self.settings),
                    None => self.metrics.record_stale_drop(),
                }
            }
            RequestOrigin::Session => {
                if !cancelled {
                    self.metrics.record_session_request(outcome.elapsed);
                }
                let (generation, ticket) = (outcome.generation, outcome.ticket);
                if !self.presentation.on_session_result(outcome) {
                    debug!(generation, ticket, "dropping stale session result");
                    self.metrics.record_stale_drop();
                }
            }
        }
    }

    async fn write_back(&mut self, accepted: AcceptedText) {
        let AcceptedText { text, paste_also } = accepted;
        self.watcher.mark_own_write(text.clone());

        let started = Instant::now();
        let result = write_with_retry(
            self.clipboard.as_ref(),
            &text,
            CLIPBOARD_RETRY_ATTEMPTS,
            CLIPBOARD_RETRY_DELAY,
        )
        .await;
        self.metrics.record_write_back(started.elapsed(), result.is_ok());

        if result.is_err() {
            self.watcher.clear_own_write();
        }
        self.presentation.complete_accept(&result);

        if result.is_ok() && paste_also {
            self.spawn_paste();
        }
    }

    fn spawn_paste(&self) {
        let clipboard = Arc::clone(&self.clipboard);
        tokio::spawn(async move {
            tokio::time::sleep(PASTE_DELAY).await;
            match tokio::task::spawn_blocking(move || clipboard.simulate_paste()).await {
                Ok(Ok(())) => debug!("paste shortcut sent"),
                Ok(Err(err)) => warn!("failed to simulate paste: {err}"),
                Err(err) => warn!("paste task failed: {err}"),
            }
        });
    }

    fn read_cursor(&self) -> Option<CursorPosition> {
        match self.clipboard.cursor_position() {
            Ok(position) => Some(position),
            Err(err) => {
                debug!("cursor position unavailable: {err}");
                None
            }
        }
    }

    fn stop(&mut self) {
        self.executor.cancel_all();
        self.presentation.shutdown();
        self.watcher.shutdown();
    }
}
