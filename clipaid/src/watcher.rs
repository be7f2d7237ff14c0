use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

use crate::engine::EngineEvent;
use crate::input::{ValidationError, validate_clipboard_text};
use crate::state::{ClipboardSnapshot, CursorPosition, Generation, RuntimeState};

pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(500);
pub const CURSOR_TOLERANCE_PX: i32 = 8;

#[derive(Debug)]
pub enum ChangeDecision {
    Rejected(ValidationError),
    IgnoredOwnWrite,
    Accepted {
        generation: Generation,
        snapshot: ClipboardSnapshot,
    },
}

#[derive(Debug)]
pub enum DebounceDecision {
    Present(ClipboardSnapshot),
    /// Cursor moved away from the copy location; the copy was incidental.
    Suppressed,
    /// Expiry for a generation that is no longer pending.
    Stale,
}

struct PendingDebounce {
    generation: Generation,
    snapshot: ClipboardSnapshot,
    cursor_known: bool,
    timer: JoinHandle<()>,
}

/// Turns raw clipboard notifications into generations and debounce expiries.
pub struct ClipboardWatcher {
    runtime: Arc<RuntimeState>,
    events: mpsc::UnboundedSender<EngineEvent>,
    debounce: Duration,
    cursor_tolerance: i32,
    pending: Option<PendingDebounce>,
    ignore_next: Option<String>,
}

impl ClipboardWatcher {
    pub fn new(runtime: Arc<RuntimeState>, events: mpsc::UnboundedSender<EngineEvent>) -> Self {
        Self {
            runtime,
            events,
            debounce: DEBOUNCE_WINDOW,
            cursor_tolerance: CURSOR_TOLERANCE_PX,
            pending: None,
            ignore_next: None,
        }
    }

    /// Classifies one raw change. Rejected and ignored changes leave the
    /// current generation and any armed timer untouched.
    pub fn on_raw_change(
        &mut self,
        text: String,
        cursor_position: Option<CursorPosition>,
        now: Instant,
    ) -> ChangeDecision {
        if let Some(own_write) = self.ignore_next.take() {
            if own_write == text {
                debug!("ignoring clipboard change caused by write-back");
                return ChangeDecision::IgnoredOwnWrite;
            }
        }

        if let Err(reason) = validate_clipboard_text(&text) {
            debug!(chars = text.chars().count(), "clipboard change rejected: {reason}");
            return ChangeDecision::Rejected(reason);
        }

        let generation = self.runtime.advance_generation();
        let snapshot = ClipboardSnapshot {
            text,
            captured_at: now,
            cursor_position: cursor_position.unwrap_or_default(),
        };

        if let Some(previous) = self.pending.take() {
            previous.timer.abort();
            debug!(
                previous = previous.generation,
                generation, "debounce re-armed by newer copy"
            );
        }

        self.pending = Some(PendingDebounce {
            generation,
            snapshot: snapshot.clone(),
            cursor_known: cursor_position.is_some(),
            timer: self.arm_timer(generation),
        });

        ChangeDecision::Accepted {
            generation,
            snapshot,
        }
    }

    /// Resolves an expired debounce window against the cursor's current position.
    pub fn on_debounce_elapsed(
        &mut self,
        generation: Generation,
        cursor_now: Option<CursorPosition>,
    ) -> DebounceDecision {
        let Some(pending) = self
            .pending
            .take_if(|pending| pending.generation == generation)
        else {
            return DebounceDecision::Stale;
        };

        if let (true, Some(cursor_now)) = (pending.cursor_known, cursor_now) {
            if !pending
                .snapshot
                .cursor_position
                .within(&cursor_now, self.cursor_tolerance)
            {
                debug!(
                    generation,
                    from = ?pending.snapshot.cursor_position,
                    to = ?cursor_now,
                    "cursor moved during debounce"
                );
                return DebounceDecision::Suppressed;
            }
        }

        DebounceDecision::Present(pending.snapshot)
    }

    /// Ignores the next change if it carries exactly `text`.
    pub fn mark_own_write(&mut self, text: String) {
        self.ignore_next = Some(text);
    }

    pub fn clear_own_write(&mut self) {
        self.ignore_next = None;
    }

    pub fn shutdown(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.timer.abort();
        }
    }

    /// The timer re-reads the shared generation on expiry, so a timer that
    /// outlived its abort never posts for a superseded copy.
    fn arm_timer(&self, generation: Generation) -> JoinHandle<()> {
        let runtime = Arc::clone(&self.runtime);
        let events = self.events.clone();
        let debounce = self.debounce;
        tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            let current = runtime.current_generation();
            if current != generation {
                debug!(generation, current, "debounce expired for superseded copy");
                return;
            }
            if events
                .send(EngineEvent::DebounceElapsed { generation })
                .is_err()
            {
                debug!(generation, "engine stopped before debounce elapsed");
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn watcher() -> (
        ClipboardWatcher,
        mpsc::UnboundedReceiver<EngineEvent>,
        Arc<RuntimeState>,
    ) {
        let runtime = Arc::new(RuntimeState::default());
        let (tx, rx) = mpsc::unbounded_channel();
        (ClipboardWatcher::new(Arc::clone(&runtime), tx), rx, runtime)
    }

    fn origin() -> Option<CursorPosition> {
        Some(CursorPosition::new(100, 200))
    }

    #[tokio::test(start_paused = true)]
    async fn accepted_copy_arms_debounce() {
        let (mut watcher, mut rx, runtime) = watcher();
        let started = Instant::now();

        let decision = watcher.on_raw_change("teh quick brown fox".to_string(), origin(), started);
        assert!(matches!(
            decision,
            ChangeDecision::Accepted { generation: 1, .. }
        ));
        assert_eq!(runtime.current_generation(), 1);

        match rx.recv().await {
            Some(EngineEvent::DebounceElapsed { generation }) => assert_eq!(generation, 1),
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(started.elapsed(), DEBOUNCE_WINDOW);
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_copy_keeps_previous_generation() {
        let (mut watcher, _rx, runtime) = watcher();
        watcher.on_raw_change("first valid copy".to_string(), origin(), Instant::now());

        let short = watcher.on_raw_change("abc".to_string(), origin(), Instant::now());
        let long = watcher.on_raw_change("x".repeat(5_001), origin(), Instant::now());
        let blank = watcher.on_raw_change(" \n\t   ".to_string(), origin(), Instant::now());

        assert!(matches!(
            short,
            ChangeDecision::Rejected(ValidationError::TooShort)
        ));
        assert!(matches!(
            long,
            ChangeDecision::Rejected(ValidationError::TooLong)
        ));
        assert!(matches!(
            blank,
            ChangeDecision::Rejected(ValidationError::Blank)
        ));
        assert_eq!(runtime.current_generation(), 1);
        assert!(matches!(
            watcher.on_debounce_elapsed(1, origin()),
            DebounceDecision::Present(_)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn newer_copy_rearms_and_stales_previous_timer() {
        let (mut watcher, mut rx, _runtime) = watcher();
        watcher.on_raw_change("first copy text".to_string(), origin(), Instant::now());
        tokio::time::sleep(Duration::from_millis(100)).await;
        watcher.on_raw_change("second copy text".to_string(), origin(), Instant::now());

        match rx.recv().await {
            Some(EngineEvent::DebounceElapsed { generation }) => assert_eq!(generation, 2),
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(matches!(
            watcher.on_debounce_elapsed(1, origin()),
            DebounceDecision::Stale
        ));
        match watcher.on_debounce_elapsed(2, origin()) {
            DebounceDecision::Present(snapshot) => assert_eq!(snapshot.text, "second copy text"),
            other => panic!("unexpected decision: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn timer_skips_expiry_once_generation_moved_on() {
        let (mut watcher, mut rx, runtime) = watcher();
        watcher.on_raw_change("first copy text".to_string(), origin(), Instant::now());
        runtime.advance_generation();

        tokio::time::sleep(DEBOUNCE_WINDOW * 2).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn cursor_movement_beyond_tolerance_suppresses() {
        let (mut watcher, _rx, _runtime) = watcher();
        watcher.on_raw_change("copied sentence".to_string(), origin(), Instant::now());

        let decision = watcher.on_debounce_elapsed(1, Some(CursorPosition::new(100, 209)));
        assert!(matches!(decision, DebounceDecision::Suppressed));
    }

    #[tokio::test(start_paused = true)]
    async fn cursor_jitter_within_tolerance_presents() {
        let (mut watcher, _rx, _runtime) = watcher();
        watcher.on_raw_change("copied sentence".to_string(), origin(), Instant::now());

        let decision = watcher.on_debounce_elapsed(1, Some(CursorPosition::new(108, 192)));
        assert!(matches!(decision, DebounceDecision::Present(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_cursor_is_treated_as_unmoved() {
        let (mut watcher, _rx, _runtime) = watcher();
        watcher.on_raw_change("copied sentence".to_string(), None, Instant::now());

        let decision = watcher.on_debounce_elapsed(1, Some(CursorPosition::new(900, 900)));
        assert!(matches!(decision, DebounceDecision::Present(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn own_write_is_ignored_once() {
        let (mut watcher, _rx, runtime) = watcher();
        watcher.mark_own_write("The fixed text.".to_string());

        let first = watcher.on_raw_change("The fixed text.".to_string(), origin(), Instant::now());
        let second = watcher.on_raw_change("The fixed text.".to_string(), origin(), Instant::now());

        assert!(matches!(first, ChangeDecision::IgnoredOwnWrite));
        assert!(matches!(second, ChangeDecision::Accepted { .. }));
        assert_eq!(runtime.current_generation(), 1);
    }
}
