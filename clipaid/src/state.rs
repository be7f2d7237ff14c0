use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tokio::time::Instant;

use crate::error::ErrorKind;
use crate::prompts::ActionId;

/// Epoch of one accepted clipboard copy. Strictly increasing, starting at 1.
pub type Generation = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CursorPosition {
    pub x: i32,
    pub y: i32,
}

impl CursorPosition {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// True when neither axis moved further than `tolerance` pixels.
    pub fn within(&self, other: &CursorPosition, tolerance: i32) -> bool {
        (self.x - other.x).abs() <= tolerance && (self.y - other.y).abs() <= tolerance
    }
}

#[derive(Debug, Clone)]
pub struct ClipboardSnapshot {
    pub text: String,
    pub captured_at: Instant,
    pub cursor_position: CursorPosition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    Pending,
    Succeeded,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RequestState {
    pub generation: Generation,
    pub action: ActionId,
    pub status: RequestStatus,
    pub result: Option<String>,
    pub error: Option<ErrorKind>,
}

impl RequestState {
    pub fn pending(generation: Generation, action: ActionId) -> Self {
        Self {
            generation,
            action,
            status: RequestStatus::Pending,
            result: None,
            error: None,
        }
    }

    /// State reported for a generation that is no longer current.
    pub fn superseded(generation: Generation, action: ActionId) -> Self {
        Self {
            status: RequestStatus::Cancelled,
            ..Self::pending(generation, action)
        }
    }

    /// Applies a finished outcome. Failures keep a readable fallback in `result`.
    pub fn resolve(&mut self, outcome: Result<String, ErrorKind>) {
        match outcome {
            Ok(text) => {
                self.status = RequestStatus::Succeeded;
                self.result = Some(text);
                self.error = None;
            }
            Err(ErrorKind::Cancelled) => {
                self.status = RequestStatus::Cancelled;
                self.result = None;
                self.error = None;
            }
            Err(err) => {
                self.status = RequestStatus::Failed;
                self.result = Some(err.user_message());
                self.error = Some(err);
            }
        }
    }

    pub fn mark_cancelled(&mut self) {
        self.resolve(Err(ErrorKind::Cancelled));
    }

    pub fn is_pending(&self) -> bool {
        self.status == RequestStatus::Pending
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Closed,
    Opening,
    Open,
    Closing,
}

#[derive(Debug, Clone)]
pub struct PresentationSession {
    pub phase: SessionPhase,
    pub generation: Generation,
    pub action: ActionId,
    pub original_text: String,
}

impl PresentationSession {
    pub fn is_open(&self) -> bool {
        self.phase == SessionPhase::Open
    }
}

/// Cross-thread flags: the single-flight session gate and the current generation.
#[derive(Debug, Default)]
pub struct RuntimeState {
    session_open: AtomicBool,
    generation: AtomicU64,
}

impl RuntimeState {
    /// Atomically claims the session slot. Returns false when a session already holds it.
    pub fn try_open_session(&self) -> bool {
        self.session_open
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn release_session(&self) {
        self.session_open.store(false, Ordering::Release);
    }

    /// Diagnostic read of the gate; opening goes through [`Self::try_open_session`].
    pub fn is_session_open(&self) -> bool {
        self.session_open.load(Ordering::Acquire)
    }

    /// Read by debounce timers off the control task to skip superseded expiries.
    pub fn current_generation(&self) -> Generation {
        self.generation.load(Ordering::Acquire)
    }

    /// Starts a new generation and returns it.
    pub fn advance_generation(&self) -> Generation {
        self.generation.fetch_add(1, Ordering::AcqRel) + 1
    }
}

#[derive(Clone, Default)]
pub struct AppState {
    runtime: Arc<RuntimeState>,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn runtime(&self) -> Arc<RuntimeState> {
        Arc::clone(&self.runtime)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;
    use std::thread;

    #[test]
    fn only_one_concurrent_open_attempt_wins() {
        let runtime = AppState::new().runtime();
        let contenders = 16;
        let barrier = Arc::new(Barrier::new(contenders));

        let handles: Vec<_> = (0..contenders)
            .map(|_| {
                let runtime = Arc::clone(&runtime);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    runtime.try_open_session()
                })
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|handle| handle.join().expect("contender thread should not panic"))
            .filter(|won| *won)
            .count();

        assert_eq!(winners, 1);
        assert!(runtime.is_session_open());

        runtime.release_session();
        assert!(runtime.try_open_session());
    }

    #[test]
    fn generations_strictly_increase() {
        let runtime = RuntimeState::default();
        assert_eq!(runtime.current_generation(), 0);
        assert_eq!(runtime.advance_generation(), 1);
        assert_eq!(runtime.advance_generation(), 2);
        assert_eq!(runtime.current_generation(), 2);
    }

    #[test]
    fn cursor_tolerance_is_per_axis() {
        let origin = CursorPosition::new(100, 100);
        assert!(origin.within(&CursorPosition::new(108, 92), 8));
        assert!(!origin.within(&CursorPosition::new(109, 100), 8));
        assert!(!origin.within(&CursorPosition::new(100, 91), 8));
    }

    #[test]
    fn failed_resolution_keeps_fallback_text() {
        let mut state = RequestState::pending(3, ActionId::Improve);
        state.resolve(Err(ErrorKind::Unreachable));

        assert_eq!(state.status, RequestStatus::Failed);
        assert_eq!(state.error, Some(ErrorKind::Unreachable));
        assert_eq!(state.result.as_deref(), Some("⚠️ Cannot connect to AI server"));
    }
}
