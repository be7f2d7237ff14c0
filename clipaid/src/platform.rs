use std::sync::{Arc, Mutex};
use std::time::Duration;

use arboard::Clipboard;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::engine::EngineEvent;
use crate::input::injector::InputInjector;
use crate::input::{ClipboardPort, InputError};
use crate::state::CursorPosition;

pub const CLIPBOARD_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// System clipboard through `arboard`, cursor and paste through `enigo`.
pub struct DesktopClipboard {
    inner: Mutex<Clipboard>,
}

impl DesktopClipboard {
    pub fn new() -> Result<Self, InputError> {
        let clipboard =
            Clipboard::new().map_err(|err| InputError::Initialization(err.to_string()))?;

        Ok(Self {
            inner: Mutex::new(clipboard),
        })
    }
}

impl ClipboardPort for DesktopClipboard {
    fn read_text(&self) -> Result<Option<String>, InputError> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|err| InputError::Clipboard(format!("clipboard lock poisoned: {err}")))?;

        match guard.get_text() {
            Ok(text) => Ok(Some(text)),
            Err(arboard::Error::ContentNotAvailable) => Ok(None),
            Err(err) => Err(InputError::Clipboard(err.to_string())),
        }
    }

    fn write_text(&self, text: &str) -> Result<(), InputError> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|err| InputError::Clipboard(format!("clipboard lock poisoned: {err}")))?;

        guard
            .set_text(text.to_string())
            .map_err(|err| InputError::Clipboard(err.to_string()))
    }

    fn cursor_position(&self) -> Result<CursorPosition, InputError> {
        InputInjector::new()?.cursor_position()
    }

    fn simulate_paste(&self) -> Result<(), InputError> {
        InputInjector::new()?.paste_shortcut()
    }
}

/// Polls the clipboard and posts `ClipboardChanged` whenever its text differs
/// from the last observed value. Content present at startup is not reported.
pub fn spawn_clipboard_poller<C: ClipboardPort>(
    clipboard: Arc<C>,
    events: mpsc::UnboundedSender<EngineEvent>,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut last_seen = read_or_log(clipboard.as_ref());
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        info!(interval_ms = interval.as_millis() as u64, "clipboard poller started");

        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let Some(text) = read_or_log(clipboard.as_ref()) else {
                continue;
            };
            if last_seen.as_deref() == Some(text.as_str()) {
                continue;
            }

            last_seen = Some(text.clone());
            if events.send(EngineEvent::ClipboardChanged { text }).is_err() {
                debug!("engine stopped, clipboard poller exiting");
                break;
            }
        }

        info!("clipboard poller stopped");
    })
}

fn read_or_log<C: ClipboardPort + ?Sized>(clipboard: &C) -> Option<String> {
    match clipboard.read_text() {
        Ok(text) => text,
        Err(err) => {
            debug!("clipboard read failed: {err}");
            None
        }
    }
}
