use std::time::Duration;

use tracing::{info, warn};

use crate::error::ErrorKind;
use crate::input::ClipboardPort;

pub const CLIPBOARD_RETRY_ATTEMPTS: u32 = 3;
pub const CLIPBOARD_RETRY_DELAY: Duration = Duration::from_millis(40);

/// Writes `text` to the clipboard, retrying while another application holds the lock.
///
/// Returns the number of attempts used. Stops at the first success; after
/// `attempts` failures the last error is surfaced as `ClipboardContention`.
pub async fn write_with_retry<C>(
    clipboard: &C,
    text: &str,
    attempts: u32,
    delay: Duration,
) -> Result<u32, ErrorKind>
where
    C: ClipboardPort + ?Sized,
{
    let attempts = attempts.max(1);
    let mut last_error = String::new();

    for attempt in 1..=attempts {
        match clipboard.write_text(text) {
            Ok(()) => {
                if attempt > 1 {
                    info!(attempt, "clipboard write succeeded after retry");
                }
                return Ok(attempt);
            }
            Err(err) => {
                warn!(attempt, attempts, "clipboard write failed: {err}");
                last_error = err.to_string();
                if attempt < attempts {
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    Err(ErrorKind::ClipboardContention {
        attempts,
        reason: last_error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use tokio::time::Instant;

    use crate::input::InputError;
    use crate::state::CursorPosition;

    struct FlakyClipboard {
        failures_left: Mutex<u32>,
        writes: Mutex<Vec<String>>,
    }

    impl FlakyClipboard {
        fn failing(times: u32) -> Self {
            Self {
                failures_left: Mutex::new(times),
                writes: Mutex::new(Vec::new()),
            }
        }

        fn write_count(&self) -> usize {
            self.writes.lock().expect("lock").len()
        }
    }

    impl ClipboardPort for FlakyClipboard {
        fn read_text(&self) -> Result<Option<String>, InputError> {
            Ok(None)
        }

        fn write_text(&self, text: &str) -> Result<(), InputError> {
            self.writes.lock().expect("lock").push(text.to_string());
            let mut failures_left = self.failures_left.lock().expect("lock");
            if *failures_left > 0 {
                *failures_left -= 1;
                return Err(InputError::Clipboard("clipboard is locked".to_string()));
            }
            Ok(())
        }

        fn cursor_position(&self) -> Result<CursorPosition, InputError> {
            Ok(CursorPosition::default())
        }

        fn simulate_paste(&self) -> Result<(), InputError> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn first_success_needs_no_retry() {
        let clipboard = FlakyClipboard::failing(0);
        let result =
            write_with_retry(&clipboard, "done", CLIPBOARD_RETRY_ATTEMPTS, CLIPBOARD_RETRY_DELAY)
                .await;

        assert_eq!(result, Ok(1));
        assert_eq!(clipboard.write_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn success_on_second_attempt_stops_retrying() {
        let clipboard = FlakyClipboard::failing(1);
        let started = Instant::now();
        let result =
            write_with_retry(&clipboard, "done", CLIPBOARD_RETRY_ATTEMPTS, CLIPBOARD_RETRY_DELAY)
                .await;

        assert_eq!(result, Ok(2));
        assert_eq!(clipboard.write_count(), 2);
        assert_eq!(started.elapsed(), CLIPBOARD_RETRY_DELAY);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_surface_contention() {
        let clipboard = FlakyClipboard::failing(10);
        let started = Instant::now();
        let result =
            write_with_retry(&clipboard, "done", CLIPBOARD_RETRY_ATTEMPTS, CLIPBOARD_RETRY_DELAY)
                .await;

        assert_eq!(clipboard.write_count(), 3);
        assert_eq!(started.elapsed(), CLIPBOARD_RETRY_DELAY * 2);
        match result {
            Err(ErrorKind::ClipboardContention { attempts, reason }) => {
                assert_eq!(attempts, 3);
                assert!(reason.contains("locked"));
            }
            other => panic!("expected contention, got {other:?}"),
        }
    }
}
