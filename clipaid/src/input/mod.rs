pub mod injector;
mod writeback;

use thiserror::Error;

use crate::state::CursorPosition;

pub use writeback::{CLIPBOARD_RETRY_ATTEMPTS, CLIPBOARD_RETRY_DELAY, write_with_retry};

pub const MIN_CLIPBOARD_CHARS: usize = 5;
pub const MAX_CLIPBOARD_CHARS: usize = 5_000;

#[derive(Debug, Error)]
pub enum InputError {
    #[error("failed to initialize input injector: {0}")]
    Initialization(String),
    #[error("failed to simulate keyboard input: {0}")]
    Keyboard(String),
    #[error("failed to read cursor position: {0}")]
    Cursor(String),
    #[error("clipboard operation failed: {0}")]
    Clipboard(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("copied text is blank")]
    Blank,
    #[error("copied text is shorter than {MIN_CLIPBOARD_CHARS} characters")]
    TooShort,
    #[error("copied text exceeds maximum length of {MAX_CLIPBOARD_CHARS} characters")]
    TooLong,
}

/// Primitive clipboard and cursor operations provided by the host platform.
pub trait ClipboardPort: Send + Sync + 'static {
    fn read_text(&self) -> Result<Option<String>, InputError>;
    fn write_text(&self, text: &str) -> Result<(), InputError>;
    fn cursor_position(&self) -> Result<CursorPosition, InputError>;
    /// Sends the platform paste shortcut to the focused window.
    fn simulate_paste(&self) -> Result<(), InputError>;
}

/// Accepts copies worth rewriting: not blank and within the length bounds.
pub fn validate_clipboard_text(text: &str) -> Result<(), ValidationError> {
    if text.trim().is_empty() {
        return Err(ValidationError::Blank);
    }

    let length = text.chars().count();
    if length < MIN_CLIPBOARD_CHARS {
        return Err(ValidationError::TooShort);
    }
    if length > MAX_CLIPBOARD_CHARS {
        return Err(ValidationError::TooLong);
    }

    Ok(())
}
