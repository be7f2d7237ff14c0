use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("failed to initialize logging: {0}")]
    LoggingInit(String),
    #[error("failed to load settings from {path}: {reason}")]
    Config { path: String, reason: String },
    #[error("runtime error: {0}")]
    Runtime(String),
}

/// Failure taxonomy shared by the rewrite pipeline and the write-back path.
///
/// Values travel inside channel messages and request states, so the type is
/// cheap to clone and comparable in tests.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ErrorKind {
    #[error("cannot connect to completion service")]
    Unreachable,
    #[error("completion transport failed: {0}")]
    Transport(String),
    #[error("request cancelled")]
    Cancelled,
    #[error("clipboard still locked after {attempts} write attempts: {reason}")]
    ClipboardContention { attempts: u32, reason: String },
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),
}

impl ErrorKind {
    /// Short warning shown to the user in place of a rewrite or as a notice.
    pub fn user_message(&self) -> String {
        match self {
            Self::Unreachable => "⚠️ Cannot connect to AI server".to_string(),
            Self::Transport(detail) => format!("⚠️ Error: {detail}"),
            Self::Cancelled => String::new(),
            Self::ClipboardContention { .. } => {
                "⚠️ Could not write to the clipboard. Please try again.".to_string()
            }
            Self::ConfigInvalid(detail) => format!("⚠️ Invalid settings: {detail}"),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
