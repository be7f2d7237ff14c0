use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{AppError, ErrorKind};
use crate::prompts::{ActionId, ActionPrompts, MAX_TEMPERATURE, MIN_TEMPERATURE};

pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:1234/v1/chat/completions";
pub const DEFAULT_SYSTEM_PROMPT: &str =
    "Edit the text and return only the improved version. No explanations.";
pub const DEFAULT_MAX_TOKENS: u32 = 256;
pub const MIN_MAX_TOKENS: u32 = 50;
pub const MAX_MAX_TOKENS: u32 = 2000;
pub const DEFAULT_ACTION: &str = "Improve";

/// Immutable configuration snapshot read by every rewrite operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_action_name")]
    pub default_action: String,
    #[serde(default)]
    pub actions: ActionPrompts,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            system_prompt: default_system_prompt(),
            max_tokens: default_max_tokens(),
            default_action: default_action_name(),
            actions: ActionPrompts::default(),
        }
    }
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}

fn default_max_tokens() -> u32 {
    DEFAULT_MAX_TOKENS
}

fn default_action_name() -> String {
    DEFAULT_ACTION.to_string()
}

impl Settings {
    /// Reads a settings snapshot. A missing file yields defaults; the file is never written.
    pub fn load(path: &Path) -> Result<Self, AppError> {
        if !path.exists() {
            info!(path = %path.display(), "settings file not found; using defaults");
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(path).map_err(|err| AppError::Config {
            path: path.display().to_string(),
            reason: err.to_string(),
        })?;
        let parsed: Settings = serde_json::from_str(&raw).map_err(|err| AppError::Config {
            path: path.display().to_string(),
            reason: err.to_string(),
        })?;

        Ok(parsed.normalize())
    }

    /// Parsed default action. Always a preset once the snapshot is normalized.
    pub fn default_action(&self) -> ActionId {
        self.default_action.parse().unwrap_or(ActionId::Improve)
    }

    /// Clamps out-of-range values and replaces unusable ones with defaults.
    pub fn normalize(mut self) -> Self {
        let defaults = Settings::default();

        self.endpoint = self.endpoint.trim().to_string();
        if self.endpoint.is_empty() {
            report_invalid("endpoint is empty; using default endpoint".to_string());
            self.endpoint = defaults.endpoint.clone();
        }

        self.system_prompt = self.system_prompt.trim().to_string();
        if self.system_prompt.is_empty() {
            report_invalid("system prompt is empty; using default prompt".to_string());
            self.system_prompt = defaults.system_prompt.clone();
        }

        let clamped_tokens = self.max_tokens.clamp(MIN_MAX_TOKENS, MAX_MAX_TOKENS);
        if clamped_tokens != self.max_tokens {
            report_invalid(format!(
                "maxTokens {} is outside {MIN_MAX_TOKENS}..={MAX_MAX_TOKENS}; clamped to {clamped_tokens}",
                self.max_tokens
            ));
            self.max_tokens = clamped_tokens;
        }

        match self.default_action.parse::<ActionId>() {
            Ok(action) => self.default_action = action.name().to_string(),
            Err(err) => {
                report_invalid(format!("defaultAction: {err}; using {DEFAULT_ACTION}"));
                self.default_action = default_action_name();
            }
        }

        for action in ActionId::PRESETS {
            let (Some(entry), Some(fallback)) =
                (self.actions.get_mut(&action), defaults.actions.get(&action))
            else {
                continue;
            };

            entry.instruction = entry.instruction.trim().to_string();
            if entry.instruction.is_empty() {
                report_invalid(format!("{action} instruction is empty; using default"));
                entry.instruction = fallback.instruction.clone();
            }

            if !entry.temperature.is_finite() {
                report_invalid(format!("{action} temperature is not a number; using default"));
                entry.temperature = fallback.temperature;
            } else if !(MIN_TEMPERATURE..=MAX_TEMPERATURE).contains(&entry.temperature) {
                let clamped = entry.temperature.clamp(MIN_TEMPERATURE, MAX_TEMPERATURE);
                report_invalid(format!(
                    "{action} temperature {} is outside {MIN_TEMPERATURE}..={MAX_TEMPERATURE}; clamped to {clamped}",
                    entry.temperature
                ));
                entry.temperature = clamped;
            }
        }

        self
    }
}

fn report_invalid(detail: String) {
    let err = ErrorKind::ConfigInvalid(detail);
    warn!("{err}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_fills_defaults() {
        let parsed: Settings =
            serde_json::from_str(r#"{"endpoint":"http://localhost:9000/v1/chat/completions"}"#)
                .expect("settings should parse");

        assert_eq!(parsed.endpoint, "http://localhost:9000/v1/chat/completions");
        assert_eq!(parsed.max_tokens, DEFAULT_MAX_TOKENS);
        assert_eq!(parsed.actions, ActionPrompts::default());
        assert_eq!(parsed.default_action(), ActionId::Improve);
    }

    #[test]
    fn normalize_clamps_numeric_ranges() {
        let mut settings = Settings {
            max_tokens: 10_000,
            ..Settings::default()
        };
        settings.actions.reword.temperature = 1.7;
        settings.actions.formal.temperature = 0.0;
        settings.actions.casual.temperature = f64::NAN;

        let normalized = settings.normalize();

        assert_eq!(normalized.max_tokens, MAX_MAX_TOKENS);
        assert_eq!(normalized.actions.reword.temperature, MAX_TEMPERATURE);
        assert_eq!(normalized.actions.formal.temperature, MIN_TEMPERATURE);
        assert_eq!(
            normalized.actions.casual.temperature,
            ActionPrompts::default().casual.temperature
        );
    }

    #[test]
    fn normalize_replaces_unknown_default_action_and_blank_strings() {
        let mut settings = Settings {
            endpoint: "   ".to_string(),
            default_action: "Poetic".to_string(),
            ..Settings::default()
        };
        settings.actions.short.instruction = " ".to_string();

        let normalized = settings.normalize();

        assert_eq!(normalized.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(normalized.default_action, DEFAULT_ACTION);
        assert_eq!(
            normalized.actions.short.instruction,
            ActionPrompts::default().short.instruction
        );
    }

    #[test]
    fn normalize_canonicalizes_default_action_name() {
        let settings = Settings {
            default_action: "casual".to_string(),
            ..Settings::default()
        };

        let normalized = settings.normalize();
        assert_eq!(normalized.default_action, "Casual");
        assert_eq!(normalized.default_action(), ActionId::Casual);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let path = std::env::temp_dir().join("clipaid-missing-settings-8f2c.json");
        let loaded = Settings::load(&path).expect("missing file should not fail");
        assert_eq!(loaded, Settings::default());
    }

    #[test]
    fn malformed_file_reports_config_error() {
        let path = std::env::temp_dir().join(format!(
            "clipaid-malformed-settings-{}.json",
            std::process::id()
        ));
        fs::write(&path, "{ not json").expect("temp file should be writable");

        let result = Settings::load(&path);
        let _ = fs::remove_file(&path);

        assert!(matches!(result, Err(AppError::Config { .. })));
    }
}
