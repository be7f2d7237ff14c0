use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::Settings;
use crate::network::RewriteRequest;

pub const MIN_TEMPERATURE: f64 = 0.1;
pub const MAX_TEMPERATURE: f64 = 0.9;
pub const CUSTOM_TEMPERATURE: f64 = 0.5;

/// Semantic rewrite action chosen by the user or defaulted from settings.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ActionId {
    Improve,
    Formal,
    Casual,
    Short,
    Reword,
    Custom(String),
}

impl ActionId {
    pub const PRESETS: [ActionId; 5] = [
        ActionId::Improve,
        ActionId::Formal,
        ActionId::Casual,
        ActionId::Short,
        ActionId::Reword,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Improve => "Improve",
            Self::Formal => "Formal",
            Self::Casual => "Casual",
            Self::Short => "Short",
            Self::Reword => "Reword",
            Self::Custom(_) => "Custom",
        }
    }

    /// Label shown while a request for this action is running.
    pub fn progress_label(&self) -> &'static str {
        match self {
            Self::Improve => "Improving",
            Self::Formal => "Making formal",
            Self::Casual => "Making casual",
            Self::Short => "Shortening",
            Self::Reword => "Rewording",
            Self::Custom(_) => "Processing",
        }
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown action `{0}`")]
pub struct UnknownAction(pub String);

impl FromStr for ActionId {
    type Err = UnknownAction;

    /// Parses a preset name. Custom actions carry free text and are never parsed.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_lowercase();
        match normalized.as_str() {
            "improve" => Ok(Self::Improve),
            "formal" => Ok(Self::Formal),
            "casual" => Ok(Self::Casual),
            "short" | "shorten" => Ok(Self::Short),
            "reword" => Ok(Self::Reword),
            _ => Err(UnknownAction(value.trim().to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionPrompt {
    pub instruction: String,
    pub temperature: f64,
}

impl ActionPrompt {
    fn new(instruction: &str, temperature: f64) -> Self {
        Self {
            instruction: instruction.to_string(),
            temperature,
        }
    }
}

/// Closed lookup table from preset actions to their prompt and temperature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ActionPrompts {
    pub improve: ActionPrompt,
    pub formal: ActionPrompt,
    pub casual: ActionPrompt,
    pub short: ActionPrompt,
    pub reword: ActionPrompt,
}

impl Default for ActionPrompts {
    fn default() -> Self {
        Self {
            improve: ActionPrompt::new(
                "Fix all grammar, spelling, and punctuation errors. Preserve the original meaning, tone, acronyms, names, and technical terms",
                0.3,
            ),
            formal: ActionPrompt::new(
                "Make the following text more formal and professional while keeping the same meaning",
                0.1,
            ),
            casual: ActionPrompt::new(
                "Rewrite the following text in casual, conversational language",
                0.5,
            ),
            short: ActionPrompt::new("Shorten this text", 0.3),
            reword: ActionPrompt::new(
                "Rewrite the following text with different wording but same meaning",
                0.7,
            ),
        }
    }
}

impl ActionPrompts {
    /// Returns the preset entry for `action`, or `None` for custom actions.
    pub fn get(&self, action: &ActionId) -> Option<&ActionPrompt> {
        match action {
            ActionId::Improve => Some(&self.improve),
            ActionId::Formal => Some(&self.formal),
            ActionId::Casual => Some(&self.casual),
            ActionId::Short => Some(&self.short),
            ActionId::Reword => Some(&self.reword),
            ActionId::Custom(_) => None,
        }
    }

    pub fn get_mut(&mut self, action: &ActionId) -> Option<&mut ActionPrompt> {
        match action {
            ActionId::Improve => Some(&mut self.improve),
            ActionId::Formal => Some(&mut self.formal),
            ActionId::Casual => Some(&mut self.casual),
            ActionId::Short => Some(&mut self.short),
            ActionId::Reword => Some(&mut self.reword),
            ActionId::Custom(_) => None,
        }
    }
}

pub fn instruction_for<'a>(settings: &'a Settings, action: &'a ActionId) -> &'a str {
    match action {
        ActionId::Custom(instruction) => instruction.as_str(),
        preset => settings
            .actions
            .get(preset)
            .map(|prompt| prompt.instruction.as_str())
            .unwrap_or(settings.actions.improve.instruction.as_str()),
    }
}

pub fn temperature_for(settings: &Settings, action: &ActionId) -> f64 {
    settings
        .actions
        .get(action)
        .map(|prompt| prompt.temperature)
        .unwrap_or(CUSTOM_TEMPERATURE)
}

/// Builds the completion request for `action` applied to `text` under one settings snapshot.
pub fn build_request(settings: &Settings, action: &ActionId, text: &str) -> RewriteRequest {
    RewriteRequest {
        endpoint: settings.endpoint.clone(),
        system_prompt: settings.system_prompt.clone(),
        instruction: instruction_for(settings, action).to_string(),
        text: text.to_string(),
        max_tokens: settings.max_tokens,
        temperature: temperature_for(settings, action),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preset_lookup_uses_configured_values() {
        let mut settings = Settings::default();
        settings.actions.formal.instruction = "Be stiff".to_string();
        settings.actions.formal.temperature = 0.2;

        assert_eq!(instruction_for(&settings, &ActionId::Formal), "Be stiff");
        assert_eq!(temperature_for(&settings, &ActionId::Formal), 0.2);
    }

    #[test]
    fn custom_action_uses_its_own_instruction_and_default_temperature() {
        let settings = Settings::default();
        let action = ActionId::Custom("Make it rhyme".to_string());

        assert_eq!(instruction_for(&settings, &action), "Make it rhyme");
        assert_eq!(temperature_for(&settings, &action), CUSTOM_TEMPERATURE);
    }

    #[test]
    fn parse_accepts_preset_names_case_insensitively() {
        assert_eq!("FORMAL".parse::<ActionId>(), Ok(ActionId::Formal));
        assert_eq!(" reword ".parse::<ActionId>(), Ok(ActionId::Reword));
        assert!("custom".parse::<ActionId>().is_err());
    }

    #[test]
    fn unknown_action_names_the_input() {
        let err = " pirate ".parse::<ActionId>().unwrap_err();
        assert_eq!(err, UnknownAction("pirate".to_string()));
        assert_eq!(err.to_string(), "unknown action `pirate`");
    }

    #[test]
    fn every_preset_has_a_table_entry() {
        let prompts = ActionPrompts::default();
        for action in ActionId::PRESETS {
            let entry = prompts.get(&action).expect("preset should have an entry");
            assert!(!entry.instruction.is_empty());
            assert!((MIN_TEMPERATURE..=MAX_TEMPERATURE).contains(&entry.temperature));
        }
    }

    #[test]
    fn request_joins_settings_and_action() {
        let settings = Settings::default();
        let request = build_request(&settings, &ActionId::Short, "a long sentence");

        assert_eq!(request.instruction, "Shorten this text");
        assert_eq!(request.text, "a long sentence");
        assert_eq!(request.max_tokens, settings.max_tokens);
        assert_eq!(request.temperature, 0.3);
    }
}
