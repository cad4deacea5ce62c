use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const MAX_DESCRIPTION_LEN: usize = 2_000;

/// Option keys the remote renderer is known to understand. `options` is a
/// free-form bag on the wire, but only these survive validation — anything
/// else is rejected rather than silently forwarded.
pub const RECOGNIZED_OPTION_KEYS: &[&str] = &["seed", "negative_description", "priority_hint"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptSize {
    pub width: u32,
    pub height: u32,
}

/// The request body a user submits for a sprite render. Field names and
/// required-ness mirror the remote renderer's own request schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredPrompt {
    pub r#type: String,
    pub style: String,
    pub size: PromptSize,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<HashMap<String, Value>>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PromptValidationError {
    #[error("type is required")]
    MissingType,
    #[error("style is required")]
    MissingStyle,
    #[error("description must not be empty")]
    EmptyDescription,
    #[error("description exceeds {MAX_DESCRIPTION_LEN} characters")]
    DescriptionTooLong,
    #[error("size.width and size.height must be greater than zero")]
    InvalidSize,
    #[error("options contains unrecognized key {0:?}")]
    UnrecognizedOption(String),
}

impl StructuredPrompt {
    pub fn validate(&self) -> Result<(), PromptValidationError> {
        if self.r#type.trim().is_empty() {
            return Err(PromptValidationError::MissingType);
        }
        if self.style.trim().is_empty() {
            return Err(PromptValidationError::MissingStyle);
        }
        if self.description.trim().is_empty() {
            return Err(PromptValidationError::EmptyDescription);
        }
        if self.description.len() > MAX_DESCRIPTION_LEN {
            return Err(PromptValidationError::DescriptionTooLong);
        }
        if self.size.width == 0 || self.size.height == 0 {
            return Err(PromptValidationError::InvalidSize);
        }
        if let Some(options) = &self.options {
            for key in options.keys() {
                if !RECOGNIZED_OPTION_KEYS.contains(&key.as_str()) {
                    return Err(PromptValidationError::UnrecognizedOption(key.clone()));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid_prompt() -> StructuredPrompt {
        StructuredPrompt {
            r#type: "character".into(),
            style: "pixel".into(),
            size: PromptSize { width: 64, height: 64 },
            description: "a pixel-art knight".into(),
            action: None,
            raw: None,
            options: None,
        }
    }

    #[test]
    fn accepts_a_well_formed_prompt() {
        assert!(valid_prompt().validate().is_ok());
    }

    #[test]
    fn rejects_missing_type() {
        let mut p = valid_prompt();
        p.r#type = "  ".into();
        assert_eq!(p.validate(), Err(PromptValidationError::MissingType));
    }

    #[test]
    fn rejects_missing_style() {
        let mut p = valid_prompt();
        p.style = "".into();
        assert_eq!(p.validate(), Err(PromptValidationError::MissingStyle));
    }

    #[test]
    fn rejects_empty_description() {
        let mut p = valid_prompt();
        p.description = "   ".into();
        assert_eq!(p.validate(), Err(PromptValidationError::EmptyDescription));
    }

    #[test]
    fn rejects_zero_dimensions() {
        let mut p = valid_prompt();
        p.size.width = 0;
        assert_eq!(p.validate(), Err(PromptValidationError::InvalidSize));
    }

    #[test]
    fn accepts_recognized_option_keys() {
        let mut p = valid_prompt();
        p.options = Some(HashMap::from([("seed".to_string(), json!(42))]));
        assert!(p.validate().is_ok());
    }

    #[test]
    fn rejects_unrecognized_option_keys() {
        let mut p = valid_prompt();
        p.options = Some(HashMap::from([("made_up".to_string(), json!(1))]));
        assert_eq!(
            p.validate(),
            Err(PromptValidationError::UnrecognizedOption("made_up".into()))
        );
    }
}
