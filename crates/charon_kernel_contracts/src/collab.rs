#![forbid(unsafe_code)]

use crate::style::PromptStyle;
use crate::{ContractViolation, SchemaVersion, Validate};

pub const COLLAB_CONTRACT_VERSION: SchemaVersion = SchemaVersion(1);

pub const MAX_PROMPT_CHARS: usize = 20_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptText(String);

impl PromptText {
    pub fn new(v: impl Into<String>) -> Result<Self, ContractViolation> {
        let v = Self(v.into());
        v.validate()?;
        Ok(v)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn char_count(&self) -> u32 {
        self.0.chars().count().min(u32::MAX as usize) as u32
    }
}

impl Validate for PromptText {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.0.trim().is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "prompt_text",
                reason: "must not be empty",
            });
        }
        if self.0.chars().count() > MAX_PROMPT_CHARS {
            return Err(ContractViolation::InvalidValue {
                field: "prompt_text",
                reason: "exceeds max prompt length",
            });
        }
        Ok(())
    }
}

/// One validated enhancement request handed to the collaborator client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnhanceDirective {
    pub schema_version: SchemaVersion,
    pub prompt: PromptText,
    pub style: PromptStyle,
}

impl EnhanceDirective {
    pub fn v1(prompt: PromptText, style: PromptStyle) -> Result<Self, ContractViolation> {
        let row = Self {
            schema_version: COLLAB_CONTRACT_VERSION,
            prompt,
            style,
        };
        row.validate()?;
        Ok(row)
    }
}

impl Validate for EnhanceDirective {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.schema_version != COLLAB_CONTRACT_VERSION {
            return Err(ContractViolation::InvalidValue {
                field: "enhance_directive.schema_version",
                reason: "must match COLLAB_CONTRACT_VERSION",
            });
        }
        self.prompt.validate()?;
        self.style.validate()?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnhanceOutcome {
    pub schema_version: SchemaVersion,
    pub enhanced_text: String,
}

impl EnhanceOutcome {
    pub fn v1(enhanced_text: String) -> Result<Self, ContractViolation> {
        let row = Self {
            schema_version: COLLAB_CONTRACT_VERSION,
            enhanced_text,
        };
        row.validate()?;
        Ok(row)
    }

    pub fn response_chars(&self) -> u32 {
        self.enhanced_text.chars().count().min(u32::MAX as usize) as u32
    }
}

impl Validate for EnhanceOutcome {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.schema_version != COLLAB_CONTRACT_VERSION {
            return Err(ContractViolation::InvalidValue {
                field: "enhance_outcome.schema_version",
                reason: "must match COLLAB_CONTRACT_VERSION",
            });
        }
        if self.enhanced_text.trim().is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "enhance_outcome.enhanced_text",
                reason: "must not be empty",
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_prompt_is_refused() {
        assert!(PromptText::new("   ").is_err());
        assert!(PromptText::new("summarize this").is_ok());
    }

    #[test]
    fn oversized_prompt_is_refused() {
        let oversized = "x".repeat(MAX_PROMPT_CHARS + 1);
        assert!(PromptText::new(oversized).is_err());
    }

    #[test]
    fn directive_carries_prompt_and_style() {
        let directive = EnhanceDirective::v1(
            PromptText::new("write a haiku about rivers").unwrap(),
            PromptStyle::default_v1(),
        )
        .unwrap();
        assert_eq!(directive.prompt.char_count(), 26);
    }

    #[test]
    fn empty_collaborator_text_is_refused() {
        assert!(EnhanceOutcome::v1(String::new()).is_err());
        assert!(EnhanceOutcome::v1("enhanced".to_string()).is_ok());
    }
}
