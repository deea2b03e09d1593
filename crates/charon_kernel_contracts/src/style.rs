#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

use crate::{ContractViolation, SchemaVersion, Validate};

pub const STYLE_CONTRACT_VERSION: SchemaVersion = SchemaVersion(1);

pub const DEFAULT_TARGET_ROLE: &str = "AI Assistant";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DescriptionLevel {
    Brief,
    Detailed,
    Technical,
    Beginner,
}

impl DescriptionLevel {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Brief => "brief",
            Self::Detailed => "detailed",
            Self::Technical => "technical",
            Self::Beginner => "beginner",
        }
    }

    pub const fn all() -> &'static [Self] {
        &[Self::Brief, Self::Detailed, Self::Technical, Self::Beginner]
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "brief" => Some(Self::Brief),
            "detailed" => Some(Self::Detailed),
            "technical" => Some(Self::Technical),
            "beginner" => Some(Self::Beginner),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputLength {
    Short,
    Medium,
    Long,
}

impl OutputLength {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Short => "short",
            Self::Medium => "medium",
            Self::Long => "long",
        }
    }

    pub const fn all() -> &'static [Self] {
        &[Self::Short, Self::Medium, Self::Long]
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "short" => Some(Self::Short),
            "medium" => Some(Self::Medium),
            "long" => Some(Self::Long),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatStyle {
    Bullet,
    Numbered,
    Structured,
    Paragraph,
}

impl FormatStyle {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Bullet => "bullet",
            Self::Numbered => "numbered",
            Self::Structured => "structured",
            Self::Paragraph => "paragraph",
        }
    }

    pub const fn all() -> &'static [Self] {
        &[
            Self::Bullet,
            Self::Numbered,
            Self::Structured,
            Self::Paragraph,
        ]
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "bullet" => Some(Self::Bullet),
            "numbered" => Some(Self::Numbered),
            "structured" => Some(Self::Structured),
            "paragraph" => Some(Self::Paragraph),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseTone {
    Helpful,
    Professional,
    Casual,
    Technical,
}

impl ResponseTone {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Helpful => "helpful",
            Self::Professional => "professional",
            Self::Casual => "casual",
            Self::Technical => "technical",
        }
    }

    pub const fn all() -> &'static [Self] {
        &[
            Self::Helpful,
            Self::Professional,
            Self::Casual,
            Self::Technical,
        ]
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "helpful" => Some(Self::Helpful),
            "professional" => Some(Self::Professional),
            "casual" => Some(Self::Casual),
            "technical" => Some(Self::Technical),
            _ => None,
        }
    }
}

/// Recognized styling options for one enhancement request. Unknown option
/// strings are refused at the boundary, never defaulted silently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptStyle {
    pub target_role: String,
    pub description: DescriptionLevel,
    pub length: OutputLength,
    pub format: FormatStyle,
    pub tone: ResponseTone,
}

impl PromptStyle {
    pub fn v1(
        target_role: String,
        description: DescriptionLevel,
        length: OutputLength,
        format: FormatStyle,
        tone: ResponseTone,
    ) -> Result<Self, ContractViolation> {
        let style = Self {
            target_role,
            description,
            length,
            format,
            tone,
        };
        style.validate()?;
        Ok(style)
    }

    pub fn default_v1() -> Self {
        Self {
            target_role: DEFAULT_TARGET_ROLE.to_string(),
            description: DescriptionLevel::Detailed,
            length: OutputLength::Medium,
            format: FormatStyle::Structured,
            tone: ResponseTone::Helpful,
        }
    }

    /// Builds a style from raw option strings, taking the default for
    /// each absent option.
    pub fn from_options(
        target_role: Option<&str>,
        description: Option<&str>,
        length: Option<&str>,
        format: Option<&str>,
        tone: Option<&str>,
    ) -> Result<Self, ContractViolation> {
        let defaults = Self::default_v1();
        let description = match description {
            Some(raw) => DescriptionLevel::parse(raw).ok_or(ContractViolation::InvalidValue {
                field: "prompt_style.description",
                reason: "unknown description level",
            })?,
            None => defaults.description,
        };
        let length = match length {
            Some(raw) => OutputLength::parse(raw).ok_or(ContractViolation::InvalidValue {
                field: "prompt_style.length",
                reason: "unknown output length",
            })?,
            None => defaults.length,
        };
        let format = match format {
            Some(raw) => FormatStyle::parse(raw).ok_or(ContractViolation::InvalidValue {
                field: "prompt_style.format",
                reason: "unknown format style",
            })?,
            None => defaults.format,
        };
        let tone = match tone {
            Some(raw) => ResponseTone::parse(raw).ok_or(ContractViolation::InvalidValue {
                field: "prompt_style.tone",
                reason: "unknown response tone",
            })?,
            None => defaults.tone,
        };
        let target_role = match target_role {
            Some(raw) => raw.trim().to_string(),
            None => defaults.target_role,
        };
        Self::v1(target_role, description, length, format, tone)
    }
}

impl Validate for PromptStyle {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.target_role.trim().is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "prompt_style.target_role",
                reason: "must not be empty",
            });
        }
        if self.target_role.len() > 120 {
            return Err(ContractViolation::InvalidValue {
                field: "prompt_style.target_role",
                reason: "exceeds max length",
            });
        }
        Ok(())
    }
}
