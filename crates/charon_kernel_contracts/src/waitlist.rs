#![forbid(unsafe_code)]

use crate::{ContractViolation, MonotonicTimeNs, SchemaVersion, Validate};

pub const WAITLIST_CONTRACT_VERSION: SchemaVersion = SchemaVersion(1);

fn validate_text(
    field: &'static str,
    value: &str,
    max_len: usize,
) -> Result<(), ContractViolation> {
    if value.trim().is_empty() {
        return Err(ContractViolation::InvalidValue {
            field,
            reason: "must not be empty",
        });
    }
    if value.len() > max_len {
        return Err(ContractViolation::InvalidValue {
            field,
            reason: "exceeds max length",
        });
    }
    Ok(())
}

fn validate_opt_text(
    field: &'static str,
    value: &Option<String>,
    max_len: usize,
) -> Result<(), ContractViolation> {
    if let Some(v) = value {
        validate_text(field, v, max_len)?;
    }
    Ok(())
}

/// Normalized to lowercase on construction so equality matches the
/// duplicate-email uniqueness rule.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EmailAddress(String);

impl EmailAddress {
    pub fn new(v: impl Into<String>) -> Result<Self, ContractViolation> {
        let v = Self(v.into().trim().to_ascii_lowercase());
        v.validate()?;
        Ok(v)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Validate for EmailAddress {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_text("email_address", &self.0, 254)?;
        if self.0.chars().any(char::is_whitespace) {
            return Err(ContractViolation::InvalidValue {
                field: "email_address",
                reason: "must not contain whitespace",
            });
        }
        let Some((local, domain)) = self.0.split_once('@') else {
            return Err(ContractViolation::InvalidValue {
                field: "email_address",
                reason: "must contain exactly one '@'",
            });
        };
        if local.is_empty() || domain.is_empty() || domain.contains('@') {
            return Err(ContractViolation::InvalidValue {
                field: "email_address",
                reason: "must have a local part and a domain",
            });
        }
        if !domain.contains('.') {
            return Err(ContractViolation::InvalidValue {
                field: "email_address",
                reason: "domain must contain a dot",
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ApplicantName(String);

impl ApplicantName {
    pub fn new(v: impl Into<String>) -> Result<Self, ContractViolation> {
        let v = Self(v.into());
        v.validate()?;
        Ok(v)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Validate for ApplicantName {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_text("applicant_name", &self.0, 120)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ApplicantReason(String);

impl ApplicantReason {
    pub fn new(v: impl Into<String>) -> Result<Self, ContractViolation> {
        let v = Self(v.into());
        v.validate()?;
        Ok(v)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Validate for ApplicantReason {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_text("applicant_reason", &self.0, 1000)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApplicantStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApplicantStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApplicantDecision {
    Approve,
    Reject,
}

impl ApplicantDecision {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicantInput {
    pub schema_version: SchemaVersion,
    pub name: ApplicantName,
    pub email: EmailAddress,
    pub reason: ApplicantReason,
    pub applied_at: MonotonicTimeNs,
}

impl ApplicantInput {
    pub fn v1(
        name: ApplicantName,
        email: EmailAddress,
        reason: ApplicantReason,
        applied_at: MonotonicTimeNs,
    ) -> Result<Self, ContractViolation> {
        let row = Self {
            schema_version: WAITLIST_CONTRACT_VERSION,
            name,
            email,
            reason,
            applied_at,
        };
        row.validate()?;
        Ok(row)
    }
}

impl Validate for ApplicantInput {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.schema_version != WAITLIST_CONTRACT_VERSION {
            return Err(ContractViolation::InvalidValue {
                field: "applicant_input.schema_version",
                reason: "must match WAITLIST_CONTRACT_VERSION",
            });
        }
        if self.applied_at.0 == 0 {
            return Err(ContractViolation::InvalidValue {
                field: "applicant_input.applied_at",
                reason: "must be > 0",
            });
        }
        self.name.validate()?;
        self.email.validate()?;
        self.reason.validate()?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicantRecord {
    pub schema_version: SchemaVersion,
    pub name: ApplicantName,
    pub email: EmailAddress,
    pub reason: ApplicantReason,
    pub status: ApplicantStatus,
    pub applied_at: MonotonicTimeNs,
    pub decided_at: Option<MonotonicTimeNs>,
    pub admin_note: Option<String>,
}

impl ApplicantRecord {
    pub fn from_input_v1(input: ApplicantInput) -> Result<Self, ContractViolation> {
        input.validate()?;
        let row = Self {
            schema_version: WAITLIST_CONTRACT_VERSION,
            name: input.name,
            email: input.email,
            reason: input.reason,
            status: ApplicantStatus::Pending,
            applied_at: input.applied_at,
            decided_at: None,
            admin_note: None,
        };
        row.validate()?;
        Ok(row)
    }
}

impl Validate for ApplicantRecord {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.schema_version != WAITLIST_CONTRACT_VERSION {
            return Err(ContractViolation::InvalidValue {
                field: "applicant_record.schema_version",
                reason: "must match WAITLIST_CONTRACT_VERSION",
            });
        }
        if self.applied_at.0 == 0 {
            return Err(ContractViolation::InvalidValue {
                field: "applicant_record.applied_at",
                reason: "must be > 0",
            });
        }
        self.name.validate()?;
        self.email.validate()?;
        self.reason.validate()?;
        match self.status {
            ApplicantStatus::Pending => {
                if self.decided_at.is_some() {
                    return Err(ContractViolation::InvalidValue {
                        field: "applicant_record.decided_at",
                        reason: "must be absent while pending",
                    });
                }
            }
            ApplicantStatus::Approved | ApplicantStatus::Rejected => {
                let Some(decided_at) = self.decided_at else {
                    return Err(ContractViolation::InvalidValue {
                        field: "applicant_record.decided_at",
                        reason: "must be present once decided",
                    });
                };
                if decided_at < self.applied_at {
                    return Err(ContractViolation::InvalidValue {
                        field: "applicant_record.decided_at",
                        reason: "must not precede applied_at",
                    });
                }
            }
        }
        validate_opt_text("applicant_record.admin_note", &self.admin_note, 1000)?;
        Ok(())
    }
}
