#![forbid(unsafe_code)]

use crate::waitlist::{ApplicantName, EmailAddress};
use crate::{ContractViolation, MonotonicTimeNs, SchemaVersion, Validate};

pub const ACCOUNT_CONTRACT_VERSION: SchemaVersion = SchemaVersion(1);

pub const REDEMPTION_CODE_LEN: usize = 8;

/// Uppercase letters and digits minus the ambiguous I, O, 0, 1.
pub const REDEMPTION_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RedemptionCode(String);

impl RedemptionCode {
    pub fn new(v: impl Into<String>) -> Result<Self, ContractViolation> {
        let v = Self(v.into());
        v.validate()?;
        Ok(v)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Validate for RedemptionCode {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.0.len() != REDEMPTION_CODE_LEN {
            return Err(ContractViolation::InvalidValue {
                field: "redemption_code",
                reason: "must be exactly 8 characters",
            });
        }
        if self
            .0
            .bytes()
            .any(|b| !REDEMPTION_CODE_ALPHABET.contains(&b))
        {
            return Err(ContractViolation::InvalidValue {
                field: "redemption_code",
                reason: "must use only the unambiguous code alphabet",
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccountStatus {
    Active,
    Revoked,
}

impl AccountStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Revoked => "revoked",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountInput {
    pub schema_version: SchemaVersion,
    pub code: RedemptionCode,
    pub email: EmailAddress,
    pub holder_name: ApplicantName,
    pub granted: u32,
    pub created_at: MonotonicTimeNs,
}

impl AccountInput {
    pub fn v1(
        code: RedemptionCode,
        email: EmailAddress,
        holder_name: ApplicantName,
        granted: u32,
        created_at: MonotonicTimeNs,
    ) -> Result<Self, ContractViolation> {
        let row = Self {
            schema_version: ACCOUNT_CONTRACT_VERSION,
            code,
            email,
            holder_name,
            granted,
            created_at,
        };
        row.validate()?;
        Ok(row)
    }
}

impl Validate for AccountInput {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.schema_version != ACCOUNT_CONTRACT_VERSION {
            return Err(ContractViolation::InvalidValue {
                field: "account_input.schema_version",
                reason: "must match ACCOUNT_CONTRACT_VERSION",
            });
        }
        if self.granted == 0 {
            return Err(ContractViolation::InvalidValue {
                field: "account_input.granted",
                reason: "must be > 0",
            });
        }
        if self.created_at.0 == 0 {
            return Err(ContractViolation::InvalidValue {
                field: "account_input.created_at",
                reason: "must be > 0",
            });
        }
        self.code.validate()?;
        self.email.validate()?;
        self.holder_name.validate()?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountRecord {
    pub schema_version: SchemaVersion,
    pub code: RedemptionCode,
    pub email: EmailAddress,
    pub holder_name: ApplicantName,
    pub granted: u32,
    pub consumed: u32,
    pub status: AccountStatus,
    pub created_at: MonotonicTimeNs,
    pub last_used_at: Option<MonotonicTimeNs>,
}

impl AccountRecord {
    pub fn from_input_v1(input: AccountInput) -> Result<Self, ContractViolation> {
        input.validate()?;
        let row = Self {
            schema_version: ACCOUNT_CONTRACT_VERSION,
            code: input.code,
            email: input.email,
            holder_name: input.holder_name,
            granted: input.granted,
            consumed: 0,
            status: AccountStatus::Active,
            created_at: input.created_at,
            last_used_at: None,
        };
        row.validate()?;
        Ok(row)
    }

    pub fn remaining(&self) -> u32 {
        self.granted.saturating_sub(self.consumed)
    }
}

impl Validate for AccountRecord {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.schema_version != ACCOUNT_CONTRACT_VERSION {
            return Err(ContractViolation::InvalidValue {
                field: "account_record.schema_version",
                reason: "must match ACCOUNT_CONTRACT_VERSION",
            });
        }
        if self.granted == 0 {
            return Err(ContractViolation::InvalidValue {
                field: "account_record.granted",
                reason: "must be > 0",
            });
        }
        if self.consumed > self.granted {
            return Err(ContractViolation::InvalidValue {
                field: "account_record.consumed",
                reason: "must not exceed granted",
            });
        }
        if self.created_at.0 == 0 {
            return Err(ContractViolation::InvalidValue {
                field: "account_record.created_at",
                reason: "must be > 0",
            });
        }
        self.code.validate()?;
        self.email.validate()?;
        self.holder_name.validate()?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreditBalance {
    pub schema_version: SchemaVersion,
    pub code: RedemptionCode,
    pub granted: u32,
    pub consumed: u32,
    pub remaining: u32,
    pub status: AccountStatus,
}

impl CreditBalance {
    pub fn v1(account: &AccountRecord) -> Result<Self, ContractViolation> {
        let row = Self {
            schema_version: ACCOUNT_CONTRACT_VERSION,
            code: account.code.clone(),
            granted: account.granted,
            consumed: account.consumed,
            remaining: account.remaining(),
            status: account.status,
        };
        row.validate()?;
        Ok(row)
    }
}

impl Validate for CreditBalance {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.schema_version != ACCOUNT_CONTRACT_VERSION {
            return Err(ContractViolation::InvalidValue {
                field: "credit_balance.schema_version",
                reason: "must match ACCOUNT_CONTRACT_VERSION",
            });
        }
        if self.consumed > self.granted {
            return Err(ContractViolation::InvalidValue {
                field: "credit_balance.consumed",
                reason: "must not exceed granted",
            });
        }
        if self.remaining != self.granted - self.consumed {
            return Err(ContractViolation::InvalidValue {
                field: "credit_balance.remaining",
                reason: "must equal granted minus consumed",
            });
        }
        self.code.validate()?;
        Ok(())
    }
}
