#![forbid(unsafe_code)]

use crate::account::RedemptionCode;
use crate::{ContractViolation, MonotonicTimeNs, SchemaVersion, Validate};

pub const USAGE_CONTRACT_VERSION: SchemaVersion = SchemaVersion(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReservationId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UsageEventId(pub u64);

/// Caller-supplied origin label recorded on usage events, e.g. an
/// extension install id or a forwarded address.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClientTag(String);

impl ClientTag {
    pub fn new(v: impl Into<String>) -> Result<Self, ContractViolation> {
        let v = Self(v.into());
        v.validate()?;
        Ok(v)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Validate for ClientTag {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.0.trim().is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "client_tag",
                reason: "must not be empty",
            });
        }
        if self.0.len() > 128 {
            return Err(ContractViolation::InvalidValue {
                field: "client_tag",
                reason: "exceeds max length",
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReservationState {
    Pending,
    Committed,
    RolledBack,
}

impl ReservationState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Committed => "committed",
            Self::RolledBack => "rolled_back",
        }
    }

    pub const fn is_closed(self) -> bool {
        matches!(self, Self::Committed | Self::RolledBack)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationRecord {
    pub schema_version: SchemaVersion,
    pub reservation_id: ReservationId,
    pub code: RedemptionCode,
    pub amount: u32,
    pub reserved_at: MonotonicTimeNs,
    pub state: ReservationState,
    pub closed_at: Option<MonotonicTimeNs>,
}

impl ReservationRecord {
    pub fn pending_v1(
        reservation_id: ReservationId,
        code: RedemptionCode,
        amount: u32,
        reserved_at: MonotonicTimeNs,
    ) -> Result<Self, ContractViolation> {
        let row = Self {
            schema_version: USAGE_CONTRACT_VERSION,
            reservation_id,
            code,
            amount,
            reserved_at,
            state: ReservationState::Pending,
            closed_at: None,
        };
        row.validate()?;
        Ok(row)
    }
}

impl Validate for ReservationRecord {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.schema_version != USAGE_CONTRACT_VERSION {
            return Err(ContractViolation::InvalidValue {
                field: "reservation_record.schema_version",
                reason: "must match USAGE_CONTRACT_VERSION",
            });
        }
        if self.reservation_id.0 == 0 {
            return Err(ContractViolation::InvalidValue {
                field: "reservation_record.reservation_id",
                reason: "must be > 0",
            });
        }
        if self.amount == 0 {
            return Err(ContractViolation::InvalidValue {
                field: "reservation_record.amount",
                reason: "must be > 0",
            });
        }
        if self.reserved_at.0 == 0 {
            return Err(ContractViolation::InvalidValue {
                field: "reservation_record.reserved_at",
                reason: "must be > 0",
            });
        }
        self.code.validate()?;
        match self.state {
            ReservationState::Pending => {
                if self.closed_at.is_some() {
                    return Err(ContractViolation::InvalidValue {
                        field: "reservation_record.closed_at",
                        reason: "must be absent while pending",
                    });
                }
            }
            ReservationState::Committed | ReservationState::RolledBack => {
                let Some(closed_at) = self.closed_at else {
                    return Err(ContractViolation::InvalidValue {
                        field: "reservation_record.closed_at",
                        reason: "must be present once closed",
                    });
                };
                if closed_at < self.reserved_at {
                    return Err(ContractViolation::InvalidValue {
                        field: "reservation_record.closed_at",
                        reason: "must not precede reserved_at",
                    });
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageEventInput {
    pub schema_version: SchemaVersion,
    pub code: RedemptionCode,
    pub reservation_id: ReservationId,
    pub prompt_chars: u32,
    pub response_chars: u32,
    pub created_at: MonotonicTimeNs,
    pub client_tag: Option<ClientTag>,
}

impl UsageEventInput {
    pub fn v1(
        code: RedemptionCode,
        reservation_id: ReservationId,
        prompt_chars: u32,
        response_chars: u32,
        created_at: MonotonicTimeNs,
        client_tag: Option<ClientTag>,
    ) -> Result<Self, ContractViolation> {
        let row = Self {
            schema_version: USAGE_CONTRACT_VERSION,
            code,
            reservation_id,
            prompt_chars,
            response_chars,
            created_at,
            client_tag,
        };
        row.validate()?;
        Ok(row)
    }
}

impl Validate for UsageEventInput {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.schema_version != USAGE_CONTRACT_VERSION {
            return Err(ContractViolation::InvalidValue {
                field: "usage_event_input.schema_version",
                reason: "must match USAGE_CONTRACT_VERSION",
            });
        }
        if self.reservation_id.0 == 0 {
            return Err(ContractViolation::InvalidValue {
                field: "usage_event_input.reservation_id",
                reason: "must be > 0",
            });
        }
        if self.created_at.0 == 0 {
            return Err(ContractViolation::InvalidValue {
                field: "usage_event_input.created_at",
                reason: "must be > 0",
            });
        }
        self.code.validate()?;
        if let Some(tag) = &self.client_tag {
            tag.validate()?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageEventRecord {
    pub schema_version: SchemaVersion,
    pub usage_event_id: UsageEventId,
    pub code: RedemptionCode,
    pub reservation_id: ReservationId,
    pub prompt_chars: u32,
    pub response_chars: u32,
    pub created_at: MonotonicTimeNs,
    pub client_tag: Option<ClientTag>,
}

impl UsageEventRecord {
    pub fn from_input_v1(
        usage_event_id: UsageEventId,
        input: UsageEventInput,
    ) -> Result<Self, ContractViolation> {
        input.validate()?;
        let row = Self {
            schema_version: USAGE_CONTRACT_VERSION,
            usage_event_id,
            code: input.code,
            reservation_id: input.reservation_id,
            prompt_chars: input.prompt_chars,
            response_chars: input.response_chars,
            created_at: input.created_at,
            client_tag: input.client_tag,
        };
        row.validate()?;
        Ok(row)
    }
}

impl Validate for UsageEventRecord {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.schema_version != USAGE_CONTRACT_VERSION {
            return Err(ContractViolation::InvalidValue {
                field: "usage_event_record.schema_version",
                reason: "must match USAGE_CONTRACT_VERSION",
            });
        }
        if self.usage_event_id.0 == 0 {
            return Err(ContractViolation::InvalidValue {
                field: "usage_event_record.usage_event_id",
                reason: "must be > 0",
            });
        }
        if self.reservation_id.0 == 0 {
            return Err(ContractViolation::InvalidValue {
                field: "usage_event_record.reservation_id",
                reason: "must be > 0",
            });
        }
        if self.created_at.0 == 0 {
            return Err(ContractViolation::InvalidValue {
                field: "usage_event_record.created_at",
                reason: "must be > 0",
            });
        }
        self.code.validate()?;
        if let Some(tag) = &self.client_tag {
            tag.validate()?;
        }
        Ok(())
    }
}
