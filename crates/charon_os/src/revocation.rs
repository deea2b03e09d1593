#![forbid(unsafe_code)]

use charon_kernel_contracts::account::{CreditBalance, RedemptionCode};
use charon_kernel_contracts::{ContractViolation, ReasonCodeId, Validate};
use charon_storage::{LedgerError, LedgerStore};

use crate::credit_gate::code_fingerprint;

pub mod reason_codes {
    use charon_kernel_contracts::ReasonCodeId;

    // Revocation reason-code namespace ("RV" prefix). Values are
    // placeholders until registry lock.
    pub const REVOKE_OK: ReasonCodeId = ReasonCodeId(0x5256_0001);
    pub const REVOKE_REFUSE_UNKNOWN_CODE: ReasonCodeId = ReasonCodeId(0x5256_0101);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevocationRequest {
    pub code: RedemptionCode,
}

impl Validate for RevocationRequest {
    fn validate(&self) -> Result<(), ContractViolation> {
        self.code.validate()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RevocationOk {
    pub reason_code: ReasonCodeId,
    pub balance: CreditBalance,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RevocationRefuse {
    pub reason_code: ReasonCodeId,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RevocationResponse {
    Ok(RevocationOk),
    Refuse(RevocationRefuse),
}

/// Administrative kill switch for an account. Idempotent: revoking an
/// already-revoked account succeeds without further effect, and the
/// usage ledger is never touched.
#[derive(Debug, Default, Clone)]
pub struct RevocationRuntime;

impl RevocationRuntime {
    pub fn run(
        &self,
        store: &mut LedgerStore,
        req: &RevocationRequest,
    ) -> Result<RevocationResponse, LedgerError> {
        req.validate()?;
        match store.revoke_account(&req.code) {
            Ok(()) => {
                let balance = store.credit_balance(&req.code)?;
                Ok(RevocationResponse::Ok(RevocationOk {
                    reason_code: reason_codes::REVOKE_OK,
                    balance,
                }))
            }
            Err(LedgerError::NotFound { .. }) => {
                Ok(RevocationResponse::Refuse(RevocationRefuse {
                    reason_code: reason_codes::REVOKE_REFUSE_UNKNOWN_CODE,
                    detail: format!(
                        "unknown redemption code {}",
                        code_fingerprint(&req.code)
                    ),
                }))
            }
            Err(other) => Err(other),
        }
    }
}
