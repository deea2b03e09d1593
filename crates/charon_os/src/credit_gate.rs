#![forbid(unsafe_code)]

use charon_kernel_contracts::account::{CreditBalance, RedemptionCode};
use charon_kernel_contracts::usage::{
    ClientTag, ReservationId, ReservationRecord, UsageEventRecord,
};
use charon_kernel_contracts::waitlist::{ApplicantName, EmailAddress};
use charon_kernel_contracts::{ContractViolation, MonotonicTimeNs, ReasonCodeId, Validate};
use charon_storage::{LedgerError, LedgerStore};

pub mod reason_codes {
    use charon_kernel_contracts::ReasonCodeId;

    // Credit-gate reason-code namespace ("CG" prefix). Values are
    // placeholders until registry lock.
    pub const CREDIT_OK_RESERVE: ReasonCodeId = ReasonCodeId(0x4347_0001);
    pub const CREDIT_OK_COMMIT: ReasonCodeId = ReasonCodeId(0x4347_0002);
    pub const CREDIT_OK_ROLLBACK: ReasonCodeId = ReasonCodeId(0x4347_0003);
    pub const CREDIT_OK_CHECK: ReasonCodeId = ReasonCodeId(0x4347_0004);
    pub const CREDIT_OK_VERIFY: ReasonCodeId = ReasonCodeId(0x4347_0005);

    pub const CREDIT_REFUSE_UNKNOWN_CODE: ReasonCodeId = ReasonCodeId(0x4347_0101);
    pub const CREDIT_REFUSE_ACCOUNT_REVOKED: ReasonCodeId = ReasonCodeId(0x4347_0102);
    pub const CREDIT_REFUSE_INSUFFICIENT_CREDITS: ReasonCodeId = ReasonCodeId(0x4347_0103);
    pub const CREDIT_REFUSE_RESERVATION_CLOSED: ReasonCodeId = ReasonCodeId(0x4347_0104);
    pub const CREDIT_REFUSE_UNKNOWN_RESERVATION: ReasonCodeId = ReasonCodeId(0x4347_0105);
    pub const CREDIT_REFUSE_VERIFY_FAILED: ReasonCodeId = ReasonCodeId(0x4347_0106);
}

/// Short stable fingerprint for a redemption code, safe for logs and
/// report output where the raw code must not appear.
pub fn code_fingerprint(code: &RedemptionCode) -> String {
    short_hash_hex(&[code.as_str()])
}

fn short_hash_hex(parts: &[&str]) -> String {
    // FNV-1a 64-bit; deterministic and bounded for fingerprint derivation.
    const OFFSET: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;
    let mut h = OFFSET;
    for part in parts {
        for &b in part.as_bytes() {
            h ^= b as u64;
            h = h.wrapping_mul(PRIME);
        }
        h ^= b'|' as u64;
        h = h.wrapping_mul(PRIME);
    }
    format!("{h:016x}")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreditGateRequest {
    Reserve {
        code: RedemptionCode,
        amount: u32,
        now: MonotonicTimeNs,
    },
    Commit {
        reservation_id: ReservationId,
        prompt_chars: u32,
        response_chars: u32,
        client_tag: Option<ClientTag>,
        now: MonotonicTimeNs,
    },
    Rollback {
        reservation_id: ReservationId,
        now: MonotonicTimeNs,
    },
    Check {
        code: RedemptionCode,
    },
    Verify {
        email: EmailAddress,
        code: RedemptionCode,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreditGateOk {
    pub reason_code: ReasonCodeId,
    pub balance: Option<CreditBalance>,
    pub reservation: Option<ReservationRecord>,
    pub usage_event: Option<UsageEventRecord>,
    pub holder_name: Option<ApplicantName>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreditGateRefuse {
    pub reason_code: ReasonCodeId,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CreditGateResponse {
    Ok(CreditGateOk),
    Refuse(CreditGateRefuse),
}

/// Two-phase credit gate over the ledger store. Reserve deducts inside
/// one store call; commit and rollback finalize a pending reservation
/// and are fail-closed on a closed one. Check and verify are read-only.
#[derive(Debug, Default, Clone)]
pub struct CreditGateRuntime;

impl CreditGateRuntime {
    pub fn run(
        &self,
        store: &mut LedgerStore,
        req: &CreditGateRequest,
    ) -> Result<CreditGateResponse, LedgerError> {
        req.validate()?;
        match req {
            CreditGateRequest::Reserve { code, amount, now } => {
                match store.reserve_credit(*now, code, *amount) {
                    Ok((reservation, balance)) => Ok(ok_response(CreditGateOk {
                        reason_code: reason_codes::CREDIT_OK_RESERVE,
                        balance: Some(balance),
                        reservation: Some(reservation),
                        usage_event: None,
                        holder_name: None,
                    })),
                    Err(err) => map_gate_error(err),
                }
            }
            CreditGateRequest::Commit {
                reservation_id,
                prompt_chars,
                response_chars,
                client_tag,
                now,
            } => {
                match store.commit_reservation(
                    *now,
                    *reservation_id,
                    *prompt_chars,
                    *response_chars,
                    client_tag.clone(),
                ) {
                    Ok(event) => {
                        let balance = store.credit_balance(&event.code)?;
                        Ok(ok_response(CreditGateOk {
                            reason_code: reason_codes::CREDIT_OK_COMMIT,
                            balance: Some(balance),
                            reservation: store.reservation(reservation_id).cloned(),
                            usage_event: Some(event),
                            holder_name: None,
                        }))
                    }
                    Err(err) => map_gate_error(err),
                }
            }
            CreditGateRequest::Rollback {
                reservation_id,
                now,
            } => match store.rollback_reservation(*now, *reservation_id) {
                Ok(balance) => Ok(ok_response(CreditGateOk {
                    reason_code: reason_codes::CREDIT_OK_ROLLBACK,
                    balance: Some(balance),
                    reservation: store.reservation(reservation_id).cloned(),
                    usage_event: None,
                    holder_name: None,
                })),
                Err(err) => map_gate_error(err),
            },
            CreditGateRequest::Check { code } => match store.credit_balance(code) {
                Ok(balance) => Ok(ok_response(CreditGateOk {
                    reason_code: reason_codes::CREDIT_OK_CHECK,
                    balance: Some(balance),
                    reservation: None,
                    usage_event: None,
                    holder_name: None,
                })),
                Err(err) => map_gate_error(err),
            },
            CreditGateRequest::Verify { email, code } => self.run_verify(store, email, code),
        }
    }

    fn run_verify(
        &self,
        store: &mut LedgerStore,
        email: &EmailAddress,
        code: &RedemptionCode,
    ) -> Result<CreditGateResponse, LedgerError> {
        // Unknown code and wrong pairing collapse into one refusal so the
        // endpoint cannot be used to probe which codes exist.
        let Some(account) = store.account_by_code(code) else {
            return Ok(verify_refuse(code));
        };
        if &account.email != email {
            return Ok(verify_refuse(code));
        }
        let holder_name = account.holder_name.clone();
        let balance = store.credit_balance(code)?;
        Ok(ok_response(CreditGateOk {
            reason_code: reason_codes::CREDIT_OK_VERIFY,
            balance: Some(balance),
            reservation: None,
            usage_event: None,
            holder_name: Some(holder_name),
        }))
    }
}

fn ok_response(ok: CreditGateOk) -> CreditGateResponse {
    CreditGateResponse::Ok(ok)
}

fn verify_refuse(code: &RedemptionCode) -> CreditGateResponse {
    CreditGateResponse::Refuse(CreditGateRefuse {
        reason_code: reason_codes::CREDIT_REFUSE_VERIFY_FAILED,
        detail: format!("no matching account for code {}", code_fingerprint(code)),
    })
}

fn map_gate_error(err: LedgerError) -> Result<CreditGateResponse, LedgerError> {
    let refuse = |reason_code: ReasonCodeId, detail: String| {
        Ok(CreditGateResponse::Refuse(CreditGateRefuse {
            reason_code,
            detail,
        }))
    };
    match err {
        LedgerError::NotFound {
            table: "accounts.code",
            key,
        } => refuse(
            reason_codes::CREDIT_REFUSE_UNKNOWN_CODE,
            format!(
                "unknown redemption code {}",
                short_hash_hex(&[key.as_str()])
            ),
        ),
        LedgerError::NotFound {
            table: "reservations.reservation_id",
            key,
        } => refuse(
            reason_codes::CREDIT_REFUSE_UNKNOWN_RESERVATION,
            format!("unknown reservation {key}"),
        ),
        LedgerError::AccountRevoked { code } => refuse(
            reason_codes::CREDIT_REFUSE_ACCOUNT_REVOKED,
            format!("account revoked {}", short_hash_hex(&[code.as_str()])),
        ),
        LedgerError::InsufficientCredits {
            remaining,
            requested,
            ..
        } => refuse(
            reason_codes::CREDIT_REFUSE_INSUFFICIENT_CREDITS,
            format!("remaining {remaining} below requested {requested}"),
        ),
        LedgerError::AlreadyProcessed {
            table: "reservations.reservation_id",
            key,
        } => refuse(
            reason_codes::CREDIT_REFUSE_RESERVATION_CLOSED,
            format!("reservation {key} already finalized"),
        ),
        other => Err(other),
    }
}

impl Validate for CreditGateRequest {
    fn validate(&self) -> Result<(), ContractViolation> {
        match self {
            CreditGateRequest::Reserve { code, amount, now } => {
                code.validate()?;
                if *amount == 0 {
                    return Err(ContractViolation::InvalidValue {
                        field: "credit_gate_request.reserve.amount",
                        reason: "must be > 0",
                    });
                }
                validate_now("credit_gate_request.reserve.now", *now)
            }
            CreditGateRequest::Commit {
                reservation_id,
                client_tag,
                now,
                ..
            } => {
                if reservation_id.0 == 0 {
                    return Err(ContractViolation::InvalidValue {
                        field: "credit_gate_request.commit.reservation_id",
                        reason: "must be > 0",
                    });
                }
                if let Some(tag) = client_tag {
                    tag.validate()?;
                }
                validate_now("credit_gate_request.commit.now", *now)
            }
            CreditGateRequest::Rollback {
                reservation_id,
                now,
            } => {
                if reservation_id.0 == 0 {
                    return Err(ContractViolation::InvalidValue {
                        field: "credit_gate_request.rollback.reservation_id",
                        reason: "must be > 0",
                    });
                }
                validate_now("credit_gate_request.rollback.now", *now)
            }
            CreditGateRequest::Check { code } => code.validate(),
            CreditGateRequest::Verify { email, code } => {
                email.validate()?;
                code.validate()
            }
        }
    }
}

fn validate_now(field: &'static str, now: MonotonicTimeNs) -> Result<(), ContractViolation> {
    if now.0 == 0 {
        return Err(ContractViolation::InvalidValue {
            field,
            reason: "must be > 0",
        });
    }
    Ok(())
}
