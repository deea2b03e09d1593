#![forbid(unsafe_code)]

use charon_engines::code_mint::{mint_code_os, CodeMintConfig};
use charon_kernel_contracts::account::{AccountInput, AccountRecord, RedemptionCode};
use charon_kernel_contracts::waitlist::{
    ApplicantInput, ApplicantName, ApplicantReason, ApplicantRecord, EmailAddress,
};
use charon_kernel_contracts::{ContractViolation, MonotonicTimeNs, ReasonCodeId, Validate};
use charon_storage::{LedgerError, LedgerStore};

pub mod reason_codes {
    use charon_kernel_contracts::ReasonCodeId;

    // Approval workflow reason-code namespace ("AP" prefix). Values are
    // placeholders until registry lock.
    pub const APPROVAL_OK_REGISTER: ReasonCodeId = ReasonCodeId(0x4150_0001);
    pub const APPROVAL_OK_APPROVE: ReasonCodeId = ReasonCodeId(0x4150_0002);
    pub const APPROVAL_OK_REJECT: ReasonCodeId = ReasonCodeId(0x4150_0003);
    pub const APPROVAL_OK_ISSUE: ReasonCodeId = ReasonCodeId(0x4150_0004);

    pub const APPROVAL_REFUSE_DUPLICATE_EMAIL: ReasonCodeId = ReasonCodeId(0x4150_0101);
    pub const APPROVAL_REFUSE_UNKNOWN_APPLICANT: ReasonCodeId = ReasonCodeId(0x4150_0102);
    pub const APPROVAL_REFUSE_ALREADY_DECIDED: ReasonCodeId = ReasonCodeId(0x4150_0103);
    pub const APPROVAL_REFUSE_CODE_SPACE_EXHAUSTED: ReasonCodeId = ReasonCodeId(0x4150_0104);
}

/// Mints candidate redemption codes for the approval runtime. The store
/// insert is the uniqueness authority; the runtime re-mints on collision.
pub trait CodeMinter {
    fn mint(&self) -> Result<RedemptionCode, ContractViolation>;
}

/// Production minter over the platform CSPRNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsCodeMinter;

impl CodeMinter for OsCodeMinter {
    fn mint(&self) -> Result<RedemptionCode, ContractViolation> {
        mint_code_os()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApprovalConfig {
    /// Credits granted by `approve` when the request names no amount.
    pub default_grant: u32,
    pub mint: CodeMintConfig,
}

impl ApprovalConfig {
    pub fn mvp_v1() -> Self {
        Self {
            default_grant: 100,
            mint: CodeMintConfig::mvp_v1(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalRequest {
    Register {
        name: ApplicantName,
        email: EmailAddress,
        reason: ApplicantReason,
        now: MonotonicTimeNs,
    },
    Approve {
        email: EmailAddress,
        granted: Option<u32>,
        admin_note: Option<String>,
        now: MonotonicTimeNs,
    },
    Reject {
        email: EmailAddress,
        admin_note: Option<String>,
        now: MonotonicTimeNs,
    },
    Issue {
        name: ApplicantName,
        email: EmailAddress,
        granted: u32,
        now: MonotonicTimeNs,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApprovalOk {
    pub reason_code: ReasonCodeId,
    pub applicant: Option<ApplicantRecord>,
    pub account: Option<AccountRecord>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApprovalRefuse {
    pub reason_code: ReasonCodeId,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ApprovalResponse {
    Ok(ApprovalOk),
    Refuse(ApprovalRefuse),
}

/// Waiting-list workflow: registration, admin approve/reject decisions,
/// and direct administrative issuance. Every mutation is one atomic
/// store call; a code collision restarts the whole call with a fresh
/// code.
#[derive(Debug, Clone)]
pub struct ApprovalRuntime<M: CodeMinter = OsCodeMinter> {
    config: ApprovalConfig,
    minter: M,
}

impl ApprovalRuntime<OsCodeMinter> {
    pub fn mvp_v1(config: ApprovalConfig) -> Self {
        Self {
            config,
            minter: OsCodeMinter,
        }
    }
}

impl<M: CodeMinter> ApprovalRuntime<M> {
    pub fn with_minter(config: ApprovalConfig, minter: M) -> Self {
        Self { config, minter }
    }

    pub fn run(
        &self,
        store: &mut LedgerStore,
        req: &ApprovalRequest,
    ) -> Result<ApprovalResponse, LedgerError> {
        req.validate()?;
        match req {
            ApprovalRequest::Register {
                name,
                email,
                reason,
                now,
            } => self.run_register(store, name, email, reason, *now),
            ApprovalRequest::Approve {
                email,
                granted,
                admin_note,
                now,
            } => self.run_approve(store, email, *granted, admin_note.clone(), *now),
            ApprovalRequest::Reject {
                email,
                admin_note,
                now,
            } => self.run_reject(store, email, admin_note.clone(), *now),
            ApprovalRequest::Issue {
                name,
                email,
                granted,
                now,
            } => self.run_issue(store, name, email, *granted, *now),
        }
    }

    fn run_register(
        &self,
        store: &mut LedgerStore,
        name: &ApplicantName,
        email: &EmailAddress,
        reason: &ApplicantReason,
        now: MonotonicTimeNs,
    ) -> Result<ApprovalResponse, LedgerError> {
        let input = ApplicantInput::v1(name.clone(), email.clone(), reason.clone(), now)?;
        match store.insert_applicant(input) {
            Ok(()) => {}
            Err(LedgerError::DuplicateKey { .. }) => {
                return Ok(refuse(
                    reason_codes::APPROVAL_REFUSE_DUPLICATE_EMAIL,
                    "email already known to the waiting list or an account",
                ));
            }
            Err(other) => return Err(other),
        }
        let applicant = store
            .applicant(email)
            .cloned()
            .ok_or(LedgerError::NotFound {
                table: "waitlist.email",
                key: email.as_str().to_string(),
            })?;
        Ok(ApprovalResponse::Ok(ApprovalOk {
            reason_code: reason_codes::APPROVAL_OK_REGISTER,
            applicant: Some(applicant),
            account: None,
        }))
    }

    fn run_approve(
        &self,
        store: &mut LedgerStore,
        email: &EmailAddress,
        granted: Option<u32>,
        admin_note: Option<String>,
        now: MonotonicTimeNs,
    ) -> Result<ApprovalResponse, LedgerError> {
        let granted = granted.unwrap_or(self.config.default_grant);
        let mut attempts: u8 = 0;
        loop {
            let code = self.minter.mint()?;
            match store.approval_commit(now, email, code, granted, admin_note.clone()) {
                Ok(account) => {
                    let applicant = store.applicant(email).cloned();
                    return Ok(ApprovalResponse::Ok(ApprovalOk {
                        reason_code: reason_codes::APPROVAL_OK_APPROVE,
                        applicant,
                        account: Some(account),
                    }));
                }
                Err(LedgerError::DuplicateKey {
                    table: "accounts.code",
                    ..
                }) => {
                    attempts = attempts.saturating_add(1);
                    if attempts >= self.config.mint.max_collision_retries {
                        return Ok(refuse(
                            reason_codes::APPROVAL_REFUSE_CODE_SPACE_EXHAUSTED,
                            "could not mint a unique redemption code",
                        ));
                    }
                }
                Err(other) => return map_decision_error(other),
            }
        }
    }

    fn run_reject(
        &self,
        store: &mut LedgerStore,
        email: &EmailAddress,
        admin_note: Option<String>,
        now: MonotonicTimeNs,
    ) -> Result<ApprovalResponse, LedgerError> {
        match store.reject_commit(now, email, admin_note) {
            Ok(()) => {
                let applicant = store.applicant(email).cloned();
                Ok(ApprovalResponse::Ok(ApprovalOk {
                    reason_code: reason_codes::APPROVAL_OK_REJECT,
                    applicant,
                    account: None,
                }))
            }
            Err(other) => map_decision_error(other),
        }
    }

    fn run_issue(
        &self,
        store: &mut LedgerStore,
        name: &ApplicantName,
        email: &EmailAddress,
        granted: u32,
        now: MonotonicTimeNs,
    ) -> Result<ApprovalResponse, LedgerError> {
        let mut attempts: u8 = 0;
        loop {
            let code = self.minter.mint()?;
            let input = AccountInput::v1(code, email.clone(), name.clone(), granted, now)?;
            match store.issue_account(input) {
                Ok(account) => {
                    return Ok(ApprovalResponse::Ok(ApprovalOk {
                        reason_code: reason_codes::APPROVAL_OK_ISSUE,
                        applicant: None,
                        account: Some(account),
                    }));
                }
                Err(LedgerError::DuplicateKey {
                    table: "accounts.code",
                    ..
                }) => {
                    attempts = attempts.saturating_add(1);
                    if attempts >= self.config.mint.max_collision_retries {
                        return Ok(refuse(
                            reason_codes::APPROVAL_REFUSE_CODE_SPACE_EXHAUSTED,
                            "could not mint a unique redemption code",
                        ));
                    }
                }
                Err(LedgerError::DuplicateKey { .. }) => {
                    return Ok(refuse(
                        reason_codes::APPROVAL_REFUSE_DUPLICATE_EMAIL,
                        "email already known to the waiting list or an account",
                    ));
                }
                Err(other) => return Err(other),
            }
        }
    }
}

fn refuse(reason_code: ReasonCodeId, detail: &str) -> ApprovalResponse {
    ApprovalResponse::Refuse(ApprovalRefuse {
        reason_code,
        detail: detail.to_string(),
    })
}

fn map_decision_error(err: LedgerError) -> Result<ApprovalResponse, LedgerError> {
    match err {
        LedgerError::NotFound { .. } => Ok(refuse(
            reason_codes::APPROVAL_REFUSE_UNKNOWN_APPLICANT,
            "no waiting-list entry for that email",
        )),
        LedgerError::AlreadyProcessed { .. } => Ok(refuse(
            reason_codes::APPROVAL_REFUSE_ALREADY_DECIDED,
            "applicant already decided",
        )),
        LedgerError::DuplicateKey { .. } => Ok(refuse(
            reason_codes::APPROVAL_REFUSE_DUPLICATE_EMAIL,
            "email already holds an account",
        )),
        other => Err(other),
    }
}

impl Validate for ApprovalRequest {
    fn validate(&self) -> Result<(), ContractViolation> {
        match self {
            ApprovalRequest::Register {
                name,
                email,
                reason,
                now,
            } => {
                name.validate()?;
                email.validate()?;
                reason.validate()?;
                validate_now("approval_request.register.now", *now)
            }
            ApprovalRequest::Approve {
                email,
                granted,
                now,
                ..
            } => {
                email.validate()?;
                if let Some(granted) = granted {
                    if *granted == 0 {
                        return Err(ContractViolation::InvalidValue {
                            field: "approval_request.approve.granted",
                            reason: "must be > 0 when present",
                        });
                    }
                }
                validate_now("approval_request.approve.now", *now)
            }
            ApprovalRequest::Reject { email, now, .. } => {
                email.validate()?;
                validate_now("approval_request.reject.now", *now)
            }
            ApprovalRequest::Issue {
                name,
                email,
                granted,
                now,
            } => {
                name.validate()?;
                email.validate()?;
                if *granted == 0 {
                    return Err(ContractViolation::InvalidValue {
                        field: "approval_request.issue.granted",
                        reason: "must be > 0",
                    });
                }
                validate_now("approval_request.issue.now", *now)
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
