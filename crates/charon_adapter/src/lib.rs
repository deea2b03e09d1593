#![forbid(unsafe_code)]

use std::env;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use charon_engines::collab::{CollabClient, CollabConfig};
use charon_engines::provider_vault::resolve_collaborator_key;
use charon_kernel_contracts::account::RedemptionCode;
use charon_kernel_contracts::collab::{EnhanceDirective, PromptText};
use charon_kernel_contracts::style::PromptStyle;
use charon_kernel_contracts::usage::ClientTag;
use charon_kernel_contracts::waitlist::{ApplicantName, ApplicantReason, EmailAddress};
use charon_kernel_contracts::{ContractViolation, MonotonicTimeNs, ReasonCodeId};
use charon_os::approval::{ApprovalConfig, ApprovalRequest, ApprovalResponse, ApprovalRuntime};
use charon_os::credit_gate::{CreditGateRequest, CreditGateResponse, CreditGateRuntime};
use charon_os::revocation::{RevocationRequest, RevocationResponse, RevocationRuntime};
use charon_storage::LedgerStore;

pub const DEFAULT_RESERVATION_TTL_MS: u64 = 120_000;

// ------------------------
// Wire DTOs.
// ------------------------

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RegisterAdapterRequest {
    pub name: String,
    pub email: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RegisterAdapterResponse {
    pub status: String,
    pub outcome: String,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ApproveAdapterRequest {
    pub email: String,
    pub credits: Option<u32>,
    pub admin_note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ApproveAdapterResponse {
    pub status: String,
    pub outcome: String,
    pub reason: Option<String>,
    pub code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RejectAdapterRequest {
    pub email: String,
    pub admin_note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RejectAdapterResponse {
    pub status: String,
    pub outcome: String,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct IssueAdapterRequest {
    pub name: String,
    pub email: String,
    pub credits: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct VerifyAdapterRequest {
    pub email: String,
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct VerifyAdapterResponse {
    pub status: String,
    pub outcome: String,
    pub reason: Option<String>,
    pub name: Option<String>,
    pub remaining_credits: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CheckCreditsAdapterRequest {
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CheckCreditsAdapterResponse {
    pub status: String,
    pub outcome: String,
    pub reason: Option<String>,
    pub granted: Option<u32>,
    pub consumed: Option<u32>,
    pub remaining: Option<u32>,
    pub account_status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize, Default)]
pub struct PromptStyleOptions {
    pub target_role: Option<String>,
    pub description: Option<String>,
    pub length: Option<String>,
    pub format: Option<String>,
    pub tone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct EnhanceAdapterRequest {
    pub code: String,
    pub prompt: String,
    pub style: Option<PromptStyleOptions>,
    pub client_tag: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct EnhanceAdapterResponse {
    pub status: String,
    pub outcome: String,
    pub reason: Option<String>,
    pub enhanced_text: Option<String>,
    pub remaining_credits: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RevokeAdapterRequest {
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RevokeAdapterResponse {
    pub status: String,
    pub outcome: String,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize, Default)]
pub struct AdapterReaperCounters {
    pub pass_count: u64,
    pub reaped_total: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize, Default)]
pub struct AdapterLedgerCounters {
    pub applicants_total: u64,
    pub applicants_pending: u64,
    pub accounts_active: u64,
    pub accounts_revoked: u64,
    pub usage_events_total: u64,
    pub reservations_pending: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AdapterHealthResponse {
    pub status: String,
    pub outcome: String,
    pub reason: Option<String>,
    pub ledger: AdapterLedgerCounters,
    pub reaper: AdapterReaperCounters,
}

impl AdapterHealthResponse {
    pub fn unhealthy(reason: String) -> Self {
        Self {
            status: "error".to_string(),
            outcome: "UNHEALTHY".to_string(),
            reason: Some(reason),
            ledger: AdapterLedgerCounters::default(),
            reaper: AdapterReaperCounters::default(),
        }
    }
}

// ------------------------
// Runtime.
// ------------------------

/// HTTP-facing orchestration over the ledger store. The store lock is
/// held only for individual store calls; the collaborator call in
/// `run_enhance` happens strictly between the reserve and the
/// commit/rollback, outside the lock.
#[derive(Debug, Clone)]
pub struct AdapterRuntime {
    store: Arc<Mutex<LedgerStore>>,
    approval: ApprovalRuntime,
    credit_gate: CreditGateRuntime,
    revocation: RevocationRuntime,
    collab: CollabClient,
    collaborator_key: Option<String>,
    reaper_counters: Arc<Mutex<AdapterReaperCounters>>,
    reservation_ttl_ns: u64,
}

impl AdapterRuntime {
    pub fn new(
        store: Arc<Mutex<LedgerStore>>,
        approval_config: ApprovalConfig,
        collab_config: CollabConfig,
        collaborator_key: Option<String>,
        reservation_ttl_ms: u64,
    ) -> Self {
        Self {
            store,
            approval: ApprovalRuntime::mvp_v1(approval_config),
            credit_gate: CreditGateRuntime,
            revocation: RevocationRuntime,
            collab: CollabClient::new(collab_config),
            collaborator_key,
            reaper_counters: Arc::new(Mutex::new(AdapterReaperCounters::default())),
            reservation_ttl_ns: reservation_ttl_ms.saturating_mul(1_000_000),
        }
    }

    pub fn default_from_env() -> Result<Self, String> {
        let mut approval_config = ApprovalConfig::mvp_v1();
        if let Some(default_grant) = env::var("CHARON_DEFAULT_GRANT")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .filter(|v| *v > 0)
        {
            approval_config.default_grant = default_grant;
        }
        let collaborator_key = resolve_collaborator_key()
            .map_err(|err| format!("collaborator key resolution failed: {err}"))?;
        Ok(Self::new(
            Arc::new(Mutex::new(LedgerStore::new_in_memory())),
            approval_config,
            CollabConfig::from_env(),
            collaborator_key,
            parse_reservation_ttl_ms_from_env(),
        ))
    }

    pub fn run_register(
        &self,
        request: RegisterAdapterRequest,
    ) -> Result<RegisterAdapterResponse, String> {
        let req = ApprovalRequest::Register {
            name: ApplicantName::new(request.name).map_err(invalid_request)?,
            email: EmailAddress::new(request.email).map_err(invalid_request)?,
            reason: ApplicantReason::new(request.reason).map_err(invalid_request)?,
            now: now_monotonic(),
        };
        let mut store = self.lock_store()?;
        match self.approval.run(&mut store, &req).map_err(ledger_error)? {
            ApprovalResponse::Ok(_) => Ok(RegisterAdapterResponse {
                status: "ok".to_string(),
                outcome: "REGISTERED".to_string(),
                reason: None,
            }),
            ApprovalResponse::Refuse(refused) => Ok(RegisterAdapterResponse {
                status: "ok".to_string(),
                outcome: "REFUSED".to_string(),
                reason: Some(refusal_reason(refused.reason_code, &refused.detail)),
            }),
        }
    }

    pub fn run_approve(
        &self,
        request: ApproveAdapterRequest,
    ) -> Result<ApproveAdapterResponse, String> {
        let req = ApprovalRequest::Approve {
            email: EmailAddress::new(request.email).map_err(invalid_request)?,
            granted: request.credits,
            admin_note: request.admin_note,
            now: now_monotonic(),
        };
        let mut store = self.lock_store()?;
        match self.approval.run(&mut store, &req).map_err(ledger_error)? {
            ApprovalResponse::Ok(ok) => Ok(ApproveAdapterResponse {
                status: "ok".to_string(),
                outcome: "APPROVED".to_string(),
                reason: None,
                code: ok.account.map(|a| a.code.as_str().to_string()),
            }),
            ApprovalResponse::Refuse(refused) => Ok(ApproveAdapterResponse {
                status: "ok".to_string(),
                outcome: "REFUSED".to_string(),
                reason: Some(refusal_reason(refused.reason_code, &refused.detail)),
                code: None,
            }),
        }
    }

    pub fn run_reject(
        &self,
        request: RejectAdapterRequest,
    ) -> Result<RejectAdapterResponse, String> {
        let req = ApprovalRequest::Reject {
            email: EmailAddress::new(request.email).map_err(invalid_request)?,
            admin_note: request.admin_note,
            now: now_monotonic(),
        };
        let mut store = self.lock_store()?;
        match self.approval.run(&mut store, &req).map_err(ledger_error)? {
            ApprovalResponse::Ok(_) => Ok(RejectAdapterResponse {
                status: "ok".to_string(),
                outcome: "REJECTED".to_string(),
                reason: None,
            }),
            ApprovalResponse::Refuse(refused) => Ok(RejectAdapterResponse {
                status: "ok".to_string(),
                outcome: "REFUSED".to_string(),
                reason: Some(refusal_reason(refused.reason_code, &refused.detail)),
            }),
        }
    }

    pub fn run_issue(&self, request: IssueAdapterRequest) -> Result<ApproveAdapterResponse, String> {
        let req = ApprovalRequest::Issue {
            name: ApplicantName::new(request.name).map_err(invalid_request)?,
            email: EmailAddress::new(request.email).map_err(invalid_request)?,
            granted: request.credits,
            now: now_monotonic(),
        };
        let mut store = self.lock_store()?;
        match self.approval.run(&mut store, &req).map_err(ledger_error)? {
            ApprovalResponse::Ok(ok) => Ok(ApproveAdapterResponse {
                status: "ok".to_string(),
                outcome: "ISSUED".to_string(),
                reason: None,
                code: ok.account.map(|a| a.code.as_str().to_string()),
            }),
            ApprovalResponse::Refuse(refused) => Ok(ApproveAdapterResponse {
                status: "ok".to_string(),
                outcome: "REFUSED".to_string(),
                reason: Some(refusal_reason(refused.reason_code, &refused.detail)),
                code: None,
            }),
        }
    }

    pub fn run_verify(&self, request: VerifyAdapterRequest) -> Result<VerifyAdapterResponse, String> {
        let req = CreditGateRequest::Verify {
            email: EmailAddress::new(request.email).map_err(invalid_request)?,
            code: RedemptionCode::new(request.code).map_err(invalid_request)?,
        };
        let mut store = self.lock_store()?;
        match self
            .credit_gate
            .run(&mut store, &req)
            .map_err(ledger_error)?
        {
            CreditGateResponse::Ok(ok) => Ok(VerifyAdapterResponse {
                status: "ok".to_string(),
                outcome: "VERIFIED".to_string(),
                reason: None,
                name: ok.holder_name.map(|n| n.as_str().to_string()),
                remaining_credits: ok.balance.map(|b| b.remaining),
            }),
            CreditGateResponse::Refuse(refused) => Ok(VerifyAdapterResponse {
                status: "ok".to_string(),
                outcome: "REFUSED".to_string(),
                reason: Some(refusal_reason(refused.reason_code, &refused.detail)),
                name: None,
                remaining_credits: None,
            }),
        }
    }

    pub fn run_check_credits(
        &self,
        request: CheckCreditsAdapterRequest,
    ) -> Result<CheckCreditsAdapterResponse, String> {
        let req = CreditGateRequest::Check {
            code: RedemptionCode::new(request.code).map_err(invalid_request)?,
        };
        let mut store = self.lock_store()?;
        match self
            .credit_gate
            .run(&mut store, &req)
            .map_err(ledger_error)?
        {
            CreditGateResponse::Ok(ok) => {
                let balance = ok
                    .balance
                    .ok_or_else(|| "check returned no balance".to_string())?;
                Ok(CheckCreditsAdapterResponse {
                    status: "ok".to_string(),
                    outcome: "CHECKED".to_string(),
                    reason: None,
                    granted: Some(balance.granted),
                    consumed: Some(balance.consumed),
                    remaining: Some(balance.remaining),
                    account_status: Some(balance.status.as_str().to_string()),
                })
            }
            CreditGateResponse::Refuse(refused) => Ok(CheckCreditsAdapterResponse {
                status: "ok".to_string(),
                outcome: "REFUSED".to_string(),
                reason: Some(refusal_reason(refused.reason_code, &refused.detail)),
                granted: None,
                consumed: None,
                remaining: None,
                account_status: None,
            }),
        }
    }

    /// Reserve inside the lock, call the collaborator outside it, then
    /// commit on success or roll back on any provider failure.
    pub fn run_enhance(
        &self,
        request: EnhanceAdapterRequest,
    ) -> Result<EnhanceAdapterResponse, String> {
        let code = RedemptionCode::new(request.code).map_err(invalid_request)?;
        let prompt = PromptText::new(request.prompt).map_err(invalid_request)?;
        let style = match &request.style {
            Some(options) => PromptStyle::from_options(
                options.target_role.as_deref(),
                options.description.as_deref(),
                options.length.as_deref(),
                options.format.as_deref(),
                options.tone.as_deref(),
            )
            .map_err(invalid_request)?,
            None => PromptStyle::default_v1(),
        };
        let client_tag = request
            .client_tag
            .map(ClientTag::new)
            .transpose()
            .map_err(invalid_request)?;
        let directive = EnhanceDirective::v1(prompt, style).map_err(invalid_request)?;
        let api_key = self
            .collaborator_key
            .clone()
            .ok_or_else(|| "collaborator api key not configured".to_string())?;

        let reserved = {
            let mut store = self.lock_store()?;
            self.credit_gate
                .run(
                    &mut store,
                    &CreditGateRequest::Reserve {
                        code: code.clone(),
                        amount: 1,
                        now: now_monotonic(),
                    },
                )
                .map_err(ledger_error)?
        };
        let reservation_id = match reserved {
            CreditGateResponse::Ok(ok) => {
                ok.reservation
                    .ok_or_else(|| "reserve returned no reservation".to_string())?
                    .reservation_id
            }
            CreditGateResponse::Refuse(refused) => {
                return Ok(EnhanceAdapterResponse {
                    status: "ok".to_string(),
                    outcome: "REFUSED".to_string(),
                    reason: Some(refusal_reason(refused.reason_code, &refused.detail)),
                    enhanced_text: None,
                    remaining_credits: None,
                });
            }
        };

        let collaborator_outcome = self.collab.enhance(&api_key, &directive);

        let mut store = self.lock_store()?;
        match collaborator_outcome {
            Ok(enhanced) => {
                let committed = self
                    .credit_gate
                    .run(
                        &mut store,
                        &CreditGateRequest::Commit {
                            reservation_id,
                            prompt_chars: directive.prompt.char_count(),
                            response_chars: enhanced.response_chars(),
                            client_tag,
                            now: now_monotonic(),
                        },
                    )
                    .map_err(ledger_error)?;
                match committed {
                    CreditGateResponse::Ok(ok) => Ok(EnhanceAdapterResponse {
                        status: "ok".to_string(),
                        outcome: "ENHANCED".to_string(),
                        reason: None,
                        enhanced_text: Some(enhanced.enhanced_text),
                        remaining_credits: ok.balance.map(|b| b.remaining),
                    }),
                    CreditGateResponse::Refuse(refused) => Err(format!(
                        "commit refused after collaborator success: {}",
                        refused.detail
                    )),
                }
            }
            Err(provider_err) => {
                let rolled_back = self
                    .credit_gate
                    .run(
                        &mut store,
                        &CreditGateRequest::Rollback {
                            reservation_id,
                            now: now_monotonic(),
                        },
                    )
                    .map_err(ledger_error)?;
                let remaining = match rolled_back {
                    CreditGateResponse::Ok(ok) => ok.balance.map(|b| b.remaining),
                    CreditGateResponse::Refuse(refused) => {
                        return Err(format!(
                            "rollback refused after provider failure: {}",
                            refused.detail
                        ));
                    }
                };
                Ok(EnhanceAdapterResponse {
                    status: "ok".to_string(),
                    outcome: "PROVIDER_FAILED".to_string(),
                    reason: Some(provider_err.safe_detail()),
                    enhanced_text: None,
                    remaining_credits: remaining,
                })
            }
        }
    }

    pub fn run_revoke(&self, request: RevokeAdapterRequest) -> Result<RevokeAdapterResponse, String> {
        let req = RevocationRequest {
            code: RedemptionCode::new(request.code).map_err(invalid_request)?,
        };
        let mut store = self.lock_store()?;
        match self
            .revocation
            .run(&mut store, &req)
            .map_err(ledger_error)?
        {
            RevocationResponse::Ok(_) => Ok(RevokeAdapterResponse {
                status: "ok".to_string(),
                outcome: "REVOKED".to_string(),
                reason: None,
            }),
            RevocationResponse::Refuse(refused) => Ok(RevokeAdapterResponse {
                status: "ok".to_string(),
                outcome: "REFUSED".to_string(),
                reason: Some(refusal_reason(refused.reason_code, &refused.detail)),
            }),
        }
    }

    /// One reaper pass: rolls back pending reservations older than the
    /// configured TTL and returns the reaped count.
    pub fn run_reservation_reaper_worker_pass(
        &self,
        now_ns: Option<u64>,
    ) -> Result<u32, String> {
        let now_ns = now_ns.unwrap_or_else(system_time_now_ns).max(1);
        let reaped = {
            let mut store = self.lock_store()?;
            store
                .rollback_expired_reservations(MonotonicTimeNs(now_ns), self.reservation_ttl_ns)
                .map_err(ledger_error)?
        };
        let mut counters = self
            .reaper_counters
            .lock()
            .map_err(|_| "adapter reaper counters lock poisoned".to_string())?;
        counters.pass_count = counters.pass_count.saturating_add(1);
        counters.reaped_total = counters.reaped_total.saturating_add(u64::from(reaped));
        Ok(reaped)
    }

    pub fn health_report(&self) -> Result<AdapterHealthResponse, String> {
        let snapshot = {
            let store = self.lock_store()?;
            store.report_counters()
        };
        let reaper = *self
            .reaper_counters
            .lock()
            .map_err(|_| "adapter reaper counters lock poisoned".to_string())?;
        Ok(AdapterHealthResponse {
            status: "ok".to_string(),
            outcome: "HEALTHY".to_string(),
            reason: None,
            ledger: AdapterLedgerCounters {
                applicants_total: snapshot.applicants_total,
                applicants_pending: snapshot.applicants_pending,
                accounts_active: snapshot.accounts_active,
                accounts_revoked: snapshot.accounts_revoked,
                usage_events_total: snapshot.usage_events_total,
                reservations_pending: snapshot.reservations_pending,
            },
            reaper,
        })
    }

    fn lock_store(&self) -> Result<std::sync::MutexGuard<'_, LedgerStore>, String> {
        self.store
            .lock()
            .map_err(|_| "adapter store lock poisoned".to_string())
    }
}

pub fn parse_reservation_ttl_ms_from_env() -> u64 {
    env::var("CHARON_RESERVATION_TTL_MS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|v| (1_000..=3_600_000).contains(v))
        .unwrap_or(DEFAULT_RESERVATION_TTL_MS)
}

fn now_monotonic() -> MonotonicTimeNs {
    MonotonicTimeNs(system_time_now_ns().max(1))
}

fn system_time_now_ns() -> u64 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(1);
    if nanos > u64::MAX as u128 {
        u64::MAX
    } else {
        nanos as u64
    }
}

fn invalid_request(violation: ContractViolation) -> String {
    format!("invalid request: {violation:?}")
}

fn ledger_error(err: charon_storage::LedgerError) -> String {
    format!("ledger error: {err:?}")
}

fn refusal_reason(reason_code: ReasonCodeId, detail: &str) -> String {
    format!("{:#010x} {detail}", reason_code.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use charon_os::credit_gate::reason_codes as credit_reason_codes;

    fn fixture_runtime(fixture_json: &str) -> AdapterRuntime {
        let mut collab_config = CollabConfig::mvp_v1();
        collab_config.fixture_json = Some(fixture_json.to_string());
        AdapterRuntime::new(
            Arc::new(Mutex::new(LedgerStore::new_in_memory())),
            ApprovalConfig::mvp_v1(),
            collab_config,
            Some("sk-test".to_string()),
            1_000,
        )
    }

    fn ok_fixture() -> &'static str {
        r#"{"choices":[{"message":{"role":"assistant","content":"An enhanced prompt."}}]}"#
    }

    fn register_and_approve(runtime: &AdapterRuntime, email: &str, credits: u32) -> String {
        let registered = runtime
            .run_register(RegisterAdapterRequest {
                name: "Jo".to_string(),
                email: email.to_string(),
                reason: "prompt testing".to_string(),
            })
            .unwrap();
        assert_eq!(registered.outcome, "REGISTERED");
        let approved = runtime
            .run_approve(ApproveAdapterRequest {
                email: email.to_string(),
                credits: Some(credits),
                admin_note: None,
            })
            .unwrap();
        assert_eq!(approved.outcome, "APPROVED");
        approved.code.unwrap()
    }

    #[test]
    fn at_adapter_01_register_approve_enhance_commits_one_event() {
        let runtime = fixture_runtime(ok_fixture());
        let code = register_and_approve(&runtime, "jo@example.com", 3);

        let enhanced = runtime
            .run_enhance(EnhanceAdapterRequest {
                code: code.clone(),
                prompt: "write a haiku about rivers".to_string(),
                style: None,
                client_tag: Some("ext-install-7".to_string()),
            })
            .unwrap();
        assert_eq!(enhanced.outcome, "ENHANCED");
        assert_eq!(enhanced.enhanced_text.as_deref(), Some("An enhanced prompt."));
        assert_eq!(enhanced.remaining_credits, Some(2));

        let checked = runtime
            .run_check_credits(CheckCreditsAdapterRequest { code })
            .unwrap();
        assert_eq!(checked.consumed, Some(1));
        let health = runtime.health_report().unwrap();
        assert_eq!(health.ledger.usage_events_total, 1);
        assert_eq!(health.ledger.reservations_pending, 0);
    }

    #[test]
    fn at_adapter_02_provider_failure_rolls_back_the_reservation() {
        // The fixture is not valid JSON, so the collaborator path fails
        // after the reserve.
        let runtime = fixture_runtime("not json at all");
        let code = register_and_approve(&runtime, "jo@example.com", 3);

        let out = runtime
            .run_enhance(EnhanceAdapterRequest {
                code: code.clone(),
                prompt: "write a haiku about rivers".to_string(),
                style: None,
                client_tag: None,
            })
            .unwrap();
        assert_eq!(out.outcome, "PROVIDER_FAILED");
        assert_eq!(out.remaining_credits, Some(3));

        let health = runtime.health_report().unwrap();
        assert_eq!(health.ledger.usage_events_total, 0);
        assert_eq!(health.ledger.reservations_pending, 0);
    }

    #[test]
    fn at_adapter_03_enhance_refusals_carry_gate_reason_codes() {
        let runtime = fixture_runtime(ok_fixture());
        let code = register_and_approve(&runtime, "jo@example.com", 1);
        runtime
            .run_revoke(RevokeAdapterRequest { code: code.clone() })
            .unwrap();

        let out = runtime
            .run_enhance(EnhanceAdapterRequest {
                code,
                prompt: "anything".to_string(),
                style: None,
                client_tag: None,
            })
            .unwrap();
        assert_eq!(out.outcome, "REFUSED");
        let expected = format!(
            "{:#010x}",
            credit_reason_codes::CREDIT_REFUSE_ACCOUNT_REVOKED.0
        );
        assert!(out.reason.unwrap().starts_with(&expected));
    }

    #[test]
    fn at_adapter_04_unknown_style_option_is_an_invalid_request() {
        let runtime = fixture_runtime(ok_fixture());
        let code = register_and_approve(&runtime, "jo@example.com", 1);

        let out = runtime.run_enhance(EnhanceAdapterRequest {
            code,
            prompt: "anything".to_string(),
            style: Some(PromptStyleOptions {
                description: Some("verbose".to_string()),
                ..PromptStyleOptions::default()
            }),
            client_tag: None,
        });
        assert!(out.is_err());
        // Nothing was reserved for the invalid request.
        let health = runtime.health_report().unwrap();
        assert_eq!(health.ledger.reservations_pending, 0);
    }

    #[test]
    fn at_adapter_05_reaper_pass_rolls_back_stale_reservations() {
        let runtime = fixture_runtime(ok_fixture());
        let code = register_and_approve(&runtime, "jo@example.com", 5);

        {
            let mut store = runtime.store.lock().unwrap();
            let parsed = RedemptionCode::new(code.clone()).unwrap();
            store
                .reserve_credit(now_monotonic(), &parsed, 1)
                .unwrap();
        }
        // TTL is 1s in the fixture runtime; a pass dated far in the
        // future reaps the pending reservation.
        let far_future = system_time_now_ns().saturating_add(10_000_000_000);
        let reaped = runtime
            .run_reservation_reaper_worker_pass(Some(far_future))
            .unwrap();
        assert_eq!(reaped, 1);

        let checked = runtime
            .run_check_credits(CheckCreditsAdapterRequest { code })
            .unwrap();
        assert_eq!(checked.remaining, Some(5));
        let health = runtime.health_report().unwrap();
        assert_eq!(health.reaper.pass_count, 1);
        assert_eq!(health.reaper.reaped_total, 1);
    }

    #[test]
    fn at_adapter_06_verify_and_report_reconcile() {
        let runtime = fixture_runtime(ok_fixture());
        let code = register_and_approve(&runtime, "jo@example.com", 2);
        runtime
            .run_register(RegisterAdapterRequest {
                name: "Ada".to_string(),
                email: "ada@example.com".to_string(),
                reason: "waiting".to_string(),
            })
            .unwrap();

        let verified = runtime
            .run_verify(VerifyAdapterRequest {
                email: "jo@example.com".to_string(),
                code: code.clone(),
            })
            .unwrap();
        assert_eq!(verified.outcome, "VERIFIED");
        assert_eq!(verified.name.as_deref(), Some("Jo"));
        assert_eq!(verified.remaining_credits, Some(2));

        let mismatched = runtime
            .run_verify(VerifyAdapterRequest {
                email: "ada@example.com".to_string(),
                code,
            })
            .unwrap();
        assert_eq!(mismatched.outcome, "REFUSED");

        let health = runtime.health_report().unwrap();
        assert_eq!(health.ledger.applicants_total, 2);
        assert_eq!(health.ledger.applicants_pending, 1);
        assert_eq!(health.ledger.accounts_active, 1);
    }
}
