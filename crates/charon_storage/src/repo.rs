#![forbid(unsafe_code)]

use charon_kernel_contracts::account::{AccountInput, AccountRecord, CreditBalance, RedemptionCode};
use charon_kernel_contracts::usage::{
    ClientTag, ReservationId, ReservationRecord, UsageEventId, UsageEventRecord,
};
use charon_kernel_contracts::waitlist::{ApplicantInput, ApplicantRecord, EmailAddress};
use charon_kernel_contracts::MonotonicTimeNs;

use crate::ledger::{LedgerError, LedgerReportCounters, LedgerStore};

/// Typed repository interface for waiting-list wiring.
pub trait WaitlistRepo {
    fn insert_applicant_row(&mut self, input: ApplicantInput) -> Result<(), LedgerError>;
    fn applicant_row(&self, email: &EmailAddress) -> Option<&ApplicantRecord>;
    fn approval_commit_row(
        &mut self,
        now: MonotonicTimeNs,
        email: &EmailAddress,
        code: RedemptionCode,
        granted: u32,
        admin_note: Option<String>,
    ) -> Result<AccountRecord, LedgerError>;
    fn reject_commit_row(
        &mut self,
        now: MonotonicTimeNs,
        email: &EmailAddress,
        admin_note: Option<String>,
    ) -> Result<(), LedgerError>;
}

/// Typed repository interface for account wiring.
pub trait AccountRepo {
    fn issue_account_row(&mut self, input: AccountInput) -> Result<AccountRecord, LedgerError>;
    fn account_row_by_code(&self, code: &RedemptionCode) -> Option<&AccountRecord>;
    fn account_row_by_email(&self, email: &EmailAddress) -> Option<&AccountRecord>;
    fn credit_balance_row(&self, code: &RedemptionCode) -> Result<CreditBalance, LedgerError>;
    fn revoke_account_row(&mut self, code: &RedemptionCode) -> Result<(), LedgerError>;
}

/// Typed repository interface for the two-phase credit gate wiring.
pub trait CreditGateRepo {
    fn reserve_credit_row(
        &mut self,
        now: MonotonicTimeNs,
        code: &RedemptionCode,
        amount: u32,
    ) -> Result<(ReservationRecord, CreditBalance), LedgerError>;
    fn commit_reservation_row(
        &mut self,
        now: MonotonicTimeNs,
        reservation_id: ReservationId,
        prompt_chars: u32,
        response_chars: u32,
        client_tag: Option<ClientTag>,
    ) -> Result<UsageEventRecord, LedgerError>;
    fn rollback_reservation_row(
        &mut self,
        now: MonotonicTimeNs,
        reservation_id: ReservationId,
    ) -> Result<CreditBalance, LedgerError>;
    fn reservation_row(&self, reservation_id: &ReservationId) -> Option<&ReservationRecord>;
    fn usage_ledger_rows(&self) -> &[UsageEventRecord];
    fn attempt_overwrite_usage_event_row(
        &mut self,
        usage_event_id: UsageEventId,
    ) -> Result<(), LedgerError>;
    fn report_counter_rows(&self) -> LedgerReportCounters;
}

impl WaitlistRepo for LedgerStore {
    fn insert_applicant_row(&mut self, input: ApplicantInput) -> Result<(), LedgerError> {
        self.insert_applicant(input)
    }

    fn applicant_row(&self, email: &EmailAddress) -> Option<&ApplicantRecord> {
        self.applicant(email)
    }

    fn approval_commit_row(
        &mut self,
        now: MonotonicTimeNs,
        email: &EmailAddress,
        code: RedemptionCode,
        granted: u32,
        admin_note: Option<String>,
    ) -> Result<AccountRecord, LedgerError> {
        self.approval_commit(now, email, code, granted, admin_note)
    }

    fn reject_commit_row(
        &mut self,
        now: MonotonicTimeNs,
        email: &EmailAddress,
        admin_note: Option<String>,
    ) -> Result<(), LedgerError> {
        self.reject_commit(now, email, admin_note)
    }
}

impl AccountRepo for LedgerStore {
    fn issue_account_row(&mut self, input: AccountInput) -> Result<AccountRecord, LedgerError> {
        self.issue_account(input)
    }

    fn account_row_by_code(&self, code: &RedemptionCode) -> Option<&AccountRecord> {
        self.account_by_code(code)
    }

    fn account_row_by_email(&self, email: &EmailAddress) -> Option<&AccountRecord> {
        self.account_by_email(email)
    }

    fn credit_balance_row(&self, code: &RedemptionCode) -> Result<CreditBalance, LedgerError> {
        self.credit_balance(code)
    }

    fn revoke_account_row(&mut self, code: &RedemptionCode) -> Result<(), LedgerError> {
        self.revoke_account(code)
    }
}

impl CreditGateRepo for LedgerStore {
    fn reserve_credit_row(
        &mut self,
        now: MonotonicTimeNs,
        code: &RedemptionCode,
        amount: u32,
    ) -> Result<(ReservationRecord, CreditBalance), LedgerError> {
        self.reserve_credit(now, code, amount)
    }

    fn commit_reservation_row(
        &mut self,
        now: MonotonicTimeNs,
        reservation_id: ReservationId,
        prompt_chars: u32,
        response_chars: u32,
        client_tag: Option<ClientTag>,
    ) -> Result<UsageEventRecord, LedgerError> {
        self.commit_reservation(now, reservation_id, prompt_chars, response_chars, client_tag)
    }

    fn rollback_reservation_row(
        &mut self,
        now: MonotonicTimeNs,
        reservation_id: ReservationId,
    ) -> Result<CreditBalance, LedgerError> {
        self.rollback_reservation(now, reservation_id)
    }

    fn reservation_row(&self, reservation_id: &ReservationId) -> Option<&ReservationRecord> {
        self.reservation(reservation_id)
    }

    fn usage_ledger_rows(&self) -> &[UsageEventRecord] {
        self.usage_ledger()
    }

    fn attempt_overwrite_usage_event_row(
        &mut self,
        usage_event_id: UsageEventId,
    ) -> Result<(), LedgerError> {
        self.attempt_overwrite_usage_event(usage_event_id)
    }

    fn report_counter_rows(&self) -> LedgerReportCounters {
        self.report_counters()
    }
}
