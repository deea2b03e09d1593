#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use charon_kernel_contracts::account::{
    AccountInput, AccountRecord, AccountStatus, CreditBalance, RedemptionCode,
};
use charon_kernel_contracts::usage::{
    ClientTag, ReservationId, ReservationRecord, ReservationState, UsageEventId, UsageEventInput,
    UsageEventRecord,
};
use charon_kernel_contracts::waitlist::{
    ApplicantInput, ApplicantRecord, ApplicantStatus, EmailAddress,
};
use charon_kernel_contracts::{ContractViolation, MonotonicTimeNs, Validate};

#[derive(Debug, Clone, PartialEq)]
pub enum LedgerError {
    NotFound {
        table: &'static str,
        key: String,
    },
    DuplicateKey {
        table: &'static str,
        key: String,
    },
    AlreadyProcessed {
        table: &'static str,
        key: String,
    },
    InsufficientCredits {
        code: String,
        remaining: u32,
        requested: u32,
    },
    AccountRevoked {
        code: String,
    },
    AppendOnlyViolation {
        table: &'static str,
    },
    ContractViolation(ContractViolation),
}

impl From<ContractViolation> for LedgerError {
    fn from(v: ContractViolation) -> Self {
        LedgerError::ContractViolation(v)
    }
}

/// Snapshot counters for the admin report surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LedgerReportCounters {
    pub applicants_total: u64,
    pub applicants_pending: u64,
    pub accounts_active: u64,
    pub accounts_revoked: u64,
    pub usage_events_total: u64,
    pub reservations_pending: u64,
}

/// Single-writer authoritative store for the waiting list, accounts,
/// reservations, and the append-only usage ledger. Every mutating method
/// reads all of its preconditions and builds the replacement rows before
/// the first write, so a failed call leaves the tables untouched.
#[derive(Debug, Clone)]
pub struct LedgerStore {
    applicants: BTreeMap<EmailAddress, ApplicantRecord>,
    accounts: BTreeMap<RedemptionCode, AccountRecord>,
    // Enforces one account per email; the waiting list enforces its own key.
    account_email_index: BTreeMap<EmailAddress, RedemptionCode>,
    reservations: BTreeMap<ReservationId, ReservationRecord>,
    usage_ledger: Vec<UsageEventRecord>,
    next_reservation_id: u64,
    next_usage_event_id: u64,
}

// Id counters must start at 1; a zeroed store would mint invalid ids.
impl Default for LedgerStore {
    fn default() -> Self {
        Self::new_in_memory()
    }
}

impl LedgerStore {
    pub fn new_in_memory() -> Self {
        Self {
            applicants: BTreeMap::new(),
            accounts: BTreeMap::new(),
            account_email_index: BTreeMap::new(),
            reservations: BTreeMap::new(),
            usage_ledger: Vec::new(),
            next_reservation_id: 1,
            next_usage_event_id: 1,
        }
    }

    // ------------------------
    // Waiting list.
    // ------------------------

    pub fn insert_applicant(&mut self, input: ApplicantInput) -> Result<(), LedgerError> {
        input.validate()?;
        if self.applicants.contains_key(&input.email) {
            return Err(LedgerError::DuplicateKey {
                table: "waitlist.email",
                key: input.email.as_str().to_string(),
            });
        }
        if self.account_email_index.contains_key(&input.email) {
            return Err(LedgerError::DuplicateKey {
                table: "accounts.email",
                key: input.email.as_str().to_string(),
            });
        }
        let record = ApplicantRecord::from_input_v1(input)?;
        self.applicants.insert(record.email.clone(), record);
        Ok(())
    }

    pub fn applicant(&self, email: &EmailAddress) -> Option<&ApplicantRecord> {
        self.applicants.get(email)
    }

    /// Approves a pending applicant and mints its account in one call.
    /// A code collision fails before any write; the caller retries with a
    /// fresh code.
    pub fn approval_commit(
        &mut self,
        now: MonotonicTimeNs,
        email: &EmailAddress,
        code: RedemptionCode,
        granted: u32,
        admin_note: Option<String>,
    ) -> Result<AccountRecord, LedgerError> {
        let applicant = self
            .applicants
            .get(email)
            .ok_or_else(|| LedgerError::NotFound {
                table: "waitlist.email",
                key: email.as_str().to_string(),
            })?;
        if applicant.status.is_terminal() {
            return Err(LedgerError::AlreadyProcessed {
                table: "waitlist.email",
                key: email.as_str().to_string(),
            });
        }
        if self.accounts.contains_key(&code) {
            return Err(LedgerError::DuplicateKey {
                table: "accounts.code",
                key: code.as_str().to_string(),
            });
        }
        if self.account_email_index.contains_key(email) {
            return Err(LedgerError::DuplicateKey {
                table: "accounts.email",
                key: email.as_str().to_string(),
            });
        }

        let account = AccountRecord::from_input_v1(AccountInput::v1(
            code,
            applicant.email.clone(),
            applicant.name.clone(),
            granted,
            now,
        )?)?;
        let mut decided = applicant.clone();
        decided.status = ApplicantStatus::Approved;
        decided.decided_at = Some(now);
        decided.admin_note = admin_note;
        decided.validate()?;

        self.account_email_index
            .insert(account.email.clone(), account.code.clone());
        self.accounts.insert(account.code.clone(), account.clone());
        self.applicants.insert(decided.email.clone(), decided);
        Ok(account)
    }

    pub fn reject_commit(
        &mut self,
        now: MonotonicTimeNs,
        email: &EmailAddress,
        admin_note: Option<String>,
    ) -> Result<(), LedgerError> {
        let applicant = self
            .applicants
            .get(email)
            .ok_or_else(|| LedgerError::NotFound {
                table: "waitlist.email",
                key: email.as_str().to_string(),
            })?;
        if applicant.status.is_terminal() {
            return Err(LedgerError::AlreadyProcessed {
                table: "waitlist.email",
                key: email.as_str().to_string(),
            });
        }
        let mut decided = applicant.clone();
        decided.status = ApplicantStatus::Rejected;
        decided.decided_at = Some(now);
        decided.admin_note = admin_note;
        decided.validate()?;
        self.applicants.insert(decided.email.clone(), decided);
        Ok(())
    }

    // ------------------------
    // Accounts.
    // ------------------------

    /// Direct administrative issuance, bypassing the waiting list.
    pub fn issue_account(&mut self, input: AccountInput) -> Result<AccountRecord, LedgerError> {
        input.validate()?;
        if self.accounts.contains_key(&input.code) {
            return Err(LedgerError::DuplicateKey {
                table: "accounts.code",
                key: input.code.as_str().to_string(),
            });
        }
        if self.account_email_index.contains_key(&input.email) {
            return Err(LedgerError::DuplicateKey {
                table: "accounts.email",
                key: input.email.as_str().to_string(),
            });
        }
        if self.applicants.contains_key(&input.email) {
            return Err(LedgerError::DuplicateKey {
                table: "waitlist.email",
                key: input.email.as_str().to_string(),
            });
        }
        let account = AccountRecord::from_input_v1(input)?;
        self.account_email_index
            .insert(account.email.clone(), account.code.clone());
        self.accounts.insert(account.code.clone(), account.clone());
        Ok(account)
    }

    pub fn account_by_code(&self, code: &RedemptionCode) -> Option<&AccountRecord> {
        self.accounts.get(code)
    }

    pub fn account_by_email(&self, email: &EmailAddress) -> Option<&AccountRecord> {
        self.account_email_index
            .get(email)
            .and_then(|code| self.accounts.get(code))
    }

    pub fn credit_balance(&self, code: &RedemptionCode) -> Result<CreditBalance, LedgerError> {
        let account = self
            .accounts
            .get(code)
            .ok_or_else(|| LedgerError::NotFound {
                table: "accounts.code",
                key: code.as_str().to_string(),
            })?;
        Ok(CreditBalance::v1(account)?)
    }

    /// Idempotent: revoking an already-revoked account is a no-op success.
    pub fn revoke_account(&mut self, code: &RedemptionCode) -> Result<(), LedgerError> {
        let account = self
            .accounts
            .get_mut(code)
            .ok_or_else(|| LedgerError::NotFound {
                table: "accounts.code",
                key: code.as_str().to_string(),
            })?;
        account.status = AccountStatus::Revoked;
        Ok(())
    }

    // ------------------------
    // Credit gate (reserve / commit / rollback).
    // ------------------------

    /// First phase of a deduction: checks the balance and increments
    /// `consumed` in the same call, so two concurrent reservations can
    /// never both take the last credit.
    pub fn reserve_credit(
        &mut self,
        now: MonotonicTimeNs,
        code: &RedemptionCode,
        amount: u32,
    ) -> Result<(ReservationRecord, CreditBalance), LedgerError> {
        if amount == 0 {
            return Err(LedgerError::ContractViolation(
                ContractViolation::InvalidValue {
                    field: "reserve_credit.amount",
                    reason: "must be > 0",
                },
            ));
        }
        let account = self
            .accounts
            .get(code)
            .ok_or_else(|| LedgerError::NotFound {
                table: "accounts.code",
                key: code.as_str().to_string(),
            })?;
        if account.status == AccountStatus::Revoked {
            return Err(LedgerError::AccountRevoked {
                code: code.as_str().to_string(),
            });
        }
        if account.remaining() < amount {
            return Err(LedgerError::InsufficientCredits {
                code: code.as_str().to_string(),
                remaining: account.remaining(),
                requested: amount,
            });
        }

        let mut updated = account.clone();
        updated.consumed = updated.consumed.saturating_add(amount);
        updated.validate()?;
        let reservation_id = ReservationId(self.next_reservation_id);
        let reservation =
            ReservationRecord::pending_v1(reservation_id, code.clone(), amount, now)?;
        let balance = CreditBalance::v1(&updated)?;

        self.next_reservation_id = self.next_reservation_id.saturating_add(1);
        self.accounts.insert(updated.code.clone(), updated);
        self.reservations.insert(reservation_id, reservation.clone());
        Ok((reservation, balance))
    }

    /// Finalizes a pending reservation: appends exactly one usage event,
    /// stamps the account's last-used time, and closes the reservation.
    /// Fail-closed on a non-pending reservation so a double commit cannot
    /// write a second event.
    pub fn commit_reservation(
        &mut self,
        now: MonotonicTimeNs,
        reservation_id: ReservationId,
        prompt_chars: u32,
        response_chars: u32,
        client_tag: Option<ClientTag>,
    ) -> Result<UsageEventRecord, LedgerError> {
        let reservation = self
            .reservations
            .get(&reservation_id)
            .ok_or_else(|| LedgerError::NotFound {
                table: "reservations.reservation_id",
                key: reservation_id.0.to_string(),
            })?;
        if reservation.state.is_closed() {
            return Err(LedgerError::AlreadyProcessed {
                table: "reservations.reservation_id",
                key: reservation_id.0.to_string(),
            });
        }
        let account = self
            .accounts
            .get(&reservation.code)
            .ok_or_else(|| LedgerError::NotFound {
                table: "accounts.code",
                key: reservation.code.as_str().to_string(),
            })?;

        let event = UsageEventRecord::from_input_v1(
            UsageEventId(self.next_usage_event_id),
            UsageEventInput::v1(
                reservation.code.clone(),
                reservation_id,
                prompt_chars,
                response_chars,
                now,
                client_tag,
            )?,
        )?;
        let mut closed = reservation.clone();
        closed.state = ReservationState::Committed;
        closed.closed_at = Some(now);
        closed.validate()?;
        let mut stamped = account.clone();
        stamped.last_used_at = Some(now);

        self.next_usage_event_id = self.next_usage_event_id.saturating_add(1);
        self.usage_ledger.push(event.clone());
        self.reservations.insert(reservation_id, closed);
        self.accounts.insert(stamped.code.clone(), stamped);
        Ok(event)
    }

    /// Restores the reserved credit and closes the reservation without
    /// writing a usage event. Fail-closed on a non-pending reservation.
    pub fn rollback_reservation(
        &mut self,
        now: MonotonicTimeNs,
        reservation_id: ReservationId,
    ) -> Result<CreditBalance, LedgerError> {
        let reservation = self
            .reservations
            .get(&reservation_id)
            .ok_or_else(|| LedgerError::NotFound {
                table: "reservations.reservation_id",
                key: reservation_id.0.to_string(),
            })?;
        if reservation.state.is_closed() {
            return Err(LedgerError::AlreadyProcessed {
                table: "reservations.reservation_id",
                key: reservation_id.0.to_string(),
            });
        }
        let account = self
            .accounts
            .get(&reservation.code)
            .ok_or_else(|| LedgerError::NotFound {
                table: "accounts.code",
                key: reservation.code.as_str().to_string(),
            })?;

        let mut restored = account.clone();
        restored.consumed = restored.consumed.saturating_sub(reservation.amount);
        restored.validate()?;
        let mut closed = reservation.clone();
        closed.state = ReservationState::RolledBack;
        closed.closed_at = Some(now);
        closed.validate()?;
        let balance = CreditBalance::v1(&restored)?;

        self.accounts.insert(restored.code.clone(), restored);
        self.reservations.insert(reservation_id, closed);
        Ok(balance)
    }

    /// Reaper pass: rolls back every pending reservation older than the
    /// TTL and returns the count. Younger reservations and closed ones
    /// are untouched.
    pub fn rollback_expired_reservations(
        &mut self,
        now: MonotonicTimeNs,
        ttl_ns: u64,
    ) -> Result<u32, LedgerError> {
        let expired: Vec<ReservationId> = self
            .reservations
            .values()
            .filter(|r| {
                r.state == ReservationState::Pending
                    && r.reserved_at.0.saturating_add(ttl_ns) <= now.0
            })
            .map(|r| r.reservation_id)
            .collect();
        let mut reaped: u32 = 0;
        for reservation_id in expired {
            self.rollback_reservation(now, reservation_id)?;
            reaped = reaped.saturating_add(1);
        }
        Ok(reaped)
    }

    pub fn reservation(&self, reservation_id: &ReservationId) -> Option<&ReservationRecord> {
        self.reservations.get(reservation_id)
    }

    // ------------------------
    // Usage ledger (append-only).
    // ------------------------

    pub fn usage_ledger(&self) -> &[UsageEventRecord] {
        &self.usage_ledger
    }

    pub fn attempt_overwrite_usage_event(
        &mut self,
        _usage_event_id: UsageEventId,
    ) -> Result<(), LedgerError> {
        Err(LedgerError::AppendOnlyViolation {
            table: "usage_ledger",
        })
    }

    // ------------------------
    // Report counters.
    // ------------------------

    pub fn report_counters(&self) -> LedgerReportCounters {
        let applicants_pending = self
            .applicants
            .values()
            .filter(|a| a.status == ApplicantStatus::Pending)
            .count() as u64;
        let accounts_active = self
            .accounts
            .values()
            .filter(|a| a.status == AccountStatus::Active)
            .count() as u64;
        let reservations_pending = self
            .reservations
            .values()
            .filter(|r| r.state == ReservationState::Pending)
            .count() as u64;
        LedgerReportCounters {
            applicants_total: self.applicants.len() as u64,
            applicants_pending,
            accounts_active,
            accounts_revoked: (self.accounts.len() as u64).saturating_sub(accounts_active),
            usage_events_total: self.usage_ledger.len() as u64,
            reservations_pending,
        }
    }
}
