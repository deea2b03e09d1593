#![forbid(unsafe_code)]

use charon_kernel_contracts::account::{AccountInput, RedemptionCode};
use charon_kernel_contracts::usage::{ClientTag, UsageEventId};
use charon_kernel_contracts::waitlist::{ApplicantName, EmailAddress};
use charon_kernel_contracts::MonotonicTimeNs;
use charon_storage::ledger::{LedgerError, LedgerStore};
use charon_storage::repo::{AccountRepo, CreditGateRepo};

fn code(raw: &str) -> RedemptionCode {
    RedemptionCode::new(raw).unwrap()
}

fn seed_account(store: &mut LedgerStore, raw_code: &str, granted: u32) {
    store
        .issue_account_row(
            AccountInput::v1(
                code(raw_code),
                EmailAddress::new(format!("{}@x.com", raw_code.to_ascii_lowercase())).unwrap(),
                ApplicantName::new("Holder").unwrap(),
                granted,
                MonotonicTimeNs(1),
            )
            .unwrap(),
        )
        .unwrap();
}

fn reserve_and_commit(
    store: &mut LedgerStore,
    raw_code: &str,
    t: u64,
    prompt_chars: u32,
    response_chars: u32,
    client_tag: Option<&str>,
) -> UsageEventId {
    let (reservation, _) = store
        .reserve_credit_row(MonotonicTimeNs(t), &code(raw_code), 1)
        .unwrap();
    store
        .commit_reservation_row(
            MonotonicTimeNs(t + 1),
            reservation.reservation_id,
            prompt_chars,
            response_chars,
            client_tag.map(|tag| ClientTag::new(tag).unwrap()),
        )
        .unwrap()
        .usage_event_id
}

#[test]
fn at_usage_ledger_db_01_commit_appends_exactly_one_row() {
    let mut s = LedgerStore::new_in_memory();
    seed_account(&mut s, "ABCDEFGH", 5);

    reserve_and_commit(&mut s, "ABCDEFGH", 10, 42, 180, Some("ext-install-9"));
    assert_eq!(s.usage_ledger_rows().len(), 1);

    let row = &s.usage_ledger_rows()[0];
    assert_eq!(row.code, code("ABCDEFGH"));
    assert_eq!(row.prompt_chars, 42);
    assert_eq!(row.response_chars, 180);
    assert_eq!(row.client_tag.as_ref().unwrap().as_str(), "ext-install-9");
}

#[test]
fn at_usage_ledger_db_02_append_only_enforced() {
    let mut s = LedgerStore::new_in_memory();
    seed_account(&mut s, "ABCDEFGH", 5);
    let event_id = reserve_and_commit(&mut s, "ABCDEFGH", 10, 1, 2, None);

    assert!(matches!(
        s.attempt_overwrite_usage_event_row(event_id),
        Err(LedgerError::AppendOnlyViolation {
            table: "usage_ledger",
        })
    ));
}

#[test]
fn at_usage_ledger_db_03_prior_rows_never_mutate() {
    let mut s = LedgerStore::new_in_memory();
    seed_account(&mut s, "ABCDEFGH", 5);
    reserve_and_commit(&mut s, "ABCDEFGH", 10, 11, 21, None);
    let first = s.usage_ledger_rows()[0].clone();

    reserve_and_commit(&mut s, "ABCDEFGH", 20, 12, 22, None);
    reserve_and_commit(&mut s, "ABCDEFGH", 30, 13, 23, None);

    assert_eq!(s.usage_ledger_rows().len(), 3);
    assert_eq!(s.usage_ledger_rows()[0], first);
}

#[test]
fn at_usage_ledger_db_04_event_ids_are_monotonic_per_store() {
    let mut s = LedgerStore::new_in_memory();
    seed_account(&mut s, "ABCDEFGH", 5);
    seed_account(&mut s, "WXYZ2345", 5);

    let a = reserve_and_commit(&mut s, "ABCDEFGH", 10, 1, 1, None);
    let b = reserve_and_commit(&mut s, "WXYZ2345", 20, 1, 1, None);
    let c = reserve_and_commit(&mut s, "ABCDEFGH", 30, 1, 1, None);
    assert!(a < b && b < c);
}

#[test]
fn at_usage_ledger_db_05_trail_reconciles_with_consumed() {
    let mut s = LedgerStore::new_in_memory();
    seed_account(&mut s, "ABCDEFGH", 8);
    reserve_and_commit(&mut s, "ABCDEFGH", 10, 1, 1, None);
    reserve_and_commit(&mut s, "ABCDEFGH", 20, 1, 1, None);
    // A rolled-back reservation must leave no trail entry behind.
    let (reservation, _) = s
        .reserve_credit_row(MonotonicTimeNs(30), &code("ABCDEFGH"), 1)
        .unwrap();
    s.rollback_reservation_row(MonotonicTimeNs(31), reservation.reservation_id)
        .unwrap();

    let balance = s.credit_balance_row(&code("ABCDEFGH")).unwrap();
    let committed_for_code = s
        .usage_ledger_rows()
        .iter()
        .filter(|row| row.code == code("ABCDEFGH"))
        .count() as u32;
    assert_eq!(balance.consumed, committed_for_code);
}
