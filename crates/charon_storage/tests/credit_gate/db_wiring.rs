#![forbid(unsafe_code)]

use std::sync::{Arc, Mutex};
use std::thread;

use charon_kernel_contracts::account::{AccountInput, AccountStatus, RedemptionCode};
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

#[test]
fn at_credit_gate_db_01_reserve_deducts_and_reports_remaining() {
    let mut s = LedgerStore::new_in_memory();
    seed_account(&mut s, "ABCDEFGH", 5);

    let (reservation, balance) = s
        .reserve_credit_row(MonotonicTimeNs(10), &code("ABCDEFGH"), 1)
        .unwrap();
    assert_eq!(balance.consumed, 1);
    assert_eq!(balance.remaining, 4);
    assert_eq!(reservation.amount, 1);
    // The read path agrees with the reservation's view.
    assert_eq!(s.credit_balance_row(&code("ABCDEFGH")).unwrap().remaining, 4);
}

#[test]
fn at_credit_gate_db_02_unknown_code_and_revoked_account_refuse() {
    let mut s = LedgerStore::new_in_memory();
    seed_account(&mut s, "ABCDEFGH", 5);

    assert!(matches!(
        s.reserve_credit_row(MonotonicTimeNs(10), &code("WXYZ2345"), 1),
        Err(LedgerError::NotFound {
            table: "accounts.code",
            ..
        })
    ));

    s.revoke_account_row(&code("ABCDEFGH")).unwrap();
    assert!(matches!(
        s.reserve_credit_row(MonotonicTimeNs(11), &code("ABCDEFGH"), 1),
        Err(LedgerError::AccountRevoked { .. })
    ));
    // No deduction happened on either refusal.
    assert_eq!(s.credit_balance_row(&code("ABCDEFGH")).unwrap().consumed, 0);
}

#[test]
fn at_credit_gate_db_03_insufficient_credits_refuses_without_mutation() {
    let mut s = LedgerStore::new_in_memory();
    seed_account(&mut s, "ABCDEFGH", 2);
    s.reserve_credit_row(MonotonicTimeNs(10), &code("ABCDEFGH"), 1)
        .unwrap();
    s.reserve_credit_row(MonotonicTimeNs(11), &code("ABCDEFGH"), 1)
        .unwrap();

    let out = s.reserve_credit_row(MonotonicTimeNs(12), &code("ABCDEFGH"), 1);
    assert!(matches!(
        out,
        Err(LedgerError::InsufficientCredits {
            remaining: 0,
            requested: 1,
            ..
        })
    ));
    assert_eq!(s.credit_balance_row(&code("ABCDEFGH")).unwrap().consumed, 2);
}

#[test]
fn at_credit_gate_db_04_rollback_restores_exactly_the_reserved_amount() {
    let mut s = LedgerStore::new_in_memory();
    seed_account(&mut s, "ABCDEFGH", 5);
    let before = s.credit_balance_row(&code("ABCDEFGH")).unwrap();
    let (reservation, _) = s
        .reserve_credit_row(MonotonicTimeNs(10), &code("ABCDEFGH"), 1)
        .unwrap();

    let after = s
        .rollback_reservation_row(MonotonicTimeNs(20), reservation.reservation_id)
        .unwrap();
    assert_eq!(after.remaining, before.remaining);
    assert_eq!(after.consumed, before.consumed);
    assert!(s.usage_ledger_rows().is_empty());
}

#[test]
fn at_credit_gate_db_05_closed_reservation_fails_both_finalizers() {
    let mut s = LedgerStore::new_in_memory();
    seed_account(&mut s, "ABCDEFGH", 5);
    let (reservation, _) = s
        .reserve_credit_row(MonotonicTimeNs(10), &code("ABCDEFGH"), 1)
        .unwrap();
    s.commit_reservation_row(MonotonicTimeNs(11), reservation.reservation_id, 10, 20, None)
        .unwrap();

    assert!(matches!(
        s.commit_reservation_row(MonotonicTimeNs(12), reservation.reservation_id, 10, 20, None),
        Err(LedgerError::AlreadyProcessed { .. })
    ));
    assert!(matches!(
        s.rollback_reservation_row(MonotonicTimeNs(13), reservation.reservation_id),
        Err(LedgerError::AlreadyProcessed { .. })
    ));
    assert_eq!(s.usage_ledger_rows().len(), 1);
    assert_eq!(s.credit_balance_row(&code("ABCDEFGH")).unwrap().consumed, 1);
}

#[test]
fn at_credit_gate_db_06_last_credit_goes_to_exactly_one_of_two_reservers() {
    // granted=100, consumed=99, two simultaneous reserves.
    let mut store = LedgerStore::new_in_memory();
    seed_account(&mut store, "ABCDEFGH", 100);
    for t in 0..99u64 {
        let (reservation, _) = store
            .reserve_credit_row(MonotonicTimeNs(10 + t), &code("ABCDEFGH"), 1)
            .unwrap();
        store
            .commit_reservation_row(MonotonicTimeNs(110 + t), reservation.reservation_id, 1, 1, None)
            .unwrap();
    }
    let store = Arc::new(Mutex::new(store));

    let mut handles = Vec::new();
    for _ in 0..2 {
        let store = store.clone();
        handles.push(thread::spawn(move || {
            let mut store = store.lock().unwrap();
            store.reserve_credit_row(MonotonicTimeNs(500), &code("ABCDEFGH"), 1)
        }));
    }
    let outcomes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let successes = outcomes.iter().filter(|o| o.is_ok()).count();
    let refusals = outcomes
        .iter()
        .filter(|o| matches!(o, Err(LedgerError::InsufficientCredits { .. })))
        .count();
    assert_eq!(successes, 1);
    assert_eq!(refusals, 1);
    if let Some(Ok((_, balance))) = outcomes.iter().find(|o| o.is_ok()) {
        assert_eq!(balance.remaining, 0);
    }
    let store = store.lock().unwrap();
    assert_eq!(store.credit_balance_row(&code("ABCDEFGH")).unwrap().consumed, 100);
}

#[test]
fn at_credit_gate_db_07_n_concurrent_reservers_win_exactly_k_credits() {
    let k = 3u32;
    let n = 8usize;
    let mut store = LedgerStore::new_in_memory();
    seed_account(&mut store, "ABCDEFGH", k);
    let store = Arc::new(Mutex::new(store));

    let mut handles = Vec::new();
    for _ in 0..n {
        let store = store.clone();
        handles.push(thread::spawn(move || {
            let mut store = store.lock().unwrap();
            store.reserve_credit_row(MonotonicTimeNs(50), &code("ABCDEFGH"), 1)
        }));
    }
    let outcomes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let successes = outcomes.iter().filter(|o| o.is_ok()).count();
    let refusals = outcomes
        .iter()
        .filter(|o| matches!(o, Err(LedgerError::InsufficientCredits { .. })))
        .count();
    assert_eq!(successes, k as usize);
    assert_eq!(refusals, n - k as usize);

    let store = store.lock().unwrap();
    let balance = store.credit_balance_row(&code("ABCDEFGH")).unwrap();
    assert_eq!(balance.consumed, k);
    assert_eq!(balance.remaining, 0);
}

#[test]
fn at_credit_gate_db_08_conservation_holds_through_mixed_traffic() {
    let mut s = LedgerStore::new_in_memory();
    seed_account(&mut s, "ABCDEFGH", 10);

    let mut committed = 0u32;
    for t in 0..6u64 {
        let (reservation, balance) = s
            .reserve_credit_row(MonotonicTimeNs(100 + t), &code("ABCDEFGH"), 1)
            .unwrap();
        assert!(balance.consumed <= balance.granted);
        if t % 2 == 0 {
            s.commit_reservation_row(
                MonotonicTimeNs(200 + t),
                reservation.reservation_id,
                5,
                9,
                None,
            )
            .unwrap();
            committed += 1;
        } else {
            s.rollback_reservation_row(MonotonicTimeNs(200 + t), reservation.reservation_id)
                .unwrap();
        }
    }

    let balance = s.credit_balance_row(&code("ABCDEFGH")).unwrap();
    assert_eq!(balance.consumed, committed);
    assert_eq!(balance.remaining, balance.granted - balance.consumed);
    // The usage trail reconciles with the net consumption.
    assert_eq!(s.usage_ledger_rows().len() as u32, committed);
}

#[test]
fn at_credit_gate_db_09_revocation_preserves_history() {
    let mut s = LedgerStore::new_in_memory();
    seed_account(&mut s, "ABCDEFGH", 5);
    let (reservation, _) = s
        .reserve_credit_row(MonotonicTimeNs(10), &code("ABCDEFGH"), 1)
        .unwrap();
    s.commit_reservation_row(MonotonicTimeNs(11), reservation.reservation_id, 3, 7, None)
        .unwrap();

    s.revoke_account_row(&code("ABCDEFGH")).unwrap();
    s.revoke_account_row(&code("ABCDEFGH")).unwrap();

    let account = s.account_row_by_code(&code("ABCDEFGH")).unwrap();
    assert_eq!(account.status, AccountStatus::Revoked);
    assert_eq!(s.usage_ledger_rows().len(), 1);
    assert_eq!(s.report_counters().accounts_revoked, 1);
}
