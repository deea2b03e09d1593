#![forbid(unsafe_code)]

use charon_kernel_contracts::account::{AccountInput, RedemptionCode};
use charon_kernel_contracts::waitlist::{
    ApplicantInput, ApplicantName, ApplicantReason, ApplicantStatus, EmailAddress,
};
use charon_kernel_contracts::MonotonicTimeNs;
use charon_storage::ledger::{LedgerError, LedgerStore};
use charon_storage::repo::{AccountRepo, WaitlistRepo};

fn email(raw: &str) -> EmailAddress {
    EmailAddress::new(raw).unwrap()
}

fn code(raw: &str) -> RedemptionCode {
    RedemptionCode::new(raw).unwrap()
}

fn applicant(raw_email: &str, t: u64) -> ApplicantInput {
    ApplicantInput::v1(
        ApplicantName::new("Jo").unwrap(),
        email(raw_email),
        ApplicantReason::new("prompt testing").unwrap(),
        MonotonicTimeNs(t),
    )
    .unwrap()
}

#[test]
fn at_waitlist_db_01_duplicate_email_leaves_single_row() {
    let mut s = LedgerStore::new_in_memory();
    s.insert_applicant_row(applicant("jo@x.com", 10)).unwrap();

    let out = s.insert_applicant_row(applicant("jo@x.com", 11));
    assert!(matches!(
        out,
        Err(LedgerError::DuplicateKey {
            table: "waitlist.email",
            ..
        })
    ));
    let row = s.applicant_row(&email("jo@x.com")).unwrap();
    assert_eq!(row.applied_at, MonotonicTimeNs(10));
    assert_eq!(s.report_counters().applicants_total, 1);
}

#[test]
fn at_waitlist_db_02_email_uniqueness_spans_accounts() {
    let mut s = LedgerStore::new_in_memory();
    s.issue_account_row(
        AccountInput::v1(
            code("ABCDEFGH"),
            email("holder@x.com"),
            ApplicantName::new("Holder").unwrap(),
            50,
            MonotonicTimeNs(5),
        )
        .unwrap(),
    )
    .unwrap();

    assert!(matches!(
        s.insert_applicant_row(applicant("holder@x.com", 10)),
        Err(LedgerError::DuplicateKey {
            table: "accounts.email",
            ..
        })
    ));
}

#[test]
fn at_waitlist_db_03_approval_is_atomic_across_both_tables() {
    let mut s = LedgerStore::new_in_memory();
    s.insert_applicant_row(applicant("jo@x.com", 10)).unwrap();

    let account = s
        .approval_commit_row(
            MonotonicTimeNs(20),
            &email("jo@x.com"),
            code("ABCDEFGH"),
            100,
            Some("approved by admin".to_string()),
        )
        .unwrap();
    assert_eq!(account.email, email("jo@x.com"));
    assert_eq!(account.granted, 100);

    let row = s.applicant_row(&email("jo@x.com")).unwrap();
    assert_eq!(row.status, ApplicantStatus::Approved);
    assert_eq!(row.decided_at, Some(MonotonicTimeNs(20)));
    assert_eq!(row.admin_note.as_deref(), Some("approved by admin"));
    assert_eq!(
        s.account_row_by_email(&email("jo@x.com")).unwrap().code,
        code("ABCDEFGH")
    );
}

#[test]
fn at_waitlist_db_04_failed_approval_writes_nothing() {
    let mut s = LedgerStore::new_in_memory();
    s.insert_applicant_row(applicant("first@x.com", 10)).unwrap();
    s.insert_applicant_row(applicant("second@x.com", 11))
        .unwrap();
    s.approval_commit_row(
        MonotonicTimeNs(20),
        &email("first@x.com"),
        code("ABCDEFGH"),
        100,
        None,
    )
    .unwrap();

    // Same code again: collision must fail before any write.
    let out = s.approval_commit_row(
        MonotonicTimeNs(21),
        &email("second@x.com"),
        code("ABCDEFGH"),
        100,
        None,
    );
    assert!(matches!(
        out,
        Err(LedgerError::DuplicateKey {
            table: "accounts.code",
            ..
        })
    ));
    let row = s.applicant_row(&email("second@x.com")).unwrap();
    assert_eq!(row.status, ApplicantStatus::Pending);
    assert!(s.account_row_by_email(&email("second@x.com")).is_none());
    assert_eq!(s.report_counters().accounts_active, 1);
}

#[test]
fn at_waitlist_db_05_terminal_status_fails_closed() {
    let mut s = LedgerStore::new_in_memory();
    s.insert_applicant_row(applicant("jo@x.com", 10)).unwrap();
    s.reject_commit_row(
        MonotonicTimeNs(20),
        &email("jo@x.com"),
        Some("insufficient justification".to_string()),
    )
    .unwrap();

    assert!(matches!(
        s.approval_commit_row(
            MonotonicTimeNs(21),
            &email("jo@x.com"),
            code("ABCDEFGH"),
            100,
            None,
        ),
        Err(LedgerError::AlreadyProcessed { .. })
    ));
    assert!(matches!(
        s.reject_commit_row(MonotonicTimeNs(22), &email("jo@x.com"), None),
        Err(LedgerError::AlreadyProcessed { .. })
    ));
    let row = s.applicant_row(&email("jo@x.com")).unwrap();
    assert_eq!(row.status, ApplicantStatus::Rejected);
    assert_eq!(row.decided_at, Some(MonotonicTimeNs(20)));
}

#[test]
fn at_waitlist_db_06_unknown_email_is_not_found() {
    let mut s = LedgerStore::new_in_memory();
    assert!(matches!(
        s.approval_commit_row(
            MonotonicTimeNs(20),
            &email("ghost@x.com"),
            code("ABCDEFGH"),
            100,
            None,
        ),
        Err(LedgerError::NotFound {
            table: "waitlist.email",
            ..
        })
    ));
    assert!(matches!(
        s.reject_commit_row(MonotonicTimeNs(20), &email("ghost@x.com"), None),
        Err(LedgerError::NotFound { .. })
    ));
}

#[test]
fn at_waitlist_db_07_issue_refuses_emails_known_anywhere() {
    let mut s = LedgerStore::new_in_memory();
    s.insert_applicant_row(applicant("waiting@x.com", 10))
        .unwrap();

    let out = s.issue_account_row(
        AccountInput::v1(
            code("WXYZ2345"),
            email("waiting@x.com"),
            ApplicantName::new("Jo").unwrap(),
            25,
            MonotonicTimeNs(20),
        )
        .unwrap(),
    );
    assert!(matches!(
        out,
        Err(LedgerError::DuplicateKey {
            table: "waitlist.email",
            ..
        })
    ));
    assert!(s.account_row_by_code(&code("WXYZ2345")).is_none());
}
