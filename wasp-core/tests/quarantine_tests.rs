use tempfile::TempDir;

use wasp_core::quarantine;
use wasp_core::{Error, Platform, Store};

fn test_store() -> (TempDir, Store) {
    let dir = TempDir::new().expect("tempdir");
    let store = Store::open(dir.path()).expect("open store");
    (dir, store)
}

#[test]
fn quarantined_message_keeps_full_body_and_truncated_preview() {
    let (_dir, store) = test_store();
    let body = "a".repeat(250);
    let m = quarantine::quarantine(&store, "+4409", Platform::Whatsapp, &body, 100)
        .expect("quarantine");

    assert_eq!(m.body, body);
    assert_eq!(m.preview.chars().count(), 101); // 100 chars + ellipsis
    assert!(m.preview.ends_with('…'));
    assert!(!m.reviewed);

    let unreviewed = quarantine::list_unreviewed(&store, 10).expect("list");
    assert_eq!(unreviewed.len(), 1);
    assert_eq!(unreviewed[0].id, m.id);
}

#[test]
fn short_messages_are_not_ellipsized() {
    let (_dir, store) = test_store();
    let m = quarantine::quarantine(&store, "+4409", Platform::Whatsapp, "hi there", 100)
        .expect("quarantine");
    assert_eq!(m.preview, "hi there");
}

#[test]
fn release_marks_reviewed_returns_messages_and_is_idempotent() {
    let (_dir, store) = test_store();
    quarantine::quarantine(&store, "+4409", Platform::Whatsapp, "first", 100).expect("q1");
    quarantine::quarantine(&store, "+4409", Platform::Whatsapp, "second", 100).expect("q2");
    quarantine::quarantine(&store, "+4408", Platform::Whatsapp, "other sender", 100).expect("q3");

    let released = quarantine::release(&store, "+4409", Platform::Whatsapp).expect("release");
    assert_eq!(released.len(), 2);
    assert!(released.iter().all(|m| m.reviewed));

    // Rows are retained after release, only flagged.
    let all = quarantine::list_by_identifier(&store, "+4409", Platform::Whatsapp).expect("list");
    assert_eq!(all.len(), 2);
    assert!(all.iter().all(|m| m.reviewed));

    // Second release returns the empty list and mutates nothing.
    let again = quarantine::release(&store, "+4409", Platform::Whatsapp).expect("release again");
    assert!(again.is_empty());

    // The other sender's message is untouched.
    let unreviewed = quarantine::list_unreviewed(&store, 10).expect("unreviewed");
    assert_eq!(unreviewed.len(), 1);
    assert_eq!(unreviewed[0].identifier, "+4408");
}

#[test]
fn delete_is_explicit_and_separate_from_release() {
    let (_dir, store) = test_store();
    quarantine::quarantine(&store, "+4409", Platform::Whatsapp, "held", 100).expect("q");
    quarantine::release(&store, "+4409", Platform::Whatsapp).expect("release");

    // Released rows survive until deleted.
    assert_eq!(
        quarantine::list_by_identifier(&store, "+4409", Platform::Whatsapp)
            .expect("list")
            .len(),
        1
    );
    assert_eq!(
        quarantine::delete(&store, "+4409", Platform::Whatsapp).expect("delete"),
        1
    );
    assert!(quarantine::list_by_identifier(&store, "+4409", Platform::Whatsapp)
        .expect("list")
        .is_empty());
}

#[test]
fn delete_of_missing_rows_is_not_found() {
    let (_dir, store) = test_store();
    let err = quarantine::delete(&store, "+4409", Platform::Whatsapp).unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[test]
fn purge_by_age() {
    let (_dir, store) = test_store();
    quarantine::quarantine(&store, "+4409", Platform::Whatsapp, "held", 100).expect("q");

    assert_eq!(quarantine::purge_older_than(&store, 30).expect("purge"), 0);
    assert_eq!(quarantine::purge_older_than(&store, 0).expect("purge"), 1);
}
