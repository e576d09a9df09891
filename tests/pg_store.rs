use std::sync::Arc;

use serde_json::json;
use uuid::Uuid;

use wordgate::db::PgStore;
use wordgate::models::{
    CallbackOutcome, FileStatus, LedgerAction, NewFile, NewLedgerEntry, NewTransaction,
    TransactionStatus,
};
use wordgate::store::{FileStore, LedgerStore, StoreError, TransactionStore};

mod support;

fn new_transaction(owner_id: i32) -> NewTransaction {
    NewTransaction {
        owner_id,
        transaction_ref: Uuid::new_v4().to_string(),
        amount: "100".to_string(),
    }
}

#[tokio::test]
async fn transaction_refs_are_unique() {
    let Some(test_db) = support::init_test_db().await else {
        return;
    };
    let store = PgStore::new(test_db.pool.clone());

    let new = new_transaction(1);
    let created = store.insert_transaction(new.clone()).await.expect("insert");
    assert_eq!(created.status, TransactionStatus::Initiated);
    assert_eq!(created.amount, "100.00");
    assert_eq!(created.gateway_response, json!({}));

    let err = store.insert_transaction(new).await.unwrap_err();
    assert!(matches!(err, StoreError::DuplicateRef(_)));
}

#[tokio::test]
async fn apply_status_is_idempotent_and_gates_uploads() {
    let Some(test_db) = support::init_test_db().await else {
        return;
    };
    let store = PgStore::new(test_db.pool.clone());
    let tx = store.insert_transaction(new_transaction(2)).await.expect("insert");
    assert!(!store.has_successful_transaction(2).await.expect("gate"));

    let first = store
        .apply_status(&tx.transaction_ref, CallbackOutcome::Success, &json!({"n": 1}), true)
        .await
        .expect("first")
        .expect("row");
    assert!(first.transitioned());
    assert_eq!(first.transaction.last_outcome, Some(CallbackOutcome::Success));

    let second = store
        .apply_status(&tx.transaction_ref, CallbackOutcome::Success, &json!({"n": 2}), true)
        .await
        .expect("second")
        .expect("row");
    assert!(!second.transitioned());
    assert_eq!(second.transaction.gateway_response, json!({"n": 2}));

    assert!(store.has_successful_transaction(2).await.expect("gate"));
    assert!(store
        .apply_status("missing", CallbackOutcome::Success, &json!({}), true)
        .await
        .expect("missing")
        .is_none());
}

#[tokio::test]
async fn cancel_after_failure_is_a_new_outcome() {
    let Some(test_db) = support::init_test_db().await else {
        return;
    };
    let store = PgStore::new(test_db.pool.clone());
    let tx = store.insert_transaction(new_transaction(8)).await.expect("insert");

    let failed = store
        .apply_status(&tx.transaction_ref, CallbackOutcome::Failed, &json!({}), false)
        .await
        .expect("failed")
        .expect("row");
    assert!(failed.transitioned());

    let cancelled = store
        .apply_status(&tx.transaction_ref, CallbackOutcome::Cancelled, &json!({}), false)
        .await
        .expect("cancelled")
        .expect("row");
    assert!(cancelled.transitioned());
    assert_eq!(cancelled.previous_outcome, Some(CallbackOutcome::Failed));
    assert_eq!(cancelled.transaction.status, TransactionStatus::Failed);
    assert_eq!(cancelled.transaction.last_outcome, Some(CallbackOutcome::Cancelled));

    let again = store
        .apply_status(&tx.transaction_ref, CallbackOutcome::Cancelled, &json!({}), false)
        .await
        .expect("again")
        .expect("row");
    assert!(!again.transitioned());
}

#[tokio::test]
async fn keep_first_leaves_terminal_row_untouched() {
    let Some(test_db) = support::init_test_db().await else {
        return;
    };
    let store = PgStore::new(test_db.pool.clone());
    let tx = store.insert_transaction(new_transaction(3)).await.expect("insert");

    store
        .apply_status(&tx.transaction_ref, CallbackOutcome::Success, &json!({"ok": true}), false)
        .await
        .expect("success");
    let refused = store
        .apply_status(&tx.transaction_ref, CallbackOutcome::Failed, &json!({"ok": false}), false)
        .await
        .expect("failed")
        .expect("row");

    assert!(!refused.applied);
    let stored = store
        .find_by_ref(&tx.transaction_ref)
        .await
        .expect("find")
        .expect("row");
    assert_eq!(stored.status, TransactionStatus::Success);
    assert_eq!(stored.gateway_response, json!({"ok": true}));
}

#[tokio::test]
async fn racing_callbacks_transition_once() {
    let Some(test_db) = support::init_test_db().await else {
        return;
    };
    let store = Arc::new(PgStore::new(test_db.pool.clone()));
    let tx = store.insert_transaction(new_transaction(4)).await.expect("insert");

    let tasks: Vec<_> = (0..6)
        .map(|_| {
            let store = store.clone();
            let tran_id = tx.transaction_ref.clone();
            tokio::spawn(async move {
                store
                    .apply_status(&tran_id, CallbackOutcome::Success, &json!({}), true)
                    .await
            })
        })
        .collect();

    let mut transitions = 0;
    for task in tasks {
        let change = task.await.expect("join").expect("apply").expect("row");
        if change.transitioned() {
            transitions += 1;
        }
    }
    assert_eq!(transitions, 1);
}

#[tokio::test]
async fn file_lifecycle_respects_ownership() {
    let Some(test_db) = support::init_test_db().await else {
        return;
    };
    let store = PgStore::new(test_db.pool.clone());

    let file = store
        .insert_file(NewFile {
            owner_id: 5,
            stored_path: "uploads/5/a.txt".to_string(),
            display_name: "a.txt".to_string(),
        })
        .await
        .expect("insert");
    assert_eq!(file.status, FileStatus::Processing);

    assert!(store.get_owned_file(6, file.id).await.expect("get").is_none());
    assert!(store.mark_completed(file.id, 12).await.expect("complete"));

    let stored = store.get_owned_file(5, file.id).await.expect("get").expect("row");
    assert_eq!(stored.status, FileStatus::Completed);
    assert_eq!(stored.word_count, Some(12));

    assert!(store.mark_processing(file.id).await.expect("reset"));
    let stored = store.get_file(file.id).await.expect("get").expect("row");
    assert_eq!(stored.word_count, None);

    assert!(!store.delete_file(6, file.id).await.expect("delete other"));
    assert!(store.delete_file(5, file.id).await.expect("delete"));
    assert!(!store.mark_completed(file.id, 1).await.expect("complete gone"));
}

#[tokio::test]
async fn ledger_lists_recent_entries_newest_first() {
    let Some(test_db) = support::init_test_db().await else {
        return;
    };
    let store = PgStore::new(test_db.pool.clone());

    for n in 0..5 {
        store
            .append(NewLedgerEntry {
                owner_id: Some(7),
                action: LedgerAction::FileProcessed,
                metadata: json!({"file_id": n, "word_count": n}),
            })
            .await
            .expect("append");
    }
    store
        .append(NewLedgerEntry {
            owner_id: None,
            action: LedgerAction::FileProcessingFailed,
            metadata: json!({"error": "store down"}),
        })
        .await
        .expect("append orphan");

    let recent = store.list_recent(7, 3).await.expect("recent");
    let file_ids: Vec<i64> = recent
        .iter()
        .filter_map(|e| e.metadata["file_id"].as_i64())
        .collect();
    assert_eq!(file_ids, vec![4, 3, 2]);
}
