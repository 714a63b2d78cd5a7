//! Tests for write-coupled cache invalidation.

use super::*;
use crate::document::Document;
use crate::error::RepositoryError;
use crate::testing::{object, RecordingStore};
use docbatch_domain::{LoaderError, LoaderScope};
use docbatch_storage::{Precondition, Query, StorageError};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct User {
    name: String,
    #[serde(default)]
    role: Option<String>,
}

fn user(name: &str) -> User {
    User {
        name: name.to_string(),
        role: None,
    }
}

async fn setup() -> (Arc<RecordingStore>, Collection<RecordingStore, User>) {
    let store = Arc::new(RecordingStore::new());
    store.seed("users", "alice", json!({"name": "Alice"})).await;
    store.seed("users", "bob", json!({"name": "Bob"})).await;
    let users = Collection::new(Arc::clone(&store), "users").unwrap();
    (store, users)
}

// ============================================================
// Section 1: Cached Reads
// ============================================================

#[tokio::test]
async fn test_find_by_id_caches_within_scope() {
    // Arrange
    let (store, users) = setup().await;
    let scope = LoaderScope::new();

    // Act
    let first = users.find_by_id(&scope, "alice").await.unwrap();
    let second = users.find_by_id(&scope, "alice").await.unwrap();

    // Assert
    assert_eq!(first, Some(Document::new("alice", user("Alice"))));
    assert_eq!(first, second);
    assert_eq!(store.read_count(), 1);
}

#[tokio::test]
async fn test_concurrent_finds_share_one_fetch() {
    let (store, users) = setup().await;
    let scope = LoaderScope::new();

    let (a, b, a_again) = tokio::join!(
        users.find_by_id(&scope, "alice"),
        users.find_by_id(&scope, "bob"),
        users.find_by_id(&scope, "alice"),
    );

    assert_eq!(a.unwrap().unwrap().data.name, "Alice");
    assert_eq!(b.unwrap().unwrap().data.name, "Bob");
    assert_eq!(a_again.unwrap().unwrap().data.name, "Alice");
    assert_eq!(
        store.id_set_calls(),
        vec![vec!["alice".to_string(), "bob".to_string()]]
    );
}

#[tokio::test]
async fn test_find_many_preserves_order_and_reports_absence() {
    let (store, users) = setup().await;
    let scope = LoaderScope::new();

    let results = users
        .find_many(&scope, ["bob", "ghost", "alice"])
        .await
        .unwrap();

    let names: Vec<Option<String>> = results
        .into_iter()
        .map(|r| r.unwrap().map(|doc| doc.data.name))
        .collect();
    assert_eq!(
        names,
        vec![Some("Bob".to_string()), None, Some("Alice".to_string())]
    );
    assert_eq!(store.read_count(), 1);
}

#[tokio::test]
async fn test_absent_document_is_none() {
    let (_store, users) = setup().await;
    let scope = LoaderScope::new();

    assert_eq!(users.find_by_id(&scope, "ghost").await, Ok(None));
}

#[tokio::test]
async fn test_handles_for_same_path_share_cache() {
    let (store, users) = setup().await;
    let same_users: Collection<RecordingStore, User> =
        Collection::new(Arc::clone(&store), "users").unwrap();
    let scope = LoaderScope::new();

    users.find_by_id(&scope, "alice").await.unwrap();
    same_users.find_by_id(&scope, "alice").await.unwrap();

    assert_eq!(store.read_count(), 1);
    assert_eq!(scope.len(), 1);
}

#[tokio::test]
async fn test_first_handle_in_scope_fixes_chunk_size() {
    // Arrange: two handles for one path with different chunk sizes
    let store = Arc::new(RecordingStore::new());
    for i in 0..5 {
        store
            .seed("users", &format!("u{i}"), json!({"name": format!("User {i}")}))
            .await;
    }
    let narrow: Collection<RecordingStore, User> = Collection::new(Arc::clone(&store), "users")
        .unwrap()
        .with_max_in_filter_size(2);
    let wide: Collection<RecordingStore, User> = Collection::new(Arc::clone(&store), "users")
        .unwrap()
        .with_max_in_filter_size(5);
    let scope = LoaderScope::new();

    // Act
    narrow.find_by_id(&scope, "u0").await.unwrap();
    let results = wide
        .find_many(&scope, ["u1", "u2", "u3", "u4"])
        .await
        .unwrap();

    // Assert: the wide handle reuses the loader the narrow one created
    assert!(results.iter().all(|r| matches!(r, Ok(Some(_)))));
    let sizes: Vec<usize> = store.id_set_calls().iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![1, 2, 2]);

    // A fresh scope takes the size of whichever handle comes first.
    let fresh = LoaderScope::new();
    wide.find_many(&fresh, ["u0", "u1", "u2", "u3", "u4"])
        .await
        .unwrap();
    let sizes: Vec<usize> = store.id_set_calls().iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![1, 2, 2, 5]);
}

#[tokio::test]
async fn test_scopes_do_not_share_cache() {
    let (store, users) = setup().await;
    let request_a = LoaderScope::new();
    let request_b = LoaderScope::new();

    users.find_by_id(&request_a, "alice").await.unwrap();
    users.find_by_id(&request_b, "alice").await.unwrap();

    assert_eq!(store.read_count(), 2);
}

#[tokio::test]
async fn test_same_path_with_other_document_type_is_rejected() {
    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Profile {
        bio: String,
    }

    let (store, users) = setup().await;
    let profiles: Collection<RecordingStore, Profile> =
        Collection::new(Arc::clone(&store), "users").unwrap();
    let scope = LoaderScope::new();
    users.find_by_id(&scope, "alice").await.unwrap();

    let err = profiles.find_by_id(&scope, "alice").await.unwrap_err();

    assert_eq!(
        err,
        RepositoryError::Loader(LoaderError::IdentityTypeMismatch {
            identity: "users".to_string()
        })
    );
    assert_eq!(store.read_count(), 1);
}

#[tokio::test]
async fn test_backend_failure_reaches_caller_and_is_retried() {
    let (store, users) = setup().await;
    store.fail_on("alice");
    let scope = LoaderScope::new();

    let err = users.find_by_id(&scope, "alice").await.unwrap_err();
    assert!(matches!(err, RepositoryError::Storage(_)));

    users.find_by_id(&scope, "alice").await.unwrap_err();
    assert_eq!(store.read_count(), 2);
}

#[test]
fn test_new_rejects_document_path() {
    let store = Arc::new(RecordingStore::new());

    let result = Collection::<_, User>::new(store, "users/alice");

    assert!(matches!(result, Err(RepositoryError::Storage(_))));
}

// ============================================================
// Section 2: Write Coupling
// ============================================================

#[tokio::test]
async fn test_put_then_read_needs_no_backend_read() {
    // Arrange
    let (store, users) = setup().await;
    let scope = LoaderScope::new();
    let carol = Document::new("carol", user("Carol"));

    // Act
    users.put(&scope, carol.clone()).await.unwrap();
    let found = users.find_by_id(&scope, "carol").await.unwrap();

    // Assert
    assert_eq!(found, Some(carol));
    assert_eq!(store.read_count(), 0);
    assert_eq!(store.write_count(), 1);
}

#[tokio::test]
async fn test_put_replaces_previously_cached_value() {
    let (store, users) = setup().await;
    let scope = LoaderScope::new();
    users.find_by_id(&scope, "alice").await.unwrap();

    let renamed = Document::new("alice", user("Alicia"));
    users.put(&scope, renamed.clone()).await.unwrap();

    assert_eq!(users.find_by_id(&scope, "alice").await, Ok(Some(renamed)));
    assert_eq!(store.read_count(), 1);
}

#[tokio::test]
async fn test_update_fields_then_read_refetches_once() {
    // Arrange
    let (store, users) = setup().await;
    let scope = LoaderScope::new();
    users.find_by_id(&scope, "alice").await.unwrap();

    // Act
    users
        .update_fields(&scope, "alice", object(json!({"role": "admin"})), None)
        .await
        .unwrap();
    let first = users.find_by_id(&scope, "alice").await.unwrap().unwrap();
    let second = users.find_by_id(&scope, "alice").await.unwrap().unwrap();

    // Assert
    assert_eq!(first.data.role.as_deref(), Some("admin"));
    assert_eq!(first, second);
    assert_eq!(store.read_count(), 2);
}

#[tokio::test]
async fn test_merge_then_read_refetches() {
    let (store, users) = setup().await;
    let scope = LoaderScope::new();
    users.find_by_id(&scope, "bob").await.unwrap();

    users
        .merge(&scope, "bob", object(json!({"role": "editor"})))
        .await
        .unwrap();
    let bob = users.find_by_id(&scope, "bob").await.unwrap().unwrap();

    assert_eq!(bob.data.name, "Bob");
    assert_eq!(bob.data.role.as_deref(), Some("editor"));
    assert_eq!(store.read_count(), 2);
}

#[tokio::test]
async fn test_merge_fields_then_read_refetches_once() {
    // Arrange
    let (store, users) = setup().await;
    let scope = LoaderScope::new();
    users.find_by_id(&scope, "alice").await.unwrap();

    // Act: only `role` is copied from the patch
    users
        .merge_fields(
            &scope,
            "alice",
            object(json!({"name": "Ignored", "role": "owner"})),
            vec!["role".to_string()],
        )
        .await
        .unwrap();
    let first = users.find_by_id(&scope, "alice").await.unwrap().unwrap();
    let second = users.find_by_id(&scope, "alice").await.unwrap().unwrap();

    // Assert
    assert_eq!(first.data.name, "Alice");
    assert_eq!(first.data.role.as_deref(), Some("owner"));
    assert_eq!(first, second);
    assert_eq!(store.read_count(), 2);
}

#[tokio::test]
async fn test_merge_fields_with_unlisted_value_is_rejected_before_io() {
    let (store, users) = setup().await;
    let scope = LoaderScope::new();
    users.find_by_id(&scope, "alice").await.unwrap();

    let err = users
        .merge_fields(
            &scope,
            "alice",
            object(json!({"name": "Alicia"})),
            vec!["role".to_string()],
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        RepositoryError::Storage(StorageError::InvalidInput { .. })
    ));
    assert_eq!(store.write_count(), 0);
    // The cached entry survives a rejected write.
    users.find_by_id(&scope, "alice").await.unwrap();
    assert_eq!(store.read_count(), 1);
}

#[tokio::test]
async fn test_remove_then_read_sees_absence() {
    let (store, users) = setup().await;
    let scope = LoaderScope::new();
    users.find_by_id(&scope, "bob").await.unwrap();

    users.remove(&scope, "bob", None).await.unwrap();

    assert_eq!(users.find_by_id(&scope, "bob").await, Ok(None));
    assert_eq!(store.read_count(), 2);
}

#[tokio::test]
async fn test_failed_write_leaves_cache_untouched() {
    let (store, users) = setup().await;
    let scope = LoaderScope::new();
    users.find_by_id(&scope, "alice").await.unwrap();

    let err = users
        .update_fields(
            &scope,
            "alice",
            object(json!({"role": "admin"})),
            Some(Precondition::exists(false)),
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        RepositoryError::Storage(StorageError::PreconditionFailed { .. })
    ));
    let alice = users.find_by_id(&scope, "alice").await.unwrap().unwrap();
    assert_eq!(alice.data.role, None);
    assert_eq!(store.read_count(), 1);
}

#[tokio::test]
async fn test_unsupported_precondition_is_rejected_before_io() {
    let (store, users) = setup().await;
    let scope = LoaderScope::new();
    let both = Precondition {
        exists: Some(true),
        last_update_time: Some(chrono::Utc::now()),
    };

    let update = users
        .update_fields(&scope, "alice", object(json!({"role": "x"})), Some(both))
        .await;
    let remove = users.remove(&scope, "alice", Some(both)).await;

    assert!(matches!(
        update,
        Err(RepositoryError::InvalidPrecondition { .. })
    ));
    assert!(matches!(
        remove,
        Err(RepositoryError::InvalidPrecondition { .. })
    ));
    assert_eq!(store.write_count(), 0);
}

// ============================================================
// Section 3: Collection Reads and Queries
// ============================================================

#[tokio::test]
async fn test_find_all_primes_every_document() {
    let (store, users) = setup().await;
    let scope = LoaderScope::new();

    let all = users.find_all(&scope).await.unwrap();
    assert_eq!(all.len(), 2);

    let (alice, bob) = tokio::join!(
        users.find_by_id(&scope, "alice"),
        users.find_by_id(&scope, "bob"),
    );
    assert_eq!(alice.unwrap().unwrap().data.name, "Alice");
    assert_eq!(bob.unwrap().unwrap().data.name, "Bob");
    assert!(store.id_set_calls().is_empty());
}

#[tokio::test]
async fn test_run_query_primes_matching_documents() {
    let (store, users) = setup().await;
    let scope = LoaderScope::new();

    let found = users
        .run_query(&scope, Query::collection("users").where_eq("name", "Bob"))
        .await
        .unwrap();

    assert_eq!(found, vec![Document::new("bob", user("Bob"))]);
    users.find_by_id(&scope, "bob").await.unwrap();
    users.find_by_id(&scope, "alice").await.unwrap();
    assert_eq!(store.id_set_calls(), vec![vec!["alice".to_string()]]);
}

#[tokio::test]
async fn test_run_query_rejects_other_collection() {
    let (store, users) = setup().await;
    let scope = LoaderScope::new();

    let err = users
        .run_query(&scope, Query::collection("posts"))
        .await
        .unwrap_err();

    assert!(matches!(err, RepositoryError::InvalidQuery { .. }));
    assert_eq!(store.read_count(), 0);
}
