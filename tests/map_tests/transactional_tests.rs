use pagedkv::{Config, PagedKvError, TransactionalMap, UpdatableMap};

use crate::{setup_store, string_map};

fn key(name: &str) -> String {
    name.to_string()
}

// =============================================================================
// Basic Operations Tests
// =============================================================================

#[test]
fn test_put_returns_previous_value() {
    let (_local, store) = setup_store();
    let map = string_map(store, Config::default());

    assert_eq!(map.put(&key("a"), 1).unwrap(), None);
    assert_eq!(map.put(&key("a"), 2).unwrap(), Some(1));
    assert_eq!(map.get(&key("a")).unwrap(), Some(2));
}

#[test]
fn test_get_missing_key() {
    let (_local, store) = setup_store();
    let map = string_map(store, Config::default());

    assert_eq!(map.get(&key("missing")).unwrap(), None);
    assert!(!map.contains_key(&key("missing")).unwrap());
}

#[test]
fn test_null_is_distinct_from_absent() {
    let (_local, store) = setup_store();
    let map = string_map(store, Config::default());

    map.put_null(&key("n")).unwrap();

    assert_eq!(map.get(&key("n")).unwrap(), None);
    assert!(map.contains_key(&key("n")).unwrap());
    assert_eq!(map.len().unwrap(), 1);
}

#[test]
fn test_remove_returns_previous_value() {
    let (_local, store) = setup_store();
    let map = string_map(store, Config::default());

    map.put(&key("a"), 7).unwrap();
    assert_eq!(map.remove(&key("a")).unwrap(), Some(7));
    assert_eq!(map.remove(&key("a")).unwrap(), None);
    assert!(!map.contains_key(&key("a")).unwrap());
}

#[test]
fn test_len_and_is_empty() {
    let (_local, store) = setup_store();
    let map = string_map(store, Config::default());
    assert!(map.is_empty().unwrap());

    map.put_all(vec![(key("a"), 1), (key("b"), 2), (key("c"), 3)])
        .unwrap();

    assert_eq!(map.len().unwrap(), 3);
    assert!(!map.is_empty().unwrap());
    assert!(map.contains_value(&2).unwrap());
    assert!(!map.contains_value(&4).unwrap());
}

#[test]
fn test_maps_with_different_kinds_are_isolated() {
    let (_local, store) = setup_store();
    let scores = string_map(store.clone(), Config::default());
    let other: TransactionalMap<String, i64> =
        TransactionalMap::new(store, "other", Config::default()).unwrap();

    scores.put(&key("a"), 1).unwrap();

    assert_eq!(other.get(&key("a")).unwrap(), None);
    assert_eq!(other.len().unwrap(), 0);
}

#[test]
fn test_empty_kind_is_rejected() {
    let (_local, store) = setup_store();
    let result: pagedkv::Result<TransactionalMap<String, i64>> =
        TransactionalMap::new(store, "", Config::default());

    assert!(matches!(result, Err(PagedKvError::Config(_))));
}

// =============================================================================
// Update Tests
// =============================================================================

#[test]
fn test_update_existing_value() {
    let (_local, store) = setup_store();
    let map = string_map(store, Config::default());
    map.put(&key("counter"), 10).unwrap();

    let updated = map.update(&key("counter"), |v| v.map(|n| n + 5)).unwrap();

    assert_eq!(updated, Some(15));
    assert_eq!(map.get(&key("counter")).unwrap(), Some(15));
}

#[test]
fn test_update_absent_key_does_not_insert() {
    let (_local, store) = setup_store();
    let map = string_map(store, Config::default());

    let mut called = false;
    let updated = map
        .update(&key("ghost"), |_| {
            called = true;
            Some(1)
        })
        .unwrap();

    assert_eq!(updated, None);
    assert!(!called);
    assert!(!map.contains_key(&key("ghost")).unwrap());
}

#[test]
fn test_update_to_null() {
    let (_local, store) = setup_store();
    let map = string_map(store, Config::default());
    map.put(&key("a"), 1).unwrap();

    assert_eq!(map.update(&key("a"), |_| None).unwrap(), None);
    assert!(map.contains_key(&key("a")).unwrap());
}

#[test]
fn test_remove_if_matches_current_value() {
    let (_local, store) = setup_store();
    let map = string_map(store, Config::default());
    map.put(&key("a"), 1).unwrap();

    assert!(!map.remove_if(&key("a"), Some(&2)).unwrap());
    assert!(map.contains_key(&key("a")).unwrap());

    assert!(map.remove_if(&key("a"), Some(&1)).unwrap());
    assert!(!map.contains_key(&key("a")).unwrap());
}

// =============================================================================
// Retry Tests
// =============================================================================

#[test]
fn test_put_survives_conflicts_within_budget() {
    let (local, store) = setup_store();
    let map = string_map(store, Config::default());

    // 4 retries = 5 attempts; the fifth commits
    local.fail_next_commits(4);
    map.put(&key("a"), 1).unwrap();

    assert_eq!(map.get(&key("a")).unwrap(), Some(1));
    assert_eq!(local.stats().conflicts, 4);
}

#[test]
fn test_put_fails_after_retry_budget() {
    let (local, store) = setup_store();
    let map = string_map(store, Config::default());

    local.fail_next_commits(5);
    let err = map.put(&key("a"), 1).unwrap_err();

    assert!(err.is_conflict());
    assert!(matches!(err, PagedKvError::Conflict { attempts: 5 }));
    assert!(!map.contains_key(&key("a")).unwrap());
}

#[test]
fn test_max_retries_is_honoured() {
    let (local, store) = setup_store();
    let map = string_map(store, Config::builder().max_retries(0).build());

    local.fail_next_commits(1);
    let err = map.put(&key("b"), 1).unwrap_err();
    assert!(matches!(err, PagedKvError::Conflict { attempts: 1 }));

    map.put(&key("b"), 2).unwrap();
    assert_eq!(map.get(&key("b")).unwrap(), Some(2));
}

#[test]
fn test_concurrent_updates_are_not_lost() {
    let (_local, store) = setup_store();
    let map = string_map(store, Config::default());
    map.put(&key("counter"), 0).unwrap();

    crossbeam::scope(|s| {
        for _ in 0..4 {
            s.spawn(|_| {
                for _ in 0..25 {
                    loop {
                        match map.update(&key("counter"), |v| v.map(|n| n + 1)) {
                            Ok(_) => break,
                            Err(e) if e.is_conflict() => continue,
                            Err(e) => panic!("unexpected error: {}", e),
                        }
                    }
                }
            });
        }
    })
    .unwrap();

    assert_eq!(map.get(&key("counter")).unwrap(), Some(100));
}

// =============================================================================
// Write Mode Tests
// =============================================================================

#[test]
fn test_fire_and_forget_returns_none() {
    let (local, store) = setup_store();
    let map = string_map(store, Config::builder().fast().build());

    assert_eq!(map.put(&key("a"), 1).unwrap(), None);
    assert_eq!(map.put(&key("a"), 2).unwrap(), None);
    assert_eq!(map.get(&key("a")).unwrap(), Some(2));

    assert_eq!(map.remove(&key("a")).unwrap(), None);
    assert!(!map.contains_key(&key("a")).unwrap());

    assert_eq!(local.stats().commits, 0);
}

// =============================================================================
// Clear Tests
// =============================================================================

#[test]
fn test_clear_removes_everything_in_batches() {
    let (_local, store) = setup_store();
    let map = string_map(store, Config::builder().delete_batch_size(3).build());
    map.put_all((0..10).map(|i| (format!("k{:02}", i), i))).unwrap();

    map.clear().unwrap();

    assert!(map.is_empty().unwrap());
}

#[test]
fn test_clear_swallows_batch_timeout() {
    let (local, store) = setup_store();
    let map = string_map(store, Config::builder().delete_batch_size(2).build());
    map.put_all((0..5).map(|i| (format!("k{}", i), i))).unwrap();

    local.time_out_next_batch_deletes(1);
    map.clear().unwrap();

    // The first batch of two timed out and was not retried
    assert_eq!(map.len().unwrap(), 2);
    assert!(map.contains_key(&key("k0")).unwrap());
    assert!(map.contains_key(&key("k1")).unwrap());
}

#[test]
fn test_clear_swallows_timeout_on_last_batch() {
    let (local, store) = setup_store();
    let map = string_map(store, Config::default());
    map.put(&key("only"), 1).unwrap();

    local.time_out_next_batch_deletes(1);
    map.clear().unwrap();

    assert_eq!(map.len().unwrap(), 1);
}
