use pagedkv::{Config, PagedKvError, TransactionalMap, UpdatableMap};

use crate::{setup_store, string_map};

fn populated() -> TransactionalMap<String, i64> {
    let (_local, store) = setup_store();
    let map = string_map(store, Config::default());
    map.put(&"a".to_string(), 1).unwrap();
    map.put(&"b".to_string(), 2).unwrap();
    map.put(&"c".to_string(), 3).unwrap();
    map.put_null(&"d".to_string()).unwrap();
    map
}

// =============================================================================
// Key View Tests
// =============================================================================

#[test]
fn test_keys_iterate_in_name_order() {
    let map = populated();

    let keys = map.keys().unwrap().to_vec().unwrap();

    assert_eq!(keys, vec!["a", "b", "c", "d"]);
}

#[test]
fn test_keys_need_a_parser() {
    let (_local, store) = setup_store();
    let map: TransactionalMap<String, i64> =
        TransactionalMap::new(store, "scores", Config::default()).unwrap();

    assert!(matches!(map.keys(), Err(PagedKvError::Unsupported(_))));
    assert!(matches!(map.entries(), Err(PagedKvError::Unsupported(_))));
    // Values never need to rebuild keys
    assert!(map.values().to_vec().unwrap().is_empty());
}

#[test]
fn test_key_iterator_remove() {
    let map = populated();
    let keys = map.keys().unwrap();

    let mut iter = keys.iter().unwrap();
    while let Some(key) = iter.next() {
        if key.unwrap() == "b" {
            iter.remove().unwrap();
        }
    }

    assert!(!map.contains_key(&"b".to_string()).unwrap());
    assert_eq!(map.len().unwrap(), 3);
}

#[test]
fn test_iterator_remove_needs_current_item() {
    let map = populated();
    let keys = map.keys().unwrap();
    let mut iter = keys.iter().unwrap();

    assert!(matches!(iter.remove(), Err(PagedKvError::IllegalState(_))));

    iter.next().unwrap().unwrap();
    iter.remove().unwrap();
    assert!(matches!(iter.remove(), Err(PagedKvError::IllegalState(_))));
}

#[test]
fn test_key_set_remove_and_retain() {
    let map = populated();
    let keys = map.keys().unwrap();

    assert!(keys.remove(&"a".to_string()).unwrap());
    assert!(!keys.remove(&"a".to_string()).unwrap());

    assert!(keys.retain(|k| k.as_str() != "c").unwrap());
    assert!(!keys.retain(|_| true).unwrap());

    assert_eq!(keys.to_vec().unwrap(), vec!["b", "d"]);
    assert!(keys.contains(&"b".to_string()).unwrap());
    assert_eq!(keys.len().unwrap(), 2);
}

#[test]
fn test_unparseable_name_surfaces_invalid_key() {
    let (_local, store) = setup_store();
    let by_name = string_map(store.clone(), Config::default());
    by_name.put(&"not-a-number".to_string(), 1).unwrap();

    let by_id: TransactionalMap<u32, i64> = TransactionalMap::new(store, "scores", Config::default())
        .unwrap()
        .with_key_parser(pagedkv::KeyParser::via_from_str());

    let keys = by_id.keys().unwrap();
    let first = keys.iter().unwrap().next().unwrap();
    assert!(matches!(first, Err(PagedKvError::InvalidKey(name)) if name == "not-a-number"));
}

// =============================================================================
// Value View Tests
// =============================================================================

#[test]
fn test_values_include_nulls() {
    let map = populated();

    let values = map.values().to_vec().unwrap();

    assert_eq!(values, vec![Some(1), Some(2), Some(3), None]);
}

#[test]
fn test_values_remove_every_match() {
    let map = populated();
    map.put(&"e".to_string(), 2).unwrap();
    let values = map.values();

    assert!(values.remove(Some(&2)).unwrap());

    assert!(!values.contains(&2).unwrap());
    assert_eq!(map.len().unwrap(), 3);

    assert!(values.remove(None).unwrap());
    assert!(!map.contains_key(&"d".to_string()).unwrap());
}

#[test]
fn test_value_iterator_remove() {
    let map = populated();
    let values = map.values();

    let mut iter = values.iter().unwrap();
    while let Some(value) = iter.next() {
        if value.unwrap() == Some(3) {
            iter.remove().unwrap();
        }
    }

    assert!(!map.contains_key(&"c".to_string()).unwrap());
}

// =============================================================================
// Entry View Tests
// =============================================================================

#[test]
fn test_entries_to_vec() {
    let map = populated();

    let entries = map.entries().unwrap().to_vec().unwrap();

    assert_eq!(
        entries,
        vec![
            ("a".to_string(), Some(1)),
            ("b".to_string(), Some(2)),
            ("c".to_string(), Some(3)),
            ("d".to_string(), None),
        ]
    );
}

#[test]
fn test_entry_set_contains_and_remove() {
    let map = populated();
    let entries = map.entries().unwrap();

    assert!(entries.contains(&"a".to_string(), Some(&1)).unwrap());
    assert!(!entries.contains(&"a".to_string(), Some(&2)).unwrap());
    assert!(entries.contains(&"d".to_string(), None).unwrap());
    assert!(!entries.contains(&"zz".to_string(), None).unwrap());

    assert!(!entries.remove(&"a".to_string(), Some(&2)).unwrap());
    assert!(entries.remove(&"a".to_string(), Some(&1)).unwrap());
    assert!(!map.contains_key(&"a".to_string()).unwrap());
}

#[test]
fn test_entry_set_value_writes_through() {
    let map = populated();
    let entries = map.entries().unwrap();

    for entry in entries.iter().unwrap() {
        let entry = entry.unwrap();
        if let Some(n) = entry.value().unwrap() {
            entry.set_value(n * 10).unwrap();
        }
    }

    assert_eq!(map.get(&"b".to_string()).unwrap(), Some(20));
    assert_eq!(map.get(&"d".to_string()).unwrap(), None);
}

#[test]
fn test_entry_set_retain() {
    let map = populated();
    let entries = map.entries().unwrap();

    entries.retain(|_, v| v.is_some_and(|n| *n > 1)).unwrap();

    assert_eq!(map.keys().unwrap().to_vec().unwrap(), vec!["b", "c"]);
}

#[test]
fn test_view_clear_empties_map() {
    let map = populated();

    map.values().clear().unwrap();

    assert!(map.is_empty().unwrap());
}
