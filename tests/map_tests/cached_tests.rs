use std::sync::Arc;
use std::thread;
use std::time::Duration;

use pagedkv::map::KeyParser;
use pagedkv::{
    CacheStore, CachedMap, Config, EntityStore, LocalEntityStore, MemoryCacheStore, PagedKvError,
    Result, TransactionalMap, UpdatableMap,
};

use crate::setup_store;

fn cached_map(
    store: Arc<dyn EntityStore>,
    config: Config,
) -> (Arc<MemoryCacheStore>, CachedMap<String, i64>) {
    let cache = Arc::new(MemoryCacheStore::new());
    let inner = TransactionalMap::new(store, "scores", config)
        .unwrap()
        .with_key_parser(KeyParser::via_from_str());
    (cache.clone(), CachedMap::new(inner, cache))
}

fn key(name: &str) -> String {
    name.to_string()
}

/// Store gets caused by `f`
fn gets_during(local: &LocalEntityStore, f: impl FnOnce()) -> u64 {
    let before = local.stats().gets;
    f();
    local.stats().gets - before
}

/// A cache whose every call fails
struct BrokenCache;

impl CacheStore for BrokenCache {
    fn get(&self, _key: &str) -> Result<Option<Vec<u8>>> {
        Err(PagedKvError::Store("cache down".to_string()))
    }

    fn put(&self, _key: &str, _value: Vec<u8>, _ttl: Option<Duration>) -> Result<()> {
        Err(PagedKvError::Store("cache down".to_string()))
    }

    fn remove(&self, _key: &str) -> Result<bool> {
        Err(PagedKvError::Store("cache down".to_string()))
    }

    fn remove_all(&self, _keys: &[String]) -> Result<()> {
        Err(PagedKvError::Store("cache down".to_string()))
    }

    fn clear(&self) -> Result<()> {
        Err(PagedKvError::Store("cache down".to_string()))
    }

    fn contains_key(&self, _key: &str) -> Result<bool> {
        Err(PagedKvError::Store("cache down".to_string()))
    }

    fn item_count(&self) -> Result<u64> {
        Err(PagedKvError::Store("cache down".to_string()))
    }
}

// =============================================================================
// Read-Through Tests
// =============================================================================

#[test]
fn test_get_populates_cache() {
    let (local, store) = setup_store();
    let (cache, map) = cached_map(store, Config::default());
    map.put(&key("a"), 1).unwrap();

    let first = gets_during(&local, || assert_eq!(map.get(&key("a")).unwrap(), Some(1)));
    let second = gets_during(&local, || assert_eq!(map.get(&key("a")).unwrap(), Some(1)));

    assert_eq!(first, 1);
    assert_eq!(second, 0);
    assert!(cache.contains_key("scores:a").unwrap());
}

#[test]
fn test_cached_null_is_a_hit() {
    let (local, store) = setup_store();
    let (_cache, map) = cached_map(store, Config::default());
    map.put_null(&key("n")).unwrap();

    map.get(&key("n")).unwrap();
    let gets = gets_during(&local, || assert_eq!(map.get(&key("n")).unwrap(), None));

    assert_eq!(gets, 0);
}

#[test]
fn test_absent_key_is_not_cached() {
    let (_local, store) = setup_store();
    let (cache, map) = cached_map(store, Config::default());

    assert_eq!(map.get(&key("ghost")).unwrap(), None);

    assert_eq!(cache.item_count().unwrap(), 0);
}

#[test]
fn test_contains_key_short_circuits_on_cache_hit() {
    let (local, store) = setup_store();
    let (_cache, map) = cached_map(store, Config::default());
    map.put(&key("a"), 1).unwrap();
    map.get(&key("a")).unwrap();

    let gets = gets_during(&local, || assert!(map.contains_key(&key("a")).unwrap()));

    assert_eq!(gets, 0);
}

// =============================================================================
// Invalidation Tests
// =============================================================================

#[test]
fn test_put_invalidates_instead_of_overwriting() {
    let (_local, store) = setup_store();
    let (cache, map) = cached_map(store, Config::default());
    map.put(&key("a"), 1).unwrap();
    map.get(&key("a")).unwrap();

    assert_eq!(map.put(&key("a"), 2).unwrap(), Some(1));

    assert!(!cache.contains_key("scores:a").unwrap());
    assert_eq!(map.get(&key("a")).unwrap(), Some(2));
}

#[test]
fn test_remove_and_update_invalidate() {
    let (_local, store) = setup_store();
    let (cache, map) = cached_map(store, Config::default());
    map.put(&key("a"), 1).unwrap();
    map.put(&key("b"), 1).unwrap();
    map.get(&key("a")).unwrap();
    map.get(&key("b")).unwrap();

    map.update(&key("a"), |v| v.map(|n| n + 1)).unwrap();
    map.remove(&key("b")).unwrap();

    assert!(!cache.contains_key("scores:a").unwrap());
    assert!(!cache.contains_key("scores:b").unwrap());
    assert_eq!(map.get(&key("a")).unwrap(), Some(2));
    assert_eq!(map.get(&key("b")).unwrap(), None);
}

#[test]
fn test_put_all_invalidates_every_key() {
    let (_local, store) = setup_store();
    let (cache, map) = cached_map(store, Config::default());
    map.put(&key("a"), 1).unwrap();
    map.get(&key("a")).unwrap();

    map.put_all(vec![(key("a"), 10), (key("b"), 20)]).unwrap();

    assert!(!cache.contains_key("scores:a").unwrap());
    assert_eq!(map.get(&key("a")).unwrap(), Some(10));
}

#[test]
fn test_iterator_remove_invalidates() {
    let (_local, store) = setup_store();
    let (cache, map) = cached_map(store, Config::default());
    map.put(&key("a"), 1).unwrap();
    map.get(&key("a")).unwrap();

    let keys = map.keys().unwrap();
    let mut iter = keys.iter().unwrap();
    iter.next().unwrap().unwrap();
    iter.remove().unwrap();

    assert!(!cache.contains_key("scores:a").unwrap());
    assert_eq!(map.get(&key("a")).unwrap(), None);
}

#[test]
fn test_clear_empties_store_and_cache() {
    let (_local, store) = setup_store();
    let (cache, map) = cached_map(store, Config::default());
    map.put(&key("a"), 1).unwrap();
    map.get(&key("a")).unwrap();

    map.clear().unwrap();

    assert!(map.is_empty().unwrap());
    assert_eq!(cache.item_count().unwrap(), 0);
}

#[test]
fn test_cache_ttl_applies_to_populated_entries() {
    let (_local, store) = setup_store();
    let config = Config::builder().cache_ttl(Duration::from_millis(20)).build();
    let (cache, map) = cached_map(store, config);
    map.put(&key("a"), 1).unwrap();
    map.get(&key("a")).unwrap();

    thread::sleep(Duration::from_millis(50));

    assert!(!cache.contains_key("scores:a").unwrap());
    assert_eq!(map.get(&key("a")).unwrap(), Some(1));
}

// =============================================================================
// Degraded Cache Tests
// =============================================================================

#[test]
fn test_cache_failures_do_not_fail_map_operations() {
    let (_local, store) = setup_store();
    let inner: TransactionalMap<String, i64> = TransactionalMap::new(store, "scores", Config::default())
        .unwrap()
        .with_key_parser(KeyParser::via_from_str());
    let map = CachedMap::new(inner, Arc::new(BrokenCache));

    assert_eq!(map.put(&key("a"), 1).unwrap(), None);
    assert_eq!(map.get(&key("a")).unwrap(), Some(1));
    assert!(map.contains_key(&key("a")).unwrap());
    assert_eq!(map.remove(&key("a")).unwrap(), Some(1));
    map.clear().unwrap();
}
