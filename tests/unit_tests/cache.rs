use fenris_nonlinear::cache::LinearizationCache;

#[test]
fn new_cache_is_empty() {
    let cache = LinearizationCache::<u32>::new();
    assert!(!cache.is_valid());
    assert_eq!(cache.get(), None);
}

#[test]
fn replace_stores_value() {
    let mut cache = LinearizationCache::new();
    assert_eq!(*cache.replace(3), 3);
    assert!(cache.is_valid());
    assert_eq!(cache.get(), Some(&3));

    cache.replace(5);
    assert_eq!(cache.get(), Some(&5));
}

#[test]
fn invalidated_value_is_not_handed_out() {
    let mut cache = LinearizationCache::new();
    cache.replace(vec![1.0, 2.0]);
    cache.invalidate();
    assert!(!cache.is_valid());
    assert_eq!(cache.get(), None);

    cache.replace(vec![3.0]);
    assert!(cache.is_valid());
    assert_eq!(cache.get(), Some(&vec![3.0]));
}
