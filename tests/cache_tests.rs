use std::time::Duration;

use searchbridge::cache::TtlCache;

mod test_helpers {
    use super::*;

    pub fn minute_cache<V: Clone>(max_entries: usize) -> TtlCache<(String, usize), V> {
        TtlCache::new(max_entries, Duration::from_secs(60))
    }

    pub fn key(query: &str, n: usize) -> (String, usize) {
        (query.to_string(), n)
    }
}

use test_helpers::*;

#[tokio::test(start_paused = true)]
async fn test_miss_then_hit() {
    let cache = minute_cache::<String>(8);
    assert_eq!(cache.get(&key("rust", 5)).await, None);

    cache.set(key("rust", 5), &"result".to_string()).await;
    assert_eq!(cache.get(&key("rust", 5)).await.as_deref(), Some("result"));
}

#[tokio::test(start_paused = true)]
async fn test_composite_keys_are_distinct() {
    let cache = minute_cache::<u32>(8);
    cache.set(key("rust", 5), &1).await;
    cache.set(key("rust", 10), &2).await;

    assert_eq!(cache.get(&key("rust", 5)).await, Some(1));
    assert_eq!(cache.get(&key("rust", 10)).await, Some(2));
    assert_eq!(cache.get(&key("Rust", 5)).await, None);
}

#[tokio::test(start_paused = true)]
async fn test_returned_value_is_a_copy() {
    let cache = minute_cache::<Vec<String>>(8);
    let mut stored = vec!["a".to_string()];
    cache.set(key("q", 1), &stored).await;

    stored.push("mutated after set".to_string());
    let mut first = cache.get(&key("q", 1)).await.unwrap();
    first.push("mutated after get".to_string());

    assert_eq!(cache.get(&key("q", 1)).await, Some(vec!["a".to_string()]));
}

#[tokio::test(start_paused = true)]
async fn test_entry_expires_after_ttl() {
    let cache = minute_cache::<u32>(8);
    cache.set(key("q", 1), &7).await;

    tokio::time::advance(Duration::from_secs(59)).await;
    assert_eq!(cache.get(&key("q", 1)).await, Some(7));

    tokio::time::advance(Duration::from_secs(2)).await;
    assert_eq!(cache.get(&key("q", 1)).await, None);
    assert!(cache.is_empty().await);
}

#[tokio::test(start_paused = true)]
async fn test_read_does_not_extend_ttl() {
    let cache = minute_cache::<u32>(8);
    cache.set(key("q", 1), &7).await;

    tokio::time::advance(Duration::from_secs(40)).await;
    assert_eq!(cache.get(&key("q", 1)).await, Some(7));

    tokio::time::advance(Duration::from_secs(30)).await;
    assert_eq!(cache.get(&key("q", 1)).await, None);
}

#[tokio::test(start_paused = true)]
async fn test_overwrite_restarts_ttl() {
    let cache = minute_cache::<u32>(8);
    cache.set(key("q", 1), &1).await;
    tokio::time::advance(Duration::from_secs(40)).await;
    cache.set(key("q", 1), &2).await;
    tokio::time::advance(Duration::from_secs(40)).await;

    assert_eq!(cache.get(&key("q", 1)).await, Some(2));
}

#[tokio::test(start_paused = true)]
async fn test_least_recently_used_evicted() {
    let cache = minute_cache::<u32>(2);
    cache.set(key("a", 1), &1).await;
    cache.set(key("b", 1), &2).await;

    // touching "a" makes "b" the eviction candidate
    assert_eq!(cache.get(&key("a", 1)).await, Some(1));
    cache.set(key("c", 1), &3).await;

    assert_eq!(cache.len().await, 2);
    assert_eq!(cache.get(&key("b", 1)).await, None);
    assert_eq!(cache.get(&key("a", 1)).await, Some(1));
    assert_eq!(cache.get(&key("c", 1)).await, Some(3));
}

#[tokio::test(start_paused = true)]
async fn test_clear() {
    let cache = minute_cache::<u32>(4);
    cache.set(key("a", 1), &1).await;
    cache.set(key("b", 1), &2).await;
    cache.clear().await;

    assert!(cache.is_empty().await);
    assert_eq!(cache.get(&key("a", 1)).await, None);
}

#[tokio::test]
async fn test_concurrent_readers_and_writers() {
    let cache = std::sync::Arc::new(minute_cache::<usize>(64));

    let tasks: Vec<_> = (0..16)
        .map(|i| {
            let cache = cache.clone();
            tokio::spawn(async move {
                cache.set(key("q", i), &i).await;
                cache.get(&key("q", i)).await
            })
        })
        .collect();

    for (i, task) in tasks.into_iter().enumerate() {
        assert_eq!(task.await.unwrap(), Some(i));
    }
    assert_eq!(cache.len().await, 16);
}
