use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use futures::future::join_all;
use pretty_assertions::assert_eq;
use prayer_ai_cache::{FlowCache, FlowCacheConfig, FlowError, FlowOptions};
use serde_json::json;
use tokio::time::sleep;

/// Producer that takes a while, so that concurrent callers overlap
async fn slow<T>(calls: Arc<AtomicUsize>, delay: Duration, value: T) -> anyhow::Result<T> {
    calls.fetch_add(1, Ordering::SeqCst);
    sleep(delay).await;
    Ok(value)
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_identical_calls_share_one_invocation() {
    let cache = FlowCache::default();
    let calls = Arc::new(AtomicUsize::new(0));
    let params = json!({ "text": "healing for my mother" });

    let flows = (0..5).map(|_| {
        cache.execute_flow(
            "extractPrayerPoints",
            || slow(calls.clone(), Duration::from_millis(200), vec!["healing".to_string()]),
            &params,
            FlowOptions::default(),
        )
    });
    let results: Vec<Result<Vec<String>, FlowError>> = join_all(flows).await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    for result in results {
        assert_eq!(result.unwrap(), vec!["healing".to_string()]);
    }

    let stats = cache.stats();
    assert_eq!(stats.coalesced, 4);
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.in_flight, 0);
    assert_eq!(cache.rate_window("extractPrayerPoints").unwrap().current_count, 1);
}

#[tokio::test(start_paused = true)]
async fn test_followers_share_the_leader_error() {
    let cache = FlowCache::default();
    let calls = Arc::new(AtomicUsize::new(0));
    let params = json!({});

    let flows = (0..3).map(|_| {
        let calls = calls.clone();
        cache.execute_flow::<String, _, _, _, _>(
            "transcribeAudio",
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                sleep(Duration::from_millis(50)).await;
                Err(anyhow!("daily quota exceeded for this project"))
            },
            &params,
            FlowOptions::default(),
        )
    });

    for result in join_all(flows).await {
        assert!(matches!(result, Err(FlowError::QuotaExhausted { .. })));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(!cache.contains("transcribeAudio", &params).unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_coalescing_can_be_disabled() {
    let cache = FlowCache::new(FlowCacheConfig {
        coalesce_in_flight: false,
        ..FlowCacheConfig::default()
    })
    .unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let params = json!({});

    let flows = (0..3).map(|_| {
        cache.execute_flow("op", || slow(calls.clone(), Duration::from_millis(10), 1u32), &params, FlowOptions::default())
    });
    let results: Vec<Result<u32, FlowError>> = join_all(flows).await;

    assert!(results.into_iter().all(|r| r.is_ok()));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(cache.stats().coalesced, 0);
    assert_eq!(cache.stats().entries, 1, "last writer wins");
}

#[tokio::test(start_paused = true)]
async fn test_skip_rate_limit_calls_do_not_join_in_flight_calls() {
    let cache = FlowCache::default();
    let calls = Arc::new(AtomicUsize::new(0));
    let params = json!({ "text": "thanks for a safe trip" });

    let leader = cache.execute_flow(
        "categorizePrayer",
        || slow(calls.clone(), Duration::from_millis(100), "gratitude".to_string()),
        &params,
        FlowOptions::default(),
    );
    let unlimited = cache.execute_flow(
        "categorizePrayer",
        || slow(calls.clone(), Duration::from_millis(100), "gratitude".to_string()),
        &params,
        FlowOptions::default().skip_rate_limit(),
    );
    let (leader, unlimited) = tokio::join!(leader, unlimited);

    assert_eq!(leader.unwrap(), "gratitude");
    assert_eq!(unlimited.unwrap(), "gratitude");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(cache.stats().coalesced, 0);
    assert_eq!(cache.rate_window("categorizePrayer").unwrap().current_count, 1);
}

#[tokio::test(start_paused = true)]
async fn test_abandoned_leader_does_not_wedge_followers() {
    prayer_monitoring::logging::init_test_tracing();
    let cache = FlowCache::default();
    let calls = Arc::new(AtomicUsize::new(0));
    let params = json!({ "date": "2024-06-01" });

    let leader = tokio::spawn({
        let cache = cache.clone();
        let calls = calls.clone();
        let params = params.clone();
        async move {
            cache
                .execute_flow(
                    "dailyVerse",
                    || slow(calls, Duration::from_secs(60), "leader".to_string()),
                    &params,
                    FlowOptions::default(),
                )
                .await
        }
    });

    while cache.stats().in_flight == 0 {
        tokio::task::yield_now().await;
    }

    let follower = cache.execute_flow(
        "dailyVerse",
        || slow(calls.clone(), Duration::from_millis(10), "follower".to_string()),
        &params,
        FlowOptions::default(),
    );
    let abort = async {
        sleep(Duration::from_secs(1)).await;
        leader.abort();
        leader.await
    };

    let (result, leader_result) = tokio::join!(follower, abort);

    assert_eq!(result.unwrap(), "follower");
    assert!(leader_result.unwrap_err().is_cancelled());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(cache.stats().in_flight, 0);
}

#[tokio::test(start_paused = true)]
async fn test_started_cache_sweeps_in_background() {
    let cache = FlowCache::start(FlowCacheConfig {
        default_ttl_ms: 500,
        sweep_interval_ms: 1_000,
        ..FlowCacheConfig::default()
    })
    .unwrap();

    for n in 0..3u32 {
        let _: u32 = cache
            .execute_flow("op", || async move { Ok::<_, anyhow::Error>(n) }, &json!({ "n": n }), FlowOptions::default())
            .await
            .unwrap();
    }
    let _: u32 = cache
        .execute_flow(
            "op",
            || async { Ok::<_, anyhow::Error>(42) },
            &json!({ "n": 42 }),
            FlowOptions::default().with_ttl(Duration::from_secs(10)),
        )
        .await
        .unwrap();
    assert_eq!(cache.stats().entries, 4);

    sleep(Duration::from_millis(1_100)).await;
    assert_eq!(cache.stats().entries, 1, "expired entries are swept without being read");
    assert!(cache.contains("op", &json!({ "n": 42 })).unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_sweeper_stops_with_the_cache() {
    let cache = FlowCache::new(FlowCacheConfig {
        sweep_interval_ms: 1_000,
        ..FlowCacheConfig::default()
    })
    .unwrap();
    let handle = cache.spawn_sweeper();

    sleep(Duration::from_millis(1_500)).await;
    assert!(!handle.is_finished());

    drop(cache);
    sleep(Duration::from_millis(1_000)).await;
    assert!(handle.is_finished());
}

#[tokio::test]
async fn test_start_rejects_invalid_config() {
    let result = FlowCache::start(FlowCacheConfig {
        default_ttl_ms: 0,
        ..FlowCacheConfig::default()
    });
    assert!(matches!(result, Err(FlowError::InvalidConfig(_))));

    let result = FlowCache::start(FlowCacheConfig {
        sweep_interval_ms: 0,
        ..FlowCacheConfig::default()
    });
    assert!(matches!(result, Err(FlowError::InvalidConfig(_))));
}
