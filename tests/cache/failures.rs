//! Fetch failures, retries and timeouts.

use crate::common::stubs::StubSource;
use crate::common::test_utils::numbered;
use replay_prefetch::{CacheConfig, FrameCache, ReplayError};
use web_time::Duration;

fn cache() -> FrameCache<u32> {
    FrameCache::new(CacheConfig::default()).unwrap()
}

fn starts_at(source: &StubSource<u32>, start_t: f64) -> usize {
    source
        .issued()
        .iter()
        .filter(|s| s.start_t == start_t)
        .count()
}

#[tokio::test]
async fn failed_chunk_is_retried_on_next_ensure() {
    let source = StubSource::new(1.0, numbered);
    source.fail_once_at(2.0);
    let mut cache = cache();

    let err = cache
        .ensure(0.0, 4.0, source.constructor())
        .await
        .unwrap_err();
    assert_eq!(err, ReplayError::fetch_failed(2.0, 5.0, "stub failure"));
    assert!(cache.sample(1.0).is_some(), "earlier frames must be kept");
    assert_eq!(cache.pending_len(), 0);

    cache.ensure(0.0, 4.0, source.constructor()).await.unwrap();
    assert!(cache.sample(4.0).is_some());
    assert_eq!(starts_at(&source, 2.0), 2);
}

#[tokio::test]
async fn outage_recovers_once_source_is_back() {
    let source = StubSource::new(1.0, numbered);
    source.set_failing(true);
    let mut cache = cache();

    for _ in 0..3 {
        let err = cache
            .ensure(0.0, 2.0, source.constructor())
            .await
            .unwrap_err();
        assert!(err.is_fetch_error());
        assert!(cache.is_empty());
    }

    source.set_failing(false);
    cache.ensure(0.0, 2.0, source.constructor()).await.unwrap();
    assert!(cache.sample(2.0).is_some());
}

#[tokio::test]
async fn failure_drops_queued_lookahead() {
    let source = StubSource::new(1.0, numbered);
    // The first look-ahead chunk starts at 5; it is issued now but awaited later.
    source.fail_once_at(5.0);
    let mut cache = cache();
    cache.ensure(0.0, 2.0, source.constructor()).await.unwrap();
    assert_eq!(cache.pending_len(), 3);

    let err = cache.ensure(5.0, 6.0, source.constructor()).await;
    assert!(err.is_err());
    assert_eq!(cache.pending_len(), 0);
    assert_eq!(cache.cursor(), Some(5.0));

    source.clear_issued();
    cache.ensure(5.0, 6.0, source.constructor()).await.unwrap();
    assert_eq!(source.issued().first().map(|s| s.start_t), Some(5.0));
}

#[tokio::test(start_paused = true)]
async fn slow_chunk_times_out() {
    let source = StubSource::new(1.0, numbered);
    source.delay_at(2.0, Duration::from_secs(30));
    let config = CacheConfig {
        fetch_timeout: Some(Duration::from_secs(1)),
        ..CacheConfig::default()
    };
    let mut cache: FrameCache<u32> = FrameCache::new(config).unwrap();

    let err = cache
        .ensure(0.0, 4.0, source.constructor())
        .await
        .unwrap_err();
    assert_eq!(
        err,
        ReplayError::FetchTimeout {
            start_t: 2.0,
            end_t: 5.0,
            timeout: Duration::from_secs(1),
        }
    );
    assert!(cache.sample(1.0).is_some());
    assert!(cache.sample(2.0).is_none());
}

#[tokio::test(start_paused = true)]
async fn delay_within_timeout_succeeds() {
    let source = StubSource::new(1.0, numbered);
    source.delay_at(-1.0, Duration::from_millis(500));
    let config = CacheConfig {
        fetch_timeout: Some(Duration::from_secs(1)),
        ..CacheConfig::default()
    };
    let mut cache: FrameCache<u32> = FrameCache::new(config).unwrap();

    cache.ensure(0.0, 2.0, source.constructor()).await.unwrap();
    assert!(cache.sample(1.0).is_some());
}

#[tokio::test(start_paused = true)]
async fn slow_early_chunk_is_still_applied_first() {
    let source = StubSource::new(1.0, numbered);
    source.delay_at(-1.0, Duration::from_secs(5));
    source.delay_at(2.0, Duration::from_millis(10));
    let mut cache = cache();

    cache.ensure(0.0, 5.0, source.constructor()).await.unwrap();

    let times: Vec<f64> = cache.store().frames().iter().map(|f| f.t).collect();
    let expected: Vec<f64> = (-1..=7).map(f64::from).collect();
    assert_eq!(times, expected);
}
