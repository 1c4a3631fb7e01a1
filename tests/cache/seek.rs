//! Forward and backward seeks.

use crate::common::stubs::StubSource;
use crate::common::test_utils::{assert_chained, numbered};
use replay_prefetch::{CacheConfig, FrameCache, Sample};
use web_time::Duration;

fn cache() -> FrameCache<u32> {
    FrameCache::new(CacheConfig::default()).unwrap()
}

#[tokio::test]
async fn forward_seek_drops_old_generation() {
    let source = StubSource::new(1.0, numbered);
    let mut cache = cache();
    cache.ensure(0.0, 10.0, source.constructor()).await.unwrap();
    let before_seek = source.issued_len();

    cache
        .ensure(100.0, 110.0, source.constructor())
        .await
        .unwrap();

    assert_eq!(cache.generation().as_u64(), 1);
    let after_seek = source.issued()[before_seek..].to_vec();
    assert_eq!(after_seek.first().map(|s| s.start_t), Some(99.0));
    assert_chained(&after_seek);

    let coverage = cache.coverage().unwrap();
    assert_eq!(coverage.first, 99.0);
    assert!(coverage.last >= 110.0);
    assert!(cache.sample(5.0).is_none());
    assert!(matches!(cache.sample(105.0), Some(Sample::Exact(_))));
}

#[tokio::test]
async fn backward_seek_refetches_from_new_low() {
    let source = StubSource::new(1.0, numbered);
    let mut cache = cache();
    cache.ensure(50.0, 60.0, source.constructor()).await.unwrap();
    let before_seek = source.issued_len();

    cache.ensure(5.0, 15.0, source.constructor()).await.unwrap();

    assert_eq!(cache.generation().as_u64(), 1);
    let after_seek = source.issued()[before_seek..].to_vec();
    assert_eq!(after_seek.first().map(|s| s.start_t), Some(4.0));
    assert_chained(&after_seek);

    for t in 5..=15 {
        assert!(cache.sample(f64::from(t)).is_some(), "t={} missing", t);
    }
    assert!(cache.sample(55.0).is_none());
}

#[tokio::test]
async fn small_step_back_within_tolerance_is_not_a_seek() {
    let source = StubSource::new(1.0, numbered);
    let mut cache = cache();
    cache.ensure(10.0, 13.0, source.constructor()).await.unwrap();
    let issued = source.issued_len();

    // The first window was fetched from one dt_hint before its low.
    cache.ensure(9.0, 12.0, source.constructor()).await.unwrap();

    assert_eq!(cache.generation().as_u64(), 0);
    assert_eq!(source.issued_len(), issued);
}

#[tokio::test]
async fn step_back_past_fetched_margin_refetches() {
    let source = StubSource::new(1.0, numbered);
    let mut cache = cache();
    cache.ensure(10.25, 13.0, source.constructor()).await.unwrap();
    assert!(cache.sample(9.5).is_none());

    cache.ensure(8.5, 12.0, source.constructor()).await.unwrap();

    assert_eq!(cache.generation().as_u64(), 1);
    let sample = cache.sample(8.5).unwrap();
    assert_eq!(sample.at_or_before().t, 8.0);
}

#[tokio::test]
async fn jump_within_lookahead_is_continuous() {
    let source = StubSource::new(1.0, numbered);
    let mut cache = cache();
    cache.ensure(0.0, 3.0, source.constructor()).await.unwrap();

    // The look-ahead queue already covers [5, 14); jumping there awaits it.
    cache.ensure(10.0, 12.0, source.constructor()).await.unwrap();

    assert_eq!(cache.generation().as_u64(), 0);
    assert!(matches!(cache.sample(11.0), Some(Sample::Exact(_))));
    assert_chained(&source.issued());
}

#[tokio::test(start_paused = true)]
async fn seek_never_applies_stale_results() {
    let source = StubSource::new(1.0, numbered);
    // The first look-ahead chunk is slow, so it is still in flight at the seek.
    source.delay_at(5.0, Duration::from_secs(30));
    let mut cache = cache();
    cache.ensure(0.0, 4.0, source.constructor()).await.unwrap();
    assert!(cache.pending_len() > 0);

    cache.ensure(200.0, 204.0, source.constructor()).await.unwrap();
    tokio::time::sleep(Duration::from_secs(60)).await;
    cache.ensure(200.0, 204.0, source.constructor()).await.unwrap();

    let frames = cache.store().frames();
    assert!(frames.iter().all(|f| f.t >= 199.0));
    assert!(frames.windows(2).all(|w| w[0].t < w[1].t));
}
