//! Coverage, idempotence and eviction.

use std::sync::Arc;

use crate::common::stubs::StubSource;
use crate::common::test_utils::{assert_chained, init_tracing, numbered};
use replay_prefetch::telemetry::{CollectingObserver, ViolationKind};
use replay_prefetch::{create_requests, CacheConfig, FrameCache, Sample, SpatialBound};

fn cache() -> FrameCache<u32> {
    FrameCache::new(CacheConfig::default()).unwrap()
}

#[tokio::test]
async fn window_is_fully_covered() {
    init_tracing();
    let source = StubSource::new(1.0, numbered);
    let mut cache = cache();
    cache.ensure(0.0, 10.0, source.constructor()).await.unwrap();

    for t in 0..=10 {
        let sample = cache.sample(f64::from(t));
        assert!(
            matches!(sample, Some(Sample::Exact(frame)) if frame.data == vec![t as u32]),
            "t={} not covered",
            t
        );
    }
    assert_chained(&source.issued());
}

#[tokio::test]
async fn first_ensure_issues_window_plus_lookahead() {
    let source = StubSource::new(1.0, numbered);
    let mut cache = cache();
    cache.ensure(0.0, 10.0, source.constructor()).await.unwrap();

    let starts: Vec<f64> = source.issued().iter().map(|s| s.start_t).collect();
    assert_eq!(starts, vec![-1.0, 2.0, 5.0, 8.0, 11.0, 14.0, 17.0]);
    assert_eq!(cache.pending_len(), 3);
}

#[tokio::test]
async fn fractional_low_is_bracketed() {
    let source = StubSource::new(1.0, numbered);
    let mut cache = cache();
    cache.ensure(0.5, 3.0, source.constructor()).await.unwrap();

    let sample = cache.sample(0.5).unwrap();
    assert_eq!(sample.at_or_before().t, 0.0);
    assert_eq!(sample.after().map(|f| f.t), Some(1.0));

    cache.ensure(100.5, 110.0, source.constructor()).await.unwrap();
    assert_eq!(cache.generation().as_u64(), 1);
    for t in [100.5, 100.7, 105.0, 110.0] {
        assert!(cache.sample(t).is_some(), "t={} not sampleable", t);
    }
}

#[tokio::test]
async fn repeated_window_issues_nothing() {
    let source = StubSource::new(1.0, numbered);
    let mut cache = cache();
    cache.ensure(4.0, 7.0, source.constructor()).await.unwrap();
    let issued = source.issued_len();

    for _ in 0..5 {
        cache.ensure(4.0, 7.0, source.constructor()).await.unwrap();
    }
    assert_eq!(source.issued_len(), issued);
}

#[tokio::test]
async fn continuous_playback_stays_bounded_and_chained() {
    let source = StubSource::new(1.0, numbered);
    let mut cache = cache();

    for step in 0..200 {
        let t = f64::from(step) * 0.5;
        cache
            .ensure(t - 1.0, t + 2.0, source.constructor())
            .await
            .unwrap();

        let coverage = cache.coverage().unwrap();
        assert!(coverage.first >= t - 2.0, "t={} kept {:?}", t, coverage);
        assert!(cache.sample(t).is_some(), "t={} not sampleable", t);
        assert!(cache.len() <= 12, "t={} holds {} frames", t, cache.len());
    }

    assert_eq!(cache.generation().as_u64(), 0);
    let issued = source.issued();
    assert_chained(&issued);
    for pair in issued.windows(2) {
        assert!(!pair[0].overlaps(&pair[1]));
    }
}

#[tokio::test]
async fn sparse_data_uses_dt_hint() {
    let source = StubSource::new(5.0, numbered);
    let mut cache: FrameCache<u32> = FrameCache::new(CacheConfig::road_status(5.0)).unwrap();
    // Players ensure from one dt_hint before the query time.
    cache.ensure(7.0, 13.0, source.constructor()).await.unwrap();

    let sample = cache.sample(12.0).unwrap();
    assert_eq!(sample.at_or_before().t, 10.0);
    assert_eq!(sample.after().map(|f| f.t), Some(15.0));
    assert!((sample.ratio(12.0) - 0.4).abs() < 1e-12);
}

#[tokio::test]
async fn data_end_leaves_window_partially_empty() {
    let source = StubSource::new(1.0, numbered).with_data_end(5.0);
    let mut cache = cache();
    cache.ensure(3.0, 8.0, source.constructor()).await.unwrap();

    assert!(cache.sample(4.0).is_some());
    assert!(cache.sample(6.0).is_none());
    assert_eq!(cache.latest_at(6.0).map(|f| f.t), Some(4.0));
}

#[tokio::test]
async fn bound_is_passed_through_unchanged() {
    let source = StubSource::new(1.0, numbered);
    let bound = SpatialBound::new(116.3, 39.9, 116.5, 40.1);
    let mut cache = cache();
    cache
        .ensure(0.0, 4.0, |start, count, len| {
            create_requests(&source, start, count, len, Some(bound))
        })
        .await
        .unwrap();

    let bounds = source.bounds();
    assert!(!bounds.is_empty());
    assert!(bounds.iter().all(|b| *b == Some(bound)));
}

#[tokio::test]
async fn short_request_list_is_reported() {
    let source = StubSource::new(1.0, numbered);
    let collector = Arc::new(CollectingObserver::new());
    let mut cache = cache().with_observer(collector.clone());
    cache
        .ensure(0.0, 10.0, |start, _count, len| {
            create_requests(&source, start, 1, len, None)
        })
        .await
        .unwrap();

    assert!(collector.has_violation(ViolationKind::RequestSequence));
}
