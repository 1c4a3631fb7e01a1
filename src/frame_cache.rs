//! The [`FrameCache`]: a bounded, seek-aware window of fetched frames.
//!
//! A cache combines a [`FrameStore`] with a [`RequestScheduler`] and a queue of in-flight
//! fetches. Each [`ensure`](FrameCache::ensure) call makes sure the frames of one query
//! window are present, keeps `prefetch_num` look-ahead chunks in flight, and evicts frames
//! that fell behind the window. [`sample`](FrameCache::sample) then answers point queries
//! synchronously.

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::fetch::{FetchFuture, FetchRequest};
use crate::frame_store::{Bracket, Coverage, FrameStore};
use crate::replay::config::CacheConfig;
use crate::scheduler::{chunk_count, ChunkRun, Generation, RequestScheduler, RequestSpec, SeekKind};
use crate::telemetry::{ViolationKind, ViolationObserver, ViolationSeverity};
use crate::{debug_check_invariants, report_violation_to, Frame, ReplayError, MAX_WINDOW_CHUNKS};

/// The frames answering a point-in-time query.
#[derive(Debug, PartialEq)]
pub enum Sample<'a, R> {
    /// A frame exists at exactly the query time.
    Exact(&'a Frame<R>),
    /// The query time lies strictly between two stored frames.
    Between {
        /// Latest frame before the query time.
        before: &'a Frame<R>,
        /// Earliest frame after the query time.
        after: &'a Frame<R>,
    },
}

impl<R> Clone for Sample<'_, R> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<R> Copy for Sample<'_, R> {}

impl<'a, R> Sample<'a, R> {
    /// The frame at or before the query time (step semantics).
    #[must_use]
    pub const fn at_or_before(&self) -> &'a Frame<R> {
        match self {
            Sample::Exact(frame) => frame,
            Sample::Between { before, .. } => before,
        }
    }

    /// The frame after the query time, if the query fell between two frames.
    #[must_use]
    pub const fn after(&self) -> Option<&'a Frame<R>> {
        match self {
            Sample::Exact(_) => None,
            Sample::Between { after, .. } => Some(after),
        }
    }

    /// Interpolation ratio of `t` between the two frames, in `[0, 1]`.
    ///
    /// Always 0 for an exact match.
    #[must_use]
    pub fn ratio(&self, t: f64) -> f64 {
        match self {
            Sample::Exact(_) => 0.0,
            Sample::Between { before, after } => {
                crate::interpolate::interpolation_ratio(t, before.t, after.t)
            },
        }
    }
}

/// A fetch task waiting in the in-order queue.
struct PendingFetch<R> {
    spec: RequestSpec,
    generation: Generation,
    future: FetchFuture<R>,
}

/// A bounded window of frames kept in sync with a moving query window.
///
/// `FrameCache` is generic over the record type `R`, and transport-agnostic: every
/// [`ensure`](Self::ensure) call receives a request constructor that turns
/// `(start_t, count, length)` into [`FetchRequest`]s.
///
/// # Guarantees
///
/// - Requests issued within one generation never overlap and never leave gaps.
/// - Fetch results are applied in the order their requests were issued.
/// - After a successful `ensure(low, high)`, every frame with `t` in `[low, high]`
///   that the source knows about is stored (unless the data ends earlier).
/// - After a seek, results of requests issued before the seek are never applied.
pub struct FrameCache<R> {
    config: CacheConfig,
    store: FrameStore<R>,
    scheduler: RequestScheduler,
    pending: VecDeque<PendingFetch<R>>,
    observer: Option<Arc<dyn ViolationObserver>>,
    label: &'static str,
}

impl<R> std::fmt::Debug for FrameCache<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Destructure to ensure all fields are considered when adding new fields
        let Self {
            config,
            store,
            scheduler,
            pending,
            observer,
            label,
        } = self;

        f.debug_struct("FrameCache")
            .field("label", label)
            .field("config", config)
            .field("coverage", &store.coverage())
            .field("frames", &store.len())
            .field("scheduler", scheduler)
            .field("pending", &pending.len())
            .field("has_observer", &observer.is_some())
            .finish()
    }
}

impl<R> FrameCache<R> {
    /// Creates an empty cache.
    ///
    /// # Errors
    ///
    /// Returns [`ReplayError::InvalidConfig`] if `config` fails validation.
    pub fn new(config: CacheConfig) -> Result<Self, ReplayError> {
        config.validate()?;
        Ok(Self {
            config,
            store: FrameStore::new(),
            scheduler: RequestScheduler::new(
                config.dt_hint,
                config.prefetch_length,
                config.prefetch_num,
            ),
            pending: VecDeque::new(),
            observer: None,
            label: "frames",
        })
    }

    /// Sets a label identifying this cache in log output.
    #[must_use]
    pub fn with_label(mut self, label: &'static str) -> Self {
        self.label = label;
        self
    }

    /// Routes violations of this cache to `observer` instead of the tracing observer.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn ViolationObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Makes the frames of `[low, high]` available.
    ///
    /// Issues whatever requests are missing via `create_requests`, awaits the in-flight
    /// requests that start at or before `high` in issue order, inserts their frames,
    /// evicts frames older than `low - dt_hint` and tops up the look-ahead queue.
    /// A window that jumped away from the current generation (a seek) discards the
    /// stored frames and every in-flight request first.
    ///
    /// Calling `ensure` again with the same window issues no new requests.
    ///
    /// # Errors
    ///
    /// - [`ReplayError::InvalidWindow`] if a bound is not finite, `low > high`, or the
    ///   window spans more than [`MAX_WINDOW_CHUNKS`] chunks.
    /// - [`ReplayError::FetchFailed`] / [`ReplayError::FetchTimeout`] if an awaited
    ///   request failed. Stored frames are kept and the failed range is requested
    ///   again by the next call.
    pub async fn ensure<F>(
        &mut self,
        low: f64,
        high: f64,
        mut create_requests: F,
    ) -> Result<(), ReplayError>
    where
        F: FnMut(f64, usize, f64) -> Vec<FetchRequest<R>>,
    {
        if !(low.is_finite() && high.is_finite()) || low > high {
            return Err(ReplayError::InvalidWindow { low, high });
        }
        let span = chunk_count(
            low - self.scheduler.dt_hint(),
            high,
            self.scheduler.prefetch_length(),
        );
        if span > MAX_WINDOW_CHUNKS {
            debug!(
                "[{}] window [{}, {}] needs {} chunk(s), limit is {}",
                self.label, low, high, span, MAX_WINDOW_CHUNKS
            );
            return Err(ReplayError::InvalidWindow { low, high });
        }

        let plan = self
            .scheduler
            .plan_window(low, high, self.store.coverage());
        if let Some(seek) = plan.seek {
            self.discard_for_seek(seek, low, high);
        }
        self.evict(low);
        if let Some(run) = plan.run {
            self.issue(run, &mut create_requests);
        }

        self.drain_through(high).await?;

        self.evict(low);
        let outstanding = self.outstanding();
        if let Some(run) = self.scheduler.lookahead(outstanding) {
            trace!(
                "[{}] topping up look-ahead: {} chunk(s) from t={}",
                self.label,
                run.count,
                run.start_t
            );
            self.issue(run, &mut create_requests);
        }

        debug_check_invariants!(self.store);
        Ok(())
    }

    /// Returns the frames around `t`, or `None` when `t` is outside the stored range.
    #[must_use]
    pub fn sample(&self, t: f64) -> Option<Sample<'_, R>> {
        match self.store.bracket(t) {
            Bracket::Exact(frame) => Some(Sample::Exact(frame)),
            Bracket::Around {
                before: Some(before),
                after: Some(after),
            } => Some(Sample::Between { before, after }),
            Bracket::Around { .. } => None,
        }
    }

    /// Returns the latest stored frame with `frame.t <= t`.
    ///
    /// Unlike [`sample`](Self::sample) this also answers past the last stored frame,
    /// which suits step-valued kinds whose last state holds until the next one.
    #[must_use]
    pub fn latest_at(&self, t: f64) -> Option<&Frame<R>> {
        self.store.at_or_before(t)
    }

    /// Drops every stored frame and in-flight request and starts a new generation.
    pub fn reset(&mut self) {
        let generation = self.scheduler.reset();
        let frames = self.store.clear();
        let pending = self.pending.len();
        self.pending.clear();
        debug!(
            "[{}] reset: dropped {} frame(s) and {} pending request(s), now {}",
            self.label, frames, pending, generation
        );
    }

    /// The `[first, last]` range of stored frames.
    #[must_use]
    pub fn coverage(&self) -> Option<Coverage> {
        self.store.coverage()
    }

    /// Number of stored frames.
    #[must_use]
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// Returns `true` if no frames are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Number of issued requests whose results have not been applied yet.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// The current request generation.
    #[must_use]
    pub fn generation(&self) -> Generation {
        self.scheduler.generation()
    }

    /// The next expected request start.
    #[must_use]
    pub fn cursor(&self) -> Option<f64> {
        self.scheduler.cursor()
    }

    /// The configuration this cache was created with.
    #[must_use]
    pub const fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// The stored frames.
    #[must_use]
    pub const fn store(&self) -> &FrameStore<R> {
        &self.store
    }

    fn outstanding(&self) -> usize {
        let generation = self.scheduler.generation();
        self.pending
            .iter()
            .filter(|p| p.generation == generation)
            .count()
    }

    fn discard_for_seek(&mut self, seek: SeekKind, low: f64, high: f64) {
        let frames = self.store.clear();
        let pending = self.pending.len();
        self.pending.clear();
        debug!(
            "[{}] {:?} seek to [{}, {}]: dropped {} frame(s) and {} pending request(s), now {}",
            self.label,
            seek,
            low,
            high,
            frames,
            pending,
            self.scheduler.generation()
        );
    }

    fn evict(&mut self, low: f64) {
        let threshold = low - self.config.dt_hint;
        let evicted = self.store.evict_before(threshold);
        if evicted > 0 {
            trace!(
                "[{}] evicted {} frame(s) before t={}",
                self.label,
                evicted,
                threshold
            );
        }
    }

    fn issue<F>(&mut self, run: ChunkRun, create_requests: &mut F)
    where
        F: FnMut(f64, usize, f64) -> Vec<FetchRequest<R>>,
    {
        let requests = create_requests(run.start_t, run.count, run.length);
        if requests.len() != run.count {
            report_violation_to!(
                &self.observer,
                ViolationSeverity::Warning,
                ViolationKind::RequestSequence,
                "[{}] request constructor returned {} request(s), expected {}",
                self.label,
                requests.len(),
                run.count
            );
        }

        let generation = self.scheduler.generation();
        for FetchRequest { spec, future } in requests {
            if let Err(mismatch) = self.scheduler.record_issued(spec) {
                report_violation_to!(
                    &self.observer,
                    ViolationSeverity::Warning,
                    ViolationKind::RequestSequence,
                    "[{}] request {} does not chain: expected start={}",
                    self.label,
                    mismatch.actual,
                    mismatch.expected
                );
            }
            trace!("[{}] issued {} ({})", self.label, spec, generation);
            self.pending.push_back(PendingFetch {
                spec,
                generation,
                future,
            });
        }
    }

    /// Awaits, in issue order, every pending request starting at or before `high`.
    async fn drain_through(&mut self, high: f64) -> Result<(), ReplayError> {
        loop {
            let generation = self.scheduler.generation();
            let due = self
                .pending
                .front()
                .is_some_and(|p| p.generation != generation || p.spec.start_t <= high);
            if !due {
                return Ok(());
            }
            let Some(task) = self.pending.pop_front() else {
                return Ok(());
            };
            if task.generation != generation {
                trace!(
                    "[{}] dropping {} from {}",
                    self.label,
                    task.spec,
                    task.generation
                );
                continue;
            }

            let spec = task.spec;
            match self.await_fetch(task).await {
                Ok(frames) => self.apply(spec, frames),
                Err(err) => {
                    let dropped = self.pending.len();
                    self.pending.clear();
                    let generation = self.scheduler.invalidate(spec.start_t);
                    debug!(
                        "[{}] fetch of {} failed ({}); dropped {} queued request(s), now {}",
                        self.label, spec, err, dropped, generation
                    );
                    return Err(err);
                },
            }
        }
    }

    async fn await_fetch(&self, task: PendingFetch<R>) -> Result<Vec<Frame<R>>, ReplayError> {
        let PendingFetch { spec, future, .. } = task;
        match self.config.fetch_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, future).await {
                Ok(result) => result,
                Err(_elapsed) => Err(ReplayError::FetchTimeout {
                    start_t: spec.start_t,
                    end_t: spec.end_t,
                    timeout,
                }),
            },
            None => future.await,
        }
    }

    fn apply(&mut self, spec: RequestSpec, frames: Vec<Frame<R>>) {
        let outside = frames.iter().filter(|f| !spec.contains(f.t)).count();
        let outcome = self.store.insert(frames);
        if outcome.rejected > 0 {
            report_violation_to!(
                &self.observer,
                ViolationSeverity::Error,
                ViolationKind::FrameOrder,
                "[{}] dropped {} frame(s) with non-finite time from {}",
                self.label,
                outcome.rejected,
                spec
            );
        }
        if outside > outcome.rejected {
            report_violation_to!(
                &self.observer,
                ViolationSeverity::Warning,
                ViolationKind::OutOfRange,
                "[{}] {} frame(s) outside requested interval {}",
                self.label,
                outside - outcome.rejected,
                spec
            );
        }
        trace!(
            "[{}] applied {}: {} new, {} replaced",
            self.label,
            spec,
            outcome.inserted,
            outcome.replaced
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::CollectingObserver;
    use futures::FutureExt;
    use std::sync::Mutex;

    /// Request constructor producing one frame per integer step, recording every spec.
    fn stepping(
        issued: &Mutex<Vec<RequestSpec>>,
    ) -> impl FnMut(f64, usize, f64) -> Vec<FetchRequest<u32>> + '_ {
        move |start, count, len| {
            (0..count)
                .map(|i| {
                    let spec =
                        RequestSpec::new(start + i as f64 * len, start + (i + 1) as f64 * len);
                    issued.lock().unwrap().push(spec);
                    let frames: Vec<Frame<u32>> = (spec.start_t.ceil() as i64..)
                        .map(|t| t as f64)
                        .take_while(|&t| t < spec.end_t)
                        .map(|t| Frame::new(t, vec![t as u32]))
                        .collect();
                    FetchRequest::new(spec, async move { Ok(frames) }.boxed())
                })
                .collect()
        }
    }

    fn cache() -> FrameCache<u32> {
        FrameCache::new(CacheConfig::default()).unwrap()
    }

    // ========================================================================
    // ensure
    // ========================================================================

    #[tokio::test]
    async fn ensure_covers_window() {
        let issued = Mutex::new(Vec::new());
        let mut cache = cache();
        cache.ensure(0.0, 10.0, stepping(&issued)).await.unwrap();

        for t in 0..=10 {
            assert!(
                matches!(cache.sample(f64::from(t)), Some(Sample::Exact(_))),
                "t={} missing",
                t
            );
        }
        // [-1,2) [2,5) [5,8) [8,11) awaited, plus three look-ahead chunks.
        assert_eq!(issued.lock().unwrap().len(), 7);
        assert_eq!(cache.pending_len(), 3);
        assert_eq!(cache.cursor(), Some(20.0));
    }

    #[tokio::test]
    async fn ensure_is_idempotent() {
        let issued = Mutex::new(Vec::new());
        let mut cache = cache();
        cache.ensure(0.0, 10.0, stepping(&issued)).await.unwrap();
        let count = issued.lock().unwrap().len();
        cache.ensure(0.0, 10.0, stepping(&issued)).await.unwrap();
        assert_eq!(issued.lock().unwrap().len(), count);
    }

    #[tokio::test]
    async fn rejects_invalid_window() {
        let issued = Mutex::new(Vec::new());
        let mut cache = cache();
        let err = cache.ensure(5.0, 1.0, stepping(&issued)).await.unwrap_err();
        assert_eq!(err, ReplayError::InvalidWindow { low: 5.0, high: 1.0 });
        let err = cache
            .ensure(f64::NAN, 1.0, stepping(&issued))
            .await
            .unwrap_err();
        assert!(matches!(err, ReplayError::InvalidWindow { .. }));
        assert!(issued.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn rejects_window_over_chunk_budget() {
        let issued = Mutex::new(Vec::new());
        let mut cache = cache();
        let err = cache
            .ensure(0.0, f64::MAX, stepping(&issued))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ReplayError::InvalidWindow {
                low: 0.0,
                high: f64::MAX
            }
        );
        let too_wide = MAX_WINDOW_CHUNKS as f64 * 3.0;
        let err = cache
            .ensure(0.0, too_wide, stepping(&issued))
            .await
            .unwrap_err();
        assert!(matches!(err, ReplayError::InvalidWindow { .. }));
        assert!(issued.lock().unwrap().is_empty());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn continuous_playback_evicts_old_frames() {
        let issued = Mutex::new(Vec::new());
        let mut cache = cache();
        for t in 0..30 {
            let t = f64::from(t);
            cache.ensure(t - 1.0, t + 2.0, stepping(&issued)).await.unwrap();
        }
        let coverage = cache.coverage().unwrap();
        assert!(coverage.first >= 29.0 - 2.0);
        assert_eq!(cache.generation().as_u64(), 0);
    }

    #[tokio::test]
    async fn forward_seek_starts_new_generation() {
        let issued = Mutex::new(Vec::new());
        let mut cache = cache();
        cache.ensure(0.0, 10.0, stepping(&issued)).await.unwrap();
        cache.ensure(100.0, 110.0, stepping(&issued)).await.unwrap();

        assert_eq!(cache.generation().as_u64(), 1);
        assert_eq!(cache.coverage().map(|c| c.first), Some(99.0));
        assert!(cache.sample(5.0).is_none());
    }

    // ========================================================================
    // failures
    // ========================================================================

    #[tokio::test]
    async fn failed_fetch_keeps_frames_and_retries_range() {
        let mut cache = cache();
        let mut fail_once = true;
        let mut attempts: Vec<RequestSpec> = Vec::new();
        let mut make = |start: f64, count: usize, len: f64| {
            (0..count)
                .map(|i| {
                    let spec =
                        RequestSpec::new(start + i as f64 * len, start + (i + 1) as f64 * len);
                    attempts.push(spec);
                    let fail = fail_once && spec.start_t == 2.0;
                    if fail {
                        fail_once = false;
                    }
                    let frames = vec![Frame::new(spec.start_t, vec![0u32])];
                    let future: FetchFuture<u32> = if fail {
                        async move { Err(ReplayError::fetch_failed(2.0, 5.0, "boom")) }.boxed()
                    } else {
                        async move { Ok(frames) }.boxed()
                    };
                    FetchRequest::new(spec, future)
                })
                .collect::<Vec<_>>()
        };

        let err = cache.ensure(0.0, 4.0, &mut make).await.unwrap_err();
        assert!(err.is_fetch_error());
        assert_eq!(cache.coverage().map(|c| c.first), Some(-1.0));
        assert_eq!(cache.cursor(), Some(2.0));

        cache.ensure(0.0, 4.0, &mut make).await.unwrap();
        assert!(cache.sample(2.0).is_some());
        assert_eq!(
            attempts.iter().filter(|s| s.start_t == 2.0).count(),
            2,
            "failed chunk must be requested again"
        );
    }

    #[tokio::test]
    async fn malformed_request_sequence_is_reported() {
        let collector = Arc::new(CollectingObserver::new());
        let mut cache = cache().with_observer(collector.clone());
        let make = |start: f64, count: usize, len: f64| {
            (0..count)
                .map(|i| {
                    // Leaves a one-unit gap between chunks.
                    let s = start + i as f64 * (len + 1.0);
                    let spec = RequestSpec::new(s, s + len);
                    FetchRequest::new(spec, async { Ok(Vec::<Frame<u32>>::new()) }.boxed())
                })
                .collect::<Vec<_>>()
        };
        cache.ensure(0.0, 4.0, make).await.unwrap();
        assert!(collector.has_violation(ViolationKind::RequestSequence));
    }

    #[tokio::test]
    async fn non_finite_frames_are_reported_and_dropped() {
        let collector = Arc::new(CollectingObserver::new());
        let mut cache = cache().with_observer(collector.clone());
        let make = |start: f64, count: usize, len: f64| {
            (0..count)
                .map(|i| {
                    let s = start + i as f64 * len;
                    let spec = RequestSpec::new(s, s + len);
                    let frames = vec![Frame::new(s, vec![1u32]), Frame::new(f64::NAN, vec![2])];
                    FetchRequest::new(spec, async move { Ok(frames) }.boxed())
                })
                .collect::<Vec<_>>()
        };
        cache.ensure(0.0, 1.0, make).await.unwrap();
        assert!(collector.has_violation(ViolationKind::FrameOrder));
        assert_eq!(cache.len(), 1);
    }

    // ========================================================================
    // sample
    // ========================================================================

    #[tokio::test]
    async fn sample_between_and_outside() {
        let issued = Mutex::new(Vec::new());
        let mut cache = cache();
        cache.ensure(0.0, 4.0, stepping(&issued)).await.unwrap();

        let sample = cache.sample(2.25).unwrap();
        assert_eq!(sample.at_or_before().t, 2.0);
        assert_eq!(sample.after().map(|f| f.t), Some(3.0));
        assert!((sample.ratio(2.25) - 0.25).abs() < 1e-12);

        assert!(cache.sample(-5.0).is_none());
        assert!(cache.sample(1000.0).is_none());
        assert_eq!(cache.latest_at(1000.0).map(|f| f.t), cache.coverage().map(|c| c.last));
    }

    #[test]
    fn new_rejects_invalid_config() {
        let config = CacheConfig {
            prefetch_num: 0,
            ..CacheConfig::default()
        };
        assert!(FrameCache::<u32>::new(config).is_err());
    }

    #[test]
    fn reset_clears_everything() {
        let mut cache = cache();
        cache.store.insert(vec![Frame::new(1.0, vec![1])]);
        cache.reset();
        assert!(cache.is_empty());
        assert_eq!(cache.generation().as_u64(), 1);
    }
}
