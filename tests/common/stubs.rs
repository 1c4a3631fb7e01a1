//! A scriptable frame source for integration tests.

// Allow test-specific patterns that are appropriate for test code
#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::use_self
)]

use std::sync::Arc;

use futures::FutureExt;
use parking_lot::Mutex;
use replay_prefetch::fetch::FetchRequest;
use replay_prefetch::{
    create_requests, FetchFuture, Frame, FrameSource, ReplayError, RequestSpec, SpatialBound,
};
use web_time::Duration;

const MATCH_EPSILON: f64 = 1e-9;

#[derive(Default)]
struct StubState {
    issued: Vec<RequestSpec>,
    bounds: Vec<Option<SpatialBound>>,
    fail_once: Vec<f64>,
    fail_always: bool,
    delays: Vec<(f64, Duration)>,
}

/// Synthesizes one frame at every multiple of `dt` (optionally only up to `data_end`).
///
/// Every fetched spec and bound is recorded. Chunks can be told to fail once, all
/// chunks can be told to fail, and chunks can be delayed on the tokio clock.
pub struct StubSource<R> {
    dt: f64,
    data_end: Option<f64>,
    record: fn(f64) -> R,
    state: Arc<Mutex<StubState>>,
}

#[allow(dead_code)]
impl<R> StubSource<R> {
    /// A source producing `record(t)` at every multiple of `dt`.
    #[must_use]
    pub fn new(dt: f64, record: fn(f64) -> R) -> Self {
        Self {
            dt,
            data_end: None,
            record,
            state: Arc::new(Mutex::new(StubState::default())),
        }
    }

    /// Produces no frames at or after `end`.
    #[must_use]
    pub fn with_data_end(mut self, end: f64) -> Self {
        self.data_end = Some(end);
        self
    }

    /// The next request starting at `start_t` fails.
    pub fn fail_once_at(&self, start_t: f64) {
        self.state.lock().fail_once.push(start_t);
    }

    /// Every request fails until switched off again.
    pub fn set_failing(&self, failing: bool) {
        self.state.lock().fail_always = failing;
    }

    /// Requests starting at `start_t` resolve only after `delay`.
    pub fn delay_at(&self, start_t: f64, delay: Duration) {
        self.state.lock().delays.push((start_t, delay));
    }

    /// Every spec fetched so far, in issue order.
    #[must_use]
    pub fn issued(&self) -> Vec<RequestSpec> {
        self.state.lock().issued.clone()
    }

    /// Every bound passed so far, in issue order.
    #[must_use]
    pub fn bounds(&self) -> Vec<Option<SpatialBound>> {
        self.state.lock().bounds.clone()
    }

    /// Number of specs fetched so far.
    #[must_use]
    pub fn issued_len(&self) -> usize {
        self.state.lock().issued.len()
    }

    /// Forgets the recorded specs and bounds.
    pub fn clear_issued(&self) {
        let mut state = self.state.lock();
        state.issued.clear();
        state.bounds.clear();
    }

    fn frames_in(&self, spec: RequestSpec) -> Vec<Frame<R>> {
        let first = (spec.start_t / self.dt).ceil() as i64;
        (first..)
            .map(|k| k as f64 * self.dt)
            .take_while(|t| *t < spec.end_t)
            .filter(|t| self.data_end.is_none_or(|end| *t < end))
            .map(|t| Frame::new(t, vec![(self.record)(t)]))
            .collect()
    }
}

#[allow(dead_code)]
impl<R: Send + 'static> StubSource<R> {
    /// A request constructor for [`FrameCache::ensure`](replay_prefetch::FrameCache::ensure).
    pub fn constructor(&self) -> impl FnMut(f64, usize, f64) -> Vec<FetchRequest<R>> + '_ {
        move |start, count, length| create_requests(self, start, count, length, None)
    }
}

fn same_start(a: f64, b: f64) -> bool {
    (a - b).abs() < MATCH_EPSILON
}

impl<R: Send + 'static> FrameSource<R> for StubSource<R> {
    fn fetch(&self, spec: RequestSpec, bound: Option<SpatialBound>) -> FetchFuture<R> {
        let (fail, delay) = {
            let mut state = self.state.lock();
            state.issued.push(spec);
            state.bounds.push(bound);
            let once = state
                .fail_once
                .iter()
                .position(|s| same_start(*s, spec.start_t))
                .map(|i| state.fail_once.remove(i))
                .is_some();
            let delay = state
                .delays
                .iter()
                .find(|(s, _)| same_start(*s, spec.start_t))
                .map(|(_, d)| *d);
            (once || state.fail_always, delay)
        };
        let frames = self.frames_in(spec);
        async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if fail {
                return Err(ReplayError::fetch_failed(
                    spec.start_t,
                    spec.end_t,
                    "stub failure",
                ));
            }
            Ok(frames)
        }
        .boxed()
    }
}
