//! Request planning for the [`FrameCache`](crate::FrameCache).
//!
//! The [`RequestScheduler`] decides which half-open time intervals must be requested to
//! cover a query window, keeps the issued intervals chained end-to-start, and detects
//! seeks (discontinuous jumps of the query window).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::frame_store::Coverage;

/// Tolerance used when comparing a returned request start against the expected cursor.
///
/// Scaled by the magnitude of the cursor, so that chunk boundaries accumulated by
/// repeated float addition still compare equal.
pub const SPEC_EPSILON: f64 = 1e-9;

/// A half-open interval `[start_t, end_t)` of simulation time to be fetched.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RequestSpec {
    /// Inclusive start of the interval.
    pub start_t: f64,
    /// Exclusive end of the interval.
    pub end_t: f64,
}

impl RequestSpec {
    /// Creates a spec covering `[start_t, end_t)`.
    #[must_use]
    pub const fn new(start_t: f64, end_t: f64) -> Self {
        Self { start_t, end_t }
    }

    /// Length of the interval.
    #[must_use]
    pub fn span(&self) -> f64 {
        self.end_t - self.start_t
    }

    /// Returns `true` if `t` lies in `[start_t, end_t)`.
    #[must_use]
    pub fn contains(&self, t: f64) -> bool {
        self.start_t <= t && t < self.end_t
    }

    /// Returns `true` if the two half-open intervals share any point.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.start_t < other.end_t && other.start_t < self.end_t
    }
}

impl fmt::Display for RequestSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start_t, self.end_t)
    }
}

/// Monotonic counter identifying one continuous stretch of requests.
///
/// Every seek or invalidation starts a new generation; fetch results tagged with an
/// older generation are never inserted into the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(u64);

impl Generation {
    /// Returns the generation following this one.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }

    /// Returns the raw counter value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gen#{}", self.0)
    }
}

/// Direction of a detected discontinuity in the query window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SeekKind {
    /// The window moved before anything requested in the current generation.
    Backward,
    /// The window jumped at least one chunk past the request cursor.
    Forward,
}

/// A run of `count` contiguous chunks of `length`, starting at `start_t`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChunkRun {
    /// Start of the first chunk.
    pub start_t: f64,
    /// Number of chunks.
    pub count: usize,
    /// Length of each chunk.
    pub length: f64,
}

/// What [`RequestScheduler::plan_window`] decided for one query window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowPlan {
    /// Set when the window is discontinuous with the current generation. The store
    /// must be cleared before the run is issued.
    pub seek: Option<SeekKind>,
    /// Chunks to issue, or `None` when the window is already covered.
    pub run: Option<ChunkRun>,
}

/// A returned request did not start where the previous one ended.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SequenceMismatch {
    /// The start the scheduler expected.
    pub expected: f64,
    /// The spec that was actually returned.
    pub actual: RequestSpec,
}

/// Number of chunks of `length` starting at `start_t` needed so that `high` falls inside
/// one of the half-open intervals. Saturates at `usize::MAX` for unbounded windows.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn chunk_count(start_t: f64, high: f64, length: f64) -> usize {
    (((high - start_t) / length).floor().max(0.0) as usize).saturating_add(1)
}

/// Plans fetch requests so that issued intervals never overlap and never leave gaps.
///
/// # Note
///
/// This type is re-exported in [`__internal`](crate::__internal) for testing and benchmarking.
/// It is not part of the stable public API.
#[derive(Debug, Clone)]
pub struct RequestScheduler {
    dt_hint: f64,
    prefetch_length: f64,
    prefetch_num: usize,
    /// End of the most recently issued request (the next expected start).
    cursor: Option<f64>,
    /// Span of the most recently issued request.
    last_span: f64,
    /// Earliest time still backed by this generation's requests.
    floor: Option<f64>,
    generation: Generation,
}

impl RequestScheduler {
    /// Creates a scheduler with nothing issued.
    #[must_use]
    pub const fn new(dt_hint: f64, prefetch_length: f64, prefetch_num: usize) -> Self {
        Self {
            dt_hint,
            prefetch_length,
            prefetch_num,
            cursor: None,
            last_span: prefetch_length,
            floor: None,
            generation: Generation(0),
        }
    }

    /// Decides how to cover `[low, high]` given the store's current coverage.
    ///
    /// A detected seek resets the scheduler before the run is planned; the caller is
    /// responsible for clearing the store and dropping queued work when `seek` is set.
    pub fn plan_window(&mut self, low: f64, high: f64, coverage: Option<Coverage>) -> WindowPlan {
        let mut seek = None;
        let mut coverage = coverage;

        // Nothing before the floor was requested in this generation.
        let known_start = match (self.floor, coverage) {
            (Some(floor), _) => Some(floor),
            (None, Some(c)) => Some(c.first - self.dt_hint),
            (None, None) => None,
        };
        if known_start.is_some_and(|start| low < start) {
            self.reset();
            seek = Some(SeekKind::Backward);
            coverage = None;
        }

        let satisfied = coverage.is_some_and(|c| c.last >= high)
            || self.cursor.is_some_and(|cursor| cursor > high);
        if satisfied {
            self.note_eviction(low - self.dt_hint);
            return WindowPlan { seek, run: None };
        }

        let mut required = coverage.map_or(low, |c| c.last.max(low));
        if let Some(cursor) = self.cursor {
            if required >= cursor + self.last_span {
                self.reset();
                seek = Some(SeekKind::Forward);
                required = low;
            }
        }

        // A fresh chain starts one step early so `low` has a frame at or before it.
        let start_t = self.cursor.unwrap_or(required - self.dt_hint);
        self.note_eviction(low - self.dt_hint);
        WindowPlan {
            seek,
            run: Some(ChunkRun {
                start_t,
                count: chunk_count(start_t, high, self.prefetch_length),
                length: self.prefetch_length,
            }),
        }
    }

    /// Look-ahead chunks to issue so that `prefetch_num` are outstanding.
    ///
    /// Returns `None` when nothing has been issued in this generation or the queue is full.
    #[must_use]
    pub fn lookahead(&self, outstanding: usize) -> Option<ChunkRun> {
        let start_t = self.cursor?;
        let count = self.prefetch_num.saturating_sub(outstanding);
        (count > 0).then_some(ChunkRun {
            start_t,
            count,
            length: self.prefetch_length,
        })
    }

    /// Records a request returned by the request constructor and advances the cursor.
    ///
    /// # Errors
    ///
    /// Returns the mismatch when `spec` does not start at the cursor or is empty. The
    /// cursor is re-derived from `spec.end_t` either way.
    pub fn record_issued(&mut self, spec: RequestSpec) -> Result<(), SequenceMismatch> {
        let expected = self.cursor;
        self.cursor = Some(spec.end_t);
        if spec.span() > 0.0 {
            self.last_span = spec.span();
        }
        self.floor = Some(self.floor.map_or(spec.start_t, |f| f.min(spec.start_t)));

        let chained = expected.is_none_or(|cursor| {
            (spec.start_t - cursor).abs() <= SPEC_EPSILON * cursor.abs().max(1.0)
        });
        if chained && spec.span() > 0.0 {
            Ok(())
        } else {
            Err(SequenceMismatch {
                expected: expected.unwrap_or(spec.start_t),
                actual: spec,
            })
        }
    }

    /// Raises the floor to an eviction threshold.
    pub fn note_eviction(&mut self, threshold: f64) {
        if let Some(floor) = self.floor.as_mut() {
            *floor = floor.max(threshold);
        }
    }

    /// Forgets everything issued and starts a new generation.
    pub fn reset(&mut self) -> Generation {
        self.cursor = None;
        self.floor = None;
        self.last_span = self.prefetch_length;
        self.generation = self.generation.next();
        self.generation
    }

    /// Starts a new generation that re-requests from `rewind_to`.
    ///
    /// Used after a failed fetch: requests issued after the failed one are abandoned,
    /// while the floor (what the store still holds) is kept.
    pub fn invalidate(&mut self, rewind_to: f64) -> Generation {
        self.cursor = Some(rewind_to);
        self.generation = self.generation.next();
        self.generation
    }

    /// The next expected request start, if anything was issued in this generation.
    #[must_use]
    pub const fn cursor(&self) -> Option<f64> {
        self.cursor
    }

    /// The earliest time still backed by this generation.
    #[must_use]
    pub const fn floor(&self) -> Option<f64> {
        self.floor
    }

    /// The current generation.
    #[must_use]
    pub const fn generation(&self) -> Generation {
        self.generation
    }

    /// Expected spacing between frames.
    #[must_use]
    pub const fn dt_hint(&self) -> f64 {
        self.dt_hint
    }

    /// Length of each chunk.
    #[must_use]
    pub const fn prefetch_length(&self) -> f64 {
        self.prefetch_length
    }

    /// Look-ahead queue depth.
    #[must_use]
    pub const fn prefetch_num(&self) -> usize {
        self.prefetch_num
    }
}
