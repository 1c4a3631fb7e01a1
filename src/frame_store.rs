//! Ordered, deduplicated storage of fetched frames.
//!
//! This module provides [`FrameStore`], the bounded window of already-fetched
//! [`Frame`]s owned by every [`FrameCache`](crate::FrameCache).

use crate::telemetry::{InvariantChecker, InvariantViolation};
use crate::Frame;

/// The `[first, last]` time range currently held by a [`FrameStore`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coverage {
    /// Time of the earliest stored frame.
    pub first: f64,
    /// Time of the latest stored frame.
    pub last: f64,
}

impl Coverage {
    /// Returns `true` if `t` lies within `[first, last]`.
    #[must_use]
    pub fn contains(&self, t: f64) -> bool {
        self.first <= t && t <= self.last
    }
}

/// The frames surrounding a query time, as returned by [`FrameStore::bracket`].
#[derive(Debug, PartialEq)]
pub enum Bracket<'a, R> {
    /// A frame exists with exactly the query time.
    Exact(&'a Frame<R>),
    /// No exact match; the nearest frames strictly before and strictly after.
    Around {
        /// Latest frame with `t < query`, if any.
        before: Option<&'a Frame<R>>,
        /// Earliest frame with `t > query`, if any.
        after: Option<&'a Frame<R>>,
    },
}

// Manual impls: the derives would require `R: Clone`/`R: Copy`.
impl<R> Clone for Bracket<'_, R> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<R> Copy for Bracket<'_, R> {}

/// Tally of a [`FrameStore::insert`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertOutcome {
    /// Frames placed at a previously unoccupied time.
    pub inserted: usize,
    /// Frames that replaced an existing frame with the same time.
    pub replaced: usize,
    /// Frames dropped because their time was not finite.
    pub rejected: usize,
}

/// An ordered collection of frames with unique, finite timestamps.
///
/// Frames are kept sorted by ascending `t`. Inserting a frame whose `t` already
/// exists replaces the stored one (last write wins).
///
/// # Note
///
/// This type is re-exported in [`__internal`](crate::__internal) for testing and benchmarking.
/// It is not part of the stable public API.
#[derive(Debug, Clone)]
pub struct FrameStore<R> {
    frames: Vec<Frame<R>>,
}

impl<R> Default for FrameStore<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> FrameStore<R> {
    /// Creates an empty store.
    #[must_use]
    pub const fn new() -> Self {
        Self { frames: Vec::new() }
    }

    /// Merges `frames` into the store, keeping ascending order and unique times.
    ///
    /// Frames arriving in ascending order after the current tail are appended without
    /// shifting, which is the common case for chained fetch results.
    pub fn insert(&mut self, frames: impl IntoIterator<Item = Frame<R>>) -> InsertOutcome {
        let mut outcome = InsertOutcome::default();
        for frame in frames {
            if !frame.t.is_finite() {
                outcome.rejected += 1;
                continue;
            }
            let idx = self.frames.partition_point(|f| f.t < frame.t);
            match self.frames.get_mut(idx) {
                Some(existing) if existing.t == frame.t => {
                    *existing = frame;
                    outcome.replaced += 1;
                },
                _ => {
                    self.frames.insert(idx, frame);
                    outcome.inserted += 1;
                },
            }
        }
        outcome
    }

    /// Removes every frame with `t < threshold` and returns how many were removed.
    pub fn evict_before(&mut self, threshold: f64) -> usize {
        let n = self.frames.partition_point(|f| f.t < threshold);
        self.frames.drain(..n);
        n
    }

    /// Returns the `[first, last]` range of stored frames, or `None` when empty.
    #[must_use]
    pub fn coverage(&self) -> Option<Coverage> {
        match (self.frames.first(), self.frames.last()) {
            (Some(first), Some(last)) => Some(Coverage {
                first: first.t,
                last: last.t,
            }),
            _ => None,
        }
    }

    /// Returns the frame at exactly `t`, or the nearest frames on either side of it.
    #[must_use]
    pub fn bracket(&self, t: f64) -> Bracket<'_, R> {
        let idx = self.frames.partition_point(|f| f.t < t);
        match self.frames.get(idx) {
            Some(frame) if frame.t == t => Bracket::Exact(frame),
            after => Bracket::Around {
                before: idx.checked_sub(1).and_then(|i| self.frames.get(i)),
                after,
            },
        }
    }

    /// Returns the latest frame with `frame.t <= t`.
    #[must_use]
    pub fn at_or_before(&self, t: f64) -> Option<&Frame<R>> {
        let idx = self.frames.partition_point(|f| f.t <= t);
        idx.checked_sub(1).and_then(|i| self.frames.get(i))
    }

    /// Drops all frames and returns how many were held.
    pub fn clear(&mut self) -> usize {
        let n = self.frames.len();
        self.frames.clear();
        n
    }

    /// Number of stored frames.
    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Returns `true` if no frames are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// The stored frames in ascending time order.
    #[must_use]
    pub fn frames(&self) -> &[Frame<R>] {
        &self.frames
    }
}

impl<R> InvariantChecker for FrameStore<R> {
    /// Checks the invariants of the FrameStore.
    ///
    /// # Invariants
    ///
    /// 1. Every stored time is finite
    /// 2. Times are strictly increasing (sorted, no duplicates)
    fn check_invariants(&self) -> Result<(), InvariantViolation> {
        if let Some(frame) = self.frames.iter().find(|f| !f.t.is_finite()) {
            return Err(
                InvariantViolation::new("FrameStore", "non-finite frame time")
                    .with_details(format!("t={}", frame.t)),
            );
        }
        for pair in self.frames.windows(2) {
            if let [a, b] = pair {
                if a.t >= b.t {
                    return Err(
                        InvariantViolation::new("FrameStore", "frames not strictly increasing")
                            .with_details(format!("t={} followed by t={}", a.t, b.t)),
                    );
                }
            }
        }
        Ok(())
    }
}
