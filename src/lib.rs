//! # Replay Prefetch
//!
//! Replay Prefetch drives the playback of a time-indexed traffic simulation (vehicles,
//! pedestrians, traffic-light states, road congestion levels) whose frames live behind a
//! remote source. Playback may run continuously or jump anywhere on the timeline, yet the
//! data is fetched in bounded windows.
//!
//! The heart of the crate is the [`FrameCache`]: it turns an arbitrary query window into a
//! minimal chain of non-overlapping half-open fetch requests, keeps a bounded window of
//! already-fetched [`Frame`]s, detects seeks, and answers point-in-time queries with the
//! frames needed for interpolation.
//!
//! On top of the cache sit one [`EntityPlayer`] per entity kind, and a [`Replay`] driver
//! that owns the playback state machine and joins all players' fetches every tick.
//!
//! ```
//! use futures::FutureExt;
//! use replay_prefetch::{CacheConfig, Frame, FrameCache, RequestSpec, Sample};
//! use replay_prefetch::fetch::FetchRequest;
//!
//! # tokio_test_block(async {
//! let mut cache: FrameCache<u32> = FrameCache::new(CacheConfig::default())?;
//!
//! // A transport-agnostic request constructor: `count` contiguous chunks of `len`.
//! let make = |start: f64, count: usize, len: f64| {
//!     (0..count)
//!         .map(|i| {
//!             let spec = RequestSpec::new(start + i as f64 * len, start + (i + 1) as f64 * len);
//!             let frames: Vec<Frame<u32>> = (spec.start_t as i64..spec.end_t as i64)
//!                 .map(|t| Frame::new(t as f64, vec![t as u32]))
//!                 .collect();
//!             FetchRequest::new(spec, async move { Ok(frames) }.boxed())
//!         })
//!         .collect::<Vec<_>>()
//! };
//!
//! cache.ensure(0.0, 4.0, make).await?;
//! assert!(matches!(cache.sample(2.5), Some(Sample::Between { .. })));
//! # Ok::<(), replay_prefetch::ReplayError>(())
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f)
//! # }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub use error::ReplayError;
pub use fetch::{create_requests, FetchFuture, FetchRequest, FrameSource};
pub use frame_cache::{FrameCache, Sample};
pub use frame_store::{Bracket, Coverage, FrameStore};
pub use players::player_trait::{AnyPlayer, EntityPlayer, RenderRecord};
pub use players::pedestrian::{PedestrianPlayer, PedestrianRecord, PedestrianState};
pub use players::road_status::{CongestionLevel, RoadStatusPlayer, RoadStatusRecord};
pub use players::traffic_light::{
    SignalState, StyledFeature, TrafficLightPlayer, TrafficLightRecord,
};
pub use players::vehicle::{VehiclePlayer, VehicleRecord, VehicleState};
pub use replay::builder::ReplayBuilder;
pub use replay::config::{CacheConfig, PlaybackConfig};
pub use replay::driver::{FailureThrottle, FailureVec, FrameClock, RenderedFrame, Replay};
pub use replay::playback::{PlaybackEvent, PlaybackState, SimSpan};
pub use scheduler::{Generation, RequestScheduler, RequestSpec, SeekKind, WindowPlan};

pub mod color;
#[doc(hidden)]
pub mod error;
pub mod fetch;
pub mod frame_cache;
#[doc(hidden)]
pub mod frame_store;
pub mod interpolate;
#[doc(hidden)]
pub mod scheduler;
pub mod telemetry;
/// Per-entity-kind adapters that own a [`FrameCache`] and turn samples into render records.
pub mod players {
    pub mod pedestrian;
    pub mod player_trait;
    pub mod road_status;
    pub mod traffic_light;
    pub mod vehicle;
}
/// Playback driver: configuration, state machine, builder and the per-tick loop.
pub mod replay {
    pub mod builder;
    pub mod config;
    pub mod driver;
    pub mod playback;
}

/// Internal module exposing implementation details for testing and benchmarking.
///
/// # ⚠️ WARNING: No Stability Guarantees
///
/// **This module is NOT part of the public API.** Everything here is subject to
/// change without notice and is intended only for property-based tests,
/// benchmarks and integration tests in this repository.
#[doc(hidden)]
pub mod __internal {
    pub use crate::frame_store::{Bracket, Coverage, FrameStore, InsertOutcome};
    pub use crate::scheduler::{chunk_count, ChunkRun, RequestScheduler, SPEC_EPSILON};
}

// #############
// # CONSTANTS #
// #############

/// Default spacing between two frames of one entity kind, in simulation time units.
pub const DEFAULT_DT_HINT: f64 = 1.0;

/// Default length of one fetch chunk, in simulation time units.
pub const DEFAULT_PREFETCH_LENGTH: f64 = 3.0;

/// Default number of look-ahead chunks kept in flight beyond the current window.
pub const DEFAULT_PREFETCH_NUM: usize = 3;

/// Largest number of chunks one `ensure` window may span. Wider windows are rejected
/// with [`ReplayError::InvalidWindow`].
pub const MAX_WINDOW_CHUNKS: usize = 4096;

/// Stable identifier of an entity within one entity kind.
pub type EntityId = i64;

/// A timestamped batch of entity records: the atomic unit stored by a [`FrameCache`].
///
/// `t` is a simulation-time coordinate, not wall-clock time. A frame may legitimately
/// contain zero records.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Frame<R> {
    /// Simulation time of this frame.
    pub t: f64,
    /// Entity records of this frame. Ids are unique within one frame.
    #[serde(default = "Vec::new")]
    pub data: Vec<R>,
}

impl<R> Frame<R> {
    /// Creates a frame at time `t` holding `data`.
    #[must_use]
    pub const fn new(t: f64, data: Vec<R>) -> Self {
        Self { t, data }
    }

    /// Creates a frame at time `t` without records.
    #[must_use]
    pub const fn empty(t: f64) -> Self {
        Self {
            t,
            data: Vec::new(),
        }
    }

    /// Returns the number of records in this frame.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if this frame holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Kind-specific payload keyed by a stable identifier.
pub trait EntityRecord {
    /// Returns the id of the entity this record describes.
    fn id(&self) -> EntityId;
}

impl<R: EntityRecord> Frame<R> {
    /// Indexes the records of this frame by entity id.
    ///
    /// Used to pair up the same entity across the two frames of a [`Sample`].
    #[must_use]
    pub fn by_id(&self) -> std::collections::HashMap<EntityId, &R> {
        self.data.iter().map(|r| (r.id(), r)).collect()
    }
}

/// An axis-aligned longitude/latitude box narrowing the fetched payload.
///
/// The bound is passed through unchanged to the fetch collaborator; it never
/// changes the time-window algorithm.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SpatialBound {
    /// First longitude edge.
    pub lng1: f64,
    /// First latitude edge.
    pub lat1: f64,
    /// Second longitude edge.
    pub lng2: f64,
    /// Second latitude edge.
    pub lat2: f64,
}

impl SpatialBound {
    /// Creates a bound from two corners, in any order.
    #[must_use]
    pub const fn new(lng1: f64, lat1: f64, lng2: f64, lat2: f64) -> Self {
        Self {
            lng1,
            lat1,
            lng2,
            lat2,
        }
    }

    /// Returns `true` if the given position lies inside the box (edges included).
    #[must_use]
    pub fn contains(&self, lng: f64, lat: f64) -> bool {
        let (lng_min, lng_max) = (self.lng1.min(self.lng2), self.lng1.max(self.lng2));
        let (lat_min, lat_max) = (self.lat1.min(self.lat2), self.lat1.max(self.lat2));
        (lng_min..=lng_max).contains(&lng) && (lat_min..=lat_max).contains(&lat)
    }
}

/// The entity kinds a [`Replay`] can draw, one player per kind.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum LayerKind {
    /// Moving vehicles, interpolated with circular heading.
    Vehicle,
    /// Moving pedestrians, interpolated without heading.
    Pedestrian,
    /// Traffic-light phases painted onto junction lanes.
    TrafficLight,
    /// Congestion levels painted onto roads.
    RoadStatus,
}

impl LayerKind {
    /// Every layer kind, in draw order.
    pub const ALL: [LayerKind; 4] = [
        LayerKind::TrafficLight,
        LayerKind::Pedestrian,
        LayerKind::Vehicle,
        LayerKind::RoadStatus,
    ];

    /// Returns `true` for the microscopic layers (vehicles, pedestrians, traffic lights).
    #[must_use]
    pub const fn is_micro(self) -> bool {
        !matches!(self, LayerKind::RoadStatus)
    }

    /// Returns a string representation suitable for logging/metrics labels.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            LayerKind::Vehicle => "vehicle",
            LayerKind::Pedestrian => "pedestrian",
            LayerKind::TrafficLight => "traffic_light",
            LayerKind::RoadStatus => "road_status",
        }
    }
}

impl std::fmt::Display for LayerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
