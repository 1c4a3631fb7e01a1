//! Pedestrian playback: interpolated positions and speeds.
//!
//! Pedestrians are drawn as upright meshes, so their heading is taken from the earlier
//! frame as-is.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::fetch::{create_requests, FrameSource};
use crate::frame_cache::{FrameCache, Sample};
use crate::interpolate::lerp;
use crate::players::player_trait::{EntityPlayer, RenderRecord};
use crate::players::vehicle::MOVING_LOOKAHEAD;
use crate::replay::config::CacheConfig;
use crate::telemetry::ViolationObserver;
use crate::{EntityId, EntityRecord, Frame, LayerKind, ReplayError, SpatialBound};

/// One pedestrian in one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PedestrianRecord {
    /// Pedestrian id.
    pub id: EntityId,
    /// Longitude.
    pub lng: f64,
    /// Latitude.
    pub lat: f64,
    /// Heading in radians.
    #[serde(default)]
    pub direction: f64,
    /// Speed.
    #[serde(default)]
    pub v: f64,
    /// The building, lane or vehicle the pedestrian currently belongs to.
    #[serde(default, alias = "parentId")]
    pub parent_id: Option<EntityId>,
}

impl EntityRecord for PedestrianRecord {
    fn id(&self) -> EntityId {
        self.id
    }
}

/// A pedestrian as it should be drawn at one instant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PedestrianState {
    /// Pedestrian id.
    pub id: EntityId,
    /// Interpolated longitude.
    pub lng: f64,
    /// Interpolated latitude.
    pub lat: f64,
    /// Heading of the earlier frame, in radians.
    pub direction: f64,
    /// Interpolated speed.
    pub v: f64,
    /// Whether the renderer may pick this pedestrian.
    pub pickable: bool,
}

/// Plays back pedestrians.
pub struct PedestrianPlayer {
    cache: FrameCache<PedestrianRecord>,
    source: Arc<dyn FrameSource<PedestrianRecord>>,
}

impl std::fmt::Debug for PedestrianPlayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PedestrianPlayer")
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

impl PedestrianPlayer {
    /// Creates a player fetching from `source`.
    ///
    /// # Errors
    ///
    /// Returns [`ReplayError::InvalidConfig`] if `config` fails validation.
    pub fn new(
        source: Arc<dyn FrameSource<PedestrianRecord>>,
        config: CacheConfig,
    ) -> Result<Self, ReplayError> {
        Ok(Self {
            cache: FrameCache::new(config)?.with_label("pedestrian"),
            source,
        })
    }

    /// Routes cache violations to `observer`.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn ViolationObserver>) -> Self {
        self.cache = self.cache.with_observer(observer);
        self
    }

    /// The underlying cache.
    #[must_use]
    pub const fn cache(&self) -> &FrameCache<PedestrianRecord> {
        &self.cache
    }

    fn states(
        sample: Sample<'_, PedestrianRecord>,
        t: f64,
        pickable: bool,
    ) -> Vec<PedestrianState> {
        let ratio = sample.ratio(t);
        let next = sample.after().map(Frame::by_id);
        sample
            .at_or_before()
            .data
            .iter()
            .map(|a| {
                let mut state = PedestrianState {
                    id: a.id,
                    lng: a.lng,
                    lat: a.lat,
                    direction: a.direction,
                    v: a.v,
                    pickable,
                };
                if let Some(b) = next.as_ref().and_then(|m| m.get(&a.id)) {
                    state.lng = lerp(a.lng, b.lng, ratio);
                    state.lat = lerp(a.lat, b.lat, ratio);
                    state.v = lerp(a.v, b.v, ratio);
                }
                state
            })
            .collect()
    }
}

impl EntityPlayer for PedestrianPlayer {
    fn kind(&self) -> LayerKind {
        LayerKind::Pedestrian
    }

    async fn ensure(&mut self, t: f64, bound: Option<SpatialBound>) -> Result<(), ReplayError> {
        let dt = self.cache.config().dt_hint;
        let source = Arc::clone(&self.source);
        self.cache
            .ensure(t - dt, t + MOVING_LOOKAHEAD, move |start, count, length| {
                create_requests(source.as_ref(), start, count, length, bound)
            })
            .await
    }

    fn render(&self, t: f64, pickable: bool) -> Vec<RenderRecord> {
        self.cache.sample(t).map_or_else(Vec::new, |sample| {
            Self::states(sample, t, pickable)
                .into_iter()
                .map(RenderRecord::Pedestrian)
                .collect()
        })
    }

    fn reset(&mut self) {
        self.cache.reset();
    }
}
