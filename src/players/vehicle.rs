//! Vehicle playback: interpolated positions, speeds and headings.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::fetch::{create_requests, FrameSource};
use crate::frame_cache::{FrameCache, Sample};
use crate::interpolate::{angle_interp, lerp};
use crate::players::player_trait::{EntityPlayer, RenderRecord};
use crate::replay::config::CacheConfig;
use crate::telemetry::ViolationObserver;
use crate::{EntityId, EntityRecord, Frame, LayerKind, ReplayError, SpatialBound};

/// How far past the query time moving entities are ensured.
pub const MOVING_LOOKAHEAD: f64 = 2.0;

/// One vehicle in one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleRecord {
    /// Vehicle id.
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
    /// Lane the vehicle is on.
    #[serde(default, alias = "laneId")]
    pub lane_id: Option<EntityId>,
    /// Model name used to pick a mesh.
    #[serde(default)]
    pub model: Option<String>,
}

impl EntityRecord for VehicleRecord {
    fn id(&self) -> EntityId {
        self.id
    }
}

/// A vehicle as it should be drawn at one instant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VehicleState {
    /// Vehicle id.
    pub id: EntityId,
    /// Interpolated longitude.
    pub lng: f64,
    /// Interpolated latitude.
    pub lat: f64,
    /// Interpolated heading in radians, in `[0, 2π)`.
    pub direction: f64,
    /// Interpolated speed.
    pub v: f64,
    /// Known model name, or `None` for the default model.
    pub model: Option<String>,
    /// Whether the renderer may pick this vehicle.
    pub pickable: bool,
}

/// Plays back vehicles.
pub struct VehiclePlayer {
    cache: FrameCache<VehicleRecord>,
    source: Arc<dyn FrameSource<VehicleRecord>>,
    known_models: BTreeSet<String>,
}

impl std::fmt::Debug for VehiclePlayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VehiclePlayer")
            .field("cache", &self.cache)
            .field("known_models", &self.known_models)
            .finish_non_exhaustive()
    }
}

impl VehiclePlayer {
    /// Creates a player fetching from `source`.
    ///
    /// # Errors
    ///
    /// Returns [`ReplayError::InvalidConfig`] if `config` fails validation.
    pub fn new(
        source: Arc<dyn FrameSource<VehicleRecord>>,
        config: CacheConfig,
    ) -> Result<Self, ReplayError> {
        Ok(Self {
            cache: FrameCache::new(config)?.with_label("vehicle"),
            source,
            known_models: BTreeSet::new(),
        })
    }

    /// Sets the model names the renderer has meshes for. Vehicles with any other
    /// model are drawn with the default model.
    #[must_use]
    pub fn with_known_models<I, S>(mut self, models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.known_models = models.into_iter().map(Into::into).collect();
        self
    }

    /// Routes cache violations to `observer`.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn ViolationObserver>) -> Self {
        self.cache = self.cache.with_observer(observer);
        self
    }

    /// The underlying cache.
    #[must_use]
    pub const fn cache(&self) -> &FrameCache<VehicleRecord> {
        &self.cache
    }

    fn normalize_model(&self, model: Option<&String>) -> Option<String> {
        model.filter(|m| self.known_models.contains(*m)).cloned()
    }

    fn states(
        &self,
        sample: Sample<'_, VehicleRecord>,
        t: f64,
        pickable: bool,
    ) -> Vec<VehicleState> {
        let ratio = sample.ratio(t);
        let next = sample.after().map(Frame::by_id);
        sample
            .at_or_before()
            .data
            .iter()
            .map(|a| {
                let mut state = VehicleState {
                    id: a.id,
                    lng: a.lng,
                    lat: a.lat,
                    direction: a.direction,
                    v: a.v,
                    model: self.normalize_model(a.model.as_ref()),
                    pickable,
                };
                if let Some(b) = next.as_ref().and_then(|m| m.get(&a.id)) {
                    state.lng = lerp(a.lng, b.lng, ratio);
                    state.lat = lerp(a.lat, b.lat, ratio);
                    state.direction = angle_interp(a.direction, b.direction, ratio);
                    state.v = lerp(a.v, b.v, ratio);
                }
                state
            })
            .collect()
    }
}

impl EntityPlayer for VehiclePlayer {
    fn kind(&self) -> LayerKind {
        LayerKind::Vehicle
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
            self.states(sample, t, pickable)
                .into_iter()
                .map(RenderRecord::Vehicle)
                .collect()
        })
    }

    fn reset(&mut self) {
        self.cache.reset();
    }
}
