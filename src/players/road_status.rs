//! Road-status playback: roads colored by congestion level.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::color::{Rgba, CONGESTION_COLORS, UNKNOWN_COLOR};
use crate::fetch::{create_requests, FrameSource};
use crate::frame_cache::FrameCache;
use crate::players::player_trait::{EntityPlayer, RenderRecord};
use crate::players::traffic_light::{StyleTargets, SIGNAL_LOOKAHEAD};
use crate::replay::config::CacheConfig;
use crate::telemetry::ViolationObserver;
use crate::{EntityId, EntityRecord, LayerKind, ReplayError, SpatialBound};

/// Congestion level of one road.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum CongestionLevel {
    /// No data loaded for the road (code 0).
    Unloaded,
    /// Free flow (code 1).
    FreeFlow,
    /// Mostly free (code 2).
    MostlyFree,
    /// Light congestion (code 3).
    Light,
    /// Moderate congestion (code 4).
    Moderate,
    /// Heavy congestion (code 5).
    Heavy,
    /// Traffic restricted (code 6).
    Restricted,
    /// Any other code.
    Unknown(u8),
}

impl From<u8> for CongestionLevel {
    fn from(code: u8) -> Self {
        match code {
            0 => CongestionLevel::Unloaded,
            1 => CongestionLevel::FreeFlow,
            2 => CongestionLevel::MostlyFree,
            3 => CongestionLevel::Light,
            4 => CongestionLevel::Moderate,
            5 => CongestionLevel::Heavy,
            6 => CongestionLevel::Restricted,
            other => CongestionLevel::Unknown(other),
        }
    }
}

impl From<CongestionLevel> for u8 {
    fn from(level: CongestionLevel) -> Self {
        match level {
            CongestionLevel::Unloaded => 0,
            CongestionLevel::FreeFlow => 1,
            CongestionLevel::MostlyFree => 2,
            CongestionLevel::Light => 3,
            CongestionLevel::Moderate => 4,
            CongestionLevel::Heavy => 5,
            CongestionLevel::Restricted => 6,
            CongestionLevel::Unknown(code) => code,
        }
    }
}

impl CongestionLevel {
    /// Display color of this level.
    #[must_use]
    pub fn color(self) -> Rgba {
        CONGESTION_COLORS
            .get(usize::from(u8::from(self)))
            .copied()
            .unwrap_or(UNKNOWN_COLOR)
    }
}

/// One road in one frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RoadStatusRecord {
    /// Road id.
    pub id: EntityId,
    /// Congestion level.
    pub level: CongestionLevel,
}

impl EntityRecord for RoadStatusRecord {
    fn id(&self) -> EntityId {
        self.id
    }
}

/// Plays back congestion levels onto roads.
pub struct RoadStatusPlayer {
    cache: FrameCache<RoadStatusRecord>,
    source: Arc<dyn FrameSource<RoadStatusRecord>>,
    targets: StyleTargets,
    observer: Option<Arc<dyn ViolationObserver>>,
}

impl std::fmt::Debug for RoadStatusPlayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoadStatusPlayer")
            .field("cache", &self.cache)
            .field("style_targets", &self.targets.len())
            .finish_non_exhaustive()
    }
}

impl RoadStatusPlayer {
    /// Creates a player painting `roads` from `source`.
    ///
    /// # Errors
    ///
    /// Returns [`ReplayError::InvalidConfig`] if `config` fails validation.
    pub fn new(
        source: Arc<dyn FrameSource<RoadStatusRecord>>,
        config: CacheConfig,
        roads: impl IntoIterator<Item = EntityId>,
    ) -> Result<Self, ReplayError> {
        let mut player = Self {
            cache: FrameCache::new(config)?.with_label("road_status"),
            source,
            targets: StyleTargets::default(),
            observer: None,
        };
        player.update_style_targets(roads);
        Ok(player)
    }

    /// Routes violations of this player and its cache to `observer`.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn ViolationObserver>) -> Self {
        self.cache = self.cache.with_observer(Arc::clone(&observer));
        self.observer = Some(observer);
        self
    }

    /// Replaces the roads that are painted every tick.
    pub fn update_style_targets(&mut self, ids: impl IntoIterator<Item = EntityId>) {
        self.targets.replace(ids, &self.observer, "road_status");
    }

    /// The underlying cache.
    #[must_use]
    pub const fn cache(&self) -> &FrameCache<RoadStatusRecord> {
        &self.cache
    }
}

impl EntityPlayer for RoadStatusPlayer {
    fn kind(&self) -> LayerKind {
        LayerKind::RoadStatus
    }

    async fn ensure(&mut self, t: f64, bound: Option<SpatialBound>) -> Result<(), ReplayError> {
        let dt = self.cache.config().dt_hint;
        let source = Arc::clone(&self.source);
        self.cache
            .ensure(t - dt, t + SIGNAL_LOOKAHEAD, move |start, count, length| {
                create_requests(source.as_ref(), start, count, length, bound)
            })
            .await
    }

    fn render(&self, t: f64, pickable: bool) -> Vec<RenderRecord> {
        let Some(frame) = self.cache.latest_at(t) else {
            return Vec::new();
        };
        let colors: HashMap<EntityId, Rgba> = frame
            .data
            .iter()
            .map(|r| (r.id, r.level.color()))
            .collect();
        self.targets
            .paint(&colors, pickable)
            .into_iter()
            .map(RenderRecord::RoadStatus)
            .collect()
    }

    fn reset(&mut self) {
        self.cache.reset();
    }
}
