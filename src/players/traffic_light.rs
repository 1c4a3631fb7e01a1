//! Traffic-light playback: junction lanes colored by their signal phase.
//!
//! Signal-like kinds have no meaningful in-between state, so rendering uses the frame
//! at or before the query time. Every style target is emitted every tick; targets
//! without a record get [`UNKNOWN_COLOR`].

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::color::{Rgba, SIGNAL_COLORS, UNKNOWN_COLOR};
use crate::fetch::{create_requests, FrameSource};
use crate::frame_cache::FrameCache;
use crate::players::player_trait::{EntityPlayer, RenderRecord};
use crate::replay::config::CacheConfig;
use crate::telemetry::{ViolationKind, ViolationObserver, ViolationSeverity};
use crate::{report_violation_to, EntityId, EntityRecord, LayerKind, ReplayError, SpatialBound};

/// How far past the query time signal-like kinds are ensured.
pub const SIGNAL_LOOKAHEAD: f64 = 1.0;

/// Phase of one signal-controlled lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum SignalState {
    /// Not signal controlled (code 0).
    NoSignal,
    /// Red (code 1).
    Red,
    /// Green (code 2).
    Green,
    /// Yellow (code 3).
    Yellow,
    /// Any other code.
    Unknown(u8),
}

impl From<u8> for SignalState {
    fn from(code: u8) -> Self {
        match code {
            0 => SignalState::NoSignal,
            1 => SignalState::Red,
            2 => SignalState::Green,
            3 => SignalState::Yellow,
            other => SignalState::Unknown(other),
        }
    }
}

impl From<SignalState> for u8 {
    fn from(state: SignalState) -> Self {
        match state {
            SignalState::NoSignal => 0,
            SignalState::Red => 1,
            SignalState::Green => 2,
            SignalState::Yellow => 3,
            SignalState::Unknown(code) => code,
        }
    }
}

impl SignalState {
    /// Display color of this phase.
    #[must_use]
    pub fn color(self) -> Rgba {
        SIGNAL_COLORS
            .get(usize::from(u8::from(self)))
            .copied()
            .unwrap_or(UNKNOWN_COLOR)
    }
}

/// One signal-controlled lane in one frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrafficLightRecord {
    /// Junction lane id.
    pub id: EntityId,
    /// Signal phase.
    pub state: SignalState,
}

impl EntityRecord for TrafficLightRecord {
    fn id(&self) -> EntityId {
        self.id
    }
}

/// A static geometry feature with the color it should be drawn in this tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StyledFeature {
    /// Id of the geometry feature.
    pub id: EntityId,
    /// Fill and line color.
    pub color: Rgba,
    /// Whether the renderer may pick this feature.
    pub pickable: bool,
}

/// The ordered, duplicate-free ids of a static geometry layer.
#[derive(Debug, Clone, Default)]
pub(crate) struct StyleTargets {
    ids: Vec<EntityId>,
}

impl StyleTargets {
    /// Replaces the targets, keeping first occurrences of duplicated ids.
    pub(crate) fn replace(
        &mut self,
        ids: impl IntoIterator<Item = EntityId>,
        observer: &Option<Arc<dyn ViolationObserver>>,
        label: &str,
    ) {
        let mut seen = BTreeSet::new();
        let mut duplicates = 0_usize;
        self.ids = ids
            .into_iter()
            .filter(|id| {
                let fresh = seen.insert(*id);
                if !fresh {
                    duplicates += 1;
                }
                fresh
            })
            .collect();
        if duplicates > 0 {
            report_violation_to!(
                observer,
                ViolationSeverity::Warning,
                ViolationKind::StyleTarget,
                "[{}] {} duplicated style target id(s) ignored",
                label,
                duplicates
            );
        }
    }

    /// Colors every target, falling back to [`UNKNOWN_COLOR`].
    pub(crate) fn paint(
        &self,
        colors: &HashMap<EntityId, Rgba>,
        pickable: bool,
    ) -> Vec<StyledFeature> {
        self.ids
            .iter()
            .map(|id| StyledFeature {
                id: *id,
                color: colors.get(id).copied().unwrap_or(UNKNOWN_COLOR),
                pickable,
            })
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.ids.len()
    }
}

/// Plays back traffic-light phases onto junction lanes.
pub struct TrafficLightPlayer {
    cache: FrameCache<TrafficLightRecord>,
    source: Arc<dyn FrameSource<TrafficLightRecord>>,
    targets: StyleTargets,
    observer: Option<Arc<dyn ViolationObserver>>,
}

impl std::fmt::Debug for TrafficLightPlayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrafficLightPlayer")
            .field("cache", &self.cache)
            .field("style_targets", &self.targets.len())
            .finish_non_exhaustive()
    }
}

impl TrafficLightPlayer {
    /// Creates a player painting `junction_lanes` from `source`.
    ///
    /// # Errors
    ///
    /// Returns [`ReplayError::InvalidConfig`] if `config` fails validation.
    pub fn new(
        source: Arc<dyn FrameSource<TrafficLightRecord>>,
        config: CacheConfig,
        junction_lanes: impl IntoIterator<Item = EntityId>,
    ) -> Result<Self, ReplayError> {
        let mut player = Self {
            cache: FrameCache::new(config)?.with_label("traffic_light"),
            source,
            targets: StyleTargets::default(),
            observer: None,
        };
        player.update_style_targets(junction_lanes);
        Ok(player)
    }

    /// Routes violations of this player and its cache to `observer`.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn ViolationObserver>) -> Self {
        self.cache = self.cache.with_observer(Arc::clone(&observer));
        self.observer = Some(observer);
        self
    }

    /// Replaces the junction lanes that are painted every tick.
    pub fn update_style_targets(&mut self, ids: impl IntoIterator<Item = EntityId>) {
        self.targets.replace(ids, &self.observer, "traffic_light");
    }

    /// The underlying cache.
    #[must_use]
    pub const fn cache(&self) -> &FrameCache<TrafficLightRecord> {
        &self.cache
    }
}

impl EntityPlayer for TrafficLightPlayer {
    fn kind(&self) -> LayerKind {
        LayerKind::TrafficLight
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
            .map(|r| (r.id, r.state.color()))
            .collect();
        self.targets
            .paint(&colors, pickable)
            .into_iter()
            .map(RenderRecord::TrafficLight)
            .collect()
    }

    fn reset(&mut self) {
        self.cache.reset();
    }
}
