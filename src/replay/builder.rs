//! Assembly of a [`Replay`] from per-kind fetch sources.
//!
//! [`ReplayBuilder`] collects one [`FrameSource`] and [`CacheConfig`] per entity kind,
//! the style targets of the signal and road layers, an optional spatial bound and an
//! optional [`ViolationObserver`]. [`ReplayBuilder::build`] validates every config and
//! creates the players in draw order.

use std::sync::Arc;

use crate::fetch::FrameSource;
use crate::players::player_trait::AnyPlayer;
use crate::replay::config::{CacheConfig, PlaybackConfig};
use crate::replay::driver::Replay;
use crate::telemetry::ViolationObserver;
use crate::{
    EntityId, PedestrianPlayer, PedestrianRecord, ReplayError, RoadStatusPlayer,
    RoadStatusRecord, SpatialBound, TrafficLightPlayer, TrafficLightRecord, VehiclePlayer,
    VehicleRecord,
};

struct LayerSetup<R> {
    source: Arc<dyn FrameSource<R>>,
    config: CacheConfig,
}

struct StyledLayerSetup<R> {
    layer: LayerSetup<R>,
    targets: Vec<EntityId>,
}

/// The [`ReplayBuilder`] assembles a [`Replay`] from one fetch source per entity kind.
///
/// Every kind is optional; kinds without a source are simply never drawn. Configuring
/// the same kind twice replaces the earlier setup.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use futures::FutureExt;
/// use replay_prefetch::{
///     CacheConfig, FetchFuture, Frame, FrameSource, ReplayBuilder, RequestSpec,
///     SpatialBound, VehicleRecord,
/// };
///
/// let vehicles: Arc<dyn FrameSource<VehicleRecord>> = Arc::new(
///     |_spec: RequestSpec, _bound: Option<SpatialBound>| -> FetchFuture<VehicleRecord> {
///         async { Ok(Vec::<Frame<VehicleRecord>>::new()) }.boxed()
///     },
/// );
///
/// let replay = ReplayBuilder::new()
///     .with_vehicles(vehicles, CacheConfig::moving_entities())
///     .build()?;
/// assert_eq!(replay.player_count(), 1);
/// # Ok::<(), replay_prefetch::ReplayError>(())
/// ```
#[must_use = "ReplayBuilder must be consumed by calling build()"]
pub struct ReplayBuilder {
    playback_config: PlaybackConfig,
    vehicles: Option<LayerSetup<VehicleRecord>>,
    known_vehicle_models: Vec<String>,
    pedestrians: Option<LayerSetup<PedestrianRecord>>,
    traffic_lights: Option<StyledLayerSetup<TrafficLightRecord>>,
    road_status: Option<StyledLayerSetup<RoadStatusRecord>>,
    bound: Option<SpatialBound>,
    /// Optional observer for cache and style-target violations.
    violation_observer: Option<Arc<dyn ViolationObserver>>,
}

impl std::fmt::Debug for ReplayBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Destructure to ensure all fields are included when new fields are added.
        let Self {
            playback_config,
            vehicles,
            known_vehicle_models,
            pedestrians,
            traffic_lights,
            road_status,
            bound,
            violation_observer,
        } = self;

        f.debug_struct("ReplayBuilder")
            .field("playback_config", playback_config)
            .field("vehicles", &vehicles.as_ref().map(|l| l.config))
            .field("known_vehicle_models", known_vehicle_models)
            .field("pedestrians", &pedestrians.as_ref().map(|l| l.config))
            .field(
                "traffic_lights",
                &traffic_lights.as_ref().map(|l| (l.layer.config, l.targets.len())),
            )
            .field(
                "road_status",
                &road_status.as_ref().map(|l| (l.layer.config, l.targets.len())),
            )
            .field("bound", bound)
            .field("has_violation_observer", &violation_observer.is_some())
            .finish()
    }
}

impl Default for ReplayBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ReplayBuilder {
    /// Creates a builder without any entity kind and with default playback settings.
    pub fn new() -> Self {
        Self {
            playback_config: PlaybackConfig::default(),
            vehicles: None,
            known_vehicle_models: Vec::new(),
            pedestrians: None,
            traffic_lights: None,
            road_status: None,
            bound: None,
            violation_observer: None,
        }
    }

    /// Sets the initial playback state and tick rate.
    pub fn with_playback_config(mut self, config: PlaybackConfig) -> Self {
        self.playback_config = config;
        self
    }

    /// Plays back vehicles fetched from `source`.
    pub fn with_vehicles(
        mut self,
        source: Arc<dyn FrameSource<VehicleRecord>>,
        config: CacheConfig,
    ) -> Self {
        self.vehicles = Some(LayerSetup { source, config });
        self
    }

    /// Sets the vehicle model names the renderer has meshes for.
    pub fn with_known_vehicle_models<I, S>(mut self, models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.known_vehicle_models = models.into_iter().map(Into::into).collect();
        self
    }

    /// Plays back pedestrians fetched from `source`.
    pub fn with_pedestrians(
        mut self,
        source: Arc<dyn FrameSource<PedestrianRecord>>,
        config: CacheConfig,
    ) -> Self {
        self.pedestrians = Some(LayerSetup { source, config });
        self
    }

    /// Paints `junction_lanes` with traffic-light phases fetched from `source`.
    pub fn with_traffic_lights(
        mut self,
        source: Arc<dyn FrameSource<TrafficLightRecord>>,
        config: CacheConfig,
        junction_lanes: impl IntoIterator<Item = EntityId>,
    ) -> Self {
        self.traffic_lights = Some(StyledLayerSetup {
            layer: LayerSetup { source, config },
            targets: junction_lanes.into_iter().collect(),
        });
        self
    }

    /// Paints `roads` with congestion levels fetched from `source`.
    pub fn with_road_status(
        mut self,
        source: Arc<dyn FrameSource<RoadStatusRecord>>,
        config: CacheConfig,
        roads: impl IntoIterator<Item = EntityId>,
    ) -> Self {
        self.road_status = Some(StyledLayerSetup {
            layer: LayerSetup { source, config },
            targets: roads.into_iter().collect(),
        });
        self
    }

    /// Sets the initial spatial bound passed to every fetch.
    pub fn with_bound(mut self, bound: SpatialBound) -> Self {
        self.bound = Some(bound);
        self
    }

    /// Sets a violation observer for every cache and style-target list of the replay.
    ///
    /// # Example
    ///
    /// ```
    /// use replay_prefetch::ReplayBuilder;
    /// use replay_prefetch::telemetry::CollectingObserver;
    /// use std::sync::Arc;
    ///
    /// let observer = Arc::new(CollectingObserver::new());
    /// let replay = ReplayBuilder::new()
    ///     .with_violation_observer(observer.clone())
    ///     .build()?;
    /// assert!(observer.is_empty());
    /// # drop(replay);
    /// # Ok::<(), replay_prefetch::ReplayError>(())
    /// ```
    pub fn with_violation_observer(mut self, observer: Arc<dyn ViolationObserver>) -> Self {
        self.violation_observer = Some(observer);
        self
    }

    /// Validates every configuration and creates the [`Replay`].
    ///
    /// Players are ordered traffic lights, pedestrians, vehicles, road status, which
    /// is also the order of their records in every
    /// [`RenderedFrame`](crate::RenderedFrame).
    ///
    /// # Errors
    ///
    /// Returns [`ReplayError::InvalidConfig`] if the playback configuration or any
    /// cache configuration fails validation.
    pub fn build(self) -> Result<Replay, ReplayError> {
        self.playback_config.validate()?;
        let observer = self.violation_observer;
        let mut players: Vec<AnyPlayer> = Vec::with_capacity(4);

        if let Some(setup) = self.traffic_lights {
            let mut player =
                TrafficLightPlayer::new(setup.layer.source, setup.layer.config, Vec::new())?;
            if let Some(observer) = &observer {
                player = player.with_observer(Arc::clone(observer));
            }
            player.update_style_targets(setup.targets);
            players.push(player.into());
        }
        if let Some(setup) = self.pedestrians {
            let mut player = PedestrianPlayer::new(setup.source, setup.config)?;
            if let Some(observer) = &observer {
                player = player.with_observer(Arc::clone(observer));
            }
            players.push(player.into());
        }
        if let Some(setup) = self.vehicles {
            let mut player = VehiclePlayer::new(setup.source, setup.config)?
                .with_known_models(self.known_vehicle_models);
            if let Some(observer) = &observer {
                player = player.with_observer(Arc::clone(observer));
            }
            players.push(player.into());
        }
        if let Some(setup) = self.road_status {
            let mut player =
                RoadStatusPlayer::new(setup.layer.source, setup.layer.config, Vec::new())?;
            if let Some(observer) = &observer {
                player = player.with_observer(Arc::clone(observer));
            }
            player.update_style_targets(setup.targets);
            players.push(player.into());
        }

        Ok(Replay::new(self.playback_config, players, self.bound))
    }
}
