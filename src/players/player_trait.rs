//! The common interface of the per-kind players.

use serde::Serialize;

use crate::players::pedestrian::{PedestrianPlayer, PedestrianState};
use crate::players::road_status::RoadStatusPlayer;
use crate::players::traffic_light::{StyledFeature, TrafficLightPlayer};
use crate::players::vehicle::{VehiclePlayer, VehicleState};
use crate::{LayerKind, ReplayError, SpatialBound};

/// One drawable item produced by a player for a single tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RenderRecord {
    /// An interpolated vehicle.
    Vehicle(VehicleState),
    /// An interpolated pedestrian.
    Pedestrian(PedestrianState),
    /// A junction lane colored by its signal phase.
    TrafficLight(StyledFeature),
    /// A road colored by its congestion level.
    RoadStatus(StyledFeature),
}

impl RenderRecord {
    /// The layer this record belongs to.
    #[must_use]
    pub const fn kind(&self) -> LayerKind {
        match self {
            RenderRecord::Vehicle(_) => LayerKind::Vehicle,
            RenderRecord::Pedestrian(_) => LayerKind::Pedestrian,
            RenderRecord::TrafficLight(_) => LayerKind::TrafficLight,
            RenderRecord::RoadStatus(_) => LayerKind::RoadStatus,
        }
    }
}

/// A per-kind adapter owning one [`FrameCache`](crate::FrameCache).
///
/// Every tick the driver first awaits [`ensure`](EntityPlayer::ensure) on all active
/// players, then calls [`render`](EntityPlayer::render), which only reads the cache.
#[allow(async_fn_in_trait)]
pub trait EntityPlayer {
    /// The layer this player draws.
    fn kind(&self) -> LayerKind;

    /// Makes the frames needed to render `t` available.
    ///
    /// # Errors
    ///
    /// Propagates the cache's fetch errors; rendering stays possible with whatever
    /// frames are already stored.
    async fn ensure(&mut self, t: f64, bound: Option<SpatialBound>) -> Result<(), ReplayError>;

    /// Produces the render records for `t`. Returns nothing when `t` is not covered.
    fn render(&self, t: f64, pickable: bool) -> Vec<RenderRecord>;

    /// Drops all cached frames and in-flight requests.
    fn reset(&mut self);
}

/// One player of any kind, as owned by a [`Replay`](crate::Replay).
#[derive(Debug)]
pub enum AnyPlayer {
    /// Vehicle player.
    Vehicle(VehiclePlayer),
    /// Pedestrian player.
    Pedestrian(PedestrianPlayer),
    /// Traffic-light player.
    TrafficLight(TrafficLightPlayer),
    /// Road-status player.
    RoadStatus(RoadStatusPlayer),
}

impl EntityPlayer for AnyPlayer {
    fn kind(&self) -> LayerKind {
        match self {
            AnyPlayer::Vehicle(p) => p.kind(),
            AnyPlayer::Pedestrian(p) => p.kind(),
            AnyPlayer::TrafficLight(p) => p.kind(),
            AnyPlayer::RoadStatus(p) => p.kind(),
        }
    }

    async fn ensure(&mut self, t: f64, bound: Option<SpatialBound>) -> Result<(), ReplayError> {
        match self {
            AnyPlayer::Vehicle(p) => p.ensure(t, bound).await,
            AnyPlayer::Pedestrian(p) => p.ensure(t, bound).await,
            AnyPlayer::TrafficLight(p) => p.ensure(t, bound).await,
            AnyPlayer::RoadStatus(p) => p.ensure(t, bound).await,
        }
    }

    fn render(&self, t: f64, pickable: bool) -> Vec<RenderRecord> {
        match self {
            AnyPlayer::Vehicle(p) => p.render(t, pickable),
            AnyPlayer::Pedestrian(p) => p.render(t, pickable),
            AnyPlayer::TrafficLight(p) => p.render(t, pickable),
            AnyPlayer::RoadStatus(p) => p.render(t, pickable),
        }
    }

    fn reset(&mut self) {
        match self {
            AnyPlayer::Vehicle(p) => p.reset(),
            AnyPlayer::Pedestrian(p) => p.reset(),
            AnyPlayer::TrafficLight(p) => p.reset(),
            AnyPlayer::RoadStatus(p) => p.reset(),
        }
    }
}

impl From<VehiclePlayer> for AnyPlayer {
    fn from(player: VehiclePlayer) -> Self {
        AnyPlayer::Vehicle(player)
    }
}

impl From<PedestrianPlayer> for AnyPlayer {
    fn from(player: PedestrianPlayer) -> Self {
        AnyPlayer::Pedestrian(player)
    }
}

impl From<TrafficLightPlayer> for AnyPlayer {
    fn from(player: TrafficLightPlayer) -> Self {
        AnyPlayer::TrafficLight(player)
    }
}

impl From<RoadStatusPlayer> for AnyPlayer {
    fn from(player: RoadStatusPlayer) -> Self {
        AnyPlayer::RoadStatus(player)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Rgba;

    #[test]
    fn record_kind_matches_variant() {
        let feature = StyledFeature {
            id: 1,
            color: Rgba::new(0, 0, 0, 0),
            pickable: false,
        };
        assert_eq!(
            RenderRecord::TrafficLight(feature.clone()).kind(),
            LayerKind::TrafficLight
        );
        assert_eq!(RenderRecord::RoadStatus(feature).kind(), LayerKind::RoadStatus);
    }
}
