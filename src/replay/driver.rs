//! The playback driver.
//!
//! A [`Replay`] owns the [`PlaybackState`], one player per configured entity kind and
//! the wall-clock bookkeeping of the fixed-rate loop. Each tick it advances the query
//! time, awaits every active player's `ensure` concurrently and collects the render
//! records of all of them.
//!
//! ```no_run
//! use replay_prefetch::{PlaybackEvent, ReplayBuilder, SimSpan};
//! use web_time::Instant;
//!
//! # async fn run() -> Result<(), replay_prefetch::ReplayError> {
//! let mut replay = ReplayBuilder::new().build()?;
//! replay.load_simulation(SimSpan::new(0.0, 3600.0)).await?;
//! replay.dispatch(PlaybackEvent::Play);
//!
//! let mut interval = tokio::time::interval(std::time::Duration::from_millis(5));
//! while replay.state().playing {
//!     interval.tick().await;
//!     if let Some(frame) = replay.tick(Instant::now()).await {
//!         // hand frame.records to the renderer
//!         # drop(frame);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use futures::future::join_all;
use smallvec::SmallVec;
use tokio::sync::watch;
use tracing::{debug, warn};
use web_time::{Duration, Instant};

use crate::players::player_trait::{AnyPlayer, EntityPlayer, RenderRecord};
use crate::replay::config::PlaybackConfig;
use crate::replay::playback::{PlaybackEvent, PlaybackState, SimSpan};
use crate::{EntityId, LayerKind, ReplayError, SpatialBound};

/// Fetch failures of one tick, one entry per failed layer. Inline for all four layers.
pub type FailureVec = SmallVec<[(LayerKind, ReplayError); 4]>;

/// Everything produced for one rendered instant.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedFrame {
    /// The time the records were rendered at (already floored when interpolation is off).
    pub t: f64,
    /// Records of all active players, grouped by player.
    pub records: Vec<RenderRecord>,
    /// Players whose `ensure` failed this tick. Their records were rendered from
    /// whatever frames were already cached.
    pub failures: FailureVec,
}

impl RenderedFrame {
    /// Returns `true` if every active player fetched successfully.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Iterates over the records of one layer.
    pub fn records_of(&self, kind: LayerKind) -> impl Iterator<Item = &RenderRecord> + '_ {
        self.records.iter().filter(move |r| r.kind() == kind)
    }
}

/// Decides whether a tick of the fixed-rate loop is due.
///
/// The loop may be polled more often than the target rate. A tick fires once at least
/// one interval has passed since the previous one; the reference point is then moved
/// to `now` minus the overshoot, so the average rate does not drift.
#[derive(Debug, Clone, Copy)]
pub struct FrameClock {
    interval: Duration,
    then: Option<Instant>,
}

impl FrameClock {
    /// Creates a clock ticking every `interval`.
    #[must_use]
    pub const fn new(interval: Duration) -> Self {
        Self {
            interval,
            then: None,
        }
    }

    /// The target interval between two ticks.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Returns `true` if a tick is due at `now`. The first poll always fires.
    pub fn poll(&mut self, now: Instant) -> bool {
        let Some(then) = self.then else {
            self.then = Some(now);
            return true;
        };
        let elapsed = now.saturating_duration_since(then);
        if elapsed < self.interval {
            return false;
        }
        let overshoot = elapsed.as_nanos() % self.interval.as_nanos().max(1);
        let overshoot = Duration::from_nanos(u64::try_from(overshoot).unwrap_or(0));
        self.then = Some(now.checked_sub(overshoot).unwrap_or(now));
        true
    }

    /// Forgets the reference point; the next poll fires.
    pub fn reset(&mut self) {
        self.then = None;
    }
}

/// Rate limiter for fetch-failure warnings.
///
/// A backend outage would otherwise log one warning per player per tick.
#[derive(Debug, Clone, Copy)]
pub struct FailureThrottle {
    min_interval: Duration,
    last: Option<Instant>,
    suppressed: usize,
}

impl FailureThrottle {
    /// Creates a throttle letting through at most one report per `min_interval`.
    #[must_use]
    pub const fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last: None,
            suppressed: 0,
        }
    }

    /// Records a failure at `now`. Returns `Some(n)` if it should be reported, where
    /// `n` is the number of failures suppressed since the previous report.
    pub fn should_report(&mut self, now: Instant) -> Option<usize> {
        let due = self
            .last
            .is_none_or(|last| now.saturating_duration_since(last) >= self.min_interval);
        if due {
            self.last = Some(now);
            Some(std::mem::take(&mut self.suppressed))
        } else {
            self.suppressed += 1;
            None
        }
    }

    /// Failures suppressed since the last report.
    #[must_use]
    pub const fn suppressed(&self) -> usize {
        self.suppressed
    }
}

/// Drives playback of one simulation across all configured entity kinds.
///
/// Created by [`ReplayBuilder::build`](crate::ReplayBuilder::build).
pub struct Replay {
    state: PlaybackState,
    players: Vec<AnyPlayer>,
    bound: Option<SpatialBound>,
    clock: FrameClock,
    throttle: FailureThrottle,
    /// Wall-clock time of the last tick that advanced playback.
    last_wall: Option<Instant>,
    state_tx: watch::Sender<PlaybackState>,
}

impl std::fmt::Debug for Replay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Destructure to ensure all fields are included when new fields are added.
        let Self {
            state,
            players,
            bound,
            clock,
            throttle,
            last_wall,
            state_tx,
        } = self;

        f.debug_struct("Replay")
            .field("state", state)
            .field("players", players)
            .field("bound", bound)
            .field("clock", clock)
            .field("throttle", throttle)
            .field("last_wall", last_wall)
            .field("subscribers", &state_tx.receiver_count())
            .finish()
    }
}

impl Replay {
    pub(crate) fn new(
        config: PlaybackConfig,
        players: Vec<AnyPlayer>,
        bound: Option<SpatialBound>,
    ) -> Self {
        let state = PlaybackState::new(&config);
        let (state_tx, _) = watch::channel(state.clone());
        Self {
            state,
            players,
            bound,
            clock: FrameClock::new(config.frame_interval()),
            throttle: FailureThrottle::new(config.failure_notice_interval),
            last_wall: None,
            state_tx,
        }
    }

    /// The current playback state.
    #[must_use]
    pub const fn state(&self) -> &PlaybackState {
        &self.state
    }

    /// Subscribes to playback state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<PlaybackState> {
        self.state_tx.subscribe()
    }

    /// Number of configured players.
    #[must_use]
    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    /// Kinds of the configured players, in render order.
    #[must_use]
    pub fn player_kinds(&self) -> Vec<LayerKind> {
        self.players.iter().map(EntityPlayer::kind).collect()
    }

    /// The configured players, in render order.
    #[must_use]
    pub fn players(&self) -> &[AnyPlayer] {
        &self.players
    }

    /// The spatial bound passed to every fetch.
    #[must_use]
    pub const fn bound(&self) -> Option<SpatialBound> {
        self.bound
    }

    /// Changes the spatial bound. Frames fetched under a different bound are dropped.
    pub fn set_bound(&mut self, bound: Option<SpatialBound>) {
        if self.bound != bound {
            debug!("spatial bound changed to {:?}, resetting players", bound);
            self.reset_players();
            self.bound = bound;
        }
    }

    /// Applies `event` to the playback state and publishes the result.
    ///
    /// Loading or unloading a simulation also drops every cached frame. A `Load` with
    /// an invalid span is ignored.
    pub fn dispatch(&mut self, event: PlaybackEvent) -> &PlaybackState {
        match event {
            PlaybackEvent::Load(span) => {
                if let Err(e) = span.validate() {
                    warn!("ignoring load of invalid simulation span: {}", e);
                    return &self.state;
                }
                self.reset_players();
            },
            PlaybackEvent::Unload => self.reset_players(),
            _ => {},
        }
        if event.resets_clock() {
            self.last_wall = None;
        }

        let next = self.state.apply(event);
        if next != self.state {
            debug!(
                "{:?}: t={} playing={} speed={}",
                event, next.query_time, next.playing, next.speed
            );
            self.state_tx.send_replace(next.clone());
            self.state = next;
        }
        &self.state
    }

    /// Applies `event` and, if it changes what is visible at the current time, renders
    /// the current time immediately.
    pub async fn handle(&mut self, event: PlaybackEvent) -> Option<RenderedFrame> {
        self.dispatch(event);
        if event.requires_render() && self.state.span.is_some() {
            Some(self.render_frame().await)
        } else {
            None
        }
    }

    /// Switches to another simulation: every cache is emptied, playback pauses at the
    /// start of `span` and that instant is rendered.
    ///
    /// # Errors
    ///
    /// Returns [`ReplayError::InvalidConfig`] if `span` fails validation.
    pub async fn load_simulation(&mut self, span: SimSpan) -> Result<RenderedFrame, ReplayError> {
        span.validate()?;
        self.dispatch(PlaybackEvent::Load(span));
        Ok(self.render_frame().await)
    }

    /// Replaces the style targets of the traffic-light or road-status layer.
    ///
    /// Returns `false` if no player of that kind paints style targets.
    pub fn update_style_targets(
        &mut self,
        kind: LayerKind,
        ids: impl IntoIterator<Item = EntityId>,
    ) -> bool {
        for player in &mut self.players {
            match (kind, player) {
                (LayerKind::TrafficLight, AnyPlayer::TrafficLight(p)) => {
                    p.update_style_targets(ids);
                    return true;
                },
                (LayerKind::RoadStatus, AnyPlayer::RoadStatus(p)) => {
                    p.update_style_targets(ids);
                    return true;
                },
                _ => {},
            }
        }
        false
    }

    /// One iteration of the fixed-rate loop.
    ///
    /// Returns `None` if no tick is due yet or playback is paused. Otherwise advances
    /// the query time by the wall-clock time elapsed since the previous tick (scaled by
    /// the speed) and renders the new time.
    pub async fn tick(&mut self, now: Instant) -> Option<RenderedFrame> {
        if !self.clock.poll(now) || !self.state.playing {
            return None;
        }
        let elapsed = self
            .last_wall
            .map_or(Duration::ZERO, |last| now.saturating_duration_since(last));
        self.last_wall = Some(now);
        self.dispatch(PlaybackEvent::Tick(elapsed));
        Some(self.render_at(now).await)
    }

    /// Ensures and renders the current time on every active player.
    ///
    /// Fetch failures never abort the frame: they are returned in
    /// [`RenderedFrame::failures`] and logged at most once per configured interval.
    pub async fn render_frame(&mut self) -> RenderedFrame {
        self.render_at(Instant::now()).await
    }

    async fn render_at(&mut self, now: Instant) -> RenderedFrame {
        let t = self.state.play_time();
        let pickable = self.state.pickable;
        let bound = self.bound;
        let state = &self.state;

        let results = join_all(
            self.players
                .iter_mut()
                .filter(|player| state.is_active(player.kind()))
                .map(|player| async move {
                    let kind = player.kind();
                    (kind, player.ensure(t, bound).await)
                }),
        )
        .await;

        let failures: FailureVec = results
            .into_iter()
            .filter_map(|(kind, result)| result.err().map(|e| (kind, e)))
            .collect();
        for (kind, error) in &failures {
            if let Some(suppressed) = self.throttle.should_report(now) {
                warn!(
                    "[{}] fetch failed at t={} ({} similar failures suppressed): {}",
                    kind, t, suppressed, error
                );
            }
        }

        let records = self
            .players
            .iter()
            .filter(|player| self.state.is_active(player.kind()))
            .flat_map(|player| player.render(t, pickable))
            .collect();

        RenderedFrame {
            t,
            records,
            failures,
        }
    }

    fn reset_players(&mut self) {
        for player in &mut self.players {
            player.reset();
        }
    }
}
