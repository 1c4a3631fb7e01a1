//! The playback state machine.
//!
//! [`PlaybackState`] is plain data; the only way to change it is
//! [`PlaybackState::apply`], which maps a state and a [`PlaybackEvent`] to the next
//! state without side effects. The [`Replay`](crate::Replay) driver owns one state,
//! applies incoming events and publishes every new state to subscribers.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use web_time::Duration;

use crate::replay::config::PlaybackConfig;
use crate::{LayerKind, ReplayError};

/// The time range of a loaded simulation: `[start, start + steps]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimSpan {
    /// First step of the simulation.
    pub start: f64,
    /// Number of steps recorded.
    pub steps: f64,
}

impl SimSpan {
    /// Creates a span of `steps` steps starting at `start`.
    #[must_use]
    pub const fn new(start: f64, steps: f64) -> Self {
        Self { start, steps }
    }

    /// Last playable time.
    #[must_use]
    pub fn end(&self) -> f64 {
        self.start + self.steps
    }

    /// Clamps `t` into the span.
    #[must_use]
    pub fn clamp(&self, t: f64) -> f64 {
        t.clamp(self.start, self.end())
    }

    /// Validates the span.
    ///
    /// # Errors
    ///
    /// Returns [`ReplayError::InvalidConfig`] if `start` is not finite or `steps` is not a
    /// non-negative finite number.
    pub fn validate(&self) -> Result<(), ReplayError> {
        if !self.start.is_finite() || !(self.steps.is_finite() && self.steps >= 0.0) {
            return Err(ReplayError::invalid_config(format!(
                "simulation span must be finite with non-negative steps, got start={} steps={}",
                self.start, self.steps
            )));
        }
        Ok(())
    }
}

/// Everything that can change the playback state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlaybackEvent {
    /// A simulation was selected. Playback stops and rewinds to its start.
    Load(SimSpan),
    /// The simulation was deselected.
    Unload,
    /// Start advancing time on every tick.
    Play,
    /// Stop advancing time.
    Pause,
    /// Change the simulation steps per wall-clock second. Non-positive values are ignored.
    SetSpeed(f64),
    /// Jump to a time (clamped into the span).
    Seek(f64),
    /// Jump relative to the current time.
    Step(f64),
    /// Wall-clock time elapsed since the previous tick.
    Tick(Duration),
    /// Show or hide one layer.
    SetLayer(LayerKind, bool),
    /// Show or hide vehicles, pedestrians and traffic lights together.
    SetMicroLayers(bool),
    /// Show or hide road status.
    SetMacroLayers(bool),
    /// Enable or disable interpolation of moving entities.
    SetInterpolate(bool),
    /// Enable or disable picking of rendered records.
    SetPickable(bool),
}

impl PlaybackEvent {
    /// Returns `true` for events after which the current time should be re-rendered
    /// immediately rather than on the next tick.
    #[must_use]
    pub const fn requires_render(&self) -> bool {
        !matches!(
            self,
            PlaybackEvent::Unload
                | PlaybackEvent::Play
                | PlaybackEvent::Pause
                | PlaybackEvent::SetSpeed(_)
                | PlaybackEvent::Tick(_)
        )
    }

    /// Returns `true` for events that make the next wall-clock delta meaningless.
    #[must_use]
    pub const fn resets_clock(&self) -> bool {
        matches!(
            self,
            PlaybackEvent::Load(_)
                | PlaybackEvent::Play
                | PlaybackEvent::Seek(_)
                | PlaybackEvent::Step(_)
        )
    }
}

/// Observable playback state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaybackState {
    /// Current simulation time.
    pub query_time: f64,
    /// Whether time advances on ticks.
    pub playing: bool,
    /// Simulation steps per wall-clock second.
    pub speed: f64,
    /// Whether moving entities are interpolated.
    pub interpolate: bool,
    /// Whether rendered records are pickable.
    pub pickable: bool,
    /// Layers that are fetched and rendered.
    pub active_layers: BTreeSet<LayerKind>,
    /// The loaded simulation, if any.
    pub span: Option<SimSpan>,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self::new(&PlaybackConfig::default())
    }
}

impl PlaybackState {
    /// Initial state: nothing loaded, every layer active.
    #[must_use]
    pub fn new(config: &PlaybackConfig) -> Self {
        Self {
            query_time: 0.0,
            playing: false,
            speed: config.initial_speed,
            interpolate: config.interpolate,
            pickable: config.pickable,
            active_layers: LayerKind::ALL.into_iter().collect(),
            span: None,
        }
    }

    /// Returns the state after `event`.
    #[must_use]
    pub fn apply(&self, event: PlaybackEvent) -> Self {
        let mut next = self.clone();
        match event {
            PlaybackEvent::Load(span) => {
                next.span = Some(span);
                next.query_time = span.start;
                next.playing = false;
            },
            PlaybackEvent::Unload => {
                next.span = None;
                next.query_time = 0.0;
                next.playing = false;
            },
            PlaybackEvent::Play => next.playing = next.span.is_some(),
            PlaybackEvent::Pause => next.playing = false,
            PlaybackEvent::SetSpeed(speed) => {
                if speed.is_finite() && speed > 0.0 {
                    next.speed = speed;
                }
            },
            PlaybackEvent::Seek(t) => next.seek(t),
            PlaybackEvent::Step(delta) => next.seek(self.query_time + delta),
            PlaybackEvent::Tick(elapsed) => {
                if let (true, Some(span)) = (next.playing, next.span) {
                    next.query_time =
                        span.clamp(next.query_time + elapsed.as_secs_f64() * next.speed);
                    if next.query_time >= span.end() {
                        next.playing = false;
                    }
                }
            },
            PlaybackEvent::SetLayer(kind, on) => next.set_layer(kind, on),
            PlaybackEvent::SetMicroLayers(on) => {
                for kind in LayerKind::ALL.into_iter().filter(|k| k.is_micro()) {
                    next.set_layer(kind, on);
                }
            },
            PlaybackEvent::SetMacroLayers(on) => {
                for kind in LayerKind::ALL.into_iter().filter(|k| !k.is_micro()) {
                    next.set_layer(kind, on);
                }
            },
            PlaybackEvent::SetInterpolate(on) => next.interpolate = on,
            PlaybackEvent::SetPickable(on) => next.pickable = on,
        }
        next
    }

    /// The time players are asked to render: floored when interpolation is off, so
    /// that moving entities snap to recorded frames.
    #[must_use]
    pub fn play_time(&self) -> f64 {
        if self.interpolate {
            self.query_time
        } else {
            self.query_time.floor()
        }
    }

    /// Returns `true` if `kind` is fetched and rendered.
    #[must_use]
    pub fn is_active(&self, kind: LayerKind) -> bool {
        self.active_layers.contains(&kind)
    }

    /// Returns `true` once the query time reached the end of the loaded simulation.
    #[must_use]
    pub fn is_at_end(&self) -> bool {
        self.span.is_some_and(|span| self.query_time >= span.end())
    }

    fn seek(&mut self, t: f64) {
        if let (true, Some(span)) = (t.is_finite(), self.span) {
            self.query_time = span.clamp(t);
        }
    }

    fn set_layer(&mut self, kind: LayerKind, on: bool) {
        if on {
            self.active_layers.insert(kind);
        } else {
            self.active_layers.remove(&kind);
        }
    }
}
