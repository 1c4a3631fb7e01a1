//! Configuration types for frame caches and playback.
//!
//! # Overview
//!
//! | Config Type | Purpose | Key Presets |
//! |-------------|---------|-------------|
//! | `CacheConfig` | Chunking and look-ahead of one [`FrameCache`](crate::FrameCache) | `moving_entities()`, `signals()`, `road_status()`, `high_latency()` |
//! | `PlaybackConfig` | Initial playback state and tick rate of a [`Replay`](crate::Replay) | `default()` |
//!
//! # Example
//!
//! ```
//! use replay_prefetch::{CacheConfig, PlaybackConfig};
//!
//! let cache = CacheConfig::road_status(5.0);
//! assert_eq!(cache.prefetch_length, 15.0);
//! assert!(cache.validate().is_ok());
//!
//! let playback = PlaybackConfig {
//!     fps: 60,
//!     ..PlaybackConfig::default()
//! };
//! assert!(playback.validate().is_ok());
//! ```

use web_time::Duration;

use crate::{ReplayError, DEFAULT_DT_HINT, DEFAULT_PREFETCH_LENGTH, DEFAULT_PREFETCH_NUM};

/// Configuration of one [`FrameCache`](crate::FrameCache).
///
/// # Forward Compatibility
///
/// New fields may be added to this struct in future versions. To ensure your
/// code continues to compile, always use the `..CacheConfig::default()` pattern
/// when constructing instances.
///
/// # Example
///
/// ```
/// use replay_prefetch::CacheConfig;
/// use web_time::Duration;
///
/// // Slow backend: bigger chunks, and give up on a chunk after two seconds.
/// let config = CacheConfig {
///     prefetch_length: 10.0,
///     fetch_timeout: Some(Duration::from_secs(2)),
///     ..CacheConfig::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[must_use = "CacheConfig has no effect unless passed to a FrameCache or player"]
pub struct CacheConfig {
    /// Expected spacing between consecutive frames. Used as the tolerance for seek
    /// detection and as the margin kept behind the window on eviction.
    ///
    /// Default: 1.0
    pub dt_hint: f64,

    /// Length of the time interval covered by one fetch request.
    ///
    /// Default: 3.0
    pub prefetch_length: f64,

    /// Number of look-ahead chunks kept in flight beyond the current window.
    ///
    /// Default: 3
    pub prefetch_num: usize,

    /// Maximum time to wait for a single chunk. `None` waits forever.
    ///
    /// Default: `None`
    pub fetch_timeout: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dt_hint: DEFAULT_DT_HINT,
            prefetch_length: DEFAULT_PREFETCH_LENGTH,
            prefetch_num: DEFAULT_PREFETCH_NUM,
            fetch_timeout: None,
        }
    }
}

impl CacheConfig {
    /// Creates a new `CacheConfig` with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Preset for vehicles and pedestrians: one frame per step, three-step chunks.
    pub fn moving_entities() -> Self {
        Self::default()
    }

    /// Preset for traffic-light phases.
    pub fn signals() -> Self {
        Self::default()
    }

    /// Preset for road congestion, which is usually recorded far more sparsely than
    /// entity positions. Chunks span three samples.
    pub fn road_status(dt_hint: f64) -> Self {
        Self {
            dt_hint,
            prefetch_length: 3.0 * dt_hint,
            ..Self::default()
        }
    }

    /// Preset for slow or remote backends: longer chunks, a deeper look-ahead
    /// queue, and a per-chunk timeout.
    pub fn high_latency() -> Self {
        Self {
            dt_hint: DEFAULT_DT_HINT,
            prefetch_length: 6.0,
            prefetch_num: 5,
            fetch_timeout: Some(Duration::from_secs(10)),
        }
    }

    /// Returns a copy with `dt_hint` replaced.
    pub fn with_dt_hint(self, dt_hint: f64) -> Self {
        Self { dt_hint, ..self }
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ReplayError::InvalidConfig`] if `dt_hint` or `prefetch_length` is not a
    /// positive finite number, if `prefetch_num` is zero, or if `fetch_timeout` is zero.
    pub fn validate(&self) -> Result<(), ReplayError> {
        if !(self.dt_hint.is_finite() && self.dt_hint > 0.0) {
            return Err(ReplayError::invalid_config(format!(
                "dt_hint must be positive and finite, got {}",
                self.dt_hint
            )));
        }
        if !(self.prefetch_length.is_finite() && self.prefetch_length > 0.0) {
            return Err(ReplayError::invalid_config(format!(
                "prefetch_length must be positive and finite, got {}",
                self.prefetch_length
            )));
        }
        if self.prefetch_num == 0 {
            return Err(ReplayError::invalid_config("prefetch_num must be at least 1"));
        }
        if self.fetch_timeout == Some(Duration::ZERO) {
            return Err(ReplayError::invalid_config(
                "fetch_timeout must be non-zero when set",
            ));
        }
        Ok(())
    }
}

/// Initial playback state and tick rate of a [`Replay`](crate::Replay).
///
/// # Forward Compatibility
///
/// New fields may be added to this struct in future versions. Use the
/// `..PlaybackConfig::default()` pattern when constructing instances.
#[derive(Debug, Clone, Copy, PartialEq)]
#[must_use = "PlaybackConfig has no effect unless passed to ReplayBuilder::with_playback_config()"]
pub struct PlaybackConfig {
    /// Target render rate of the fixed-rate loop.
    ///
    /// Default: 30
    pub fps: u32,

    /// Simulation steps advanced per wall-clock second at startup.
    ///
    /// Default: 1.0
    pub initial_speed: f64,

    /// Whether moving entities are interpolated between frames.
    ///
    /// Default: true
    pub interpolate: bool,

    /// Whether rendered records can be picked by the renderer.
    ///
    /// Default: false
    pub pickable: bool,

    /// Minimum interval between two logged fetch-failure warnings.
    ///
    /// Default: 5s
    pub failure_notice_interval: Duration,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            fps: 30,
            initial_speed: 1.0,
            interpolate: true,
            pickable: false,
            failure_notice_interval: Duration::from_secs(5),
        }
    }
}

impl PlaybackConfig {
    /// Creates a new `PlaybackConfig` with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wall-clock interval between two ticks of the fixed-rate loop.
    #[must_use]
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs(1) / self.fps.max(1)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ReplayError::InvalidConfig`] if `fps` is outside `1..=240` or
    /// `initial_speed` is not a positive finite number.
    pub fn validate(&self) -> Result<(), ReplayError> {
        if !(1..=240).contains(&self.fps) {
            return Err(ReplayError::invalid_config(format!(
                "fps must be within 1..=240, got {}",
                self.fps
            )));
        }
        if !(self.initial_speed.is_finite() && self.initial_speed > 0.0) {
            return Err(ReplayError::invalid_config(format!(
                "initial_speed must be positive and finite, got {}",
                self.initial_speed
            )));
        }
        Ok(())
    }
}
