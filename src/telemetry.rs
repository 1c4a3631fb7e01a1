//! Structured reporting of recoverable contract violations.
//!
//! A [`FrameCache`](crate::FrameCache) trusts its fetch collaborator but checks it.
//! Request specs that do not chain from the scheduler's cursor, frames whose time
//! cannot be ordered, or frames outside the interval they were requested for are
//! recovered from and reported as a [`SpecViolation`]. By default violations are
//! logged through `tracing`; a [`ViolationObserver`] can collect them instead.
//!
//! ```
//! use replay_prefetch::telemetry::{CollectingObserver, ViolationKind};
//!
//! let observer = CollectingObserver::new();
//! assert!(observer.is_empty());
//! assert!(!observer.has_violation(ViolationKind::RequestSequence));
//! ```

use parking_lot::Mutex;
use std::sync::Arc;

/// How bad a violation is, from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationSeverity {
    /// Recovered with a fallback, e.g. a request that did not start at the cursor.
    Warning,
    /// Data was dropped, e.g. a frame with a non-finite time.
    Error,
    /// Cached state no longer upholds its invariants.
    Critical,
}

impl ViolationSeverity {
    /// Label used in log fields.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }
}

impl std::fmt::Display for ViolationSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What kind of contract was broken.
///
/// # Forward Compatibility
///
/// This enum is marked `#[non_exhaustive]` because new violation categories
/// may be added in future versions. Always include a wildcard arm when matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum ViolationKind {
    /// The request constructor returned the wrong number of specs, or specs that
    /// do not chain from the scheduler's cursor.
    RequestSequence,
    /// A fetch returned frames whose time is not a finite number.
    FrameOrder,
    /// A fetch returned frames outside the half-open interval it was issued for.
    OutOfRange,
    /// A style-target list named the same entity twice.
    StyleTarget,
    /// A runtime invariant check failed.
    ///
    /// Only checked in debug builds or when the `paranoid` feature is enabled.
    Invariant,
}

impl ViolationKind {
    /// Label used in log fields.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::RequestSequence => "request_sequence",
            Self::FrameOrder => "frame_order",
            Self::OutOfRange => "out_of_range",
            Self::StyleTarget => "style_target",
            Self::Invariant => "invariant",
        }
    }
}

impl std::fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One reported violation.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct SpecViolation {
    /// How bad it is.
    pub severity: ViolationSeverity,
    /// What was broken.
    pub kind: ViolationKind,
    /// Human-readable description.
    pub message: String,
    /// `file:line` of the report.
    pub location: &'static str,
}

impl SpecViolation {
    /// Creates a violation.
    #[must_use]
    pub fn new(
        severity: ViolationSeverity,
        kind: ViolationKind,
        message: impl Into<String>,
        location: &'static str,
    ) -> Self {
        Self {
            severity,
            kind,
            message: message.into(),
            location,
        }
    }

    /// Serializes this violation to a JSON object string.
    #[cfg(feature = "json")]
    #[must_use]
    pub fn to_json(&self) -> Option<String> {
        serde_json::to_string(self).ok()
    }
}

impl std::fmt::Display for SpecViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}/{}] {} (at {})",
            self.severity, self.kind, self.message, self.location
        )
    }
}

/// Receives violations from every cache and player of a [`Replay`](crate::Replay).
///
/// Implementations are called while `ensure` applies fetched frames and should
/// return quickly.
pub trait ViolationObserver: Send + Sync {
    /// Called once per violation.
    fn on_violation(&self, violation: &SpecViolation);
}

/// Logs violations through `tracing`: warnings with `warn!`, everything else
/// with `error!`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl ViolationObserver for TracingObserver {
    fn on_violation(&self, violation: &SpecViolation) {
        let severity = violation.severity.as_str();
        let kind = violation.kind.as_str();
        let location = violation.location;
        match violation.severity {
            ViolationSeverity::Warning => {
                tracing::warn!(severity, kind, location, "{}", violation.message);
            },
            ViolationSeverity::Error | ViolationSeverity::Critical => {
                tracing::error!(severity, kind, location, "{}", violation.message);
            },
        }
    }
}

/// Keeps every violation in memory, for tests.
///
/// ```
/// use replay_prefetch::telemetry::{
///     CollectingObserver, SpecViolation, ViolationKind, ViolationObserver, ViolationSeverity,
/// };
///
/// let observer = CollectingObserver::new();
/// observer.on_violation(&SpecViolation::new(
///     ViolationSeverity::Warning,
///     ViolationKind::OutOfRange,
///     "2 frame(s) outside [3, 6)",
///     "cache.rs:1",
/// ));
/// assert_eq!(observer.len(), 1);
/// assert!(observer.has_violation(ViolationKind::OutOfRange));
/// ```
#[derive(Debug, Default)]
pub struct CollectingObserver {
    violations: Mutex<Vec<SpecViolation>>,
}

impl CollectingObserver {
    /// Creates an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of everything collected so far.
    #[must_use]
    pub fn violations(&self) -> Vec<SpecViolation> {
        self.violations.lock().clone()
    }

    /// Number of collected violations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.violations.lock().len()
    }

    /// Returns `true` if nothing was collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.violations.lock().is_empty()
    }

    /// Returns `true` if a violation of `kind` was collected.
    #[must_use]
    pub fn has_violation(&self, kind: ViolationKind) -> bool {
        self.violations.lock().iter().any(|v| v.kind == kind)
    }

    /// Forgets everything collected.
    pub fn clear(&self) {
        self.violations.lock().clear();
    }
}

impl ViolationObserver for CollectingObserver {
    fn on_violation(&self, violation: &SpecViolation) {
        self.violations.lock().push(violation.clone());
    }
}

/// Forwards `violation` to `observer`, or logs it with [`TracingObserver`] when there is none.
pub fn report_to_observer<O: ViolationObserver + ?Sized>(
    observer: Option<&Arc<O>>,
    violation: &SpecViolation,
) {
    match observer {
        Some(obs) => obs.on_violation(violation),
        None => TracingObserver.on_violation(violation),
    }
}

/// Logs a violation, tagged with the calling `file:line`, through [`TracingObserver`].
///
/// ```
/// use replay_prefetch::{report_violation, telemetry::{ViolationKind, ViolationSeverity}};
///
/// report_violation!(ViolationSeverity::Warning, ViolationKind::RequestSequence,
///     "expected start={}, got {}", 12.0, 15.0);
/// ```
#[macro_export]
macro_rules! report_violation {
    ($severity:expr, $kind:expr, $($arg:tt)+) => {{
        use $crate::telemetry::ViolationObserver as _;
        let violation = $crate::telemetry::SpecViolation::new(
            $severity,
            $kind,
            format!($($arg)+),
            concat!(file!(), ":", line!()),
        );
        $crate::telemetry::TracingObserver.on_violation(&violation);
    }};
}

/// Reports a violation to an `&Option<Arc<dyn ViolationObserver>>`, falling back to tracing.
///
/// ```
/// use std::sync::Arc;
/// use replay_prefetch::report_violation_to;
/// use replay_prefetch::telemetry::{
///     CollectingObserver, ViolationKind, ViolationObserver, ViolationSeverity,
/// };
///
/// let collector = Arc::new(CollectingObserver::new());
/// let observer: Option<Arc<dyn ViolationObserver>> = Some(collector.clone());
/// report_violation_to!(&observer, ViolationSeverity::Warning, ViolationKind::RequestSequence,
///     "expected start={}, got {}", 12.0, 15.0);
/// assert_eq!(collector.len(), 1);
/// ```
#[macro_export]
macro_rules! report_violation_to {
    ($observer:expr, $severity:expr, $kind:expr, $($arg:tt)+) => {{
        let violation = $crate::telemetry::SpecViolation::new(
            $severity,
            $kind,
            format!($($arg)+),
            concat!(file!(), ":", line!()),
        );
        $crate::telemetry::report_to_observer($observer.as_ref(), &violation);
    }};
}

// ==========================================
// Runtime Invariant Checking
// ==========================================

/// A broken invariant, as returned by [`InvariantChecker::check_invariants`].
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct InvariantViolation {
    /// Type that owns the invariant.
    pub type_name: &'static str,
    /// The invariant that no longer holds.
    pub invariant: String,
    /// Where it broke, if known.
    pub details: Option<String>,
}

impl InvariantViolation {
    /// Creates a violation without details.
    #[must_use]
    pub fn new(type_name: &'static str, invariant: impl Into<String>) -> Self {
        Self {
            type_name,
            invariant: invariant.into(),
            details: None,
        }
    }

    /// Attaches diagnostic details.
    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

impl std::fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.type_name, self.invariant)?;
        if let Some(details) = &self.details {
            write!(f, " ({})", details)?;
        }
        Ok(())
    }
}

/// Types that can verify their own internal invariants.
pub trait InvariantChecker {
    /// Returns the first broken invariant, if any.
    fn check_invariants(&self) -> Result<(), InvariantViolation>;
}

/// Checks invariants in debug builds (or with the `paranoid` feature) and reports
/// failures as [`ViolationKind::Invariant`].
#[macro_export]
#[cfg(any(debug_assertions, feature = "paranoid"))]
macro_rules! debug_check_invariants {
    ($expr:expr) => {{
        use $crate::telemetry::InvariantChecker as _;
        if let Err(violation) = $expr.check_invariants() {
            $crate::report_violation!(
                $crate::telemetry::ViolationSeverity::Critical,
                $crate::telemetry::ViolationKind::Invariant,
                "{}",
                violation
            );
        }
    }};
}

/// No-op in release builds without the `paranoid` feature.
#[macro_export]
#[cfg(not(any(debug_assertions, feature = "paranoid")))]
macro_rules! debug_check_invariants {
    ($expr:expr) => {{}};
}

#[cfg(test)]
mod tests {
    use super::*;

    fn violation(severity: ViolationSeverity, kind: ViolationKind) -> SpecViolation {
        SpecViolation::new(severity, kind, "request [3, 6) does not chain", "cache.rs:7")
    }

    #[test]
    fn severities_are_ordered() {
        assert!(ViolationSeverity::Warning < ViolationSeverity::Error);
        assert!(ViolationSeverity::Error < ViolationSeverity::Critical);
    }

    #[test]
    fn display_carries_all_fields() {
        let text = violation(ViolationSeverity::Error, ViolationKind::FrameOrder).to_string();
        assert_eq!(
            text,
            "[error/frame_order] request [3, 6) does not chain (at cache.rs:7)"
        );
    }

    #[test]
    fn collector_keeps_and_clears() {
        let observer = CollectingObserver::new();
        observer.on_violation(&violation(
            ViolationSeverity::Warning,
            ViolationKind::RequestSequence,
        ));
        observer.on_violation(&violation(
            ViolationSeverity::Critical,
            ViolationKind::Invariant,
        ));

        assert_eq!(observer.len(), 2);
        assert!(observer.has_violation(ViolationKind::Invariant));
        assert!(!observer.has_violation(ViolationKind::StyleTarget));

        observer.clear();
        assert!(observer.is_empty());
    }

    #[test]
    fn report_violation_to_prefers_observer() {
        let collector = Arc::new(CollectingObserver::new());
        let observer: Option<Arc<dyn ViolationObserver>> = Some(collector.clone());
        crate::report_violation_to!(
            &observer,
            ViolationSeverity::Warning,
            ViolationKind::RequestSequence,
            "expected={}, actual={}",
            3.0,
            4.0
        );
        let violations = collector.violations();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].message, "expected=3, actual=4");
        assert!(violations[0].location.contains("telemetry.rs"));
    }

    #[test]
    fn report_violation_to_falls_back_without_observer() {
        let observer: Option<Arc<dyn ViolationObserver>> = None;
        crate::report_violation_to!(
            &observer,
            ViolationSeverity::Warning,
            ViolationKind::OutOfRange,
            "logged only"
        );
    }

    #[test]
    fn invariant_violation_display() {
        let violation = InvariantViolation::new("FrameStore", "frames not strictly increasing")
            .with_details("t=3 after t=4");
        assert_eq!(
            violation.to_string(),
            "FrameStore: frames not strictly increasing (t=3 after t=4)"
        );
    }

    #[cfg(feature = "json")]
    #[test]
    fn violation_to_json() {
        let json = violation(ViolationSeverity::Warning, ViolationKind::RequestSequence)
            .to_json()
            .unwrap();
        assert!(json.contains(r#""severity":"warning""#));
        assert!(json.contains(r#""kind":"request_sequence""#));
    }
}
