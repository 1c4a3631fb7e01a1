//! The seam between the cache and whatever transport produces frames.
//!
//! A [`FrameSource`] turns a [`RequestSpec`] (plus an optional [`SpatialBound`]) into a
//! [`FetchFuture`]. The cache never knows how frames are transported; it only awaits the
//! futures in the order it issued them.

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::error::ReplayError;
use crate::scheduler::RequestSpec;
use crate::{Frame, SpatialBound};

/// A pending fetch: resolves to the frames with `t` in the requested interval.
pub type FetchFuture<R> = BoxFuture<'static, Result<Vec<Frame<R>>, ReplayError>>;

/// Something that can fetch frames for a half-open time interval.
///
/// Implemented for any `Fn(RequestSpec, Option<SpatialBound>) -> FetchFuture<R>`, so a
/// closure is enough for simple transports and tests.
pub trait FrameSource<R>: Send + Sync {
    /// Starts fetching the frames in `spec`, narrowed to `bound` when given.
    fn fetch(&self, spec: RequestSpec, bound: Option<SpatialBound>) -> FetchFuture<R>;
}

impl<R, F> FrameSource<R> for F
where
    F: Fn(RequestSpec, Option<SpatialBound>) -> FetchFuture<R> + Send + Sync,
{
    fn fetch(&self, spec: RequestSpec, bound: Option<SpatialBound>) -> FetchFuture<R> {
        self(spec, bound)
    }
}

/// A request spec paired with the future fetching it.
pub struct FetchRequest<R> {
    /// The interval this request covers.
    pub spec: RequestSpec,
    /// Resolves to the frames of `spec`.
    pub future: FetchFuture<R>,
}

impl<R> FetchRequest<R> {
    /// Pairs a spec with its future.
    #[must_use]
    pub fn new(spec: RequestSpec, future: FetchFuture<R>) -> Self {
        Self { spec, future }
    }
}

impl<R> std::fmt::Debug for FetchRequest<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchRequest")
            .field("spec", &self.spec)
            .finish_non_exhaustive()
    }
}

/// Builds `count` contiguous requests of `length` starting at `start_t`, one per chunk.
///
/// This is the request constructor every player hands to
/// [`FrameCache::ensure`](crate::FrameCache::ensure).
pub fn create_requests<R, S>(
    source: &S,
    start_t: f64,
    count: usize,
    length: f64,
    bound: Option<SpatialBound>,
) -> Vec<FetchRequest<R>>
where
    S: FrameSource<R> + ?Sized,
{
    (0..count)
        .map(|i| {
            #[allow(clippy::cast_precision_loss)]
            let offset = i as f64;
            let spec = RequestSpec::new(
                start_t + offset * length,
                start_t + (offset + 1.0) * length,
            );
            FetchRequest::new(spec, source.fetch(spec, bound))
        })
        .collect()
}

/// Runs `future` on the tokio runtime so it makes progress while nobody awaits it.
///
/// Rust futures are inert until polled; a look-ahead chunk wrapped this way downloads in
/// the background between two [`ensure`](crate::FrameCache::ensure) calls. A panicking
/// or cancelled task resolves to [`ReplayError::FetchFailed`].
///
/// Must be called from within a tokio runtime.
pub fn spawn_fetch<R, F>(spec: RequestSpec, future: F) -> FetchFuture<R>
where
    R: Send + 'static,
    F: std::future::Future<Output = Result<Vec<Frame<R>>, ReplayError>> + Send + 'static,
{
    let handle = tokio::spawn(future);
    async move {
        match handle.await {
            Ok(result) => result,
            Err(join_error) => Err(ReplayError::fetch_failed(
                spec.start_t,
                spec.end_t,
                join_error.to_string(),
            )),
        }
    }
    .boxed()
}

/// Decodes a JSON array of frames (`[{"t": 0, "data": [...]}, ...]`).
///
/// # Errors
///
/// Returns [`ReplayError::Decode`] if `bytes` is not a valid frame array.
#[cfg(feature = "json")]
pub fn decode_frames<R>(bytes: &[u8]) -> Result<Vec<Frame<R>>, ReplayError>
where
    R: serde::de::DeserializeOwned,
{
    serde_json::from_slice(bytes).map_err(|e| ReplayError::Decode {
        context: e.to_string(),
    })
}
