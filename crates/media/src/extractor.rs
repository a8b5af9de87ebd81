use std::{path::Path, sync::Arc};

use futures::{stream::FuturesUnordered, Stream};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::{Error, Frame, FrameSourceFactory, TolerancePolicy};

/// Reads issued against a single extractor are bounded independently of the
/// coordinator's per-video ceiling.
pub const DEFAULT_CONCURRENT_EXTRACTIONS: usize = 8;

/// Fans timestamp requests out over an open [`FrameSource`] under a local
/// semaphore, delivering `(requested_time, result)` pairs as they finish.
#[derive(Debug, Clone)]
pub struct FrameExtractor {
	factory: Arc<dyn FrameSourceFactory>,
	semaphore: Arc<Semaphore>,
}

impl FrameExtractor {
	#[must_use]
	pub fn new(factory: Arc<dyn FrameSourceFactory>) -> Self {
		Self::with_concurrency(factory, DEFAULT_CONCURRENT_EXTRACTIONS)
	}

	#[must_use]
	pub fn with_concurrency(factory: Arc<dyn FrameSourceFactory>, concurrency: usize) -> Self {
		Self {
			factory,
			semaphore: Arc::new(Semaphore::new(concurrency.max(1))),
		}
	}

	#[must_use]
	pub fn factory(&self) -> &Arc<dyn FrameSourceFactory> {
		&self.factory
	}

	/// Opens `url` once and extracts a frame per timestamp.
	///
	/// Each pending extraction observes `cancel` both before dispatch and
	/// after receipt; results already yielded are the caller's to keep.
	pub fn extract(
		&self,
		url: &Path,
		timestamps: Vec<f64>,
		tolerance: TolerancePolicy,
		max_size: Option<u32>,
		cancel: CancellationToken,
	) -> Result<impl Stream<Item = (f64, Result<Frame, Error>)> + Send + Unpin, Error> {
		let source = self.factory.open(url)?;

		Ok(timestamps
			.into_iter()
			.map(|timestamp| {
				let source = Arc::clone(&source);
				let semaphore = Arc::clone(&self.semaphore);
				let cancel = cancel.clone();

				async move {
					if cancel.is_cancelled() {
						return (timestamp, Err(Error::Cancelled));
					}

					let Ok(_permit) = semaphore.acquire_owned().await else {
						return (timestamp, Err(Error::Cancelled));
					};

					if cancel.is_cancelled() {
						return (timestamp, Err(Error::Cancelled));
					}

					let result = source.extract_at(timestamp, tolerance, max_size).await;

					if let Err(e) = &result {
						if !matches!(e, Error::Cancelled) {
							warn!(timestamp, ?e, "frame extraction failed");
						}
					}

					(timestamp, result)
				}
			})
			.collect::<FuturesUnordered<_>>())
	}
}
