use std::{
	collections::HashMap,
	path::{Path, PathBuf},
	sync::Arc,
};

use futures::{
	future::{BoxFuture, Shared},
	stream, FutureExt, StreamExt,
};
use futures_concurrency::future::Join;
use serde::{Deserialize, Serialize};
use tokio::{fs, sync::Mutex, task::spawn_blocking};
use tracing::{debug, instrument, warn};

use vw_compositor::encode;
use vw_media::{FrameSourceFactory, MetadataProber, TolerancePolicy};

use crate::{
	config::{AppPaths, ProcessingConfiguration},
	video::{ThumbnailStatus, Video},
	Catalog,
};

/// Lower and upper bounds on in-flight metadata loads within a batch.
pub const MIN_INFLIGHT: usize = 2;
pub const MAX_INFLIGHT: usize = 16;

/// Cover thumbnails are pulled at this point of the timeline.
const THUMBNAIL_POSITION: f64 = 0.1;

/// Longer edge of the written cover thumbnail.
const THUMBNAIL_LONGER_EDGE: u32 = 480;

/// Per-video failure. Carries the URL and, where useful, the underlying
/// cause as text so the error stays serializable inside batch results.
#[derive(thiserror::Error, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Error {
	#[error("no video track found <url='{}'>", .url.display())]
	TrackNotFound { url: PathBuf },
	#[error("file not found <url='{}'>", .url.display())]
	FileNotFound { url: PathBuf },
	#[error("access denied <url='{}'>", .url.display())]
	AccessDenied { url: PathBuf },
	#[error("invalid format <url='{}'>: {cause}", .url.display())]
	InvalidFormat { url: PathBuf, cause: String },
	#[error("processing failed <url='{}'>: {cause}", .url.display())]
	ProcessingFailed { url: PathBuf, cause: String },
	#[error("metadata extraction failed <url='{}'>: {cause}", .url.display())]
	MetadataExtractionFailed { url: PathBuf, cause: String },
	#[error("thumbnail generation failed <url='{}'>: {cause}", .url.display())]
	ThumbnailGenerationFailed { url: PathBuf, cause: String },
	#[error("frame extraction failed <url='{}'>: {cause}", .url.display())]
	FrameExtractionFailed { url: PathBuf, cause: String },
}

impl Error {
	#[must_use]
	pub fn url(&self) -> &Path {
		match self {
			Self::TrackNotFound { url }
			| Self::FileNotFound { url }
			| Self::AccessDenied { url }
			| Self::InvalidFormat { url, .. }
			| Self::ProcessingFailed { url, .. }
			| Self::MetadataExtractionFailed { url, .. }
			| Self::ThumbnailGenerationFailed { url, .. }
			| Self::FrameExtractionFailed { url, .. } => url,
		}
	}
}

/// Result of a batch run: registered videos plus the per-video failures
/// that were captured instead of aborting the batch.
#[derive(Debug, Default)]
pub struct BatchOutput {
	/// Sorted by title ascending for deterministic consumers.
	pub videos: Vec<Video>,
	pub errors: Vec<Error>,
}

type SharedProcess = Shared<BoxFuture<'static, Result<Video, Error>>>;

/// Loads metadata for single videos and registers them in the catalog.
///
/// Requests are deduplicated per URL: a second `process` call for a URL
/// whose task is still running awaits the same future and observes the
/// same `Video`.
#[derive(Debug, Clone)]
pub struct VideoProcessor {
	inner: Arc<ProcessorInner>,
}

struct ProcessorInner {
	catalog: Arc<dyn Catalog>,
	prober: Arc<dyn MetadataProber>,
	frames: Arc<dyn FrameSourceFactory>,
	config: ProcessingConfiguration,
	paths: AppPaths,
	active: Mutex<HashMap<PathBuf, SharedProcess>>,
}

impl std::fmt::Debug for ProcessorInner {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("VideoProcessor")
			.field("config", &self.config)
			.finish_non_exhaustive()
	}
}

impl VideoProcessor {
	#[must_use]
	pub fn new(
		catalog: Arc<dyn Catalog>,
		prober: Arc<dyn MetadataProber>,
		frames: Arc<dyn FrameSourceFactory>,
		config: ProcessingConfiguration,
		paths: AppPaths,
	) -> Self {
		Self {
			inner: Arc::new(ProcessorInner {
				catalog,
				prober,
				frames,
				config,
				paths,
				active: Mutex::new(HashMap::new()),
			}),
		}
	}

	/// Loads metadata for `url` and returns the registered video.
	///
	/// Individual metadata fields that fail to load are left unset; the
	/// video is still registered. Identity is stable across rescans: an
	/// existing catalog row for the same URL keeps its id and added-date.
	pub async fn process(&self, url: impl AsRef<Path>) -> Result<Video, Error> {
		let url = url.as_ref().to_path_buf();

		let task = {
			let mut active = self.inner.active.lock().await;
			if let Some(running) = active.get(&url) {
				debug!(url = %url.display(), "joining in-flight processing task");
				running.clone()
			} else {
				let inner = Arc::clone(&self.inner);
				let task_url = url.clone();
				let task: SharedProcess = async move { load_video(&inner, task_url).await }
					.boxed()
					.shared();
				active.insert(url.clone(), task.clone());
				task
			}
		};

		let result = task.await;
		self.inner.active.lock().await.remove(&url);
		result
	}

	/// Batch form of [`Self::process`]: bounded fan-out with a progress
	/// callback of `(completed_count, current_title)` per finished video.
	#[instrument(skip_all, fields(total = urls.len()))]
	pub async fn process_many(
		&self,
		urls: Vec<PathBuf>,
		min_concurrent: usize,
		max_concurrent: usize,
		mut progress: impl FnMut(usize, &str) + Send,
	) -> BatchOutput {
		let limit = max_concurrent
			.clamp(min_concurrent.max(MIN_INFLIGHT), MAX_INFLIGHT)
			.max(1);

		let mut output = BatchOutput::default();
		let mut completed = 0usize;

		let mut results = stream::iter(urls)
			.map(|url| {
				let processor = self.clone();
				async move { processor.process(url).await }
			})
			.buffer_unordered(limit);

		while let Some(result) = results.next().await {
			completed += 1;
			match result {
				Ok(video) => {
					progress(completed, &video.title);
					output.videos.push(video);
				}
				Err(e) => {
					warn!(url = %e.url().display(), %e, "video processing failed");
					progress(completed, &crate::video::title_from_url(e.url()));
					output.errors.push(e);
				}
			}
		}

		output
			.videos
			.sort_by(|a, b| a.title.cmp(&b.title).then_with(|| a.url.cmp(&b.url)));
		output
	}

	/// Generates the cover thumbnail for an already-registered video,
	/// walking the row through `pending -> in_progress -> completed|error`.
	#[instrument(skip(self, video), fields(url = %video.url.display()))]
	pub async fn generate_thumbnail(&self, video: &Video) -> Result<PathBuf, Error> {
		let inner = &self.inner;
		let url = video.url.clone();

		set_thumbnail_state(inner, &url, ThumbnailStatus::InProgress, None).await;

		match generate_thumbnail_file(inner, video).await {
			Ok(path) => {
				set_thumbnail_state(inner, &url, ThumbnailStatus::Completed, Some(path.clone()))
					.await;
				Ok(path)
			}
			Err(e) => {
				set_thumbnail_state(inner, &url, ThumbnailStatus::Error, None).await;
				Err(e)
			}
		}
	}

	/// Drops any completed-task bookkeeping; called between coordinator
	/// batches to keep long runs lean.
	pub async fn clear_transient_state(&self) {
		self.inner.active.lock().await.clear();
	}
}

async fn load_video(inner: &ProcessorInner, url: PathBuf) -> Result<Video, Error> {
	let (fs_meta, probed) = (fs::metadata(&url), inner.prober.probe(&url)).join().await;

	let fs_meta = match fs_meta {
		Ok(meta) => Some(meta),
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
			return Err(Error::FileNotFound { url });
		}
		Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
			return Err(Error::AccessDenied { url });
		}
		Err(e) => {
			warn!(url = %url.display(), ?e, "file metadata load failed");
			None
		}
	};

	// A failed probe leaves the media fields unset but still registers the
	// video.
	let probed = match probed {
		Ok(info) => Some(info),
		Err(e) => {
			warn!(url = %url.display(), %e, "metadata probe failed");
			None
		}
	};

	let existing = inner
		.catalog
		.fetch_video(&url)
		.await
		.map_err(|e| Error::ProcessingFailed {
			url: url.clone(),
			cause: e.to_string(),
		})?;

	let mut video = existing.unwrap_or_else(|| Video::new(&url));
	video.date_modified = chrono::Utc::now();

	if let Some(meta) = fs_meta {
		video.file_size = Some(meta.len());
		if let Ok(modified) = meta.modified() {
			video.date_modified = modified.into();
		}
	}

	if let Some(info) = probed {
		video.duration = info.duration;
		video.width = info.width;
		video.height = info.height;
		video.frame_rate = info.frame_rate;
		video.bitrate = info.bit_rate;
		video.codec_tag = info.codec_tag;
	}

	Ok(video)
}

async fn generate_thumbnail_file(inner: &ProcessorInner, video: &Video) -> Result<PathBuf, Error> {
	let url = &video.url;
	let thumb_error = |cause: String| Error::ThumbnailGenerationFailed {
		url: url.clone(),
		cause,
	};

	let source = inner
		.frames
		.open(url)
		.map_err(|e| thumb_error(e.to_string()))?;

	let duration = if video.duration > 0.0 {
		video.duration
	} else {
		source
			.duration()
			.await
			.map_err(|e| thumb_error(e.to_string()))?
	};

	let tolerance = if inner.config.use_accurate_timestamps {
		TolerancePolicy::Accurate
	} else {
		TolerancePolicy::Fast
	};

	let frame = source
		.extract_at(
			duration * THUMBNAIL_POSITION,
			tolerance,
			Some(inner.config.thumbnail_width),
		)
		.await
		.map_err(|e| Error::FrameExtractionFailed {
			url: url.clone(),
			cause: e.to_string(),
		})?;

	let format = inner.config.format;
	let quality = inner.config.compression_quality;
	let (bytes, actual_format) = spawn_blocking(move || {
		let scaled = scale_to_longer_edge(&frame.image, THUMBNAIL_LONGER_EDGE);
		encode(&scaled, format, quality)
	})
	.await
	.map_err(|e| thumb_error(e.to_string()))?
	.map_err(|e| thumb_error(e.to_string()))?;

	let destination = inner.paths.thumbnails_dir().join(format!(
		"{}_thumb.{}",
		video.id.simple(),
		actual_format.extension()
	));

	let pending = vw_utils::AtomicFile::write(&destination, &bytes)
		.await
		.map_err(|e| thumb_error(e.to_string()))?;

	pending.commit().await.map_err(|e| thumb_error(e.to_string()))
}

fn scale_to_longer_edge(image: &image::RgbaImage, longer_edge: u32) -> image::RgbaImage {
	let (w, h) = image.dimensions();
	if w.max(h) <= longer_edge {
		return image.clone();
	}

	let (new_w, new_h) = if w >= h {
		(longer_edge, (h * longer_edge / w).max(1))
	} else {
		((w * longer_edge / h).max(1), longer_edge)
	};

	image::imageops::resize(image, new_w, new_h, image::imageops::FilterType::Triangle)
}

async fn set_thumbnail_state(
	inner: &ProcessorInner,
	url: &Path,
	status: ThumbnailStatus,
	thumbnail_url: Option<PathBuf>,
) {
	match inner.catalog.fetch_video(url).await {
		Ok(Some(mut row)) => {
			row.thumbnail_status = status;
			if thumbnail_url.is_some() {
				row.thumbnail_url = thumbnail_url;
			}
			if let Err(e) = inner.catalog.upsert_video(row).await {
				warn!(url = %url.display(), %e, "failed to persist thumbnail status");
			}
		}
		Ok(None) => {
			debug!(url = %url.display(), "thumbnail status update for unregistered video");
		}
		Err(e) => {
			warn!(url = %url.display(), %e, "failed to fetch video for status update");
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn inflight_limit_clamps_into_range() {
		// Mirrors the clamp in process_many.
		let clamp = |max: usize| max.clamp(MIN_INFLIGHT, MAX_INFLIGHT);
		assert_eq!(clamp(0), 2);
		assert_eq!(clamp(8), 8);
		assert_eq!(clamp(64), 16);
	}

	#[test]
	fn longer_edge_scaling_preserves_aspect() {
		let image = image::RgbaImage::new(1920, 1080);
		let scaled = scale_to_longer_edge(&image, 480);
		assert_eq!(scaled.dimensions(), (480, 270));

		let portrait = image::RgbaImage::new(1080, 1920);
		let scaled = scale_to_longer_edge(&portrait, 480);
		assert_eq!(scaled.dimensions(), (270, 480));

		let small = image::RgbaImage::new(320, 200);
		assert_eq!(scale_to_longer_edge(&small, 480).dimensions(), (320, 200));
	}
}
