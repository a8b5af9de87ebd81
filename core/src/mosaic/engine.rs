use std::{
	collections::HashMap,
	fmt,
	path::{Path, PathBuf},
	sync::Arc,
};

use futures::{
	future::{BoxFuture, Shared},
	FutureExt, StreamExt,
};
use tokio::{fs, sync::Mutex, task::spawn_blocking};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace, warn};
use uuid::Uuid;

use vw_compositor::{compose, encode, Tile};
use vw_layout::{solve, LayoutParams};
use vw_media::{
	mosaic_timestamps, FfmpegSourceFactory, FrameExtractor, FrameSourceFactory, TolerancePolicy,
};

use crate::{config::MosaicConfiguration, video::Video};

use super::{
	naming, Error, GenerationState, PROGRESS_COMPOSED, PROGRESS_FRAMES, PROGRESS_QUEUED,
	PROGRESS_WRITTEN,
};

/// Progress callback for one generation, fed the staged breakpoints.
pub type ProgressFn = Arc<dyn Fn(f64) + Send + Sync>;

/// Everything a single generation run needs besides the configuration.
#[derive(Clone)]
pub struct GenerateContext {
	pub library_root: Option<PathBuf>,
	pub progress: Option<ProgressFn>,
	pub cancel: CancellationToken,
}

impl Default for GenerateContext {
	fn default() -> Self {
		Self {
			library_root: None,
			progress: None,
			cancel: CancellationToken::new(),
		}
	}
}

impl fmt::Debug for GenerateContext {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("GenerateContext")
			.field("library_root", &self.library_root)
			.finish_non_exhaustive()
	}
}

/// Capability interface the coordinator depends on; implementations differ
/// in how frames are decoded, not in mosaic semantics.
#[async_trait::async_trait]
pub trait MosaicEngine: Send + Sync + fmt::Debug {
	/// Generates the mosaic for `video`, returning the artifact path and
	/// recording it on the engine's state map. Concurrent requests for the
	/// same video id share one task.
	async fn generate(
		&self,
		video: &Video,
		config: &MosaicConfiguration,
		ctx: GenerateContext,
	) -> Result<PathBuf, Error>;

	/// Last observed state for a video's generation, if any.
	async fn state(&self, video_id: Uuid) -> Option<GenerationState>;
}

/// Picks the best available engine for this host: decode acceleration is
/// a property of the frame source, so this probes `ffmpeg` and wires the
/// matching factory in.
pub async fn detect_engine() -> Result<Arc<dyn MosaicEngine>, vw_media::Error> {
	let factory = FfmpegSourceFactory::detect().await?;
	Ok(Arc::new(SoftwareMosaicEngine::new(Arc::new(factory))))
}

type SharedGeneration = Shared<BoxFuture<'static, Result<PathBuf, Error>>>;

/// CPU-composited mosaic engine over any [`FrameSourceFactory`].
pub struct SoftwareMosaicEngine {
	extractor: FrameExtractor,
	active: Mutex<HashMap<Uuid, SharedGeneration>>,
	states: Arc<Mutex<HashMap<Uuid, GenerationState>>>,
}

impl fmt::Debug for SoftwareMosaicEngine {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("SoftwareMosaicEngine").finish_non_exhaustive()
	}
}

impl SoftwareMosaicEngine {
	#[must_use]
	pub fn new(factory: Arc<dyn FrameSourceFactory>) -> Self {
		Self {
			extractor: FrameExtractor::new(factory),
			active: Mutex::new(HashMap::new()),
			states: Arc::new(Mutex::new(HashMap::new())),
		}
	}
}

#[async_trait::async_trait]
impl MosaicEngine for SoftwareMosaicEngine {
	#[instrument(skip_all, fields(url = %video.url.display(), video_id = %video.id))]
	async fn generate(
		&self,
		video: &Video,
		config: &MosaicConfiguration,
		ctx: GenerateContext,
	) -> Result<PathBuf, Error> {
		let (task, owner) = {
			let mut active = self.active.lock().await;
			if let Some(running) = active.get(&video.id) {
				debug!("joining in-flight mosaic generation");
				(running.clone(), false)
			} else {
				let task: SharedGeneration = generate_inner(
					self.extractor.clone(),
					Arc::clone(&self.states),
					video.clone(),
					config.clone(),
					ctx,
				)
				.boxed()
				.shared();
				active.insert(video.id, task.clone());
				(task, true)
			}
		};

		let result = task.await;
		if owner {
			self.active.lock().await.remove(&video.id);
		}
		result
	}

	async fn state(&self, video_id: Uuid) -> Option<GenerationState> {
		self.states.lock().await.get(&video_id).copied()
	}
}

/// Applies a transition respecting terminal stickiness.
async fn transition(
	states: &Mutex<HashMap<Uuid, GenerationState>>,
	video_id: Uuid,
	next: GenerationState,
) {
	let mut states = states.lock().await;
	match states.get(&video_id) {
		Some(current) if current.is_terminal() => {
			trace!(?current, ?next, "ignoring transition past terminal state");
		}
		_ => {
			states.insert(video_id, next);
		}
	}
}

async fn generate_inner(
	extractor: FrameExtractor,
	states: Arc<Mutex<HashMap<Uuid, GenerationState>>>,
	video: Video,
	config: MosaicConfiguration,
	ctx: GenerateContext,
) -> Result<PathBuf, Error> {
	// A fresh generation starts a fresh state machine; stickiness only
	// applies within one run.
	states.lock().await.insert(video.id, GenerationState::Queued);

	let result = run_stages(&extractor, &video, &config, &ctx, &states).await;

	let terminal = match &result {
		Ok(_) => GenerationState::Completed,
		Err(Error::Cancelled) => GenerationState::Cancelled,
		Err(_) => GenerationState::Failed,
	};
	transition(&states, video.id, terminal).await;

	result
}

async fn run_stages(
	extractor: &FrameExtractor,
	video: &Video,
	config: &MosaicConfiguration,
	ctx: &GenerateContext,
	states: &Mutex<HashMap<Uuid, GenerationState>>,
) -> Result<PathBuf, Error> {
	let emit = |fraction: f64| {
		if let Some(progress) = &ctx.progress {
			progress(fraction);
		}
	};
	let generation_error = |cause: String| Error::GenerationFailed {
		url: video.url.clone(),
		cause,
	};

	emit(PROGRESS_QUEUED);

	// Stage 1: geometry.
	let source = extractor
		.factory()
		.open(&video.url)
		.map_err(|e| generation_error(e.to_string()))?;

	let duration = if video.duration > 0.0 {
		video.duration
	} else {
		source
			.duration()
			.await
			.map_err(|e| generation_error(e.to_string()))?
	};

	let video_aspect = video.aspect_ratio().unwrap_or(16.0 / 9.0);

	let thumb_count = vw_layout::thumbnail_count(duration, config.width, config.density)
		.map_err(|e| generation_error(e.to_string()))?;

	let layout = solve(&LayoutParams {
		video_aspect,
		thumb_count,
		mosaic_width: config.width,
		target_aspect: config.layout.aspect_ratio,
		spacing: config.layout.spacing,
		custom_layout: config.layout.custom_layout,
		auto_layout: config.layout.auto_layout,
	})
	.map_err(|e| generation_error(e.to_string()))?;

	transition(states, video.id, GenerationState::InProgress).await;

	if ctx.cancel.is_cancelled() {
		return Err(Error::Cancelled);
	}

	// Stage 2: frames. Individual failures become blank tiles; losing every
	// frame aborts the generation.
	#[allow(clippy::cast_possible_truncation)]
	let timestamps = mosaic_timestamps(duration, layout.thumb_count() as u32);
	let tolerance = if config.use_accurate_timestamps {
		TolerancePolicy::Accurate
	} else {
		TolerancePolicy::Fast
	};

	let max_tile_edge = layout
		.thumbnail_sizes
		.iter()
		.map(|&(w, h)| w.max(h))
		.max()
		.unwrap_or(config.width);

	let mut stream = extractor
		.extract(
			&video.url,
			timestamps.clone(),
			tolerance,
			Some(max_tile_edge),
			ctx.cancel.clone(),
		)
		.map_err(|e| generation_error(e.to_string()))?;

	let mut frames_by_time = HashMap::new();
	let mut succeeded = 0usize;
	while let Some((timestamp, result)) = stream.next().await {
		match result {
			Ok(frame) => {
				succeeded += 1;
				frames_by_time.insert(timestamp.to_bits(), frame);
			}
			Err(vw_media::Error::Cancelled) => return Err(Error::Cancelled),
			Err(e) => {
				warn!(timestamp, %e, "substituting blank tile for failed frame");
			}
		}
	}

	if succeeded == 0 {
		return Err(generation_error(format!(
			"all {} frame extractions failed",
			timestamps.len()
		)));
	}

	emit(PROGRESS_FRAMES);
	if ctx.cancel.is_cancelled() {
		return Err(Error::Cancelled);
	}

	// Stage 3: compose and encode off the async threads.
	let tiles = timestamps
		.iter()
		.map(|timestamp| Tile::new(frames_by_time.remove(&timestamp.to_bits()), *timestamp))
		.collect::<Vec<_>>();

	let metadata = config.include_metadata.then(|| vw_compositor::MetadataOverlay {
		codec_tag: video.codec_tag.clone(),
		bit_rate: video.bitrate,
		custom: video.custom_metadata.clone(),
	});

	let visual = config.layout.visual;
	let format = config.format;
	let quality = config.compression_quality;
	let compose_layout = layout.clone();

	let (bytes, actual_format) = spawn_blocking(move || {
		let canvas = compose(&tiles, &compose_layout, &visual, metadata.as_ref())?;
		encode(&canvas, format, quality)
	})
	.await
	.map_err(|e| Error::ImageGenerationFailed {
		url: video.url.clone(),
		cause: e.to_string(),
	})?
	.map_err(|e| Error::ImageGenerationFailed {
		url: video.url.clone(),
		cause: e.to_string(),
	})?;

	emit(PROGRESS_COMPOSED);
	if ctx.cancel.is_cancelled() {
		return Err(Error::Cancelled);
	}

	// Stage 4: write atomically, honoring the overwrite policy.
	let destination = naming::mosaic_path(
		&video.url,
		config,
		ctx.library_root.as_deref(),
		actual_format,
	);

	if !config.output.overwrite && path_exists(&destination).await {
		return Err(Error::FileExists { path: destination });
	}

	let pending = vw_utils::AtomicFile::write(&destination, &bytes)
		.await
		.map_err(|e| Error::SaveFailed {
			path: destination.clone(),
			cause: e.to_string(),
		})?;

	if ctx.cancel.is_cancelled() {
		pending.discard().await;
		return Err(Error::Cancelled);
	}

	let written = pending.commit().await.map_err(|e| Error::SaveFailed {
		path: destination.clone(),
		cause: e.to_string(),
	})?;

	emit(PROGRESS_WRITTEN);
	Ok(written)
}

async fn path_exists(path: &Path) -> bool {
	fs::metadata(path).await.is_ok()
}
