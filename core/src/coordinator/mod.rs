use std::{
	collections::{BTreeSet, HashSet},
	path::{Path, PathBuf},
	sync::{
		atomic::{AtomicU64, Ordering},
		Arc, Mutex as StdMutex,
	},
	time::Duration,
};

use futures::{stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::{fs, sync::Mutex, time::Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use vw_media::{FrameSourceFactory, MetadataProber};

use crate::{
	catalog::{self, FolderRecord},
	config::{AppPaths, DiscoveryOptions, MosaicConfiguration, PreviewConfiguration, ProcessingConfiguration},
	library::{ItemKind, LibraryItem, LibraryTree, NodeId, SmartCriteria, SmartFolderEvaluator},
	mosaic::{self, engine::GenerateContext, MosaicEngine},
	preview::{self, PreviewEngine},
	processor::{self, VideoProcessor, MIN_INFLIGHT},
	scanner,
	video::{ThumbnailStatus, Video},
	Catalog,
};

mod progress;

pub use progress::ProgressEvent;

use progress::ProgressReporter;

/// Videos are processed and saved in chunks of this size; the catalog is
/// never written mid-batch.
pub const BATCH_SIZE: usize = 100;

/// Transient component caches are dropped every this many batches.
const CACHE_CLEAR_BATCH_INTERVAL: usize = 5;

#[derive(thiserror::Error, Debug)]
pub enum Error {
	#[error("discovery was cancelled")]
	Cancelled,
	#[error("invalid folder <path='{}'>", .0.display())]
	InvalidFolder(PathBuf),
	#[error("access denied <path='{}'>", .0.display())]
	AccessDenied(PathBuf),
	#[error("discovery processing failed: {0}")]
	ProcessingFailed(String),
}

impl From<scanner::Error> for Error {
	fn from(e: scanner::Error) -> Self {
		match e {
			scanner::Error::NotADirectory(path) => Self::InvalidFolder(path),
			scanner::Error::AccessDenied(path) => Self::AccessDenied(path),
			other => Self::ProcessingFailed(other.to_string()),
		}
	}
}

impl From<catalog::Error> for Error {
	fn from(e: catalog::Error) -> Self {
		Self::ProcessingFailed(e.to_string())
	}
}

/// Receives run lifecycle callbacks. Invocations arrive from a single
/// reporter task, already serialized.
pub trait DiscoveryListener: Send + Sync {
	fn progress(&self, _event: &ProgressEvent) {}
	fn did_cancel(&self) {}
	fn did_finish(&self, _result: &DiscoveryResult) {}
}

/// Listener that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullListener;

impl DiscoveryListener for NullListener {}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryStatistics {
	pub elapsed: Duration,
	pub processing_rate: f64,
	pub total_videos: u64,
}

/// Outcome of one discovery run.
#[derive(Debug, Default)]
pub struct DiscoveryResult {
	pub added: u64,
	pub updated: u64,
	pub removed: u64,
	pub created_folders: u64,
	pub skipped_files: u64,
	pub errors: Vec<processor::Error>,
	pub statistics: DiscoveryStatistics,
	pub cancelled: bool,
}

impl DiscoveryResult {
	#[must_use]
	pub fn error_files(&self) -> u64 {
		self.errors.len() as u64
	}
}

/// Top-level engine: drives scan, processing, catalog persistence and
/// artifact kickoff for whole library roots under one cancellation scope.
#[derive(Debug)]
pub struct Coordinator {
	catalog: Arc<dyn Catalog>,
	processor: VideoProcessor,
	evaluator: SmartFolderEvaluator,
	tree: Mutex<LibraryTree>,
	cancel: StdMutex<CancellationToken>,
}

impl Coordinator {
	#[must_use]
	pub fn new(
		catalog: Arc<dyn Catalog>,
		prober: Arc<dyn MetadataProber>,
		frames: Arc<dyn FrameSourceFactory>,
		config: ProcessingConfiguration,
		paths: AppPaths,
	) -> Self {
		Self {
			processor: VideoProcessor::new(
				Arc::clone(&catalog),
				prober,
				frames,
				config,
				paths,
			),
			catalog,
			evaluator: SmartFolderEvaluator::new(),
			tree: Mutex::new(LibraryTree::new()),
			cancel: StdMutex::new(CancellationToken::new()),
		}
	}

	#[must_use]
	pub fn catalog(&self) -> &Arc<dyn Catalog> {
		&self.catalog
	}

	#[must_use]
	pub fn processor(&self) -> &VideoProcessor {
		&self.processor
	}

	/// Requests cooperative cancellation of the current run. In-flight work
	/// stops at its next suspension point; already-saved rows stay saved.
	pub fn cancel(&self) {
		self.cancel
			.lock()
			.unwrap_or_else(std::sync::PoisonError::into_inner)
			.cancel();
	}

	fn reset_cancel(&self) -> CancellationToken {
		let token = CancellationToken::new();
		*self
			.cancel
			.lock()
			.unwrap_or_else(std::sync::PoisonError::into_inner) = token.clone();
		token
	}

	/// Scans `root`, registers everything new (or everything, on update
	/// runs), and persists per batch.
	#[instrument(skip(self, listener), fields(root = %root.as_ref().display()))]
	pub async fn discover_folder(
		&self,
		root: impl AsRef<Path>,
		options: DiscoveryOptions,
		listener: Arc<dyn DiscoveryListener>,
	) -> Result<DiscoveryResult, Error> {
		let root = root.as_ref();
		let cancel = self.reset_cancel();
		let reporter = ProgressReporter::new(Arc::clone(&listener));
		let started = Instant::now();

		let run = self
			.run_discovery(root, options, &cancel, &reporter, started)
			.await;

		let result = match run {
			Ok(result) => result,
			Err(e) => {
				reporter.finish().await;
				return Err(e);
			}
		};

		if result.cancelled {
			listener.did_cancel();
		}
		reporter.finish().await;
		listener.did_finish(&result);

		info!(
			added = result.added,
			updated = result.updated,
			removed = result.removed,
			errors = result.errors.len(),
			cancelled = result.cancelled,
			"discovery finished"
		);

		Ok(result)
	}

	#[allow(clippy::too_many_lines)]
	async fn run_discovery(
		&self,
		root: &Path,
		options: DiscoveryOptions,
		cancel: &CancellationToken,
		reporter: &ProgressReporter,
		started: Instant,
	) -> Result<DiscoveryResult, Error> {
		// The dedicated counting pass only feeds progress denominators.
		let total_videos = tokio::select! {
			() = cancel.cancelled() => return Err(Error::Cancelled),
			count = scanner::count(root, options.recursive) => count?,
		};

		let folders_seen = AtomicU64::new(0);
		let scan_progress = |path: &Path| {
			reporter.emit(ProgressEvent {
				total_videos,
				processed_folders: folders_seen.fetch_add(1, Ordering::Relaxed),
				current_folder: Some(path.display().to_string()),
				..ProgressEvent::default()
			});
		};

		let outcome = tokio::select! {
			() = cancel.cancelled() => return Err(Error::Cancelled),
			outcome = scanner::scan(root, options.recursive, scan_progress) => outcome?,
		};

		let mut result = DiscoveryResult {
			statistics: DiscoveryStatistics {
				total_videos,
				..DiscoveryStatistics::default()
			},
			..DiscoveryResult::default()
		};

		// Filter against the catalog; update runs reprocess known rows.
		let mut to_process = Vec::with_capacity(outcome.videos.len());
		let mut existing_urls = HashSet::new();
		for url in outcome.videos {
			match self.catalog.fetch_video(&url).await? {
				Some(_) if !options.is_update => result.skipped_files += 1,
				Some(_) => {
					existing_urls.insert(url.clone());
					to_process.push(url);
				}
				None => to_process.push(url),
			}
		}
		result.skipped_files += outcome.skipped;

		// Folder chains exist in the catalog before any of their videos.
		let parents = to_process
			.iter()
			.filter_map(|url| url.parent().map(Path::to_path_buf))
			.collect::<BTreeSet<_>>();
		let total_folders = parents.len() as u64;

		let mut ensured_paths = HashSet::new();
		for (index, parent) in parents.iter().enumerate() {
			if cancel.is_cancelled() {
				result.cancelled = true;
				return Ok(result);
			}
			result.created_folders += self
				.ensure_folder_chain(root, parent, &mut ensured_paths)
				.await?;

			reporter.emit(ProgressEvent {
				total_folders,
				processed_folders: index as u64 + 1,
				current_folder: Some(parent.display().to_string()),
				total_videos,
				..ProgressEvent::default()
			});
		}

		// Batched processing; one catalog save per batch.
		let processed_counter = Arc::new(AtomicU64::new(0));
		let mut processed_batches = 0usize;

		for chunk in to_process.chunks(BATCH_SIZE) {
			if cancel.is_cancelled() {
				result.cancelled = true;
				break;
			}

			let errors_so_far = result.errors.len() as u64;
			let counter = Arc::clone(&processed_counter);
			let batch = self
				.processor
				.process_many(
					chunk.to_vec(),
					MIN_INFLIGHT,
					options.concurrent_operations(),
					|_, title| {
						let mut event = ProgressEvent {
							total_folders,
							processed_folders: total_folders,
							total_videos,
							processed_videos: counter.fetch_add(1, Ordering::Relaxed) + 1,
							current_video: Some(title.to_string()),
							error_files: errors_so_far,
							..ProgressEvent::default()
						};
						event.finalize(started.elapsed());
						reporter.emit(event);
					},
				)
				.await;

			let mut videos = batch.videos;
			for video in &mut videos {
				video.relative_path = video
					.url
					.strip_prefix(root)
					.ok()
					.map(Path::to_path_buf);
				if options.generate_thumbnails
					&& video.thumbnail_status == ThumbnailStatus::Absent
				{
					video.thumbnail_status = ThumbnailStatus::Pending;
				}

				if existing_urls.contains(&video.url) {
					result.updated += 1;
				} else {
					result.added += 1;
				}
			}
			result.errors.extend(batch.errors);

			// A failed batch commit aborts the whole run.
			self.catalog.upsert_videos(videos.clone()).await?;

			if options.generate_thumbnails {
				for video in videos {
					let processor = self.processor.clone();
					tokio::spawn(async move {
						if let Err(e) = processor.generate_thumbnail(&video).await {
							warn!(url = %video.url.display(), %e, "background thumbnail failed");
						}
					});
				}
			}

			processed_batches += 1;
			if processed_batches % CACHE_CLEAR_BATCH_INTERVAL == 0 {
				debug!(processed_batches, "clearing transient caches");
				self.processor.clear_transient_state().await;
				self.evaluator.clear().await;
			}
		}

		// Update runs also reconcile rows whose files disappeared.
		if options.is_update && !result.cancelled {
			let known = self.catalog.fetch_videos(&SmartCriteria::default()).await?;
			let reconciliation = scanner::compare(&known, root, options.recursive).await?;
			for orphan in reconciliation.orphaned {
				if self.catalog.delete_video_by_url(&orphan.url).await? {
					result.removed += 1;
				}
			}
		}

		result.statistics.elapsed = started.elapsed();
		let processed = processed_counter.load(Ordering::Relaxed);
		if result.statistics.elapsed.as_secs_f64() > 0.0 {
			#[allow(clippy::cast_precision_loss)]
			let rate = processed as f64 / result.statistics.elapsed.as_secs_f64();
			result.statistics.processing_rate = rate;
		}

		Ok(result)
	}

	/// Evaluates a smart folder's criteria and reports what changed since
	/// the previous evaluation.
	#[instrument(skip(self, listener))]
	pub async fn discover_smart_folder(
		&self,
		criteria: &SmartCriteria,
		listener: Arc<dyn DiscoveryListener>,
	) -> Result<DiscoveryResult, Error> {
		let started = Instant::now();
		let delta = self
			.evaluator
			.update(self.catalog.as_ref(), criteria)
			.await?;

		let result = DiscoveryResult {
			added: delta.added.len() as u64,
			removed: delta.removed.len() as u64,
			statistics: DiscoveryStatistics {
				elapsed: started.elapsed(),
				total_videos: delta.matched.len() as u64,
				..DiscoveryStatistics::default()
			},
			..DiscoveryResult::default()
		};

		listener.progress(&ProgressEvent {
			total_videos: result.statistics.total_videos,
			processed_videos: result.statistics.total_videos,
			..ProgressEvent::default()
		});
		listener.did_finish(&result);
		Ok(result)
	}

	/// Registers a user-created smart folder in the runtime tree and the
	/// catalog.
	pub async fn add_smart_folder(
		&self,
		name: impl Into<String>,
		criteria: SmartCriteria,
	) -> Result<NodeId, Error> {
		let item = LibraryItem::smart_folder(name, criteria.clone());
		let record = FolderRecord {
			id: item.id,
			name: item.name.clone(),
			kind: ItemKind::SmartFolder,
			url: None,
			parent_url: None,
			smart_criteria: Some(criteria),
			date_created: item.date_created,
			date_modified: item.date_modified,
		};

		let id = {
			let mut tree = self.tree.lock().await;
			tree.insert_root(item)
				.map_err(|e| Error::ProcessingFailed(e.to_string()))?
		};
		self.catalog.upsert_folder(record).await?;
		Ok(id)
	}

	/// Re-evaluates every smart folder in the tree, refreshing its cached
	/// match set and `last_refresh` stamp. Returns how many were refreshed.
	pub async fn refresh_smart_folders(&self) -> Result<u64, Error> {
		let targets = {
			let tree = self.tree.lock().await;
			tree.node_ids()
				.filter_map(|id| {
					tree.item(id)
						.ok()
						.and_then(|item| item.smart_criteria.clone().map(|criteria| (id, criteria)))
				})
				.collect::<Vec<_>>()
		};

		let mut refreshed = 0;
		for (id, criteria) in targets {
			let matched = self.evaluator.find(self.catalog.as_ref(), &criteria).await?;

			let mut tree = self.tree.lock().await;
			if let Ok(item) = tree.item_mut(id) {
				item.videos = matched.iter().map(|video| video.id).collect();
				item.last_refresh = Some(chrono::Utc::now());
				refreshed += 1;
			}
		}

		Ok(refreshed)
	}

	/// Snapshot of a library tree node.
	pub async fn library_item(&self, id: NodeId) -> Option<LibraryItem> {
		self.tree.lock().await.item(id).ok().cloned()
	}

	/// Catalog rows under `root` whose cover thumbnail needs (re)generation:
	/// missing, failed, or pointing at a file that no longer exists.
	pub async fn check_thumbnails(&self, root: impl AsRef<Path>) -> Result<Vec<Video>, Error> {
		let root = root.as_ref();
		let known = self.catalog.fetch_videos(&SmartCriteria::default()).await?;

		let mut needing = Vec::new();
		for video in known {
			if !video.url.starts_with(root) {
				continue;
			}

			let stale = match (&video.thumbnail_status, &video.thumbnail_url) {
				(ThumbnailStatus::Completed, Some(url)) => fs::metadata(url).await.is_err(),
				(ThumbnailStatus::Completed, None) => true,
				_ => true,
			};
			if stale {
				needing.push(video);
			}
		}

		Ok(needing)
	}

	/// Regenerates cover thumbnails for `videos` under the inflight bound.
	#[instrument(skip_all, fields(count = videos.len()))]
	pub async fn regenerate_thumbnails(
		&self,
		videos: Vec<Video>,
		listener: Arc<dyn DiscoveryListener>,
	) -> Result<DiscoveryResult, Error> {
		let cancel = self.reset_cancel();
		let reporter = ProgressReporter::new(Arc::clone(&listener));
		let started = Instant::now();
		let total = videos.len() as u64;

		let mut result = DiscoveryResult {
			statistics: DiscoveryStatistics {
				total_videos: total,
				..DiscoveryStatistics::default()
			},
			..DiscoveryResult::default()
		};

		let mut tasks = stream::iter(videos)
			.map(|video| {
				let processor = self.processor.clone();
				let cancel = cancel.clone();
				async move {
					if cancel.is_cancelled() {
						return None;
					}
					Some((video.title.clone(), processor.generate_thumbnail(&video).await))
				}
			})
			.buffer_unordered(MIN_INFLIGHT.max(4));

		let mut processed = 0u64;
		while let Some(outcome) = tasks.next().await {
			let Some((title, generated)) = outcome else {
				result.cancelled = true;
				continue;
			};

			processed += 1;
			if let Err(e) = generated {
				result.errors.push(e);
			} else {
				result.updated += 1;
			}

			let mut event = ProgressEvent {
				total_videos: total,
				processed_videos: processed,
				current_video: Some(title),
				error_files: result.errors.len() as u64,
				..ProgressEvent::default()
			};
			event.finalize(started.elapsed());
			reporter.emit(event);
		}

		result.statistics.elapsed = started.elapsed();
		if result.cancelled {
			listener.did_cancel();
		}
		reporter.finish().await;
		listener.did_finish(&result);
		Ok(result)
	}

	/// Generates a mosaic through `engine` and records the artifact on the
	/// video's catalog row.
	pub async fn generate_mosaic(
		&self,
		engine: &dyn MosaicEngine,
		video: &Video,
		config: &MosaicConfiguration,
		library_root: Option<PathBuf>,
	) -> Result<PathBuf, mosaic::Error> {
		let cancel = self
			.cancel
			.lock()
			.unwrap_or_else(std::sync::PoisonError::into_inner)
			.clone();

		let artifact = engine
			.generate(
				video,
				config,
				GenerateContext {
					library_root,
					progress: None,
					cancel,
				},
			)
			.await?;

		self.record_artifact(&video.url, |row| row.mosaic_url = Some(artifact.clone()))
			.await;
		Ok(artifact)
	}

	/// Generates a preview through `engine` and records the artifact on the
	/// video's catalog row.
	pub async fn generate_preview(
		&self,
		engine: &PreviewEngine,
		video: &Video,
		config: &PreviewConfiguration,
	) -> Result<PathBuf, preview::Error> {
		let cancel = self
			.cancel
			.lock()
			.unwrap_or_else(std::sync::PoisonError::into_inner)
			.clone();

		let artifact = engine.generate(video, config, None, cancel).await?;

		self.record_artifact(&video.url, |row| row.preview_url = Some(artifact.clone()))
			.await;
		Ok(artifact)
	}

	/// Best-effort write-back of a generated artifact path; the artifact on
	/// disk is the source of truth if this loses a race with a delete.
	async fn record_artifact(&self, url: &Path, apply: impl FnOnce(&mut Video)) {
		match self.catalog.fetch_video(url).await {
			Ok(Some(mut row)) => {
				apply(&mut row);
				row.date_modified = chrono::Utc::now();
				if let Err(e) = self.catalog.upsert_video(row).await {
					warn!(url = %url.display(), %e, "failed to record artifact url");
				}
			}
			Ok(None) => {
				debug!(url = %url.display(), "artifact generated for unregistered video");
			}
			Err(e) => {
				warn!(url = %url.display(), %e, "failed to fetch video for artifact record");
			}
		}
	}

	/// Creates the folder chain from `root` down to `directory`, in the
	/// runtime arena and in the catalog, at most once per run.
	async fn ensure_folder_chain(
		&self,
		root: &Path,
		directory: &Path,
		ensured: &mut HashSet<PathBuf>,
	) -> Result<u64, Error> {
		if ensured.contains(directory) {
			return Ok(0);
		}

		{
			let mut tree = self.tree.lock().await;
			if let Err(e) = tree.ensure_folder_chain(root, directory) {
				warn!(directory = %directory.display(), %e, "folder chain rejected");
				return Ok(0);
			}
		}

		// Mirror the chain into the catalog, counting rows that are new.
		let mut created_in_catalog = 0;
		let mut chain = Vec::new();
		let mut cursor = Some(directory.to_path_buf());
		while let Some(dir) = cursor {
			let inside = dir.starts_with(root);
			chain.push(dir.clone());
			cursor = if inside && dir != root {
				dir.parent().map(Path::to_path_buf)
			} else {
				None
			};
		}

		for dir in chain.into_iter().rev() {
			if ensured.contains(&dir) {
				continue;
			}
			if self
				.catalog
				.fetch_folder(&dir, ItemKind::Folder)
				.await?
				.is_none()
			{
				let name = crate::video::title_from_url(&dir);
				let parent_url = (dir != root)
					.then(|| dir.parent().map(Path::to_path_buf))
					.flatten();
				self.catalog
					.upsert_folder(FolderRecord::folder(name, &dir, parent_url))
					.await?;
				created_in_catalog += 1;
			}
			ensured.insert(dir);
		}

		Ok(created_in_catalog)
	}
}
