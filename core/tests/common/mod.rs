#![allow(dead_code)]

use std::{
	path::{Path, PathBuf},
	sync::{
		atomic::{AtomicBool, AtomicU64, Ordering},
		Arc, Mutex,
	},
	time::Duration,
};

use image::{Rgba, RgbaImage};
use vw_core::{
	coordinator::DiscoveryResult, AppPaths, Catalog, Coordinator, DiscoveryListener,
	MemoryCatalog, ProgressEvent,
};
use vw_media::{Frame, FrameSource, FrameSourceFactory, MediaInfo, MetadataProber, TolerancePolicy};

/// Prober double returning fixed metadata, optionally slowed down so
/// cancellation tests have a window to land in.
#[derive(Debug, Clone)]
pub struct StubProber {
	pub info: MediaInfo,
	pub delay: Duration,
}

impl StubProber {
	pub fn quick() -> Self {
		Self::with_info(MediaInfo {
			duration: 60.0,
			width: Some(1920),
			height: Some(1080),
			frame_rate: Some(30.0),
			bit_rate: Some(4_500_000),
			codec_tag: Some("video/h264".to_string()),
			has_audio: true,
		})
	}

	pub fn with_info(info: MediaInfo) -> Self {
		Self {
			info,
			delay: Duration::ZERO,
		}
	}

	pub fn slowed(mut self, delay: Duration) -> Self {
		self.delay = delay;
		self
	}
}

#[async_trait::async_trait]
impl MetadataProber for StubProber {
	async fn probe(&self, _path: &Path) -> Result<MediaInfo, vw_media::Error> {
		if self.delay > Duration::ZERO {
			tokio::time::sleep(self.delay).await;
		}
		Ok(self.info.clone())
	}
}

/// Deterministic decoder double: every frame is a solid color derived from
/// its timestamp, so pixel output is reproducible run to run.
#[derive(Debug, Clone)]
pub struct StubFrameFactory {
	pub duration: f64,
	pub frame_size: (u32, u32),
	pub fail_all: bool,
}

impl StubFrameFactory {
	pub fn new(duration: f64) -> Self {
		Self {
			duration,
			frame_size: (160, 90),
			fail_all: false,
		}
	}

	pub fn failing(duration: f64) -> Self {
		Self {
			fail_all: true,
			..Self::new(duration)
		}
	}
}

impl FrameSourceFactory for StubFrameFactory {
	fn open(&self, url: &Path) -> Result<Arc<dyn FrameSource>, vw_media::Error> {
		Ok(Arc::new(StubSource {
			url: url.to_path_buf(),
			duration: self.duration,
			frame_size: self.frame_size,
			fail_all: self.fail_all,
		}))
	}
}

#[derive(Debug)]
struct StubSource {
	url: PathBuf,
	duration: f64,
	frame_size: (u32, u32),
	fail_all: bool,
}

#[async_trait::async_trait]
impl FrameSource for StubSource {
	async fn duration(&self) -> Result<f64, vw_media::Error> {
		Ok(self.duration)
	}

	async fn extract_at(
		&self,
		timestamp: f64,
		_tolerance: TolerancePolicy,
		max_size: Option<u32>,
	) -> Result<Frame, vw_media::Error> {
		if self.fail_all {
			return Err(vw_media::Error::NoVideoTrack(self.url.clone()));
		}

		let (mut w, mut h) = self.frame_size;
		if let Some(max) = max_size {
			if w.max(h) > max {
				if w >= h {
					h = (h * max / w).max(1);
					w = max;
				} else {
					w = (w * max / h).max(1);
					h = max;
				}
			}
		}

		let shade = ((timestamp * 3.0) as u32 % 256) as u8;
		let image = RgbaImage::from_pixel(w, h, Rgba([shade, 128, 255 - shade, 255]));
		Ok(Frame::new(image, timestamp))
	}
}

/// Listener double collecting everything it hears.
#[derive(Debug, Default)]
pub struct RecordingListener {
	pub events: Mutex<Vec<ProgressEvent>>,
	pub cancelled: AtomicBool,
	pub finished: AtomicBool,
}

impl DiscoveryListener for RecordingListener {
	fn progress(&self, event: &ProgressEvent) {
		self.events.lock().unwrap().push(event.clone());
	}

	fn did_cancel(&self) {
		self.cancelled.store(true, Ordering::SeqCst);
	}

	fn did_finish(&self, _result: &DiscoveryResult) {
		self.finished.store(true, Ordering::SeqCst);
	}
}

/// Listener that requests cancellation once enough videos went through.
pub struct CancelAfterListener {
	pub coordinator: Mutex<Option<Arc<Coordinator>>>,
	pub threshold: u64,
	pub seen: AtomicU64,
	pub cancelled: AtomicBool,
}

impl CancelAfterListener {
	pub fn new(threshold: u64) -> Arc<Self> {
		Arc::new(Self {
			coordinator: Mutex::new(None),
			threshold,
			seen: AtomicU64::new(0),
			cancelled: AtomicBool::new(false),
		})
	}

	pub fn attach(&self, coordinator: Arc<Coordinator>) {
		*self.coordinator.lock().unwrap() = Some(coordinator);
	}
}

impl DiscoveryListener for CancelAfterListener {
	fn progress(&self, event: &ProgressEvent) {
		self.seen.store(event.processed_videos, Ordering::SeqCst);
		if event.processed_videos >= self.threshold {
			if let Some(coordinator) = self.coordinator.lock().unwrap().as_ref() {
				coordinator.cancel();
			}
		}
	}

	fn did_cancel(&self) {
		self.cancelled.store(true, Ordering::SeqCst);
	}
}

pub struct TestHarness {
	pub memory: Arc<MemoryCatalog>,
	pub catalog: Arc<dyn Catalog>,
	pub coordinator: Arc<Coordinator>,
	pub paths: AppPaths,
}

/// Coordinator wired to in-memory catalog and stub media backends.
pub fn harness(prober: StubProber, frames: StubFrameFactory, data_dir: &Path) -> TestHarness {
	let memory = Arc::new(MemoryCatalog::new());
	let catalog: Arc<dyn Catalog> = memory.clone();
	let paths = AppPaths::new(data_dir.join("support"), data_dir.join("cache"));

	let coordinator = Arc::new(Coordinator::new(
		Arc::clone(&catalog),
		Arc::new(prober),
		Arc::new(frames),
		vw_core::ProcessingConfiguration::default(),
		paths.clone(),
	));

	TestHarness {
		memory,
		catalog,
		coordinator,
		paths,
	}
}

/// Writes `count` tiny mp4-suffixed files under `dir`.
pub fn seed_videos(dir: &Path, count: usize) -> Vec<PathBuf> {
	std::fs::create_dir_all(dir).unwrap();
	(0..count)
		.map(|i| {
			let path = dir.join(format!("clip_{i:04}.mp4"));
			std::fs::write(&path, b"stub-video-bytes").unwrap();
			path
		})
		.collect()
}
