use std::{
	fmt,
	path::{Path, PathBuf},
	process::Stdio,
	sync::Arc,
};

use image::ImageFormat;
use tokio::{process::Command, sync::OnceCell, task::spawn_blocking};
use tracing::{debug, instrument, trace};

use crate::{probe::FfprobeProber, Error, Frame, MetadataProber};

/// How far from the requested timestamp a returned frame may land.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TolerancePolicy {
	/// Exact frame at the requested timestamp, whatever the seek cost.
	#[default]
	Accurate,
	/// Nearest keyframe is fine; much cheaper on long GOP sources.
	Fast,
}

impl TolerancePolicy {
	/// Allowed slack in seconds on either side of the requested timestamp.
	#[must_use]
	pub const fn slack(self) -> (f64, f64) {
		match self {
			Self::Accurate => (0.0, 0.0),
			Self::Fast => (0.5, 2.0),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekMode {
	Software,
	HardwareAccelerated,
}

/// Capability set of an open video source. Implementations decode frames at
/// (or near) requested timestamps; dropping the source closes it.
#[async_trait::async_trait]
pub trait FrameSource: Send + Sync {
	async fn duration(&self) -> Result<f64, Error>;

	async fn extract_at(
		&self,
		timestamp: f64,
		tolerance: TolerancePolicy,
		max_size: Option<u32>,
	) -> Result<Frame, Error>;
}

/// Opens [`FrameSource`]s for URLs. The factory is the seam between the
/// engine and whatever decode capability the host actually has.
pub trait FrameSourceFactory: Send + Sync + fmt::Debug {
	fn open(&self, url: &Path) -> Result<Arc<dyn FrameSource>, Error>;
}

/// Factory shelling out to the host's `ffmpeg`. `detect()` picks the
/// hardware-accelerated variant when the binary advertises hwaccels.
#[derive(Debug, Clone)]
pub struct FfmpegSourceFactory {
	ffmpeg: PathBuf,
	prober: FfprobeProber,
	mode: SeekMode,
}

impl FfmpegSourceFactory {
	pub fn new(mode: SeekMode) -> Result<Self, Error> {
		Ok(Self {
			ffmpeg: which::which("ffmpeg").map_err(|_| Error::ToolNotFound("ffmpeg"))?,
			prober: FfprobeProber::discover()?,
			mode,
		})
	}

	/// Probes the host for decode acceleration and picks the best variant.
	pub async fn detect() -> Result<Self, Error> {
		let software = Self::new(SeekMode::Software)?;

		let accelerated = Command::new(&software.ffmpeg)
			.args(["-hide_banner", "-hwaccels"])
			.stdout(Stdio::piped())
			.stderr(Stdio::null())
			.output()
			.await
			.map(|out| {
				String::from_utf8_lossy(&out.stdout)
					.lines()
					.skip(1)
					.any(|line| !line.trim().is_empty())
			})
			.unwrap_or(false);

		if accelerated {
			debug!("hardware decode acceleration available");
			Ok(Self {
				mode: SeekMode::HardwareAccelerated,
				..software
			})
		} else {
			Ok(software)
		}
	}

	#[must_use]
	pub const fn mode(&self) -> SeekMode {
		self.mode
	}
}

impl FrameSourceFactory for FfmpegSourceFactory {
	fn open(&self, url: &Path) -> Result<Arc<dyn FrameSource>, Error> {
		Ok(Arc::new(FfmpegFrameSource {
			path: url.to_path_buf(),
			ffmpeg: self.ffmpeg.clone(),
			prober: self.prober.clone(),
			mode: self.mode,
			duration: OnceCell::new(),
		}))
	}
}

struct FfmpegFrameSource {
	path: PathBuf,
	ffmpeg: PathBuf,
	prober: FfprobeProber,
	mode: SeekMode,
	duration: OnceCell<f64>,
}

#[async_trait::async_trait]
impl FrameSource for FfmpegFrameSource {
	async fn duration(&self) -> Result<f64, Error> {
		self.duration
			.get_or_try_init(|| async { Ok(self.prober.probe(&self.path).await?.duration) })
			.await
			.copied()
	}

	#[instrument(skip(self), fields(path = %self.path.display()))]
	async fn extract_at(
		&self,
		timestamp: f64,
		tolerance: TolerancePolicy,
		max_size: Option<u32>,
	) -> Result<Frame, Error> {
		let mut command = Command::new(&self.ffmpeg);
		command.arg("-hide_banner").arg("-loglevel").arg("error");

		if self.mode == SeekMode::HardwareAccelerated {
			command.args(["-hwaccel", "auto"]);
		}

		// Seeking before the input snaps to keyframes, which is exactly the
		// slack the fast policy allows; seeking after decodes up to the exact
		// frame.
		match tolerance {
			TolerancePolicy::Fast => {
				command
					.arg("-ss")
					.arg(format!("{timestamp:.3}"))
					.arg("-i")
					.arg(&self.path);
			}
			TolerancePolicy::Accurate => {
				command
					.arg("-i")
					.arg(&self.path)
					.arg("-ss")
					.arg(format!("{timestamp:.3}"));
			}
		}

		command.args(["-frames:v", "1"]);

		if let Some(max) = max_size {
			command
				.arg("-vf")
				.arg(format!("scale={max}:{max}:force_original_aspect_ratio=decrease"));
		}

		let output = command
			.args(["-f", "image2pipe", "-vcodec", "png", "-"])
			.stdout(Stdio::piped())
			.stderr(Stdio::piped())
			.output()
			.await
			.map_err(|e| Error::FileIO((&self.path, e, "failed to spawn ffmpeg").into()))?;

		if !output.status.success() {
			return Err(Error::ProcessFailed {
				tool: "ffmpeg",
				status: output.status,
				path: self.path.clone(),
				stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
			});
		}

		if output.stdout.is_empty() {
			return Err(Error::NoVideoTrack(self.path.clone()));
		}

		trace!(bytes = output.stdout.len(), "decoding extracted frame");

		let path = self.path.clone();
		let image = spawn_blocking(move || {
			image::load_from_memory_with_format(&output.stdout, ImageFormat::Png)
				.map(|decoded| decoded.into_rgba8())
		})
		.await
		.map_err(|e| Error::FrameDecode(path.clone(), e.to_string()))?
		.map_err(|e| Error::FrameDecode(path, e.to_string()))?;

		Ok(Frame::new(image, timestamp))
	}
}

impl fmt::Debug for FfmpegFrameSource {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("FfmpegFrameSource")
			.field("path", &self.path)
			.field("mode", &self.mode)
			.finish_non_exhaustive()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn accurate_policy_has_zero_slack() {
		assert_eq!(TolerancePolicy::Accurate.slack(), (0.0, 0.0));
	}

	#[test]
	fn fast_policy_allows_keyframe_distance() {
		let (before, after) = TolerancePolicy::Fast.slack();
		assert!(before >= 0.5 && after <= 2.0);
	}
}
