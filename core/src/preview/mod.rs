use std::{
	fmt,
	path::{Path, PathBuf},
	process::Stdio,
	sync::Arc,
};

use tokio::{
	fs,
	io::{AsyncBufReadExt, BufReader},
	process::Command,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use vw_media::MetadataProber;

use crate::{
	config::{AppPaths, PreviewConfiguration},
	scanner::PREVIEW_SUFFIX,
	video::Video,
};

pub mod plan;

pub use plan::{plan, SegmentPlan};

/// Export (encode) progress occupies the tail of the overall range.
const EXPORT_PROGRESS_START: f64 = 0.7;

#[derive(thiserror::Error, Debug)]
pub enum Error {
	#[error("unable to read source tracks for composition <url='{}'>: {cause}", .url.display())]
	UnableToCreateCompositionTracks { url: PathBuf, cause: String },
	#[error("unable to create export session: {0}")]
	UnableToCreateExportSession(String),
	#[error("failed to insert segment {index} <url='{}'>: {cause}", .url.display())]
	SegmentInsertionFailed {
		url: PathBuf,
		index: usize,
		cause: String,
	},
	#[error("preview export failed <url='{}'>: {cause}", .url.display())]
	ExportFailed { url: PathBuf, cause: String },
	#[error("preview generation was cancelled")]
	Cancelled,
}

/// Progress callback fed the overall fraction in `[0, 1]`.
pub type ProgressFn = Arc<dyn Fn(f64) + Send + Sync>;

/// Splices sped-up segments of a source into a short MP4 via an external
/// `ffmpeg` export.
pub struct PreviewEngine {
	prober: Arc<dyn MetadataProber>,
	paths: AppPaths,
}

impl fmt::Debug for PreviewEngine {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("PreviewEngine").finish_non_exhaustive()
	}
}

impl PreviewEngine {
	#[must_use]
	pub fn new(prober: Arc<dyn MetadataProber>, paths: AppPaths) -> Self {
		Self { prober, paths }
	}

	/// Destination the preview for `video` will be written to.
	#[must_use]
	pub fn destination(&self, video: &Video, config: &PreviewConfiguration) -> PathBuf {
		if config.save_in_custom_location {
			if let Some(custom) = &config.custom_save_location {
				let stem = video
					.url
					.file_stem()
					.map(|stem| stem.to_string_lossy().into_owned())
					.unwrap_or_else(|| video.id.simple().to_string());
				return custom.join(format!("{stem}{PREVIEW_SUFFIX}.mp4"));
			}
		}

		self.paths
			.previews_dir()
			.join(format!("{}.mp4", video.id.simple()))
	}

	/// Builds the composition and exports it, mapping export progress into
	/// the 70-100% band of `progress`.
	#[instrument(skip_all, fields(url = %video.url.display()))]
	pub async fn generate(
		&self,
		video: &Video,
		config: &PreviewConfiguration,
		progress: Option<ProgressFn>,
		cancel: CancellationToken,
	) -> Result<PathBuf, Error> {
		let emit = |fraction: f64| {
			if let Some(progress) = &progress {
				progress(fraction);
			}
		};

		let info = self
			.prober
			.probe(&video.url)
			.await
			.map_err(|e| Error::UnableToCreateCompositionTracks {
				url: video.url.clone(),
				cause: e.to_string(),
			})?;

		let duration = if info.duration > 0.0 {
			info.duration
		} else {
			video.duration
		};

		emit(0.2);

		let plan = plan::plan(duration, config.density, config);
		debug!(
			segments = plan.extract_count,
			per_segment = plan.per_segment_duration,
			speed = plan.speed_multiplier,
			"computed preview plan"
		);

		let filter = build_filtergraph(&plan, info.has_audio).map_err(|index| {
			Error::SegmentInsertionFailed {
				url: video.url.clone(),
				index,
				cause: "segment fell outside the source timeline".to_string(),
			}
		})?;

		emit(EXPORT_PROGRESS_START);

		if cancel.is_cancelled() {
			return Err(Error::Cancelled);
		}

		let destination = self.destination(video, config);
		if let Some(parent) = destination.parent() {
			fs::create_dir_all(parent)
				.await
				.map_err(|e| Error::ExportFailed {
					url: video.url.clone(),
					cause: e.to_string(),
				})?;
		}

		export(
			&video.url,
			&destination,
			&filter,
			info.has_audio,
			plan.output_duration(),
			&emit,
			&cancel,
		)
		.await?;

		emit(1.0);
		Ok(destination)
	}
}

/// Builds the `filter_complex` trimming each segment and retiming it to the
/// planned speed, then concatenating everything. Returns the offending
/// segment index if the plan produced an unusable range.
fn build_filtergraph(plan: &SegmentPlan, has_audio: bool) -> Result<String, usize> {
	let mut filters = Vec::new();
	let mut concat_inputs = String::new();

	for (index, start) in plan.starts.iter().enumerate() {
		if *start < 0.0 || plan.per_segment_duration <= 0.0 {
			return Err(index);
		}

		filters.push(format!(
			"[0:v]trim=start={start:.3}:duration={dur:.3},setpts=(PTS-STARTPTS)/{speed}[v{index}]",
			dur = plan.per_segment_duration,
			speed = plan.speed_multiplier,
		));

		if has_audio {
			filters.push(format!(
				"[0:a]atrim=start={start:.3}:duration={dur:.3},asetpts=PTS-STARTPTS,atempo={speed}[a{index}]",
				dur = plan.per_segment_duration,
				speed = clamp_atempo(plan.speed_multiplier),
			));
			concat_inputs.push_str(&format!("[v{index}][a{index}]"));
		} else {
			concat_inputs.push_str(&format!("[v{index}]"));
		}
	}

	let n = plan.starts.len();
	let concat = if has_audio {
		format!("{concat_inputs}concat=n={n}:v=1:a=1[outv][outa]")
	} else {
		format!("{concat_inputs}concat=n={n}:v=1:a=0[outv]")
	};

	filters.push(concat);
	Ok(filters.join(";"))
}

/// `atempo` only accepts 0.5..=2.0 per instance.
fn clamp_atempo(speed: f64) -> f64 {
	speed.clamp(0.5, 2.0)
}

#[allow(clippy::too_many_arguments)]
async fn export(
	source: &Path,
	destination: &Path,
	filter: &str,
	has_audio: bool,
	expected_output_secs: f64,
	emit: &impl Fn(f64),
	cancel: &CancellationToken,
) -> Result<(), Error> {
	let ffmpeg =
		which::which("ffmpeg").map_err(|e| Error::UnableToCreateExportSession(e.to_string()))?;

	// Write to a sibling temp name and rename on success so a cancelled or
	// failed export never leaves a half-written preview behind.
	let temp = destination.with_extension("mp4.partial");

	let mut command = Command::new(ffmpeg);
	command
		.args(["-hide_banner", "-loglevel", "error", "-y"])
		.arg("-i")
		.arg(source)
		.args(["-filter_complex", filter, "-map", "[outv]"]);

	if has_audio {
		command.args(["-map", "[outa]"]);
	}

	command
		.args(["-c:v", "libx264", "-preset", "slow", "-crf", "18"])
		.args(["-movflags", "+faststart", "-f", "mp4"])
		.args(["-progress", "pipe:1", "-nostats"])
		.arg(&temp)
		.stdout(Stdio::piped())
		.stderr(Stdio::piped());

	let mut child = command.spawn().map_err(|e| Error::ExportFailed {
		url: source.to_path_buf(),
		cause: e.to_string(),
	})?;

	// ffmpeg's -progress stream reports out_time_ms in microseconds; map it
	// onto the export band of the overall progress.
	if let Some(stdout) = child.stdout.take() {
		let mut lines = BufReader::new(stdout).lines();
		loop {
			tokio::select! {
				() = cancel.cancelled() => {
					let _ = child.start_kill();
					let _ = child.wait().await;
					remove_quietly(&temp).await;
					return Err(Error::Cancelled);
				}
				line = lines.next_line() => match line {
					Ok(Some(line)) => {
						if let Some(raw) = line.strip_prefix("out_time_ms=") {
							if let Ok(micros) = raw.trim().parse::<i64>() {
								#[allow(clippy::cast_precision_loss)]
								let done = (micros as f64 / 1_000_000.0
									/ expected_output_secs.max(f64::MIN_POSITIVE))
								.clamp(0.0, 1.0);
								emit(EXPORT_PROGRESS_START + done * (1.0 - EXPORT_PROGRESS_START));
							}
						}
					}
					Ok(None) => break,
					Err(e) => {
						warn!(?e, "lost ffmpeg progress stream");
						break;
					}
				}
			}
		}
	}

	let output = child
		.wait_with_output()
		.await
		.map_err(|e| Error::ExportFailed {
			url: source.to_path_buf(),
			cause: e.to_string(),
		})?;

	if !output.status.success() {
		remove_quietly(&temp).await;
		return Err(Error::ExportFailed {
			url: source.to_path_buf(),
			cause: String::from_utf8_lossy(&output.stderr).into_owned(),
		});
	}

	fs::rename(&temp, destination)
		.await
		.map_err(|e| Error::ExportFailed {
			url: source.to_path_buf(),
			cause: e.to_string(),
		})
}

async fn remove_quietly(path: &Path) {
	if let Err(e) = fs::remove_file(path).await {
		if e.kind() != std::io::ErrorKind::NotFound {
			warn!(path = %path.display(), ?e, "failed to remove partial preview");
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use vw_layout::Density;

	#[test]
	fn filtergraph_covers_every_segment() {
		let plan = plan::plan(300.0, Density::Xs, &PreviewConfiguration::default());
		let filter = build_filtergraph(&plan, true).unwrap();

		assert_eq!(filter.matches("trim=start").count(), 15 * 2);
		assert!(filter.contains("concat=n=15:v=1:a=1[outv][outa]"));
		assert!(filter.contains("atempo=1"));
	}

	#[test]
	fn silent_sources_skip_audio_lanes() {
		let plan = plan::plan(300.0, Density::Xs, &PreviewConfiguration::default());
		let filter = build_filtergraph(&plan, false).unwrap();

		assert!(!filter.contains("atrim"));
		assert!(filter.contains("concat=n=15:v=1:a=0[outv]"));
	}

	#[test]
	fn atempo_stays_in_its_legal_band() {
		assert!((clamp_atempo(0.1) - 0.5).abs() < f64::EPSILON);
		assert!((clamp_atempo(1.5) - 1.5).abs() < f64::EPSILON);
		assert!((clamp_atempo(9.0) - 2.0).abs() < f64::EPSILON);
	}
}
