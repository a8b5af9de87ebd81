use std::{fmt, path::Path, path::PathBuf, process::Stdio};

use serde::Deserialize;
use tokio::process::Command;
use tracing::instrument;

use crate::Error;

/// Technical metadata of a single media file, as reported by the probe.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MediaInfo {
	pub duration: f64,
	pub width: Option<u32>,
	pub height: Option<u32>,
	pub frame_rate: Option<f64>,
	pub bit_rate: Option<u64>,
	pub codec_tag: Option<String>,
	pub has_audio: bool,
}

impl MediaInfo {
	#[must_use]
	pub fn aspect_ratio(&self) -> Option<f64> {
		match (self.width, self.height) {
			(Some(w), Some(h)) if w > 0 && h > 0 => Some(f64::from(w) / f64::from(h)),
			_ => None,
		}
	}
}

/// Loads [`MediaInfo`] for a URL. Behind a trait so tests can feed the
/// pipeline deterministic metadata without touching a real demuxer.
#[async_trait::async_trait]
pub trait MetadataProber: Send + Sync + fmt::Debug {
	async fn probe(&self, path: &Path) -> Result<MediaInfo, Error>;
}

/// `ffprobe -print_format json` backed prober.
#[derive(Debug, Clone)]
pub struct FfprobeProber {
	ffprobe: PathBuf,
}

impl FfprobeProber {
	pub fn discover() -> Result<Self, Error> {
		Ok(Self {
			ffprobe: which::which("ffprobe").map_err(|_| Error::ToolNotFound("ffprobe"))?,
		})
	}
}

#[async_trait::async_trait]
impl MetadataProber for FfprobeProber {
	#[instrument(skip(self))]
	async fn probe(&self, path: &Path) -> Result<MediaInfo, Error> {
		let output = Command::new(&self.ffprobe)
			.args([
				"-v",
				"quiet",
				"-print_format",
				"json",
				"-show_format",
				"-show_streams",
			])
			.arg(path)
			.stdout(Stdio::piped())
			.stderr(Stdio::piped())
			.output()
			.await
			.map_err(|e| Error::FileIO((path, e, "failed to spawn ffprobe").into()))?;

		if !output.status.success() {
			return Err(Error::ProcessFailed {
				tool: "ffprobe",
				status: output.status,
				path: path.to_path_buf(),
				stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
			});
		}

		let raw: RawProbe = serde_json::from_slice(&output.stdout)
			.map_err(|e| Error::ProbeParse(path.to_path_buf(), e))?;

		Ok(media_info_from_raw(raw))
	}
}

#[derive(Debug, Deserialize)]
struct RawProbe {
	format: Option<RawFormat>,
	#[serde(default)]
	streams: Vec<RawStream>,
}

#[derive(Debug, Deserialize)]
struct RawFormat {
	duration: Option<String>,
	bit_rate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawStream {
	codec_type: Option<String>,
	codec_name: Option<String>,
	width: Option<u32>,
	height: Option<u32>,
	avg_frame_rate: Option<String>,
	r_frame_rate: Option<String>,
	duration: Option<String>,
	bit_rate: Option<String>,
}

fn media_info_from_raw(raw: RawProbe) -> MediaInfo {
	let video = raw
		.streams
		.iter()
		.find(|stream| stream.codec_type.as_deref() == Some("video"));
	let has_audio = raw
		.streams
		.iter()
		.any(|stream| stream.codec_type.as_deref() == Some("audio"));

	let duration = raw
		.format
		.as_ref()
		.and_then(|format| format.duration.as_deref())
		.or_else(|| video.and_then(|stream| stream.duration.as_deref()))
		.and_then(|duration| duration.parse::<f64>().ok())
		.unwrap_or_default();

	let bit_rate = raw
		.format
		.as_ref()
		.and_then(|format| format.bit_rate.as_deref())
		.or_else(|| video.and_then(|stream| stream.bit_rate.as_deref()))
		.and_then(|rate| rate.parse::<u64>().ok());

	let frame_rate = video
		.and_then(|stream| {
			stream
				.avg_frame_rate
				.as_deref()
				.and_then(parse_frame_rate)
				.or_else(|| stream.r_frame_rate.as_deref().and_then(parse_frame_rate))
		})
		.filter(|rate| *rate > 0.0);

	MediaInfo {
		duration,
		width: video.and_then(|stream| stream.width).filter(|w| *w > 0),
		height: video.and_then(|stream| stream.height).filter(|h| *h > 0),
		frame_rate,
		bit_rate,
		codec_tag: video
			.and_then(|stream| stream.codec_name.as_deref())
			.map(|codec| format!("video/{codec}")),
		has_audio,
	}
}

/// Frame rates come back as rationals like `30000/1001` or `25/1`.
fn parse_frame_rate(raw: &str) -> Option<f64> {
	match raw.split_once('/') {
		Some((num, den)) => {
			let num = num.trim().parse::<f64>().ok()?;
			let den = den.trim().parse::<f64>().ok()?;
			(den != 0.0).then(|| num / den)
		}
		None => raw.trim().parse::<f64>().ok(),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const SAMPLE: &str = r#"{
		"streams": [
			{
				"codec_type": "video",
				"codec_name": "h264",
				"width": 1920,
				"height": 1080,
				"avg_frame_rate": "30000/1001",
				"bit_rate": "4500000"
			},
			{ "codec_type": "audio", "codec_name": "aac" }
		],
		"format": { "duration": "634.584000", "bit_rate": "4739218" }
	}"#;

	#[test]
	fn parses_a_typical_probe() {
		let raw: RawProbe = serde_json::from_str(SAMPLE).unwrap();
		let info = media_info_from_raw(raw);

		assert!((info.duration - 634.584).abs() < 1e-9);
		assert_eq!(info.width, Some(1920));
		assert_eq!(info.height, Some(1080));
		assert_eq!(info.bit_rate, Some(4_739_218));
		assert_eq!(info.codec_tag.as_deref(), Some("video/h264"));
		assert!(info.has_audio);

		let rate = info.frame_rate.unwrap();
		assert!((rate - 29.97).abs() < 0.01);
	}

	#[test]
	fn ntsc_fraction_parses() {
		let rate = parse_frame_rate("30000/1001").unwrap();
		assert!((rate - 29.970_029).abs() < 1e-3);
	}

	#[test]
	fn degenerate_fractions_are_rejected() {
		assert_eq!(parse_frame_rate("0/0"), None);
		assert_eq!(parse_frame_rate("garbage"), None);
	}

	#[test]
	fn missing_streams_still_produce_info() {
		let raw: RawProbe = serde_json::from_str(r#"{ "format": {} }"#).unwrap();
		let info = media_info_from_raw(raw);

		assert_eq!(info.duration, 0.0);
		assert_eq!(info.aspect_ratio(), None);
		assert!(!info.has_audio);
	}
}
