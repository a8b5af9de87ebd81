use std::{
	collections::BTreeMap,
	path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Progress of the cover-thumbnail artifact for a video.
#[derive(
	Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ThumbnailStatus {
	#[default]
	Absent,
	Pending,
	InProgress,
	Completed,
	Error,
}

/// One discovered video file and everything the catalog knows about it.
///
/// `id` is minted on first registration and survives rescans: re-registering
/// the same absolute path reuses the existing row's identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Video {
	pub id: Uuid,
	/// Absolute path; the unique key.
	pub url: PathBuf,
	pub title: String,
	/// Seconds.
	pub duration: f64,
	pub width: Option<u32>,
	pub height: Option<u32>,
	pub frame_rate: Option<f64>,
	pub codec_tag: Option<String>,
	/// Bits per second.
	pub bitrate: Option<u64>,
	/// Bytes.
	pub file_size: Option<u64>,
	pub custom_metadata: BTreeMap<String, String>,
	pub date_added: DateTime<Utc>,
	pub date_modified: DateTime<Utc>,
	pub thumbnail_url: Option<PathBuf>,
	pub mosaic_url: Option<PathBuf>,
	pub preview_url: Option<PathBuf>,
	pub thumbnail_status: ThumbnailStatus,
	/// Path relative to the library root it was discovered under, for
	/// display grouping.
	pub relative_path: Option<PathBuf>,
}

impl Video {
	#[must_use]
	pub fn new(url: impl Into<PathBuf>) -> Self {
		let url = url.into();
		let now = Utc::now();

		Self {
			id: Uuid::new_v4(),
			title: title_from_url(&url),
			url,
			duration: 0.0,
			width: None,
			height: None,
			frame_rate: None,
			codec_tag: None,
			bitrate: None,
			file_size: None,
			custom_metadata: BTreeMap::new(),
			date_added: now,
			date_modified: now,
			thumbnail_url: None,
			mosaic_url: None,
			preview_url: None,
			thumbnail_status: ThumbnailStatus::Absent,
			relative_path: None,
		}
	}

	#[must_use]
	pub fn aspect_ratio(&self) -> Option<f64> {
		match (self.width, self.height) {
			(Some(w), Some(h)) if w > 0 && h > 0 => Some(f64::from(w) / f64::from(h)),
			_ => None,
		}
	}

	/// Both dimensions set and positive, or neither set.
	#[must_use]
	pub fn dimensions_consistent(&self) -> bool {
		matches!(
			(self.width, self.height),
			(None, None) | (Some(1..), Some(1..))
		)
	}
}

pub(crate) fn title_from_url(url: &Path) -> String {
	url.file_stem()
		.map(|stem| stem.to_string_lossy().into_owned())
		.unwrap_or_else(|| url.to_string_lossy().into_owned())
}
