//! Draws a populated [`vw_layout::MosaicLayout`] into a single raster image
//! and encodes it for disk. Pure CPU work; callers park it on a blocking
//! thread.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

mod compose;
mod encode;
mod font;

pub use compose::{compose, format_timestamp, pixel_hash, Tile};
pub use encode::{encode, OutputFormat};

#[derive(thiserror::Error, Debug)]
pub enum Error {
	#[error("tile count {tiles} does not match layout slots {slots}")]
	TileCountMismatch { tiles: usize, slots: usize },
	#[error("failed to encode {format} output: {reason}")]
	Encode {
		format: &'static str,
		reason: String,
	},
}

/// Border and shadow treatment applied to every tile.
///
/// The border color is a grayscale luminance; mosaics keep tile chrome
/// monochrome so the frames themselves carry the color.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VisualSettings {
	pub border: bool,
	pub border_luminance: f32,
	pub border_width: u32,
	pub shadow: bool,
	pub shadow_opacity: f32,
	pub shadow_radius: u32,
	pub shadow_offset: (i32, i32),
}

impl Default for VisualSettings {
	fn default() -> Self {
		Self {
			border: true,
			border_luminance: 1.0,
			border_width: 1,
			shadow: true,
			shadow_opacity: 0.5,
			shadow_radius: 4,
			shadow_offset: (0, -2),
		}
	}
}

/// Text block drawn over the bottom strip of the mosaic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataOverlay {
	pub codec_tag: Option<String>,
	pub bit_rate: Option<u64>,
	pub custom: BTreeMap<String, String>,
}

impl MetadataOverlay {
	/// Joins the set fields into the strip's single display line.
	#[must_use]
	pub fn display_line(&self) -> String {
		let mut parts = Vec::new();

		if let Some(codec) = &self.codec_tag {
			parts.push(codec.clone());
		}
		if let Some(bit_rate) = self.bit_rate {
			parts.push(vw_utils::bytes::format_bitrate(bit_rate));
		}
		for (key, value) in &self.custom {
			parts.push(format!("{key}: {value}"));
		}

		parts.join(" | ")
	}
}
