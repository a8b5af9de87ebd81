use std::io::Cursor;

use image::{
	codecs::{jpeg::JpegEncoder, png::PngEncoder},
	DynamicImage, ImageEncoder, RgbaImage,
};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::warn;

use crate::Error;

/// Still-image output container for mosaics and cover thumbnails.
#[derive(
	Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, Default,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum OutputFormat {
	Jpeg,
	Png,
	#[default]
	Heif,
}

impl OutputFormat {
	#[must_use]
	pub const fn extension(self) -> &'static str {
		match self {
			Self::Jpeg => "jpg",
			Self::Png => "png",
			Self::Heif => "heic",
		}
	}
}

/// Encodes `image` for disk, returning the bytes and the format actually
/// used. HEIF has no encoder here, so it degrades to JPEG at the same
/// quality; callers must name the artifact after the returned format.
pub fn encode(
	image: &RgbaImage,
	format: OutputFormat,
	compression_quality: f32,
) -> Result<(Vec<u8>, OutputFormat), Error> {
	let format = match format {
		OutputFormat::Heif => {
			warn!("HEIF encoding unavailable; falling back to JPEG");
			OutputFormat::Jpeg
		}
		other => other,
	};

	let mut bytes = Vec::new();

	match format {
		OutputFormat::Jpeg => {
			#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
			let quality = (compression_quality.clamp(0.0, 1.0) * 100.0).max(1.0) as u8;

			// JPEG has no alpha channel.
			let rgb = DynamicImage::ImageRgba8(image.clone()).into_rgb8();

			JpegEncoder::new_with_quality(Cursor::new(&mut bytes), quality)
				.write_image(
					rgb.as_raw(),
					rgb.width(),
					rgb.height(),
					image::ColorType::Rgb8,
				)
				.map_err(|e| Error::Encode {
					format: "jpeg",
					reason: e.to_string(),
				})?;
		}
		OutputFormat::Png => {
			PngEncoder::new(Cursor::new(&mut bytes))
				.write_image(
					image.as_raw(),
					image.width(),
					image.height(),
					image::ColorType::Rgba8,
				)
				.map_err(|e| Error::Encode {
					format: "png",
					reason: e.to_string(),
				})?;
		}
		OutputFormat::Heif => unreachable!("handled by the fallback above"),
	}

	Ok((bytes, format))
}
