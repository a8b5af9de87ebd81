use image::{imageops, Pixel, Rgba, RgbaImage};
use imageproc::drawing::draw_text_mut;
use rusttype::Scale;
use tracing::trace;
use vw_layout::MosaicLayout;
use vw_media::Frame;

use crate::{font::OVERLAY_FONT, Error, MetadataOverlay, VisualSettings};

const BACKGROUND: Rgba<u8> = Rgba([30, 30, 30, 255]);
const BLANK_TILE: Rgba<u8> = Rgba([48, 48, 48, 255]);
const STRIP_FILL: Rgba<u8> = Rgba([0, 0, 0, 160]);

/// Share of the canvas height the metadata strip covers.
const METADATA_STRIP_SHARE: f64 = 0.1;

/// One slot of the mosaic: a decoded frame (or a blank substitute when
/// extraction failed) plus the label drawn in its corner.
#[derive(Debug)]
pub struct Tile {
	pub frame: Option<Frame>,
	pub label: String,
}

impl Tile {
	#[must_use]
	pub fn new(frame: Option<Frame>, timestamp: f64) -> Self {
		Self {
			frame,
			label: format_timestamp(timestamp),
		}
	}
}

/// Renders `tiles` into the geometry of `layout`.
///
/// Tiles and layout slots are matched by index; failed extractions arrive as
/// `None` frames and render as blank tiles rather than aborting the mosaic.
pub fn compose(
	tiles: &[Tile],
	layout: &MosaicLayout,
	visual: &VisualSettings,
	metadata: Option<&MetadataOverlay>,
) -> Result<RgbaImage, Error> {
	if tiles.len() != layout.thumb_count() {
		return Err(Error::TileCountMismatch {
			tiles: tiles.len(),
			slots: layout.thumb_count(),
		});
	}

	let (canvas_w, canvas_h) = layout.mosaic_size;
	let mut canvas = RgbaImage::from_pixel(canvas_w, canvas_h, BACKGROUND);

	for (tile, (&(x, y), &(w, h))) in tiles
		.iter()
		.zip(layout.positions.iter().zip(&layout.thumbnail_sizes))
	{
		if visual.shadow {
			draw_shadow(&mut canvas, x, y, w, h, visual);
		}

		match &tile.frame {
			Some(frame) => {
				let scaled = imageops::resize(
					&frame.image,
					w.max(1),
					h.max(1),
					imageops::FilterType::Triangle,
				);
				imageops::overlay(&mut canvas, &scaled, i64::from(x), i64::from(y));
			}
			None => fill_rect(&mut canvas, x, y, w, h, BLANK_TILE),
		}

		if visual.border {
			draw_border(&mut canvas, x, y, w, h, visual);
		}

		draw_label(&mut canvas, &tile.label, x, y, h);
	}

	if let Some(metadata) = metadata {
		draw_metadata_strip(&mut canvas, metadata);
	}

	trace!(width = canvas_w, height = canvas_h, "composed mosaic canvas");

	Ok(canvas)
}

/// Hash of the raw pixel buffer, prior to any encoder entropy.
#[must_use]
pub fn pixel_hash(image: &RgbaImage) -> String {
	blake3::hash(image.as_raw()).to_hex().to_string()
}

/// `125.0` -> `"2:05"`, `3725.0` -> `"1:02:05"`.
#[must_use]
pub fn format_timestamp(seconds: f64) -> String {
	#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
	let total = seconds.max(0.0).round() as u64;
	let (hours, minutes, secs) = (total / 3600, (total % 3600) / 60, total % 60);

	if hours > 0 {
		format!("{hours}:{minutes:02}:{secs:02}")
	} else {
		format!("{minutes}:{secs:02}")
	}
}

fn blend_pixel(canvas: &mut RgbaImage, x: i64, y: i64, color: Rgba<u8>) {
	if x < 0 || y < 0 {
		return;
	}
	#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
	let (x, y) = (x as u32, y as u32);
	if x < canvas.width() && y < canvas.height() {
		canvas.get_pixel_mut(x, y).blend(&color);
	}
}

fn fill_rect(canvas: &mut RgbaImage, x: u32, y: u32, w: u32, h: u32, color: Rgba<u8>) {
	for dy in 0..h {
		for dx in 0..w {
			blend_pixel(canvas, i64::from(x + dx), i64::from(y + dy), color);
		}
	}
}

fn draw_shadow(canvas: &mut RgbaImage, x: u32, y: u32, w: u32, h: u32, visual: &VisualSettings) {
	let (off_x, off_y) = visual.shadow_offset;
	let base_alpha = (visual.shadow_opacity.clamp(0.0, 1.0) * 255.0) as u8;
	let radius = visual.shadow_radius;

	// A cheap feather: concentric outlines fading out from the offset rect.
	for ring in 0..=radius {
		let falloff = 1.0 - f64::from(ring) / f64::from(radius + 1);
		#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
		let alpha = (f64::from(base_alpha) * falloff) as u8;
		if alpha == 0 {
			continue;
		}
		let color = Rgba([0, 0, 0, alpha]);

		let left = i64::from(x) + i64::from(off_x) - i64::from(ring);
		let top = i64::from(y) + i64::from(off_y) - i64::from(ring);
		let right = left + i64::from(w + ring * 2) - 1;
		let bottom = top + i64::from(h + ring * 2) - 1;

		for px in left..=right {
			blend_pixel(canvas, px, top, color);
			blend_pixel(canvas, px, bottom, color);
		}
		for py in (top + 1)..bottom {
			blend_pixel(canvas, left, py, color);
			blend_pixel(canvas, right, py, color);
		}
	}
}

fn draw_border(canvas: &mut RgbaImage, x: u32, y: u32, w: u32, h: u32, visual: &VisualSettings) {
	let level = (visual.border_luminance.clamp(0.0, 1.0) * 255.0) as u8;
	let color = Rgba([level, level, level, 255]);

	for inset in 0..visual.border_width.min(w / 2).min(h / 2).max(1) {
		let left = i64::from(x + inset);
		let top = i64::from(y + inset);
		let right = i64::from(x + w - 1 - inset);
		let bottom = i64::from(y + h - 1 - inset);

		for px in left..=right {
			blend_pixel(canvas, px, top, color);
			blend_pixel(canvas, px, bottom, color);
		}
		for py in (top + 1)..bottom {
			blend_pixel(canvas, left, py, color);
			blend_pixel(canvas, right, py, color);
		}
	}
}

fn draw_label(canvas: &mut RgbaImage, label: &str, x: u32, y: u32, tile_h: u32) {
	let Some(font) = OVERLAY_FONT.as_ref() else {
		return;
	};
	if label.is_empty() {
		return;
	}

	let size = (f64::from(tile_h) * 0.12).clamp(10.0, 48.0);
	#[allow(clippy::cast_possible_truncation)]
	let scale = Scale::uniform(size as f32);
	#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
	#[allow(clippy::cast_possible_wrap)]
	let (text_x, text_y) = (
		(x + 6) as i32,
		(y + tile_h).saturating_sub(size as u32 + 6) as i32,
	);

	draw_text_mut(
		canvas,
		Rgba([0, 0, 0, 255]),
		text_x + 1,
		text_y + 1,
		scale,
		font,
		label,
	);
	draw_text_mut(
		canvas,
		Rgba([255, 255, 255, 255]),
		text_x,
		text_y,
		scale,
		font,
		label,
	);
}

fn draw_metadata_strip(canvas: &mut RgbaImage, metadata: &MetadataOverlay) {
	let line = metadata.display_line();
	let (canvas_w, canvas_h) = canvas.dimensions();

	#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
	let strip_h = ((f64::from(canvas_h) * METADATA_STRIP_SHARE) as u32).max(1);
	let strip_y = canvas_h - strip_h;

	fill_rect(canvas, 0, strip_y, canvas_w, strip_h, STRIP_FILL);

	let Some(font) = OVERLAY_FONT.as_ref() else {
		return;
	};
	if line.is_empty() {
		return;
	}

	let size = (f64::from(strip_h) * 0.4).clamp(12.0, 96.0);
	#[allow(clippy::cast_possible_truncation)]
	let scale = Scale::uniform(size as f32);
	#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
	let (text_x, text_y) = (
		(f64::from(strip_h) * 0.3) as i32,
		(f64::from(strip_y) + f64::from(strip_h) * 0.3) as i32,
	);

	draw_text_mut(canvas, Rgba([0, 0, 0, 255]), text_x + 2, text_y + 2, scale, font, &line);
	draw_text_mut(
		canvas,
		Rgba([255, 255, 255, 255]),
		text_x,
		text_y,
		scale,
		font,
		&line,
	);
}

#[cfg(test)]
mod tests {
	use super::*;
	use vw_layout::{solve, AspectRatio, LayoutParams};

	fn small_layout(count: u32) -> MosaicLayout {
		solve(&LayoutParams {
			video_aspect: 16.0 / 9.0,
			thumb_count: count,
			mosaic_width: 640,
			target_aspect: AspectRatio::Widescreen,
			spacing: 4,
			custom_layout: false,
			auto_layout: false,
		})
		.unwrap()
	}

	fn solid_frame(w: u32, h: u32, value: u8, timestamp: f64) -> Frame {
		Frame::new(RgbaImage::from_pixel(w, h, Rgba([value, value, value, 255])), timestamp)
	}

	fn plain_visual() -> VisualSettings {
		VisualSettings {
			border: false,
			shadow: false,
			..VisualSettings::default()
		}
	}

	#[test]
	fn canvas_matches_layout_dimensions() {
		let layout = small_layout(6);
		let tiles = (0..6)
			.map(|i| Tile::new(Some(solid_frame(64, 36, 200, f64::from(i))), f64::from(i)))
			.collect::<Vec<_>>();

		let canvas = compose(&tiles, &layout, &plain_visual(), None).unwrap();
		assert_eq!(canvas.dimensions(), layout.mosaic_size);
	}

	#[test]
	fn tile_count_mismatch_is_rejected() {
		let layout = small_layout(6);
		let tiles = vec![Tile::new(None, 0.0)];

		assert!(matches!(
			compose(&tiles, &layout, &plain_visual(), None),
			Err(Error::TileCountMismatch { tiles: 1, slots: 6 })
		));
	}

	#[test]
	fn frames_land_at_their_slots() {
		let layout = small_layout(4);
		let tiles = (0..4)
			.map(|i| Tile::new(Some(solid_frame(64, 36, 220, f64::from(i))), f64::from(i)))
			.collect::<Vec<_>>();

		let canvas = compose(&tiles, &layout, &plain_visual(), None).unwrap();

		let (x, y) = layout.positions[2];
		let (w, h) = layout.thumbnail_sizes[2];
		let center = canvas.get_pixel(x + w / 2, y + h / 2);
		assert_eq!(center.0[0], 220, "tile interior carries the frame");

		assert_eq!(*canvas.get_pixel(0, 0), BACKGROUND, "gutter keeps background");
	}

	#[test]
	fn missing_frames_become_blank_tiles() {
		let layout = small_layout(4);
		let tiles = (0..4).map(|i| Tile::new(None, f64::from(i))).collect::<Vec<_>>();

		let canvas = compose(&tiles, &layout, &plain_visual(), None).unwrap();

		let (x, y) = layout.positions[0];
		let (w, h) = layout.thumbnail_sizes[0];
		assert_eq!(*canvas.get_pixel(x + w / 2, y + h / 2), BLANK_TILE);
	}

	#[test]
	fn composition_is_deterministic() {
		let layout = small_layout(6);
		let make_tiles = || {
			(0..6u8)
				.map(|i| {
					Tile::new(
						Some(solid_frame(64, 36, 40 + 20 * i, f64::from(i) * 7.0)),
						f64::from(i) * 7.0,
					)
				})
				.collect::<Vec<_>>()
		};

		let visual = VisualSettings::default();
		let first = compose(&make_tiles(), &layout, &visual, None).unwrap();
		let second = compose(&make_tiles(), &layout, &visual, None).unwrap();

		assert_eq!(pixel_hash(&first), pixel_hash(&second));
	}

	#[test]
	fn metadata_strip_darkens_the_bottom() {
		let layout = small_layout(4);
		let tiles = (0..4).map(|i| Tile::new(None, f64::from(i))).collect::<Vec<_>>();
		let overlay = MetadataOverlay {
			codec_tag: Some("video/h264".into()),
			..MetadataOverlay::default()
		};

		let bare = compose(&tiles, &layout, &plain_visual(), None).unwrap();
		let striped = compose(&tiles, &layout, &plain_visual(), Some(&overlay)).unwrap();

		let (w, h) = striped.dimensions();
		let probe = (w / 2, h - 2);
		assert_ne!(striped.get_pixel(probe.0, probe.1), bare.get_pixel(probe.0, probe.1));
		assert_eq!(striped.dimensions(), bare.dimensions());
	}

	#[test]
	fn timestamps_format_like_clocks() {
		assert_eq!(format_timestamp(0.0), "0:00");
		assert_eq!(format_timestamp(125.0), "2:05");
		assert_eq!(format_timestamp(3725.0), "1:02:05");
	}
}
