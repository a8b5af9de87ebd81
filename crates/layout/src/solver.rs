use serde::{Deserialize, Serialize};

use crate::{
	AspectRatio, Density, Error, MAX_THUMBNAILS, SHORT_VIDEO_CUTOFF_SECS, SHORT_VIDEO_THUMBNAILS,
};

/// Logarithmic base for the duration -> tile count curve.
const COUNT_BASE: f64 = 320.0 / 200.0;
const COUNT_LOG_SCALE: f64 = 10.0;

/// Computed geometry of a mosaic: grid shape, per-tile rects and the total
/// canvas size. Positions and sizes are parallel vectors, one entry per tile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MosaicLayout {
	pub rows: u32,
	pub cols: u32,
	pub thumbnail_size: (u32, u32),
	pub positions: Vec<(u32, u32)>,
	pub thumbnail_sizes: Vec<(u32, u32)>,
	pub mosaic_size: (u32, u32),
}

impl MosaicLayout {
	#[must_use]
	pub fn thumb_count(&self) -> usize {
		self.positions.len()
	}
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayoutParams {
	/// Width over height of the source video's frames.
	pub video_aspect: f64,
	pub thumb_count: u32,
	pub mosaic_width: u32,
	pub target_aspect: AspectRatio,
	pub spacing: u32,
	/// Reserve a double-size hero tile in the top-left corner.
	pub custom_layout: bool,
	/// Round the tile count up so the grid is a whole rectangle.
	pub auto_layout: bool,
}

/// How many thumbnails a video of `duration` seconds gets at `density`.
///
/// Short videos get a fixed minimal grid; everything else follows a
/// logarithmic curve so ten-hour recordings don't drown the canvas.
pub fn thumbnail_count(duration: f64, mosaic_width: u32, density: Density) -> Result<u32, Error> {
	if mosaic_width == 0 {
		return Err(Error::InvalidConfiguration(
			"mosaic width must be positive".into(),
		));
	}
	if !(density.factor() > 0.0) {
		return Err(Error::InvalidConfiguration(format!(
			"density {density} has a non-positive factor"
		)));
	}

	if duration < SHORT_VIDEO_CUTOFF_SECS {
		return Ok(SHORT_VIDEO_THUMBNAILS);
	}

	let raw = COUNT_BASE + COUNT_LOG_SCALE * duration.ln();

	#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
	Ok(((raw / density.factor()).floor() as u32).min(MAX_THUMBNAILS))
}

/// Solves the grid for the requested parameters.
///
/// Columns are chosen so the canvas aspect (`cols / rows * video_aspect`)
/// tracks the target aspect; tiles keep the video's own aspect ratio.
pub fn solve(params: &LayoutParams) -> Result<MosaicLayout, Error> {
	let LayoutParams {
		video_aspect,
		thumb_count,
		mosaic_width,
		target_aspect,
		spacing,
		custom_layout,
		auto_layout,
	} = *params;

	if mosaic_width == 0 {
		return Err(Error::InvalidConfiguration(
			"mosaic width must be positive".into(),
		));
	}
	if !(video_aspect > 0.0) {
		return Err(Error::InvalidConfiguration(format!(
			"video aspect ratio must be positive, got {video_aspect}"
		)));
	}
	if thumb_count == 0 {
		return Err(Error::InvalidConfiguration(
			"thumbnail count must be positive".into(),
		));
	}

	let mut count = thumb_count;
	let mut cols = column_count(count, target_aspect.ratio(), video_aspect);
	if custom_layout {
		cols = cols.max(2);
	}

	if auto_layout && !custom_layout {
		count = count.div_ceil(cols) * cols;
		count = count.min(MAX_THUMBNAILS);
	}

	// The hero tile consumes a 2x2 cell block but contributes a single tile.
	let cells_needed = if custom_layout { count + 3 } else { count };
	let rows = cells_needed.div_ceil(cols);

	let gutters = (cols + 1) * spacing;
	if gutters >= mosaic_width {
		return Err(Error::InvalidConfiguration(format!(
			"spacing {spacing} leaves no room for {cols} columns at width {mosaic_width}"
		)));
	}

	let thumb_w = (mosaic_width - gutters) / cols;
	if thumb_w == 0 {
		return Err(Error::InvalidConfiguration(format!(
			"width {mosaic_width} is too small for {cols} columns"
		)));
	}

	#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
	let thumb_h = ((f64::from(thumb_w) / video_aspect).round() as u32).max(1);

	let mosaic_height = rows * thumb_h + (rows + 1) * spacing;

	let cell_origin = |row: u32, col: u32| {
		(
			spacing + col * (thumb_w + spacing),
			spacing + row * (thumb_h + spacing),
		)
	};

	let mut positions = Vec::with_capacity(count as usize);
	let mut thumbnail_sizes = Vec::with_capacity(count as usize);

	if custom_layout {
		// Hero first, then the remaining tiles fill free cells row-major.
		positions.push(cell_origin(0, 0));
		thumbnail_sizes.push((thumb_w * 2 + spacing, thumb_h * 2 + spacing));

		let mut placed = 1;
		'grid: for row in 0..rows {
			for col in 0..cols {
				if row < 2 && col < 2 {
					continue;
				}
				if placed == count {
					break 'grid;
				}
				positions.push(cell_origin(row, col));
				thumbnail_sizes.push((thumb_w, thumb_h));
				placed += 1;
			}
		}
	} else {
		for i in 0..count {
			positions.push(cell_origin(i / cols, i % cols));
			thumbnail_sizes.push((thumb_w, thumb_h));
		}
	}

	Ok(MosaicLayout {
		rows,
		cols,
		thumbnail_size: (thumb_w, thumb_h),
		positions,
		thumbnail_sizes,
		mosaic_size: (mosaic_width, mosaic_height),
	})
}

fn column_count(thumb_count: u32, target_aspect: f64, video_aspect: f64) -> u32 {
	#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
	let cols = (f64::from(thumb_count) * target_aspect / video_aspect)
		.sqrt()
		.round() as u32;

	cols.max(1)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn widescreen(thumb_count: u32) -> LayoutParams {
		LayoutParams {
			video_aspect: 16.0 / 9.0,
			thumb_count,
			mosaic_width: 5120,
			target_aspect: AspectRatio::Widescreen,
			spacing: 4,
			custom_layout: false,
			auto_layout: false,
		}
	}

	#[test]
	fn sixty_second_video_at_medium_density() {
		let count = thumbnail_count(60.0, 5120, Density::M).unwrap();
		assert_eq!(count, 42);

		let layout = solve(&widescreen(count)).unwrap();
		assert_eq!(layout.cols, 6);
		assert_eq!(layout.rows, 7);
	}

	#[test]
	fn short_videos_get_four_tiles() {
		assert_eq!(thumbnail_count(4.9, 5120, Density::M).unwrap(), 4);
		assert_eq!(thumbnail_count(0.0, 5120, Density::Xxl).unwrap(), 4);
	}

	#[test]
	fn count_is_capped_at_one_hundred() {
		// Ten hours at the densest preset would blow way past the cap.
		assert_eq!(
			thumbnail_count(36_000.0, 5120, Density::Xxl).unwrap(),
			MAX_THUMBNAILS
		);
	}

	#[test]
	fn zero_width_is_rejected() {
		assert!(matches!(
			thumbnail_count(60.0, 0, Density::M),
			Err(Error::InvalidConfiguration(_))
		));
		assert!(matches!(
			solve(&LayoutParams {
				mosaic_width: 0,
				..widescreen(42)
			}),
			Err(Error::InvalidConfiguration(_))
		));
	}

	#[test]
	fn parallel_vectors_match_tile_count() {
		for count in [1, 4, 7, 42, 100] {
			let layout = solve(&widescreen(count)).unwrap();
			assert_eq!(layout.positions.len(), count as usize);
			assert_eq!(layout.thumbnail_sizes.len(), count as usize);
		}
	}

	#[test]
	fn tiles_stay_inside_the_canvas() {
		for count in [1, 5, 42, 99] {
			let layout = solve(&widescreen(count)).unwrap();
			let (canvas_w, canvas_h) = layout.mosaic_size;

			for ((x, y), (w, h)) in layout.positions.iter().zip(&layout.thumbnail_sizes) {
				assert!(x + w <= canvas_w, "tile sticks out horizontally");
				assert!(y + h <= canvas_h, "tile sticks out vertically");
			}
		}
	}

	#[test]
	fn tiles_do_not_overlap() {
		let layout = solve(&LayoutParams {
			custom_layout: true,
			..widescreen(20)
		})
		.unwrap();

		let rects = layout
			.positions
			.iter()
			.zip(&layout.thumbnail_sizes)
			.collect::<Vec<_>>();

		for (i, (&(ax, ay), &(aw, ah))) in rects.iter().enumerate() {
			for (&(bx, by), &(bw, bh)) in &rects[i + 1..] {
				let disjoint = ax + aw <= bx || bx + bw <= ax || ay + ah <= by || by + bh <= ay;
				assert!(disjoint, "tiles {:?} and {:?} overlap", (ax, ay), (bx, by));
			}
		}
	}

	#[test]
	fn custom_layout_reserves_a_double_hero_tile() {
		let layout = solve(&LayoutParams {
			custom_layout: true,
			..widescreen(10)
		})
		.unwrap();

		let (base_w, base_h) = layout.thumbnail_size;
		assert_eq!(
			layout.thumbnail_sizes[0],
			(base_w * 2 + 4, base_h * 2 + 4),
			"hero tile spans two cells plus the gutter"
		);
		assert!(layout.thumbnail_sizes[1..]
			.iter()
			.all(|&size| size == (base_w, base_h)));
	}

	#[test]
	fn auto_layout_fills_whole_rows() {
		let layout = solve(&LayoutParams {
			auto_layout: true,
			..widescreen(40)
		})
		.unwrap();

		assert_eq!(layout.thumb_count() as u32 % layout.cols, 0);
	}

	#[test]
	fn layout_survives_a_serde_round_trip() {
		let layout = solve(&widescreen(42)).unwrap();
		let encoded = serde_json::to_string(&layout).unwrap();
		let decoded: MosaicLayout = serde_json::from_str(&encoded).unwrap();
		assert_eq!(layout, decoded);
	}
}
