//! Pure geometry for mosaic stills: how many thumbnails a video of a given
//! duration deserves, and where each tile goes on the canvas.

mod density;
mod solver;

pub use density::{AspectRatio, Density};
pub use solver::{solve, thumbnail_count, LayoutParams, MosaicLayout};

/// Hard ceiling on how many tiles a single mosaic may contain.
pub const MAX_THUMBNAILS: u32 = 100;

/// Videos shorter than this always get [`SHORT_VIDEO_THUMBNAILS`] tiles.
pub const SHORT_VIDEO_CUTOFF_SECS: f64 = 5.0;
pub const SHORT_VIDEO_THUMBNAILS: u32 = 4;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum Error {
	#[error("invalid mosaic configuration: {0}")]
	InvalidConfiguration(String),
}
