use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub mod engine;
pub mod naming;

pub use engine::{detect_engine, MosaicEngine, SoftwareMosaicEngine};
pub use naming::{mosaic_directory, mosaic_path};

/// Staged progress breakpoints a generation reports as it moves through the
/// pipeline.
pub const PROGRESS_QUEUED: f64 = 0.1;
pub const PROGRESS_FRAMES: f64 = 0.5;
pub const PROGRESS_COMPOSED: f64 = 0.8;
pub const PROGRESS_WRITTEN: f64 = 1.0;

#[derive(thiserror::Error, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Error {
	#[error("mosaic generation failed <url='{}'>: {cause}", .url.display())]
	GenerationFailed { url: PathBuf, cause: String },
	#[error("mosaic image generation failed <url='{}'>: {cause}", .url.display())]
	ImageGenerationFailed { url: PathBuf, cause: String },
	#[error("failed to save mosaic <path='{}'>: {cause}", .path.display())]
	SaveFailed { path: PathBuf, cause: String },
	#[error("mosaic already exists <path='{}'>", .path.display())]
	FileExists { path: PathBuf },
	#[error("mosaic generation was cancelled")]
	Cancelled,
}

/// Per-video generation lifecycle. Terminal states are sticky: once a video
/// lands in one, later transitions for the same generation are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationState {
	Queued,
	InProgress,
	Completed,
	Failed,
	Cancelled,
}

impl GenerationState {
	#[must_use]
	pub const fn is_terminal(self) -> bool {
		matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn terminal_states_are_flagged() {
		assert!(!GenerationState::Queued.is_terminal());
		assert!(!GenerationState::InProgress.is_terminal());
		assert!(GenerationState::Completed.is_terminal());
		assert!(GenerationState::Failed.is_terminal());
		assert!(GenerationState::Cancelled.is_terminal());
	}
}
