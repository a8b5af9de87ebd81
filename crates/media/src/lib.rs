//! Frame-extraction and metadata-probe primitives over an external
//! `ffmpeg`/`ffprobe` pair. The decode itself is delegated to the external
//! tool; this crate owns seeking policy, scaling, bounded concurrency and
//! cancellation.

use std::path::PathBuf;

use vw_utils::FileIOError;

mod extractor;
mod frame;
mod probe;
mod source;
mod timestamps;

pub use extractor::{FrameExtractor, DEFAULT_CONCURRENT_EXTRACTIONS};
pub use frame::Frame;
pub use probe::{FfprobeProber, MediaInfo, MetadataProber};
pub use source::{
	FfmpegSourceFactory, FrameSource, FrameSourceFactory, SeekMode, TolerancePolicy,
};
pub use timestamps::mosaic_timestamps;

#[derive(thiserror::Error, Debug)]
pub enum Error {
	#[error("required tool '{0}' was not found on this system")]
	ToolNotFound(&'static str),
	#[error(transparent)]
	FileIO(#[from] FileIOError),
	#[error("'{tool}' exited with {status} for <path='{}'>: {stderr}", .path.display())]
	ProcessFailed {
		tool: &'static str,
		status: std::process::ExitStatus,
		path: PathBuf,
		stderr: String,
	},
	#[error("failed to decode extracted frame from <path='{}'>: {1}", .0.display())]
	FrameDecode(PathBuf, String),
	#[error("failed to parse probe output for <path='{}'>: {1}", .0.display())]
	ProbeParse(PathBuf, serde_json::Error),
	#[error("no video track found in <path='{}'>", .0.display())]
	NoVideoTrack(PathBuf),
	#[error("extraction was cancelled")]
	Cancelled,
}
