use std::{
	collections::{HashMap, HashSet},
	io,
	path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio_stream::{wrappers::ReadDirStream, StreamExt};
use tracing::{instrument, trace, warn};

use crate::video::Video;

#[derive(thiserror::Error, Debug)]
pub enum Error {
	#[error("not a directory: <path='{}'>", .0.display())]
	NotADirectory(PathBuf),
	#[error("access denied: <path='{}'>", .0.display())]
	AccessDenied(PathBuf),
	#[error("failed to enumerate <path='{}'>: {1}", .0.display())]
	EnumerationFailed(PathBuf, io::Error),
	#[error("metadata query failed for <path='{}'>: {1}", .0.display())]
	QueryFailed(PathBuf, io::Error),
}

/// The filename marker pairing a generated preview with its original.
pub const PREVIEW_SUFFIX: &str = "-preview";

/// Directory extensions treated as opaque packages and never descended into.
const PACKAGE_EXTENSIONS: [&str; 6] = [
	"app",
	"bundle",
	"framework",
	"fcpbundle",
	"imovielibrary",
	"photoslibrary",
];

/// The content-type families discovery accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ContentType {
	Mpeg4,
	QuickTime,
	Avi,
	Mpeg,
	Movie,
}

impl ContentType {
	#[must_use]
	pub fn from_extension(extension: &str) -> Option<Self> {
		match extension.to_ascii_lowercase().as_str() {
			"mp4" | "m4v" => Some(Self::Mpeg4),
			"mov" | "qt" => Some(Self::QuickTime),
			"avi" => Some(Self::Avi),
			"mpg" | "mpeg" | "mpe" | "m2v" => Some(Self::Mpeg),
			"mkv" | "webm" | "flv" | "wmv" | "3gp" | "ts" => Some(Self::Movie),
			_ => None,
		}
	}
}

/// Everything one enumeration pass found.
#[derive(Debug, Default)]
pub struct ScanOutcome {
	/// Original videos, in discovery order.
	pub videos: Vec<PathBuf>,
	/// `-preview` siblings keyed by the original they belong to. These are
	/// never returned as videos.
	pub preview_siblings: HashMap<PathBuf, PathBuf>,
	/// Files that matched no supported content type.
	pub skipped: u64,
}

/// Filesystem vs catalog drift under one root.
#[derive(Debug, Default)]
pub struct Reconciliation {
	/// On disk but absent from the catalog.
	pub missing: Vec<PathBuf>,
	/// In the catalog but gone from disk.
	pub orphaned: Vec<Video>,
}

/// Walks `root` and collects supported video files.
///
/// Hidden entries and package contents are skipped; duplicates are collapsed
/// by OS file identity where available, by absolute path otherwise. The
/// `progress` callback receives each directory as it is entered.
#[instrument(skip(progress), fields(root = %root.as_ref().display()))]
pub async fn scan(
	root: impl AsRef<Path>,
	recursive: bool,
	mut progress: impl FnMut(&Path) + Send,
) -> Result<ScanOutcome, Error> {
	let root = root.as_ref();

	let root_meta = fs::metadata(root)
		.await
		.map_err(|e| map_root_error(root, e))?;
	if !root_meta.is_dir() {
		return Err(Error::NotADirectory(root.to_path_buf()));
	}

	let mut outcome = ScanOutcome::default();
	let mut seen = HashSet::new();
	let mut previews = Vec::new();
	let mut pending = vec![root.to_path_buf()];

	while let Some(directory) = pending.pop() {
		progress(&directory);

		let read_dir = match fs::read_dir(&directory).await {
			Ok(read_dir) => read_dir,
			Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
				warn!(path = %directory.display(), "skipping unreadable directory");
				continue;
			}
			Err(e) => return Err(Error::EnumerationFailed(directory, e)),
		};

		let mut entries = ReadDirStream::new(read_dir);
		while let Some(entry) = entries.next().await {
			let entry = entry.map_err(|e| Error::EnumerationFailed(directory.clone(), e))?;
			let path = entry.path();

			if is_hidden(&path) {
				continue;
			}

			let file_type = entry
				.file_type()
				.await
				.map_err(|e| Error::QueryFailed(path.clone(), e))?;

			if file_type.is_dir() {
				if recursive && !is_package(&path) {
					pending.push(path);
				}
				continue;
			}

			let Some(extension) = path.extension().map(|ext| ext.to_string_lossy()) else {
				outcome.skipped += 1;
				continue;
			};
			if ContentType::from_extension(&extension).is_none() {
				outcome.skipped += 1;
				continue;
			}

			if !seen.insert(file_identity(&path).await) {
				trace!(path = %path.display(), "duplicate file identity");
				continue;
			}

			if is_preview_file(&path) {
				previews.push(path);
			} else {
				outcome.videos.push(path);
			}
		}
	}

	pair_preview_siblings(&mut outcome, previews);
	Ok(outcome)
}

/// Counts the videos `scan` would return, for progress denominators.
pub async fn count(root: impl AsRef<Path>, recursive: bool) -> Result<u64, Error> {
	scan(root, recursive, |_| {})
		.await
		.map(|outcome| outcome.videos.len() as u64)
}

/// Splits catalog state against the filesystem under `root_url`.
pub async fn compare(
	catalog_videos: &[Video],
	root_url: impl AsRef<Path>,
	recursive: bool,
) -> Result<Reconciliation, Error> {
	let root_url = root_url.as_ref();
	let on_disk = scan(root_url, recursive, |_| {})
		.await?
		.videos
		.into_iter()
		.collect::<HashSet<_>>();

	let under_root = catalog_videos
		.iter()
		.filter(|video| video.url.starts_with(root_url))
		.collect::<Vec<_>>();
	let known = under_root
		.iter()
		.map(|video| video.url.clone())
		.collect::<HashSet<_>>();

	Ok(Reconciliation {
		missing: on_disk
			.iter()
			.filter(|url| !known.contains(*url))
			.cloned()
			.collect(),
		orphaned: under_root
			.into_iter()
			.filter(|video| !on_disk.contains(&video.url))
			.cloned()
			.collect(),
	})
}

fn is_hidden(path: &Path) -> bool {
	path.file_name()
		.map(|name| name.to_string_lossy().starts_with('.'))
		.unwrap_or(false)
}

fn is_package(path: &Path) -> bool {
	path.extension()
		.map(|ext| {
			let ext = ext.to_ascii_lowercase();
			PACKAGE_EXTENSIONS
				.iter()
				.any(|package| ext.eq_ignore_ascii_case(package))
		})
		.unwrap_or(false)
}

fn is_preview_file(path: &Path) -> bool {
	path.file_stem()
		.map(|stem| stem.to_string_lossy().ends_with(PREVIEW_SUFFIX))
		.unwrap_or(false)
}

/// Stable identity for duplicate collapsing: device and inode where the OS
/// exposes them, the absolute path elsewhere.
async fn file_identity(path: &Path) -> (u64, u64, Option<PathBuf>) {
	#[cfg(unix)]
	{
		use std::os::unix::fs::MetadataExt;

		if let Ok(meta) = fs::metadata(path).await {
			return (meta.dev(), meta.ino(), None);
		}
	}

	(0, 0, Some(path.to_path_buf()))
}

fn pair_preview_siblings(outcome: &mut ScanOutcome, previews: Vec<PathBuf>) {
	if previews.is_empty() {
		return;
	}

	let by_stem = outcome
		.videos
		.iter()
		.filter_map(|video| {
			video
				.file_stem()
				.map(|stem| ((video.parent().map(Path::to_path_buf), stem.to_os_string()), video.clone()))
		})
		.collect::<HashMap<_, _>>();

	for preview in previews {
		let Some(stem) = preview.file_stem().map(|stem| stem.to_string_lossy().into_owned()) else {
			continue;
		};
		let original_stem = stem.trim_end_matches(PREVIEW_SUFFIX);
		let key = (
			preview.parent().map(Path::to_path_buf),
			std::ffi::OsString::from(original_stem),
		);

		if let Some(original) = by_stem.get(&key) {
			outcome.preview_siblings.insert(original.clone(), preview);
		} else {
			trace!(path = %preview.display(), "preview without a sibling original");
		}
	}
}

fn map_root_error(root: &Path, e: io::Error) -> Error {
	match e.kind() {
		io::ErrorKind::PermissionDenied => Error::AccessDenied(root.to_path_buf()),
		io::ErrorKind::NotFound => Error::NotADirectory(root.to_path_buf()),
		_ => Error::QueryFailed(root.to_path_buf(), e),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn extension_families_cover_the_supported_set() {
		assert_eq!(ContentType::from_extension("MP4"), Some(ContentType::Mpeg4));
		assert_eq!(ContentType::from_extension("mov"), Some(ContentType::QuickTime));
		assert_eq!(ContentType::from_extension("avi"), Some(ContentType::Avi));
		assert_eq!(ContentType::from_extension("mpeg"), Some(ContentType::Mpeg));
		assert_eq!(ContentType::from_extension("mkv"), Some(ContentType::Movie));
		assert_eq!(ContentType::from_extension("txt"), None);
	}

	#[test]
	fn preview_marker_is_detected_on_the_stem() {
		assert!(is_preview_file(Path::new("/r/trip-preview.mp4")));
		assert!(!is_preview_file(Path::new("/r/trip.mp4")));
		assert!(!is_preview_file(Path::new("/r/preview-of-trip.mp4")));
	}

	#[test]
	fn packages_and_hidden_files_are_recognized() {
		assert!(is_package(Path::new("/Applications/Foo.app")));
		assert!(is_package(Path::new("/lib/Events.fcpbundle")));
		assert!(!is_package(Path::new("/r/videos")));
		assert!(is_hidden(Path::new("/r/.DS_Store")));
		assert!(!is_hidden(Path::new("/r/clip.mp4")));
	}
}
