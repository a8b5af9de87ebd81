use std::{
	io,
	path::{Path, PathBuf},
};

use tokio::{fs, io::AsyncWriteExt};
use tracing::warn;
use uuid::Uuid;

use crate::error::FileIOError;

/// A pending atomic write: bytes go to a uniquely named temporary file in the
/// destination's directory, then a `commit` fsyncs and renames it into place.
/// Dropping an uncommitted `AtomicFile` removes the temporary file, so
/// cancelled writers never leave partial artifacts behind.
#[derive(Debug)]
pub struct AtomicFile {
	destination: PathBuf,
	temp_path: PathBuf,
	committed: bool,
}

impl AtomicFile {
	pub async fn write(
		destination: impl AsRef<Path>,
		contents: &[u8],
	) -> Result<Self, FileIOError> {
		let destination = destination.as_ref().to_path_buf();

		let parent = destination
			.parent()
			.ok_or_else(|| {
				FileIOError::from((
					&destination,
					io::Error::new(io::ErrorKind::InvalidInput, "destination has no parent"),
				))
			})?
			.to_path_buf();

		fs::create_dir_all(&parent)
			.await
			.map_err(|e| FileIOError::from((&parent, e, "failed to create output directory")))?;

		let temp_path = parent.join(format!(
			".{}.{}.tmp",
			destination
				.file_name()
				.map(|name| name.to_string_lossy().into_owned())
				.unwrap_or_default(),
			Uuid::new_v4().simple()
		));

		let mut file = fs::File::create(&temp_path)
			.await
			.map_err(|e| FileIOError::from((&temp_path, e, "failed to create temporary file")))?;

		if let Err(e) = file.write_all(contents).await {
			let this = Self {
				destination,
				temp_path,
				committed: false,
			};
			drop(file);
			this.discard().await;
			return Err(FileIOError::from((
				&this.temp_path,
				e,
				"failed to write temporary file",
			)));
		}

		if let Err(e) = file.sync_all().await {
			warn!(path = %temp_path.display(), ?e, "fsync failed before rename");
		}

		Ok(Self {
			destination,
			temp_path,
			committed: false,
		})
	}

	/// Renames the temporary file over the destination.
	pub async fn commit(mut self) -> Result<PathBuf, FileIOError> {
		fs::rename(&self.temp_path, &self.destination)
			.await
			.map_err(|e| {
				FileIOError::from((&self.temp_path, e, "failed to rename temporary file"))
			})?;

		self.committed = true;
		Ok(std::mem::take(&mut self.destination))
	}

	/// Removes the temporary file without touching the destination.
	pub async fn discard(&self) {
		if let Err(e) = fs::remove_file(&self.temp_path).await {
			if e.kind() != io::ErrorKind::NotFound {
				warn!(path = %self.temp_path.display(), ?e, "failed to remove temporary file");
			}
		}
	}
}

impl Drop for AtomicFile {
	fn drop(&mut self) {
		if !self.committed {
			// Best effort cleanup if the writer was dropped mid-flight
			let _ = std::fs::remove_file(&self.temp_path);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn commit_moves_contents_into_place() {
		let dir = tempfile::tempdir().unwrap();
		let destination = dir.path().join("nested").join("artifact.bin");

		let pending = AtomicFile::write(&destination, b"payload").await.unwrap();
		assert!(!destination.exists());

		let written = pending.commit().await.unwrap();
		assert_eq!(written, destination);
		assert_eq!(fs::read(&destination).await.unwrap(), b"payload");
	}

	#[tokio::test]
	async fn drop_without_commit_leaves_nothing() {
		let dir = tempfile::tempdir().unwrap();
		let destination = dir.path().join("artifact.bin");

		let pending = AtomicFile::write(&destination, b"payload").await.unwrap();
		drop(pending);

		let mut entries = fs::read_dir(dir.path()).await.unwrap();
		assert!(entries.next_entry().await.unwrap().is_none());
	}
}
