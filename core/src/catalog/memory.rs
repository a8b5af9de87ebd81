use std::{
	collections::HashMap,
	path::{Path, PathBuf},
};

use tokio::sync::RwLock;
use tracing::trace;
use uuid::Uuid;

use crate::{
	library::{ItemKind, SmartCriteria},
	video::Video,
};

use super::{Catalog, Error, FolderRecord};

#[derive(Debug, Default)]
struct State {
	videos: HashMap<PathBuf, Video>,
	folders: HashMap<PathBuf, FolderRecord>,
	smart_folders: HashMap<Uuid, FolderRecord>,
}

/// Reference catalog: everything in memory behind a single `RwLock`, which
/// gives the concurrent-readers/single-writer discipline the contract asks
/// for. Tests and small libraries run on this directly.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
	state: RwLock<State>,
}

impl MemoryCatalog {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	pub async fn video_count(&self) -> usize {
		self.state.read().await.videos.len()
	}

	pub async fn folder_count(&self) -> usize {
		self.state.read().await.folders.len()
	}
}

#[async_trait::async_trait]
impl Catalog for MemoryCatalog {
	async fn upsert_video(&self, video: Video) -> Result<(), Error> {
		self.state
			.write()
			.await
			.videos
			.insert(video.url.clone(), video);
		Ok(())
	}

	async fn upsert_videos(&self, videos: Vec<Video>) -> Result<(), Error> {
		let mut state = self.state.write().await;
		trace!(count = videos.len(), "saving video batch");
		for video in videos {
			state.videos.insert(video.url.clone(), video);
		}
		Ok(())
	}

	async fn fetch_video(&self, url: &Path) -> Result<Option<Video>, Error> {
		Ok(self.state.read().await.videos.get(url).cloned())
	}

	async fn fetch_video_by_id(&self, id: Uuid) -> Result<Option<Video>, Error> {
		Ok(self
			.state
			.read()
			.await
			.videos
			.values()
			.find(|video| video.id == id)
			.cloned())
	}

	async fn fetch_videos(&self, criteria: &SmartCriteria) -> Result<Vec<Video>, Error> {
		Ok(self
			.state
			.read()
			.await
			.videos
			.values()
			.filter(|video| criteria.matches(video))
			.cloned()
			.collect())
	}

	async fn delete_video_by_url(&self, url: &Path) -> Result<bool, Error> {
		Ok(self.state.write().await.videos.remove(url).is_some())
	}

	async fn delete_video_by_id(&self, id: Uuid) -> Result<bool, Error> {
		let mut state = self.state.write().await;
		let url = state
			.videos
			.values()
			.find(|video| video.id == id)
			.map(|video| video.url.clone());

		Ok(match url {
			Some(url) => state.videos.remove(&url).is_some(),
			None => false,
		})
	}

	async fn upsert_folder(&self, folder: FolderRecord) -> Result<(), Error> {
		let mut state = self.state.write().await;
		match &folder.url {
			Some(url) => {
				state.folders.insert(url.clone(), folder);
			}
			None => {
				state.smart_folders.insert(folder.id, folder);
			}
		}
		Ok(())
	}

	async fn fetch_folder(
		&self,
		url: &Path,
		kind: ItemKind,
	) -> Result<Option<FolderRecord>, Error> {
		Ok(self
			.state
			.read()
			.await
			.folders
			.get(url)
			.filter(|folder| folder.kind == kind)
			.cloned())
	}

	async fn delete_by_url_prefix(&self, prefix: &Path) -> Result<u64, Error> {
		let mut state = self.state.write().await;

		let before = state.videos.len() + state.folders.len();
		state.videos.retain(|url, _| !url.starts_with(prefix));
		state.folders.retain(|url, _| !url.starts_with(prefix));
		let after = state.videos.len() + state.folders.len();

		Ok((before - after) as u64)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn upsert_replaces_by_url() {
		let catalog = MemoryCatalog::new();
		let mut video = Video::new("/library/clip.mp4");
		catalog.upsert_video(video.clone()).await.unwrap();

		video.duration = 42.0;
		catalog.upsert_video(video.clone()).await.unwrap();

		assert_eq!(catalog.video_count().await, 1);
		let fetched = catalog
			.fetch_video(Path::new("/library/clip.mp4"))
			.await
			.unwrap()
			.unwrap();
		assert!((fetched.duration - 42.0).abs() < f64::EPSILON);
		assert_eq!(fetched.id, video.id);
	}

	#[tokio::test]
	async fn prefix_delete_cascades() {
		let catalog = MemoryCatalog::new();
		for url in ["/r/a/1.mp4", "/r/a/2.mp4", "/r/b/3.mp4", "/other/4.mp4"] {
			catalog.upsert_video(Video::new(url)).await.unwrap();
		}
		catalog
			.upsert_folder(FolderRecord::folder("a", "/r/a", Some("/r".into())))
			.await
			.unwrap();

		let removed = catalog.delete_by_url_prefix(Path::new("/r/a")).await.unwrap();
		assert_eq!(removed, 3);
		assert_eq!(catalog.video_count().await, 2);
		assert!(catalog
			.fetch_video(Path::new("/other/4.mp4"))
			.await
			.unwrap()
			.is_some());
	}

	#[tokio::test]
	async fn fetch_videos_applies_criteria() {
		let catalog = MemoryCatalog::new();
		let mut big = Video::new("/r/big.mp4");
		big.file_size = Some(2 << 30);
		let mut small = Video::new("/r/small.mp4");
		small.file_size = Some(1024);

		catalog.upsert_videos(vec![big, small]).await.unwrap();

		let criteria = SmartCriteria {
			min_size: Some(1 << 30),
			..SmartCriteria::default()
		};
		let matched = catalog.fetch_videos(&criteria).await.unwrap();
		assert_eq!(matched.len(), 1);
		assert_eq!(matched[0].url, Path::new("/r/big.mp4"));
	}
}
