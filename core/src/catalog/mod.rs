use std::{
	fmt,
	path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
	library::{ItemKind, SmartCriteria},
	video::Video,
};

mod memory;

pub use memory::MemoryCatalog;

#[derive(thiserror::Error, Debug)]
pub enum Error {
	#[error("catalog backend error: {0}")]
	Backend(String),
	#[error("catalog serialization error: {0}")]
	Serialization(#[from] serde_json::Error),
}

/// Flattened folder-tree node as the persistence engine stores it. The
/// runtime arena is rebuilt from these on load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FolderRecord {
	pub id: Uuid,
	pub name: String,
	pub kind: ItemKind,
	pub url: Option<PathBuf>,
	pub parent_url: Option<PathBuf>,
	pub smart_criteria: Option<SmartCriteria>,
	pub date_created: DateTime<Utc>,
	pub date_modified: DateTime<Utc>,
}

impl FolderRecord {
	#[must_use]
	pub fn folder(name: impl Into<String>, url: impl Into<PathBuf>, parent_url: Option<PathBuf>) -> Self {
		let now = Utc::now();
		Self {
			id: Uuid::new_v4(),
			name: name.into(),
			kind: ItemKind::Folder,
			url: Some(url.into()),
			parent_url,
			smart_criteria: None,
			date_created: now,
			date_modified: now,
		}
	}
}

/// Thin contract over the persistence engine. Implementations must allow
/// concurrent readers against a single writer; all engine writes funnel
/// through the coordinator and the per-video processor.
#[async_trait::async_trait]
pub trait Catalog: Send + Sync + fmt::Debug {
	async fn upsert_video(&self, video: Video) -> Result<(), Error>;

	/// Batch upsert; the coordinator calls this once per processed batch.
	async fn upsert_videos(&self, videos: Vec<Video>) -> Result<(), Error>;

	async fn fetch_video(&self, url: &Path) -> Result<Option<Video>, Error>;

	async fn fetch_video_by_id(&self, id: Uuid) -> Result<Option<Video>, Error>;

	/// All videos matching `criteria`; unsorted.
	async fn fetch_videos(&self, criteria: &SmartCriteria) -> Result<Vec<Video>, Error>;

	async fn delete_video_by_url(&self, url: &Path) -> Result<bool, Error>;

	async fn delete_video_by_id(&self, id: Uuid) -> Result<bool, Error>;

	async fn upsert_folder(&self, folder: FolderRecord) -> Result<(), Error>;

	async fn fetch_folder(&self, url: &Path, kind: ItemKind)
		-> Result<Option<FolderRecord>, Error>;

	/// Removes every video and folder whose URL starts with `prefix`.
	/// Returns how many rows went away.
	async fn delete_by_url_prefix(&self, prefix: &Path) -> Result<u64, Error>;
}
