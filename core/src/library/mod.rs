use std::{
	collections::BTreeSet,
	path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod smart;

pub use smart::{SmartCriteria, SmartFolderDelta, SmartFolderEvaluator};

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum Error {
	#[error("operation not supported for {0} items")]
	OperationNotSupported(ItemKind),
	#[error("library node not found: <id='{0}'>")]
	NotFound(Uuid),
	#[error("library conflict: {0}")]
	Conflict(String),
}

#[derive(
	Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, Default,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ItemKind {
	#[default]
	Folder,
	SmartFolder,
	Playlist,
}

/// A node of the folder hierarchy. Plain folders mirror the filesystem and
/// carry a URL; smart folders carry criteria and a cached match set instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibraryItem {
	pub id: Uuid,
	pub name: String,
	pub kind: ItemKind,
	pub url: Option<PathBuf>,
	pub smart_criteria: Option<SmartCriteria>,
	/// Ids of matched videos; only populated for smart folders on refresh.
	pub videos: BTreeSet<Uuid>,
	pub date_created: DateTime<Utc>,
	pub date_modified: DateTime<Utc>,
	pub last_refresh: Option<DateTime<Utc>>,
}

impl LibraryItem {
	#[must_use]
	pub fn folder(name: impl Into<String>, url: impl Into<PathBuf>) -> Self {
		Self::new(name, ItemKind::Folder, Some(url.into()), None)
	}

	#[must_use]
	pub fn smart_folder(name: impl Into<String>, criteria: SmartCriteria) -> Self {
		Self::new(name, ItemKind::SmartFolder, None, Some(criteria))
	}

	#[must_use]
	pub fn playlist(name: impl Into<String>) -> Self {
		Self::new(name, ItemKind::Playlist, None, None)
	}

	fn new(
		name: impl Into<String>,
		kind: ItemKind,
		url: Option<PathBuf>,
		smart_criteria: Option<SmartCriteria>,
	) -> Self {
		let now = Utc::now();
		Self {
			id: Uuid::new_v4(),
			name: name.into(),
			kind,
			url,
			smart_criteria,
			videos: BTreeSet::new(),
			date_created: now,
			date_modified: now,
			last_refresh: None,
		}
	}
}

/// Handle to a node inside a [`LibraryTree`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(usize);

#[derive(Debug, Serialize, Deserialize)]
struct Node {
	item: LibraryItem,
	parent: Option<NodeId>,
	children: Vec<NodeId>,
}

/// Arena-backed folder hierarchy. Parent/child links are indices into the
/// arena; the API keeps them consistent and refuses cycles.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct LibraryTree {
	nodes: Vec<Node>,
	roots: Vec<NodeId>,
}

impl LibraryTree {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	pub fn insert_root(&mut self, item: LibraryItem) -> Result<NodeId, Error> {
		validate_item(&item)?;
		let id = NodeId(self.nodes.len());
		self.nodes.push(Node {
			item,
			parent: None,
			children: Vec::new(),
		});
		self.roots.push(id);
		Ok(id)
	}

	pub fn insert_child(&mut self, parent: NodeId, item: LibraryItem) -> Result<NodeId, Error> {
		validate_item(&item)?;
		self.node(parent)?;

		let id = NodeId(self.nodes.len());
		self.nodes.push(Node {
			item,
			parent: Some(parent),
			children: Vec::new(),
		});
		self.nodes[parent.0].children.push(id);
		self.nodes[parent.0].item.date_modified = Utc::now();
		Ok(id)
	}

	pub fn item(&self, id: NodeId) -> Result<&LibraryItem, Error> {
		self.node(id).map(|node| &node.item)
	}

	pub fn item_mut(&mut self, id: NodeId) -> Result<&mut LibraryItem, Error> {
		let _ = self.node(id)?;
		Ok(&mut self.nodes[id.0].item)
	}

	pub fn parent(&self, id: NodeId) -> Result<Option<NodeId>, Error> {
		self.node(id).map(|node| node.parent)
	}

	/// Children in insertion order.
	pub fn children(&self, id: NodeId) -> Result<&[NodeId], Error> {
		self.node(id).map(|node| node.children.as_slice())
	}

	#[must_use]
	pub fn roots(&self) -> &[NodeId] {
		&self.roots
	}

	pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
		(0..self.nodes.len()).map(NodeId)
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.nodes.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.nodes.is_empty()
	}

	pub fn rename(&mut self, id: NodeId, name: impl Into<String>) -> Result<(), Error> {
		let item = self.item_mut(id)?;
		item.name = name.into();
		item.date_modified = Utc::now();
		Ok(())
	}

	/// Moves `id` under `new_parent`, refusing moves that would create a
	/// cycle.
	pub fn reparent(&mut self, id: NodeId, new_parent: NodeId) -> Result<(), Error> {
		self.node(id)?;
		self.node(new_parent)?;

		if id == new_parent || self.is_ancestor(id, new_parent)? {
			return Err(Error::Conflict(format!(
				"moving '{}' under its own subtree",
				self.nodes[id.0].item.name
			)));
		}

		match self.nodes[id.0].parent {
			Some(old_parent) => {
				self.nodes[old_parent.0].children.retain(|child| *child != id);
			}
			None => self.roots.retain(|root| *root != id),
		}

		self.nodes[id.0].parent = Some(new_parent);
		self.nodes[new_parent.0].children.push(id);
		self.nodes[id.0].item.date_modified = Utc::now();
		Ok(())
	}

	/// Finds the node holding `url`, if any.
	#[must_use]
	pub fn find_by_url(&self, url: &Path) -> Option<NodeId> {
		self.nodes
			.iter()
			.position(|node| node.item.url.as_deref() == Some(url))
			.map(NodeId)
	}

	/// Ensures a folder node exists for every directory between `root` and
	/// `directory` inclusive, creating missing links. Returns the node for
	/// `directory` plus how many nodes were created.
	pub fn ensure_folder_chain(
		&mut self,
		root: &Path,
		directory: &Path,
	) -> Result<(NodeId, u64), Error> {
		if !directory.starts_with(root) {
			return Err(Error::Conflict(format!(
				"'{}' is not under the library root '{}'",
				directory.display(),
				root.display()
			)));
		}

		let mut created = 0;
		let mut current = match self.find_by_url(root) {
			Some(id) => id,
			None => {
				created += 1;
				self.insert_root(LibraryItem::folder(
					crate::video::title_from_url(root),
					root,
				))?
			}
		};

		let relative = directory
			.strip_prefix(root)
			.map_err(|_| Error::Conflict("path escaped the library root".into()))?;

		let mut url = root.to_path_buf();
		for component in relative.components() {
			url.push(component);
			current = match self.find_by_url(&url) {
				Some(id) => id,
				None => {
					created += 1;
					let name = component.as_os_str().to_string_lossy().into_owned();
					self.insert_child(current, LibraryItem::folder(name, &url))?
				}
			};
		}

		Ok((current, created))
	}

	fn node(&self, id: NodeId) -> Result<&Node, Error> {
		self.nodes
			.get(id.0)
			.ok_or_else(|| Error::NotFound(Uuid::nil()))
	}

	fn is_ancestor(&self, candidate: NodeId, of: NodeId) -> Result<bool, Error> {
		let mut cursor = self.node(of)?.parent;
		while let Some(parent) = cursor {
			if parent == candidate {
				return Ok(true);
			}
			cursor = self.node(parent)?.parent;
		}
		Ok(false)
	}
}

fn validate_item(item: &LibraryItem) -> Result<(), Error> {
	match item.kind {
		ItemKind::SmartFolder => {
			if item.smart_criteria.is_none() {
				return Err(Error::Conflict(
					"smart folders require criteria".to_string(),
				));
			}
			if item.url.is_some() {
				return Err(Error::OperationNotSupported(ItemKind::SmartFolder));
			}
		}
		ItemKind::Folder | ItemKind::Playlist => {
			if item.smart_criteria.is_some() || !item.videos.is_empty() {
				return Err(Error::OperationNotSupported(item.kind));
			}
		}
	}
	Ok(())
}
