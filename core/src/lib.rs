#![warn(
	clippy::all,
	clippy::pedantic,
	clippy::correctness,
	clippy::perf,
	clippy::style,
	clippy::suspicious,
	clippy::complexity,
	clippy::nursery,
	clippy::unwrap_used,
	unused_qualifications,
	rust_2018_idioms,
	trivial_casts,
	trivial_numeric_casts,
	unused_allocation,
	clippy::unnecessary_cast,
	clippy::cast_lossless,
	clippy::cast_possible_truncation,
	clippy::cast_possible_wrap,
	clippy::cast_precision_loss,
	clippy::cast_sign_loss,
	clippy::dbg_macro,
	deprecated
)]
#![allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]

//! The library engine: discovery, per-video processing, artifact generation
//! and batch coordination over an opaque catalog.

use serde::{Deserialize, Serialize};

pub mod catalog;
pub mod config;
pub mod coordinator;
pub mod library;
pub mod mosaic;
pub mod preview;
pub mod processor;
pub mod scanner;
pub mod video;

pub use catalog::{Catalog, MemoryCatalog};
pub use config::{
	AppPaths, Defaults, DiscoveryOptions, MosaicConfiguration, PreviewConfiguration,
	ProcessingConfiguration,
};
pub use coordinator::{Coordinator, DiscoveryListener, DiscoveryResult, ProgressEvent};
pub use library::{LibraryItem, LibraryTree, SmartCriteria};
pub use video::{ThumbnailStatus, Video};

#[derive(thiserror::Error, Debug)]
pub enum Error {
	#[error(transparent)]
	Catalog(#[from] catalog::Error),
	#[error(transparent)]
	Library(#[from] library::Error),
	#[error(transparent)]
	Scanner(#[from] scanner::Error),
	#[error(transparent)]
	Processor(#[from] processor::Error),
	#[error(transparent)]
	Mosaic(#[from] mosaic::Error),
	#[error(transparent)]
	Preview(#[from] preview::Error),
	#[error(transparent)]
	Discovery(#[from] coordinator::Error),
	#[error(transparent)]
	Layout(#[from] vw_layout::Error),
	#[error(transparent)]
	Media(#[from] vw_media::Error),
}

/// Failures that are recorded and reported but never abort a batch.
#[derive(thiserror::Error, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NonCriticalError {
	#[error(transparent)]
	Processor(#[from] processor::Error),
}
