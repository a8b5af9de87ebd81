use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use vw_compositor::{OutputFormat, VisualSettings};
use vw_layout::{AspectRatio, Density};

/// Where generated artifacts that don't live beside their source go.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppPaths {
	pub app_support: PathBuf,
	pub app_cache: PathBuf,
}

impl AppPaths {
	#[must_use]
	pub fn new(app_support: impl Into<PathBuf>, app_cache: impl Into<PathBuf>) -> Self {
		Self {
			app_support: app_support.into(),
			app_cache: app_cache.into(),
		}
	}

	#[must_use]
	pub fn thumbnails_dir(&self) -> PathBuf {
		self.app_support.join("Thumbnails")
	}

	#[must_use]
	pub fn previews_dir(&self) -> PathBuf {
		self.app_cache.join("Previews")
	}
}

/// Canvas geometry options for the mosaic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutOptions {
	pub aspect_ratio: AspectRatio,
	pub spacing: u32,
	pub auto_layout: bool,
	pub custom_layout: bool,
	pub visual: VisualSettings,
}

impl Default for LayoutOptions {
	fn default() -> Self {
		Self {
			aspect_ratio: AspectRatio::Widescreen,
			spacing: 4,
			auto_layout: true,
			custom_layout: false,
			visual: VisualSettings::default(),
		}
	}
}

/// Where and how mosaic artifacts are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputOptions {
	pub overwrite: bool,
	/// Root the artifact directory under the library root instead of the
	/// video's parent directory.
	pub save_at_root: bool,
	/// Mirror the video's directory chain under the artifact root.
	pub separate_folders: bool,
	/// Name artifacts after the sanitized full source path.
	pub add_full_path: bool,
}

impl Default for OutputOptions {
	fn default() -> Self {
		Self {
			overwrite: false,
			save_at_root: false,
			separate_folders: true,
			add_full_path: false,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MosaicConfiguration {
	pub width: u32,
	pub density: Density,
	pub format: OutputFormat,
	pub layout: LayoutOptions,
	pub include_metadata: bool,
	pub use_accurate_timestamps: bool,
	/// 0.0 (smallest) ..= 1.0 (best).
	pub compression_quality: f32,
	pub output: OutputOptions,
}

impl Default for MosaicConfiguration {
	fn default() -> Self {
		Self {
			width: 5120,
			density: Density::M,
			format: OutputFormat::Heif,
			layout: LayoutOptions::default(),
			include_metadata: true,
			use_accurate_timestamps: true,
			compression_quality: 0.4,
			output: OutputOptions::default(),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviewConfiguration {
	/// Target length of the generated preview, seconds.
	pub duration: f64,
	pub density: Density,
	pub save_in_custom_location: bool,
	pub custom_save_location: Option<PathBuf>,
	pub max_speed_multiplier: f64,
}

impl Default for PreviewConfiguration {
	fn default() -> Self {
		Self {
			duration: 30.0,
			density: Density::Xs,
			save_in_custom_location: false,
			custom_save_location: None,
			max_speed_multiplier: 1.5,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingConfiguration {
	/// Cap on the longer edge of frames pulled for cover thumbnails.
	pub thumbnail_width: u32,
	pub format: OutputFormat,
	pub compression_quality: f32,
	pub use_accurate_timestamps: bool,
}

impl Default for ProcessingConfiguration {
	fn default() -> Self {
		Self {
			thumbnail_width: 1920,
			format: OutputFormat::Heif,
			compression_quality: 0.8,
			use_accurate_timestamps: true,
		}
	}
}

/// Knobs for a discovery run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryOptions {
	pub recursive: bool,
	concurrent_operations: usize,
	/// Reprocess videos already present in the catalog and reconcile
	/// orphaned rows afterwards.
	pub is_update: bool,
	pub generate_thumbnails: bool,
}

impl DiscoveryOptions {
	pub const MIN_CONCURRENT_OPERATIONS: usize = 1;
	pub const MAX_CONCURRENT_OPERATIONS: usize = 12;

	#[must_use]
	pub fn new(recursive: bool, concurrent_operations: usize) -> Self {
		Self {
			recursive,
			concurrent_operations: concurrent_operations.clamp(
				Self::MIN_CONCURRENT_OPERATIONS,
				Self::MAX_CONCURRENT_OPERATIONS,
			),
			is_update: false,
			generate_thumbnails: false,
		}
	}

	#[must_use]
	pub const fn with_update(mut self, is_update: bool) -> Self {
		self.is_update = is_update;
		self
	}

	#[must_use]
	pub const fn with_thumbnails(mut self, generate_thumbnails: bool) -> Self {
		self.generate_thumbnails = generate_thumbnails;
		self
	}

	#[must_use]
	pub const fn concurrent_operations(&self) -> usize {
		self.concurrent_operations
	}
}

impl Default for DiscoveryOptions {
	fn default() -> Self {
		Self::new(true, 8)
	}
}

/// Factory defaults, in one place so callers can diff against them.
pub struct Defaults;

impl Defaults {
	#[must_use]
	pub fn mosaic() -> MosaicConfiguration {
		MosaicConfiguration::default()
	}

	#[must_use]
	pub fn preview() -> PreviewConfiguration {
		PreviewConfiguration::default()
	}

	#[must_use]
	pub fn processing() -> ProcessingConfiguration {
		ProcessingConfiguration::default()
	}

	#[must_use]
	pub fn discovery() -> DiscoveryOptions {
		DiscoveryOptions::default()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn mosaic_defaults_match_the_factory_settings() {
		let config = Defaults::mosaic();
		assert_eq!(config.width, 5120);
		assert_eq!(config.density, Density::M);
		assert_eq!(config.format, OutputFormat::Heif);
		assert!((config.compression_quality - 0.4).abs() < f32::EPSILON);
		assert_eq!(config.layout.aspect_ratio, AspectRatio::Widescreen);
		assert_eq!(config.layout.spacing, 4);
		assert!(config.include_metadata && config.use_accurate_timestamps);
	}

	#[test]
	fn preview_defaults_match_the_factory_settings() {
		let config = Defaults::preview();
		assert!((config.duration - 30.0).abs() < f64::EPSILON);
		assert_eq!(config.density, Density::Xs);
		assert!((config.max_speed_multiplier - 1.5).abs() < f64::EPSILON);
	}

	#[test]
	fn concurrency_is_clamped_on_construction() {
		assert_eq!(DiscoveryOptions::new(true, 0).concurrent_operations(), 1);
		assert_eq!(DiscoveryOptions::new(true, 99).concurrent_operations(), 12);
		assert_eq!(DiscoveryOptions::new(true, 8).concurrent_operations(), 8);
	}
}
