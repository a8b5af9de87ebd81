use std::path::{Path, PathBuf};

use vw_compositor::OutputFormat;

use crate::config::MosaicConfiguration;

/// Longest file name we'll emit before the artifact suffix is appended.
const MAX_STEM_LEN: usize = 200;

/// Output directory for a video's mosaic per the configured placement:
/// `<video_parent>/_Th<width>_<density>_<aspect>/` by default, rooted under
/// the library root when `save_at_root` is set.
#[must_use]
pub fn mosaic_directory(
	video_url: &Path,
	config: &MosaicConfiguration,
	library_root: Option<&Path>,
) -> PathBuf {
	let tag = directory_tag(config);

	let base = if config.output.save_at_root {
		library_root
			.map(Path::to_path_buf)
			.unwrap_or_else(|| parent_of(video_url))
	} else {
		parent_of(video_url)
	};

	if config.output.save_at_root && config.output.separate_folders {
		// Mirror the video's directory chain beneath the rooted artifact dir.
		if let Some(root) = library_root {
			if let Ok(relative) = parent_of(video_url).strip_prefix(root) {
				return base.join(tag).join(relative);
			}
		}
	}

	base.join(tag)
}

/// Full output path for a video's mosaic, including the artifact suffix.
/// `actual_format` is the format the encoder really produced (HEIF requests
/// may have degraded to JPEG).
#[must_use]
pub fn mosaic_path(
	video_url: &Path,
	config: &MosaicConfiguration,
	library_root: Option<&Path>,
	actual_format: OutputFormat,
) -> PathBuf {
	let suffix = artifact_suffix(config, actual_format);

	let stem = if config.output.add_full_path {
		let sanitized = sanitize_full_path(video_url);
		let keep = MAX_STEM_LEN.saturating_sub(suffix.len());
		tail(&sanitized, keep)
	} else {
		video_url
			.file_stem()
			.map(|stem| stem.to_string_lossy().into_owned())
			.unwrap_or_else(|| "mosaic".to_string())
	};

	mosaic_directory(video_url, config, library_root).join(format!("{stem}{suffix}"))
}

fn directory_tag(config: &MosaicConfiguration) -> String {
	format!(
		"_Th{}_{}_{}",
		config.width,
		config.density,
		config.layout.aspect_ratio.file_tag()
	)
}

fn artifact_suffix(config: &MosaicConfiguration, actual_format: OutputFormat) -> String {
	format!(
		"_{}_{}_{}.{}",
		config.width,
		config.density,
		config.layout.aspect_ratio.file_tag(),
		actual_format.extension()
	)
}

/// `/library/trips/alps clip.mp4` -> `_library_trips_alps_clip.mp4`.
fn sanitize_full_path(url: &Path) -> String {
	url.to_string_lossy()
		.chars()
		.map(|c| match c {
			'/' | '\\' | ' ' => '_',
			other => other,
		})
		.collect()
}

/// Keeps the last `keep` characters; the tail of a path is its most
/// specific part.
fn tail(value: &str, keep: usize) -> String {
	let count = value.chars().count();
	if count <= keep {
		return value.to_string();
	}
	value.chars().skip(count - keep).collect()
}

fn parent_of(url: &Path) -> PathBuf {
	url.parent()
		.map(Path::to_path_buf)
		.unwrap_or_else(|| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::MosaicConfiguration;

	fn config() -> MosaicConfiguration {
		MosaicConfiguration::default()
	}

	#[test]
	fn default_placement_sits_beside_the_video() {
		let path = mosaic_path(
			Path::new("/library/trips/alps.mp4"),
			&config(),
			None,
			OutputFormat::Jpeg,
		);

		assert_eq!(
			path,
			Path::new("/library/trips/_Th5120_m_16x9/alps_5120_m_16x9.jpg")
		);
	}

	#[test]
	fn save_at_root_moves_the_directory_under_the_library_root() {
		let mut config = config();
		config.output.save_at_root = true;
		config.output.separate_folders = false;

		let path = mosaic_path(
			Path::new("/library/trips/alps.mp4"),
			&config,
			Some(Path::new("/library")),
			OutputFormat::Jpeg,
		);

		assert_eq!(
			path,
			Path::new("/library/_Th5120_m_16x9/alps_5120_m_16x9.jpg")
		);
	}

	#[test]
	fn separate_folders_mirror_the_source_chain() {
		let mut config = config();
		config.output.save_at_root = true;
		config.output.separate_folders = true;

		let path = mosaic_path(
			Path::new("/library/2019/trips/alps.mp4"),
			&config,
			Some(Path::new("/library")),
			OutputFormat::Jpeg,
		);

		assert_eq!(
			path,
			Path::new("/library/_Th5120_m_16x9/2019/trips/alps_5120_m_16x9.jpg")
		);
	}

	#[test]
	fn full_path_names_are_sanitized_and_bounded() {
		let mut config = config();
		config.output.add_full_path = true;

		let long_dir = "d".repeat(300);
		let url = PathBuf::from(format!("/library/{long_dir}/alps clip.mp4"));
		let path = mosaic_path(&url, &config, None, OutputFormat::Jpeg);

		let name = path.file_name().unwrap().to_string_lossy().into_owned();
		assert!(!name.contains('/') && !name.contains(' '));
		assert!(name.ends_with("_5120_m_16x9.jpg"));
		assert!(name.chars().count() <= MAX_STEM_LEN);
		assert!(name.contains("alps_clip.mp4"));
	}

	#[test]
	fn artifact_extension_follows_the_actual_encoder() {
		let path = mosaic_path(
			Path::new("/library/alps.mp4"),
			&config(),
			None,
			OutputFormat::Png,
		);
		assert!(path.to_string_lossy().ends_with(".png"));
	}
}
