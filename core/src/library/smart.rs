use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use globset::{Glob, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{instrument, warn};

use crate::{catalog, video::Video, Catalog};

/// Predicate a smart folder matches videos with. A video matches iff every
/// *present* field is satisfied; the empty criteria matches everything.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SmartCriteria {
	/// Case-insensitive substrings; ANY of them matching the title passes.
	pub name_filters: Option<Vec<String>>,
	pub start_date: Option<DateTime<Utc>>,
	pub end_date: Option<DateTime<Utc>>,
	/// Seconds.
	pub min_duration: Option<f64>,
	pub max_duration: Option<f64>,
	/// Bytes.
	pub min_size: Option<u64>,
	pub max_size: Option<u64>,
	/// Case-insensitive substrings matched against title and custom
	/// metadata values; ANY match passes.
	pub keywords: Option<Vec<String>>,
	/// Glob patterns matched against the absolute URL; ANY match passes.
	pub path_patterns: Option<Vec<String>>,
}

impl SmartCriteria {
	#[must_use]
	pub fn is_empty(&self) -> bool {
		*self == Self::default()
	}

	#[must_use]
	pub fn has_date_range(&self) -> bool {
		self.start_date.is_some() || self.end_date.is_some()
	}

	#[must_use]
	pub fn matches(&self, video: &Video) -> bool {
		if let Some(filters) = &self.name_filters {
			let title = video.title.to_lowercase();
			if !filters
				.iter()
				.any(|filter| title.contains(&filter.to_lowercase()))
			{
				return false;
			}
		}

		if let Some(start) = self.start_date {
			if video.date_added < start {
				return false;
			}
		}
		if let Some(end) = self.end_date {
			if video.date_added > end {
				return false;
			}
		}

		if let Some(min) = self.min_duration {
			if video.duration < min {
				return false;
			}
		}
		if let Some(max) = self.max_duration {
			if video.duration > max {
				return false;
			}
		}

		if let Some(min) = self.min_size {
			if video.file_size.map_or(true, |size| size < min) {
				return false;
			}
		}
		if let Some(max) = self.max_size {
			if video.file_size.map_or(true, |size| size > max) {
				return false;
			}
		}

		if let Some(keywords) = &self.keywords {
			let title = video.title.to_lowercase();
			let matched = keywords.iter().any(|keyword| {
				let keyword = keyword.to_lowercase();
				title.contains(&keyword)
					|| video
						.custom_metadata
						.values()
						.any(|value| value.to_lowercase().contains(&keyword))
			});
			if !matched {
				return false;
			}
		}

		if let Some(patterns) = &self.path_patterns {
			let mut builder = GlobSetBuilder::new();
			for pattern in patterns {
				match Glob::new(pattern) {
					Ok(glob) => {
						builder.add(glob);
					}
					Err(e) => {
						warn!(pattern, ?e, "ignoring malformed path pattern");
					}
				}
			}
			match builder.build() {
				Ok(set) if set.is_match(&video.url) => {}
				_ => return false,
			}
		}

		true
	}

	/// Canonical pipe-joined form used as the evaluator's cache key, e.g.
	/// `name:foo|minSize:1048576`.
	#[must_use]
	pub fn canonical(&self) -> String {
		let mut parts = Vec::new();

		if let Some(filters) = &self.name_filters {
			parts.push(format!("name:{}", filters.join(",")));
		}
		if let Some(start) = self.start_date {
			parts.push(format!("startDate:{}", start.to_rfc3339()));
		}
		if let Some(end) = self.end_date {
			parts.push(format!("endDate:{}", end.to_rfc3339()));
		}
		if let Some(min) = self.min_duration {
			parts.push(format!("minDuration:{min}"));
		}
		if let Some(max) = self.max_duration {
			parts.push(format!("maxDuration:{max}"));
		}
		if let Some(min) = self.min_size {
			parts.push(format!("minSize:{min}"));
		}
		if let Some(max) = self.max_size {
			parts.push(format!("maxSize:{max}"));
		}
		if let Some(keywords) = &self.keywords {
			parts.push(format!("keywords:{}", keywords.join(",")));
		}
		if let Some(patterns) = &self.path_patterns {
			parts.push(format!("path:{}", patterns.join(",")));
		}

		parts.join("|")
	}
}

/// What changed between two evaluations of the same criteria.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SmartFolderDelta {
	pub matched: Vec<PathBuf>,
	pub added: Vec<PathBuf>,
	pub removed: Vec<PathBuf>,
}

/// Evaluates criteria against the catalog, remembering the last match set
/// per canonical criteria string so updates can report adds and removals.
#[derive(Debug, Default)]
pub struct SmartFolderEvaluator {
	cache: Mutex<HashMap<String, BTreeSet<PathBuf>>>,
}

impl SmartFolderEvaluator {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// All matching videos, sorted by date added when a date range is part
	/// of the criteria, by path otherwise.
	#[instrument(skip(self, catalog))]
	pub async fn find(
		&self,
		catalog: &dyn Catalog,
		criteria: &SmartCriteria,
	) -> Result<Vec<Video>, catalog::Error> {
		let mut matched = catalog.fetch_videos(criteria).await?;

		if criteria.has_date_range() {
			matched.sort_by_key(|video| video.date_added);
		} else {
			matched.sort_by(|a, b| a.url.cmp(&b.url));
		}

		Ok(matched)
	}

	/// Re-evaluates `criteria` and diffs against the cached match set.
	pub async fn update(
		&self,
		catalog: &dyn Catalog,
		criteria: &SmartCriteria,
	) -> Result<SmartFolderDelta, catalog::Error> {
		let matched = self.find(catalog, criteria).await?;
		let urls = matched
			.iter()
			.map(|video| video.url.clone())
			.collect::<BTreeSet<_>>();

		let mut cache = self.cache.lock().await;
		let previous = cache
			.insert(criteria.canonical(), urls.clone())
			.unwrap_or_default();

		Ok(SmartFolderDelta {
			matched: matched.into_iter().map(|video| video.url).collect(),
			added: urls.difference(&previous).cloned().collect(),
			removed: previous.difference(&urls).cloned().collect(),
		})
	}

	pub async fn clear(&self) {
		self.cache.lock().await.clear();
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn video(title: &str, size: u64, duration: f64) -> Video {
		let mut video = Video::new(format!("/library/{title}.mp4"));
		video.file_size = Some(size);
		video.duration = duration;
		video
	}

	#[test]
	fn empty_criteria_match_everything() {
		let criteria = SmartCriteria::default();
		assert!(criteria.is_empty());
		assert!(criteria.matches(&video("anything", 1, 1.0)));
		assert!(criteria.matches(&Video::new("/bare.mp4")));
	}

	#[test]
	fn all_present_fields_must_hold() {
		let criteria = SmartCriteria {
			name_filters: Some(vec!["alps".into(), "dolomites".into()]),
			min_size: Some(1024),
			..SmartCriteria::default()
		};

		assert!(criteria.matches(&video("Alps Hike", 4096, 60.0)));
		assert!(!criteria.matches(&video("Alps Hike", 10, 60.0)), "size fails");
		assert!(!criteria.matches(&video("Beach Day", 4096, 60.0)), "name fails");
	}

	#[test]
	fn missing_file_size_fails_size_bounds() {
		let criteria = SmartCriteria {
			min_size: Some(1),
			..SmartCriteria::default()
		};
		assert!(!criteria.matches(&Video::new("/unsized.mp4")));
	}

	#[test]
	fn keywords_search_custom_metadata_too() {
		let criteria = SmartCriteria {
			keywords: Some(vec!["drone".into()]),
			..SmartCriteria::default()
		};

		let mut tagged = video("untitled", 1, 1.0);
		tagged
			.custom_metadata
			.insert("rig".into(), "DJI Drone".into());

		assert!(criteria.matches(&tagged));
		assert!(!criteria.matches(&video("untitled", 1, 1.0)));
	}

	#[test]
	fn path_patterns_use_globs() {
		let criteria = SmartCriteria {
			path_patterns: Some(vec!["/library/2019/**".into()]),
			..SmartCriteria::default()
		};

		let mut inside = video("clip", 1, 1.0);
		inside.url = "/library/2019/trips/clip.mp4".into();
		assert!(criteria.matches(&inside));
		assert!(!criteria.matches(&video("clip", 1, 1.0)));
	}

	#[test]
	fn canonical_form_is_stable_and_keyed() {
		let criteria = SmartCriteria {
			name_filters: Some(vec!["foo".into()]),
			min_size: Some(1_048_576),
			..SmartCriteria::default()
		};

		assert_eq!(criteria.canonical(), "name:foo|minSize:1048576");
		assert_eq!(SmartCriteria::default().canonical(), "");
	}

	#[test]
	fn criteria_survive_a_serde_round_trip() {
		let criteria = SmartCriteria {
			name_filters: Some(vec!["foo".into()]),
			min_duration: Some(30.0),
			max_size: Some(1 << 30),
			path_patterns: Some(vec!["/r/**".into()]),
			..SmartCriteria::default()
		};

		let encoded = serde_json::to_string(&criteria).unwrap();
		let decoded: SmartCriteria = serde_json::from_str(&encoded).unwrap();
		assert_eq!(criteria, decoded);

		let sample = video("foo trip", 2 << 30, 45.0);
		assert_eq!(criteria.matches(&sample), decoded.matches(&sample));
	}
}
