use serde::{Deserialize, Serialize};
use vw_layout::Density;

use crate::config::PreviewConfiguration;

/// Minimum source content per segment, seconds.
const MIN_SEGMENT_DURATION: f64 = 0.5;

/// Baseline extracts-per-minute for very short sources.
const BASE_RATE: f64 = 12.0;

/// How a preview is cut from its source: how many segments, how much source
/// content each carries, and how fast they play back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentPlan {
	pub extract_count: u32,
	/// Source seconds per segment.
	pub per_segment_duration: f64,
	pub speed_multiplier: f64,
	/// Segment start times, uniform across the usable timeline.
	pub starts: Vec<f64>,
}

impl SegmentPlan {
	/// Output seconds the assembled preview will run.
	#[must_use]
	pub fn output_duration(&self) -> f64 {
		f64::from(self.extract_count) * self.per_segment_duration / self.speed_multiplier
	}
}

/// Computes the segment plan for a source of `duration` seconds.
///
/// The extract rate decays with duration so hour-long sources don't get
/// hundreds of cuts, scaled by the density preset's extract multiplier.
#[must_use]
pub fn plan(duration: f64, density: Density, config: &PreviewConfiguration) -> SegmentPlan {
	let minutes = duration / 60.0;

	let base_per_minute = if duration <= 0.0 {
		BASE_RATE
	} else {
		(BASE_RATE / (1.0 + 0.2 * minutes)) / density.extract_multiplier()
	};

	#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
	let extract_count = ((minutes * base_per_minute).ceil() as u32).max(4);

	let per_segment_duration =
		(config.duration / f64::from(extract_count)).max(MIN_SEGMENT_DURATION);

	let speed_multiplier = (per_segment_duration * f64::from(extract_count) / config.duration)
		.min(config.max_speed_multiplier)
		.max(f64::MIN_POSITIVE);

	let last_start = (duration - per_segment_duration).max(0.0);
	let starts = match extract_count {
		1 => vec![0.0],
		count => (0..count)
			.map(|i| last_start * f64::from(i) / f64::from(count - 1))
			.collect(),
	};

	SegmentPlan {
		extract_count,
		per_segment_duration,
		speed_multiplier,
		starts,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn config(duration: f64, max_speed: f64) -> PreviewConfiguration {
		PreviewConfiguration {
			duration,
			max_speed_multiplier: max_speed,
			..PreviewConfiguration::default()
		}
	}

	#[test]
	fn five_minute_source_at_xs_density() {
		let plan = plan(300.0, Density::Xs, &config(30.0, 1.5));

		assert_eq!(plan.extract_count, 15);
		assert!((plan.per_segment_duration - 2.0).abs() < 1e-9);
		assert!((plan.speed_multiplier - 1.0).abs() < 1e-9);
		assert!((plan.output_duration() - 30.0).abs() < 1e-9);
	}

	#[test]
	fn segment_duration_is_floored() {
		// Long source, many segments: the raw per-segment time drops under
		// half a second and the floor plus the speed cap absorb the excess.
		let plan = plan(7200.0, Density::Xxl, &config(30.0, 1.5));

		assert!(plan.per_segment_duration >= 0.5);
		assert!(plan.speed_multiplier <= 1.5);
	}

	#[test]
	fn at_least_four_segments() {
		let plan = plan(3.0, Density::M, &config(30.0, 1.5));
		assert_eq!(plan.extract_count, 4);
	}

	#[test]
	fn zero_duration_uses_the_base_rate() {
		let plan = plan(0.0, Density::M, &config(30.0, 1.5));
		assert_eq!(plan.extract_count, 4, "minimum still applies");
		assert!(plan.starts.iter().all(|start| *start >= 0.0));
	}

	#[test]
	fn starts_are_uniform_and_in_range() {
		let duration = 300.0;
		let plan = plan(duration, Density::Xs, &config(30.0, 1.5));

		assert!((plan.starts[0]).abs() < 1e-9);
		let last = *plan.starts.last().unwrap();
		assert!((last - (duration - plan.per_segment_duration)).abs() < 1e-9);

		let gaps = plan.starts.windows(2).map(|w| w[1] - w[0]).collect::<Vec<_>>();
		for gap in &gaps {
			assert!((gap - gaps[0]).abs() < 1e-6, "uniform spacing");
		}
	}

	#[test]
	fn plan_survives_a_serde_round_trip() {
		let plan = plan(634.0, Density::M, &config(30.0, 1.5));
		let encoded = serde_json::to_string(&plan).unwrap();
		let decoded: SegmentPlan = serde_json::from_str(&encoded).unwrap();
		assert_eq!(plan, decoded);
	}
}
