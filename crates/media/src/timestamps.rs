/// Fraction of the duration where sampling starts and ends. The opening
/// credits and the tail are rarely representative.
const WINDOW_START: f64 = 0.05;
const WINDOW_END: f64 = 0.95;

/// Band boundaries inside the sampling window, as fractions of duration.
const FIRST_BAND_END: f64 = 0.38;
const MIDDLE_BAND_END: f64 = 0.67;

/// Share of tiles taken from each band.
const FIRST_BAND_SHARE: f64 = 0.2;
const MIDDLE_BAND_SHARE: f64 = 0.6;

/// Picks `count` extraction timestamps across `[5%, 95%]` of `duration`,
/// weighting the middle of the video: 20% of tiles over `[5%, 38%]`, 60%
/// over `[38%, 67%]` and the rest over `[67%, 95%]` ending exactly at 95%.
#[must_use]
pub fn mosaic_timestamps(duration: f64, count: u32) -> Vec<f64> {
	if count == 0 || duration <= 0.0 {
		return Vec::new();
	}

	let start = duration * WINDOW_START;
	let end = duration * WINDOW_END;

	if count < 4 {
		return linspace(start, end, count);
	}

	#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
	let first = ((f64::from(count) * FIRST_BAND_SHARE).round() as u32).max(1);
	#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
	let mut middle = ((f64::from(count) * MIDDLE_BAND_SHARE).round() as u32).max(1);
	while first + middle >= count {
		middle -= 1;
	}
	let last = count - first - middle;

	let first_end = duration * FIRST_BAND_END;
	let middle_end = duration * MIDDLE_BAND_END;

	let mut timestamps = Vec::with_capacity(count as usize);
	timestamps.extend(half_open(start, first_end, first));
	timestamps.extend(half_open(first_end, middle_end, middle));
	timestamps.extend(linspace(middle_end, end, last));
	timestamps
}

/// `count` points across `[start, end)`, including `start`.
fn half_open(start: f64, end: f64, count: u32) -> Vec<f64> {
	let step = (end - start) / f64::from(count);
	(0..count)
		.map(|i| start + step * f64::from(i))
		.collect()
}

/// `count` points across `[start, end]` inclusive of both ends.
fn linspace(start: f64, end: f64, count: u32) -> Vec<f64> {
	match count {
		0 => Vec::new(),
		1 => vec![end],
		_ => {
			let step = (end - start) / f64::from(count - 1);
			(0..count)
				.map(|i| start + step * f64::from(i))
				.collect()
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn sixty_second_video_spans_three_to_fifty_seven() {
		let timestamps = mosaic_timestamps(60.0, 42);

		assert_eq!(timestamps.len(), 42);
		assert!((timestamps[0] - 3.0).abs() < 1e-9, "starts at 5%");
		assert!((timestamps[41] - 57.0).abs() < 1e-9, "ends at 95%");
	}

	#[test]
	fn timestamps_are_strictly_increasing() {
		for count in [4, 10, 42, 100] {
			let timestamps = mosaic_timestamps(600.0, count);
			assert_eq!(timestamps.len(), count as usize);
			assert!(timestamps.windows(2).all(|w| w[0] < w[1]), "count {count}");
		}
	}

	#[test]
	fn middle_band_carries_most_of_the_tiles() {
		let duration = 100.0;
		let timestamps = mosaic_timestamps(duration, 50);

		let in_middle = timestamps
			.iter()
			.filter(|t| **t >= duration * FIRST_BAND_END && **t < duration * MIDDLE_BAND_END)
			.count();

		assert_eq!(in_middle, 30);
	}

	#[test]
	fn tiny_counts_fall_back_to_even_spacing() {
		let timestamps = mosaic_timestamps(10.0, 2);
		assert_eq!(timestamps, vec![0.5, 9.5]);
	}

	#[test]
	fn degenerate_inputs_yield_nothing() {
		assert!(mosaic_timestamps(0.0, 10).is_empty());
		assert!(mosaic_timestamps(60.0, 0).is_empty());
	}
}
