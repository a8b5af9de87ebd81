const UNITS: [&str; 6] = ["B", "KB", "MB", "GB", "TB", "PB"];

/// Formats a byte count for display, e.g. `1536` -> `"1.5 KB"`.
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
	if bytes < 1024 {
		return format!("{bytes} B");
	}

	let mut value = bytes as f64;
	let mut unit = 0;
	while value >= 1024.0 && unit < UNITS.len() - 1 {
		value /= 1024.0;
		unit += 1;
	}

	format!("{value:.1} {}", UNITS[unit])
}

/// Formats a bit rate for display, e.g. `1_500_000` -> `"1.5 Mbps"`.
#[must_use]
pub fn format_bitrate(bits_per_second: u64) -> String {
	const RATES: [&str; 4] = ["bps", "Kbps", "Mbps", "Gbps"];

	if bits_per_second < 1000 {
		return format!("{bits_per_second} bps");
	}

	let mut value = bits_per_second as f64;
	let mut unit = 0;
	while value >= 1000.0 && unit < RATES.len() - 1 {
		value /= 1000.0;
		unit += 1;
	}

	format!("{value:.1} {}", RATES[unit])
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn small_counts_stay_in_bytes() {
		assert_eq!(format_bytes(0), "0 B");
		assert_eq!(format_bytes(1023), "1023 B");
	}

	#[test]
	fn scales_through_units() {
		assert_eq!(format_bytes(1536), "1.5 KB");
		assert_eq!(format_bytes(1024 * 1024), "1.0 MB");
		assert_eq!(format_bytes(5 * 1024 * 1024 * 1024), "5.0 GB");
	}

	#[test]
	fn bitrate_uses_decimal_units() {
		assert_eq!(format_bitrate(800), "800 bps");
		assert_eq!(format_bitrate(1_500_000), "1.5 Mbps");
	}
}
