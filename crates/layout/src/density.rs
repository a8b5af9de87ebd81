use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// Preset scaling factor controlling how dense a mosaic (or preview) is for
/// a given source duration. Higher factors mean fewer tiles.
#[derive(
	Debug,
	Clone,
	Copy,
	PartialEq,
	Eq,
	Hash,
	Serialize,
	Deserialize,
	Display,
	EnumString,
	EnumIter,
	Default,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Density {
	Xxs,
	Xs,
	S,
	#[default]
	M,
	L,
	Xl,
	Xxl,
}

impl Density {
	/// Divisor applied to the duration-derived thumbnail count.
	#[must_use]
	pub const fn factor(self) -> f64 {
		match self {
			Self::Xxs => 3.0,
			Self::Xs => 2.0,
			Self::S => 1.5,
			Self::M => 1.0,
			Self::L => 0.75,
			Self::Xl => 0.5,
			Self::Xxl => 0.25,
		}
	}

	/// Divisor applied to the preview extracts-per-minute rate.
	#[must_use]
	pub const fn extract_multiplier(self) -> f64 {
		match self {
			Self::Xxs => 4.0,
			Self::Xs => 2.0,
			Self::S => 1.5,
			Self::M => 1.0,
			Self::L => 0.75,
			Self::Xl => 0.5,
			Self::Xxl => 0.25,
		}
	}
}

/// Target aspect ratios a mosaic canvas can be laid out for.
#[derive(
	Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, Default,
)]
pub enum AspectRatio {
	#[default]
	#[serde(rename = "16:9")]
	#[strum(serialize = "16:9")]
	Widescreen,
	#[serde(rename = "4:3")]
	#[strum(serialize = "4:3")]
	Standard,
	#[serde(rename = "1:1")]
	#[strum(serialize = "1:1")]
	Square,
	#[serde(rename = "21:9")]
	#[strum(serialize = "21:9")]
	Ultrawide,
}

impl AspectRatio {
	#[must_use]
	pub const fn ratio(self) -> f64 {
		match self {
			Self::Widescreen => 16.0 / 9.0,
			Self::Standard => 4.0 / 3.0,
			Self::Square => 1.0,
			Self::Ultrawide => 21.0 / 9.0,
		}
	}

	/// Filesystem-safe tag used in artifact names, where `:` is off-limits.
	#[must_use]
	pub const fn file_tag(self) -> &'static str {
		match self {
			Self::Widescreen => "16x9",
			Self::Standard => "4x3",
			Self::Square => "1x1",
			Self::Ultrawide => "21x9",
		}
	}
}
