use once_cell::sync::Lazy;
use rusttype::Font;
use tracing::warn;

/// Common system font locations, tried in order. Overlay text is decoration;
/// a host without any of these still produces a valid mosaic, just unlabeled.
const FONT_CANDIDATES: [&str; 6] = [
	"/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
	"/usr/share/fonts/TTF/DejaVuSans.ttf",
	"/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
	"/usr/share/fonts/liberation/LiberationSans-Regular.ttf",
	"/Library/Fonts/Arial.ttf",
	"C:\\Windows\\Fonts\\arial.ttf",
];

pub static OVERLAY_FONT: Lazy<Option<Font<'static>>> = Lazy::new(|| {
	for candidate in FONT_CANDIDATES {
		if let Ok(bytes) = std::fs::read(candidate) {
			if let Some(font) = Font::try_from_vec(bytes) {
				return Some(font);
			}
		}
	}

	warn!("no usable system font found; text overlays will be skipped");
	None
});
