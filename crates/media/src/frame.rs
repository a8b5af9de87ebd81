use image::RgbaImage;

/// A single decoded video frame plus the timestamp it was requested at.
///
/// The buffer is owned here until the compositor consumes it.
#[derive(Debug, Clone)]
pub struct Frame {
	pub image: RgbaImage,
	pub timestamp: f64,
}

impl Frame {
	#[must_use]
	pub const fn new(image: RgbaImage, timestamp: f64) -> Self {
		Self { image, timestamp }
	}

	#[must_use]
	pub fn width(&self) -> u32 {
		self.image.width()
	}

	#[must_use]
	pub fn height(&self) -> u32 {
		self.image.height()
	}

	#[must_use]
	pub fn aspect_ratio(&self) -> f64 {
		f64::from(self.image.width()) / f64::from(self.image.height().max(1))
	}
}
