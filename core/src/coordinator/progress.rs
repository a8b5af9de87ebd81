use std::{sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::trace;

use super::DiscoveryListener;

/// Snapshot of a discovery run, emitted after every completed unit of work.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
	pub total_folders: u64,
	pub processed_folders: u64,
	pub current_folder: Option<String>,
	pub total_videos: u64,
	pub processed_videos: u64,
	pub current_video: Option<String>,
	pub skipped_files: u64,
	pub error_files: u64,
	/// Videos per second over the run so far.
	pub processing_rate: f64,
	pub estimated_time_remaining: Option<Duration>,
}

impl ProgressEvent {
	/// Fills the rate and remaining-time fields from elapsed wall time.
	pub(crate) fn finalize(&mut self, elapsed: Duration) {
		let secs = elapsed.as_secs_f64();
		if secs > 0.0 && self.processed_videos > 0 {
			#[allow(clippy::cast_precision_loss)]
			let rate = self.processed_videos as f64 / secs;
			self.processing_rate = rate;

			let remaining = self.total_videos.saturating_sub(self.processed_videos);
			if remaining > 0 {
				#[allow(clippy::cast_precision_loss)]
				let eta = remaining as f64 / rate;
				self.estimated_time_remaining = Some(Duration::from_secs_f64(eta));
			} else {
				self.estimated_time_remaining = Some(Duration::ZERO);
			}
		}
	}
}

/// Serializes progress delivery: events from any task funnel through one
/// channel and reach the listener from a single consumer.
pub(crate) struct ProgressReporter {
	sender: async_channel::Sender<ProgressEvent>,
	pump: JoinHandle<()>,
}

impl ProgressReporter {
	pub(crate) fn new(listener: Arc<dyn DiscoveryListener>) -> Self {
		let (sender, receiver) = async_channel::unbounded::<ProgressEvent>();

		let pump = tokio::spawn(async move {
			while let Ok(event) = receiver.recv().await {
				trace!(
					processed = event.processed_videos,
					total = event.total_videos,
					"progress"
				);
				listener.progress(&event);
			}
		});

		Self { sender, pump }
	}

	pub(crate) fn emit(&self, event: ProgressEvent) {
		// An unbounded channel never rejects; an error just means the pump
		// is gone and the run is over anyway.
		let _ = self.sender.try_send(event);
	}

	/// Flushes queued events and stops the pump.
	pub(crate) async fn finish(self) {
		self.sender.close();
		let _ = self.pump.await;
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn rate_and_eta_follow_processed_counts() {
		let mut event = ProgressEvent {
			total_videos: 100,
			processed_videos: 25,
			..ProgressEvent::default()
		};
		event.finalize(Duration::from_secs(5));

		assert!((event.processing_rate - 5.0).abs() < 1e-9);
		assert_eq!(
			event.estimated_time_remaining,
			Some(Duration::from_secs(15))
		);
	}

	#[test]
	fn finished_runs_report_zero_remaining() {
		let mut event = ProgressEvent {
			total_videos: 10,
			processed_videos: 10,
			..ProgressEvent::default()
		};
		event.finalize(Duration::from_secs(2));

		assert_eq!(event.estimated_time_remaining, Some(Duration::ZERO));
	}
}
