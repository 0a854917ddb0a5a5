//! Counters for one watch session

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tracing::info;

#[derive(Debug, Default)]
pub struct WatcherMetrics {
	/// Raw records received from the platform source
	pub raw_received: AtomicU64,
	/// Canonical events handed to the callback
	pub delivered: AtomicU64,
	/// Created+removed records rewritten by the quirk filter
	pub coalesced_resolved: AtomicU64,
	/// Rename halves folded into a `move`
	pub moves_paired: AtomicU64,
	/// Rename halves dropped after the correlation window
	pub renames_expired: AtomicU64,
	/// Events normalized to `unknown`
	pub unknown_events: AtomicU64,
}

impl WatcherMetrics {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	pub fn record_raw_received(&self) {
		self.raw_received.fetch_add(1, Ordering::Relaxed);
	}

	pub fn record_delivered(&self) {
		self.delivered.fetch_add(1, Ordering::Relaxed);
	}

	pub fn record_coalesced_resolved(&self) {
		self.coalesced_resolved.fetch_add(1, Ordering::Relaxed);
	}

	pub fn record_move_paired(&self) {
		self.moves_paired.fetch_add(1, Ordering::Relaxed);
	}

	pub fn record_renames_expired(&self, count: usize) {
		self.renames_expired
			.fetch_add(count as u64, Ordering::Relaxed);
	}

	pub fn record_unknown_event(&self) {
		self.unknown_events.fetch_add(1, Ordering::Relaxed);
	}

	#[must_use]
	pub fn snapshot(&self) -> MetricsSnapshot {
		MetricsSnapshot {
			raw_received: self.raw_received.load(Ordering::Relaxed),
			delivered: self.delivered.load(Ordering::Relaxed),
			coalesced_resolved: self.coalesced_resolved.load(Ordering::Relaxed),
			moves_paired: self.moves_paired.load(Ordering::Relaxed),
			renames_expired: self.renames_expired.load(Ordering::Relaxed),
			unknown_events: self.unknown_events.load(Ordering::Relaxed),
		}
	}

	pub fn log_metrics(&self) {
		let MetricsSnapshot {
			raw_received,
			delivered,
			coalesced_resolved,
			moves_paired,
			renames_expired,
			unknown_events,
		} = self.snapshot();

		info!(
			"Watcher metrics: raw_received={raw_received}, delivered={delivered}, \
			coalesced_resolved={coalesced_resolved}, moves_paired={moves_paired}, \
			renames_expired={renames_expired}, unknown_events={unknown_events}",
		);
	}
}

/// Plain copy of [`WatcherMetrics`] at one point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
	pub raw_received: u64,
	pub delivered: u64,
	pub coalesced_resolved: u64,
	pub moves_paired: u64,
	pub renames_expired: u64,
	pub unknown_events: u64,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn snapshot_reflects_counters() {
		let metrics = WatcherMetrics::new();

		metrics.record_raw_received();
		metrics.record_raw_received();
		metrics.record_delivered();
		metrics.record_renames_expired(3);
		metrics.record_unknown_event();

		assert_eq!(
			metrics.snapshot(),
			MetricsSnapshot {
				raw_received: 2,
				delivered: 1,
				renames_expired: 3,
				unknown_events: 1,
				..Default::default()
			}
		);
	}
}
