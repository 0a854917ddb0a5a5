use crate::{
	correlator::RenamePairCorrelator,
	event::{Event, EventType, TargetKind},
	metrics::WatcherMetrics,
	normalizer,
	quirk::{CoalescedPolicy, QuirkFilter},
	raw::RawEvent,
};

use std::{
	path::PathBuf,
	sync::Arc,
	time::{Duration, Instant},
};

use tracing::{debug, trace};

/// Filter, normalizer and correlator for one session, run one record at a time.
#[derive(Debug)]
pub struct Pipeline {
	quirks: QuirkFilter,
	correlator: RenamePairCorrelator,
	metrics: Arc<WatcherMetrics>,
}

impl Pipeline {
	#[must_use]
	pub fn new(
		policy: CoalescedPolicy,
		correlation_window: Duration,
		metrics: Arc<WatcherMetrics>,
	) -> Self {
		Self {
			quirks: QuirkFilter::new(policy),
			correlator: RenamePairCorrelator::new(correlation_window),
			metrics,
		}
	}

	/// Turns one raw record into the canonical events it stands for, in delivery order.
	pub fn process(&mut self, raw: RawEvent, now: Instant) -> Vec<Event> {
		trace!(
			sequence_id = raw.sequence_id,
			path = %raw.path.display(),
			flags = ?raw.flags,
			"Processing raw record;"
		);

		if raw.is_paired_rename() {
			return self.expand_paired_rename(raw);
		}

		if QuirkFilter::is_coalesced(raw.flags) {
			self.metrics.record_coalesced_resolved();
		}

		let mut events = Vec::with_capacity(2);

		for filtered in self.quirks.apply(raw) {
			let event = normalizer::normalize(&filtered);

			if event.event_type() == EventType::Unknown {
				self.metrics.record_unknown_event();
			}

			let side = filtered.rename_side.filter(|_| {
				matches!(
					event.event_type(),
					EventType::MovedFrom | EventType::MovedTo
				)
			});

			let completed = side
				.zip(filtered.transaction_id)
				.and_then(|(side, transaction_id)| {
					self.correlator
						.observe(transaction_id, side, filtered.path.clone(), now)
				});

			let kind = event.kind().unwrap_or(TargetKind::File);
			events.push(event);

			if let Some((from, to)) = completed {
				events.push(self.paired(from, to, kind));
			}
		}

		events
	}

	/// Drops rename halves that outlived the window.
	pub fn tick(&mut self, now: Instant) {
		let expired = self.correlator.expire(now);
		if expired > 0 {
			self.metrics.record_renames_expired(expired);
		}
	}

	/// Forgets every pending rename half.
	pub fn reset(&mut self) {
		let dropped = self.correlator.pending_len();
		if dropped > 0 {
			debug!(dropped, "Discarding pending rename halves;");
		}
		self.correlator.clear();
	}

	#[must_use]
	pub fn pending_renames(&self) -> usize {
		self.correlator.pending_len()
	}

	fn expand_paired_rename(&self, raw: RawEvent) -> Vec<Event> {
		let kind = TargetKind::from_is_dir(raw.flags.is_dir());
		let RawEvent {
			path: from,
			secondary_path,
			..
		} = raw;
		let to = secondary_path.unwrap_or_default();

		vec![
			Event::moved_from(from.clone(), kind),
			Event::moved_to(to.clone(), kind),
			self.paired(from, to, kind),
		]
	}

	fn paired(&self, from: PathBuf, to: PathBuf, kind: TargetKind) -> Event {
		self.metrics.record_move_paired();
		Event::moved(from, to, kind)
	}
}
