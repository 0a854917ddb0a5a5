//! Pairing of the two halves of one rename.
//!
//! Sides are keyed by their transaction id and may arrive in either order. A
//! completed pair yields the paths for a `move`; an entry that stays incomplete
//! for longer than the window is dropped without producing anything, since the
//! side that did arrive has already been delivered on its own.

use crate::raw::RenameSide;

use std::{
	collections::{hash_map::Entry, HashMap},
	path::PathBuf,
	time::{Duration, Instant},
};

use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRename {
	pub transaction_id: u64,
	pub from_path: Option<PathBuf>,
	pub to_path: Option<PathBuf>,
	pub created_at: Instant,
}

impl PendingRename {
	fn new(transaction_id: u64, created_at: Instant) -> Self {
		Self {
			transaction_id,
			from_path: None,
			to_path: None,
			created_at,
		}
	}

	fn set(&mut self, side: RenameSide, path: PathBuf) {
		match side {
			RenameSide::From => self.from_path = Some(path),
			RenameSide::To => self.to_path = Some(path),
		}
	}
}

#[derive(Debug)]
pub struct RenamePairCorrelator {
	pending: HashMap<u64, PendingRename>,
	window: Duration,
}

impl RenamePairCorrelator {
	#[must_use]
	pub fn new(window: Duration) -> Self {
		Self {
			pending: HashMap::new(),
			window,
		}
	}

	/// Records one side of rename `transaction_id`.
	///
	/// Returns `(from, to)` when this side completes the pair, retiring the entry.
	pub fn observe(
		&mut self,
		transaction_id: u64,
		side: RenameSide,
		path: PathBuf,
		now: Instant,
	) -> Option<(PathBuf, PathBuf)> {
		let window = self.window;

		let pending = match self.pending.entry(transaction_id) {
			Entry::Vacant(entry) => entry.insert(PendingRename::new(transaction_id, now)),
			Entry::Occupied(entry) => {
				let pending = entry.into_mut();
				// A stale half from an unrelated rename that reused the id
				if now.saturating_duration_since(pending.created_at) > window {
					debug!(
						transaction_id,
						"Replacing rename half that outlived the correlation window;"
					);
					*pending = PendingRename::new(transaction_id, now);
				}
				pending
			}
		};

		pending.set(side, path);

		if pending.from_path.is_none() || pending.to_path.is_none() {
			return None;
		}

		let PendingRename {
			from_path, to_path, ..
		} = self.pending.remove(&transaction_id)?;

		debug!(transaction_id, "Paired rename halves;");

		from_path.zip(to_path)
	}

	/// Drops every entry older than the window, returning how many were dropped.
	pub fn expire(&mut self, now: Instant) -> usize {
		let window = self.window;
		let before = self.pending.len();

		self.pending.retain(|transaction_id, pending| {
			let alive = now.saturating_duration_since(pending.created_at) <= window;
			if !alive {
				debug!(
					transaction_id,
					from = ?pending.from_path,
					to = ?pending.to_path,
					"Rename half expired without a counterpart;"
				);
			}
			alive
		});

		before - self.pending.len()
	}

	pub fn clear(&mut self) {
		self.pending.clear();
	}

	#[must_use]
	pub fn pending_len(&self) -> usize {
		self.pending.len()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const WINDOW: Duration = Duration::from_millis(100);

	#[test]
	fn pairs_from_then_to() {
		let mut correlator = RenamePairCorrelator::new(WINDOW);
		let now = Instant::now();

		assert_eq!(
			correlator.observe(7, RenameSide::From, "/w/a".into(), now),
			None
		);
		assert_eq!(correlator.pending_len(), 1);

		assert_eq!(
			correlator.observe(
				7,
				RenameSide::To,
				"/w/b".into(),
				now + Duration::from_millis(20)
			),
			Some(("/w/a".into(), "/w/b".into()))
		);
		assert_eq!(correlator.pending_len(), 0);
	}

	#[test]
	fn pairs_to_then_from() {
		let mut correlator = RenamePairCorrelator::new(WINDOW);
		let now = Instant::now();

		assert_eq!(correlator.observe(1, RenameSide::To, "/w/b".into(), now), None);
		assert_eq!(
			correlator.observe(1, RenameSide::From, "/w/a".into(), now),
			Some(("/w/a".into(), "/w/b".into()))
		);
	}

	#[test]
	fn interleaved_transactions_stay_apart() {
		let mut correlator = RenamePairCorrelator::new(WINDOW);
		let now = Instant::now();

		correlator.observe(1, RenameSide::From, "/w/a".into(), now);
		correlator.observe(2, RenameSide::From, "/w/c".into(), now);

		assert_eq!(
			correlator.observe(2, RenameSide::To, "/w/d".into(), now),
			Some(("/w/c".into(), "/w/d".into()))
		);
		assert_eq!(
			correlator.observe(1, RenameSide::To, "/w/b".into(), now),
			Some(("/w/a".into(), "/w/b".into()))
		);
	}

	#[test]
	fn lone_half_expires_silently() {
		let mut correlator = RenamePairCorrelator::new(WINDOW);
		let now = Instant::now();

		correlator.observe(3, RenameSide::From, "/w/gone".into(), now);

		assert_eq!(correlator.expire(now + Duration::from_millis(50)), 0);
		assert_eq!(correlator.expire(now + Duration::from_millis(150)), 1);
		assert_eq!(correlator.pending_len(), 0);
	}

	#[test]
	fn late_counterpart_does_not_pair() {
		let mut correlator = RenamePairCorrelator::new(WINDOW);
		let now = Instant::now();

		correlator.observe(5, RenameSide::From, "/w/a".into(), now);

		// Not expired by a tick yet, but already past the window
		assert_eq!(
			correlator.observe(
				5,
				RenameSide::To,
				"/w/b".into(),
				now + Duration::from_millis(250)
			),
			None
		);
		assert_eq!(correlator.pending_len(), 1);
	}

	#[test]
	fn same_side_twice_keeps_latest_path() {
		let mut correlator = RenamePairCorrelator::new(WINDOW);
		let now = Instant::now();

		correlator.observe(9, RenameSide::From, "/w/first".into(), now);
		correlator.observe(9, RenameSide::From, "/w/second".into(), now);

		assert_eq!(
			correlator.observe(9, RenameSide::To, "/w/dest".into(), now),
			Some(("/w/second".into(), "/w/dest".into()))
		);
	}

	#[test]
	fn clear_drops_everything() {
		let mut correlator = RenamePairCorrelator::new(WINDOW);
		let now = Instant::now();

		correlator.observe(1, RenameSide::From, "/w/a".into(), now);
		correlator.observe(2, RenameSide::To, "/w/b".into(), now);
		correlator.clear();

		assert_eq!(correlator.pending_len(), 0);
		assert_eq!(correlator.expire(now + WINDOW * 10), 0);
	}
}
