//! Contradictory flag combinations produced by kernel-side coalescing.
//!
//! FSEvents folds a short-lived file (`touch x && rm x`) into a single record that
//! is flagged as both created and removed (`0x0300`). No real transition looks like
//! that, and priority resolution alone would report it as a creation, so these
//! records are rewritten here before they reach the normalizer.

use crate::raw::{RawEvent, RawFlags};

use serde::{Deserialize, Serialize};
use tracing::debug;

const COALESCED: RawFlags = RawFlags::ITEM_CREATED.union(RawFlags::ITEM_REMOVED);

/// What a coalesced create+remove record turns into.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoalescedPolicy {
	/// Only the net outcome: a single `delete`.
	#[default]
	DeleteOnly,
	/// A `create` immediately followed by a `delete` for the same path.
	CreateThenDelete,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct QuirkFilter {
	policy: CoalescedPolicy,
}

impl QuirkFilter {
	#[must_use]
	pub const fn new(policy: CoalescedPolicy) -> Self {
		Self { policy }
	}

	#[must_use]
	pub fn is_coalesced(flags: RawFlags) -> bool {
		flags.contains(COALESCED)
	}

	/// Rewrites one record into the records the normalizer should see.
	///
	/// Anything that is not a coalesced create+remove passes through untouched.
	#[must_use]
	pub fn apply(&self, raw: RawEvent) -> Vec<RawEvent> {
		if !Self::is_coalesced(raw.flags) {
			return vec![raw];
		}

		debug!(
			path = %raw.path.display(),
			flags = ?raw.flags,
			policy = ?self.policy,
			"Resolving coalesced create+remove record;",
		);

		let item_type = raw.flags & RawFlags::ITEM_TYPE;
		let removed = RawEvent {
			flags: item_type | RawFlags::ITEM_REMOVED,
			rename_side: None,
			transaction_id: None,
			secondary_path: None,
			..raw
		};

		match self.policy {
			CoalescedPolicy::DeleteOnly => vec![removed],
			CoalescedPolicy::CreateThenDelete => {
				let created = RawEvent {
					flags: item_type | RawFlags::ITEM_CREATED,
					..removed.clone()
				};
				vec![created, removed]
			}
		}
	}
}
