//! Priority resolution of a raw flag set into exactly one [`EventType`].
//!
//! The table is evaluated top to bottom and the first matching row wins. Content
//! flags sit above the structural ones, so a record carrying both "modified" and
//! "renamed" reports as `modify`.

use crate::{
	event::{Event, EventType, TargetKind},
	raw::{RawEvent, RawFlags, RenameSide},
};

use tracing::{trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resolution {
	Kind(EventType),
	/// `moved_from` or `moved_to`, depending on the record's side.
	Renamed,
}

const PRIORITY: [(RawFlags, Resolution); 7] = [
	(RawFlags::ROOT_CHANGED, Resolution::Kind(EventType::Unknown)),
	(RawFlags::ITEM_METADATA, Resolution::Kind(EventType::Modify)),
	(RawFlags::ITEM_CREATED, Resolution::Kind(EventType::Create)),
	(RawFlags::ITEM_CLONED, Resolution::Kind(EventType::Create)),
	(RawFlags::ITEM_MODIFIED, Resolution::Kind(EventType::Modify)),
	(RawFlags::ITEM_REMOVED, Resolution::Kind(EventType::Delete)),
	(RawFlags::ITEM_RENAMED, Resolution::Renamed),
];

/// Resolves the event type of one (already filtered) record.
#[must_use]
pub fn resolve(raw: &RawEvent) -> EventType {
	let resolution = PRIORITY
		.iter()
		.find(|(flags, _)| raw.flags.intersects(*flags))
		.map_or(Resolution::Kind(EventType::Unknown), |(_, resolution)| {
			*resolution
		});

	match resolution {
		Resolution::Kind(event_type) => event_type,
		Resolution::Renamed => match raw.rename_side {
			Some(RenameSide::From) => EventType::MovedFrom,
			Some(RenameSide::To) => EventType::MovedTo,
			None => {
				warn!(
					path = %raw.path.display(),
					"Rename record without a side, reporting as unknown;"
				);
				EventType::Unknown
			}
		},
	}
}

/// Builds the canonical event for one (already filtered) record.
#[must_use]
pub fn normalize(raw: &RawEvent) -> Event {
	let kind = TargetKind::from_is_dir(raw.flags.is_dir());
	let path = raw.path.clone();

	let event = match resolve(raw) {
		EventType::Create => Event::create(path, kind),
		EventType::Delete => Event::delete(path, kind),
		EventType::Modify => Event::modify(path, kind),
		EventType::MovedFrom => Event::moved_from(path, kind),
		EventType::MovedTo => Event::moved_to(path, kind),
		// Only paired records produce a move, and those never come through here
		EventType::Move | EventType::Unknown => {
			let has_stable_target = !raw.flags.intersects(
				RawFlags::ROOT_CHANGED
					| RawFlags::MUST_SCAN_SUBDIRS
					| RawFlags::USER_DROPPED
					| RawFlags::KERNEL_DROPPED,
			) && !raw.path.as_os_str().is_empty();

			Event::unknown(has_stable_target.then_some((path, kind)))
		}
	};

	trace!(
		sequence_id = raw.sequence_id,
		flags = ?raw.flags,
		event_type = %event.event_type(),
		"Normalized raw record;"
	);

	event
}
