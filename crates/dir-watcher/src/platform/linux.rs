//! inotify source
//!
//! One non-recursive watch on the root. Rename halves carry the kernel cookie as
//! their transaction id, and the kernel tells us which half each record is.

use crate::{
	raw::{RawEvent, RawFlags, RenameSide},
	Error,
};

use super::{Engine, OpenedSource, PlatformEventSource};

use std::{ffi::OsStr, path::Path};

use futures::{stream, StreamExt};
use inotify::{EventMask, Inotify, WatchDescriptor, WatchMask, Watches};
use tracing::{trace, warn};

const BUFFER_SIZE: usize = 4096;

fn watch_mask() -> WatchMask {
	WatchMask::CREATE
		| WatchMask::DELETE
		| WatchMask::MODIFY
		| WatchMask::ATTRIB
		| WatchMask::MOVED_FROM
		| WatchMask::MOVED_TO
		| WatchMask::DELETE_SELF
		| WatchMask::MOVE_SELF
		| WatchMask::ONLYDIR
}

struct InotifySource {
	watches: Watches,
	wd: Option<WatchDescriptor>,
}

impl PlatformEventSource for InotifySource {
	fn engine(&self) -> Engine {
		Engine::Inotify
	}

	fn close(&mut self) -> bool {
		let Some(wd) = self.wd.take() else {
			return false;
		};

		// Fails with EINVAL when the kernel already dropped the watch
		if let Err(e) = self.watches.remove(wd) {
			warn!(?e, "Failed to remove inotify watch;");
		}

		true
	}
}

pub(super) fn open(root: &Path) -> Result<OpenedSource, Error> {
	let inotify = Inotify::init().map_err(|e| Error::from_setup_io(root, &e))?;

	let mut watches = inotify.watches();
	let wd = watches
		.add(root, watch_mask())
		.map_err(|e| Error::from_setup_io(root, &e))?;

	let stream = inotify
		.into_event_stream([0; BUFFER_SIZE])
		.map_err(|e| Error::from_setup_io(root, &e))?;

	let root = root.to_path_buf();
	let mut sequence_id = 0;

	let events = stream
		.flat_map(move |res| {
			let records = match res {
				Ok(event) => {
					sequence_id += 1;
					let mut records = translate(
						&root,
						event.mask,
						event.cookie,
						event.name.as_deref(),
						sequence_id,
					)
					.transpose()
					.into_iter()
					.collect::<Vec<_>>();

					records.extend(root_moved(&root, event.mask).map(Err));
					records
				}
				Err(e) => vec![Err(Error::InternalSource(format!(
					"failed to read inotify events: {e}"
				)))],
			};

			stream::iter(records)
		})
		.boxed();

	Ok(OpenedSource {
		handle: Box::new(InotifySource {
			watches,
			wd: Some(wd),
		}),
		events,
	})
}

/// The watch follows the moved inode while names keep resolving against the old
/// root, so a moved root ends the source right after its `ROOT_CHANGED` record.
fn root_moved(root: &Path, mask: EventMask) -> Option<Error> {
	mask.contains(EventMask::MOVE_SELF).then(|| {
		Error::InternalSource(format!(
			"watched directory '{}' was moved away",
			root.display()
		))
	})
}

/// Maps one inotify record onto the shared flag vocabulary.
///
/// `Ok(None)` means the record carries nothing worth reporting.
fn translate(
	root: &Path,
	mask: EventMask,
	cookie: u32,
	name: Option<&OsStr>,
	sequence_id: u64,
) -> Result<Option<RawEvent>, Error> {
	trace!(?mask, cookie, ?name, "Received inotify record;");

	if mask.contains(EventMask::IGNORED) {
		return Err(Error::InternalSource(format!(
			"inotify watch on '{}' was invalidated",
			root.display()
		)));
	}

	if mask.contains(EventMask::Q_OVERFLOW) {
		return Ok(Some(RawEvent::new(
			RawFlags::MUST_SCAN_SUBDIRS | RawFlags::KERNEL_DROPPED,
			root,
			sequence_id,
		)));
	}

	if mask.intersects(EventMask::DELETE_SELF | EventMask::MOVE_SELF | EventMask::UNMOUNT) {
		return Ok(Some(RawEvent::new(
			RawFlags::ROOT_CHANGED | RawFlags::ITEM_IS_DIR,
			root,
			sequence_id,
		)));
	}

	// Records about the root itself (e.g. its own attributes)
	let Some(name) = name.filter(|name| !name.is_empty()) else {
		return Ok(None);
	};

	let mut flags = if mask.contains(EventMask::ISDIR) {
		RawFlags::ITEM_IS_DIR
	} else {
		RawFlags::ITEM_IS_FILE
	};

	let mut side = None;

	for (native, flag) in [
		(EventMask::CREATE, RawFlags::ITEM_CREATED),
		(EventMask::DELETE, RawFlags::ITEM_REMOVED),
		(EventMask::MODIFY, RawFlags::ITEM_MODIFIED),
		(EventMask::ATTRIB, RawFlags::ITEM_CHANGE_OWNER),
	] {
		if mask.contains(native) {
			flags |= flag;
		}
	}

	if mask.contains(EventMask::MOVED_FROM) {
		flags |= RawFlags::ITEM_RENAMED;
		side = Some(RenameSide::From);
	} else if mask.contains(EventMask::MOVED_TO) {
		flags |= RawFlags::ITEM_RENAMED;
		side = Some(RenameSide::To);
	}

	let raw = RawEvent::new(flags, root.join(name), sequence_id);

	Ok(Some(match side {
		Some(side) => raw.with_rename(side, (cookie != 0).then_some(u64::from(cookie))),
		None => raw,
	}))
}
