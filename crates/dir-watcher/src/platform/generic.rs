//! Sources built on `notify` watchers.
//!
//! `poll` runs everywhere on top of [`PollWatcher`]. On Windows,
//! `readdirectorychangesw` uses the recommended watcher, which reports rename halves
//! back to back without a tracker, so a synthetic transaction id links them.

use crate::{
	raw::{RawEvent, RawFlags, RenameSide},
	Error,
};

use super::{is_within, Engine, OpenedSource, PlatformEventSource};

use std::{
	path::{Path, PathBuf},
	time::Duration,
};

use async_channel as chan;
use futures::{future, StreamExt};
use notify::{
	event::{CreateKind, MetadataKind, ModifyKind, RemoveKind, RenameMode},
	Config, Event, EventKind, PollWatcher, RecursiveMode, Watcher,
};
use tracing::{error, trace, warn};

struct NotifySource {
	engine: Engine,
	root: PathBuf,
	watcher: Option<Box<dyn Watcher + Send>>,
}

impl PlatformEventSource for NotifySource {
	fn engine(&self) -> Engine {
		self.engine
	}

	fn close(&mut self) -> bool {
		let Some(mut watcher) = self.watcher.take() else {
			return false;
		};

		if let Err(e) = watcher.unwatch(&self.root) {
			warn!(?e, engine = %self.engine, "Failed to unwatch directory;");
		}

		true
	}
}

pub(super) fn open_poll(root: &Path, interval: Duration) -> Result<OpenedSource, Error> {
	open_with(root, Engine::Poll, |handler| {
		PollWatcher::new(handler, Config::default().with_poll_interval(interval))
			.map(|watcher| Box::new(watcher) as Box<dyn Watcher + Send>)
	})
}

#[cfg(windows)]
pub(super) fn open_recommended(root: &Path) -> Result<OpenedSource, Error> {
	open_with(root, Engine::ReadDirectoryChanges, |handler| {
		notify::RecommendedWatcher::new(handler, Config::default())
			.map(|watcher| Box::new(watcher) as Box<dyn Watcher + Send>)
	})
}

fn open_with(
	root: &Path,
	engine: Engine,
	build: impl FnOnce(
		Box<dyn FnMut(notify::Result<Event>) + Send>,
	) -> notify::Result<Box<dyn Watcher + Send>>,
) -> Result<OpenedSource, Error> {
	let (events_tx, events_rx) = chan::unbounded();

	let mut watcher = build(Box::new(move |result| {
		if events_tx.is_closed() {
			trace!("Dropping notify event for a closed source;");
			return;
		}

		// SAFETY: we are not blocking the thread as this is an unbounded channel
		if events_tx.send_blocking(result).is_err() {
			error!("Unable to forward notify event;");
		}
	}))?;

	watcher.watch(root, RecursiveMode::NonRecursive)?;

	let mut translator = NotifyTranslator::new(root.to_path_buf());

	let events = events_rx
		.flat_map(move |result| futures::stream::iter(translator.translate(result)))
		.boxed();

	Ok(OpenedSource {
		handle: Box::new(NotifySource {
			engine,
			root: root.to_path_buf(),
			watcher: Some(watcher),
		}),
		events,
	})
}

/// Stateful mapping from `notify` events to raw records.
#[derive(Debug)]
struct NotifyTranslator {
	root: PathBuf,
	sequence_id: u64,
	next_cookie: u64,
	/// Synthetic id of a `From` half still waiting for its `To`.
	open_from: Option<u64>,
}

impl NotifyTranslator {
	fn new(root: PathBuf) -> Self {
		Self {
			root,
			sequence_id: 0,
			next_cookie: 1,
			open_from: None,
		}
	}

	fn translate(&mut self, result: notify::Result<Event>) -> Vec<Result<RawEvent, Error>> {
		let event = match result {
			Ok(event) => event,
			// Scan errors for vanished children are transient; a vanished root is not
			Err(e) if self.root.exists() => {
				warn!(?e, "Ignoring notify error while the root still exists;");
				return vec![];
			}
			Err(e) => return vec![Err(Error::InternalSource(e.to_string()))],
		};

		trace!(kind = ?event.kind, paths = ?event.paths, "Received notify event;");

		if event.need_rescan() {
			return vec![Ok(self.raw(
				RawFlags::MUST_SCAN_SUBDIRS,
				self.root.clone(),
			))];
		}

		let tracker = event.attrs.tracker().map(|tracker| tracker as u64);
		let Event { kind, paths, .. } = event;

		let mut out = Vec::with_capacity(paths.len());

		match kind {
			EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
				if let [from, to] = paths.as_slice() {
					let flags = RawFlags::ITEM_RENAMED | type_bits(to, None);

					// A half that leaves the directory is reported alone and never pairs
					let raw = match (self.is_child(from), self.is_child(to)) {
						(true, true) => self
							.raw(flags, from.clone())
							.with_secondary_path(to.clone()),
						(true, false) => self
							.raw(flags, from.clone())
							.with_rename(RenameSide::From, None),
						(false, true) => self
							.raw(flags, to.clone())
							.with_rename(RenameSide::To, None),
						// The root itself or nothing of ours, `scope` sorts it out
						(false, false) => self.raw(flags, from.clone()),
					};

					out.push(raw);
				}
			}

			EventKind::Modify(ModifyKind::Name(mode)) => {
				for path in paths {
					let side = match mode {
						RenameMode::From => RenameSide::From,
						RenameMode::To => RenameSide::To,
						_ if path.exists() => RenameSide::To,
						_ => RenameSide::From,
					};

					let transaction_id = tracker.unwrap_or_else(|| self.synthetic_cookie(side));
					let flags = RawFlags::ITEM_RENAMED | type_bits(&path, None);
					out.push(
						self.raw(flags, path)
							.with_rename(side, Some(transaction_id)),
					);
				}
			}

			EventKind::Access(_) => {}

			kind => {
				let Some(flags) = flags_for(&kind) else {
					return vec![];
				};

				for path in paths {
					let flags = flags | type_bits(&path, Some(&kind));
					out.push(self.raw(flags, path));
				}
			}
		}

		out.into_iter()
			.filter_map(|raw| self.scope(raw))
			.map(Ok)
			.collect()
	}

	fn synthetic_cookie(&mut self, side: RenameSide) -> u64 {
		match side {
			RenameSide::From => {
				let cookie = self.next_cookie;
				self.next_cookie += 1;
				self.open_from = Some(cookie);
				cookie
			}
			RenameSide::To => self.open_from.take().unwrap_or_else(|| {
				let cookie = self.next_cookie;
				self.next_cookie += 1;
				cookie
			}),
		}
	}

	fn raw(&mut self, flags: RawFlags, path: PathBuf) -> RawEvent {
		self.sequence_id += 1;
		RawEvent::new(flags, path, self.sequence_id)
	}

	fn is_child(&self, path: &Path) -> bool {
		path != self.root && is_within(&self.root, path)
	}

	/// Keeps direct children and turns the root's own removal into `ROOT_CHANGED`.
	fn scope(&self, mut raw: RawEvent) -> Option<RawEvent> {
		if raw.flags.contains(RawFlags::MUST_SCAN_SUBDIRS) {
			return Some(raw);
		}

		if !is_within(&self.root, &raw.path) {
			return None;
		}

		if raw.path == self.root {
			if !raw
				.flags
				.intersects(RawFlags::ITEM_REMOVED | RawFlags::ITEM_RENAMED)
			{
				return None;
			}
			raw.flags = RawFlags::ROOT_CHANGED | RawFlags::ITEM_IS_DIR;
			raw.rename_side = None;
			raw.transaction_id = None;
			raw.secondary_path = None;
		}

		Some(raw)
	}
}

fn flags_for(kind: &EventKind) -> Option<RawFlags> {
	Some(match kind {
		EventKind::Create(_) => RawFlags::ITEM_CREATED,
		EventKind::Remove(_) => RawFlags::ITEM_REMOVED,
		EventKind::Modify(ModifyKind::Metadata(
			MetadataKind::Ownership | MetadataKind::Permissions | MetadataKind::Extended,
		)) => RawFlags::ITEM_CHANGE_OWNER,
		EventKind::Modify(_) => RawFlags::ITEM_MODIFIED,
		EventKind::Access(_) | EventKind::Any | EventKind::Other => return None,
	})
}

/// File or directory bits, from the event kind when it says, else from disk.
fn type_bits(path: &Path, kind: Option<&EventKind>) -> RawFlags {
	let is_dir = match kind {
		Some(EventKind::Create(CreateKind::Folder) | EventKind::Remove(RemoveKind::Folder)) => {
			true
		}
		Some(EventKind::Create(CreateKind::File) | EventKind::Remove(RemoveKind::File)) => false,
		_ => path.is_dir(),
	};

	if is_dir {
		RawFlags::ITEM_IS_DIR
	} else {
		RawFlags::ITEM_IS_FILE
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	use notify::event::DataChange;

	fn translator() -> NotifyTranslator {
		NotifyTranslator::new(PathBuf::from("/w"))
	}

	fn single(translator: &mut NotifyTranslator, event: Event) -> RawEvent {
		let mut out = translator.translate(Ok(event));
		assert_eq!(out.len(), 1);
		out.remove(0).unwrap()
	}

	#[test]
	fn create_and_remove() {
		let mut translator = translator();

		let created = single(
			&mut translator,
			Event::new(EventKind::Create(CreateKind::Folder)).add_path("/w/d".into()),
		);
		assert_eq!(created.flags, RawFlags::ITEM_CREATED | RawFlags::ITEM_IS_DIR);

		let removed = single(
			&mut translator,
			Event::new(EventKind::Remove(RemoveKind::Any)).add_path("/w/gone.txt".into()),
		);
		assert_eq!(removed.flags, RawFlags::ITEM_REMOVED | RawFlags::ITEM_IS_FILE);
		assert!(removed.sequence_id > created.sequence_id);
	}

	#[test]
	fn metadata_changes() {
		let mut translator = translator();

		let owner = single(
			&mut translator,
			Event::new(EventKind::Modify(ModifyKind::Metadata(MetadataKind::Ownership)))
				.add_path("/w/f".into()),
		);
		assert!(owner.flags.contains(RawFlags::ITEM_CHANGE_OWNER));

		let write_time = single(
			&mut translator,
			Event::new(EventKind::Modify(ModifyKind::Metadata(MetadataKind::WriteTime)))
				.add_path("/w/f".into()),
		);
		assert!(write_time.flags.contains(RawFlags::ITEM_MODIFIED));

		let data = single(
			&mut translator,
			Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Content)))
				.add_path("/w/f".into()),
		);
		assert!(data.flags.contains(RawFlags::ITEM_MODIFIED));
	}

	#[test]
	fn adjacent_halves_share_a_synthetic_id() {
		let mut translator = translator();

		let from = single(
			&mut translator,
			Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::From)))
				.add_path("/w/a".into()),
		);
		let to = single(
			&mut translator,
			Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::To)))
				.add_path("/w/b".into()),
		);

		assert_eq!(from.rename_side, Some(RenameSide::From));
		assert_eq!(to.rename_side, Some(RenameSide::To));
		assert!(from.transaction_id.is_some());
		assert_eq!(from.transaction_id, to.transaction_id);
	}

	#[test]
	fn tracker_wins_over_synthetic_id() {
		let mut translator = translator();

		let from = single(
			&mut translator,
			Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::From)))
				.add_path("/w/a".into())
				.set_tracker(77),
		);

		assert_eq!(from.transaction_id, Some(77));
	}

	#[test]
	fn both_mode_becomes_paired_record() {
		let mut translator = translator();

		let raw = single(
			&mut translator,
			Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
				.add_path("/w/a".into())
				.add_path("/w/b".into()),
		);

		assert!(raw.is_paired_rename());
		assert_eq!(raw.path, PathBuf::from("/w/a"));
		assert_eq!(raw.secondary_path, Some(PathBuf::from("/w/b")));
	}

	#[test]
	fn both_mode_with_one_half_outside_is_unpaired() {
		let mut translator = translator();

		let leaving = single(
			&mut translator,
			Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
				.add_path("/w/a".into())
				.add_path("/w/sub/a".into()),
		);
		assert!(!leaving.is_paired_rename());
		assert_eq!(leaving.path, PathBuf::from("/w/a"));
		assert_eq!(leaving.rename_side, Some(RenameSide::From));
		assert_eq!(leaving.transaction_id, None);
		assert_eq!(leaving.secondary_path, None);

		let arriving = single(
			&mut translator,
			Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
				.add_path("/elsewhere/b".into())
				.add_path("/w/b".into()),
		);
		assert_eq!(arriving.path, PathBuf::from("/w/b"));
		assert_eq!(arriving.rename_side, Some(RenameSide::To));
		assert_eq!(arriving.transaction_id, None);

		assert!(translator
			.translate(Ok(Event::new(EventKind::Modify(ModifyKind::Name(
				RenameMode::Both
			)))
			.add_path("/elsewhere/c".into())
			.add_path("/w/sub/c".into())))
			.is_empty());
	}

	#[test]
	fn access_and_nested_paths_are_dropped() {
		let mut translator = translator();

		assert!(translator
			.translate(Ok(Event::new(EventKind::Access(notify::event::AccessKind::Any))
				.add_path("/w/f".into())))
			.is_empty());

		assert!(translator
			.translate(Ok(Event::new(EventKind::Create(CreateKind::File))
				.add_path("/w/sub/f".into())))
			.is_empty());
	}

	#[test]
	fn root_removal_and_rescan() {
		let mut translator = translator();

		let root = single(
			&mut translator,
			Event::new(EventKind::Remove(RemoveKind::Folder)).add_path("/w".into()),
		);
		assert_eq!(root.flags, RawFlags::ROOT_CHANGED | RawFlags::ITEM_IS_DIR);

		let rescan = single(
			&mut translator,
			Event::new(EventKind::Other).set_flag(notify::event::Flag::Rescan),
		);
		assert!(rescan.flags.contains(RawFlags::MUST_SCAN_SUBDIRS));
	}

	#[test]
	fn error_with_missing_root_is_terminal() {
		let mut translator = NotifyTranslator::new(PathBuf::from("/nonexistent/dir-watcher-root"));

		let out = translator.translate(Err(notify::Error::generic("watch lost")));

		assert!(matches!(out.as_slice(), [Err(Error::InternalSource(_))]));
	}
}
