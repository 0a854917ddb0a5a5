//! FSEvents source
//!
//! FSEvents is recursive and reports both halves of a rename as plain
//! `ItemRenamed` records with no side attached. The side is recovered by checking
//! whether the path still exists, and the inode (extended data) links the halves.
//! Kernel flag bits already use the shared vocabulary and pass through as is.

use crate::{
	raw::{RawEvent, RawFlags, RenameSide},
	Error,
};

use super::{is_within, Engine, OpenedSource, PlatformEventSource};

use std::{
	path::{Path, PathBuf},
	time::Duration,
};

use fsevent_stream::{
	ffi::{
		kFSEventStreamCreateFlagFileEvents, kFSEventStreamCreateFlagNoDefer,
		kFSEventStreamCreateFlagUseCFTypes, kFSEventStreamCreateFlagUseExtendedData,
		kFSEventStreamCreateFlagWatchRoot, kFSEventStreamEventIdSinceNow,
	},
	stream::{create_event_stream, EventStreamHandler},
};
use futures::StreamExt;
use tokio::fs;
use tracing::trace;

struct FsEventsSource {
	handler: Option<EventStreamHandler>,
}

impl PlatformEventSource for FsEventsSource {
	fn engine(&self) -> Engine {
		Engine::FsEvents
	}

	fn close(&mut self) -> bool {
		self.handler.take().map_or(false, |mut handler| {
			handler.abort();
			true
		})
	}
}

pub(super) fn open(root: &Path, latency: Duration) -> Result<OpenedSource, Error> {
	let (stream, handler) = create_event_stream(
		[root],
		kFSEventStreamEventIdSinceNow,
		latency,
		kFSEventStreamCreateFlagNoDefer
			| kFSEventStreamCreateFlagFileEvents
			| kFSEventStreamCreateFlagUseExtendedData
			| kFSEventStreamCreateFlagUseCFTypes
			| kFSEventStreamCreateFlagWatchRoot,
	)
	.map_err(|e| Error::from_setup_io(root, &e))?;

	let root = root.to_path_buf();

	let events = stream
		.into_flatten()
		.filter_map(move |event| {
			let root = root.clone();
			async move {
				trace!(
					id = event.id,
					path = %event.path.display(),
					raw_flags = event.raw_flags,
					"Received FSEvents record;"
				);

				translate(
					&root,
					RawFlags::from_bits_truncate(event.raw_flags),
					event.path,
					event.inode,
					event.id,
				)
				.await
				.map(Ok)
			}
		})
		.boxed();

	Ok(OpenedSource {
		handle: Box::new(FsEventsSource {
			handler: Some(handler),
		}),
		events,
	})
}

async fn translate(
	root: &Path,
	mut flags: RawFlags,
	path: PathBuf,
	inode: Option<i64>,
	sequence_id: u64,
) -> Option<RawEvent> {
	if flags.contains(RawFlags::MUST_SCAN_SUBDIRS) {
		return Some(RawEvent::new(flags, root, sequence_id));
	}

	// Grandchildren show up because the stream is recursive
	if !is_within(root, &path) {
		return None;
	}

	if path == root {
		let root_gone = flags.intersects(
			RawFlags::ROOT_CHANGED | RawFlags::ITEM_REMOVED | RawFlags::ITEM_RENAMED,
		);
		return root_gone.then(|| {
			RawEvent::new(
				RawFlags::ROOT_CHANGED | RawFlags::ITEM_IS_DIR,
				path,
				sequence_id,
			)
		});
	}

	if !flags.contains(RawFlags::ITEM_RENAMED) {
		return Some(RawEvent::new(flags, path, sequence_id));
	}

	let side = if fs::symlink_metadata(&path).await.is_ok() {
		RenameSide::To
	} else {
		RenameSide::From
	};

	// A rename of an already coalesced path may also carry the creation bit
	if side == RenameSide::From {
		flags.remove(RawFlags::ITEM_CREATED);
	}

	let transaction_id = inode.and_then(|inode| u64::try_from(inode).ok());

	Some(RawEvent::new(flags, path, sequence_id).with_rename(side, transaction_id))
}
