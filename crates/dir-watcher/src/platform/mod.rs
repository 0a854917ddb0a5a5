//! Platform event sources.
//!
//! Each backend wraps one native notification facility for a single directory and
//! translates its native records into [`RawEvent`]s. Callers only ever see an
//! [`OpenedSource`]: a closable handle plus a lazy stream of raw records.

use crate::{config::WatcherConfig, raw::RawEvent, Error};

use std::path::{Path, PathBuf};

use futures::stream::BoxStream;
use tokio::fs;
use tracing::{debug, instrument};

#[cfg(any(target_os = "linux", target_os = "android"))]
mod linux;

#[cfg(target_os = "macos")]
mod macos;

mod generic;

/// Native notification facility backing a session.
#[derive(
	Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString, strum::EnumIter,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Engine {
	Inotify,
	#[strum(serialize = "fsevents")]
	FsEvents,
	#[strum(serialize = "readdirectorychangesw")]
	ReadDirectoryChanges,
	Poll,
}

impl Engine {
	/// The engine used when no `forceEngine` option is given.
	#[must_use]
	pub const fn host_default() -> Self {
		if cfg!(any(target_os = "linux", target_os = "android")) {
			Self::Inotify
		} else if cfg!(target_os = "macos") {
			Self::FsEvents
		} else if cfg!(windows) {
			Self::ReadDirectoryChanges
		} else {
			Self::Poll
		}
	}

	/// Whether this build can run the engine on the current host.
	#[must_use]
	pub const fn is_available(self) -> bool {
		match self {
			Self::Inotify => cfg!(any(target_os = "linux", target_os = "android")),
			Self::FsEvents => cfg!(target_os = "macos"),
			Self::ReadDirectoryChanges => cfg!(windows),
			Self::Poll => true,
		}
	}
}

/// Live OS-level resource behind an open source.
pub trait PlatformEventSource: Send {
	fn engine(&self) -> Engine;

	/// Releases the OS resource. Returns `false` if it was already released.
	fn close(&mut self) -> bool;
}

pub type RawEventStream = BoxStream<'static, Result<RawEvent, Error>>;

pub struct OpenedSource {
	pub handle: Box<dyn PlatformEventSource>,
	pub events: RawEventStream,
}

impl std::fmt::Debug for OpenedSource {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("OpenedSource")
			.field("engine", &self.handle.engine())
			.finish_non_exhaustive()
	}
}

/// Opens the configured engine on `dir`, returning the canonical root and the source.
#[instrument(skip(config), fields(engine = %config.engine), err)]
pub async fn open(config: &WatcherConfig, dir: &Path) -> Result<(PathBuf, OpenedSource), Error> {
	let metadata = fs::metadata(dir)
		.await
		.map_err(|e| Error::from_setup_io(dir, &e))?;

	if !metadata.is_dir() {
		return Err(Error::NotFound(dir.to_path_buf()));
	}

	let root = fs::canonicalize(dir)
		.await
		.map_err(|e| Error::from_setup_io(dir, &e))?;

	let source = match config.engine {
		#[cfg(any(target_os = "linux", target_os = "android"))]
		Engine::Inotify => linux::open(&root)?,

		#[cfg(target_os = "macos")]
		Engine::FsEvents => macos::open(&root, config.latency)?,

		#[cfg(windows)]
		Engine::ReadDirectoryChanges => generic::open_recommended(&root)?,

		Engine::Poll => generic::open_poll(&root, config.poll_interval)?,

		#[allow(unreachable_patterns)]
		engine => return Err(Error::EngineUnavailable(engine.to_string())),
	};

	debug!(root = %root.display(), "Opened platform event source;");

	Ok((root, source))
}

/// Whether `path` is the watched root itself or one of its direct children.
fn is_within(root: &Path, path: &Path) -> bool {
	path == root || path.parent() == Some(root)
}
