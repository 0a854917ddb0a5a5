use std::{io, path::PathBuf};

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum Error {
	#[error("ENOENT: no such file or directory, watch '{}'", .0.display())]
	NotFound(PathBuf),
	#[error("already watching '{}'", .0.display())]
	AlreadyWatching(PathBuf),
	#[error("no directory is being watched, call watch() before start()")]
	NotWatching,
	#[error("listener has already started")]
	AlreadyStarted,
	#[error("the watcher session is closed")]
	Closed,
	#[error("engine '{0}' is not available on this platform")]
	EngineUnavailable(String),
	#[error("invalid watcher options: {0}")]
	InvalidOptions(String),
	#[error("event source failure: {0}")]
	InternalSource(String),
}

impl Error {
	/// Stable code for bindings that can't match on the enum.
	#[must_use]
	pub const fn code(&self) -> &'static str {
		match self {
			Self::NotFound(_) => "ENOENT",
			Self::AlreadyWatching(_) => "EALREADYWATCHING",
			Self::NotWatching => "ENOTWATCHING",
			Self::AlreadyStarted => "EALREADYSTARTED",
			Self::Closed => "ECLOSED",
			Self::EngineUnavailable(_) => "ENOENGINE",
			Self::InvalidOptions(_) => "EINVAL",
			Self::InternalSource(_) => "ESOURCE",
		}
	}

	/// Maps an OS error raised while setting up a watch on `path`.
	pub(crate) fn from_setup_io(path: impl Into<PathBuf>, e: &io::Error) -> Self {
		if e.kind() == io::ErrorKind::NotFound {
			Self::NotFound(path.into())
		} else {
			Self::InternalSource(format!("{e}"))
		}
	}
}

impl From<notify::Error> for Error {
	fn from(e: notify::Error) -> Self {
		match e.kind {
			notify::ErrorKind::PathNotFound => match e.paths.into_iter().next() {
				Some(path) => Self::NotFound(path),
				None => Self::InternalSource("watched path not found".to_string()),
			},
			notify::ErrorKind::Io(ref io_err) if io_err.kind() == io::ErrorKind::NotFound => {
				match e.paths.first() {
					Some(path) => Self::NotFound(path.clone()),
					None => Self::InternalSource(e.to_string()),
				}
			}
			_ => Self::InternalSource(e.to_string()),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn not_found_is_distinguishable() {
		let e = Error::NotFound(PathBuf::from("/nonexistent"));
		assert_eq!(e.code(), "ENOENT");
		assert!(e.to_string().starts_with("ENOENT"));
	}

	#[test]
	fn already_started_message() {
		assert!(Error::AlreadyStarted.to_string().contains("already started"));
	}

	#[test]
	fn setup_io_mapping() {
		let missing = io::Error::from(io::ErrorKind::NotFound);
		assert!(matches!(
			Error::from_setup_io("/a", &missing),
			Error::NotFound(p) if p == PathBuf::from("/a")
		));

		let denied = io::Error::from(io::ErrorKind::PermissionDenied);
		assert!(matches!(
			Error::from_setup_io("/a", &denied),
			Error::InternalSource(_)
		));
	}

	#[test]
	fn notify_path_not_found() {
		let e = notify::Error::path_not_found().add_path(PathBuf::from("/gone"));
		assert!(matches!(Error::from(e), Error::NotFound(p) if p == PathBuf::from("/gone")));
	}
}
