//! Canonical events handed to the registered callback.

use std::path::{Path, PathBuf};

use serde::Serialize;

/// The closed set of event kinds this crate ever surfaces.
#[derive(
	Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EventType {
	Create,
	Delete,
	Modify,
	MovedFrom,
	MovedTo,
	Move,
	Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TargetKind {
	File,
	Directory,
}

impl TargetKind {
	#[must_use]
	pub const fn from_is_dir(is_dir: bool) -> Self {
		if is_dir {
			Self::Directory
		} else {
			Self::File
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Target {
	pub path: PathBuf,
	pub kind: TargetKind,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub previous_path: Option<PathBuf>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub new_path: Option<PathBuf>,
}

impl Target {
	fn new(path: PathBuf, kind: TargetKind) -> Self {
		Self {
			path,
			kind,
			previous_path: None,
			new_path: None,
		}
	}
}

/// One normalized change notification.
///
/// Constructors are the only way to build one, which keeps `previous_path` set
/// exactly for `move`/`moved_from` and `new_path` exactly for `move`/`moved_to`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
	event_type: EventType,
	#[serde(skip_serializing_if = "Option::is_none")]
	target: Option<Target>,
}

impl Event {
	pub fn create(path: impl Into<PathBuf>, kind: TargetKind) -> Self {
		Self::simple(EventType::Create, path.into(), kind)
	}

	pub fn delete(path: impl Into<PathBuf>, kind: TargetKind) -> Self {
		Self::simple(EventType::Delete, path.into(), kind)
	}

	pub fn modify(path: impl Into<PathBuf>, kind: TargetKind) -> Self {
		Self::simple(EventType::Modify, path.into(), kind)
	}

	pub fn moved_from(path: impl Into<PathBuf>, kind: TargetKind) -> Self {
		let path = path.into();
		let mut target = Target::new(path.clone(), kind);
		target.previous_path = Some(path);
		Self {
			event_type: EventType::MovedFrom,
			target: Some(target),
		}
	}

	pub fn moved_to(path: impl Into<PathBuf>, kind: TargetKind) -> Self {
		let path = path.into();
		let mut target = Target::new(path.clone(), kind);
		target.new_path = Some(path);
		Self {
			event_type: EventType::MovedTo,
			target: Some(target),
		}
	}

	/// A coalesced rename; `path` is where the item lives now.
	pub fn moved(from: impl Into<PathBuf>, to: impl Into<PathBuf>, kind: TargetKind) -> Self {
		let to = to.into();
		let mut target = Target::new(to.clone(), kind);
		target.previous_path = Some(from.into());
		target.new_path = Some(to);
		Self {
			event_type: EventType::Move,
			target: Some(target),
		}
	}

	pub fn unknown(target: Option<(PathBuf, TargetKind)>) -> Self {
		Self {
			event_type: EventType::Unknown,
			target: target.map(|(path, kind)| Target::new(path, kind)),
		}
	}

	fn simple(event_type: EventType, path: PathBuf, kind: TargetKind) -> Self {
		Self {
			event_type,
			target: Some(Target::new(path, kind)),
		}
	}

	#[must_use]
	pub const fn event_type(&self) -> EventType {
		self.event_type
	}

	#[must_use]
	pub const fn target(&self) -> Option<&Target> {
		self.target.as_ref()
	}

	#[must_use]
	pub fn path(&self) -> Option<&Path> {
		self.target.as_ref().map(|target| target.path.as_path())
	}

	#[must_use]
	pub fn previous_path(&self) -> Option<&Path> {
		self.target.as_ref()?.previous_path.as_deref()
	}

	#[must_use]
	pub fn new_path(&self) -> Option<&Path> {
		self.target.as_ref()?.new_path.as_deref()
	}

	#[must_use]
	pub fn kind(&self) -> Option<TargetKind> {
		self.target.as_ref().map(|target| target.kind)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	use serde_json::json;

	#[test]
	fn event_type_names() {
		assert_eq!(EventType::MovedFrom.to_string(), "moved_from");
		assert_eq!(EventType::Move.to_string(), "move");
		assert_eq!("moved_to".parse::<EventType>().ok(), Some(EventType::MovedTo));
	}

	#[test]
	fn move_serializes_both_paths() {
		let event = Event::moved("/w/a.txt", "/w/b.txt", TargetKind::File);

		assert_eq!(
			serde_json::to_value(&event).unwrap(),
			json!({
				"eventType": "move",
				"target": {
					"path": "/w/b.txt",
					"kind": "file",
					"previousPath": "/w/a.txt",
					"newPath": "/w/b.txt",
				}
			})
		);
	}

	#[test]
	fn side_events_carry_one_path() {
		let from = Event::moved_from("/w/a", TargetKind::Directory);
		assert_eq!(from.previous_path(), Some(Path::new("/w/a")));
		assert_eq!(from.new_path(), None);

		let to = Event::moved_to("/w/b", TargetKind::Directory);
		assert_eq!(to.previous_path(), None);
		assert_eq!(to.new_path(), Some(Path::new("/w/b")));
	}

	#[test]
	fn unknown_may_omit_target() {
		let event = Event::unknown(None);
		assert_eq!(
			serde_json::to_value(&event).unwrap(),
			json!({ "eventType": "unknown" })
		);
	}

	#[test]
	fn plain_events_have_no_rename_paths() {
		let event = Event::create("/w/new.txt", TargetKind::File);
		assert_eq!(
			serde_json::to_value(&event).unwrap(),
			json!({ "eventType": "create", "target": { "path": "/w/new.txt", "kind": "file" } })
		);
	}
}
