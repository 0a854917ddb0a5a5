//! Raw records as produced by a platform source, before any normalization.
//!
//! Every backend translates its native mask into [`RawFlags`] inside the source
//! itself. The bit values follow the FSEvents `kFSEventStreamEventFlag*` constants,
//! so the macOS backend passes the kernel's bits through untouched while inotify
//! and notify translate theirs.

use std::path::PathBuf;

use bitflags::bitflags;

bitflags! {
	#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
	pub struct RawFlags: u32 {
		const MUST_SCAN_SUBDIRS = 0x0000_0001;
		const USER_DROPPED = 0x0000_0002;
		const KERNEL_DROPPED = 0x0000_0004;
		const ROOT_CHANGED = 0x0000_0020;
		const ITEM_CREATED = 0x0000_0100;
		const ITEM_REMOVED = 0x0000_0200;
		const ITEM_INODE_META_MOD = 0x0000_0400;
		const ITEM_RENAMED = 0x0000_0800;
		const ITEM_MODIFIED = 0x0000_1000;
		const ITEM_FINDER_INFO_MOD = 0x0000_2000;
		const ITEM_CHANGE_OWNER = 0x0000_4000;
		const ITEM_XATTR_MOD = 0x0000_8000;
		const ITEM_IS_FILE = 0x0001_0000;
		const ITEM_IS_DIR = 0x0002_0000;
		const ITEM_IS_SYMLINK = 0x0004_0000;
		const ITEM_CLONED = 0x0040_0000;
	}
}

impl RawFlags {
	/// Bits describing what the item is, as opposed to what happened to it.
	pub const ITEM_TYPE: Self = Self::ITEM_IS_FILE
		.union(Self::ITEM_IS_DIR)
		.union(Self::ITEM_IS_SYMLINK);

	/// Owner, mode, timestamp and extended attribute changes.
	pub const ITEM_METADATA: Self = Self::ITEM_CHANGE_OWNER
		.union(Self::ITEM_INODE_META_MOD)
		.union(Self::ITEM_XATTR_MOD)
		.union(Self::ITEM_FINDER_INFO_MOD);

	#[must_use]
	pub const fn is_dir(self) -> bool {
		self.contains(Self::ITEM_IS_DIR)
	}
}

/// Which half of a rename a record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenameSide {
	/// The path the item was renamed away from.
	From,
	/// The path the item was renamed to.
	To,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
	pub flags: RawFlags,
	/// Absolute path of the item the record is about.
	pub path: PathBuf,
	/// Destination path, set only by sources that report both rename halves in one record.
	pub secondary_path: Option<PathBuf>,
	/// Rename cookie or inode linking the two halves of one rename.
	pub transaction_id: Option<u64>,
	/// Set on `ITEM_RENAMED` records when the source knows which half it saw.
	pub rename_side: Option<RenameSide>,
	pub sequence_id: u64,
}

impl RawEvent {
	pub fn new(flags: RawFlags, path: impl Into<PathBuf>, sequence_id: u64) -> Self {
		Self {
			flags,
			path: path.into(),
			secondary_path: None,
			transaction_id: None,
			rename_side: None,
			sequence_id,
		}
	}

	#[must_use]
	pub fn with_rename(mut self, side: RenameSide, transaction_id: Option<u64>) -> Self {
		self.rename_side = Some(side);
		self.transaction_id = transaction_id;
		self
	}

	#[must_use]
	pub fn with_secondary_path(mut self, path: impl Into<PathBuf>) -> Self {
		self.secondary_path = Some(path.into());
		self
	}

	/// A rename record that already carries both the source and the destination.
	#[must_use]
	pub fn is_paired_rename(&self) -> bool {
		self.flags.contains(RawFlags::ITEM_RENAMED)
			&& self.rename_side.is_none()
			&& self.secondary_path.is_some()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn fsevents_bits_round_trip() {
		// The coalesced create+remove record FSEvents emits for `touch x && rm x`.
		let flags = RawFlags::from_bits_truncate(0x0001_0300);
		assert!(flags.contains(RawFlags::ITEM_CREATED | RawFlags::ITEM_REMOVED));
		assert!(flags.contains(RawFlags::ITEM_IS_FILE));
		assert!(!flags.is_dir());
	}

	#[test]
	fn paired_rename_detection() {
		let raw = RawEvent::new(RawFlags::ITEM_RENAMED, "/w/a", 1).with_secondary_path("/w/b");
		assert!(raw.is_paired_rename());

		let half = RawEvent::new(RawFlags::ITEM_RENAMED, "/w/a", 2)
			.with_rename(RenameSide::From, Some(7));
		assert!(!half.is_paired_rename());
	}
}
