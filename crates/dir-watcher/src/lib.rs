//!
//! # Dir Watcher
//!
//! Watches a single directory and reports its changes as one normalized stream of
//! events, whatever the OS notification facility underneath.
//!
//! Each platform source (inotify, FSEvents, `ReadDirectoryChangesW` or polling)
//! translates its native records into one flag vocabulary. From there every record
//! goes through the same pipeline:
//! - a quirk filter that resolves contradictory records, like the create+remove
//!   pair FSEvents coalesces for short-lived files;
//! - a normalizer that picks exactly one event type by a fixed priority order;
//! - a correlator that pairs both halves of a rename into an extra `move` event.
//!
//! A [`Watcher`] owns exactly one watch session, which moves through
//! `Idle -> Watching -> Started -> Closed` and never back.
//!
//! ## Basic example
//!
//! ```no_run
//! use sd_dir_watcher::{Watcher, WatcherOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), sd_dir_watcher::Error> {
//!     let watcher = Watcher::create(WatcherOptions::default())?;
//!
//!     watcher.watch("/tmp/some-dir").await?;
//!     watcher
//!         .start(|event| println!("{} {:?}", event.event_type(), event.path()))
//!         .await?;
//!
//!     tokio::time::sleep(std::time::Duration::from_secs(10)).await;
//!
//!     assert!(watcher.close());
//!
//!     Ok(())
//! }
//! ```

#![warn(
	clippy::all,
	clippy::pedantic,
	clippy::correctness,
	clippy::perf,
	clippy::style,
	clippy::suspicious,
	clippy::complexity,
	clippy::nursery,
	clippy::unwrap_used,
	unused_qualifications,
	rust_2018_idioms,
	trivial_casts,
	trivial_numeric_casts,
	unused_allocation,
	clippy::unnecessary_cast,
	clippy::cast_lossless,
	clippy::cast_possible_truncation,
	clippy::cast_possible_wrap,
	clippy::cast_precision_loss,
	clippy::cast_sign_loss,
	clippy::dbg_macro,
	clippy::deprecated_cfg_attr,
	clippy::separated_literal_suffix,
	deprecated
)]
#![forbid(deprecated_in_future)]
#![allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]

mod config;
mod correlator;
mod dispatcher;
mod error;
mod event;
mod metrics;
mod normalizer;
mod pipeline;
mod platform;
mod quirk;
mod raw;
mod session;

pub use config::{WatcherConfig, WatcherOptions};
pub use correlator::{PendingRename, RenamePairCorrelator};
pub use error::Error;
pub use event::{Event, EventType, Target, TargetKind};
pub use metrics::{MetricsSnapshot, WatcherMetrics};
pub use normalizer::{normalize, resolve};
pub use pipeline::Pipeline;
pub use platform::Engine;
pub use quirk::{CoalescedPolicy, QuirkFilter};
pub use raw::{RawEvent, RawFlags, RenameSide};
pub use session::{Lifecycle, Watcher};
