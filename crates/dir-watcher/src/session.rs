//! The watch session: lifecycle, resource ownership and serialized delivery.
//!
//! All mutable state of a session (lifecycle, source handle, callback and the
//! pipeline's pending renames) sits behind one reentrant lock. Delivery holds that
//! lock for the whole batch of events produced by a raw record, so once `close()`
//! returns no further event reaches the callback. The lock is reentrant so the
//! callback itself may call `close()`.

use crate::{
	config::{WatcherConfig, WatcherOptions},
	dispatcher,
	event::Event,
	metrics::{MetricsSnapshot, WatcherMetrics},
	pipeline::Pipeline,
	platform::{self, Engine, PlatformEventSource, RawEventStream},
	raw::RawEvent,
	Error,
};

use std::{
	cell::RefCell,
	path::{Path, PathBuf},
	sync::Arc,
	time::Instant,
};

use async_channel as chan;
use parking_lot::ReentrantMutex;
use serde::Serialize;
use tokio::{spawn, sync::watch};
use tracing::{debug, error, instrument, trace, Instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Lifecycle {
	Idle,
	Watching,
	Started,
	Closed,
}

type Callback = Arc<dyn Fn(Event) + Send + Sync>;

struct Shared {
	lifecycle: Lifecycle,
	watched_dir: Option<PathBuf>,
	source: Option<Box<dyn PlatformEventSource>>,
	/// Raw records opened by `watch()`, waiting for `start()` to pull them
	pending_events: Option<RawEventStream>,
	callback: Option<Callback>,
	pipeline: Pipeline,
	stop_tx: Option<chan::Sender<()>>,
	terminal_error: Option<Error>,
}

impl Shared {
	fn ensure_idle(&self) -> Result<(), Error> {
		match self.lifecycle {
			Lifecycle::Idle => Ok(()),
			Lifecycle::Watching | Lifecycle::Started => Err(Error::AlreadyWatching(
				self.watched_dir.clone().unwrap_or_default(),
			)),
			Lifecycle::Closed => Err(Error::Closed),
		}
	}
}

pub(crate) struct Session {
	config: WatcherConfig,
	metrics: Arc<WatcherMetrics>,
	shared: ReentrantMutex<RefCell<Shared>>,
	closed_tx: watch::Sender<bool>,
}

impl Session {
	fn new(config: WatcherConfig) -> Self {
		let metrics = Arc::new(WatcherMetrics::new());
		let (closed_tx, _) = watch::channel(false);

		Self {
			shared: ReentrantMutex::new(RefCell::new(Shared {
				lifecycle: Lifecycle::Idle,
				watched_dir: None,
				source: None,
				pending_events: None,
				callback: None,
				pipeline: Pipeline::new(
					config.coalesced_policy,
					config.correlation_window,
					Arc::clone(&metrics),
				),
				stop_tx: None,
				terminal_error: None,
			})),
			config,
			metrics,
			closed_tx,
		}
	}

	fn lifecycle(&self) -> Lifecycle {
		self.shared.lock().borrow().lifecycle
	}

	/// Runs one raw record through the pipeline and hands the results to the callback.
	pub(crate) fn deliver(&self, raw: RawEvent) {
		let guard = self.shared.lock();

		let (events, callback) = {
			let mut shared = guard.borrow_mut();
			if shared.lifecycle != Lifecycle::Started {
				return;
			}

			self.metrics.record_raw_received();
			let events = shared.pipeline.process(raw, Instant::now());
			(events, shared.callback.clone())
		};

		let Some(callback) = callback else {
			return;
		};

		for event in events {
			// The callback may have closed the session
			if guard.borrow().lifecycle != Lifecycle::Started {
				break;
			}

			trace!(
				event_type = %event.event_type(),
				path = ?event.path(),
				"Delivering event;"
			);

			callback(event);
			self.metrics.record_delivered();
		}
	}

	pub(crate) fn tick(&self) {
		let guard = self.shared.lock();
		let mut shared = guard.borrow_mut();

		if shared.lifecycle == Lifecycle::Started {
			shared.pipeline.tick(Instant::now());
		}
	}

	/// Closes the session because its source failed, keeping the error for `closed()`.
	pub(crate) fn fail(&self, e: Error) {
		let guard = self.shared.lock();

		{
			let mut shared = guard.borrow_mut();
			if shared.lifecycle == Lifecycle::Closed {
				return;
			}

			error!(?e, watched_dir = ?shared.watched_dir, "Platform event source failed;");
			shared.terminal_error = Some(e);
		}

		self.close();
	}

	fn close(&self) -> bool {
		let guard = self.shared.lock();

		let released = {
			let mut shared = guard.borrow_mut();
			if shared.lifecycle == Lifecycle::Closed {
				return false;
			}

			shared.lifecycle = Lifecycle::Closed;

			let released = shared
				.source
				.take()
				.is_some_and(|mut source| source.close());

			shared.pending_events = None;
			shared.callback = None;

			if let Some(stop_tx) = shared.stop_tx.take() {
				if stop_tx.try_send(()).is_err() {
					trace!("Dispatcher already stopped;");
				}
				stop_tx.close();
			}

			shared.pipeline.reset();

			released
		};

		self.metrics.log_metrics();
		self.closed_tx.send_replace(true);

		released
	}
}

/// One engine instance owning exactly one watch session.
///
/// Dropping a `Watcher` closes its session.
pub struct Watcher {
	session: Arc<Session>,
}

impl std::fmt::Debug for Watcher {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Watcher")
			.field("engine", &self.engine())
			.field("lifecycle", &self.lifecycle())
			.field("watched_dir", &self.watched_dir())
			.finish()
	}
}

impl Watcher {
	/// Validates `options` and selects the engine. No OS resource is acquired yet.
	pub fn create(options: WatcherOptions) -> Result<Self, Error> {
		let config = options.validate()?;

		debug!(engine = %config.engine, "Created watcher;");

		Ok(Self {
			session: Arc::new(Session::new(config)),
		})
	}

	/// Opens the platform source on `path`. Only valid while `Idle`.
	#[instrument(skip(self, path), fields(path = %path.as_ref().display(), engine = %self.engine()), err)]
	pub async fn watch(&self, path: impl AsRef<Path> + Send) -> Result<(), Error> {
		let path = path.as_ref();

		self.session.shared.lock().borrow().ensure_idle()?;

		let (root, opened) = platform::open(&self.session.config, path).await?;

		let guard = self.session.shared.lock();
		let mut shared = guard.borrow_mut();

		// Another `watch()` or a `close()` may have won while we were opening
		if let Err(e) = shared.ensure_idle() {
			let mut handle = opened.handle;
			handle.close();
			return Err(e);
		}

		debug!(root = %root.display(), "Watching directory;");

		shared.lifecycle = Lifecycle::Watching;
		shared.watched_dir = Some(root);
		shared.source = Some(opened.handle);
		shared.pending_events = Some(opened.events);

		Ok(())
	}

	/// Registers the delivery callback and starts dispatching. Only valid while `Watching`.
	#[instrument(skip_all, fields(watched_dir = ?self.watched_dir()), err)]
	pub async fn start<F>(&self, callback: F) -> Result<(), Error>
	where
		F: Fn(Event) + Send + Sync + 'static,
	{
		let guard = self.session.shared.lock();
		let mut shared = guard.borrow_mut();

		match shared.lifecycle {
			Lifecycle::Idle => return Err(Error::NotWatching),
			Lifecycle::Started => return Err(Error::AlreadyStarted),
			Lifecycle::Closed => return Err(Error::Closed),
			Lifecycle::Watching => {}
		}

		let events = shared
			.pending_events
			.take()
			.ok_or_else(|| Error::InternalSource("event stream already taken".to_string()))?;

		let (stop_tx, stop_rx) = chan::bounded(1);

		shared.callback = Some(Arc::new(callback));
		shared.stop_tx = Some(stop_tx);
		shared.lifecycle = Lifecycle::Started;

		spawn(
			dispatcher::run(Arc::clone(&self.session), events, stop_rx).in_current_span(),
		);

		debug!("Started dispatching events;");

		Ok(())
	}

	/// Releases the source and moves to `Closed`.
	///
	/// Returns `true` only when a live source was released by this call.
	#[instrument(skip(self), fields(watched_dir = ?self.watched_dir()))]
	pub fn close(&self) -> bool {
		self.session.close()
	}

	/// Resolves once the session is closed, with the source failure that closed it, if any.
	pub async fn closed(&self) -> Option<Error> {
		let mut closed_rx = self.session.closed_tx.subscribe();

		// The sender lives as long as the session we hold
		if closed_rx.wait_for(|closed| *closed).await.is_err() {
			trace!("Closed channel dropped;");
		}

		self.session.shared.lock().borrow().terminal_error.clone()
	}

	#[must_use]
	pub fn lifecycle(&self) -> Lifecycle {
		self.session.lifecycle()
	}

	#[must_use]
	pub fn watched_dir(&self) -> Option<PathBuf> {
		self.session.shared.lock().borrow().watched_dir.clone()
	}

	#[must_use]
	pub fn engine(&self) -> Engine {
		self.session.config.engine
	}

	#[must_use]
	pub fn metrics(&self) -> MetricsSnapshot {
		self.session.metrics.snapshot()
	}
}

impl Drop for Watcher {
	fn drop(&mut self) {
		self.session.close();
	}
}
