//! Watcher options
//!
//! Everything is optional so bindings can pass a partially filled object straight
//! through serde. Validation happens once, in [`WatcherOptions::validate`].

use crate::{platform::Engine, quirk::CoalescedPolicy, Error};

use std::{str::FromStr, time::Duration};

use serde::{Deserialize, Serialize};

const DEFAULT_CORRELATION_WINDOW_MS: u64 = 100;
const DEFAULT_POLL_INTERVAL_MS: u64 = 250;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WatcherOptions {
	/// Engine name, overriding the host default.
	pub force_engine: Option<String>,
	/// How long one half of a rename waits for its counterpart.
	pub correlation_window_ms: u64,
	/// What to emit for a record flagged as both created and removed.
	pub coalesced_policy: CoalescedPolicy,
	/// Period of the `poll` engine.
	pub poll_interval_ms: u64,
	/// FSEvents latency; ignored elsewhere.
	pub latency_ms: u64,
}

impl Default for WatcherOptions {
	fn default() -> Self {
		Self {
			force_engine: None,
			correlation_window_ms: DEFAULT_CORRELATION_WINDOW_MS,
			coalesced_policy: CoalescedPolicy::default(),
			poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
			latency_ms: 0,
		}
	}
}

impl WatcherOptions {
	#[must_use]
	pub fn with_engine(mut self, engine: impl Into<String>) -> Self {
		self.force_engine = Some(engine.into());
		self
	}

	#[must_use]
	pub fn with_correlation_window(mut self, window: Duration) -> Self {
		self.correlation_window_ms = whole_millis(window);
		self
	}

	#[must_use]
	pub const fn with_coalesced_policy(mut self, policy: CoalescedPolicy) -> Self {
		self.coalesced_policy = policy;
		self
	}

	#[must_use]
	pub fn with_poll_interval(mut self, interval: Duration) -> Self {
		self.poll_interval_ms = whole_millis(interval);
		self
	}

	/// Checks every field and resolves the engine to run.
	pub fn validate(&self) -> Result<WatcherConfig, Error> {
		if self.correlation_window_ms == 0 {
			return Err(Error::InvalidOptions(
				"correlationWindowMs must be greater than zero".to_string(),
			));
		}

		if self.poll_interval_ms == 0 {
			return Err(Error::InvalidOptions(
				"pollIntervalMs must be greater than zero".to_string(),
			));
		}

		let engine = match self.force_engine.as_deref() {
			None => Engine::host_default(),
			Some(name) => Engine::from_str(name.trim())
				.ok()
				.filter(|engine| engine.is_available())
				.ok_or_else(|| Error::EngineUnavailable(name.to_string()))?,
		};

		Ok(WatcherConfig {
			engine,
			correlation_window: Duration::from_millis(self.correlation_window_ms),
			coalesced_policy: self.coalesced_policy,
			poll_interval: Duration::from_millis(self.poll_interval_ms),
			latency: Duration::from_millis(self.latency_ms),
		})
	}
}

/// Rounds up to whole milliseconds so a non-zero duration never becomes zero.
fn whole_millis(duration: Duration) -> u64 {
	u64::try_from(duration.as_nanos().div_ceil(1_000_000)).unwrap_or(u64::MAX)
}

/// Validated form of [`WatcherOptions`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatcherConfig {
	pub engine: Engine,
	pub correlation_window: Duration,
	pub coalesced_policy: CoalescedPolicy,
	pub poll_interval: Duration,
	pub latency: Duration,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn defaults() {
		let config = WatcherOptions::default().validate().unwrap();
		assert_eq!(config.engine, Engine::host_default());
		assert_eq!(config.correlation_window, Duration::from_millis(100));
		assert_eq!(config.coalesced_policy, CoalescedPolicy::DeleteOnly);
	}

	#[test]
	fn sub_millisecond_durations_round_up() {
		let options = WatcherOptions::default()
			.with_correlation_window(Duration::from_micros(300))
			.with_poll_interval(Duration::from_micros(1_500));

		assert_eq!(options.correlation_window_ms, 1);
		assert_eq!(options.poll_interval_ms, 2);
		assert!(options.validate().is_ok());

		let zero = WatcherOptions::default().with_correlation_window(Duration::ZERO);
		assert!(matches!(zero.validate(), Err(Error::InvalidOptions(_))));

		let huge = WatcherOptions::default().with_poll_interval(Duration::MAX);
		assert_eq!(huge.poll_interval_ms, u64::MAX);
	}

	#[test]
	fn deserializes_partial_camel_case() {
		let options: WatcherOptions = serde_json::from_str(
			r#"{ "forceEngine": "POLL", "coalescedPolicy": "create_then_delete" }"#,
		)
		.unwrap();

		assert_eq!(options.correlation_window_ms, DEFAULT_CORRELATION_WINDOW_MS);

		let config = options.validate().unwrap();
		assert_eq!(config.engine, Engine::Poll);
		assert_eq!(config.coalesced_policy, CoalescedPolicy::CreateThenDelete);
	}

	#[test]
	fn unknown_engine_is_unavailable() {
		let err = WatcherOptions::default()
			.with_engine("kqueue")
			.validate()
			.unwrap_err();
		assert!(matches!(err, Error::EngineUnavailable(name) if name == "kqueue"));
	}

	#[test]
	fn foreign_engine_is_unavailable() {
		#[cfg(any(target_os = "linux", target_os = "android"))]
		let foreign = "fsevents";
		#[cfg(not(any(target_os = "linux", target_os = "android")))]
		let foreign = "inotify";

		assert!(matches!(
			WatcherOptions::default().with_engine(foreign).validate(),
			Err(Error::EngineUnavailable(_))
		));
	}

	#[test]
	fn zero_window_is_rejected() {
		assert!(matches!(
			WatcherOptions::default()
				.with_correlation_window(Duration::ZERO)
				.validate(),
			Err(Error::InvalidOptions(_))
		));
	}
}
