use crate::{platform::RawEventStream, raw::RawEvent, session::Session, Error};

use std::{pin::pin, sync::Arc, time::Duration};

use async_channel as chan;
use futures::{stream, StreamExt};
use futures_concurrency::stream::Merge;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_stream::wrappers::IntervalStream;
use tracing::{debug, trace};

const HUNDRED_MILLIS: Duration = Duration::from_millis(100);

/// Pulls raw records off the source and feeds them to the session one at a time,
/// ticking the rename correlator in between.
pub(crate) async fn run(
	session: Arc<Session>,
	events: RawEventStream,
	stop_rx: chan::Receiver<()>,
) {
	enum StreamMessage {
		NewEvent(Result<RawEvent, Error>),
		SourceEnded,
		Tick,
		Stop,
	}

	let mut correlator_tick_interval = interval_at(Instant::now() + HUNDRED_MILLIS, HUNDRED_MILLIS);
	// In case of doubt check: https://docs.rs/tokio/latest/tokio/time/enum.MissedTickBehavior.html
	correlator_tick_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

	let mut msg_stream = pin!((
		events
			.map(StreamMessage::NewEvent)
			.chain(stream::once(async { StreamMessage::SourceEnded })),
		IntervalStream::new(correlator_tick_interval).map(|_| StreamMessage::Tick),
		stop_rx.map(|()| StreamMessage::Stop),
	)
		.merge());

	while let Some(msg) = msg_stream.next().await {
		match msg {
			StreamMessage::NewEvent(Ok(raw)) => session.deliver(raw),

			StreamMessage::NewEvent(Err(e)) => {
				session.fail(e);
				break;
			}

			StreamMessage::SourceEnded => {
				session.fail(Error::InternalSource(
					"platform event source ended unexpectedly".to_string(),
				));
				break;
			}

			StreamMessage::Tick => session.tick(),

			StreamMessage::Stop => {
				debug!("Stopping event dispatcher;");
				break;
			}
		}
	}

	trace!("Event dispatcher finished;");
}
