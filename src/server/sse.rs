//! Event stream transport for a single run.

use std::convert::Infallible;
use std::time::Duration;

use axum::response::sse::{Event, KeepAlive, KeepAliveStream, Sse};
use futures::Stream;
use futures::stream::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::DropGuard;

use crate::scaffold::GenerationEvent;

/// Interval between keep-alive comments on an idle stream.
pub const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Frame one event: the SSE event name is the event kind, the data its JSON.
pub fn to_sse_event(event: &GenerationEvent) -> Event {
    match Event::default().event(event.kind()).json_data(event) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::warn!(error = %e, kind = event.kind(), "Failed to serialize event");
            Event::default()
                .event("error")
                .data(r#"{"type":"error","data":{"message":"Internal event encoding error","kind":"other"}}"#)
        }
    }
}

/// Stream the run's events up to and including the terminal one.
///
/// `guard` cancels the run if the stream is dropped before the terminal
/// event, which is what happens when the client disconnects.
pub fn event_stream(
    rx: mpsc::UnboundedReceiver<GenerationEvent>,
    guard: DropGuard,
) -> impl Stream<Item = Result<Event, Infallible>> + Send + 'static {
    async_stream::stream! {
        let mut guard = Some(guard);
        let mut events = UnboundedReceiverStream::new(rx);
        while let Some(event) = events.next().await {
            let terminal = event.is_terminal();
            if terminal {
                if let Some(guard) = guard.take() {
                    guard.disarm();
                }
            }
            yield Ok(to_sse_event(&event));
            if terminal {
                break;
            }
        }
    }
}

/// Wrap an event stream with the keep-alive policy.
pub fn into_sse<S>(stream: S) -> Sse<KeepAliveStream<S>>
where
    S: Stream<Item = Result<Event, Infallible>> + Send + 'static,
{
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(KEEP_ALIVE_INTERVAL)
            .text("keep-alive"),
    )
}
