//! Server-sent event stream over the pipeline event bus.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::HeaderMap,
    response::sse::{self, Sse},
};
use tokio_stream::{Stream, StreamExt};
use tracewarden_events::{EventBus, EventEnvelope, EventId};
use tracing::{debug, error};

use crate::http::constants::{HEADER_LAST_EVENT_ID, SSE_KEEP_ALIVE_SECS};
use crate::state::ApiState;

pub(crate) async fn stream_events(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
) -> Sse<impl Stream<Item = Result<sse::Event, Infallible>> + Send> {
    let last_id = headers
        .get(HEADER_LAST_EVENT_ID)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<EventId>().ok());

    let events = event_replay_stream(state.controller.context().events(), last_id)
        .filter_map(|envelope| to_sse_event(&envelope).map(Ok));

    Sse::new(events).keep_alive(
        sse::KeepAlive::new()
            .interval(Duration::from_secs(SSE_KEEP_ALIVE_SECS))
            .text("keep-alive"),
    )
}

/// Backlog after `since` (when given) followed by live events, without duplicates.
pub(crate) fn event_replay_stream(
    bus: &EventBus,
    since: Option<EventId>,
) -> impl Stream<Item = EventEnvelope> + Send + use<> {
    // Subscribe before reading the backlog so nothing published in between is lost.
    let live = bus.subscribe();
    let backlog = since.map(|id| bus.backlog_since(id)).unwrap_or_default();
    let mut high_water = backlog.last().map(|env| env.id).or(since).unwrap_or(0);

    let live = live.filter_map(move |result| match result {
        Ok(envelope) if envelope.id > high_water => {
            high_water = envelope.id;
            Some(envelope)
        }
        Ok(_) => None,
        Err(err) => {
            debug!(error = %err, "event subscriber lagged; skipping missed events");
            None
        }
    });
    tokio_stream::iter(backlog).chain(live)
}

fn to_sse_event(envelope: &EventEnvelope) -> Option<sse::Event> {
    match serde_json::to_string(envelope) {
        Ok(payload) => Some(
            sse::Event::default()
                .id(envelope.id.to_string())
                .event(envelope.event.kind())
                .data(payload),
        ),
        Err(err) => {
            error!(error = %err, "failed to serialise event payload");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracewarden_events::Event;

    fn copied(bus: &EventBus, name: &str) -> EventId {
        bus.publish(Event::CaptureCopied {
            path: name.to_string(),
        })
    }

    #[tokio::test]
    async fn replay_resumes_after_last_event_id_then_follows_live() {
        let bus = EventBus::with_capacity(8);
        let first = copied(&bus, "a.pcap");
        let second = copied(&bus, "b.pcap");

        let mut stream = Box::pin(event_replay_stream(&bus, Some(first)));
        let third = copied(&bus, "c.pcap");

        let ids: Vec<EventId> = (&mut stream).take(2).map(|env| env.id).collect().await;
        assert_eq!(ids, vec![second, third]);
    }

    #[tokio::test]
    async fn without_last_event_id_only_live_events_flow() {
        let bus = EventBus::with_capacity(8);
        let _ = copied(&bus, "old.pcap");
        let mut stream = Box::pin(event_replay_stream(&bus, None));
        let fresh = copied(&bus, "new.pcap");

        let next = stream.next().await.map(|env| env.id);
        assert_eq!(next, Some(fresh));
    }
}
