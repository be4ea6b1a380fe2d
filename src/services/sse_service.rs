use std::{convert::Infallible, fmt, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::{Stream, StreamExt};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};

use crate::{
    dto::{
        chat::to_message_list,
        fixture::SyncStateEvent,
        presence::{JoinRequest, PresenceCount},
        sse::{Handshake, ServerEvent, SystemStatus},
    },
    error::ServiceError,
    services::{
        access_service,
        chat_service::{RoomMessages, RoomSubscription},
        presence_service::PresenceGuard,
        sync_service::{FixtureWatch, parse_fixture_id},
    },
    state::SharedState,
};

/// Identifies the target SSE stream for connection logging.
#[derive(Clone, Debug)]
pub enum StreamKind {
    Fixture(u64),
    Room(String),
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamKind::Fixture(id) => write!(f, "fixture:{id}"),
            StreamKind::Room(room_id) => write!(f, "room:{room_id}"),
        }
    }
}

/// Sync state stream of a fixture. Registers a watcher, so polling runs until
/// the last stream of that fixture disconnects.
pub fn fixture_stream(
    state: &SharedState,
    fixture_id: &str,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>> + use<>>, ServiceError> {
    let fixture_id = parse_fixture_id(fixture_id)?;
    let watch = state.synchronizer().watch(fixture_id);
    let handshake = handshake("fixture", fixture_id.to_string(), state.is_degraded());
    info!(fixture_id, "new fixture SSE connection");
    Ok(to_sse_stream(
        handshake.chain(fixture_events(watch)),
        StreamKind::Fixture(fixture_id),
    ))
}

/// Message and presence stream of an open room. A `viewer` is counted as
/// present until the stream disconnects.
pub async fn room_stream(
    state: &SharedState,
    fixture_id: &str,
    viewer: Option<JoinRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>> + use<>>, ServiceError> {
    let access = access_service::require_open(state, fixture_id).await?;
    let subscription = state.chat().subscribe(&access.room_id).await?;
    let viewer = match viewer {
        Some(viewer) => Some(
            state
                .presence()
                .attach(&access.room_id, &viewer.client_id, &viewer.name)
                .await?,
        ),
        None => None,
    };
    // Publishes a fresh count before the stream reads it.
    state.presence().active_count(&access.room_id).await?;
    let presence = state.presence().subscribe_count(&access.room_id);
    let degraded = state.degraded_watcher();

    let handshake = handshake("room", access.room_id.clone(), state.is_degraded());
    info!(room_id = %access.room_id, "new room SSE connection");
    Ok(to_sse_stream(
        handshake.chain(room_events(
            subscription,
            presence,
            degraded,
            access.room_id.clone(),
            viewer,
        )),
        StreamKind::Room(access.room_id),
    ))
}

fn handshake(
    stream: &str,
    target: String,
    degraded: bool,
) -> impl Stream<Item = ServerEvent> + use<> {
    let event = encode(
        "handshake",
        &Handshake {
            stream: stream.to_string(),
            target,
            degraded,
        },
    );
    futures::stream::iter(event)
}

fn encode<T: Serialize>(name: &str, payload: &T) -> Option<ServerEvent> {
    match ServerEvent::json(Some(name.to_string()), payload) {
        Ok(event) => Some(event),
        Err(err) => {
            warn!(event = name, error = %err, "failed to encode SSE payload");
            None
        }
    }
}

fn fixture_events(watch: FixtureWatch) -> impl Stream<Item = ServerEvent> {
    async_stream::stream! {
        let FixtureWatch { receiver, guard } = watch;
        // Declared first so it drops last, after the receiver is gone.
        let _guard = guard;
        let mut receiver = receiver;
        loop {
            let event = encode("sync", &SyncStateEvent::from(&*receiver.borrow_and_update()));
            if let Some(event) = event {
                yield event;
            }
            if receiver.changed().await.is_err() {
                break;
            }
        }
    }
}

enum RoomUpdate {
    Messages(RoomMessages),
    Presence(usize),
    Degraded(bool),
}

fn room_events(
    mut subscription: RoomSubscription,
    mut presence: watch::Receiver<usize>,
    mut degraded: watch::Receiver<bool>,
    room_id: String,
    viewer: Option<PresenceGuard>,
) -> impl Stream<Item = ServerEvent> {
    let presence_event = move |active: usize, room_id: &str| {
        encode(
            "presence",
            &PresenceCount {
                room_id: room_id.to_string(),
                active,
            },
        )
    };

    async_stream::stream! {
        let _viewer = viewer;
        if let Some(event) = encode("messages", &to_message_list(&subscription.current())) {
            yield event;
        }
        let active = *presence.borrow_and_update();
        if let Some(event) = presence_event(active, &room_id) {
            yield event;
        }

        loop {
            let update = tokio::select! {
                messages = subscription.changed() => messages.map(RoomUpdate::Messages),
                changed = presence.changed() => match changed {
                    Ok(()) => Some(RoomUpdate::Presence(*presence.borrow_and_update())),
                    Err(_) => None,
                },
                changed = degraded.changed() => match changed {
                    Ok(()) => Some(RoomUpdate::Degraded(*degraded.borrow_and_update())),
                    Err(_) => None,
                },
            };
            let event = match update {
                Some(RoomUpdate::Messages(messages)) => encode("messages", &to_message_list(&messages)),
                Some(RoomUpdate::Presence(active)) => presence_event(active, &room_id),
                Some(RoomUpdate::Degraded(degraded)) => encode("system_status", &SystemStatus { degraded }),
                None => break,
            };
            if let Some(event) = event {
                yield event;
            }
        }
    }
}

/// Forward `events` into an SSE response, dropping the source (and whatever
/// subscriptions it owns) once the client disconnects.
pub fn to_sse_stream<S>(events: S, kind: StreamKind) -> Sse<impl Stream<Item = Result<Event, Infallible>>>
where
    S: Stream<Item = ServerEvent> + Send + 'static,
{
    // small bounded channel between forwarder and response
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);

    tokio::spawn(async move {
        let mut events = Box::pin(events);
        loop {
            tokio::select! {
                _ = tx.closed() => break,
                next = events.next() => {
                    let Some(payload) = next else {
                        break;
                    };
                    let mut event = Event::default().data(payload.data);
                    if let Some(name) = payload.event {
                        event = event.event(name);
                    }
                    if tx.send(Ok(event)).await.is_err() {
                        break;
                    }
                }
            }
        }
        info!(stream = %kind, "SSE stream disconnected");
    });

    // response stream reads from mpsc; when client disconnects axum drops this stream
    let stream = ReceiverStream::new(rx);
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}
