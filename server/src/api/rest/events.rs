//! `GET /api/v1/events` — server-sent change events, fed by the [`EventBus`].

use crate::api::rest::error::extract_user_id;
use crate::api::AppState;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::{extract::State, http::HeaderMap};
use futures::stream::Stream;
use std::convert::Infallible;

/// Subscribes to the event bus and streams every published [`ChangeEvent`] as
/// an SSE frame (`event: <kind>\ndata: <json>`). The first frame sent is a
/// bare comment so a client can confirm the connection opened before any
/// change has happened yet.
pub async fn stream(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, crate::api::rest::error::AppError> {
    let _user_id = extract_user_id(&state, &headers)?;

    let (_guard, mut rx) = state.events.subscribe_guarded().await;

    let stream = async_stream::stream! {
        // Keep `_guard` alive for the whole stream: its `Drop` unsubscribes
        // whether this generator runs to completion or is cancelled mid-`await`
        // by a client disconnect, so the bus never leaks subscriber entries.
        let _guard = _guard;

        yield Ok(Event::default().comment("connected"));

        while let Some(change) = rx.recv().await {
            let event = Event::default()
                .event(change.kind.as_str())
                .json_data(&change)
                .unwrap_or_else(|_| Event::default().comment("serialization error"));
            yield Ok(event);
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
