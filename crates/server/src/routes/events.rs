//! Real-time event stream handler.
//!
//! Server-Sent Events bound to the session user's room. The subscription
//! is owned by the request: joining happens here and the room receiver
//! drops with the connection, so a logged-out or disconnected client
//! holds nothing open.

use std::convert::Infallible;
use std::time::Duration;

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::Stream;
use tokio::sync::broadcast::error::RecvError;

use crate::middleware::RequireUser;
use crate::state::AppState;

/// Keep-alive interval; well under common proxy idle timeouts.
const KEEP_ALIVE_SECS: u64 = 15;

/// Stream workflow events for the session user.
pub async fn stream(
    RequireUser(user): RequireUser,
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut rx = state.notifier().subscribe(user.id);
    tracing::debug!(user_id = %user.id, "event stream opened");

    let stream = async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let sse_event = Event::default()
                        .event(event.name())
                        .data(event.payload().to_string());
                    yield Ok(sse_event);
                }
                Err(RecvError::Lagged(missed)) => {
                    // Events were dropped; the client must reconcile by
                    // re-fetching its delivery list.
                    tracing::warn!(missed, "event stream lagged");
                    yield Ok(Event::default().comment("lagged"));
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(KEEP_ALIVE_SECS))
            .text("ping"),
    )
}
