use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use std::convert::Infallible;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;

use crate::state::AppState;

/// GET /api/events: SSE stream of console and run-status changes.
///
/// Each event is named `demo` and carries one JSON-encoded `SseMessage`.
/// Subscribers that fall behind skip the lagged messages; the page re-reads
/// `/api/demo` when a run finishes.
pub async fn sse_events(State(app): State<AppState>) -> impl axum::response::IntoResponse {
    let rx = app.event_tx.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|msg| {
        msg.ok()
            .and_then(|m| Event::default().event("demo").json_data(&m).ok())
            .map(Ok::<Event, Infallible>)
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}
