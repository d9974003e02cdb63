//! `/v1/stream`: SSE delivery of a chat completion.
//!
//! Streams `message` events as content arrives, then a final `done` event
//! carrying the full [`Response`] (or an `error` event on failure). The
//! underlying gateway call assembles the full response before the first
//! chunk is sent — see [`gateway_core::Gateway::submit_stream`].

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures::stream::{self, Stream, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;

use gateway_core::{GatewayError, Request, Response};

use super::app::AppState;
use super::handlers::{augment_with_memory, schedule_ingest};

pub async fn stream_chat(
    State(state): State<Arc<AppState>>,
    Json(mut request): Json<Request>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let user_id = request.user_id;
    let (memory_enabled, last_user_message) = augment_with_memory(&state, &mut request).await;

    let (chunk_tx, chunk_rx) = mpsc::channel::<String>(16);
    let (done_tx, done_rx) = oneshot::channel::<Result<Response, GatewayError>>();

    let gateway = state.gateway.clone();
    let stream_state = state.clone();
    tokio::spawn(async move {
        let result = gateway.submit_stream(request, chunk_tx).await;
        if result.is_ok() {
            schedule_ingest(&stream_state, memory_enabled, user_id, last_user_message);
        }
        let _ = done_tx.send(result);
    });

    let chunk_stream = ReceiverStream::new(chunk_rx).map(|chunk| Ok(Event::default().event("message").data(chunk)));

    let done_stream = stream::once(async move {
        let event = match done_rx.await {
            Ok(Ok(response)) => Event::default()
                .event("done")
                .json_data(&response)
                .unwrap_or_else(|_| Event::default().event("error").data("failed to serialize response")),
            Ok(Err(err)) => Event::default().event("error").data(err.to_string()),
            Err(_) => Event::default().event("error").data("stream task was dropped before completing"),
        };
        Ok(event)
    });

    Sse::new(chunk_stream.chain(done_stream)).keep_alive(KeepAlive::default())
}
