//! Live telemetry stream.
//!
//! Each request registers a subscriber with the broker and turns its
//! delivery queue into a chunked response body. The body owns the
//! [`SubscriberHandle`]; when the client goes away hyper drops the body,
//! and dropping the handle unsubscribes it. When the broker removes the
//! subscriber (eviction or shutdown) the queue ends and so does the body.

use std::convert::Infallible;

use axum::body::Body;
use axum::extract::State;
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use powerwatch_events::SubscriberHandle;

use crate::error::AppResult;
use crate::state::AppState;

/// GET /redfish/v1/Chassis/1/Thermal
pub async fn thermal_stream(State(state): State<AppState>) -> AppResult<Response> {
    let subscriber = state.broker.subscribe().await?;
    tracing::info!(subscriber = %subscriber.id(), "Stream client connected");

    let body = Body::from_stream(event_chunks(subscriber));

    Ok((
        [
            (CONTENT_TYPE, "text/event-stream"),
            (CACHE_CONTROL, "no-cache"),
        ],
        body,
    )
        .into_response())
}

fn event_chunks(
    subscriber: SubscriberHandle,
) -> impl futures::Stream<Item = Result<String, Infallible>> + Send + 'static {
    futures::stream::unfold(subscriber, |mut subscriber| async move {
        match subscriber.recv().await {
            Some(event) => Some((Ok::<_, Infallible>(event.to_stream_chunk()), subscriber)),
            None => {
                tracing::info!(subscriber = %subscriber.id(), "Stream closed by broker");
                None
            }
        }
    })
}
