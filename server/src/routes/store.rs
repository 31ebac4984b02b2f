use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Sse;
use axum::response::sse::{Event, KeepAlive};
use bytes::Bytes;
use futures::stream::Stream;
use pixelwar_shared::store::StorePath;
use serde::Deserialize;
use serde_json::Value;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, warn};

use crate::config::{MAX_SESSION_TOKEN_LEN, SSE_KEEPALIVE_SECS};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct SessionQuery {
    pub session: Option<String>,
}

fn parse_path(raw: &str) -> Result<StorePath, StatusCode> {
    StorePath::parse_non_root(raw).map_err(|e| {
        debug!(path = raw, error = %e, "rejected store path");
        StatusCode::BAD_REQUEST
    })
}

fn valid_session_token(token: &str) -> bool {
    !token.is_empty()
        && token.len() <= MAX_SESSION_TOKEN_LEN
        && token
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

fn parse_session(query: &SessionQuery) -> Result<Option<&str>, StatusCode> {
    match query.session.as_deref() {
        None => Ok(None),
        Some(token) if valid_session_token(token) => Ok(Some(token)),
        Some(_) => Err(StatusCode::BAD_REQUEST),
    }
}

pub async fn put_value(
    State(state): State<AppState>,
    Path(raw): Path<String>,
    body: Bytes,
) -> Result<StatusCode, StatusCode> {
    let path = parse_path(&raw)?;
    let value: Value = serde_json::from_slice(&body).map_err(|e| {
        debug!(%path, error = %e, "rejected store body");
        StatusCode::BAD_REQUEST
    })?;
    state.write(&path, value).await;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_value(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> Result<StatusCode, StatusCode> {
    let path = parse_path(&raw)?;
    state.remove(&path).await;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn register_on_disconnect(
    State(state): State<AppState>,
    Path(raw): Path<String>,
    Query(query): Query<SessionQuery>,
) -> Result<StatusCode, StatusCode> {
    let path = parse_path(&raw)?;
    let Some(session) = parse_session(&query)? else {
        return Err(StatusCode::BAD_REQUEST);
    };
    if !state.register_on_disconnect(session, path) {
        debug!(session, "on-disconnect registration without an open stream");
        return Err(StatusCode::CONFLICT);
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Stream the value at a path: once on connect, then after every overlapping change.
pub async fn subscribe(
    State(state): State<AppState>,
    Path(raw): Path<String>,
    Query(query): Query<SessionQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, StatusCode> {
    let path = parse_path(&raw)?;
    let session = parse_session(&query)?.map(str::to_owned);

    let stream = async_stream::stream! {
        // Held for the stream's lifetime; dropping them closes the session.
        let _subscriber = state.subscriber_guard();
        let _session = session.as_deref().map(|s| state.attach_session(s));

        // Subscribe before the first read so no change slips between them.
        let rx = state.change_tx.subscribe();
        let mut changes = BroadcastStream::new(rx);

        let mut last_sent = String::new();
        let initial = state.read(&path).await;
        if let Some(event) = value_event(&path, &initial, &mut last_sent) {
            yield Ok(event);
        }

        while let Some(result) = changes.next().await {
            match result {
                Ok(changed) => {
                    if !changed.overlaps(&path) {
                        continue;
                    }
                }
                Err(tokio_stream::wrappers::errors::BroadcastStreamRecvError::Lagged(skipped)) => {
                    warn!(
                        %path,
                        skipped_events = skipped,
                        "SSE client lagged behind broadcast buffer; resending value"
                    );
                }
            }
            let value = state.read(&path).await;
            if let Some(event) = value_event(&path, &value, &mut last_sent) {
                yield Ok(event);
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(SSE_KEEPALIVE_SECS))
            .text("keep-alive"),
    ))
}

/// A `value` event, or `None` when it would repeat the last one sent.
fn value_event(path: &StorePath, value: &Value, last_sent: &mut String) -> Option<Event> {
    let payload = match serde_json::to_string(value) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(%path, error = %e, "failed to serialize store value; dropping SSE event");
            return None;
        }
    };
    if !last_sent.is_empty() && *last_sent == payload {
        return None;
    }
    let event = Event::default().event("value").data(&payload);
    *last_sent = payload;
    Some(event)
}
