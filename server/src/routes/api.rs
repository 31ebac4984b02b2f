use std::sync::atomic::Ordering;

use axum::Json;
use axum::extract::State;
use axum::http::HeaderMap;

use crate::state::AppState;

/// Header the authenticating proxy sets to the signed-in user's id.
pub const FORWARDED_USER_HEADER: &str = "x-forwarded-user";
const MAX_USER_ID_LEN: usize = 128;

pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "subscribers": state.subscribers.load(Ordering::Relaxed),
        "sessions": state.sessions.len(),
    }))
}

pub async fn me(headers: HeaderMap) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "user": forwarded_user(&headers) }))
}

fn forwarded_user(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(FORWARDED_USER_HEADER)?.to_str().ok()?.trim();
    if value.is_empty() || value.len() > MAX_USER_ID_LEN {
        return None;
    }
    Some(value.to_string())
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::time::Duration;

    use serde_json::{Value, json};

    use crate::state::AppState;

    async fn spawn_test_server(state: AppState) -> (SocketAddr, tokio::task::JoinHandle<()>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("listener address");
        let app = crate::app::build_app(state);
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve test app");
        });
        (addr, handle)
    }

    /// Read SSE frames until the next named event; returns its parsed data.
    async fn next_value(response: &mut reqwest::Response, buffer: &mut String) -> Value {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let Some(end) = buffer.find("\n\n") {
                    let frame: String = buffer.drain(..end + 2).collect();
                    let data = frame
                        .lines()
                        .filter_map(|line| line.strip_prefix("data:"))
                        .map(str::trim_start)
                        .collect::<Vec<_>>()
                        .join("\n");
                    if frame.lines().any(|line| line.starts_with("event:")) {
                        return serde_json::from_str(&data).expect("event data is JSON");
                    }
                    continue;
                }
                let chunk = response
                    .chunk()
                    .await
                    .expect("read SSE chunk")
                    .expect("stream still open");
                buffer.push_str(std::str::from_utf8(&chunk).expect("utf-8 SSE chunk"));
            }
        })
        .await
        .expect("SSE event within timeout")
    }

    #[tokio::test]
    async fn health_and_identity_expose_expected_contract() {
        let (addr, server_handle) = spawn_test_server(AppState::new()).await;
        let base_url = format!("http://{addr}");
        let client = reqwest::Client::new();

        let health = client
            .get(format!("{base_url}/api/health"))
            .send()
            .await
            .expect("health request")
            .error_for_status()
            .expect("health status")
            .json::<Value>()
            .await
            .expect("parse health");
        assert_eq!(health["status"], "ok");
        assert_eq!(health["sessions"], 0);

        let anonymous = client
            .get(format!("{base_url}/api/me"))
            .send()
            .await
            .expect("me request")
            .json::<Value>()
            .await
            .expect("parse me");
        assert_eq!(anonymous, json!({"user": null}));

        let signed_in = client
            .get(format!("{base_url}/api/me"))
            .header("x-forwarded-user", "user-42")
            .send()
            .await
            .expect("me request")
            .json::<Value>()
            .await
            .expect("parse me");
        assert_eq!(signed_in, json!({"user": "user-42"}));

        server_handle.abort();
    }

    #[tokio::test]
    async fn subscribers_see_initial_value_then_changes() {
        let (addr, server_handle) = spawn_test_server(AppState::new()).await;
        let base_url = format!("http://{addr}");
        let client = reqwest::Client::new();

        let mut stream = client
            .get(format!("{base_url}/api/store/pixels?session=c0ffee"))
            .send()
            .await
            .expect("subscribe request")
            .error_for_status()
            .expect("subscribe status");
        let mut buffer = String::new();
        assert_eq!(next_value(&mut stream, &mut buffer).await, Value::Null);

        client
            .put(format!("{base_url}/api/store/pixels/3-4"))
            .json(&json!({"color": "#e6194b", "claimedByRegion": "Adana", "serverTimestamp": {".sv": "timestamp"}}))
            .send()
            .await
            .expect("put request")
            .error_for_status()
            .expect("put status");

        let value = next_value(&mut stream, &mut buffer).await;
        assert_eq!(value["3-4"]["color"], "#e6194b");
        assert!(value["3-4"]["serverTimestamp"].is_i64());

        // Unrelated paths don't wake the subscriber; the next event is the delete.
        client
            .put(format!("{base_url}/api/store/cityPlayers/Adana/c0ffee"))
            .json(&json!(true))
            .send()
            .await
            .expect("presence put");
        client
            .delete(format!("{base_url}/api/store/pixels"))
            .send()
            .await
            .expect("delete request")
            .error_for_status()
            .expect("delete status");
        assert_eq!(next_value(&mut stream, &mut buffer).await, Value::Null);

        server_handle.abort();
    }

    #[tokio::test]
    async fn invalid_paths_and_bodies_are_rejected() {
        let (addr, server_handle) = spawn_test_server(AppState::new()).await;
        let base_url = format!("http://{addr}");
        let client = reqwest::Client::new();

        let bad_path = client
            .put(format!("{base_url}/api/store/pixels/a.b"))
            .json(&json!(1))
            .send()
            .await
            .expect("put request");
        assert_eq!(bad_path.status(), reqwest::StatusCode::BAD_REQUEST);

        let bad_body = client
            .put(format!("{base_url}/api/store/pixels/1-1"))
            .body("{not json")
            .send()
            .await
            .expect("put request");
        assert_eq!(bad_body.status(), reqwest::StatusCode::BAD_REQUEST);

        let no_session = client
            .post(format!("{base_url}/api/on-disconnect/cityPlayers/A/c1"))
            .send()
            .await
            .expect("on-disconnect request");
        assert_eq!(no_session.status(), reqwest::StatusCode::BAD_REQUEST);

        server_handle.abort();
    }

    #[tokio::test]
    async fn on_disconnect_registration_is_recorded_per_session() {
        let state = AppState::new();
        let (addr, server_handle) = spawn_test_server(state.clone()).await;
        let base_url = format!("http://{addr}");
        let client = reqwest::Client::new();
        let register_url =
            format!("{base_url}/api/on-disconnect/cityPlayers/Adana/c0ffee?session=c0ffee");

        // Nothing would ever fire a registration for a session with no stream.
        let orphan = client
            .post(&register_url)
            .send()
            .await
            .expect("on-disconnect request");
        assert_eq!(orphan.status(), reqwest::StatusCode::CONFLICT);
        assert!(state.sessions.is_empty());

        let mut stream = client
            .get(format!("{base_url}/api/store/cityPlayers?session=c0ffee"))
            .send()
            .await
            .expect("subscribe request")
            .error_for_status()
            .expect("subscribe status");
        let mut buffer = String::new();
        assert_eq!(next_value(&mut stream, &mut buffer).await, Value::Null);

        client
            .post(&register_url)
            .send()
            .await
            .expect("on-disconnect request")
            .error_for_status()
            .expect("on-disconnect status");

        {
            let entry = state.sessions.get("c0ffee").expect("session registered");
            assert_eq!(entry.open_streams, 1);
            assert_eq!(entry.on_disconnect.len(), 1);
            assert_eq!(entry.on_disconnect[0].to_string(), "cityPlayers/Adana/c0ffee");
        }

        drop(stream);
        server_handle.abort();
    }
}
