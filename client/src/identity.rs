use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct Identity {
    user: Option<String>,
}

/// The signed-in user id, or `None` for anonymous visitors.
pub async fn resolve_current_user() -> Result<Option<String>, String> {
    let resp = gloo_net::http::Request::get("/api/me")
        .send()
        .await
        .map_err(|e| format!("fetch error: {e}"))?;
    if !resp.ok() {
        return Err(format!("HTTP {}", resp.status()));
    }
    resp.json::<Identity>()
        .await
        .map(|identity| identity.user)
        .map_err(|e| format!("parse error: {e}"))
}

/// The identity to switch to, or `None` when `resolved` matches `current`.
pub fn switch_to(current: Option<&str>, resolved: Option<String>) -> Option<Option<String>> {
    (current != resolved.as_deref()).then_some(resolved)
}
