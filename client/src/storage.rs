use gloo_storage::Storage;
use pixelwar_shared::LocalSession;

const SESSION_KEY: &str = "pixelwar_session";

/// Saved session with a client id filled in (and persisted) on first load.
pub fn load_session() -> LocalSession {
    let mut session: LocalSession =
        gloo_storage::LocalStorage::get(SESSION_KEY).unwrap_or_default();
    if session.ensure_client_id(random_client_id) {
        save_session(&session);
    }
    session
}

pub fn save_session(session: &LocalSession) {
    if let Err(e) = gloo_storage::LocalStorage::set(SESSION_KEY, session) {
        web_sys::console::warn_1(&format!("Failed to persist session: {e}").into());
    }
}

/// 128 random bits as lowercase hex.
fn random_client_id() -> String {
    let mut bytes = [0u8; 16];
    let filled = web_sys::window()
        .and_then(|w| w.crypto().ok())
        .is_some_and(|crypto| crypto.get_random_values_with_u8_array(&mut bytes).is_ok());
    if !filled {
        for byte in &mut bytes {
            *byte = (js_sys::Math::random() * 256.0) as u8;
        }
    }
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
