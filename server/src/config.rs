pub const SERVER_PORT: u16 = 3000;
pub const SSE_KEEPALIVE_SECS: u64 = 15;
pub const DEFAULT_BROADCAST_BUFFER: usize = 256;
pub const DEFAULT_STATIC_DIR: &str = "client/dist";
/// Longest accepted `session` query token.
pub const MAX_SESSION_TOKEN_LEN: usize = 128;

pub fn server_port() -> u16 {
    std::env::var("PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(SERVER_PORT)
}

pub fn sse_broadcast_buffer() -> usize {
    std::env::var("SSE_BROADCAST_BUFFER")
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(DEFAULT_BROADCAST_BUFFER)
}

pub fn static_dir() -> String {
    std::env::var("STATIC_DIR")
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_STATIC_DIR.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_falls_back_on_invalid_values() {
        temp_env::with_var("PORT", Some("8080"), || assert_eq!(server_port(), 8080));
        temp_env::with_var("PORT", Some("0"), || assert_eq!(server_port(), SERVER_PORT));
        temp_env::with_var("PORT", Some("http"), || {
            assert_eq!(server_port(), SERVER_PORT)
        });
        temp_env::with_var_unset("PORT", || assert_eq!(server_port(), SERVER_PORT));
    }

    #[test]
    fn broadcast_buffer_must_be_positive() {
        temp_env::with_var("SSE_BROADCAST_BUFFER", Some("1024"), || {
            assert_eq!(sse_broadcast_buffer(), 1024)
        });
        temp_env::with_var("SSE_BROADCAST_BUFFER", Some("0"), || {
            assert_eq!(sse_broadcast_buffer(), DEFAULT_BROADCAST_BUFFER)
        });
    }

    #[test]
    fn static_dir_ignores_blank_values() {
        temp_env::with_var("STATIC_DIR", Some("  "), || {
            assert_eq!(static_dir(), DEFAULT_STATIC_DIR)
        });
        temp_env::with_var("STATIC_DIR", Some("/srv/pixelwar"), || {
            assert_eq!(static_dir(), "/srv/pixelwar")
        });
    }
}
