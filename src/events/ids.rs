//! Identifier generation.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::Rng;

/// Length of request and message ids.
pub const REQUEST_ID_LEN: usize = 32;

/// A request or message id: 16 random bytes, hex encoded.
pub fn generate_request_id() -> String {
    let bytes: [u8; 16] = rand::thread_rng().gen();
    hex::encode(bytes)
}

/// A WebSocket connection id: 12 random bytes, URL-safe base64 (16 characters),
/// so it can be used verbatim in management API paths.
pub fn generate_connection_id() -> String {
    let bytes: [u8; 12] = rand::thread_rng().gen();
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn request_ids_are_fixed_length_hex() {
        let id = generate_request_id();
        assert_eq!(id.len(), REQUEST_ID_LEN);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn request_ids_do_not_collide() {
        let ids: HashSet<String> = (0..10_000).map(|_| generate_request_id()).collect();
        assert_eq!(ids.len(), 10_000);
    }

    #[test]
    fn connection_ids_are_path_safe() {
        let id = generate_connection_id();
        assert_eq!(id.len(), 16);
        assert!(id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }
}
