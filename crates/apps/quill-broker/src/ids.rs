use rand_core::{OsRng, RngCore};

use quill_provider::RequestId;

/// Generate a fresh request id: 16 random bytes, hex-encoded.
///
/// Ids correlate one in-flight request across the handoff store, the
/// critical-operation registry, and the UI event topics.
pub fn new_request_id() -> RequestId {
    let mut bytes = [0u8; 16];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_hex() {
        let a = new_request_id();
        let b = new_request_id();
        assert_ne!(a, b);
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
