//! Content addressing for provider requests.
//!
//! The ledger keys its response cache purely by what is sent over the wire: model id,
//! generation limit and the exact input text. Which incentive produced a prompt is not
//! part of the key, so identical prompts share one cache entry.

use blake3::Hasher;

/// 32-byte BLAKE3 digest used as a cache key.
pub type RequestKey = [u8; 32];

#[inline]
pub fn hash_payload(payload: &[u8]) -> RequestKey {
    *blake3::hash(payload).as_bytes()
}

/// Hashes a provider request.
///
/// Fields are separated so that `("ab", "c")` and `("a", "bc")` cannot collide, and an
/// absent `max_tokens` hashes differently from any concrete limit.
#[inline]
pub fn request_key(model: &str, max_tokens: Option<u32>, input: &str) -> RequestKey {
    let mut hasher = Hasher::new();
    hasher.update(model.as_bytes());
    hasher.update(b"|");
    match max_tokens {
        Some(limit) => {
            hasher.update(b"t");
            hasher.update(&limit.to_le_bytes());
        }
        None => {
            hasher.update(b"-");
        }
    }
    hasher.update(b"|");
    hasher.update(input.as_bytes());
    *hasher.finalize().as_bytes()
}

/// First 12 hex chars of a key, for log fields.
#[inline]
pub fn short_hex(key: &RequestKey) -> String {
    let hex = blake3::Hash::from_bytes(*key).to_hex();
    hex.as_str()[..12].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_request_key_determinism() {
        let k1 = request_key("gpt-4o-mini", Some(2000), "select the best five");
        let k2 = request_key("gpt-4o-mini", Some(2000), "select the best five");
        assert_eq!(k1, k2);
    }

    #[test]
    fn test_request_key_sensitivity() {
        let base = request_key("gpt-4o-mini", Some(2000), "prompt");

        assert_ne!(base, request_key("gpt-4o", Some(2000), "prompt"));
        assert_ne!(base, request_key("gpt-4o-mini", Some(1000), "prompt"));
        assert_ne!(base, request_key("gpt-4o-mini", None, "prompt"));
        assert_ne!(base, request_key("gpt-4o-mini", Some(2000), "prompt "));
    }

    #[test]
    fn test_request_key_separator_prevents_ambiguity() {
        let keys = [
            request_key("ab", None, "c"),
            request_key("a", None, "bc"),
            request_key("abc", None, ""),
        ];
        let unique: HashSet<_> = keys.iter().collect();
        assert_eq!(unique.len(), keys.len());
    }

    #[test]
    fn test_hash_payload_matches_blake3() {
        let payload = b"company text";
        assert_eq!(hash_payload(payload), *blake3::hash(payload).as_bytes());
    }

    #[test]
    fn test_hash_payload_empty_is_not_zero() {
        let hash = hash_payload(b"");
        assert!(!hash.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_short_hex_length() {
        let key = request_key("m", None, "x");
        let hex = short_hex(&key);
        assert_eq!(hex.len(), 12);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
