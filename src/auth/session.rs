use rand::Rng;
use sha2::{Digest, Sha256};

/// How long a login session stays valid.
pub const SESSION_TTL_DAYS: i64 = 30;

const SESSION_PREFIX: &str = "mdbs";
const SECRET_BYTES: usize = 32;

/// Generates a fresh session secret and the digest under which it is stored.
/// Returns (raw_token, token_hash). Only the digest ever touches the store.
#[must_use]
pub fn generate_session_token() -> (String, String) {
    let mut bytes = [0u8; SECRET_BYTES];
    rand::thread_rng().fill(&mut bytes);
    let raw = format!("{SESSION_PREFIX}_{}", hex::encode(bytes));
    let hash = hash_session_token(&raw);
    (raw, hash)
}

/// Digest used to look a session up by its bearer secret.
#[must_use]
pub fn hash_session_token(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_token_format() {
        let (raw, hash) = generate_session_token();
        assert!(raw.starts_with("mdbs_"));
        assert_eq!(raw.len(), SESSION_PREFIX.len() + 1 + SECRET_BYTES * 2);
        assert_eq!(hash, hash_session_token(&raw));
        assert_eq!(hash.len(), 64);
    }

    #[test]
    fn test_tokens_are_unique() {
        let (a, _) = generate_session_token();
        let (b, _) = generate_session_token();
        assert_ne!(a, b);
    }
}
