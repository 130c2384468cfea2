use sha2::{Digest, Sha256};

/// Hash token for DB lookup (SHA-256 hex).
/// session_token only ever stores this hash, never the token itself.
pub fn hash_access_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    let out = hasher.finalize();
    hex::encode(out)
}
