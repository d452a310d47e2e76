// Digests for log lines and upload integrity

use sha2::{Digest, Sha256};

/// SHA-256 hex digest (lowercase).
pub fn sha256_hex(input: &[u8]) -> String {
    Sha256::digest(input)
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Short, stable identifier for a secret. Safe to log; the secret is never recoverable.
pub fn token_fingerprint(token: &str) -> String {
    let mut hex = sha256_hex(token.trim().as_bytes());
    hex.truncate(12);
    hex
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_of_empty_input() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn fingerprint_ignores_surrounding_whitespace() {
        assert_eq!(token_fingerprint("abc"), token_fingerprint(" abc\n"));
        assert_eq!(token_fingerprint("abc").len(), 12);
        assert_ne!(token_fingerprint("abc"), token_fingerprint("abd"));
    }
}
