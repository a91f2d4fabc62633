/// Random one-time tokens and backup codes
///
/// Email verification and password reset links carry a random token; only
/// its SHA-256 hex digest is stored, so a leaked database row cannot be
/// turned back into a working link.
///
/// Backup codes are 4 random bytes rendered as 8 uppercase hex characters.
///
/// # Example
///
/// ```
/// use pricewatch_shared::auth::tokens::{generate_token, hash_token, generate_backup_codes};
///
/// let token = generate_token();
/// assert_eq!(token.len(), 32);
/// assert_eq!(hash_token(&token).len(), 64);
///
/// let codes = generate_backup_codes();
/// assert_eq!(codes.len(), 10);
/// ```

use rand::{Rng, RngCore};
use sha2::{Digest, Sha256};
use std::collections::HashSet;

/// Length of generated verification/reset tokens
pub const TOKEN_LENGTH: usize = 32;

/// Number of backup codes issued on 2FA setup
pub const BACKUP_CODE_COUNT: usize = 10;

/// Random bytes per backup code
const BACKUP_CODE_BYTES: usize = 4;

/// Generates a URL-safe random token (base62)
pub fn generate_token() -> String {
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();

    (0..TOKEN_LENGTH)
        .map(|_| {
            let idx = rng.gen_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect()
}

/// Hashes a token using SHA-256, hex encoded (64 characters)
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Constant-time string comparison
pub fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.bytes()
        .zip(b.bytes())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

/// Generates a fresh set of distinct backup codes
pub fn generate_backup_codes() -> Vec<String> {
    let mut rng = rand::thread_rng();
    let mut seen = HashSet::with_capacity(BACKUP_CODE_COUNT);
    let mut codes = Vec::with_capacity(BACKUP_CODE_COUNT);

    while codes.len() < BACKUP_CODE_COUNT {
        let mut bytes = [0u8; BACKUP_CODE_BYTES];
        rng.fill_bytes(&mut bytes);
        let code = hex::encode_upper(bytes);

        // Consuming a code removes every equal entry, so duplicates would burn two at once.
        if seen.insert(code.clone()) {
            codes.push(code);
        }
    }

    codes
}

/// Normalizes user-entered backup codes (whitespace, dashes, case)
pub fn normalize_backup_code(input: &str) -> String {
    input
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect::<String>()
        .to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_token_charset() {
        let token = generate_token();
        assert_eq!(token.len(), TOKEN_LENGTH);
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(token, generate_token());
    }

    #[test]
    fn test_hash_token_deterministic() {
        let hash = hash_token("abc");
        assert_eq!(hash, hash_token("abc"));
        assert_eq!(
            hash,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_ne!(hash, hash_token("abd"));
    }

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare("same", "same"));
        assert!(!constant_time_compare("same", "sane"));
        assert!(!constant_time_compare("short", "longer"));
    }

    #[test]
    fn test_backup_codes_format() {
        let codes = generate_backup_codes();
        assert_eq!(codes.len(), BACKUP_CODE_COUNT);

        for code in &codes {
            assert_eq!(code.len(), 8);
            assert!(code
                .chars()
                .all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c)));
        }

        let unique: HashSet<_> = codes.iter().collect();
        assert_eq!(unique.len(), codes.len());
    }

    #[test]
    fn test_normalize_backup_code() {
        assert_eq!(normalize_backup_code(" ab12-cd34 "), "AB12CD34");
        assert_eq!(normalize_backup_code("AB12CD34"), "AB12CD34");
    }
}
