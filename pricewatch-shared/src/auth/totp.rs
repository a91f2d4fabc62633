/// Time-based one-time passwords (RFC 6238)
///
/// HMAC-SHA1, 6 digits, 30 second step, the profile every authenticator app
/// supports. Secrets are 20 random bytes, stored and shown base32-encoded
/// (RFC 4648, no padding). Verification accepts the previous and next step as
/// well to absorb clock drift between server and phone.
///
/// # Example
///
/// ```
/// use pricewatch_shared::auth::totp::{generate_secret, generate_code, verify_code};
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let secret = generate_secret();
/// let now = 1_700_000_000;
/// let code = generate_code(&secret, now)?;
/// assert!(verify_code(&secret, &code, now)?);
/// # Ok(())
/// # }
/// ```

use hmac::{Hmac, Mac};
use rand::RngCore;
use sha1::Sha1;

use super::tokens::constant_time_compare;

type HmacSha1 = Hmac<Sha1>;

/// Issuer shown in authenticator apps
pub const ISSUER: &str = "Price Tracker";

/// Code length
pub const DIGITS: u32 = 6;

/// Time step in seconds
pub const STEP_SECS: u64 = 30;

/// Steps accepted on either side of the current one
pub const ALLOWED_SKEW: u64 = 1;

const SECRET_BYTES: usize = 20;
const BASE32_ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

/// Error type for TOTP operations
#[derive(Debug, thiserror::Error)]
pub enum TotpError {
    /// Secret is not valid base32
    #[error("Invalid TOTP secret: {0}")]
    InvalidSecret(String),

    /// HMAC could not be keyed
    #[error("Failed to initialise HMAC: {0}")]
    Key(String),

    /// Key URI could not be built
    #[error("Failed to build key URI: {0}")]
    Uri(String),
}

/// Generates a new random base32 secret
pub fn generate_secret() -> String {
    let mut bytes = [0u8; SECRET_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    base32_encode(&bytes)
}

/// Encodes bytes as unpadded RFC 4648 base32
pub fn base32_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity((bytes.len() * 8 + 4) / 5);
    let mut buffer: u32 = 0;
    let mut bits = 0;

    for &byte in bytes {
        buffer = (buffer << 8) | u32::from(byte);
        bits += 8;

        while bits >= 5 {
            let index = (buffer >> (bits - 5)) & 0x1f;
            out.push(BASE32_ALPHABET[index as usize] as char);
            bits -= 5;
        }
    }

    if bits > 0 {
        let index = (buffer << (5 - bits)) & 0x1f;
        out.push(BASE32_ALPHABET[index as usize] as char);
    }

    out
}

/// Decodes RFC 4648 base32, ignoring case, spaces, and padding
pub fn base32_decode(input: &str) -> Result<Vec<u8>, TotpError> {
    let mut out = Vec::with_capacity(input.len() * 5 / 8);
    let mut buffer: u32 = 0;
    let mut bits = 0;

    for c in input.chars().filter(|c| !c.is_whitespace() && *c != '=') {
        let upper = c.to_ascii_uppercase() as u8;
        let value = BASE32_ALPHABET
            .iter()
            .position(|&a| a == upper)
            .ok_or_else(|| TotpError::InvalidSecret(format!("unexpected character '{}'", c)))?;

        buffer = (buffer << 5) | value as u32;
        bits += 5;

        if bits >= 8 {
            out.push(((buffer >> (bits - 8)) & 0xff) as u8);
            bits -= 8;
        }
    }

    if out.is_empty() {
        return Err(TotpError::InvalidSecret("secret is empty".to_string()));
    }

    Ok(out)
}

/// HOTP value (RFC 4226) for `counter`, truncated to `DIGITS`
pub fn hotp(key: &[u8], counter: u64) -> Result<u32, TotpError> {
    let mut mac = HmacSha1::new_from_slice(key).map_err(|e| TotpError::Key(e.to_string()))?;
    mac.update(&counter.to_be_bytes());
    let digest = mac.finalize().into_bytes();

    let offset = (digest[digest.len() - 1] & 0x0f) as usize;
    let binary = (u32::from(digest[offset] & 0x7f) << 24)
        | (u32::from(digest[offset + 1]) << 16)
        | (u32::from(digest[offset + 2]) << 8)
        | u32::from(digest[offset + 3]);

    Ok(binary % 10u32.pow(DIGITS))
}

/// Code for the step containing `unix_time`
pub fn generate_code(secret: &str, unix_time: u64) -> Result<String, TotpError> {
    let key = base32_decode(secret)?;
    let value = hotp(&key, unix_time / STEP_SECS)?;
    Ok(format!("{:0width$}", value, width = DIGITS as usize))
}

/// Checks `code` against the steps around `unix_time`
pub fn verify_code(secret: &str, code: &str, unix_time: u64) -> Result<bool, TotpError> {
    let code = code.trim();
    if code.len() != DIGITS as usize || !code.chars().all(|c| c.is_ascii_digit()) {
        return Ok(false);
    }

    let key = base32_decode(secret)?;
    let current = unix_time / STEP_SECS;
    let first = current.saturating_sub(ALLOWED_SKEW);

    for counter in first..=current + ALLOWED_SKEW {
        let expected = format!("{:0width$}", hotp(&key, counter)?, width = DIGITS as usize);
        if constant_time_compare(&expected, code) {
            return Ok(true);
        }
    }

    Ok(false)
}

/// [`verify_code`] against the system clock
pub fn verify_code_now(secret: &str, code: &str) -> Result<bool, TotpError> {
    let now = chrono::Utc::now().timestamp().max(0) as u64;
    verify_code(secret, code, now)
}

/// Builds the `otpauth://` key URI rendered as a QR code by the frontend
pub fn otpauth_url(secret: &str, account: &str) -> Result<String, TotpError> {
    let mut url =
        reqwest::Url::parse("otpauth://totp/").map_err(|e| TotpError::Uri(e.to_string()))?;

    url.path_segments_mut()
        .map_err(|_| TotpError::Uri("otpauth URL cannot be a base".to_string()))?
        .clear()
        .push(&format!("{}:{}", ISSUER, account));

    url.set_query(Some(&format!(
        "secret={}&issuer={}&algorithm=SHA1&digits={}&period={}",
        secret, ISSUER, DIGITS, STEP_SECS
    )));

    Ok(url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    // RFC 6238 appendix B seed for SHA-1: ASCII "12345678901234567890".
    fn rfc_secret() -> String {
        base32_encode(b"12345678901234567890")
    }

    #[test]
    fn test_base32_known_values() {
        assert_eq!(base32_encode(b"foobar"), "MZXW6YTBOI");
        assert_eq!(base32_encode(b"f"), "MY");
        assert_eq!(base32_decode("MZXW6YTBOI").unwrap(), b"foobar");
        assert_eq!(base32_decode("mzxw 6ytb oi======").unwrap(), b"foobar");
        assert!(base32_decode("not*base32").is_err());
        assert!(base32_decode("").is_err());
    }

    #[test]
    fn test_generated_secret_decodes_to_20_bytes() {
        let secret = generate_secret();
        assert_eq!(secret.len(), 32);
        assert_eq!(base32_decode(&secret).unwrap().len(), SECRET_BYTES);
    }

    #[test]
    fn test_rfc6238_sha1_vectors() {
        let secret = rfc_secret();

        let vectors = [
            (59u64, "287082"),
            (1_111_111_109, "081804"),
            (1_111_111_111, "050471"),
            (1_234_567_890, "005924"),
            (2_000_000_000, "279037"),
        ];

        for (time, expected) in vectors {
            assert_eq!(generate_code(&secret, time).unwrap(), expected, "t={time}");
        }
    }

    #[test]
    fn test_verify_accepts_adjacent_steps_only() {
        let secret = rfc_secret();
        let t = 1_111_111_111;
        let code = generate_code(&secret, t).unwrap();

        assert!(verify_code(&secret, &code, t).unwrap());
        assert!(verify_code(&secret, &code, t + STEP_SECS).unwrap());
        assert!(verify_code(&secret, &code, t - STEP_SECS).unwrap());
        assert!(!verify_code(&secret, &code, t + 3 * STEP_SECS).unwrap());
    }

    #[test]
    fn test_verify_rejects_malformed_codes() {
        let secret = rfc_secret();
        assert!(!verify_code(&secret, "12345", 59).unwrap());
        assert!(!verify_code(&secret, "abcdef", 59).unwrap());
        assert!(!verify_code(&secret, "", 59).unwrap());
    }

    #[test]
    fn test_otpauth_url() {
        let url = otpauth_url("JBSWY3DPEHPK3PXP", "alice@example.com").unwrap();

        assert!(url.starts_with("otpauth://totp/Price%20Tracker:alice"));
        assert!(url.contains("secret=JBSWY3DPEHPK3PXP"));
        assert!(url.contains("issuer=Price%20Tracker"));
        assert!(url.contains("digits=6"));
    }
}
