use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Lower-case hex HMAC-SHA256 of `message`.
pub fn hmac_sha256_hex(secret: &[u8], message: &[u8]) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret).ok()?;
    mac.update(message);
    Some(hex::encode(mac.finalize().into_bytes()))
}

/// Compares a provided hex signature against the expected one without
/// leaking where they differ.
pub fn verify_hex(secret: &[u8], message: &[u8], provided: &str) -> bool {
    let Some(expected) = hmac_sha256_hex(secret, message) else {
        return false;
    };
    let expected = expected.as_bytes();
    let provided = provided.trim().as_bytes();

    // Length is public: always 64 hex chars for SHA-256.
    if expected.len() != provided.len() {
        return false;
    }
    expected.ct_eq(provided).into()
}

/// Parts of a `t=<unix>,v1=<hex>[,v1=<hex>...]` header.
#[derive(Debug, PartialEq, Eq)]
pub struct TimestampedSignature<'a> {
    pub timestamp: i64,
    pub raw_timestamp: &'a str,
    pub signatures: Vec<&'a str>,
}

pub fn parse_timestamped(header: &str) -> Option<TimestampedSignature<'_>> {
    let mut raw_timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        let part = part.trim();
        if let Some(t) = part.strip_prefix("t=") {
            raw_timestamp = Some(t);
        } else if let Some(s) = part.strip_prefix("v1=") {
            signatures.push(s);
        }
    }

    let raw_timestamp = raw_timestamp?;
    let timestamp = raw_timestamp.parse().ok()?;
    if signatures.is_empty() {
        return None;
    }
    Some(TimestampedSignature {
        timestamp,
        raw_timestamp,
        signatures,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_accepts_own_signature_and_rejects_tampering() {
        let sig = hmac_sha256_hex(b"whsec", b"{\"a\":1}").unwrap();
        assert!(verify_hex(b"whsec", b"{\"a\":1}", &sig));
        assert!(!verify_hex(b"whsec", b"{\"a\":2}", &sig));
        assert!(!verify_hex(b"other", b"{\"a\":1}", &sig));
    }

    #[test]
    fn malformed_signatures_are_false_not_errors() {
        assert!(!verify_hex(b"whsec", b"x", ""));
        assert!(!verify_hex(b"whsec", b"x", "zz"));
        assert!(!verify_hex(b"whsec", b"x", "é"));
        assert!(parse_timestamped("garbage").is_none());
        assert!(parse_timestamped("t=abc,v1=00").is_none());
        assert!(parse_timestamped("t=100").is_none());
    }

    #[test]
    fn parses_timestamped_header() {
        let parsed = parse_timestamped("t=1700000000,v1=abc,v0=ignored,v1=def").unwrap();
        assert_eq!(parsed.timestamp, 1_700_000_000);
        assert_eq!(parsed.signatures, vec!["abc", "def"]);
    }
}
