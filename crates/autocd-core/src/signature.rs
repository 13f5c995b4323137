//! GitHub webhook signature verification.
//!
//! GitHub signs each delivery with `X-Hub-Signature-256: sha256=<hex>`, where
//! the hex digest is HMAC-SHA256 of the raw request body keyed by the shared
//! webhook secret.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Algorithm prefix carried by the signature header.
pub const SIGNATURE_PREFIX: &str = "sha256=";

/// Verify a `sha256=<hex>` signature header against a body and secret.
///
/// Fails closed: a missing prefix, an empty digest or malformed hex all
/// return `false` without computing an HMAC. The digest comparison is
/// constant-time.
pub fn verify_signature(signature: &str, body: &[u8], secret: &str) -> bool {
    let Some(sig_hex) = signature.strip_prefix(SIGNATURE_PREFIX) else {
        return false;
    };
    if sig_hex.is_empty() {
        return false;
    }

    let Ok(sig_bytes) = hex::decode(sig_hex) else {
        return false;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);

    mac.verify_slice(&sig_bytes).is_ok()
}

/// Compute the `sha256=<hex>` header value for a body.
pub fn sign(body: &[u8], secret: &str) -> String {
    format!("{}{}", SIGNATURE_PREFIX, hex::encode(digest(body, secret.as_bytes())))
}

/// Constant-time comparison of two secrets of arbitrary length.
///
/// Both values are MACed under a fixed context so the comparison never
/// short-circuits on length or on the first differing byte.
pub fn secrets_match(provided: &str, expected: &str) -> bool {
    const CONTEXT: &[u8] = b"autocd-token-compare";

    let expected_tag = digest(CONTEXT, expected.as_bytes());
    let Ok(mut mac) = HmacSha256::new_from_slice(provided.as_bytes()) else {
        return false;
    };
    mac.update(CONTEXT);
    mac.verify_slice(&expected_tag).is_ok()
}

fn digest(body: &[u8], key: &[u8]) -> Vec<u8> {
    // HMAC accepts keys of any length, so construction cannot fail here.
    let mut mac = match HmacSha256::new_from_slice(key) {
        Ok(mac) => mac,
        Err(_) => return Vec::new(),
    };
    mac.update(body);
    mac.finalize().into_bytes().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "It's a Secret to Everybody";
    const BODY: &[u8] = b"Hello, World!";

    #[test]
    fn test_github_reference_vector() {
        // Published example from GitHub's webhook validation docs.
        let expected =
            "sha256=757107ea0eb2509fc211221cce984b8a37570b6d7586c22c46f4379c8b043e17";
        assert_eq!(sign(BODY, SECRET), expected);
        assert!(verify_signature(expected, BODY, SECRET));
    }

    #[test]
    fn test_round_trip_for_various_inputs() {
        let cases: &[(&[u8], &str)] = &[
            (b"", ""),
            (b"", "secret"),
            (b"{}", ""),
            (br#"{"head_commit":{"id":"abc"}}"#, "s3cr3t"),
        ];
        for (body, secret) in cases {
            let header = sign(body, secret);
            assert!(verify_signature(&header, body, secret), "{header}");
        }
    }

    #[test]
    fn test_single_bit_flip_in_body_fails() {
        let header = sign(BODY, SECRET);
        for i in 0..BODY.len() {
            for bit in 0..8 {
                let mut tampered = BODY.to_vec();
                tampered[i] ^= 1 << bit;
                assert!(!verify_signature(&header, &tampered, SECRET));
            }
        }
    }

    #[test]
    fn test_tampered_header_fails() {
        let header = sign(BODY, SECRET);
        let mut bytes = header.into_bytes();
        let last = bytes.len() - 1;
        bytes[last] = if bytes[last] == b'0' { b'1' } else { b'0' };
        let tampered = String::from_utf8(bytes).unwrap();
        assert!(!verify_signature(&tampered, BODY, SECRET));
    }

    #[test]
    fn test_wrong_secret_fails() {
        let header = sign(BODY, SECRET);
        assert!(!verify_signature(&header, BODY, "another secret"));
    }

    #[test]
    fn test_missing_prefix_fails_closed() {
        let digest = hex::encode(digest(BODY, SECRET.as_bytes()));
        assert!(!verify_signature(&digest, BODY, SECRET));
        assert!(!verify_signature(&format!("sha1={digest}"), BODY, SECRET));
        assert!(!verify_signature("", BODY, SECRET));
        assert!(!verify_signature("sha256", BODY, SECRET));
        assert!(!verify_signature("sha256=", BODY, SECRET));
    }

    #[test]
    fn test_malformed_hex_fails() {
        assert!(!verify_signature("sha256=zz", BODY, SECRET));
        assert!(!verify_signature("sha256=abc", BODY, SECRET));
    }

    #[test]
    fn test_uppercase_hex_accepted() {
        let header = sign(BODY, SECRET);
        let upper = format!("sha256={}", header[SIGNATURE_PREFIX.len()..].to_uppercase());
        assert!(verify_signature(&upper, BODY, SECRET));
    }

    #[test]
    fn test_secrets_match() {
        assert!(secrets_match("token", "token"));
        assert!(!secrets_match("token", "token2"));
        assert!(!secrets_match("", "token"));
        assert!(secrets_match("", ""));
    }
}
