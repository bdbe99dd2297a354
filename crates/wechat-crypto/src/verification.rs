use sha1::{Digest, Sha1};

use wechat_schema::WeChatError;

/// Computes the request signature: sort the inputs lexicographically,
/// concatenate with no separator, SHA-1, lowercase hex.
pub fn generate_signature(
    token: &str,
    timestamp: &str,
    nonce: &str,
    body: Option<&str>,
) -> String {
    let mut parts = vec![token, timestamp, nonce];
    if let Some(body) = body {
        parts.push(body);
    }
    parts.sort_unstable();
    let mut hasher = Sha1::new();
    for part in parts {
        hasher.update(part.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Verifies an inbound request signature against the shared token.
///
/// Empty signature, timestamp, or nonce is a precondition failure
/// (`InvalidArgument`), not a `false` result. The comparison is
/// case-sensitive over lowercase hex digests.
pub fn verify_signature(
    signature: &str,
    timestamp: &str,
    nonce: &str,
    token: &str,
    body: Option<&str>,
) -> Result<bool, WeChatError> {
    if signature.is_empty() {
        return Err(WeChatError::InvalidArgument("signature"));
    }
    if timestamp.is_empty() {
        return Err(WeChatError::InvalidArgument("timestamp"));
    }
    if nonce.is_empty() {
        return Err(WeChatError::InvalidArgument("nonce"));
    }
    Ok(signature == generate_signature(token, timestamp, nonce, body))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN: &str = "bot-token";
    const TIMESTAMP: &str = "1563268024";
    const NONCE: &str = "1744930484";

    #[test]
    fn round_trip_verifies_with_and_without_body() {
        let signature = generate_signature(TOKEN, TIMESTAMP, NONCE, None);
        assert!(verify_signature(&signature, TIMESTAMP, NONCE, TOKEN, None).unwrap());

        let with_body = generate_signature(TOKEN, TIMESTAMP, NONCE, Some("cipher-body"));
        assert!(
            verify_signature(&with_body, TIMESTAMP, NONCE, TOKEN, Some("cipher-body")).unwrap()
        );
        assert_ne!(signature, with_body);
    }

    #[test]
    fn mutating_any_input_fails_verification() {
        let signature = generate_signature(TOKEN, TIMESTAMP, NONCE, Some("body"));
        assert!(!verify_signature(&signature, "1563268025", NONCE, TOKEN, Some("body")).unwrap());
        assert!(!verify_signature(&signature, TIMESTAMP, "other", TOKEN, Some("body")).unwrap());
        assert!(!verify_signature(&signature, TIMESTAMP, NONCE, "other", Some("body")).unwrap());
        assert!(!verify_signature(&signature, TIMESTAMP, NONCE, TOKEN, Some("tampered")).unwrap());
        assert!(!verify_signature(&signature, TIMESTAMP, NONCE, TOKEN, None).unwrap());
    }

    #[test]
    fn signature_compare_is_case_sensitive() {
        let signature = generate_signature(TOKEN, TIMESTAMP, NONCE, None);
        assert!(signature.chars().any(|c| c.is_ascii_lowercase()));
        let upper = signature.to_ascii_uppercase();
        assert!(!verify_signature(&upper, TIMESTAMP, NONCE, TOKEN, None).unwrap());
    }

    #[test]
    fn empty_inputs_are_precondition_failures() {
        let signature = generate_signature(TOKEN, TIMESTAMP, NONCE, None);
        assert!(matches!(
            verify_signature("", TIMESTAMP, NONCE, TOKEN, None),
            Err(WeChatError::InvalidArgument("signature"))
        ));
        assert!(matches!(
            verify_signature(&signature, "", NONCE, TOKEN, None),
            Err(WeChatError::InvalidArgument("timestamp"))
        ));
        assert!(matches!(
            verify_signature(&signature, TIMESTAMP, "", TOKEN, None),
            Err(WeChatError::InvalidArgument("nonce"))
        ));
    }

    #[test]
    fn digest_is_lowercase_hex() {
        let signature = generate_signature("a", "b", "c", None);
        assert_eq!(signature.len(), 40);
        assert!(signature
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }
}
