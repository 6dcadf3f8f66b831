//! Webhook authenticity checks shared by the adapters.
//!
//! Every check returns `false` on malformed input instead of failing.

use base64::Engine as _;
use hmac::{Hmac, Mac};
use sha1::{Digest, Sha1};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

fn verify_hmac(body: &[u8], secret: &str, expected: &[u8]) -> bool {
  let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
    return false;
  };
  mac.update(body);
  mac.verify_slice(expected).is_ok()
}

/// HMAC-SHA256 over `body`, hex encoded. An optional `sha256=` prefix on the
/// signature is ignored.
pub fn verify_hmac_hex(body: &[u8], signature: &str, secret: &str) -> bool {
  let signature = signature.trim();
  let signature = signature.strip_prefix("sha256=").unwrap_or(signature);
  if secret.is_empty() {
    return false;
  }
  match hex::decode(signature) {
    Ok(expected) => verify_hmac(body, secret, &expected),
    Err(_) => false,
  }
}

/// HMAC-SHA256 over `body`, base64 encoded.
pub fn verify_hmac_base64(body: &[u8], signature: &str, secret: &str) -> bool {
  if secret.is_empty() {
    return false;
  }
  match base64::engine::general_purpose::STANDARD.decode(signature.trim()) {
    Ok(expected) => verify_hmac(body, secret, &expected),
    Err(_) => false,
  }
}

/// Compare two secrets without short-circuiting on the first differing byte.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
  let (a, b) = (a.as_bytes(), b.as_bytes());
  if a.len() != b.len() {
    return false;
  }
  a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// SHA-1 over the lexically sorted concatenation of `parts`, hex encoded.
pub fn sorted_sha1_hex(parts: &[&str]) -> String {
  let mut sorted = parts.to_vec();
  sorted.sort_unstable();
  let mut hasher = Sha1::new();
  for part in sorted {
    hasher.update(part.as_bytes());
  }
  hex::encode(hasher.finalize())
}

/// Sign `body` the way [`verify_hmac_hex`] expects. Used by tests and by
/// widget embed snippets.
pub fn sign_hex(body: &[u8], secret: &str) -> String {
  let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
    return String::new();
  };
  mac.update(body);
  hex::encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn hex_signature_roundtrip_and_prefix() {
    let body = br#"{"object":"page"}"#;
    let sig = sign_hex(body, "app-secret");
    assert!(verify_hmac_hex(body, &sig, "app-secret"));
    assert!(verify_hmac_hex(body, &format!("sha256={sig}"), "app-secret"));
    assert!(!verify_hmac_hex(body, &sig, "other-secret"));
    assert!(!verify_hmac_hex(b"tampered", &sig, "app-secret"));
  }

  #[test]
  fn malformed_signatures_are_rejected() {
    assert!(!verify_hmac_hex(b"x", "not-hex", "s"));
    assert!(!verify_hmac_base64(b"x", "%%%", "s"));
    assert!(!verify_hmac_hex(b"x", "", ""));
  }

  #[test]
  fn constant_time_eq_matches_equality() {
    assert!(constant_time_eq("key-123", "key-123"));
    assert!(!constant_time_eq("key-123", "key-124"));
    assert!(!constant_time_eq("key", "key-123"));
  }

  #[test]
  fn sorted_sha1_ignores_argument_order() {
    assert_eq!(
      sorted_sha1_hex(&["token", "1710000000", "abc"]),
      sorted_sha1_hex(&["abc", "token", "1710000000"])
    );
  }
}
