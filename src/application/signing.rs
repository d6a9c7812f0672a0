use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Hex-encoded HMAC-SHA256 over `payload`.
pub fn sign_hex_hmac(key: &[u8], payload: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time verification of a hex signature.
pub fn verify_hex_hmac(key: &[u8], payload: &[u8], signature_hex: &str) -> bool {
    let Ok(signature) = hex::decode(signature_hex.trim()) else {
        return false;
    };
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(payload);
    mac.verify_slice(&signature).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_is_deterministic() {
        let a = sign_hex_hmac(b"secret", b"payload");
        let b = sign_hex_hmac(b"secret", b"payload");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn signature_changes_with_key_and_payload() {
        let base = sign_hex_hmac(b"secret", b"payload");
        assert_ne!(base, sign_hex_hmac(b"other", b"payload"));
        assert_ne!(base, sign_hex_hmac(b"secret", b"payload2"));
    }

    #[test]
    fn verify_accepts_matching_signature() {
        let sig = sign_hex_hmac(b"secret", b"payload");
        assert!(verify_hex_hmac(b"secret", b"payload", &sig));
        assert!(verify_hex_hmac(b"secret", b"payload", &format!("  {sig}\n")));
    }

    #[test]
    fn verify_rejects_bad_input() {
        let sig = sign_hex_hmac(b"secret", b"payload");
        assert!(!verify_hex_hmac(b"other", b"payload", &sig));
        assert!(!verify_hex_hmac(b"secret", b"tampered", &sig));
        assert!(!verify_hex_hmac(b"secret", b"payload", "not-hex"));
        assert!(!verify_hex_hmac(b"secret", b"payload", ""));
    }
}
