//! PII redaction with a reversible placeholder map.
//!
//! Emails, usernames, `username-HOST` pairs, home-directory path segments,
//! and chat handles become stable `USER_N`/`HOST_N` placeholders. The map is
//! bidirectional so model output can be deanonymised before it reaches an
//! analyst, and it encrypts under the tenant redaction key for storage.
//! IPs and file hashes are indicators, not PII, and pass through untouched.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use once_cell::sync::Lazy;
use rand::RngCore;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::GatewayError;

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}\b").expect("email regex")
});
// alice-WS01234, jsmith-LAPTOP99
static USER_HOST_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b([a-z][a-z0-9._]{2,31})-([A-Z][A-Z0-9-]{2,23})\b").expect("user-host regex"));
static HOME_PATH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(/home/|/Users/)([a-zA-Z][a-zA-Z0-9._-]{1,31})(/)").expect("home path regex"));
static HANDLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(^|\s)@([a-zA-Z][a-zA-Z0-9._-]{2,31})\b").expect("handle regex"));
static PLACEHOLDER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:USER|HOST)_\d+\b").expect("placeholder regex"));

/// Bidirectional original <-> placeholder map. Reused across a whole
/// investigation so the same principal always gets the same placeholder.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RedactionMap {
    forward: HashMap<String, String>,
    reverse: HashMap<String, String>,
    user_count: u32,
    host_count: u32,
}

impl RedactionMap {
    pub fn new() -> Self {
        Self::default()
    }

    fn placeholder_for_user(&mut self, original: &str) -> String {
        if let Some(p) = self.forward.get(original) {
            return p.clone();
        }
        self.user_count += 1;
        let p = format!("USER_{}", self.user_count);
        self.forward.insert(original.to_string(), p.clone());
        self.reverse.insert(p.clone(), original.to_string());
        p
    }

    fn placeholder_for_host(&mut self, original: &str) -> String {
        if let Some(p) = self.forward.get(original) {
            return p.clone();
        }
        self.host_count += 1;
        let p = format!("HOST_{}", self.host_count);
        self.forward.insert(original.to_string(), p.clone());
        self.reverse.insert(p.clone(), original.to_string());
        p
    }

    pub fn len(&self) -> usize {
        self.forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }

    /// Serialize and encrypt under a 32-byte key (AES-256-GCM, random nonce,
    /// `nonce || ciphertext` base64-encoded).
    pub fn encrypt(&self, key: &[u8; 32]) -> Result<String, GatewayError> {
        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|e| GatewayError::Cipher(e.to_string()))?;
        let mut nonce_bytes = [0u8; 12];
        rand::rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);
        let plaintext = serde_json::to_vec(self).map_err(|e| GatewayError::Cipher(e.to_string()))?;
        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_ref())
            .map_err(|e| GatewayError::Cipher(e.to_string()))?;
        let mut out = nonce_bytes.to_vec();
        out.extend(ciphertext);
        Ok(BASE64.encode(out))
    }

    /// Decrypt with the matching key. A wrong key fails authentication.
    pub fn decrypt(encoded: &str, key: &[u8; 32]) -> Result<Self, GatewayError> {
        let bytes = BASE64
            .decode(encoded)
            .map_err(|e| GatewayError::Cipher(e.to_string()))?;
        if bytes.len() < 12 {
            return Err(GatewayError::Cipher("ciphertext too short".into()));
        }
        let (nonce_bytes, ciphertext) = bytes.split_at(12);
        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|e| GatewayError::Cipher(e.to_string()))?;
        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| GatewayError::Cipher("decryption failed (wrong key or corrupt data)".into()))?;
        serde_json::from_slice(&plaintext).map_err(|e| GatewayError::Cipher(e.to_string()))
    }
}

/// Stateless redactor; all memory lives in the map the caller holds.
pub struct PiiRedactor;

impl PiiRedactor {
    /// Replace PII with placeholders, recording originals in `map`.
    pub fn redact(text: &str, map: &mut RedactionMap) -> String {
        // Order matters: user-host pairs first so the username piece is not
        // consumed by a later pass.
        let step1 = USER_HOST_RE.replace_all(text, |caps: &Captures| {
            let user = map.placeholder_for_user(&caps[1]);
            let host = map.placeholder_for_host(&caps[2]);
            format!("{user}-{host}")
        });
        let step2 = EMAIL_RE.replace_all(&step1, |caps: &Captures| {
            map.placeholder_for_user(&caps[0])
        });
        let step3 = HOME_PATH_RE.replace_all(&step2, |caps: &Captures| {
            let user = map.placeholder_for_user(&caps[2]);
            format!("{}{}{}", &caps[1], user, &caps[3])
        });
        let step4 = HANDLE_RE.replace_all(&step3, |caps: &Captures| {
            let user = map.placeholder_for_user(&format!("@{}", &caps[2]));
            format!("{}{}", &caps[1], user)
        });
        step4.into_owned()
    }

    /// Restore originals for every placeholder present in `text`.
    pub fn deanonymise(text: &str, map: &RedactionMap) -> String {
        PLACEHOLDER_RE
            .replace_all(text, |caps: &Captures| {
                map.reverse
                    .get(&caps[0])
                    .cloned()
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_redaction_round_trip() {
        let mut map = RedactionMap::new();
        let text = "Alert raised by alice.smith@example.com after hours.";
        let redacted = PiiRedactor::redact(text, &mut map);
        assert!(!redacted.contains("alice.smith@example.com"));
        assert!(redacted.contains("USER_1"));
        assert_eq!(PiiRedactor::deanonymise(&redacted, &map), text);
    }

    #[test]
    fn test_placeholders_are_stable() {
        let mut map = RedactionMap::new();
        let first = PiiRedactor::redact("login by bob@corp.example", &mut map);
        let second = PiiRedactor::redact("logout by bob@corp.example", &mut map);
        assert!(first.contains("USER_1"));
        assert!(second.contains("USER_1"));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_user_host_pattern() {
        let mut map = RedactionMap::new();
        let text = "Process started on jsmith-WS01234 by local account.";
        let redacted = PiiRedactor::redact(text, &mut map);
        assert!(redacted.contains("USER_1-HOST_1"));
        assert_eq!(PiiRedactor::deanonymise(&redacted, &map), text);
    }

    #[test]
    fn test_home_path_segment() {
        let mut map = RedactionMap::new();
        let text = "Dropped file at /home/carol/downloads/payload.bin";
        let redacted = PiiRedactor::redact(text, &mut map);
        assert!(redacted.contains("/home/USER_1/"));
        assert!(!redacted.contains("carol"));
        assert_eq!(PiiRedactor::deanonymise(&redacted, &map), text);
    }

    #[test]
    fn test_chat_handle() {
        let mut map = RedactionMap::new();
        let text = "Reported in slack by @dave_ops yesterday.";
        let redacted = PiiRedactor::redact(text, &mut map);
        assert!(!redacted.contains("@dave_ops"));
        assert_eq!(PiiRedactor::deanonymise(&redacted, &map), text);
    }

    #[test]
    fn test_ips_and_hashes_pass_through() {
        let mut map = RedactionMap::new();
        let text = "Beacon 203.0.113.7, hash d41d8cd98f00b204e9800998ecf8427e.";
        let redacted = PiiRedactor::redact(text, &mut map);
        assert_eq!(redacted, text);
        assert!(map.is_empty());
    }

    #[test]
    fn test_encrypt_decrypt_round_trip() {
        let mut map = RedactionMap::new();
        PiiRedactor::redact("eve@example.com on eve-HOSTX1", &mut map);
        let key = [7u8; 32];
        let encrypted = map.encrypt(&key).unwrap();
        let decrypted = RedactionMap::decrypt(&encrypted, &key).unwrap();
        assert_eq!(decrypted, map);
    }

    #[test]
    fn test_wrong_key_fails() {
        let mut map = RedactionMap::new();
        PiiRedactor::redact("eve@example.com", &mut map);
        let encrypted = map.encrypt(&[7u8; 32]).unwrap();
        assert!(RedactionMap::decrypt(&encrypted, &[8u8; 32]).is_err());
    }
}
