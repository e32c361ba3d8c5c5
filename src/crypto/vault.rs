//! Credential Vault: AES-256-GCM protection for sensitive connection fields
//!
//! Only fields whose schema entry sets `encrypt` pass through the vault.
//! Ciphertext is stored as `base64(nonce):base64(ciphertext)`.

use crate::domain::FieldSchema;
use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::RngCore;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Number of trailing characters left visible by [`CredentialVault::mask`]
pub const MASK_VISIBLE_SUFFIX: usize = 4;

const NONCE_LEN: usize = 12;

/// Encryption key for AES-256-GCM
#[derive(Clone)]
pub struct EncryptionKey {
    key: [u8; 32],
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EncryptionKey(***)")
    }
}

/// Encryption error types
#[derive(Error, Debug)]
pub enum EncryptionError {
    #[error("Invalid key: must be exactly 32 bytes (256 bits)")]
    InvalidKeyLength,

    #[error("Invalid base64 encoding: {0}")]
    Base64Error(#[from] base64::DecodeError),

    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Decryption failed: invalid ciphertext or wrong key")]
    DecryptionFailed,

    #[error("Invalid ciphertext format")]
    InvalidCiphertextFormat,

    #[error("Field `{0}` must hold a string to be encrypted")]
    NonStringField(String),
}

impl EncryptionKey {
    pub fn new(key: [u8; 32]) -> Self {
        Self { key }
    }

    /// Create encryption key from a base64-encoded string
    pub fn from_base64(encoded: &str) -> Result<Self, EncryptionError> {
        let bytes = BASE64.decode(encoded.trim())?;
        let key: [u8; 32] = bytes
            .try_into()
            .map_err(|_| EncryptionError::InvalidKeyLength)?;
        Ok(Self { key })
    }
}

/// Encrypts and decrypts sensitive credential fields
#[derive(Clone, Debug)]
pub struct CredentialVault {
    key: EncryptionKey,
}

impl CredentialVault {
    pub fn new(key: EncryptionKey) -> Self {
        Self { key }
    }

    fn cipher(&self) -> Result<Aes256Gcm, EncryptionError> {
        Aes256Gcm::new_from_slice(&self.key.key).map_err(|_| EncryptionError::InvalidKeyLength)
    }

    /// Encrypt one value with a fresh random nonce.
    ///
    /// Callers must not pass values that are already ciphertext.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, EncryptionError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);

        let ciphertext = self
            .cipher()?
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_bytes())
            .map_err(|_| EncryptionError::EncryptionFailed)?;

        Ok(format!(
            "{}:{}",
            BASE64.encode(nonce_bytes),
            BASE64.encode(ciphertext)
        ))
    }

    pub fn decrypt(&self, encrypted: &str) -> Result<String, EncryptionError> {
        let (nonce_b64, ciphertext_b64) = encrypted
            .split_once(':')
            .ok_or(EncryptionError::InvalidCiphertextFormat)?;
        if ciphertext_b64.contains(':') {
            return Err(EncryptionError::InvalidCiphertextFormat);
        }

        let nonce_bytes = BASE64.decode(nonce_b64)?;
        if nonce_bytes.len() != NONCE_LEN {
            return Err(EncryptionError::InvalidCiphertextFormat);
        }
        let ciphertext = BASE64.decode(ciphertext_b64)?;

        let plaintext = self
            .cipher()?
            .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_ref())
            .map_err(|_| EncryptionError::DecryptionFailed)?;

        String::from_utf8(plaintext).map_err(|_| EncryptionError::DecryptionFailed)
    }

    /// Encrypt every `encrypt=true` field of a plaintext field map.
    pub fn encrypt_fields(
        &self,
        schema: &FieldSchema,
        fields: &HashMap<String, Value>,
    ) -> Result<HashMap<String, Value>, EncryptionError> {
        self.transform_fields(schema, fields, |value| self.encrypt(value))
    }

    /// Reverse of [`encrypt_fields`](Self::encrypt_fields).
    pub fn decrypt_fields(
        &self,
        schema: &FieldSchema,
        fields: &HashMap<String, Value>,
    ) -> Result<HashMap<String, Value>, EncryptionError> {
        self.transform_fields(schema, fields, |value| self.decrypt(value))
    }

    fn transform_fields<F>(
        &self,
        schema: &FieldSchema,
        fields: &HashMap<String, Value>,
        transform: F,
    ) -> Result<HashMap<String, Value>, EncryptionError>
    where
        F: Fn(&str) -> Result<String, EncryptionError>,
    {
        let mut out = fields.clone();
        for name in schema.encrypted_fields() {
            match fields.get(name) {
                None | Some(Value::Null) => {}
                Some(Value::String(s)) if s.is_empty() => {}
                Some(Value::String(s)) => {
                    out.insert(name.to_string(), Value::String(transform(s)?));
                }
                Some(_) => return Err(EncryptionError::NonStringField(name.to_string())),
            }
        }
        Ok(out)
    }

    /// Mask a plaintext value, leaving only a short suffix visible.
    pub fn mask(plaintext: &str) -> String {
        let chars: Vec<char> = plaintext.chars().collect();
        if chars.len() <= MASK_VISIBLE_SUFFIX {
            return "*".repeat(chars.len());
        }
        let hidden = chars.len() - MASK_VISIBLE_SUFFIX;
        let suffix: String = chars[hidden..].iter().collect();
        format!("{}{}", "*".repeat(hidden), suffix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FieldSpec;
    use rstest::rstest;
    use serde_json::json;

    fn vault() -> CredentialVault {
        CredentialVault::new(EncryptionKey::new([0x42u8; 32]))
    }

    #[rstest]
    #[case("my-secret-password")]
    #[case("")]
    #[case("key-3ax6xnjp29jd6fds4gc373sgvjxteol0")]
    #[case("pässwörd with ünïcode")]
    fn test_encrypt_decrypt(#[case] plaintext: &str) {
        let vault = vault();
        let encrypted = vault.encrypt(plaintext).unwrap();
        assert_ne!(encrypted, plaintext);
        assert_eq!(vault.decrypt(&encrypted).unwrap(), plaintext);
    }

    #[test]
    fn test_encrypt_uses_fresh_nonce() {
        let vault = vault();
        let first = vault.encrypt("same").unwrap();
        let second = vault.encrypt("same").unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_decrypt_wrong_key_fails() {
        let encrypted = vault().encrypt("secret").unwrap();
        let other = CredentialVault::new(EncryptionKey::new([0xffu8; 32]));
        assert!(matches!(
            other.decrypt(&encrypted),
            Err(EncryptionError::DecryptionFailed)
        ));
    }

    #[rstest]
    #[case("invalid")]
    #[case("a:b:c")]
    #[case("AAAA:AAAA")]
    fn test_decrypt_invalid_format(#[case] input: &str) {
        assert!(matches!(
            vault().decrypt(input),
            Err(EncryptionError::InvalidCiphertextFormat)
        ));
    }

    #[test]
    fn test_decrypt_invalid_base64() {
        assert!(matches!(
            vault().decrypt("!!!:valid"),
            Err(EncryptionError::Base64Error(_))
        ));
    }

    #[test]
    fn test_key_from_base64() {
        let encoded = BASE64.encode([0x42u8; 32]);
        assert!(EncryptionKey::from_base64(&encoded).is_ok());

        let short = BASE64.encode([0x42u8; 16]);
        assert!(matches!(
            EncryptionKey::from_base64(&short),
            Err(EncryptionError::InvalidKeyLength)
        ));
    }

    #[test]
    fn test_key_debug_is_redacted() {
        let output = format!("{:?}", vault());
        assert!(!output.contains("66"));
        assert!(output.contains("***"));
    }

    #[test]
    fn test_field_encryption_only_touches_flagged_fields() {
        let schema = FieldSchema::new(vec![
            FieldSpec::password("api_key", "API Key").required().encrypted(),
            FieldSpec::text("domain", "Domain").required(),
            FieldSpec::password("token", "Token").encrypted(),
        ]);
        let fields = HashMap::from([
            ("api_key".to_string(), json!("key-123")),
            ("domain".to_string(), json!("mg.example.com")),
            ("token".to_string(), json!("")),
        ]);

        let vault = vault();
        let encrypted = vault.encrypt_fields(&schema, &fields).unwrap();
        assert_ne!(encrypted["api_key"], json!("key-123"));
        assert_eq!(encrypted["domain"], json!("mg.example.com"));
        assert_eq!(encrypted["token"], json!(""));

        let decrypted = vault.decrypt_fields(&schema, &encrypted).unwrap();
        assert_eq!(decrypted, fields);
    }

    #[test]
    fn test_field_encryption_rejects_non_strings() {
        let schema = FieldSchema::new(vec![FieldSpec::password("api_key", "API Key").encrypted()]);
        let fields = HashMap::from([("api_key".to_string(), json!(42))]);
        assert!(matches!(
            vault().encrypt_fields(&schema, &fields),
            Err(EncryptionError::NonStringField(_))
        ));
    }

    #[rstest]
    #[case("key-abcdef123456", "************3456")]
    #[case("abcde", "*bcde")]
    #[case("abcd", "****")]
    #[case("", "")]
    fn test_mask(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(CredentialVault::mask(input), expected);
    }
}
