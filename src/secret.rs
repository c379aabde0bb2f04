//! Signing-secret model: symmetric (HS256) or asymmetric (RS256) material.
//!
//! Construction validates and normalizes caller input so that an invalid
//! secret cannot exist past startup. The asymmetric variant parses the
//! private key (PKCS#8 or PKCS#1 PEM, optionally password-encrypted),
//! re-encodes it as PKCS#8 and derives the public key used for
//! verification. The symmetric variant treats any bytes as an opaque HMAC
//! key, including bytes that happen to look like a PEM key.

use std::fmt;

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey};
use rsa::{
    RsaPrivateKey, RsaPublicKey,
    pkcs1::DecodeRsaPrivateKey,
    pkcs8::{DecodePrivateKey, EncodePrivateKey, EncodePublicKey, LineEnding},
};
use thiserror::Error;

/// Secret construction failures. All fatal: a manager cannot be built from
/// an invalid secret.
#[derive(Debug, Error)]
pub enum SecretError {
    /// The input is not a PEM-encoded RSA private key, or the password is
    /// missing/wrong for encrypted key material.
    #[error("secret is not an asymmetric private key: {0}")]
    KeyParse(String),

    /// The parsed key could not be re-encoded (PKCS#8 private / SPKI public).
    #[error("failed to normalize key material: {0}")]
    KeyEncode(String),
}

/// Opaque HMAC key. Signing and verification share the same bytes.
pub struct SymmetricSecret {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

/// RSA key pair, normalized at construction. Signs with the private key,
/// verifies with the derived public key.
pub struct AsymmetricSecret {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    public_key_pem: String,
}

/// Signing material for a [`LoginManager`](crate::LoginManager), tagged by
/// algorithm family. Immutable once constructed.
pub enum Secret {
    Symmetric(SymmetricSecret),
    Asymmetric(AsymmetricSecret),
}

impl Secret {
    /// Build an HS256 secret. Any byte value is acceptable.
    pub fn symmetric(key: impl AsRef<[u8]>) -> Self {
        let key = key.as_ref();
        Secret::Symmetric(SymmetricSecret {
            encoding_key: EncodingKey::from_secret(key),
            decoding_key: DecodingKey::from_secret(key),
        })
    }

    /// Build an RS256 secret from an unencrypted PEM private key
    /// (PKCS#8 `PRIVATE KEY` or PKCS#1 `RSA PRIVATE KEY`).
    pub fn asymmetric(private_key_pem: impl AsRef<[u8]>) -> Result<Self, SecretError> {
        Self::build_asymmetric(private_key_pem.as_ref(), None)
    }

    /// Build an RS256 secret from an encrypted PKCS#8 PEM private key,
    /// decrypting it with `password`.
    pub fn asymmetric_with_password(
        private_key_pem: impl AsRef<[u8]>,
        password: impl AsRef<[u8]>,
    ) -> Result<Self, SecretError> {
        Self::build_asymmetric(private_key_pem.as_ref(), Some(password.as_ref()))
    }

    fn build_asymmetric(pem: &[u8], password: Option<&[u8]>) -> Result<Self, SecretError> {
        let pem = std::str::from_utf8(pem)
            .map_err(|_| SecretError::KeyParse("input is not valid UTF-8 PEM".to_string()))?;
        let private_key = decode_private_key(pem, password)?;

        // Normalize: PKCS#8 for the private half, SPKI for the public half.
        let private_key_pem = private_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| SecretError::KeyEncode(e.to_string()))?;
        let public_key_pem = RsaPublicKey::from(&private_key)
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| SecretError::KeyEncode(e.to_string()))?;

        let encoding_key = EncodingKey::from_rsa_pem(private_key_pem.as_bytes())
            .map_err(|e| SecretError::KeyEncode(e.to_string()))?;
        let decoding_key = DecodingKey::from_rsa_pem(public_key_pem.as_bytes())
            .map_err(|e| SecretError::KeyEncode(e.to_string()))?;

        Ok(Secret::Asymmetric(AsymmetricSecret {
            encoding_key,
            decoding_key,
            public_key_pem,
        }))
    }

    /// The JWT algorithm implied by this secret.
    pub fn algorithm(&self) -> Algorithm {
        match self {
            Secret::Symmetric(_) => Algorithm::HS256,
            Secret::Asymmetric(_) => Algorithm::RS256,
        }
    }

    /// Key material used to sign tokens.
    pub fn key_for_signing(&self) -> &EncodingKey {
        match self {
            Secret::Symmetric(secret) => &secret.encoding_key,
            Secret::Asymmetric(secret) => &secret.encoding_key,
        }
    }

    /// Key material used to verify tokens. Identical to the signing key
    /// only for the symmetric variant.
    pub fn key_for_verification(&self) -> &DecodingKey {
        match self {
            Secret::Symmetric(secret) => &secret.decoding_key,
            Secret::Asymmetric(secret) => &secret.decoding_key,
        }
    }

    /// Derived public key in SPKI PEM form (asymmetric only).
    pub fn public_key_pem(&self) -> Option<&str> {
        match self {
            Secret::Symmetric(_) => None,
            Secret::Asymmetric(secret) => Some(&secret.public_key_pem),
        }
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Do not print key material
        f.debug_struct("Secret")
            .field("algorithm", &self.algorithm())
            .finish()
    }
}

fn decode_private_key(pem: &str, password: Option<&[u8]>) -> Result<RsaPrivateKey, SecretError> {
    if let Some(password) = password {
        return RsaPrivateKey::from_pkcs8_encrypted_pem(pem, password)
            .map_err(|e| SecretError::KeyParse(e.to_string()));
    }
    if let Ok(key) = RsaPrivateKey::from_pkcs8_pem(pem) {
        return Ok(key);
    }
    if let Ok(key) = RsaPrivateKey::from_pkcs1_pem(pem) {
        return Ok(key);
    }
    Err(SecretError::KeyParse(
        "expected an RSA private key in PEM form".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::pkcs1::EncodeRsaPrivateKey;

    fn generate_private_key() -> RsaPrivateKey {
        RsaPrivateKey::new(&mut rand::thread_rng(), 2048).expect("generate rsa key")
    }

    #[test]
    fn symmetric_accepts_any_bytes() {
        let secret = Secret::symmetric("s3cr3t");
        assert_eq!(secret.algorithm(), Algorithm::HS256);
        assert!(secret.public_key_pem().is_none());
    }

    #[test]
    fn symmetric_accepts_pem_shaped_bytes_opaquely() {
        let pem = generate_private_key()
            .to_pkcs8_pem(LineEnding::LF)
            .expect("pkcs8 pem");
        let secret = Secret::symmetric(pem.as_bytes());
        assert_eq!(secret.algorithm(), Algorithm::HS256);
    }

    #[test]
    fn asymmetric_parses_pkcs8_and_derives_public_key() {
        let pem = generate_private_key()
            .to_pkcs8_pem(LineEnding::LF)
            .expect("pkcs8 pem");
        let secret = Secret::asymmetric(pem.as_bytes()).expect("valid pkcs8 key");
        assert_eq!(secret.algorithm(), Algorithm::RS256);
        assert!(
            secret
                .public_key_pem()
                .unwrap()
                .starts_with("-----BEGIN PUBLIC KEY-----")
        );
    }

    #[test]
    fn asymmetric_parses_pkcs1() {
        let pem = generate_private_key()
            .to_pkcs1_pem(LineEnding::LF)
            .expect("pkcs1 pem");
        let secret = Secret::asymmetric(pem.as_bytes()).expect("valid pkcs1 key");
        assert_eq!(secret.algorithm(), Algorithm::RS256);
    }

    #[test]
    fn asymmetric_rejects_non_key_bytes() {
        let err = Secret::asymmetric(b"definitely not a pem key").unwrap_err();
        assert!(matches!(err, SecretError::KeyParse(_)));
    }

    #[test]
    fn encrypted_key_roundtrips_with_password() {
        let key = generate_private_key();
        let encrypted = key
            .to_pkcs8_encrypted_pem(&mut rand::thread_rng(), b"hunter2", LineEnding::LF)
            .expect("encrypt pem");

        let secret =
            Secret::asymmetric_with_password(encrypted.as_bytes(), b"hunter2").expect("decrypt");
        assert_eq!(secret.algorithm(), Algorithm::RS256);

        let err = Secret::asymmetric_with_password(encrypted.as_bytes(), b"wrong").unwrap_err();
        assert!(matches!(err, SecretError::KeyParse(_)));
    }
}
