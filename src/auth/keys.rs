//! Key material for token signing and verification
//!
//! Access tokens are signed with an RSA private key and verified with the
//! paired public key, so a verifier-only deployment never holds signing
//! capability. Refresh tokens use a shared secret. All key material is loaded
//! once at startup and injected into the components that need it; nothing
//! reads keys from ambient state at request time.

use jsonwebtoken::{DecodingKey, EncodingKey};
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::config::Config;

#[derive(Error, Debug)]
pub enum KeyError {
    #[error("Failed to read key file {path}: {source}")]
    Unreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid RSA key material: {0}")]
    InvalidKey(String),
}

/// Immutable signing/verification key set
#[derive(Clone)]
pub struct JwtKeys {
    /// RSA private key, access-token signing (RS256)
    pub access_encoding: EncodingKey,
    /// RSA public key, access-token verification
    pub access_decoding: DecodingKey,
    /// Shared secret, refresh-token signing (HS256)
    pub refresh_encoding: EncodingKey,
    /// Shared secret, refresh-token verification
    pub refresh_decoding: DecodingKey,
}

impl JwtKeys {
    /// Build a key set from in-memory PEM and secret material
    pub fn from_pem(
        private_pem: &[u8],
        public_pem: &[u8],
        refresh_secret: &[u8],
    ) -> Result<Self, KeyError> {
        let access_encoding = EncodingKey::from_rsa_pem(private_pem)
            .map_err(|e| KeyError::InvalidKey(format!("private key: {}", e)))?;
        let access_decoding = DecodingKey::from_rsa_pem(public_pem)
            .map_err(|e| KeyError::InvalidKey(format!("public key: {}", e)))?;

        Ok(Self {
            access_encoding,
            access_decoding,
            refresh_encoding: EncodingKey::from_secret(refresh_secret),
            refresh_decoding: DecodingKey::from_secret(refresh_secret),
        })
    }

    /// Load the key set from the paths named in the configuration
    pub fn from_config(config: &Config) -> Result<Self, KeyError> {
        let private_pem = read_key_file(&config.access_token_private_key_path)?;
        let public_pem = read_key_file(&config.access_token_public_key_path)?;

        Self::from_pem(
            &private_pem,
            &public_pem,
            config.refresh_token_secret.as_bytes(),
        )
    }
}

fn read_key_file(path: &str) -> Result<Vec<u8>, KeyError> {
    fs::read(Path::new(path)).map_err(|source| KeyError::Unreadable {
        path: path.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_garbage_pem() {
        let err = JwtKeys::from_pem(b"not a key", b"also not a key", b"secret");
        assert!(matches!(err, Err(KeyError::InvalidKey(_))));
    }

    #[test]
    fn test_missing_key_file_is_an_error() {
        let err = read_key_file("/nonexistent/private.pem");
        assert!(matches!(err, Err(KeyError::Unreadable { .. })));
    }
}
