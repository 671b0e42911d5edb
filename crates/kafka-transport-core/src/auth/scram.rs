//! Client-side SASL/SCRAM implementation.
//!
//! SCRAM (Salted Challenge Response Authentication Mechanism) provides secure
//! password-based authentication without transmitting the password in
//! cleartext.
//!
//! Supports:
//! - SCRAM-SHA-256 (RFC 7677)
//! - SCRAM-SHA-512 (RFC 7677 variant)
//!
//! One [`ScramClient`] drives one authentication exchange:
//! `first_message` → server challenge → `final_message` → `verify_server_final`.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hmac::{Hmac, Mac};
use pbkdf2::pbkdf2_hmac;
use rand::Rng;
use sha2::{Digest, Sha256, Sha512};
use tracing::warn;

use crate::error::{AuthError, AuthResult};

/// Minimum number of PBKDF2 iterations (per RFC 7677)
pub const MIN_ITERATIONS: u32 = 4096;

/// Nonce length in bytes
pub const NONCE_LENGTH: usize = 24;

/// GS2 header for clients that do not use channel binding.
const GS2_HEADER: &str = "n,,";

/// Base64 of the GS2 header, sent back in the final message.
const CHANNEL_BINDING: &str = "biws";

/// Hash function backing a SCRAM exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScramHashKind {
    /// SCRAM-SHA-256
    Sha256,
    /// SCRAM-SHA-512
    Sha512,
}

impl ScramHashKind {
    /// The mechanism name as used in the SASL handshake.
    #[must_use]
    pub fn mechanism_name(&self) -> &'static str {
        match self {
            Self::Sha256 => "SCRAM-SHA-256",
            Self::Sha512 => "SCRAM-SHA-512",
        }
    }

    fn hmac(&self, key: &[u8], data: &[u8]) -> Vec<u8> {
        match self {
            Self::Sha256 => {
                let mut mac =
                    Hmac::<Sha256>::new_from_slice(key).expect("HMAC can take key of any size");
                mac.update(data);
                mac.finalize().into_bytes().to_vec()
            }
            Self::Sha512 => {
                let mut mac =
                    Hmac::<Sha512>::new_from_slice(key).expect("HMAC can take key of any size");
                mac.update(data);
                mac.finalize().into_bytes().to_vec()
            }
        }
    }

    fn hash(&self, data: &[u8]) -> Vec<u8> {
        match self {
            Self::Sha256 => Sha256::digest(data).to_vec(),
            Self::Sha512 => Sha512::digest(data).to_vec(),
        }
    }

    fn pbkdf2(&self, password: &[u8], salt: &[u8], iterations: u32) -> Vec<u8> {
        match self {
            Self::Sha256 => {
                let mut output = vec![0u8; 32];
                pbkdf2_hmac::<Sha256>(password, salt, iterations, &mut output);
                output
            }
            Self::Sha512 => {
                let mut output = vec![0u8; 64];
                pbkdf2_hmac::<Sha512>(password, salt, iterations, &mut output);
                output
            }
        }
    }
}

/// Client side of one SCRAM authentication exchange.
///
/// The transport layer creates a fresh client per connection attempt via
/// [`crate::auth::SaslAuthentication::scram_client`].
#[derive(Debug)]
pub struct ScramClient {
    hash: ScramHashKind,
    username: String,
    password: String,
    client_nonce: String,
    client_first_bare: Option<String>,
    expected_server_signature: Option<Vec<u8>>,
}

impl ScramClient {
    /// Create a new client with a random nonce.
    #[must_use]
    pub fn new(hash: ScramHashKind, username: &str, password: &str) -> Self {
        let nonce_bytes: Vec<u8> = rand::thread_rng()
            .sample_iter(rand::distributions::Standard)
            .take(NONCE_LENGTH)
            .collect();
        Self::with_nonce(hash, username, password, &BASE64.encode(nonce_bytes))
    }

    /// Create a client with an explicit nonce (exchange vectors in tests).
    pub(crate) fn with_nonce(
        hash: ScramHashKind,
        username: &str,
        password: &str,
        nonce: &str,
    ) -> Self {
        Self {
            hash,
            username: username.to_string(),
            password: password.to_string(),
            client_nonce: nonce.to_string(),
            client_first_bare: None,
            expected_server_signature: None,
        }
    }

    /// Produce the client-first message.
    pub fn first_message(&mut self) -> String {
        let bare = format!("n={},r={}", saslname(&self.username), self.client_nonce);
        let message = format!("{GS2_HEADER}{bare}");
        self.client_first_bare = Some(bare);
        message
    }

    /// Consume the server-first message and produce the client-final message.
    ///
    /// # Errors
    ///
    /// Returns an error if the challenge is malformed, the server nonce does
    /// not extend the client nonce, or the exchange is out of order.
    pub fn final_message(&mut self, server_first: &str) -> AuthResult<String> {
        let client_first_bare = self
            .client_first_bare
            .clone()
            .ok_or_else(|| AuthError::SaslProtocol("first_message not sent yet".to_string()))?;

        let attributes = parse_attributes(server_first)?;
        let combined_nonce = attributes
            .iter()
            .find(|(k, _)| *k == "r")
            .map(|(_, v)| v.to_string())
            .ok_or_else(|| AuthError::SaslProtocol("missing nonce in challenge".to_string()))?;
        let salt_b64 = attributes
            .iter()
            .find(|(k, _)| *k == "s")
            .map(|(_, v)| *v)
            .ok_or_else(|| AuthError::SaslProtocol("missing salt in challenge".to_string()))?;
        let iterations: u32 = attributes
            .iter()
            .find(|(k, _)| *k == "i")
            .and_then(|(_, v)| v.parse().ok())
            .ok_or_else(|| {
                AuthError::SaslProtocol("missing iteration count in challenge".to_string())
            })?;

        if !combined_nonce.starts_with(&self.client_nonce) {
            return Err(AuthError::SaslProtocol(
                "server nonce does not extend client nonce".to_string(),
            ));
        }
        if iterations < MIN_ITERATIONS {
            warn!(iterations, "server requested fewer iterations than RFC 7677 minimum");
        }

        let salt = BASE64
            .decode(salt_b64)
            .map_err(|e| AuthError::SaslProtocol(format!("invalid salt encoding: {e}")))?;

        let salted_password = self.hash.pbkdf2(self.password.as_bytes(), &salt, iterations);
        let client_key = self.hash.hmac(&salted_password, b"Client Key");
        let stored_key = self.hash.hash(&client_key);
        let server_key = self.hash.hmac(&salted_password, b"Server Key");

        let without_proof = format!("c={CHANNEL_BINDING},r={combined_nonce}");
        let auth_message = format!("{client_first_bare},{server_first},{without_proof}");

        let client_signature = self.hash.hmac(&stored_key, auth_message.as_bytes());
        let proof: Vec<u8> = client_key
            .iter()
            .zip(client_signature.iter())
            .map(|(k, s)| k ^ s)
            .collect();

        self.expected_server_signature =
            Some(self.hash.hmac(&server_key, auth_message.as_bytes()));

        Ok(format!("{without_proof},p={}", BASE64.encode(proof)))
    }

    /// Verify the server-final message against the expected server signature.
    ///
    /// # Errors
    ///
    /// Returns an error if the server reported a failure, the signature does
    /// not match, or the exchange is out of order.
    pub fn verify_server_final(&self, server_final: &str) -> AuthResult<()> {
        let expected = self.expected_server_signature.as_ref().ok_or_else(|| {
            AuthError::SaslProtocol("final_message not produced yet".to_string())
        })?;

        if let Some(err) = server_final.strip_prefix("e=") {
            return Err(AuthError::SaslProtocol(format!(
                "server rejected authentication: {err}"
            )));
        }

        let signature_b64 = server_final.strip_prefix("v=").ok_or_else(|| {
            AuthError::SaslProtocol("missing server signature".to_string())
        })?;
        let signature = BASE64.decode(signature_b64).map_err(|e| {
            AuthError::SaslProtocol(format!("invalid server signature encoding: {e}"))
        })?;

        if &signature != expected {
            return Err(AuthError::SaslProtocol(
                "server signature mismatch".to_string(),
            ));
        }
        Ok(())
    }
}

/// Escape a username per RFC 5802 saslname rules.
fn saslname(username: &str) -> String {
    username.replace('=', "=3D").replace(',', "=2C")
}

/// Split a SCRAM message into `k=v` attribute pairs.
fn parse_attributes(message: &str) -> AuthResult<Vec<(&str, &str)>> {
    message
        .split(',')
        .map(|part| {
            part.split_once('=')
                .ok_or_else(|| AuthError::SaslProtocol(format!("malformed attribute '{part}'")))
        })
        .collect()
}
