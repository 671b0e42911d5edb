//! TLS client context construction for broker connections.
//!
//! Builds a rustls client configuration from optional client certificate/key
//! material (with passphrase-based decryption) and an optional CA trust
//! bundle, then exposes a connector for wrapping TCP streams.

use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::ring::default_provider;
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector as TokioTlsConnector;
use tracing::{debug, warn};

use crate::error::{TlsError, TlsResult};

use super::material::{load_pem_material, prepare_private_key};

/// Install the ring crypto provider if not already installed.
fn ensure_crypto_provider() {
    // Try to install the ring provider, ignore errors if already installed
    let _ = CryptoProvider::install_default(default_provider());
}

/// TLS client context for outbound broker connections.
///
/// Owned by the transport configuration it was built for; rebuilt on every
/// reconfiguration and never mutated after construction.
#[derive(Clone)]
pub struct TlsContext {
    config: Arc<ClientConfig>,
    insecure_skip_verify: bool,
}

impl std::fmt::Debug for TlsContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsContext")
            .field("insecure_skip_verify", &self.insecure_skip_verify)
            .finish_non_exhaustive()
    }
}

impl TlsContext {
    /// Build a TLS context from certificate material.
    ///
    /// Each of `client_cert`, `client_key` and `ca_cert` may be inline PEM
    /// text or a file path; empty strings disable the corresponding feature.
    /// An empty `ca_cert` falls back to the bundled root certificates and is
    /// not an error.
    ///
    /// `insecure_skip_verify` is applied last and unconditionally disables
    /// server certificate and hostname verification. This is an insecure
    /// override intended for test clusters only; operators enabling it get a
    /// warning in the logs.
    ///
    /// # Errors
    ///
    /// Returns an error if certificate or key material cannot be loaded or
    /// decoded, the key cannot be decrypted, the pair does not correspond, or
    /// no CA certificate could be added from a non-empty `ca_cert`.
    pub fn build(
        client_cert: &str,
        client_key: &str,
        ca_cert: &str,
        key_passphrase: &str,
        insecure_skip_verify: bool,
    ) -> TlsResult<Self> {
        ensure_crypto_provider();

        let root_store = build_root_store(ca_cert)?;

        let builder = ClientConfig::builder();
        let builder = if insecure_skip_verify {
            warn!("server certificate verification disabled (skip_tls_verify set)");
            builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(NoVerification::new()))
        } else {
            builder.with_root_certificates(root_store)
        };

        let config = if !client_cert.is_empty() && !client_key.is_empty() {
            debug!("loading client certificate for mTLS");
            let certs = load_certificates(client_cert)?;
            let key = load_private_key(client_key, key_passphrase)?;

            builder
                .with_client_auth_cert(certs, key)
                .map_err(|e| match e {
                    rustls::Error::InconsistentKeys(_) => TlsError::KeyPairMismatch(e.to_string()),
                    other => TlsError::Config(format!("failed to configure client auth: {other}")),
                })?
        } else {
            builder.with_no_client_auth()
        };

        Ok(Self {
            config: Arc::new(config),
            insecure_skip_verify,
        })
    }

    /// Build a context trusting only the bundled root certificates.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS configuration cannot be built.
    pub fn with_native_roots() -> TlsResult<Self> {
        Self::build("", "", "", "", false)
    }

    /// Whether server certificate verification is disabled.
    #[must_use]
    pub fn is_insecure(&self) -> bool {
        self.insecure_skip_verify
    }

    /// The underlying rustls client configuration.
    #[must_use]
    pub fn client_config(&self) -> Arc<ClientConfig> {
        Arc::clone(&self.config)
    }

    /// Connect to a broker over TLS.
    ///
    /// # Errors
    ///
    /// Returns an error if the server name is invalid or the handshake fails.
    pub async fn connect(
        &self,
        server_name: &str,
        stream: TcpStream,
    ) -> TlsResult<TlsStream<TcpStream>> {
        let server_name = ServerName::try_from(server_name.to_string())
            .map_err(|e| TlsError::Config(format!("invalid server name: {e}")))?;

        debug!("initiating TLS handshake");

        let connector = TokioTlsConnector::from(Arc::clone(&self.config));
        connector
            .connect(server_name, stream)
            .await
            .map_err(|e| TlsError::Handshake(e.to_string()))
    }
}

/// Build the root certificate store.
///
/// Starts from the bundled Mozilla roots; a non-empty `ca_cert` appends the
/// decoded CA certificates on top.
fn build_root_store(ca_cert: &str) -> TlsResult<RootCertStore> {
    let mut root_store = RootCertStore::empty();
    root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    if ca_cert.is_empty() {
        debug!("no CA configured, using bundled root certificates");
        return Ok(root_store);
    }

    let certs = load_certificates(ca_cert)?;
    let (added, _ignored) = root_store.add_parsable_certificates(certs);
    debug!(added, "added CA certificates to trust store");

    if added == 0 {
        return Err(TlsError::InvalidCa(ca_cert.to_string()));
    }

    Ok(root_store)
}

/// Load certificates from inline PEM or a file.
fn load_certificates(input: &str) -> TlsResult<Vec<CertificateDer<'static>>> {
    let material = load_pem_material(input)?;

    let mut reader = material.bytes.as_slice();
    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut reader)
        .filter_map(|result| match result {
            Ok(cert) => Some(cert),
            Err(e) => {
                warn!(error = %e, "skipping invalid certificate");
                None
            }
        })
        .collect();

    if certs.is_empty() {
        return Err(TlsError::InvalidEncoding(format!(
            "no certificate found in '{input}'"
        )));
    }

    debug!(count = certs.len(), "loaded certificates");
    Ok(certs)
}

/// Load a private key from inline PEM or a file, decrypting if needed.
fn load_private_key(input: &str, passphrase: &str) -> TlsResult<PrivateKeyDer<'static>> {
    let material = load_pem_material(input)?;
    let key_bytes = prepare_private_key(&material, passphrase)?;

    let mut reader = key_bytes.as_slice();

    // Accept any private key encoding (RSA, PKCS8, EC)
    loop {
        match rustls_pemfile::read_one(&mut reader) {
            Ok(Some(rustls_pemfile::Item::Pkcs1Key(key))) => {
                debug!("loaded PKCS#1 RSA private key");
                return Ok(PrivateKeyDer::Pkcs1(key));
            }
            Ok(Some(rustls_pemfile::Item::Pkcs8Key(key))) => {
                debug!("loaded PKCS#8 private key");
                return Ok(PrivateKeyDer::Pkcs8(key));
            }
            Ok(Some(rustls_pemfile::Item::Sec1Key(key))) => {
                debug!("loaded SEC1 EC private key");
                return Ok(PrivateKeyDer::Sec1(key));
            }
            Ok(Some(_)) => {
                // Skip non-key items (certificates, etc.)
                continue;
            }
            Ok(None) => {
                // End of input
                break;
            }
            Err(e) => {
                return Err(TlsError::InvalidEncoding(format!(
                    "reading private key from '{input}': {e}"
                )));
            }
        }
    }

    Err(TlsError::NoPrivateKeys(input.to_string()))
}

/// Certificate verifier that accepts any server certificate.
///
/// Installed only when `skip_tls_verify` is set. Signatures are still
/// checked against the certificate; the certificate itself is not validated.
#[derive(Debug)]
struct NoVerification(CryptoProvider);

impl NoVerification {
    fn new() -> Self {
        Self(default_provider())
    }
}

impl ServerCertVerifier for NoVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tls::test_fixtures::{encrypted_test_key, TEST_CERT, TEST_KEY};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_temp(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_build_without_any_material() {
        let context = TlsContext::with_native_roots();
        assert!(context.is_ok());
    }

    #[test]
    fn test_build_with_cert_pair_and_no_ca() {
        let cert_file = write_temp(TEST_CERT);
        let key_file = write_temp(TEST_KEY);

        let context = TlsContext::build(
            cert_file.path().to_str().unwrap(),
            key_file.path().to_str().unwrap(),
            "",
            "",
            false,
        );
        assert!(context.is_ok(), "expected Ok, got: {:?}", context.err());
    }

    #[test]
    fn test_build_with_inline_cert_pair() {
        let context = TlsContext::build(TEST_CERT, TEST_KEY, "", "", false);
        assert!(context.is_ok(), "expected Ok, got: {:?}", context.err());
    }

    #[test]
    fn test_build_with_custom_ca() {
        let ca_file = write_temp(TEST_CERT);
        let context = TlsContext::build("", "", ca_file.path().to_str().unwrap(), "", false);
        assert!(context.is_ok(), "expected Ok, got: {:?}", context.err());
    }

    #[test]
    fn test_build_with_invalid_ca() {
        let ca_file = write_temp("-----BEGIN GARBAGE-----\nAAAA\n-----END GARBAGE-----\n");
        let result = TlsContext::build("", "", ca_file.path().to_str().unwrap(), "", false);
        assert!(result.is_err());
    }

    #[test]
    fn test_build_with_missing_cert_file() {
        let key_file = write_temp(TEST_KEY);
        let result = TlsContext::build(
            "/nonexistent/cert.pem",
            key_file.path().to_str().unwrap(),
            "",
            "",
            false,
        );
        assert!(matches!(result, Err(TlsError::MaterialNotFound { .. })));
    }

    #[test]
    fn test_build_with_encrypted_key() {
        let encrypted = encrypted_test_key("correct horse");
        let context = TlsContext::build(TEST_CERT, &encrypted, "", "correct horse", false);
        assert!(context.is_ok(), "expected Ok, got: {:?}", context.err());
    }

    #[test]
    fn test_build_with_encrypted_key_wrong_passphrase() {
        let encrypted = encrypted_test_key("correct horse");
        let result = TlsContext::build(TEST_CERT, &encrypted, "", "battery staple", false);
        assert!(matches!(result, Err(TlsError::DecryptionFailed(_))));
    }

    #[test]
    fn test_build_with_skip_verify() {
        let context = TlsContext::build("", "", "", "", true).unwrap();
        assert!(context.is_insecure());
    }

    #[test]
    fn test_load_certificates_inline() {
        let certs = load_certificates(TEST_CERT).unwrap();
        assert_eq!(certs.len(), 1);
    }

    #[test]
    fn test_load_private_key_inline() {
        let key = load_private_key(TEST_KEY, "");
        assert!(key.is_ok());
    }

    #[test]
    fn test_load_private_key_from_cert_material() {
        // Certificate material contains no key.
        let result = load_private_key(TEST_CERT, "");
        assert!(matches!(result, Err(TlsError::NoPrivateKeys(_))));
    }
}
