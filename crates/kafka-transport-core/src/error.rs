//! Domain error types for transport construction.
//!
//! Uses `thiserror` for ergonomic error definitions with proper context.

use thiserror::Error;

/// Errors related to configuration parsing and validation.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The Kafka protocol version string could not be parsed.
    #[error("unsupported kafka version '{0}' (expected 'major.minor.patch')")]
    UnsupportedVersion(String),

    /// The SASL mechanism name is not one of the supported mechanisms.
    #[error("unknown sasl mechanism '{0}': must be one of 'plain', 'scram-sha256', 'scram-sha512', 'aws-iam' or 'oauthbearer'")]
    UnknownMechanism(String),

    /// A parameter required by the selected SASL mechanism is missing and has
    /// no environment fallback.
    #[error("missing required parameter '{parameter}': {hint}")]
    MissingParameter {
        parameter: &'static str,
        hint: &'static str,
    },

    /// Failed to read a configuration file.
    #[error("failed to read config file '{path}': {source}")]
    IoError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse YAML configuration.
    #[error("failed to parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),
}

/// Errors related to TLS material loading and context construction.
#[derive(Error, Debug)]
pub enum TlsError {
    /// Input was not inline PEM and could not be read as a file either.
    #[error("certificate material not found at '{path}': {source}")]
    MaterialNotFound {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Input decoded neither as inline PEM nor as PEM file contents.
    #[error("unable to decode pem material: {0}")]
    InvalidEncoding(String),

    /// An encrypted private key could not be decrypted with the configured
    /// passphrase.
    #[error("failed to decrypt private key: {0}")]
    DecryptionFailed(String),

    /// The client certificate and private key do not correspond.
    #[error("client certificate and key do not match: {0}")]
    KeyPairMismatch(String),

    /// The CA material contained no certificate that could be added to the
    /// trust store.
    #[error("could not add any CA certificate from '{0}' to the trust store")]
    InvalidCa(String),

    /// No private key was found in the key material.
    #[error("no private key found in '{0}'")]
    NoPrivateKeys(String),

    /// TLS configuration error.
    #[error("tls configuration error: {0}")]
    Config(String),

    /// TLS handshake failure.
    #[error("tls handshake failed: {0}")]
    Handshake(String),
}

/// Errors raised by credential token providers during live operation.
#[derive(Error, Debug)]
pub enum AuthError {
    /// A cloud credential strategy failed to produce usable credentials.
    #[error("credential resolution via {strategy} failed: {message}")]
    CredentialResolution {
        strategy: &'static str,
        message: String,
    },

    /// The OAuth2 client-credentials exchange failed.
    #[error("oauth2 token exchange failed: {0}")]
    TokenExchange(String),

    /// Request signing failed.
    #[error("request signing failed: {0}")]
    Signing(String),

    /// The SASL challenge-response exchange went off the rails.
    #[error("sasl protocol error: {0}")]
    SaslProtocol(String),
}

/// Top-level error for transport configuration builds.
#[derive(Error, Debug)]
pub enum TransportError {
    /// Configuration parsing or validation failure.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// TLS context construction failure.
    #[error(transparent)]
    Tls(#[from] TlsError),

    /// SASL credential setup failure.
    #[error(transparent)]
    Auth(#[from] AuthError),
}

/// Result type alias for transport builds.
pub type Result<T> = std::result::Result<T, TransportError>;

/// Result type alias for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for TLS operations.
pub type TlsResult<T> = std::result::Result<T, TlsError>;

/// Result type alias for token provider operations.
pub type AuthResult<T> = std::result::Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_mechanism_display() {
        let err = ConfigError::UnknownMechanism("bogus".to_string());
        assert!(err.to_string().contains("bogus"));
        assert!(err.to_string().contains("scram-sha512"));
    }

    #[test]
    fn test_missing_parameter_display() {
        let err = ConfigError::MissingParameter {
            parameter: "sasl_aws_region",
            hint: "set it or export AWS_REGION",
        };
        assert!(err.to_string().contains("sasl_aws_region"));
        assert!(err.to_string().contains("AWS_REGION"));
    }

    #[test]
    fn test_transport_error_from_tls() {
        let tls_err = TlsError::InvalidEncoding("not pem".to_string());
        let err: TransportError = tls_err.into();
        assert!(matches!(err, TransportError::Tls(_)));
    }

    #[test]
    fn test_transport_error_from_auth() {
        let auth_err = AuthError::TokenExchange("connection refused".to_string());
        let err: TransportError = auth_err.into();
        assert!(matches!(err, TransportError::Auth(_)));
    }
}
