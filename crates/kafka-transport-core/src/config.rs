//! Connection configuration for building authenticated Kafka transports.
//!
//! The configuration is a flat set of typed fields populated by an external
//! front-end (CLI flags, provider schema, or the YAML loader here). Absent
//! optional fields default to empty/false.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

use crate::error::{ConfigError, ConfigResult};

/// Marker substituted for secret-bearing fields in [`MaskedConfig`].
pub const REDACTED: &str = "*****";

/// Declarative connection options consumed by the transport builder.
///
/// TLS and SASL are independently togglable; at most one SASL mechanism is
/// active per configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConnectionConfig {
    /// Bootstrap broker addresses, e.g. `["broker-1:9092"]`.
    #[serde(default)]
    pub bootstrap_servers: Vec<String>,

    /// Timeout in seconds applied to admin, read, write and metadata operations.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Kafka protocol version, e.g. "3.5.0". Empty selects the baseline version.
    #[serde(default)]
    pub kafka_version: String,

    /// Whether to wrap broker connections in TLS.
    #[serde(default)]
    pub tls_enabled: bool,

    /// Skip server certificate verification (INSECURE - overrides all trust).
    #[serde(default)]
    pub skip_tls_verify: bool,

    /// CA trust bundle: inline PEM or a file path. Empty falls back to the
    /// bundled root certificates.
    #[serde(default)]
    pub ca_cert: String,

    /// Client certificate for mTLS: inline PEM or a file path.
    #[serde(default)]
    pub client_cert: String,

    /// Client private key for mTLS: inline PEM or a file path. May be an
    /// encrypted PKCS#8 block.
    #[serde(default)]
    pub client_cert_key: String,

    /// Passphrase for an encrypted client key.
    #[serde(default)]
    pub client_cert_key_passphrase: String,

    /// SASL username. Doubles as the OAuth2 client id for `oauthbearer`.
    /// Supports environment variable expansion: "${KAFKA_USERNAME}".
    #[serde(default)]
    pub sasl_username: String,

    /// SASL password. Doubles as the OAuth2 client secret for `oauthbearer`.
    /// Supports environment variable expansion: "${KAFKA_PASSWORD}".
    #[serde(default)]
    pub sasl_password: String,

    /// SASL mechanism name. Required whenever SASL credentials are set.
    #[serde(default)]
    pub sasl_mechanism: String,

    /// OAuth2 token endpoint for `oauthbearer`. Falls back to `TOKEN_URL`.
    #[serde(default)]
    pub sasl_token_url: String,

    /// OAuth2 scopes requested during the client-credentials exchange.
    #[serde(default)]
    pub sasl_oauth_scopes: Vec<String>,

    /// AWS region for `aws-iam`. Falls back to `AWS_REGION`.
    #[serde(default)]
    pub sasl_aws_region: String,

    /// Role ARN to assume before signing `aws-iam` tokens.
    #[serde(default)]
    pub sasl_aws_role_arn: String,

    /// External id presented during role assumption.
    #[serde(default)]
    pub sasl_aws_external_id: String,

    /// Named AWS profile used to resolve credentials.
    #[serde(default)]
    pub sasl_aws_profile: String,

    /// Explicit shared config file paths consulted with the profile.
    #[serde(default)]
    pub sasl_aws_shared_config_files: Vec<String>,

    /// Static AWS access key id.
    #[serde(default)]
    pub sasl_aws_access_key: String,

    /// Static AWS secret access key.
    #[serde(default)]
    pub sasl_aws_secret_key: String,

    /// Static AWS session token.
    #[serde(default)]
    pub sasl_aws_token: String,

    /// Authorization token file for container-provided credentials.
    #[serde(default)]
    pub sasl_aws_container_authorization_token_file: String,

    /// Full URI of the container credentials endpoint.
    #[serde(default)]
    pub sasl_aws_container_credentials_full_uri: String,

    /// Log which AWS credentials were resolved (debugging aid).
    #[serde(default)]
    pub sasl_aws_creds_debug: bool,
}

fn default_timeout_secs() -> u64 {
    120
}

// Kept in sync with the serde defaults so a programmatically-built config
// behaves like a deserialized one.
impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            bootstrap_servers: Vec::new(),
            timeout_secs: default_timeout_secs(),
            kafka_version: String::new(),
            tls_enabled: false,
            skip_tls_verify: false,
            ca_cert: String::new(),
            client_cert: String::new(),
            client_cert_key: String::new(),
            client_cert_key_passphrase: String::new(),
            sasl_username: String::new(),
            sasl_password: String::new(),
            sasl_mechanism: String::new(),
            sasl_token_url: String::new(),
            sasl_oauth_scopes: Vec::new(),
            sasl_aws_region: String::new(),
            sasl_aws_role_arn: String::new(),
            sasl_aws_external_id: String::new(),
            sasl_aws_profile: String::new(),
            sasl_aws_shared_config_files: Vec::new(),
            sasl_aws_access_key: String::new(),
            sasl_aws_secret_key: String::new(),
            sasl_aws_token: String::new(),
            sasl_aws_container_authorization_token_file: String::new(),
            sasl_aws_container_credentials_full_uri: String::new(),
            sasl_aws_creds_debug: false,
        }
    }
}

/// Display-safe projection of a [`ConnectionConfig`].
///
/// Secret-bearing fields are replaced with [`REDACTED`]; every other field is
/// carried through unmodified. For display and logging only - never feed it
/// back into a transport build.
#[derive(Debug, Clone, Serialize)]
pub struct MaskedConfig(pub ConnectionConfig);

impl ConnectionConfig {
    /// Load configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::IoError {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_str(&content)
    }

    /// Load configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if parsing or validation fails.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> ConfigResult<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if a non-empty mechanism name is not recognized.
    pub fn validate(&self) -> ConfigResult<()> {
        if !self.sasl_mechanism.is_empty() {
            self.sasl_mechanism.parse::<SaslMechanism>()?;
        }
        Ok(())
    }

    /// Get the SASL username with environment variables expanded.
    #[must_use]
    pub fn sasl_username(&self) -> String {
        expand_env_vars(&self.sasl_username)
    }

    /// Get the SASL password with environment variables expanded.
    #[must_use]
    pub fn sasl_password(&self) -> String {
        expand_env_vars(&self.sasl_password)
    }

    /// Produce a copy safe for display and logging.
    ///
    /// Masks the password, client key, key passphrase, AWS secret key and
    /// assume-role external id.
    #[must_use]
    pub fn masked(&self) -> MaskedConfig {
        let mut copy = self.clone();
        if !copy.client_cert_key.is_empty() {
            copy.client_cert_key = REDACTED.to_string();
        }
        if !copy.client_cert_key_passphrase.is_empty() {
            copy.client_cert_key_passphrase = REDACTED.to_string();
        }
        if !copy.sasl_password.is_empty() {
            copy.sasl_password = REDACTED.to_string();
        }
        if !copy.sasl_aws_secret_key.is_empty() {
            copy.sasl_aws_secret_key = REDACTED.to_string();
        }
        if !copy.sasl_aws_external_id.is_empty() {
            copy.sasl_aws_external_id = REDACTED.to_string();
        }
        MaskedConfig(copy)
    }
}

/// SASL authentication mechanism.
///
/// Exactly one mechanism is active per configuration build. Each mechanism
/// pulls its own parameter set from [`ConnectionConfig`]; the selector in
/// [`crate::auth`] rejects configurations where those parameters are missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
pub enum SaslMechanism {
    /// SASL/PLAIN - static username/password pair.
    #[default]
    #[serde(rename = "plain")]
    Plain,
    /// SASL/SCRAM-SHA-256 - salted challenge-response authentication.
    #[serde(rename = "scram-sha256")]
    ScramSha256,
    /// SASL/SCRAM-SHA-512 - salted challenge-response authentication.
    #[serde(rename = "scram-sha512")]
    ScramSha512,
    /// AWS MSK IAM - OAUTHBEARER handshake carrying a SigV4-signed token.
    #[serde(rename = "aws-iam")]
    AwsIam,
    /// OAUTHBEARER - OAuth 2.0 client-credentials bearer token.
    #[serde(rename = "oauthbearer")]
    OAuthBearer,
}

impl SaslMechanism {
    /// Get the mechanism name as used in the SASL handshake.
    #[must_use]
    pub fn handshake_name(&self) -> &'static str {
        match self {
            Self::Plain => "PLAIN",
            Self::ScramSha256 => "SCRAM-SHA-256",
            Self::ScramSha512 => "SCRAM-SHA-512",
            // Both token-based mechanisms ride the OAUTHBEARER handshake.
            Self::AwsIam | Self::OAuthBearer => "OAUTHBEARER",
        }
    }

    /// Get the configuration-facing mechanism name.
    #[must_use]
    pub fn config_name(&self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::ScramSha256 => "scram-sha256",
            Self::ScramSha512 => "scram-sha512",
            Self::AwsIam => "aws-iam",
            Self::OAuthBearer => "oauthbearer",
        }
    }
}

impl FromStr for SaslMechanism {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "plain" => Ok(Self::Plain),
            "scram-sha256" => Ok(Self::ScramSha256),
            "scram-sha512" => Ok(Self::ScramSha512),
            "aws-iam" => Ok(Self::AwsIam),
            "oauthbearer" => Ok(Self::OAuthBearer),
            other => Err(ConfigError::UnknownMechanism(other.to_string())),
        }
    }
}

/// Expand environment variables in a string.
///
/// Replaces `${VAR_NAME}` with the value of the environment variable
/// `VAR_NAME`. If the variable is not set, replaces with an empty string.
fn expand_env_vars(s: &str) -> String {
    let re = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid regex");
    re.replace_all(s, |caps: &regex::Captures| {
        std::env::var(&caps[1]).unwrap_or_default()
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret_config() -> ConnectionConfig {
        ConnectionConfig {
            bootstrap_servers: vec!["broker-1:9092".to_string()],
            tls_enabled: true,
            client_cert: "cert.pem".to_string(),
            client_cert_key: "key.pem".to_string(),
            client_cert_key_passphrase: "hunter2".to_string(),
            sasl_username: "svc-user".to_string(),
            sasl_password: "topsecret".to_string(),
            sasl_mechanism: "aws-iam".to_string(),
            sasl_aws_region: "eu-west-1".to_string(),
            sasl_aws_role_arn: "arn:aws:iam::123456789012:role/kafka".to_string(),
            sasl_aws_external_id: "shared-secret".to_string(),
            sasl_aws_access_key: "AKIAEXAMPLE".to_string(),
            sasl_aws_secret_key: "wJalrXUtnFEMI".to_string(),
            sasl_aws_token: "session-token".to_string(),
            ..ConnectionConfig::default()
        }
    }

    #[test]
    fn test_default_matches_serde_defaults() {
        // A programmatically-built config must carry the same defaults as a
        // deserialized empty document.
        let built = ConnectionConfig::default();
        let parsed = ConnectionConfig::from_str("{}").unwrap();
        assert_eq!(built.timeout_secs, 120);
        assert_eq!(built.timeout_secs, parsed.timeout_secs);
        assert!(!built.tls_enabled);
        assert!(built.sasl_mechanism.is_empty());
    }

    #[test]
    fn test_masked_hides_secrets() {
        let config = secret_config();
        let masked = config.masked().0;

        assert_eq!(masked.sasl_password, REDACTED);
        assert_eq!(masked.client_cert_key, REDACTED);
        assert_eq!(masked.client_cert_key_passphrase, REDACTED);
        assert_eq!(masked.sasl_aws_secret_key, REDACTED);
        assert_eq!(masked.sasl_aws_external_id, REDACTED);
    }

    #[test]
    fn test_masked_passes_non_secrets_through() {
        let config = secret_config();
        let masked = config.masked().0;

        assert_eq!(masked.bootstrap_servers, config.bootstrap_servers);
        assert_eq!(masked.sasl_username, config.sasl_username);
        assert_eq!(masked.sasl_aws_region, config.sasl_aws_region);
        assert_eq!(masked.sasl_aws_role_arn, config.sasl_aws_role_arn);
        assert_eq!(masked.sasl_aws_access_key, config.sasl_aws_access_key);
        assert_eq!(masked.sasl_aws_token, config.sasl_aws_token);
        assert_eq!(masked.client_cert, config.client_cert);
    }

    #[test]
    fn test_masked_leaves_empty_fields_empty() {
        let masked = ConnectionConfig::default().masked().0;
        assert!(masked.sasl_password.is_empty());
        assert!(masked.client_cert_key.is_empty());
    }

    #[test]
    fn test_mechanism_parsing() {
        assert_eq!(
            "plain".parse::<SaslMechanism>().unwrap(),
            SaslMechanism::Plain
        );
        assert_eq!(
            "scram-sha256".parse::<SaslMechanism>().unwrap(),
            SaslMechanism::ScramSha256
        );
        assert_eq!(
            "scram-sha512".parse::<SaslMechanism>().unwrap(),
            SaslMechanism::ScramSha512
        );
        assert_eq!(
            "aws-iam".parse::<SaslMechanism>().unwrap(),
            SaslMechanism::AwsIam
        );
        assert_eq!(
            "oauthbearer".parse::<SaslMechanism>().unwrap(),
            SaslMechanism::OAuthBearer
        );
    }

    #[test]
    fn test_bogus_mechanism_rejected() {
        let result = "bogus".parse::<SaslMechanism>();
        assert!(matches!(result, Err(ConfigError::UnknownMechanism(_))));
    }

    #[test]
    fn test_handshake_names() {
        assert_eq!(SaslMechanism::Plain.handshake_name(), "PLAIN");
        assert_eq!(SaslMechanism::ScramSha256.handshake_name(), "SCRAM-SHA-256");
        assert_eq!(SaslMechanism::ScramSha512.handshake_name(), "SCRAM-SHA-512");
        assert_eq!(SaslMechanism::AwsIam.handshake_name(), "OAUTHBEARER");
        assert_eq!(SaslMechanism::OAuthBearer.handshake_name(), "OAUTHBEARER");
    }

    #[test]
    fn test_from_yaml_string() {
        let yaml = r"
bootstrap_servers:
  - 'broker-1:9092'
  - 'broker-2:9092'
tls_enabled: true
sasl_mechanism: 'scram-sha512'
sasl_username: 'user'
sasl_password: 'pass'
";
        let config = ConnectionConfig::from_str(yaml).unwrap();
        assert_eq!(config.bootstrap_servers.len(), 2);
        assert!(config.tls_enabled);
        assert_eq!(config.sasl_mechanism, "scram-sha512");
        // Defaults applied
        assert_eq!(config.timeout_secs, 120);
        assert!(!config.skip_tls_verify);
    }

    #[test]
    fn test_from_yaml_rejects_bogus_mechanism() {
        let yaml = r"
bootstrap_servers:
  - 'broker-1:9092'
sasl_mechanism: 'bogus'
";
        let result = ConnectionConfig::from_str(yaml);
        assert!(matches!(result, Err(ConfigError::UnknownMechanism(_))));
    }

    #[test]
    fn test_env_var_expansion() {
        std::env::set_var("TEST_TRANSPORT_USER", "my-user");
        std::env::set_var("TEST_TRANSPORT_PASS", "my-password");

        let config = ConnectionConfig {
            sasl_username: "${TEST_TRANSPORT_USER}".to_string(),
            sasl_password: "${TEST_TRANSPORT_PASS}".to_string(),
            ..ConnectionConfig::default()
        };

        assert_eq!(config.sasl_username(), "my-user");
        assert_eq!(config.sasl_password(), "my-password");

        std::env::remove_var("TEST_TRANSPORT_USER");
        std::env::remove_var("TEST_TRANSPORT_PASS");
    }

    #[test]
    fn test_env_var_expansion_missing_var() {
        let config = ConnectionConfig {
            sasl_username: "${NONEXISTENT_TRANSPORT_VAR}".to_string(),
            sasl_password: "literal".to_string(),
            ..ConnectionConfig::default()
        };

        assert_eq!(config.sasl_username(), "");
        assert_eq!(config.sasl_password(), "literal");
    }
}
