//! Transport configuration assembly.
//!
//! [`ClientTransport::build`] turns a validated [`ConnectionConfig`] into the
//! full set of client settings a Kafka driver needs: protocol version,
//! timeouts, an optional TLS context and optional SASL authentication state.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use tracing::{debug, info};

use crate::auth::SaslAuthentication;
use crate::config::ConnectionConfig;
use crate::error::{ConfigError, Result};
use crate::tls::TlsContext;

/// Client id presented to brokers.
const CLIENT_ID: &str = env!("CARGO_PKG_NAME");

/// Kafka protocol version, parsed from "major.minor.patch" strings.
///
/// The default is the lowest version the transport negotiates with; newer
/// brokers accept it, older configurations must state their version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct KafkaVersion {
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
}

impl Default for KafkaVersion {
    fn default() -> Self {
        // Baseline protocol version.
        Self {
            major: 2,
            minor: 7,
            patch: 0,
        }
    }
}

impl fmt::Display for KafkaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for KafkaVersion {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('.').collect();
        // Four-part versions ("0.10.2.1") exist only in the 0.x line; the
        // fourth component is dropped.
        let valid_shape = parts.len() == 3 || (parts.len() == 4 && parts[0] == "0");
        if !valid_shape {
            return Err(ConfigError::UnsupportedVersion(s.to_string()));
        }

        let mut numbers = parts
            .iter()
            .map(|p| p.parse::<u8>())
            .collect::<std::result::Result<Vec<u8>, _>>()
            .map_err(|_| ConfigError::UnsupportedVersion(s.to_string()))?;
        numbers.resize(3, 0);

        Ok(Self {
            major: numbers[0],
            minor: numbers[1],
            patch: numbers[2],
        })
    }
}

impl KafkaVersion {
    /// Parse a version string, with the empty string selecting the default.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnsupportedVersion`] for malformed strings.
    pub fn parse_or_default(s: &str) -> std::result::Result<Self, ConfigError> {
        if s.is_empty() {
            return Ok(Self::default());
        }
        s.parse()
    }
}

/// Everything a Kafka client needs to reach and authenticate with a cluster.
#[derive(Debug)]
pub struct ClientTransport {
    /// Bootstrap broker addresses.
    pub bootstrap_servers: Vec<String>,
    /// Client id presented to brokers.
    pub client_id: String,
    /// Negotiated protocol version.
    pub version: KafkaVersion,
    /// Timeout applied to admin operations.
    pub admin_timeout: Duration,
    /// Timeout applied to reads.
    pub read_timeout: Duration,
    /// Timeout applied to writes.
    pub write_timeout: Duration,
    /// Timeout applied to metadata refreshes.
    pub metadata_timeout: Duration,
    /// Whether produce/fetch may implicitly create topics.
    pub allow_auto_topic_creation: bool,
    /// Whether to honor proxy-related environment variables.
    pub proxy_from_environment: bool,
    /// TLS context, when TLS is enabled.
    pub tls: Option<TlsContext>,
    /// SASL authentication state, when SASL is configured.
    pub sasl: Option<SaslAuthentication>,
}

impl ClientTransport {
    /// Assemble a transport from a connection configuration.
    ///
    /// The build is synchronous: token providers are constructed but no
    /// token is fetched and no network connection is made.
    ///
    /// # Errors
    ///
    /// Returns an error when the version string is malformed, the TLS
    /// material cannot be loaded, or the SASL mechanism is unknown or
    /// under-specified.
    pub fn build(config: &ConnectionConfig) -> Result<Self> {
        debug!(config = ?config.masked(), "building client transport");

        let version = KafkaVersion::parse_or_default(&config.kafka_version)?;

        let tls = if config.tls_enabled {
            Some(TlsContext::build(
                &config.client_cert,
                &config.client_cert_key,
                &config.ca_cert,
                &config.client_cert_key_passphrase,
                config.skip_tls_verify,
            )?)
        } else {
            None
        };

        let sasl = SaslAuthentication::from_config(config)?;

        let timeout = Duration::from_secs(config.timeout_secs);
        info!(
            version = %version,
            tls = tls.is_some(),
            sasl = sasl.as_ref().map(SaslAuthentication::mechanism_name),
            "client transport configured"
        );

        Ok(Self {
            bootstrap_servers: config.bootstrap_servers.clone(),
            client_id: CLIENT_ID.to_string(),
            version,
            admin_timeout: timeout,
            read_timeout: timeout,
            write_timeout: timeout,
            metadata_timeout: timeout,
            allow_auto_topic_creation: false,
            proxy_from_environment: true,
            tls,
            sasl,
        })
    }
}
