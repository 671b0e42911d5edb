//! SASL authentication setup.
//!
//! Maps a [`ConnectionConfig`] onto the authentication state a transport
//! carries: static credentials for PLAIN, a SCRAM client factory for the
//! SCRAM family, or a token provider for the OAUTHBEARER-based mechanisms.

pub mod iam;
pub mod scram;
pub mod token;

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::{ConnectionConfig, SaslMechanism};
use crate::error::{ConfigError, Result};

pub use iam::{CredentialStrategy, MskIamTokenProvider};
pub use scram::{ScramClient, ScramHashKind};
pub use token::{BearerToken, ClientCredentialsExchange, OAuth2TokenProvider, TokenProvider};

/// Authentication state for one transport, selected by mechanism.
///
/// Token-based mechanisms carry a shared provider so reconnects reuse the
/// same cache.
#[derive(Debug, Clone)]
pub enum SaslAuthentication {
    /// SASL/PLAIN with a static credential pair.
    Plain { username: String, password: String },
    /// SASL/SCRAM challenge-response; a fresh client is minted per handshake.
    Scram {
        hash: ScramHashKind,
        username: String,
        password: String,
    },
    /// SASL/OAUTHBEARER backed by a token provider (OAuth2 or MSK IAM).
    OAuthBearer { provider: Arc<dyn TokenProvider> },
}

impl SaslAuthentication {
    /// Build the authentication state for a configuration.
    ///
    /// Returns `Ok(None)` only when username, password and mechanism are all
    /// empty. Credentials without a mechanism name are rejected, never
    /// silently mapped to PLAIN.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownMechanism`] for an unrecognized or
    /// absent mechanism name and [`ConfigError::MissingParameter`] when the
    /// selected mechanism lacks a required parameter and its environment
    /// fallback.
    pub fn from_config(config: &ConnectionConfig) -> Result<Option<Self>> {
        let username = config.sasl_username();
        let password = config.sasl_password();

        if config.sasl_mechanism.is_empty() && username.is_empty() && password.is_empty() {
            warn!("no sasl credentials or mechanism configured, skipping sasl");
            return Ok(None);
        }

        let mechanism = config.sasl_mechanism.parse::<SaslMechanism>()?;
        info!(mechanism = mechanism.config_name(), "configuring sasl");

        let auth = match mechanism {
            SaslMechanism::Plain => {
                require(&username, "sasl_username", "plain requires a username")?;
                require(&password, "sasl_password", "plain requires a password")?;
                Self::Plain { username, password }
            }
            SaslMechanism::ScramSha256 | SaslMechanism::ScramSha512 => {
                require(&username, "sasl_username", "scram requires a username")?;
                require(&password, "sasl_password", "scram requires a password")?;
                let hash = if mechanism == SaslMechanism::ScramSha256 {
                    ScramHashKind::Sha256
                } else {
                    ScramHashKind::Sha512
                };
                Self::Scram {
                    hash,
                    username,
                    password,
                }
            }
            SaslMechanism::AwsIam => {
                let region = fallback_env(&config.sasl_aws_region, "AWS_REGION");
                if region.is_empty() {
                    return Err(ConfigError::MissingParameter {
                        parameter: "sasl_aws_region",
                        hint: "aws-iam requires a region, set it or export AWS_REGION",
                    }
                    .into());
                }
                let provider = MskIamTokenProvider::from_config(&region, config);
                info!(
                    strategy = provider.strategy().name(),
                    region = %region,
                    "using aws msk iam token provider"
                );
                Self::OAuthBearer {
                    provider: Arc::new(provider),
                }
            }
            SaslMechanism::OAuthBearer => {
                let token_url = fallback_env(&config.sasl_token_url, "TOKEN_URL");
                if token_url.is_empty() {
                    return Err(ConfigError::MissingParameter {
                        parameter: "sasl_token_url",
                        hint: "oauthbearer requires a token endpoint, set it or export TOKEN_URL",
                    }
                    .into());
                }
                require(
                    &username,
                    "sasl_username",
                    "oauthbearer uses the username as the oauth2 client id",
                )?;
                require(
                    &password,
                    "sasl_password",
                    "oauthbearer uses the password as the oauth2 client secret",
                )?;
                let exchange = ClientCredentialsExchange::new(
                    &token_url,
                    &username,
                    &password,
                    &config.sasl_oauth_scopes,
                );
                Self::OAuthBearer {
                    provider: Arc::new(OAuth2TokenProvider::new(Box::new(exchange))),
                }
            }
        };

        Ok(Some(auth))
    }

    /// Mechanism name as presented in the SASL handshake.
    #[must_use]
    pub fn mechanism_name(&self) -> &'static str {
        match self {
            Self::Plain { .. } => "PLAIN",
            Self::Scram { hash, .. } => hash.mechanism_name(),
            Self::OAuthBearer { .. } => "OAUTHBEARER",
        }
    }

    /// Mint a fresh SCRAM client for one handshake.
    ///
    /// Returns `None` for non-SCRAM mechanisms.
    #[must_use]
    pub fn scram_client(&self) -> Option<ScramClient> {
        match self {
            Self::Scram {
                hash,
                username,
                password,
            } => Some(ScramClient::new(*hash, username, password)),
            _ => None,
        }
    }
}

fn require(value: &str, parameter: &'static str, hint: &'static str) -> Result<()> {
    if value.is_empty() {
        return Err(ConfigError::MissingParameter { parameter, hint }.into());
    }
    Ok(())
}

fn fallback_env(value: &str, var: &str) -> String {
    if value.is_empty() {
        std::env::var(var).unwrap_or_default()
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;

    fn plain_config() -> ConnectionConfig {
        ConnectionConfig {
            sasl_mechanism: "plain".to_string(),
            sasl_username: "svc-user".to_string(),
            sasl_password: "topsecret".to_string(),
            ..ConnectionConfig::default()
        }
    }

    #[test]
    fn test_no_sasl_configured() {
        let auth = SaslAuthentication::from_config(&ConnectionConfig::default()).unwrap();
        assert!(auth.is_none());
    }

    #[test]
    fn test_plain_mechanism_selected() {
        let auth = SaslAuthentication::from_config(&plain_config())
            .unwrap()
            .unwrap();
        assert_eq!(auth.mechanism_name(), "PLAIN");
        assert!(matches!(
            auth,
            SaslAuthentication::Plain { ref username, .. } if username == "svc-user"
        ));
    }

    #[test]
    fn test_empty_mechanism_with_credentials_rejected() {
        // Credentials without a mechanism name must not fall back to PLAIN.
        let mut config = plain_config();
        config.sasl_mechanism.clear();

        let result = SaslAuthentication::from_config(&config);
        assert!(matches!(
            result,
            Err(TransportError::Config(ConfigError::UnknownMechanism(m))) if m.is_empty()
        ));
    }

    #[test]
    fn test_plain_missing_password() {
        let mut config = plain_config();
        config.sasl_password.clear();

        let result = SaslAuthentication::from_config(&config);
        assert!(matches!(
            result,
            Err(TransportError::Config(ConfigError::MissingParameter {
                parameter: "sasl_password",
                ..
            }))
        ));
    }

    #[test]
    fn test_scram_mechanisms() {
        for (name, mechanism_name) in [
            ("scram-sha256", "SCRAM-SHA-256"),
            ("scram-sha512", "SCRAM-SHA-512"),
        ] {
            let mut config = plain_config();
            config.sasl_mechanism = name.to_string();

            let auth = SaslAuthentication::from_config(&config).unwrap().unwrap();
            assert_eq!(auth.mechanism_name(), mechanism_name);

            let mut client = auth.scram_client().unwrap();
            assert!(client.first_message().starts_with("n,,n=svc-user,r="));
        }
    }

    #[test]
    fn test_scram_client_only_for_scram() {
        let auth = SaslAuthentication::from_config(&plain_config())
            .unwrap()
            .unwrap();
        assert!(auth.scram_client().is_none());
    }

    #[test]
    fn test_unknown_mechanism() {
        let mut config = plain_config();
        config.sasl_mechanism = "bogus".to_string();

        let result = SaslAuthentication::from_config(&config);
        assert!(matches!(
            result,
            Err(TransportError::Config(ConfigError::UnknownMechanism(_)))
        ));
    }

    // The fixed fallback variable names (AWS_REGION, TOKEN_URL) are never
    // set by tests; setting a process-global variable would race with other
    // tests in this binary. The fallback logic itself is covered through
    // `fallback_env` with test-unique names.
    #[test]
    fn test_fallback_env_helper() {
        std::env::set_var("TEST_SASL_FALLBACK_VAR", "from-env");
        assert_eq!(fallback_env("", "TEST_SASL_FALLBACK_VAR"), "from-env");
        assert_eq!(
            fallback_env("explicit", "TEST_SASL_FALLBACK_VAR"),
            "explicit"
        );
        std::env::remove_var("TEST_SASL_FALLBACK_VAR");
        assert_eq!(fallback_env("", "TEST_SASL_FALLBACK_VAR"), "");
    }

    #[test]
    fn test_aws_iam_missing_region() {
        std::env::remove_var("AWS_REGION");
        let config = ConnectionConfig {
            sasl_mechanism: "aws-iam".to_string(),
            ..ConnectionConfig::default()
        };

        let result = SaslAuthentication::from_config(&config);
        assert!(matches!(
            result,
            Err(TransportError::Config(ConfigError::MissingParameter {
                parameter: "sasl_aws_region",
                ..
            }))
        ));
    }

    #[test]
    fn test_aws_iam_with_explicit_region() {
        let config = ConnectionConfig {
            sasl_mechanism: "aws-iam".to_string(),
            sasl_aws_region: "us-east-1".to_string(),
            ..ConnectionConfig::default()
        };

        let auth = SaslAuthentication::from_config(&config).unwrap().unwrap();
        assert_eq!(auth.mechanism_name(), "OAUTHBEARER");
    }

    #[test]
    fn test_aws_iam_strategy_from_config() {
        let config = ConnectionConfig {
            sasl_mechanism: "aws-iam".to_string(),
            sasl_aws_region: "us-east-1".to_string(),
            sasl_aws_role_arn: "arn:aws:iam::123456789012:role/kafka".to_string(),
            ..ConnectionConfig::default()
        };

        let strategy = CredentialStrategy::select(&config);
        assert!(matches!(strategy, CredentialStrategy::AssumeRole { .. }));
        assert!(SaslAuthentication::from_config(&config).unwrap().is_some());
    }

    #[test]
    fn test_oauthbearer_missing_token_url() {
        std::env::remove_var("TOKEN_URL");
        let config = ConnectionConfig {
            sasl_mechanism: "oauthbearer".to_string(),
            sasl_username: "client-id".to_string(),
            sasl_password: "client-secret".to_string(),
            ..ConnectionConfig::default()
        };

        let result = SaslAuthentication::from_config(&config);
        assert!(matches!(
            result,
            Err(TransportError::Config(ConfigError::MissingParameter {
                parameter: "sasl_token_url",
                ..
            }))
        ));
    }

    #[test]
    fn test_oauthbearer_with_explicit_token_url() {
        let config = ConnectionConfig {
            sasl_mechanism: "oauthbearer".to_string(),
            sasl_token_url: "https://idp.example.com/token".to_string(),
            sasl_username: "client-id".to_string(),
            sasl_password: "client-secret".to_string(),
            ..ConnectionConfig::default()
        };

        let auth = SaslAuthentication::from_config(&config).unwrap().unwrap();
        assert_eq!(auth.mechanism_name(), "OAUTHBEARER");
    }

    #[test]
    fn test_oauthbearer_requires_client_credentials() {
        let config = ConnectionConfig {
            sasl_mechanism: "oauthbearer".to_string(),
            sasl_token_url: "https://idp.example.com/token".to_string(),
            ..ConnectionConfig::default()
        };

        let result = SaslAuthentication::from_config(&config);
        assert!(matches!(
            result,
            Err(TransportError::Config(ConfigError::MissingParameter {
                parameter: "sasl_username",
                ..
            }))
        ));
    }

    #[test]
    fn test_env_expansion_applies_to_credentials() {
        std::env::set_var("TEST_SASL_SELECTOR_PASS", "expanded-secret");
        let config = ConnectionConfig {
            sasl_mechanism: "plain".to_string(),
            sasl_username: "svc-user".to_string(),
            sasl_password: "${TEST_SASL_SELECTOR_PASS}".to_string(),
            ..ConnectionConfig::default()
        };

        let auth = SaslAuthentication::from_config(&config).unwrap().unwrap();
        assert!(matches!(
            auth,
            SaslAuthentication::Plain { ref password, .. } if password == "expanded-secret"
        ));
        std::env::remove_var("TEST_SASL_SELECTOR_PASS");
    }
}
