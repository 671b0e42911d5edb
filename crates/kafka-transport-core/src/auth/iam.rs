//! AWS MSK IAM token signing.
//!
//! MSK's IAM authentication rides the SASL/OAUTHBEARER handshake: the
//! "token" is a presigned `kafka-cluster:Connect` URL, SigV4-signed with
//! whatever AWS credentials the configuration resolves to, then
//! base64-url-encoded.
//!
//! Credential resolution picks exactly one strategy per provider, evaluated
//! in a fixed precedence order. Every `token()` call produces a freshly
//! signed, short-lived token; the signer does not cache.

use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use aws_config::profile::profile_file::{ProfileFileKind, ProfileFiles};
use aws_config::profile::ProfileFileCredentialsProvider;
use aws_config::sts::AssumeRoleProvider;
use aws_config::BehaviorVersion;
use aws_credential_types::provider::ProvideCredentials;
use aws_credential_types::Credentials;
use aws_sigv4::http_request::{
    sign, SignableBody, SignableRequest, SignatureLocation, SigningSettings,
};
use aws_sigv4::sign::v4;
use aws_smithy_runtime_api::client::identity::Identity;
use aws_types::region::Region;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::Deserialize;
use tracing::debug;

use crate::config::ConnectionConfig;
use crate::error::{AuthError, AuthResult};

use super::token::{BearerToken, TokenProvider};

/// SigV4 service name for MSK cluster access.
const SIGNING_NAME: &str = "kafka-cluster";

/// Lifetime of a signed token (MSK maximum).
const TOKEN_LIFETIME: Duration = Duration::from_secs(900);

/// Session name presented during role assumption.
const SESSION_NAME: &str = "kafka-transport-core";

/// User agent appended to the signed URL, as the MSK signers do.
const USER_AGENT: &str = concat!("kafka-transport-core/", env!("CARGO_PKG_VERSION"));

/// One way of resolving AWS credentials for token signing.
///
/// Selection is an ordered list evaluated top to bottom; the first strategy
/// whose parameters are present wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialStrategy {
    /// Container credentials endpoint plus an authorization token file.
    ContainerEndpoint {
        token_file: String,
        endpoint: String,
    },
    /// STS assume-role, optionally gated by an external id.
    AssumeRole {
        role_arn: String,
        external_id: Option<String>,
    },
    /// Named profile, optionally with explicit shared config files.
    Profile {
        name: String,
        shared_config_files: Vec<String>,
    },
    /// Static access key pair, optionally with a session token.
    StaticKeys {
        access_key: String,
        secret_key: String,
        session_token: Option<String>,
    },
    /// Ambient default credential chain.
    DefaultChain,
}

impl CredentialStrategy {
    /// Pick the strategy for a configuration. First match wins:
    /// container endpoint, assume-role, profile, static keys, default chain.
    #[must_use]
    pub fn select(config: &ConnectionConfig) -> Self {
        if !config.sasl_aws_container_authorization_token_file.is_empty()
            && !config.sasl_aws_container_credentials_full_uri.is_empty()
        {
            return Self::ContainerEndpoint {
                token_file: config.sasl_aws_container_authorization_token_file.clone(),
                endpoint: config.sasl_aws_container_credentials_full_uri.clone(),
            };
        }
        if !config.sasl_aws_role_arn.is_empty() {
            return Self::AssumeRole {
                role_arn: config.sasl_aws_role_arn.clone(),
                external_id: none_if_empty(&config.sasl_aws_external_id),
            };
        }
        if !config.sasl_aws_profile.is_empty() {
            return Self::Profile {
                name: config.sasl_aws_profile.clone(),
                shared_config_files: config.sasl_aws_shared_config_files.clone(),
            };
        }
        if !config.sasl_aws_access_key.is_empty() && !config.sasl_aws_secret_key.is_empty() {
            return Self::StaticKeys {
                access_key: config.sasl_aws_access_key.clone(),
                secret_key: config.sasl_aws_secret_key.clone(),
                session_token: none_if_empty(&config.sasl_aws_token),
            };
        }
        Self::DefaultChain
    }

    /// Short strategy name for logs and errors.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::ContainerEndpoint { .. } => "container endpoint",
            Self::AssumeRole { .. } => "assume role",
            Self::Profile { .. } => "profile",
            Self::StaticKeys { .. } => "static keys",
            Self::DefaultChain => "default chain",
        }
    }
}

fn none_if_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Credentials served by a container credentials endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ContainerCredentials {
    access_key_id: String,
    secret_access_key: String,
    #[serde(default)]
    token: Option<String>,
}

/// Token provider that signs MSK connect tokens with resolved AWS
/// credentials.
#[derive(Debug)]
pub struct MskIamTokenProvider {
    region: String,
    strategy: CredentialStrategy,
    creds_debug: bool,
    http: reqwest::Client,
}

impl MskIamTokenProvider {
    /// Create a provider for a region and an already-selected strategy.
    #[must_use]
    pub fn new(region: &str, strategy: CredentialStrategy, creds_debug: bool) -> Self {
        Self {
            region: region.to_string(),
            strategy,
            creds_debug,
            http: reqwest::Client::new(),
        }
    }

    /// Create a provider from a configuration, selecting the strategy.
    #[must_use]
    pub fn from_config(region: &str, config: &ConnectionConfig) -> Self {
        Self::new(
            region,
            CredentialStrategy::select(config),
            config.sasl_aws_creds_debug,
        )
    }

    /// The strategy this provider resolves credentials with.
    #[must_use]
    pub fn strategy(&self) -> &CredentialStrategy {
        &self.strategy
    }

    async fn resolve_credentials(&self) -> AuthResult<Credentials> {
        let strategy = self.strategy.name();
        match &self.strategy {
            CredentialStrategy::ContainerEndpoint {
                token_file,
                endpoint,
            } => {
                let authorization = tokio::fs::read_to_string(token_file).await.map_err(|e| {
                    AuthError::CredentialResolution {
                        strategy,
                        message: format!("reading authorization token file '{token_file}': {e}"),
                    }
                })?;

                let response = self
                    .http
                    .get(endpoint)
                    .header("Authorization", authorization.trim())
                    .send()
                    .await
                    .map_err(|e| AuthError::CredentialResolution {
                        strategy,
                        message: e.to_string(),
                    })?;

                let status = response.status();
                if !status.is_success() {
                    return Err(AuthError::CredentialResolution {
                        strategy,
                        message: format!("credentials endpoint returned {status}"),
                    });
                }

                let creds: ContainerCredentials =
                    response
                        .json()
                        .await
                        .map_err(|e| AuthError::CredentialResolution {
                            strategy,
                            message: format!("malformed credentials response: {e}"),
                        })?;

                Ok(Credentials::new(
                    creds.access_key_id,
                    creds.secret_access_key,
                    creds.token,
                    None,
                    "ContainerEndpoint",
                ))
            }
            CredentialStrategy::AssumeRole {
                role_arn,
                external_id,
            } => {
                let mut builder = AssumeRoleProvider::builder(role_arn)
                    .region(Region::new(self.region.clone()))
                    .session_name(SESSION_NAME);
                if let Some(external_id) = external_id {
                    builder = builder.external_id(external_id);
                }
                let provider = builder.build().await;
                provider.provide_credentials().await.map_err(|e| {
                    AuthError::CredentialResolution {
                        strategy,
                        message: e.to_string(),
                    }
                })
            }
            CredentialStrategy::Profile {
                name,
                shared_config_files,
            } => {
                let mut builder = ProfileFileCredentialsProvider::builder().profile_name(name);
                if !shared_config_files.is_empty() {
                    let mut files = ProfileFiles::builder();
                    for file in shared_config_files {
                        files = files.with_file(ProfileFileKind::Config, file);
                    }
                    builder = builder.profile_files(files.build());
                }
                builder.build().provide_credentials().await.map_err(|e| {
                    AuthError::CredentialResolution {
                        strategy,
                        message: e.to_string(),
                    }
                })
            }
            CredentialStrategy::StaticKeys {
                access_key,
                secret_key,
                session_token,
            } => Ok(Credentials::new(
                access_key,
                secret_key,
                session_token.clone(),
                None,
                "Static",
            )),
            CredentialStrategy::DefaultChain => {
                let config = aws_config::defaults(BehaviorVersion::latest())
                    .region(Region::new(self.region.clone()))
                    .load()
                    .await;
                let provider = config.credentials_provider().ok_or_else(|| {
                    AuthError::CredentialResolution {
                        strategy,
                        message: "default chain produced no credentials provider".to_string(),
                    }
                })?;
                provider.provide_credentials().await.map_err(|e| {
                    AuthError::CredentialResolution {
                        strategy,
                        message: e.to_string(),
                    }
                })
            }
        }
    }

    /// Presign a `kafka-cluster:Connect` URL and encode it as an MSK token.
    fn presign(&self, credentials: Credentials) -> AuthResult<(String, SystemTime)> {
        let identity: Identity = credentials.into();

        let mut settings = SigningSettings::default();
        settings.signature_location = SignatureLocation::QueryParams;
        settings.expires_in = Some(TOKEN_LIFETIME);

        let now = SystemTime::now();
        let params = v4::SigningParams::builder()
            .identity(&identity)
            .region(&self.region)
            .name(SIGNING_NAME)
            .time(now)
            .settings(settings)
            .build()
            .map_err(|e| AuthError::Signing(e.to_string()))?;

        let url = format!(
            "https://kafka.{}.amazonaws.com/?Action=kafka-cluster%3AConnect",
            self.region
        );
        let signable = SignableRequest::new(
            "GET",
            url.as_str(),
            std::iter::empty::<(&str, &str)>(),
            SignableBody::Bytes(&[]),
        )
        .map_err(|e| AuthError::Signing(e.to_string()))?;

        let (instructions, _signature) = sign(signable, &params.into())
            .map_err(|e| AuthError::Signing(e.to_string()))?
            .into_parts();

        let mut request = http::Request::builder()
            .method("GET")
            .uri(url.as_str())
            .body(())
            .map_err(|e| AuthError::Signing(e.to_string()))?;
        instructions.apply_to_request_http1x(&mut request);

        let signed_url = format!("{}&User-Agent={USER_AGENT}", request.uri());
        Ok((URL_SAFE_NO_PAD.encode(signed_url), now + TOKEN_LIFETIME))
    }
}

#[async_trait]
impl TokenProvider for MskIamTokenProvider {
    async fn token(&self) -> AuthResult<BearerToken> {
        debug!(
            strategy = self.strategy.name(),
            region = %self.region,
            "generating msk auth token"
        );

        let credentials = self.resolve_credentials().await?;
        if self.creds_debug {
            debug!(
                access_key_id = %credentials.access_key_id(),
                "resolved aws credentials"
            );
        }

        let (value, expires_at) = self.presign(credentials)?;
        Ok(BearerToken {
            value,
            expires_at: Some(expires_at),
        })
    }
}
