//! Kafka Transport Core Library
//!
//! This library builds authenticated Kafka client transports from declarative
//! connection settings. It covers certificate material loading (inline PEM or
//! file paths), TLS context construction including encrypted client keys, and
//! the SASL mechanism family: PLAIN, SCRAM-SHA-256/512, AWS MSK IAM and
//! OAUTHBEARER.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Connection configuration, validation and secret masking
//! - [`error`] - Domain-specific error types
//! - [`tls`] - Certificate material loading and TLS context construction
//! - [`auth`] - SASL mechanism selection and credential token providers
//! - [`transport`] - Transport configuration assembly
//!
//! # Example
//!
//! ```rust,ignore
//! use kafka_transport_core::{ClientTransport, ConnectionConfig};
//!
//! // Load configuration
//! let config = ConnectionConfig::from_file("config.yaml")?;
//!
//! // Assemble the transport
//! let transport = ClientTransport::build(&config)?;
//! ```

#![forbid(unsafe_code)]

pub mod auth;
pub mod config;
pub mod error;
pub mod tls;
pub mod transport;

// Re-export commonly used types
pub use auth::{SaslAuthentication, TokenProvider};
pub use config::{ConnectionConfig, MaskedConfig, SaslMechanism};
pub use error::{AuthError, ConfigError, Result, TlsError, TransportError};
pub use tls::TlsContext;
pub use transport::{ClientTransport, KafkaVersion};
