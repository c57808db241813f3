//! # director-nats
//!
//! Shared NATS infrastructure for the director.
//!
//! This crate provides:
//! - [`NatsConfig`] resolved from the environment, including TLS material for
//!   mutually authenticated connections
//! - [`connect`] with reconnect backoff and lifecycle event logging
//! - Per-operation client traits ([`PublishClient`], [`SubscribeClient`],
//!   [`FlushClient`]) and a [`Connector`] seam so callers can be tested without a server
//! - W3C trace-context propagation into message headers
//! - Mock client and connector (with the `test-support` feature)
//!
//! ## Example
//!
//! ```rust,no_run
//! use director_nats::{NatsConfig, connect};
//! use director_std::env::SystemEnv;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = NatsConfig::from_env(&SystemEnv).expect("invalid NATS config");
//!     let _client = connect(&config, "director").await.expect("Failed to connect");
//! }
//! ```

pub mod client;
pub mod config;
pub mod connect;
pub mod trace;

#[cfg(any(test, feature = "test-support"))]
pub mod mocks;

pub use client::{FlushClient, NatsClient, PublishClient, SubscribeClient};
pub use config::{ClientIdentity, ConfigError, NatsAuth, NatsConfig, TlsConfig, redact_server_url};
pub use connect::{ConnectError, Connector, NatsConnector, connect};
pub use trace::{headers_with_trace_context, inject_trace_context};

#[cfg(any(test, feature = "test-support"))]
pub use mocks::{MockConnector, MockError, MockNatsClient, MockOp, PublishedMessage};
