//! # director-rpc
//!
//! Request/response messaging from the director to its agents over NATS.
//!
//! A [`NatsRpc`] owns one lazily opened connection and one per-process inbox.
//! Requests carry a `reply_to` subject under that inbox; a single background
//! dispatcher routes each reply to the handler registered for its request id.
//!
//! - [`NatsRpc::send_message`]: fire-and-forget publish
//! - [`NatsRpc::send_request`]: publish with a reply handler, invoked at most once
//! - [`NatsRpc::cancel_request`]: forget a pending request
//! - [`NatsRpc::call`]: send and wait for the reply with a timeout
//!
//! Outbound messages are logged at debug level after [`sanitize`] strips bulk
//! blob contents.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use director_rpc::{NatsRpc, Request, RpcConfig};
//! use director_std::SystemEnv;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let rpc = NatsRpc::from_config(&RpcConfig::from_env(&SystemEnv)?);
//!     let reply = rpc
//!         .call("agent.123", Request::new("get_state"), Duration::from_secs(30))
//!         .await?;
//!     println!("{:?}", reply.value());
//!     Ok(())
//! }
//! ```

pub mod config;
mod connection;
pub mod dispatch;
pub mod error;
pub mod inbox;
pub mod message;
pub mod pending;
pub mod request_id;
pub mod rpc;
pub mod sanitize;

pub use config::RpcConfig;
pub use dispatch::ReplyOutcome;
pub use error::{ConnectionError, ReplyError, RpcError};
pub use inbox::Inbox;
pub use message::{CorrelatedRequest, Reply, Request};
pub use pending::{PendingRequests, ReplyHandler};
pub use request_id::RequestId;
pub use rpc::{LinkState, NatsRpc};
pub use sanitize::sanitize;
