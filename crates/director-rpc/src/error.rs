use std::error::Error;
use std::fmt;
use std::sync::Arc;

use crate::request_id::RequestId;

/// Failure to establish the bus connection.
///
/// Cloneable so that every caller racing on the first connect receives the
/// same failure.
#[derive(Debug, Clone)]
pub struct ConnectionError(Arc<dyn Error + Send + Sync>);

impl ConnectionError {
    pub fn new<E: Error + Send + Sync + 'static>(cause: E) -> Self {
        Self(Arc::new(cause))
    }

    pub fn same_failure(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "An error has occurred while connecting to NATS: {}", self.0)
    }
}

impl Error for ConnectionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(self.0.as_ref())
    }
}

#[derive(Debug)]
pub enum RpcError {
    Connection(ConnectionError),
    Subscribe { subject: String, error: String },
    Flush(String),
    Serialize(serde_json::Error),
    Publish { subject: String, error: String },
    DuplicateRequestId(RequestId),
    Timeout { subject: String, request_id: RequestId },
    /// A reply arrived but its body could not be decoded.
    MalformedReply { request_id: RequestId, error: ReplyError },
    /// The pending request was removed before a reply arrived.
    Cancelled { request_id: RequestId },
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection(e) => write!(f, "{}", e),
            Self::Subscribe { subject, error } => {
                write!(f, "Failed to subscribe to '{}': {}", subject, error)
            }
            Self::Flush(error) => write!(f, "Failed to flush NATS connection: {}", error),
            Self::Serialize(e) => write!(f, "Failed to serialize request: {}", e),
            Self::Publish { subject, error } => {
                write!(f, "Failed to publish to '{}': {}", subject, error)
            }
            Self::DuplicateRequestId(id) => write!(f, "Request id '{}' is already pending", id),
            Self::Timeout {
                subject,
                request_id,
            } => write!(
                f,
                "Request '{}' to '{}' timed out waiting for a reply",
                request_id, subject
            ),
            Self::MalformedReply { request_id, error } => {
                write!(f, "Reply to request '{}' was malformed: {}", request_id, error)
            }
            Self::Cancelled { request_id } => {
                write!(f, "Request '{}' was cancelled before a reply arrived", request_id)
            }
        }
    }
}

impl Error for RpcError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Connection(e) => Some(e),
            Self::Serialize(e) => Some(e),
            Self::MalformedReply { error, .. } => Some(error),
            Self::Subscribe { .. }
            | Self::Flush(_)
            | Self::Publish { .. }
            | Self::DuplicateRequestId(_)
            | Self::Timeout { .. }
            | Self::Cancelled { .. } => None,
        }
    }
}

impl From<ConnectionError> for RpcError {
    fn from(e: ConnectionError) -> Self {
        Self::Connection(e)
    }
}

/// Failure while processing one inbound reply.
#[derive(Debug)]
pub enum ReplyError {
    Decode(serde_json::Error),
    Handler(String),
}

impl fmt::Display for ReplyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decode(e) => write!(f, "Failed to decode reply: {}", e),
            Self::Handler(msg) => write!(f, "Reply handler panicked: {}", msg),
        }
    }
}

impl Error for ReplyError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Decode(e) => Some(e),
            Self::Handler(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn io_error() -> std::io::Error {
        std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused")
    }

    #[test]
    fn connection_error_wraps_cause() {
        let err = ConnectionError::new(io_error());

        assert!(err.to_string().contains("connecting to NATS: refused"));
        assert_eq!(err.source().unwrap().to_string(), "refused");
    }

    #[test]
    fn clones_share_the_same_failure() {
        let err = ConnectionError::new(io_error());
        let clone = err.clone();
        assert!(err.same_failure(&clone));
        assert!(!err.same_failure(&ConnectionError::new(io_error())));
    }

    #[test]
    fn rpc_error_display_variants() {
        let id = RequestId::from("r1");
        let cases = [
            (RpcError::Connection(ConnectionError::new(io_error())), "connecting to NATS"),
            (
                RpcError::Subscribe {
                    subject: "director.p.*".into(),
                    error: "boom".into(),
                },
                "subscribe to 'director.p.*': boom",
            ),
            (RpcError::Flush("gone".into()), "flush NATS connection: gone"),
            (
                RpcError::Publish {
                    subject: "agent.1".into(),
                    error: "boom".into(),
                },
                "publish to 'agent.1'",
            ),
            (RpcError::DuplicateRequestId(id.clone()), "'r1' is already pending"),
            (
                RpcError::Timeout {
                    subject: "agent.1".into(),
                    request_id: id.clone(),
                },
                "'r1' to 'agent.1' timed out",
            ),
            (
                RpcError::MalformedReply {
                    request_id: id.clone(),
                    error: ReplyError::Decode(serde_json::from_str::<String>("{").unwrap_err()),
                },
                "Reply to request 'r1' was malformed: Failed to decode reply",
            ),
            (RpcError::Cancelled { request_id: id }, "'r1' was cancelled"),
        ];

        for (err, expected) in cases {
            assert!(err.to_string().contains(expected), "{err} should contain {expected}");
        }
    }

    #[test]
    fn rpc_error_source() {
        let connection = RpcError::from(ConnectionError::new(io_error()));
        assert!(connection.source().is_some());

        let serialize = RpcError::Serialize(serde_json::from_str::<String>("x").unwrap_err());
        assert!(serialize.source().is_some());

        assert!(RpcError::Flush("f".into()).source().is_none());

        let malformed = RpcError::MalformedReply {
            request_id: RequestId::from("r1"),
            error: ReplyError::Handler("x".into()),
        };
        assert_eq!(malformed.source().unwrap().to_string(), "Reply handler panicked: x");
    }

    #[test]
    fn reply_error_display() {
        let decode = ReplyError::Decode(serde_json::from_str::<String>("{").unwrap_err());
        assert!(decode.to_string().starts_with("Failed to decode reply"));
        assert!(decode.source().is_some());

        let handler = ReplyError::Handler("oops".into());
        assert_eq!(handler.to_string(), "Reply handler panicked: oops");
    }
}
