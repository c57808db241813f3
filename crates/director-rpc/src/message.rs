//! Wire shapes exchanged with agents.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A command for an agent: `method`, positional `arguments`, and any further
/// caller-defined top-level fields (e.g. `protocol`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub method: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub arguments: Vec<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Request {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            arguments: Vec::new(),
            extra: Map::new(),
        }
    }

    pub fn with_arguments(mut self, arguments: impl IntoIterator<Item = Value>) -> Self {
        self.arguments.extend(arguments);
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

/// A [`Request`] that expects an answer on `reply_to`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelatedRequest {
    #[serde(flatten)]
    pub request: Request,
    pub reply_to: String,
}

impl CorrelatedRequest {
    /// Any caller-supplied `reply_to` field is replaced by `reply_to`.
    pub fn new(mut request: Request, reply_to: String) -> Self {
        request.extra.remove("reply_to");
        Self { request, reply_to }
    }
}

/// Decoded body of a reply. An empty body is a valid answer, distinct from a
/// body that fails to parse.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Empty,
    Payload(Value),
}

impl Reply {
    pub fn decode(body: &[u8]) -> Result<Self, serde_json::Error> {
        if body.is_empty() {
            return Ok(Self::Empty);
        }
        serde_json::from_slice(body).map(Self::Payload)
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Empty => None,
            Self::Payload(value) => Some(value),
        }
    }

    pub fn into_value(self) -> Option<Value> {
        match self {
            Self::Empty => None,
            Self::Payload(value) => Some(value),
        }
    }

    /// Deserializes the payload into `T`; `Ok(None)` for an empty reply.
    pub fn parse<T: DeserializeOwned>(self) -> Result<Option<T>, serde_json::Error> {
        self.into_value().map(serde_json::from_value).transpose()
    }
}
