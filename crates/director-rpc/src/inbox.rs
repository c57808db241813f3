use std::sync::Arc;

use crate::request_id::RequestId;

pub const DEFAULT_INBOX_PREFIX: &str = "director";

/// Per-process reply namespace `<prefix>.<process id>`.
///
/// Replies arrive on `<inbox>.<request id>`; one wildcard subscription covers all of them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inbox {
    name: Arc<str>,
}

impl Inbox {
    pub fn new(prefix: &str, process_id: &str) -> Self {
        Self {
            name: format!("{prefix}.{process_id}").into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn wildcard(&self) -> String {
        format!("{}.*", self.name)
    }

    pub fn reply_subject(&self, id: &RequestId) -> String {
        format!("{}.{}", self.name, id)
    }

    /// The request id addressed by `subject`: its final token.
    /// `None` when the subject lies outside this inbox.
    pub fn request_id(&self, subject: &str) -> Option<RequestId> {
        let suffix = subject.strip_prefix(self.name())?.strip_prefix('.')?;
        suffix
            .rsplit('.')
            .next()
            .filter(|token| !token.is_empty())
            .map(RequestId::from)
    }
}
