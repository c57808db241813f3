//! Correlation table: request id → reply handler.
//!
//! Every removal goes through one lock, so a reply and a cancellation racing
//! for the same id resolve to exactly one winner.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::ReplyError;
use crate::message::Reply;
use crate::request_id::RequestId;

/// Invoked at most once with the decoded reply, or the reason it could not be decoded.
pub type ReplyHandler = Box<dyn FnOnce(Result<Reply, ReplyError>) + Send + 'static>;

#[derive(Default)]
pub struct PendingRequests {
    handlers: Mutex<HashMap<RequestId, ReplyHandler>>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    fn handlers(&self) -> MutexGuard<'_, HashMap<RequestId, ReplyHandler>> {
        // Handlers run outside the lock, so a poisoned map is still consistent.
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers `handler` under `id`. Fails, returning the id, if one is already pending.
    pub fn register(&self, id: RequestId, handler: ReplyHandler) -> Result<(), RequestId> {
        match self.handlers().entry(id) {
            Entry::Occupied(entry) => Err(entry.key().clone()),
            Entry::Vacant(entry) => {
                entry.insert(handler);
                Ok(())
            }
        }
    }

    /// Removes and returns the handler; only one caller ever gets it.
    pub fn take(&self, id: &RequestId) -> Option<ReplyHandler> {
        self.handlers().remove(id)
    }

    /// Returns whether a handler was still pending.
    pub fn cancel(&self, id: &RequestId) -> bool {
        self.take(id).is_some()
    }

    pub fn contains(&self, id: &RequestId) -> bool {
        self.handlers().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.handlers().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers().is_empty()
    }
}

impl fmt::Debug for PendingRequests {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingRequests")
            .field("pending", &self.len())
            .finish()
    }
}

/// Cancels the request on drop. Keeps the table clean when a caller waiting
/// on a reply is itself cancelled or times out.
pub(crate) struct CancelOnDrop<'a> {
    pending: &'a PendingRequests,
    id: RequestId,
    armed: bool,
}

impl<'a> CancelOnDrop<'a> {
    pub(crate) fn new(pending: &'a PendingRequests, id: RequestId) -> Self {
        Self {
            pending,
            id,
            armed: true,
        }
    }

    /// Leaves the request pending.
    pub(crate) fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for CancelOnDrop<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.pending.cancel(&self.id);
        }
    }
}
