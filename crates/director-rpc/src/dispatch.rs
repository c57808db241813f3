//! Routes replies arriving on the inbox subscription to their pending handlers.
//!
//! Each message is handled in isolation: nothing that goes wrong with one reply
//! can stop the loop or touch another pending request.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use async_nats::Message;
use futures::{Stream, StreamExt};
use tracing::{debug, error, info, trace, warn};

use crate::error::ReplyError;
use crate::inbox::Inbox;
use crate::message::Reply;
use crate::pending::PendingRequests;

/// What became of one inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyOutcome {
    Delivered,
    /// No pending request under that id: already answered, cancelled, or unknown.
    Stale,
    /// Subject is not addressed to this inbox.
    Unroutable,
    DecodeFailed,
    HandlerFailed,
}

pub fn handle_reply(
    inbox: &Inbox,
    pending: &PendingRequests,
    subject: &str,
    body: &[u8],
) -> ReplyOutcome {
    debug!(subject, body = %String::from_utf8_lossy(body), "RECEIVED");

    let Some(request_id) = inbox.request_id(subject) else {
        debug!(subject, inbox = inbox.name(), "Dropping reply outside inbox");
        return ReplyOutcome::Unroutable;
    };

    // At-least-once delivery makes duplicates normal; not worth a warning.
    let Some(handler) = pending.take(&request_id) else {
        trace!(%request_id, "No pending request for reply");
        return ReplyOutcome::Stale;
    };

    // A taken handler always runs, with the decode error for a malformed body.
    let (result, outcome) = match Reply::decode(body) {
        Ok(reply) => (Ok(reply), ReplyOutcome::Delivered),
        Err(e) => {
            let error = ReplyError::Decode(e);
            warn!(%request_id, subject, error = %error, "Dropping malformed reply");
            (Err(error), ReplyOutcome::DecodeFailed)
        }
    };

    match panic::catch_unwind(AssertUnwindSafe(move || handler(result))) {
        Ok(()) => outcome,
        Err(panic) => {
            let error = ReplyError::Handler(panic_message(panic.as_ref()));
            warn!(%request_id, subject, error = %error, "Reply handler failed");
            ReplyOutcome::HandlerFailed
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Drains `subscription` until the server ends it.
pub async fn run<S>(mut subscription: S, inbox: Inbox, pending: Arc<PendingRequests>)
where
    S: Stream<Item = Message> + Unpin,
{
    info!(inbox = inbox.name(), "Inbox dispatcher started");

    while let Some(message) = subscription.next().await {
        let subject: &str = &message.subject;
        handle_reply(&inbox, &pending, subject, &message.payload);
    }

    error!(
        inbox = inbox.name(),
        pending = pending.len(),
        "Inbox subscription ended; pending requests will not be answered"
    );
}
