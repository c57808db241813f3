//! The RPC client: fire-and-forget messages and correlated requests.

use std::sync::Arc;
use std::time::Duration;

use director_nats::{
    Connector, FlushClient, NatsConnector, PublishClient, SubscribeClient,
    headers_with_trace_context,
};
use serde::Serialize;
use tokio::sync::{OnceCell, oneshot};
use tokio::task::JoinHandle;
use tracing::{Level, debug, info, instrument, warn};

use crate::config::RpcConfig;
use crate::connection::LazyConnection;
use crate::dispatch;
use crate::error::RpcError;
use crate::inbox::Inbox;
use crate::message::{CorrelatedRequest, Reply, Request};
use crate::pending::{CancelOnDrop, PendingRequests, ReplyHandler};
use crate::request_id::RequestId;
use crate::sanitize::sanitize;

/// How far the link to the bus has come up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connected,
    /// Connected, and the inbox subscription is confirmed by the server.
    Subscribed,
}

/// Sends messages and correlated requests over one lazily opened connection.
///
/// Replies for every request arrive on `<inbox>.<request id>` and are routed
/// by a single background dispatcher, which is stopped when this value is
/// dropped.
pub struct NatsRpc<C: Connector = NatsConnector> {
    connection: LazyConnection<C>,
    inbox: Inbox,
    pending: Arc<PendingRequests>,
    dispatcher: OnceCell<JoinHandle<()>>,
}

impl NatsRpc<NatsConnector> {
    pub fn from_config(config: &RpcConfig) -> Self {
        let inbox = config.inbox();
        let connector = NatsConnector::new(config.nats().clone(), inbox.name());
        Self::new(connector, inbox)
    }
}

impl<C: Connector> NatsRpc<C> {
    pub fn new(connector: C, inbox: Inbox) -> Self {
        Self {
            connection: LazyConnection::new(connector),
            inbox,
            pending: Arc::new(PendingRequests::new()),
            dispatcher: OnceCell::new(),
        }
    }

    pub fn inbox(&self) -> &Inbox {
        &self.inbox
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn state(&self) -> LinkState {
        if self.dispatcher.initialized() {
            LinkState::Subscribed
        } else if self.connection.is_connected() {
            LinkState::Connected
        } else {
            LinkState::Disconnected
        }
    }

    pub async fn ensure_connected(&self) -> Result<C::Client, RpcError> {
        Ok(self.connection.ensure_connected().await?)
    }

    /// Connects if needed and subscribes to the inbox exactly once.
    ///
    /// Returns only after the server has confirmed the subscription, so a reply
    /// to anything published afterwards cannot be missed.
    pub async fn ensure_subscribed(&self) -> Result<C::Client, RpcError> {
        let client = self.ensure_connected().await?;
        self.dispatcher
            .get_or_try_init(|| self.subscribe_inbox(&client))
            .await?;
        Ok(client)
    }

    async fn subscribe_inbox(&self, client: &C::Client) -> Result<JoinHandle<()>, RpcError> {
        let subject = self.inbox.wildcard();
        let subscription =
            client
                .subscribe(subject.clone())
                .await
                .map_err(|e| RpcError::Subscribe {
                    subject: subject.clone(),
                    error: e.to_string(),
                })?;
        client
            .flush()
            .await
            .map_err(|e| RpcError::Flush(e.to_string()))?;

        info!(subject, "Subscribed to inbox");
        Ok(tokio::spawn(dispatch::run(
            subscription,
            self.inbox.clone(),
            Arc::clone(&self.pending),
        )))
    }

    /// Publishes `message` to `destination` without expecting a reply.
    #[instrument(skip(self, message), fields(method = %message.method))]
    pub async fn send_message(&self, destination: &str, message: &Request) -> Result<(), RpcError> {
        let payload = serde_json::to_vec(message).map_err(RpcError::Serialize)?;
        log_sent(destination, message);
        let client = self.ensure_connected().await?;
        publish(&client, destination, payload).await
    }

    /// Publishes `request` with a fresh `reply_to` and registers `handler` for
    /// the reply.
    ///
    /// `handler` runs at most once, on the dispatcher task. It never runs if
    /// the request is cancelled first, no reply arrives, or the reply body is
    /// malformed. There is no timeout; see [`call`](Self::call) for a bounded
    /// wait.
    pub async fn send_request<F>(
        &self,
        destination: &str,
        request: Request,
        handler: F,
    ) -> Result<RequestId, RpcError>
    where
        F: FnOnce(Reply) + Send + 'static,
    {
        let handler: ReplyHandler = Box::new(move |result| {
            if let Ok(reply) = result {
                handler(reply);
            }
        });
        self.send_correlated(destination, request, handler).await
    }

    #[instrument(skip(self, request, handler), fields(method = %request.method))]
    async fn send_correlated(
        &self,
        destination: &str,
        request: Request,
        handler: ReplyHandler,
    ) -> Result<RequestId, RpcError> {
        let request_id = RequestId::generate();
        let message = CorrelatedRequest::new(request, self.inbox.reply_subject(&request_id));
        let payload = serde_json::to_vec(&message).map_err(RpcError::Serialize)?;

        self.pending
            .register(request_id.clone(), handler)
            .map_err(RpcError::DuplicateRequestId)?;
        let registration = CancelOnDrop::new(&self.pending, request_id.clone());

        log_sent(destination, &message);
        let client = self.ensure_subscribed().await?;
        publish(&client, destination, payload).await?;

        registration.disarm();
        Ok(request_id)
    }

    /// Forgets the pending request. Returns whether it was still pending.
    pub fn cancel_request(&self, request_id: &RequestId) -> bool {
        let cancelled = self.pending.cancel(request_id);
        debug!(%request_id, cancelled, "Cancel request");
        cancelled
    }

    /// Sends `request` and waits up to `timeout` for its reply.
    ///
    /// A reply whose body cannot be decoded fails with
    /// [`RpcError::MalformedReply`]. On timeout, or if this future is dropped,
    /// the request is cancelled.
    pub async fn call(
        &self,
        destination: &str,
        request: Request,
        timeout: Duration,
    ) -> Result<Reply, RpcError> {
        let (tx, rx) = oneshot::channel();
        let handler: ReplyHandler = Box::new(move |result| {
            let _ = tx.send(result);
        });
        let request_id = self.send_correlated(destination, request, handler).await?;
        let _registration = CancelOnDrop::new(&self.pending, request_id.clone());

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(Ok(reply))) => Ok(reply),
            Ok(Ok(Err(error))) => Err(RpcError::MalformedReply { request_id, error }),
            Ok(Err(_)) => Err(RpcError::Cancelled { request_id }),
            Err(_) => {
                warn!(%request_id, subject = destination, ?timeout, "Request timed out");
                Err(RpcError::Timeout {
                    subject: destination.to_string(),
                    request_id,
                })
            }
        }
    }
}

impl<C: Connector> Drop for NatsRpc<C> {
    fn drop(&mut self) {
        if let Some(dispatcher) = self.dispatcher.get() {
            dispatcher.abort();
        }
    }
}

impl<C: Connector> std::fmt::Debug for NatsRpc<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NatsRpc")
            .field("inbox", &self.inbox.name())
            .field("state", &self.state())
            .field("pending", &self.pending.len())
            .finish()
    }
}

async fn publish<N: PublishClient>(
    client: &N,
    subject: &str,
    payload: Vec<u8>,
) -> Result<(), RpcError> {
    client
        .publish_with_headers(subject.to_string(), headers_with_trace_context(), payload.into())
        .await
        .map_err(|e| RpcError::Publish {
            subject: subject.to_string(),
            error: e.to_string(),
        })
}

fn log_sent<T: Serialize>(subject: &str, message: &T) {
    if !tracing::enabled!(Level::DEBUG) {
        return;
    }
    match sanitize(message) {
        Ok(body) => debug!(subject, body = %body, "SENT"),
        Err(e) => debug!(subject, error = %e, "SENT"),
    }
}
