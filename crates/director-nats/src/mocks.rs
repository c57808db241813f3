//! In-process doubles for unit testing without a NATS server.
//!
//! Enabled with the `test-support` feature:
//!
//! ```toml
//! [dev-dependencies]
//! director-nats = { path = "...", features = ["test-support"] }
//! ```

use crate::client::{FlushClient, PublishClient, SubscribeClient};
use crate::connect::Connector;
use async_nats::subject::ToSubject;
use async_nats::{HeaderMap, Message, Subject};
use bytes::Bytes;
use futures::channel::mpsc;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct MockError(pub String);

impl std::fmt::Display for MockError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for MockError {}

/// One successful operation against the mock, in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockOp {
    Subscribe(String),
    Publish(String),
    Flush,
}

#[derive(Debug, Clone)]
pub struct PublishedMessage {
    pub subject: String,
    pub headers: HeaderMap,
    pub payload: Bytes,
}

impl PublishedMessage {
    pub fn payload_str(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

#[derive(Debug, Default)]
struct MockState {
    ops: Vec<MockOp>,
    published: Vec<PublishedMessage>,
    subscriptions: Vec<(String, mpsc::UnboundedSender<Message>)>,
    publish_failures: u32,
    fail_subscribe: bool,
    fail_flush: bool,
}

/// Records every operation and routes [`MockNatsClient::deliver`]ed messages to
/// subscriptions whose pattern matches, honoring `*` and `>` wildcards.
#[derive(Debug, Clone, Default)]
pub struct MockNatsClient {
    state: Arc<Mutex<MockState>>,
}

impl MockNatsClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ops(&self) -> Vec<MockOp> {
        self.state.lock().unwrap().ops.clone()
    }

    pub fn published(&self) -> Vec<PublishedMessage> {
        self.state.lock().unwrap().published.clone()
    }

    pub fn published_subjects(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .published
            .iter()
            .map(|m| m.subject.clone())
            .collect()
    }

    pub fn subscribed_to(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .subscriptions
            .iter()
            .map(|(pattern, _)| pattern.clone())
            .collect()
    }

    pub fn flush_count(&self) -> usize {
        self.state
            .lock()
            .unwrap()
            .ops
            .iter()
            .filter(|op| matches!(op, MockOp::Flush))
            .count()
    }

    pub fn fail_next_publish(&self) {
        self.fail_publish_count(1);
    }

    pub fn fail_publish_count(&self, n: u32) {
        self.state.lock().unwrap().publish_failures = n;
    }

    pub fn fail_next_subscribe(&self) {
        self.state.lock().unwrap().fail_subscribe = true;
    }

    pub fn fail_next_flush(&self) {
        self.state.lock().unwrap().fail_flush = true;
    }

    /// Simulates the server delivering `payload` on `subject`.
    /// Returns how many live subscriptions received it.
    pub fn deliver(&self, subject: &str, payload: impl Into<Bytes>) -> usize {
        let payload = payload.into();
        let mut state = self.state.lock().unwrap();
        state.subscriptions.retain(|(_, tx)| !tx.is_closed());
        state
            .subscriptions
            .iter()
            .filter(|(pattern, _)| subject_matches(pattern, subject))
            .filter(|(_, tx)| tx.unbounded_send(message(subject, payload.clone())).is_ok())
            .count()
    }

    /// Ends every subscription stream, as a server-side unsubscribe would.
    pub fn close_subscriptions(&self) {
        self.state.lock().unwrap().subscriptions.clear();
    }
}

fn message(subject: &str, payload: Bytes) -> Message {
    Message {
        subject: Subject::from(subject),
        reply: None,
        length: payload.len(),
        payload,
        headers: None,
        status: None,
        description: None,
    }
}

pub(crate) fn subject_matches(pattern: &str, subject: &str) -> bool {
    let mut pattern = pattern.split('.');
    let mut subject = subject.split('.');
    loop {
        match (pattern.next(), subject.next()) {
            (Some(">"), Some(_)) => return true,
            (Some("*"), Some(_)) => continue,
            (Some(p), Some(s)) if p == s => continue,
            (None, None) => return true,
            _ => return false,
        }
    }
}

impl SubscribeClient for MockNatsClient {
    type SubscribeError = MockError;
    type Subscription = mpsc::UnboundedReceiver<Message>;

    async fn subscribe<S: ToSubject + Send>(
        &self,
        subject: S,
    ) -> Result<Self::Subscription, MockError> {
        let subject = subject.to_subject().to_string();
        let mut state = self.state.lock().unwrap();
        if std::mem::take(&mut state.fail_subscribe) {
            return Err(MockError("simulated subscribe failure".to_string()));
        }
        let (tx, rx) = mpsc::unbounded();
        state.ops.push(MockOp::Subscribe(subject.clone()));
        state.subscriptions.push((subject, tx));
        Ok(rx)
    }
}

impl PublishClient for MockNatsClient {
    type PublishError = MockError;

    async fn publish_with_headers<S: ToSubject + Send>(
        &self,
        subject: S,
        headers: HeaderMap,
        payload: Bytes,
    ) -> Result<(), MockError> {
        let subject = subject.to_subject().to_string();
        let mut state = self.state.lock().unwrap();
        if state.publish_failures > 0 {
            state.publish_failures -= 1;
            return Err(MockError("simulated publish failure".to_string()));
        }
        state.ops.push(MockOp::Publish(subject.clone()));
        state.published.push(PublishedMessage {
            subject,
            headers,
            payload,
        });
        Ok(())
    }
}

impl FlushClient for MockNatsClient {
    type FlushError = MockError;

    async fn flush(&self) -> Result<(), MockError> {
        let mut state = self.state.lock().unwrap();
        if std::mem::take(&mut state.fail_flush) {
            return Err(MockError("simulated flush failure".to_string()));
        }
        state.ops.push(MockOp::Flush);
        Ok(())
    }
}

/// Hands out clones of one [`MockNatsClient`] and counts connect attempts.
#[derive(Debug, Clone)]
pub struct MockConnector {
    client: MockNatsClient,
    attempts: Arc<AtomicUsize>,
    failures: Arc<AtomicU32>,
    delay: Duration,
}

impl MockConnector {
    pub fn new(client: MockNatsClient) -> Self {
        Self {
            client,
            attempts: Arc::new(AtomicUsize::new(0)),
            failures: Arc::new(AtomicU32::new(0)),
            delay: Duration::ZERO,
        }
    }

    /// Holds every connect attempt open for `delay`, widening race windows.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn fail_next_connect(&self) {
        self.fail_connect_count(1);
    }

    pub fn fail_connect_count(&self, n: u32) {
        self.failures.store(n, Ordering::SeqCst);
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn client(&self) -> &MockNatsClient {
        &self.client
    }
}

impl Connector for MockConnector {
    type Client = MockNatsClient;
    type Error = MockError;

    async fn connect(&self) -> Result<MockNatsClient, MockError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let should_fail = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(MockError("simulated connect failure".to_string()));
        }
        Ok(self.client.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[test]
    fn subject_matching_honors_wildcards() {
        assert!(subject_matches("director.abc.*", "director.abc.123"));
        assert!(!subject_matches("director.abc.*", "director.abc.1.2"));
        assert!(!subject_matches("director.abc.*", "director.abc"));
        assert!(subject_matches("director.>", "director.abc.1.2"));
        assert!(!subject_matches("director.>", "director"));
        assert!(subject_matches("agent.123", "agent.123"));
        assert!(!subject_matches("agent.123", "agent.124"));
    }

    #[tokio::test]
    async fn records_operations_in_order() {
        let mock = MockNatsClient::new();
        let _sub = mock.subscribe("inbox.*").await.unwrap();
        mock.flush().await.unwrap();
        mock.publish_with_headers("agent.1", HeaderMap::new(), Bytes::from("{}"))
            .await
            .unwrap();

        assert_eq!(
            mock.ops(),
            vec![
                MockOp::Subscribe("inbox.*".to_string()),
                MockOp::Flush,
                MockOp::Publish("agent.1".to_string()),
            ]
        );
        assert_eq!(mock.published()[0].payload_str(), "{}");
        assert_eq!(mock.flush_count(), 1);
    }

    #[tokio::test]
    async fn deliver_routes_to_matching_subscription() {
        let mock = MockNatsClient::new();
        let mut sub = mock.subscribe("inbox.*").await.unwrap();

        assert_eq!(mock.deliver("inbox.42", "hello"), 1);
        assert_eq!(mock.deliver("elsewhere.42", "nope"), 0);

        let msg = sub.next().await.unwrap();
        assert_eq!(msg.subject.to_string(), "inbox.42");
        assert_eq!(msg.payload, Bytes::from("hello"));
    }

    #[tokio::test]
    async fn deliver_skips_dropped_subscriptions() {
        let mock = MockNatsClient::new();
        drop(mock.subscribe("inbox.*").await.unwrap());
        assert_eq!(mock.deliver("inbox.1", "x"), 0);
        assert!(mock.subscribed_to().is_empty());
    }

    #[tokio::test]
    async fn close_subscriptions_ends_streams() {
        let mock = MockNatsClient::new();
        let mut sub = mock.subscribe("inbox.*").await.unwrap();
        mock.close_subscriptions();
        assert!(sub.next().await.is_none());
    }

    #[tokio::test]
    async fn failure_injection_is_one_shot() {
        let mock = MockNatsClient::new();
        mock.fail_next_subscribe();
        mock.fail_next_flush();
        mock.fail_publish_count(2);

        assert!(mock.subscribe("a").await.is_err());
        assert!(mock.subscribe("a").await.is_ok());
        assert!(mock.flush().await.is_err());
        assert!(mock.flush().await.is_ok());
        for expected_ok in [false, false, true] {
            let result = mock
                .publish_with_headers("s", HeaderMap::new(), Bytes::new())
                .await;
            assert_eq!(result.is_ok(), expected_ok);
        }
        assert_eq!(mock.published_subjects(), vec!["s"]);
    }

    #[tokio::test]
    async fn connector_counts_attempts_and_fails_on_demand() {
        let connector = MockConnector::new(MockNatsClient::new());
        connector.fail_next_connect();

        assert!(connector.connect().await.is_err());
        assert!(connector.connect().await.is_ok());
        assert_eq!(connector.attempts(), 2);
    }

    #[test]
    fn mock_error_display() {
        let err = MockError("test".into());
        assert_eq!(err.to_string(), "test");
        assert!(std::error::Error::source(&err).is_none());
    }
}
