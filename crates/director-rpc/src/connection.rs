//! Lazily established, memoized bus connection.
//!
//! Concurrent first callers join a single shared connect attempt, so exactly
//! one connect runs and everyone observes its outcome. A failed attempt is
//! forgotten; the next caller starts a fresh one. An attempt that finished
//! after all of its callers went away is settled by whoever looks next.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use director_nats::Connector;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tracing::{info, warn};

use crate::error::ConnectionError;

type ConnectAttempt<N> = Shared<BoxFuture<'static, Result<N, ConnectionError>>>;

enum State<N> {
    Idle,
    Connecting(ConnectAttempt<N>),
    Connected(N),
}

pub struct LazyConnection<C: Connector> {
    connector: Arc<C>,
    state: Mutex<State<C::Client>>,
}

impl<C: Connector> LazyConnection<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector: Arc::new(connector),
            state: Mutex::new(State::Idle),
        }
    }

    fn state(&self) -> MutexGuard<'_, State<C::Client>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Locks the slot, first settling an attempt that already finished.
    fn settled_state(&self) -> MutexGuard<'_, State<C::Client>> {
        let mut state = self.state();
        let outcome = match &*state {
            State::Connecting(attempt) => attempt
                .peek()
                .map(|result| result.as_ref().ok().cloned()),
            _ => None,
        };
        match outcome {
            Some(Some(client)) => *state = State::Connected(client),
            Some(None) => *state = State::Idle,
            None => {}
        }
        state
    }

    pub fn is_connected(&self) -> bool {
        matches!(*self.settled_state(), State::Connected(_))
    }

    /// Returns the connection, connecting on first use.
    pub async fn ensure_connected(&self) -> Result<C::Client, ConnectionError> {
        let attempt = {
            let mut state = self.settled_state();
            match &*state {
                State::Connected(client) => return Ok(client.clone()),
                State::Connecting(attempt) => attempt.clone(),
                State::Idle => {
                    let attempt = self.start_attempt();
                    *state = State::Connecting(attempt.clone());
                    attempt
                }
            }
        };

        let result = attempt.clone().await;

        let mut state = self.state();
        if let State::Connecting(current) = &*state
            && current.ptr_eq(&attempt)
        {
            *state = match &result {
                Ok(client) => State::Connected(client.clone()),
                Err(_) => State::Idle,
            };
        }
        result
    }

    fn start_attempt(&self) -> ConnectAttempt<C::Client> {
        let connector = Arc::clone(&self.connector);
        async move {
            match connector.connect().await {
                Ok(client) => {
                    info!("Bus connection established");
                    Ok(client)
                }
                Err(e) => {
                    warn!(error = %e, "Bus connection attempt failed");
                    Err(ConnectionError::new(e))
                }
            }
        }
        .boxed()
        .shared()
    }
}
