use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shutdown {
    Interrupt,
    Terminate,
}

/// Resolves with the first stop signal received.
///
/// A handler that cannot be installed is logged and never fires.
pub async fn wait_for_shutdown() -> Shutdown {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => tokio::select! {
                _ = interrupt() => Shutdown::Interrupt,
                _ = terminate.recv() => Shutdown::Terminate,
            },
            Err(error) => {
                warn!(%error, "SIGTERM handler unavailable; only Ctrl+C stops the call");
                interrupt().await;
                Shutdown::Interrupt
            }
        }
    }

    #[cfg(not(unix))]
    {
        interrupt().await;
        Shutdown::Interrupt
    }
}

async fn interrupt() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(%error, "Ctrl+C handler unavailable");
        std::future::pending::<()>().await;
    }
}
