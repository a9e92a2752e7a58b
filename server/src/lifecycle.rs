//! Application lifecycle and graceful shutdown.
//!
//! On Ctrl+C or SIGTERM:
//! 1. The HTTP server stops accepting connections and drains in-flight requests
//! 2. The orphan sweeper is told to stop
//! 3. Pending counter reconciliations are flushed
//!
//! Steps 2 and 3 share one `SHUTDOWN_TIMEOUT` budget.

use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{info, warn};
use wedding_rsvp_runtime::Services;

/// A bound listener plus everything that runs beside it.
pub struct Application {
    listener: TcpListener,
    app: axum::Router,
    services: Services,
    shutdown_timeout: Duration,
}

impl Application {
    /// Assemble an application from a bound listener and a router over
    /// `services`.
    #[must_use]
    pub fn new(
        listener: TcpListener,
        app: axum::Router,
        services: Services,
        shutdown_timeout: Duration,
    ) -> Self {
        Self {
            listener,
            app,
            services,
            shutdown_timeout,
        }
    }

    /// Serve until a shutdown signal arrives, then stop background work.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the server fails.
    pub async fn run(self) -> std::io::Result<()> {
        self.run_until(shutdown_signal()).await
    }

    /// Like [`run`](Self::run) but stops when `signal` completes.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the server fails.
    pub async fn run_until<F>(self, signal: F) -> std::io::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let (shutdown_tx, _) = broadcast::channel(1);
        let sweeper = self.services.sweeper.clone().spawn(shutdown_tx.subscribe());

        if let Ok(addr) = self.listener.local_addr() {
            info!(%addr, "HTTP server listening");
        }
        axum::serve(self.listener, self.app)
            .with_graceful_shutdown(signal)
            .await?;

        info!("HTTP server stopped, initiating graceful shutdown");
        let deadline = Instant::now() + self.shutdown_timeout;
        let _ = shutdown_tx.send(());

        match tokio::time::timeout_at(deadline, sweeper).await {
            Ok(Ok(())) => info!("Orphan sweeper stopped"),
            Ok(Err(e)) => warn!(error = %e, "Orphan sweeper task failed"),
            Err(_) => warn!("Orphan sweeper shutdown timed out"),
        }

        if tokio::time::timeout_at(deadline, self.services.reconciler.settle())
            .await
            .is_err()
        {
            warn!("Counter reconciliation did not settle before shutdown");
        }

        info!("Graceful shutdown complete");
        Ok(())
    }
}

/// Resolves on Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C signal"),
        () = terminate => info!("Received SIGTERM signal"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use wedding_rsvp_runtime::RuntimeSettings;
    use wedding_rsvp_testing::{InMemoryStore, test_clock};

    #[tokio::test]
    async fn stops_when_signalled() {
        let services = Services::new(
            InMemoryStore::new().stores(),
            Arc::new(test_clock()),
            RuntimeSettings::default(),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let app = Application::new(listener, axum::Router::new(), services, Duration::from_secs(2));

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let running = tokio::spawn(app.run_until(async {
            let _ = rx.await;
        }));
        tx.send(()).unwrap();

        let result = tokio::time::timeout(Duration::from_secs(5), running).await.unwrap();
        assert!(result.unwrap().is_ok());
    }
}
