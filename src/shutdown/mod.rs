//! Graceful shutdown coordinator (A5). Grounded on the lineage's
//! `GracefulShutdown`, scaled down: this crate's reactor and executor are
//! synchronous OS threads rather than tokio tasks, so there is no
//! semaphore-based wait-group here — only the signal-to-cancellation bridge.
//! Draining is the caller's responsibility (`Reactor::run` returning,
//! `Executor::stop(true)` blocking until empty).

use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Clone)]
pub struct GracefulShutdown {
    token: CancellationToken,
}

impl GracefulShutdown {
    pub fn new(token: CancellationToken) -> Self {
        Self { token }
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Waits for Ctrl+C or an externally triggered cancellation, then cancels
    /// the shared token so the reactor and executor can begin draining.
    pub async fn await_signal(&self) {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(err) = result {
                    tracing::error!(component = "shutdown", event = "signal_error", error = %err);
                }
                info!(component = "shutdown", event = "os_signal", signal = "SIGINT");
            }
            _ = self.token.cancelled() => {
                info!(component = "shutdown", event = "token_cancelled");
            }
        }
        self.token.cancel();
    }
}
