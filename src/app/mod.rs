//! Wires configuration, storage, executor and reactor into a runnable
//! service. Grounded on the config -> backend -> storage -> server
//! composition of the lineage's `App`.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::executor::Executor;
use crate::net::Reactor;
use crate::storage::StripedStore;

pub struct App {
    cfg: Config,
    storage: Arc<StripedStore>,
    executor: Option<Arc<Executor>>,
}

impl App {
    pub fn new(cfg: Config) -> Result<Self> {
        let storage = Arc::new(
            StripedStore::new(cfg.total_bytes, cfg.shards).context("failed to construct the striped store")?,
        );
        let executor = cfg.threaded.then(|| {
            Arc::new(Executor::new(
                cfg.low_watermark,
                cfg.high_watermark,
                cfg.idle_timeout,
                cfg.max_queue,
            ))
        });
        Ok(Self { cfg, storage, executor })
    }

    /// Runs the reactor to completion. Blocks the calling thread until
    /// `cancel` fires and the connection set has drained.
    pub fn serve(&self, cancel: CancellationToken) -> Result<()> {
        if let Some(executor) = &self.executor {
            executor.start();
        }
        tracing::info!(
            component = "app",
            event = "listening",
            addr = %self.cfg.listen_addr,
            shards = self.cfg.shards,
            threaded = self.cfg.threaded,
        );
        let reactor = Arc::new(
            Reactor::bind(
                &self.cfg.listen_addr,
                self.storage.clone(),
                self.executor.clone(),
                cancel.clone(),
            )
            .with_context(|| format!("failed to bind {}", self.cfg.listen_addr))?,
        );

        // `Reactor::run` only re-checks the token once per `epoll_wait`
        // timeout; poll from a side thread and `wake()` so cancellation is
        // observed immediately instead of after up to a second of latency.
        let waker = std::thread::spawn({
            let reactor = reactor.clone();
            let cancel = cancel.clone();
            move || {
                while !cancel.is_cancelled() {
                    std::thread::sleep(std::time::Duration::from_millis(50));
                }
                reactor.wake();
            }
        });

        reactor.run();
        let _ = waker.join();

        if let Some(executor) = &self.executor {
            tracing::info!(component = "app", event = "draining_executor");
            executor.stop(true);
        }
        Ok(())
    }

    pub fn storage(&self) -> Arc<StripedStore> {
        self.storage.clone()
    }
}

#[cfg(test)]
#[path = "app_test.rs"]
mod app_test;
