//! TCP accept loop.

use crate::config::ServerConfig;
use crate::handler::ConnectionHandler;
use crate::ids::IdAllocator;
use crate::registry::{SessionRegistry, deliver};
use anyhow::{Context, Result};
use noughts_engine::Searcher;
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{debug, info, instrument, warn};

/// Game server bound to a TCP listener.
#[derive(Debug)]
pub struct GameServer {
    listener: TcpListener,
    registry: SessionRegistry,
    searcher: Searcher,
    config: ServerConfig,
    conn_ids: IdAllocator,
}

impl GameServer {
    /// Binds the listener and builds the engine's search pool.
    #[instrument(skip(config), fields(addr = %config.bind_addr(), search = %config.search()))]
    pub async fn bind(config: ServerConfig) -> Result<Self> {
        config.validate().context("Invalid server config")?;
        let searcher = Searcher::new(*config.search(), *config.search_threads())
            .context("Failed to set up engine search")?;
        let listener = TcpListener::bind(config.bind_addr())
            .await
            .with_context(|| format!("Failed to bind {}", config.bind_addr()))?;

        info!(addr = %listener.local_addr()?, "Server listening");
        Ok(Self {
            listener,
            registry: SessionRegistry::new(),
            searcher,
            config,
            conn_ids: IdAllocator::new(),
        })
    }

    /// Address actually bound; differs from the config when port 0 was used.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .context("Listener has no local address")
    }

    /// Shared session registry.
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Accepts connections forever.
    pub async fn run(self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Accepts connections until `shutdown` resolves.
    ///
    /// Connections already accepted keep running on their own tasks.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let reaper = self
            .config
            .idle_timeout()
            .map(|max_wait| tokio::spawn(reap_idle(self.registry.clone(), max_wait)));

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested, no longer accepting connections");
                    break;
                }
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            let conn = self.conn_ids.next_conn();
                            info!(conn_id = %conn, %peer, "Accepted connection");
                            if let Err(e) = stream.set_nodelay(true) {
                                debug!(error = %e, "Could not disable Nagle");
                            }
                            let handler = ConnectionHandler::new(
                                conn,
                                self.registry.clone(),
                                self.searcher.clone(),
                                *self.config.max_frame_len(),
                            );
                            tokio::spawn(handler.run(stream));
                        }
                        Err(e) => warn!(error = %e, "Accept failed"),
                    }
                }
            }
        }

        if let Some(reaper) = reaper {
            reaper.abort();
        }
        Ok(())
    }
}

/// Periodically aborts sessions nobody joined within `max_wait`.
async fn reap_idle(registry: SessionRegistry, max_wait: Duration) {
    let period = (max_wait / 2).clamp(Duration::from_millis(50), Duration::from_secs(5));
    let mut ticker = tokio::time::interval(period);
    loop {
        ticker.tick().await;
        let deliveries = registry.reap_idle(max_wait);
        if !deliveries.is_empty() {
            debug!(count = deliveries.len(), "Notifying expired creators");
        }
        deliver(deliveries);
    }
}
