//! Listening socket, routing and the state that lives as long as the server.

pub mod listener;
pub mod router;

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

use crate::config::Config;
use crate::registry::WaitRegistry;
use crate::server::router::Router;

pub struct Server {
    cfg: Config,
    registry: Arc<WaitRegistry>,
    router: Arc<Router>,
}

impl Server {
    pub fn new(cfg: Config) -> Self {
        let registry = Arc::new(WaitRegistry::new());
        let router = Arc::new(Router::new(&cfg, Arc::clone(&registry)));
        Self {
            cfg,
            registry,
            router,
        }
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// The wait registry shared by every connection of this server.
    pub fn registry(&self) -> Arc<WaitRegistry> {
        Arc::clone(&self.registry)
    }

    /// Binds the configured address and serves until an accept fails.
    pub async fn run(&self) -> anyhow::Result<()> {
        let listener = TcpListener::bind(&self.cfg.listen_addr).await?;
        info!(addr = %self.cfg.listen_addr, "listening");
        self.serve(listener).await
    }

    pub async fn serve(&self, listener: TcpListener) -> anyhow::Result<()> {
        listener::serve(listener, Arc::clone(&self.router), self.cfg.egress).await
    }
}
