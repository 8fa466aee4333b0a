use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{error, info};

use crate::config::EgressConfig;
use crate::http::connection::Connection;
use crate::server::router::Router;

/// Accepts connections forever, serving each on its own task.
pub async fn serve(
    listener: TcpListener,
    router: Arc<Router>,
    egress: EgressConfig,
) -> anyhow::Result<()> {
    loop {
        let (socket, peer) = listener.accept().await?;
        info!(%peer, "accepted connection");
        if let Err(e) = socket.set_nodelay(true) {
            error!(%peer, error = %e, "cannot disable Nagle");
        }

        let router = Arc::clone(&router);
        tokio::spawn(async move {
            let conn = Connection::new(socket, router, egress);
            if let Err(e) = conn.run().await {
                error!(%peer, error = %e, "connection error");
            }
        });
    }
}
