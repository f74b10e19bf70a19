use std::future::Future;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::info;

use crate::config::Config;
use crate::http::connection::Connection;
use crate::server::handler::Router;
use crate::server::registry::ConnectionRegistry;

/// Binds `cfg.listen_addr` and serves until `shutdown` resolves.
pub async fn run<F>(cfg: &Config, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()>,
{
    let router = Arc::new(Router::new(cfg)?);
    let listener = TcpListener::bind(&cfg.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", cfg.listen_addr))?;
    info!("Listening on {}", listener.local_addr()?);

    serve(listener, router, ConnectionRegistry::new(), shutdown).await
}

/// Accepts connections on `listener`, one task each, until `shutdown`
/// resolves. Then stops accepting and waits for in-flight connections.
pub async fn serve<F>(
    listener: TcpListener,
    router: Arc<Router>,
    registry: ConnectionRegistry,
    shutdown: F,
) -> anyhow::Result<()>
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Shutdown signal received, no longer accepting connections");
                break;
            }

            accepted = listener.accept() => {
                let (socket, peer) = match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        tracing::error!(error = %e, "Accept error");
                        continue;
                    }
                };
                info!("Accepted connection from {}", peer);

                let guard = registry.register(peer);
                let router = Arc::clone(&router);
                tokio::spawn(async move {
                    let _guard = guard;
                    let conn = Connection::new(socket, peer, router);
                    if let Err(e) = conn.run().await {
                        tracing::error!("Connection error from {}: {}", peer, e);
                    }
                });
            }
        }
    }

    drop(listener);

    info!(active = registry.active_count(), "Waiting for in-flight connections");
    registry.wait_idle().await;
    info!("All connections closed");

    Ok(())
}
