use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use crate::http::accumulator::read_request;
use crate::http::writer::ResponseWriter;
use crate::server::handler::Router;

/// One accepted client connection, serving exactly one request.
pub struct Connection<S> {
    stream: S,
    peer: SocketAddr,
    router: Arc<Router>,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, peer: SocketAddr, router: Arc<Router>) -> Self {
        Self {
            stream,
            peer,
            router,
        }
    }

    /// Reads the request, runs its handler and closes the stream.
    ///
    /// A request that fails to parse gets no response; the connection is
    /// simply closed.
    pub async fn run(mut self) -> anyhow::Result<()> {
        let request = match read_request(&mut self.stream).await {
            Ok(request) => request,
            Err(e) => {
                tracing::debug!(peer = %self.peer, error = %e, "Dropping unparseable request");
                return Err(e.into());
            }
        };

        tracing::info!(
            peer = %self.peer,
            method = %request.method(),
            path = %request.target(),
            "Request received"
        );

        let mut writer = ResponseWriter::new(&mut self.stream);
        self.router.handle(&request, &mut writer).await?;

        let stream = writer.finish().await?;
        stream.shutdown().await?;

        Ok(())
    }
}
