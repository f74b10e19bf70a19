//! Streams an upstream body to the client as a chunked response.
//!
//! The relayed bytes are hashed as they pass through and the digest and
//! length go out as trailers once the upstream is exhausted.

use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};

use crate::http::headers::HeaderMap;
use crate::http::response::{StatusCode, default_headers};
use crate::http::writer::{ResponseWriter, WriterError};

/// Upper bound on a single upstream read, and so on a single chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

pub const TRAILER_SHA256: &str = "X-Content-SHA256";
pub const TRAILER_LENGTH: &str = "X-Content-Length";

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("failed to start relayed response: {0}")]
    Start(#[source] WriterError),

    #[error("upstream read failed after {relayed} bytes: {source}")]
    Upstream {
        relayed: u64,
        #[source]
        source: std::io::Error,
    },

    #[error("client write failed after {relayed} bytes: {source}")]
    Client {
        relayed: u64,
        #[source]
        source: WriterError,
    },

    #[error("failed to finalize relayed response: {0}")]
    Finalize(#[source] WriterError),
}

/// What was relayed: byte count and lowercase hex SHA-256.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayStats {
    pub bytes: u64,
    pub sha256: String,
}

impl RelayStats {
    pub fn trailers(&self) -> HeaderMap {
        let mut trailers = HeaderMap::new();
        trailers.set(TRAILER_SHA256, self.sha256.clone());
        trailers.set(TRAILER_LENGTH, self.bytes.to_string());
        trailers
    }
}

/// Running digest and length of everything relayed so far.
#[derive(Debug, Clone, Default)]
pub struct ContentDigest {
    hasher: Sha256,
    bytes: u64,
}

impl ContentDigest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
        self.bytes += data.len() as u64;
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    pub fn finish(self) -> RelayStats {
        RelayStats {
            bytes: self.bytes,
            sha256: format!("{:x}", self.hasher.finalize()),
        }
    }
}

/// Headers announcing a chunked body with integrity trailers.
pub fn relay_headers() -> HeaderMap {
    let mut headers = default_headers(0);
    headers.remove("Content-Length");
    headers.replace("Transfer-Encoding", "chunked");
    headers.replace("Trailer", format!("{TRAILER_SHA256}, {TRAILER_LENGTH}"));
    headers
}

/// Relays `upstream` to the client behind `writer`.
///
/// The writer must not have been used yet; the relay sends the status line
/// and headers itself. If reading upstream or writing a chunk fails, the
/// loop stops but the last chunk and trailers are still attempted so the
/// client sees well-formed framing. The first failure is returned.
pub async fn relay<R, W>(
    writer: &mut ResponseWriter<W>,
    upstream: &mut R,
    chunk_size: usize,
) -> Result<RelayStats, RelayError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    writer
        .write_status_line(StatusCode::Ok)
        .await
        .map_err(RelayError::Start)?;
    writer
        .write_headers(&relay_headers())
        .await
        .map_err(RelayError::Start)?;

    let mut digest = ContentDigest::new();
    let mut buf = vec![0u8; chunk_size.max(1)];
    let mut failure = None;

    loop {
        let n = match upstream.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    relayed = digest.bytes(),
                    "Error reading upstream body, aborting relay"
                );
                failure = Some(RelayError::Upstream {
                    relayed: digest.bytes(),
                    source: e,
                });
                break;
            }
        };

        tracing::trace!(bytes = n, "Relaying chunk");
        digest.update(&buf[..n]);

        if let Err(e) = writer.write_chunked_body(&buf[..n]).await {
            tracing::warn!(
                error = %e,
                relayed = digest.bytes(),
                "Error writing chunk to client, aborting relay"
            );
            failure = Some(RelayError::Client {
                relayed: digest.bytes(),
                source: e,
            });
            break;
        }
    }

    let stats = digest.finish();
    let finalized = finalize(writer, &stats).await;

    match (failure, finalized) {
        (None, Ok(())) => {
            tracing::debug!(bytes = stats.bytes, sha256 = %stats.sha256, "Relay complete");
            Ok(stats)
        }
        (None, Err(e)) => Err(RelayError::Finalize(e)),
        (Some(failure), Ok(())) => Err(failure),
        (Some(failure), Err(e)) => {
            tracing::warn!(error = %e, "Best-effort relay finalization failed");
            Err(failure)
        }
    }
}

async fn finalize<W>(writer: &mut ResponseWriter<W>, stats: &RelayStats) -> Result<(), WriterError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_chunked_body_done().await?;
    writer.write_trailers(&stats.trailers()).await
}
