//! Request routing and the built-in pages.

use tokio::io::AsyncWrite;

use crate::config::Config;
use crate::http::request::Request;
use crate::http::response::{StatusCode, default_headers};
use crate::http::writer::ResponseWriter;
use crate::proxy::relay::relay;
use crate::proxy::upstream::{PROXY_PREFIX, UpstreamClient};

const PAGE_200: &str = "<html>
<head>
<title>200 OK</title>
</head>
<body>
<h1>Success!</h1>
<p>Your request was an absolute banger.</p>
</body>
</html>
";

const PAGE_400: &str = "<html>
<head>
<title>400 Bad Request</title>
</head>
<body>
<h1>Bad Request</h1>
<p>Your request honestly kinda sucked.</p>
</body>
</html>";

const PAGE_500: &str = "<html>
<head>
<title>500 Internal Server Error</title>
</head>
<body>
<h1>Internal Server Error</h1>
<p>Okay, you know what? This one is on me.</p>
</body>
</html>
";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Forward to the upstream and relay the body chunked
    Proxy,
    BadRequest,
    InternalError,
    Ok,
}

/// Picks a route by request target: `/httpbin` prefix, then exact paths.
pub fn route(target: &str) -> Route {
    if target.starts_with(PROXY_PREFIX) {
        return Route::Proxy;
    }

    match target {
        "/yourproblem" => Route::BadRequest,
        "/myproblem" => Route::InternalError,
        _ => Route::Ok,
    }
}

/// Dispatches parsed requests to a route and drives the response writer.
#[derive(Debug, Clone)]
pub struct Router {
    upstream: UpstreamClient,
    relay_chunk_size: usize,
}

impl Router {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        Ok(Self {
            upstream: UpstreamClient::from_config(cfg)?,
            relay_chunk_size: cfg.relay_chunk_size,
        })
    }

    pub async fn handle<W>(&self, req: &Request, writer: &mut ResponseWriter<W>) -> anyhow::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        match route(req.target()) {
            Route::Proxy => self.proxy(req, writer).await,
            Route::BadRequest => write_page(writer, StatusCode::BadRequest, PAGE_400).await,
            Route::InternalError => {
                write_page(writer, StatusCode::InternalServerError, PAGE_500).await
            }
            Route::Ok => write_page(writer, StatusCode::Ok, PAGE_200).await,
        }
    }

    async fn proxy<W>(&self, req: &Request, writer: &mut ResponseWriter<W>) -> anyhow::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let mut upstream = match self.upstream.open(req.target()).await {
            Ok(upstream) => upstream,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    path = %req.target(),
                    "Failed to open upstream"
                );
                return write_page(writer, StatusCode::InternalServerError, PAGE_500).await;
            }
        };

        let stats = relay(writer, &mut upstream.body, self.relay_chunk_size).await?;

        tracing::info!(
            path = %req.target(),
            upstream_status = upstream.status,
            bytes = stats.bytes,
            sha256 = %stats.sha256,
            "Proxied response relayed"
        );
        Ok(())
    }
}

/// Writes a complete fixed-length HTML response.
pub async fn write_page<W>(
    writer: &mut ResponseWriter<W>,
    status: StatusCode,
    body: &str,
) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut headers = default_headers(body.len());
    headers.replace("Content-Type", "text/html");

    writer.write_status_line(status).await?;
    writer.write_headers(&headers).await?;
    writer.write_body(body.as_bytes()).await?;
    Ok(())
}
