//! End-to-end tests over real sockets

mod common;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use common::parse_response;
use rawhttp::config::Config;
use rawhttp::proxy::relay::ContentDigest;
use rawhttp::server::handler::Router;
use rawhttp::server::listener::serve;
use rawhttp::server::registry::ConnectionRegistry;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

struct TestServer {
    addr: SocketAddr,
    registry: ConnectionRegistry,
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<anyhow::Result<()>>,
}

async fn start_server(cfg: Config) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = Arc::new(Router::new(&cfg).unwrap());
    let registry = ConnectionRegistry::new();
    let (shutdown, rx) = oneshot::channel::<()>();

    let handle = tokio::spawn(serve(listener, router, registry.clone(), async move {
        let _ = rx.await;
    }));

    TestServer {
        addr,
        registry,
        shutdown,
        handle,
    }
}

async fn send(addr: SocketAddr, request: &[u8]) -> Vec<u8> {
    let mut client = TcpStream::connect(addr).await.unwrap();
    client.write_all(request).await.unwrap();

    let mut response = Vec::new();
    client.read_to_end(&mut response).await.unwrap();
    response
}

/// Serves one canned HTTP response to the first connection it gets and
/// returns the request line it received.
async fn fake_upstream(response: &'static [u8]) -> (SocketAddr, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut head = Vec::new();
        let mut buf = [0u8; 256];
        while !head.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = socket.read(&mut buf).await.unwrap();
            assert!(n > 0, "proxy closed before sending a request");
            head.extend_from_slice(&buf[..n]);
        }

        socket.write_all(response).await.unwrap();
        socket.shutdown().await.unwrap();

        let head = String::from_utf8(head).unwrap();
        head.lines().next().unwrap_or_default().to_string()
    });

    (addr, handle)
}

#[tokio::test]
async fn test_canned_routes() {
    let server = start_server(Config::default()).await;

    let cases = [
        ("/", "HTTP/1.1 200 OK", "Success!"),
        ("/yourproblem", "HTTP/1.1 400 Bad Request", "Bad Request"),
        ("/myproblem", "HTTP/1.1 500 Internal Server Error", "this one is on me"),
    ];

    for (path, status_line, snippet) in cases {
        let request = format!("GET {path} HTTP/1.1\r\nHost: localhost:42069\r\n\r\n");
        let raw = send(server.addr, request.as_bytes()).await;
        let response = parse_response(&raw);

        assert_eq!(response.status_line, status_line);
        assert_eq!(response.headers.get("content-type"), Some("text/html"));
        assert_eq!(response.headers.get("connection"), Some("close"));
        assert_eq!(
            response.headers.get("content-length"),
            Some(response.body.len().to_string().as_str())
        );
        let body = String::from_utf8(response.body).unwrap();
        assert!(body.to_lowercase().contains(&snippet.to_lowercase()), "{path}");
    }

    server.shutdown.send(()).unwrap();
    server.handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_unparseable_request_gets_no_response() {
    let server = start_server(Config::default()).await;

    let mut client = TcpStream::connect(server.addr).await.unwrap();
    client.write_all(b"GET / HTTP/1.0\r\n\r\n").await.unwrap();

    let mut response = Vec::new();
    // the server may reset the connection instead of closing it cleanly
    let _ = client.read_to_end(&mut response).await;
    assert!(response.is_empty());
}

#[tokio::test]
async fn test_proxy_relays_upstream_body_with_trailers() {
    let (upstream_addr, upstream) = fake_upstream(
        b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 26\r\n\r\nabcdefghijklmnopqrstuvwxyz",
    )
    .await;

    let cfg = Config {
        upstream_url: format!("http://{upstream_addr}"),
        relay_chunk_size: 10,
        ..Config::default()
    };
    let server = start_server(cfg).await;

    let raw = send(server.addr, b"GET /httpbin/stream/2 HTTP/1.1\r\nHost: x\r\n\r\n").await;
    assert_eq!(upstream.await.unwrap(), "GET /stream/2 HTTP/1.1");

    let response = parse_response(&raw);
    assert_eq!(response.status_line, "HTTP/1.1 200 OK");
    assert!(response.complete);
    assert_eq!(response.body, b"abcdefghijklmnopqrstuvwxyz");
    assert!(response.chunks.iter().all(|chunk| chunk.len() <= 10));

    let mut digest = ContentDigest::new();
    digest.update(b"abcdefghijklmnopqrstuvwxyz");
    let expected = digest.finish();
    assert_eq!(response.trailers.get("x-content-length"), Some("26"));
    assert_eq!(
        response.trailers.get("x-content-sha256"),
        Some(expected.sha256.as_str())
    );
}

#[tokio::test]
async fn test_proxy_decodes_chunked_upstream() {
    let (upstream_addr, upstream) = fake_upstream(
        b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n4\r\nWiki\r\n5\r\npedia\r\n0\r\n\r\n",
    )
    .await;

    let cfg = Config {
        upstream_url: format!("http://{upstream_addr}/"),
        ..Config::default()
    };
    let server = start_server(cfg).await;

    let raw = send(server.addr, b"GET /httpbin/html HTTP/1.1\r\n\r\n").await;
    upstream.await.unwrap();

    let response = parse_response(&raw);
    assert!(response.complete);
    assert_eq!(response.body, b"Wikipedia");
    assert_eq!(response.trailers.get("x-content-length"), Some("9"));
}

#[tokio::test]
async fn test_unreachable_upstream_answers_500() {
    let closed = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let closed_addr = closed.local_addr().unwrap();
    drop(closed);

    let cfg = Config {
        upstream_url: format!("http://{closed_addr}"),
        ..Config::default()
    };
    let server = start_server(cfg).await;

    let raw = send(server.addr, b"GET /httpbin/get HTTP/1.1\r\n\r\n").await;
    let response = parse_response(&raw);

    assert_eq!(response.status_line, "HTTP/1.1 500 Internal Server Error");
}

#[tokio::test]
async fn test_shutdown_waits_for_in_flight_connections() {
    let server = start_server(Config::default()).await;

    let mut client = TcpStream::connect(server.addr).await.unwrap();
    client.write_all(b"GET / HTTP/1.1\r\n").await.unwrap();

    // wait for the connection to be registered
    for _ in 0..100 {
        if server.registry.active_count() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(server.registry.active_count(), 1);

    server.shutdown.send(()).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!server.handle.is_finished());

    // no new connections once shutdown has begun
    assert!(
        tokio::time::timeout(Duration::from_secs(1), TcpStream::connect(server.addr))
            .await
            .map_or(true, |connected| connected.is_err())
    );

    client.write_all(b"Host: x\r\n\r\n").await.unwrap();
    let mut response = Vec::new();
    client.read_to_end(&mut response).await.unwrap();
    assert!(response.starts_with(b"HTTP/1.1 200 OK\r\n"));

    tokio::time::timeout(Duration::from_secs(5), server.handle)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(server.registry.active_count(), 0);
}
