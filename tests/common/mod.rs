//! Shared mock backends for integration tests.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Start a scripted backend: the closure maps a request path to a
/// `(status, body)` pair. Every response is delayed by `delay` to simulate
/// backend latency.
pub async fn start_scripted_backend<F>(addr: SocketAddr, delay: Duration, handler: F)
where
    F: Fn(&str) -> (u16, String) + Send + Sync + 'static,
{
    let listener = TcpListener::bind(addr).await.unwrap();
    let handler = Arc::new(handler);

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            let handler = handler.clone();
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                let n = socket.read(&mut buf).await.unwrap_or(0);
                let head = String::from_utf8_lossy(&buf[..n]).to_string();
                let path = head.split_whitespace().nth(1).unwrap_or("/").to_string();

                if delay > Duration::ZERO {
                    tokio::time::sleep(delay).await;
                }

                let (status, body) = handler(&path);
                let reason = match status {
                    200 => "OK",
                    500 => "Internal Server Error",
                    _ => "Response",
                };
                let response = format!(
                    "HTTP/1.1 {status} {reason}\r\nContent-Length: {}\r\nContent-Type: application/json\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });
}

/// Start a plain backend that answers 200 with a fixed body on every path.
pub async fn start_mock_backend(addr: SocketAddr, body: &'static str, delay: Duration) {
    start_scripted_backend(addr, delay, move |_| (200, body.to_string())).await;
}

/// Start a backend that records the head of every request it receives and
/// answers 200. The returned handle exposes the captured heads.
#[allow(dead_code)]
pub async fn start_recording_backend(addr: SocketAddr) -> Arc<Mutex<Vec<String>>> {
    let listener = TcpListener::bind(addr).await.unwrap();
    let heads = Arc::new(Mutex::new(Vec::new()));
    let captured = heads.clone();

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            let captured = captured.clone();
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                let n = socket.read(&mut buf).await.unwrap_or(0);
                captured
                    .lock()
                    .unwrap()
                    .push(String::from_utf8_lossy(&buf[..n]).to_string());

                let response =
                    "HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok";
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    heads
}

/// Start a backend that answers `/health` immediately but delivers every
/// other response body in two writes separated by `pause`, so the proxy is
/// mid-transfer for a while.
#[allow(dead_code)]
pub async fn start_trickle_backend(addr: SocketAddr, pause: Duration) {
    let listener = TcpListener::bind(addr).await.unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                let n = socket.read(&mut buf).await.unwrap_or(0);
                let head = String::from_utf8_lossy(&buf[..n]).to_string();
                let path = head.split_whitespace().nth(1).unwrap_or("/");

                if path == "/health" {
                    let response =
                        "HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok";
                    let _ = socket.write_all(response.as_bytes()).await;
                } else {
                    let head =
                        "HTTP/1.1 200 OK\r\nContent-Length: 10\r\nConnection: close\r\n\r\n01234";
                    let _ = socket.write_all(head.as_bytes()).await;
                    let _ = socket.flush().await;
                    tokio::time::sleep(pause).await;
                    let _ = socket.write_all(b"56789").await;
                }
                let _ = socket.shutdown().await;
            });
        }
    });
}

/// Start a backend that accepts connections but never responds, so probes
/// against it time out.
#[allow(dead_code)]
pub async fn start_silent_backend(addr: SocketAddr) {
    let listener = TcpListener::bind(addr).await.unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((socket, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                // hold the connection open without answering
                tokio::time::sleep(Duration::from_secs(30)).await;
                drop(socket);
            });
        }
    });
}
