//! Shared utilities for integration tests

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Raw request heads seen by a stub upstream
pub type SeenRequests = Arc<Mutex<Vec<String>>>;

/// Start a stub child probe server that answers every request with a fixed
/// status and body
///
/// Returns the base URL to point the proxy at and the list of request heads
/// it has received.
pub async fn start_stub_upstream(status: u16, body: &'static str) -> (String, SeenRequests) {
    start_stub_upstream_with(status, &[], body).await
}

/// Like [`start_stub_upstream`], with extra response header lines
pub async fn start_stub_upstream_with(
    status: u16,
    extra_headers: &'static [&'static str],
    body: &'static str,
) -> (String, SeenRequests) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let seen: SeenRequests = Arc::new(Mutex::new(Vec::new()));
    let seen_task = Arc::clone(&seen);

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let seen = Arc::clone(&seen_task);
            tokio::spawn(async move {
                let head = read_request_head(&mut socket).await;
                seen.lock().unwrap().push(head);

                let mut response = format!("HTTP/1.1 {} {}\r\n", status, reason(status));
                for line in extra_headers {
                    response.push_str(line);
                    response.push_str("\r\n");
                }
                response.push_str(&format!(
                    "Content-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                ));
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    (format!("http://{}", addr), seen)
}

/// An address nothing listens on
pub async fn unused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

async fn read_request_head(socket: &mut tokio::net::TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                buf.extend_from_slice(&chunk[..n]);
                if buf.windows(4).any(|w| w == b"\r\n\r\n") {
                    break;
                }
            }
        }
    }
    String::from_utf8_lossy(&buf).to_string()
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        404 => "Not Found",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}
