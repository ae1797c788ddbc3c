//! In-process HTTP stub for tests.
//!
//! Serves fixed responses by request path (query string ignored) over plain
//! HTTP/1.1 with `Connection: close`. Unknown paths answer 404. The literal
//! `{base}` in a JSON body is replaced with the server's base URL.

use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

#[derive(Debug, Clone)]
pub struct StubResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

impl StubResponse {
    pub fn json(status: u16, body: &str) -> Self {
        Self {
            status,
            content_type: "application/json",
            body: body.as_bytes().to_vec(),
        }
    }

    pub fn bytes(status: u16, content_type: &'static str, body: Vec<u8>) -> Self {
        Self {
            status,
            content_type,
            body,
        }
    }
}

/// Start a stub server and return its base URL (`http://127.0.0.1:<port>`).
pub async fn serve(routes: Vec<(&'static str, StubResponse)>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind stub server");
    let addr = listener.local_addr().expect("stub server address");
    let base = format!("http://{addr}");
    let routes: Vec<_> = routes
        .into_iter()
        .map(|(path, mut response)| {
            if response.content_type == "application/json" {
                response.body = String::from_utf8_lossy(&response.body)
                    .replace("{base}", &base)
                    .into_bytes();
            }
            (path, response)
        })
        .collect();
    let routes = Arc::new(routes);

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let routes = Arc::clone(&routes);
            tokio::spawn(async move {
                let _ = handle(socket, &routes).await;
            });
        }
    });

    base
}

async fn handle(
    mut socket: TcpStream,
    routes: &[(&'static str, StubResponse)],
) -> std::io::Result<()> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let content_length = head
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while buf.len() < header_end + 4 + content_length {
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let path = head
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or("/");
    let path = path.split('?').next().unwrap_or(path);

    let not_found = StubResponse::json(404, r#"{"detail":"not found"}"#);
    let response = routes
        .iter()
        .find(|(route, _)| *route == path)
        .map(|(_, response)| response)
        .unwrap_or(&not_found);

    let header = format!(
        "HTTP/1.1 {} Stub\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        response.status,
        response.content_type,
        response.body.len()
    );
    socket.write_all(header.as_bytes()).await?;
    socket.write_all(&response.body).await?;
    socket.shutdown().await
}
