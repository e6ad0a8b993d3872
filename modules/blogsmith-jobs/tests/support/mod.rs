//! HTTP fixture for job-manager tests: serves a sitemap and healthy pages,
//! and records webhook deliveries.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

pub type WebhookLog = Arc<Mutex<Vec<serde_json::Value>>>;

pub async fn spawn_fixture_server() -> (SocketAddr, WebhookLog) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind fixture server");
    let addr = listener.local_addr().expect("fixture addr");
    let webhooks: WebhookLog = Arc::new(Mutex::new(Vec::new()));
    let log = webhooks.clone();

    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                break;
            };
            let log = log.clone();
            tokio::spawn(async move {
                let mut data = Vec::new();
                let mut buf = [0u8; 4096];

                // Read until the headers (and any content-length'd body) are in.
                loop {
                    let Ok(n) = stream.read(&mut buf).await else {
                        return;
                    };
                    if n == 0 {
                        break;
                    }
                    data.extend_from_slice(&buf[..n]);
                    if let Some(header_end) = find_header_end(&data) {
                        let headers = String::from_utf8_lossy(&data[..header_end]);
                        let content_length = headers
                            .lines()
                            .find_map(|l| {
                                let lower = l.to_lowercase();
                                lower
                                    .strip_prefix("content-length:")
                                    .map(|v| v.trim().to_string())
                            })
                            .and_then(|v| v.parse::<usize>().ok())
                            .unwrap_or(0);
                        if data.len() >= header_end + 4 + content_length {
                            break;
                        }
                    }
                }

                let request = String::from_utf8_lossy(&data);
                let path = request
                    .lines()
                    .next()
                    .and_then(|line| line.split_whitespace().nth(1))
                    .unwrap_or("/")
                    .to_string();

                if path == "/webhook" {
                    if let Some(header_end) = find_header_end(&data) {
                        let body = &data[header_end + 4..];
                        if let Ok(payload) = serde_json::from_slice(body) {
                            log.lock().unwrap().push(payload);
                        }
                    }
                }

                let response = respond(&path, addr);
                let _ = stream.write_all(response.as_bytes()).await;
            });
        }
    });

    (addr, webhooks)
}

fn find_header_end(data: &[u8]) -> Option<usize> {
    data.windows(4).position(|w| w == b"\r\n\r\n")
}

fn respond(path: &str, addr: SocketAddr) -> String {
    match path {
        "/sitemap.xml" => {
            let body = format!(
                r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <url><loc>http://{addr}/blog/zero-trust-basics</loc></url>
  <url><loc>http://{addr}/blog/cloud-compliance-guide</loc></url>
</urlset>"#
            );
            format!(
                "HTTP/1.1 200 OK\r\ncontent-type: application/xml\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                body.len(),
                body
            )
        }
        _ => "HTTP/1.1 200 OK\r\ncontent-length: 0\r\nconnection: close\r\n\r\n".to_string(),
    }
}
