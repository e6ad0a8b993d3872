//! Minimal HTTP fixture server for pipeline tests: serves a sitemap, healthy
//! pages, hard and soft 404s over raw TCP so tests need no extra crates.

use std::net::SocketAddr;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

pub async fn spawn_fixture_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind fixture server");
    let addr = listener.local_addr().expect("fixture addr");

    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                let mut buf = [0u8; 2048];
                let Ok(n) = stream.read(&mut buf).await else {
                    return;
                };
                let request = String::from_utf8_lossy(&buf[..n]);
                let path = request
                    .lines()
                    .next()
                    .and_then(|line| line.split_whitespace().nth(1))
                    .unwrap_or("/")
                    .to_string();

                let response = respond(&path, addr);
                let _ = stream.write_all(response.as_bytes()).await;
            });
        }
    });

    addr
}

fn respond(path: &str, addr: SocketAddr) -> String {
    match path {
        "/sitemap.xml" => {
            let body = format!(
                r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <url><loc>http://{addr}/blog/zero-trust-basics</loc></url>
  <url><loc>http://{addr}/blog/security-architecture-guide</loc></url>
  <url><loc>http://{addr}/pricing</loc></url>
</urlset>"#
            );
            format!(
                "HTTP/1.1 200 OK\r\ncontent-type: application/xml\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                body.len(),
                body
            )
        }
        "/missing" => {
            "HTTP/1.1 404 Not Found\r\ncontent-length: 0\r\nconnection: close\r\n\r\n".to_string()
        }
        "/fail" => {
            "HTTP/1.1 500 Internal Server Error\r\ncontent-length: 0\r\nconnection: close\r\n\r\n"
                .to_string()
        }
        "/soft" => {
            "HTTP/1.1 302 Found\r\nlocation: /404\r\ncontent-length: 0\r\nconnection: close\r\n\r\n"
                .to_string()
        }
        _ => "HTTP/1.1 200 OK\r\ncontent-length: 0\r\nconnection: close\r\n\r\n".to_string(),
    }
}
