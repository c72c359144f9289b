//! Minimal HTTP/1.1 server with Range support for integration tests.
//!
//! Serves one static body under every path except `/missing` (404). Ranged
//! GETs get 206 with `Content-Range`; a range starting past the end gets 416.
//! One request per connection.

#![allow(dead_code)]

use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Copy, Default)]
pub struct RangeServerOptions {
    /// Requests whose path equals this are answered only after the delay.
    pub slow_path: Option<(&'static str, Duration)>,
    /// Answer every satisfiable range with the body's leading bytes, labelled
    /// `bytes 0-N` (a broken cache or proxy).
    pub serve_from_zero: bool,
}

/// A running server: base URL plus a count of GET requests served.
pub struct RangeServer {
    pub base_url: String,
    requests: Arc<AtomicUsize>,
}

impl RangeServer {
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

/// Starts a server in a background thread serving `body`. The base URL has no
/// trailing slash (e.g. "http://127.0.0.1:12345"). Runs until the process exits.
pub fn start(body: Vec<u8>) -> RangeServer {
    start_with_options(body, RangeServerOptions::default())
}

pub fn start_with_options(body: Vec<u8>, opts: RangeServerOptions) -> RangeServer {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let body = Arc::new(body);
    let requests = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&requests);
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let body = Arc::clone(&body);
            let counter = Arc::clone(&counter);
            thread::spawn(move || handle(stream, &body, opts, &counter));
        }
    });
    RangeServer {
        base_url: format!("http://127.0.0.1:{}", port),
        requests,
    }
}

fn handle(
    mut stream: std::net::TcpStream,
    body: &[u8],
    opts: RangeServerOptions,
    counter: &AtomicUsize,
) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(2)));
    let mut buf = [0u8; 8192];
    let n = match stream.read(&mut buf) {
        Ok(0) => return,
        Ok(n) => n,
        Err(_) => return,
    };
    let request = match std::str::from_utf8(&buf[..n]) {
        Ok(s) => s,
        Err(_) => return,
    };
    let (method, path, range) = parse_request(request);
    if !method.eq_ignore_ascii_case("GET") {
        let _ = stream.write_all(b"HTTP/1.1 405 Method Not Allowed\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
        return;
    }
    counter.fetch_add(1, Ordering::SeqCst);

    if let Some((slow, delay)) = opts.slow_path {
        if path == slow {
            thread::sleep(delay);
        }
    }
    if path == "/missing" {
        let _ = stream.write_all(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
        return;
    }

    let total = body.len() as u64;
    let (status, content_range, slice) = match range {
        Some((start, _)) if start >= total => (
            "416 Range Not Satisfiable",
            Some(format!("bytes */{}", total)),
            &body[0..0],
        ),
        Some((start, end_incl)) => {
            let end_excl = end_incl.saturating_add(1).min(total) as usize;
            let start = start as usize;
            let (start, end_excl) = if opts.serve_from_zero {
                (0, end_excl - start)
            } else {
                (start, end_excl)
            };
            (
                "206 Partial Content",
                Some(format!("bytes {}-{}/{}", start, end_excl - 1, total)),
                &body[start..end_excl],
            )
        }
        None => ("200 OK", None, body),
    };
    let content_range = content_range
        .map(|v| format!("Content-Range: {}\r\n", v))
        .unwrap_or_default();
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Length: {}\r\n{}Accept-Ranges: bytes\r\nConnection: close\r\n\r\n",
        status,
        slice.len(),
        content_range
    );
    let _ = stream.write_all(response.as_bytes());
    let _ = stream.write_all(slice);
}

/// Returns (method, path, optional (start, end_inclusive) for Range: bytes=X-Y).
fn parse_request(request: &str) -> (&str, &str, Option<(u64, u64)>) {
    let mut method = "";
    let mut path = "";
    let mut range = None;
    for line in request.lines() {
        let line = line.trim();
        if line.is_empty() {
            break;
        }
        if method.is_empty() {
            let mut parts = line.split_whitespace();
            method = parts.next().unwrap_or("");
            path = parts.next().unwrap_or("/");
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("range") {
                let value = value.trim();
                if value.to_lowercase().starts_with("bytes=") {
                    if let Some((a, b)) = value[6..].trim().split_once('-') {
                        let start = a.trim().parse::<u64>().unwrap_or(0);
                        let end = b.trim();
                        let end_incl = if end.is_empty() {
                            u64::MAX
                        } else {
                            end.parse::<u64>().unwrap_or(0)
                        };
                        range = Some((start, end_incl));
                    }
                }
            }
        }
    }
    (method, path, range)
}
