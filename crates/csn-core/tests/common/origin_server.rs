//! Minimal HTTP/1.1 origin for integration tests.
//!
//! Serves a single static body with validator headers. Supports HEAD
//! (optionally honoring `If-None-Match`/`If-Modified-Since` with 304) and
//! GET with `Range` (206). Enough surface for the freshness and range
//! probes plus blob seeding.

use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::Arc;
use std::thread;

#[derive(Debug, Clone)]
pub struct OriginOptions {
    /// If false, GET ignores Range and always returns 200 with the full body.
    pub support_ranges: bool,
    /// If false, HEAD returns 405.
    pub head_allowed: bool,
    /// Current ETag; a matching `If-None-Match` yields 304.
    pub etag: Option<String>,
    /// Current Last-Modified; a matching `If-Modified-Since` yields 304.
    pub last_modified: Option<String>,
}

impl Default for OriginOptions {
    fn default() -> Self {
        Self {
            support_ranges: true,
            head_allowed: true,
            etag: None,
            last_modified: None,
        }
    }
}

/// Starts a server in a background thread serving `body`. Returns the base
/// URL (e.g. `http://127.0.0.1:12345/`). Runs until the process exits.
pub fn start(body: Vec<u8>, opts: OriginOptions) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let body = Arc::new(body);
    let opts = Arc::new(opts);
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let body = Arc::clone(&body);
            let opts = Arc::clone(&opts);
            thread::spawn(move || handle(stream, &body, &opts));
        }
    });
    format!("http://127.0.0.1:{}/", port)
}

struct Request {
    method: String,
    if_none_match: Option<String>,
    if_modified_since: Option<String>,
    range: Option<(u64, u64)>,
}

fn handle(mut stream: std::net::TcpStream, body: &[u8], opts: &OriginOptions) {
    let _ = stream.set_read_timeout(Some(std::time::Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(std::time::Duration::from_secs(2)));
    let mut buf = [0u8; 8192];
    let n = match stream.read(&mut buf) {
        Ok(0) => return,
        Ok(n) => n,
        Err(_) => return,
    };
    let request = match std::str::from_utf8(&buf[..n]) {
        Ok(s) => parse_request(s),
        Err(_) => return,
    };
    let total = body.len() as u64;

    let mut validators = String::new();
    if let Some(etag) = &opts.etag {
        validators.push_str(&format!("ETag: {}\r\n", etag));
    }
    if let Some(last_modified) = &opts.last_modified {
        validators.push_str(&format!("Last-Modified: {}\r\n", last_modified));
    }

    if request.method.eq_ignore_ascii_case("HEAD") {
        if !opts.head_allowed {
            let _ = stream.write_all(b"HTTP/1.1 405 Method Not Allowed\r\n\r\n");
            return;
        }
        if not_modified(&request, opts) {
            let response = format!("HTTP/1.1 304 Not Modified\r\n{}\r\n", validators);
            let _ = stream.write_all(response.as_bytes());
            return;
        }
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nAccept-Ranges: bytes\r\n{}\r\n",
            total, validators
        );
        let _ = stream.write_all(response.as_bytes());
        return;
    }

    if request.method.eq_ignore_ascii_case("GET") {
        let (status, content_range, slice) = match request.range {
            Some((start, end_incl)) if opts.support_ranges => {
                let start = start.min(total) as usize;
                let end_excl = (end_incl.saturating_add(1)).min(total) as usize;
                let slice = body.get(start..end_excl).unwrap_or(&body[0..0]);
                (
                    "206 Partial Content",
                    format!(
                        "Content-Range: bytes {}-{}/{}\r\n",
                        start,
                        end_excl.saturating_sub(1),
                        total
                    ),
                    slice,
                )
            }
            _ => ("200 OK", String::new(), body),
        };
        let response = format!(
            "HTTP/1.1 {}\r\nContent-Length: {}\r\n{}{}\r\n",
            status,
            slice.len(),
            content_range,
            validators
        );
        let _ = stream.write_all(response.as_bytes());
        let _ = stream.write_all(slice);
        return;
    }

    let _ = stream.write_all(b"HTTP/1.1 405 Method Not Allowed\r\n\r\n");
}

fn not_modified(request: &Request, opts: &OriginOptions) -> bool {
    if let (Some(sent), Some(current)) = (&request.if_none_match, &opts.etag) {
        return sent == current;
    }
    if let (Some(sent), Some(current)) = (&request.if_modified_since, &opts.last_modified) {
        return sent == current;
    }
    false
}

fn parse_request(raw: &str) -> Request {
    let mut request = Request {
        method: String::new(),
        if_none_match: None,
        if_modified_since: None,
        range: None,
    };
    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() {
            break;
        }
        if request.method.is_empty() {
            request.method = line.split_whitespace().next().unwrap_or("").to_string();
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            let name = name.trim();
            let value = value.trim();
            if name.eq_ignore_ascii_case("if-none-match") {
                request.if_none_match = Some(value.to_string());
            } else if name.eq_ignore_ascii_case("if-modified-since") {
                request.if_modified_since = Some(value.to_string());
            } else if name.eq_ignore_ascii_case("range") {
                if let Some(part) = value.strip_prefix("bytes=") {
                    if let Some((a, b)) = part.split_once('-') {
                        let start = a.trim().parse::<u64>().unwrap_or(0);
                        let end = b.trim().parse::<u64>().unwrap_or(u64::MAX);
                        request.range = Some((start, end));
                    }
                }
            }
        }
    }
    request
}
