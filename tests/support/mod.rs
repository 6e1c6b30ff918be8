#![allow(dead_code)]

use std::io::{ErrorKind, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::mpsc::{self, Receiver};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

pub const CHAT_PATH: &str = "/api/v1/chat/completions";

/// What the mock server saw from the client.
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub head: String,
    pub body: String,
}

impl CapturedRequest {
    pub fn header(&self, name: &str) -> Option<String> {
        let prefix = format!("{}:", name.to_ascii_lowercase());
        self.head.lines().find_map(|line| {
            line.to_ascii_lowercase()
                .starts_with(&prefix)
                .then(|| line[prefix.len()..].trim().to_string())
        })
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).expect("request body should be JSON")
    }
}

pub struct Reply {
    pub status: u16,
    pub content_type: &'static str,
    pub chunks: Vec<Vec<u8>>,
    /// Delay between chunks so they reach the client as separate reads.
    pub pause: Duration,
    /// Keep the connection open this long after the last chunk.
    pub hold_open: Duration,
}

impl Reply {
    pub fn event_stream(chunks: Vec<Vec<u8>>) -> Self {
        Self {
            status: 200,
            content_type: "text/event-stream",
            chunks,
            pause: Duration::from_millis(15),
            hold_open: Duration::ZERO,
        }
    }

    pub fn status(status: u16, body: &str) -> Self {
        Self {
            status,
            content_type: "application/json",
            chunks: vec![body.as_bytes().to_vec()],
            pause: Duration::ZERO,
            hold_open: Duration::ZERO,
        }
    }
}

pub struct MockServer {
    pub url: String,
    received: Receiver<()>,
    handle: JoinHandle<Option<CapturedRequest>>,
}

impl MockServer {
    /// Serves a single connection, or gives up once `accept_within` passes.
    pub fn start(reply: Reply, accept_within: Duration) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind should succeed");
        listener
            .set_nonblocking(true)
            .expect("listener should become non-blocking");
        let addr = listener.local_addr().expect("address should be available");
        let (notify, received) = mpsc::channel();

        let handle = thread::spawn(move || {
            let mut stream = accept_before(&listener, Instant::now() + accept_within)?;
            let request = read_request(&mut stream);
            let _ = notify.send(());
            write_reply(&mut stream, &reply);
            Some(request)
        });

        Self {
            url: format!("http://{addr}{CHAT_PATH}"),
            received,
            handle,
        }
    }

    /// Blocks until the request has been read.
    pub fn wait_for_request(&self, timeout: Duration) -> bool {
        self.received.recv_timeout(timeout).is_ok()
    }

    pub fn finish(self) -> Option<CapturedRequest> {
        self.handle.join().expect("mock server thread should join")
    }
}

fn accept_before(listener: &TcpListener, deadline: Instant) -> Option<TcpStream> {
    loop {
        match listener.accept() {
            Ok((stream, _)) => {
                stream
                    .set_nonblocking(false)
                    .expect("stream should become blocking");
                return Some(stream);
            }
            Err(err) if err.kind() == ErrorKind::WouldBlock => {
                if Instant::now() >= deadline {
                    return None;
                }
                thread::sleep(Duration::from_millis(10));
            }
            Err(err) => panic!("accept failed: {err}"),
        }
    }
}

fn read_request(stream: &mut TcpStream) -> CapturedRequest {
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .expect("read timeout should apply");

    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];
    let head_end = loop {
        if let Some(pos) = find(&buffer, b"\r\n\r\n") {
            break pos;
        }
        let read = stream.read(&mut chunk).expect("request should be readable");
        assert!(read > 0, "client closed before sending headers");
        buffer.extend_from_slice(&chunk[..read]);
    };

    let head = String::from_utf8_lossy(&buffer[..head_end]).into_owned();
    let content_length = head
        .lines()
        .find_map(|line| {
            let lower = line.to_ascii_lowercase();
            lower
                .strip_prefix("content-length:")
                .and_then(|value| value.trim().parse::<usize>().ok())
        })
        .unwrap_or(0);

    let body_start = head_end + 4;
    while buffer.len() < body_start + content_length {
        let read = stream.read(&mut chunk).expect("body should be readable");
        assert!(read > 0, "client closed before sending body");
        buffer.extend_from_slice(&chunk[..read]);
    }

    CapturedRequest {
        head,
        body: String::from_utf8_lossy(&buffer[body_start..body_start + content_length])
            .into_owned(),
    }
}

fn write_reply(stream: &mut TcpStream, reply: &Reply) {
    let head = format!(
        "HTTP/1.1 {} Mock\r\nContent-Type: {}\r\nConnection: close\r\n\r\n",
        reply.status, reply.content_type
    );
    if stream.write_all(head.as_bytes()).is_err() {
        return;
    }
    for chunk in &reply.chunks {
        if stream.write_all(chunk).and_then(|_| stream.flush()).is_err() {
            return;
        }
        if !reply.pause.is_zero() {
            thread::sleep(reply.pause);
        }
    }
    if !reply.hold_open.is_zero() {
        thread::sleep(reply.hold_open);
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

pub fn delta_frame(content: &str) -> String {
    let chunk = serde_json::json!({
        "id": "gen-test",
        "object": "chat.completion.chunk",
        "choices": [{"index": 0, "delta": {"content": content}}]
    });
    format!("data: {chunk}\n\n")
}

pub fn done_frame() -> String {
    "data: [DONE]\n\n".to_string()
}

/// The SSE body for the given deltas, ending with the `[DONE]` sentinel.
pub fn event_stream_body(deltas: &[&str]) -> Vec<u8> {
    let mut body = String::from(": OPENROUTER PROCESSING\n\n");
    for delta in deltas {
        body.push_str(&delta_frame(delta));
    }
    body.push_str(&done_frame());
    body.into_bytes()
}

pub fn rechunk(body: &[u8], size: usize) -> Vec<Vec<u8>> {
    body.chunks(size).map(<[u8]>::to_vec).collect()
}
