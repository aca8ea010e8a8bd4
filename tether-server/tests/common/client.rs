//! SSE test client
//!
//! Note: Some methods may appear unused because they're only used in specific
//! test files and clippy checks each test independently.

use std::net::SocketAddr;
use std::time::Duration;

use serde_json::Value;
use tether_server::SESSION_ID_HEADER;

/// One parsed server-sent event
#[derive(Debug, Clone, PartialEq)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: String,
}

impl SseEvent {
    #[allow(dead_code)]
    pub fn json(&self) -> Value {
        serde_json::from_str(&self.data).expect("event data is not JSON")
    }
}

/// An open `/sse` response read incrementally
pub struct SseConnection {
    response: reqwest::Response,
    buffer: String,
    pub session_id: String,
}

impl SseConnection {
    /// Open a stream, resuming `session_id` when given
    pub async fn open(addr: SocketAddr, session_id: Option<&str>) -> Self {
        let url = match session_id {
            Some(id) => format!("http://{}/sse?sessionId={}", addr, id),
            None => format!("http://{}/sse", addr),
        };
        let response = reqwest::get(&url).await.expect("Failed to open stream");
        assert!(
            response.status().is_success(),
            "stream open failed: {}",
            response.status()
        );
        let session_id = response
            .headers()
            .get(SESSION_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .expect("missing session id header")
            .to_string();

        Self {
            response,
            buffer: String::new(),
            session_id,
        }
    }

    /// Next event, skipping keep-alive comments
    pub async fn next_event(&mut self) -> SseEvent {
        loop {
            if let Some(event) = self.take_buffered() {
                return event;
            }
            let chunk = tokio::time::timeout(Duration::from_secs(5), self.response.chunk())
                .await
                .expect("timed out waiting for event")
                .expect("stream read failed")
                .expect("stream ended before an event arrived");
            self.buffer.push_str(&String::from_utf8_lossy(&chunk));
        }
    }

    /// Wait for the server to end the stream
    #[allow(dead_code)]
    pub async fn wait_closed(mut self) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            match tokio::time::timeout(remaining, self.response.chunk()).await {
                Ok(Ok(Some(_))) => continue,
                Ok(Ok(None)) | Ok(Err(_)) => return,
                Err(_) => panic!("stream still open"),
            }
        }
    }

    fn take_buffered(&mut self) -> Option<SseEvent> {
        loop {
            let end = self.buffer.find("\n\n")?;
            let block: String = self.buffer.drain(..end + 2).collect();

            let mut event = None;
            let mut data = Vec::new();
            for line in block.lines() {
                if let Some(name) = line.strip_prefix("event:") {
                    event = Some(name.trim().to_string());
                } else if let Some(value) = line.strip_prefix("data:") {
                    data.push(value.strip_prefix(' ').unwrap_or(value).to_string());
                }
            }
            if event.is_some() || !data.is_empty() {
                return Some(SseEvent {
                    event,
                    data: data.join("\n"),
                });
            }
        }
    }
}

/// POST a message to `session_id`
#[allow(dead_code)]
pub async fn post_message(addr: SocketAddr, session_id: &str, body: &Value) -> reqwest::Response {
    reqwest::Client::new()
        .post(format!("http://{}/message?sessionId={}", addr, session_id))
        .json(body)
        .send()
        .await
        .expect("Failed to post message")
}
