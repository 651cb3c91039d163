//! Scripted HTTP transport shared by the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use instagram_mcp::graph::{
    ClientConfig, Credentials, GraphClient, HttpRequest, HttpResponse, HttpTransport,
    TransportError, TransportErrorKind,
};

pub const ACCOUNT_ID: &str = "17841400000000000";

/// Replays queued responses in order and records every request.
#[derive(Default)]
pub struct ScriptedTransport {
    responses: Mutex<VecDeque<Result<HttpResponse, TransportError>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, status: u16, body: Value) {
        self.respond_bytes(status, serde_json::to_vec(&body).unwrap());
    }

    pub fn respond_bytes(&self, status: u16, body: Vec<u8>) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Ok(HttpResponse { status, body }));
    }

    /// Queues a PNG header of the given dimensions, enough to read its size.
    pub fn image(&self, width: u32, height: u32) {
        self.respond_bytes(200, png(width, height));
    }

    pub fn ok(&self, body: Value) {
        self.respond(200, body);
    }

    pub fn graph_error(&self, status: u16, code: i64, message: &str) {
        self.respond(
            status,
            json!({
                "error": {
                    "message": message,
                    "type": "OAuthException",
                    "code": code,
                    "fbtrace_id": "TrAcE"
                }
            }),
        );
    }

    pub fn fail(&self, kind: TransportErrorKind) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Err(TransportError::new(kind, "operation timed out")));
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn request(&self, index: usize) -> HttpRequest {
        self.requests.lock().unwrap()[index].clone()
    }

    pub fn query(&self, index: usize, name: &str) -> Option<String> {
        self.request(index)
            .query
            .into_iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        self.responses.lock().unwrap().pop_front().unwrap_or_else(|| {
            Err(TransportError::new(
                TransportErrorKind::Other,
                format!("no scripted response for {}", request.url),
            ))
        })
    }
}

pub fn config() -> ClientConfig {
    ClientConfig::new(Credentials::new("test-token").with_business_account(ACCOUNT_ID))
}

pub fn client_with(config: ClientConfig) -> (GraphClient, Arc<ScriptedTransport>) {
    let transport = ScriptedTransport::new();
    let client = GraphClient::with_transport(config, transport.clone());
    (client, transport)
}

pub fn client() -> (GraphClient, Arc<ScriptedTransport>) {
    client_with(config())
}

pub fn png(width: u32, height: u32) -> Vec<u8> {
    let mut bytes = b"\x89PNG\r\n\x1a\n".to_vec();
    bytes.extend_from_slice(&13u32.to_be_bytes());
    bytes.extend_from_slice(b"IHDR");
    bytes.extend_from_slice(&width.to_be_bytes());
    bytes.extend_from_slice(&height.to_be_bytes());
    // bit depth, colour type, compression, filter, interlace, then CRC
    bytes.extend_from_slice(&[8, 2, 0, 0, 0]);
    bytes.extend_from_slice(&[0; 4]);
    bytes
}

pub fn media(id: &str, caption: &str) -> Value {
    json!({
        "id": id,
        "media_type": "IMAGE",
        "caption": caption,
        "permalink": format!("https://www.instagram.com/p/{id}/"),
        "timestamp": "2024-05-01T12:00:00+0000",
        "like_count": 12,
        "comments_count": 3
    })
}
