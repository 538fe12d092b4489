//! `MockHttpClient` — a test double for `HttpClient`.
//!
//! Records every call it receives and returns a programmer-specified reply,
//! so step and engine tests never touch the network.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::http::{HttpCall, HttpReply};
use crate::{HttpClient, NodeError};

/// Behaviour injected into `MockHttpClient` at construction time.
pub enum MockBehaviour {
    /// Answer every call with this reply.
    Reply(HttpReply),
    /// Fail every call with an `Upstream` error.
    Fail(String),
}

pub struct MockHttpClient {
    pub behaviour: MockBehaviour,
    /// All calls seen by this client (in call order).
    pub calls: Arc<Mutex<Vec<HttpCall>>>,
}

impl MockHttpClient {
    pub fn replying(status: u16, body: &[u8]) -> Self {
        Self {
            behaviour: MockBehaviour::Reply(HttpReply {
                status,
                headers: BTreeMap::new(),
                body: body.to_vec(),
            }),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn failing(msg: impl Into<String>) -> Self {
        Self {
            behaviour: MockBehaviour::Fail(msg.into()),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Add a response header (no-op for a failing mock).
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let MockBehaviour::Reply(reply) = &mut self.behaviour {
            reply.headers.insert(name.to_owned(), value.to_owned());
        }
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls(&self) -> Vec<HttpCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpClient for MockHttpClient {
    async fn send(&self, call: HttpCall) -> Result<HttpReply, NodeError> {
        self.calls.lock().unwrap().push(call);
        match &self.behaviour {
            MockBehaviour::Reply(reply) => Ok(reply.clone()),
            MockBehaviour::Fail(msg) => Err(NodeError::Upstream(msg.clone())),
        }
    }
}
