//! `httpRequest` steps.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, instrument, warn};

use crate::kind::HttpRequestProps;
use crate::reference::resolve_value;
use crate::{ExecutionContext, HttpClient, NodeError, StepResult};

/// A fully resolved outbound request.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpCall {
    pub method: String,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: BTreeMap<String, String>,
    /// Strings are sent verbatim; anything else is sent as JSON.
    pub body: Option<Value>,
}

/// Raw response as read off the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpReply {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

/// Build the call for `props`, substituting `${steps.X.Y}` references in
/// `body` and `query`. Unresolved references are left out.
pub fn build_call(props: &HttpRequestProps, ctx: &ExecutionContext) -> HttpCall {
    let mut url = props.url.clone();
    let mut query = Vec::new();
    match &props.query {
        None | Some(Value::Null) => {}
        Some(Value::Object(params)) => {
            query = params
                .iter()
                .filter_map(|(key, value)| {
                    resolve_value(value, ctx).map(|resolved| (key.clone(), query_text(resolved)))
                })
                .collect();
        }
        Some(raw) => {
            if let Some(resolved) = resolve_value(raw, ctx) {
                append_raw_query(&mut url, &query_text(resolved));
            }
        }
    }

    HttpCall {
        method: props.method.to_ascii_uppercase(),
        url,
        query,
        headers: props.headers.clone(),
        body: props.body.as_ref().and_then(|body| resolve_value(body, ctx)),
    }
}

fn append_raw_query(url: &mut String, raw: &str) {
    let raw = raw.trim_start_matches('?');
    if raw.is_empty() {
        return;
    }
    url.push(if url.contains('?') { '&' } else { '?' });
    url.push_str(raw);
}

fn query_text(value: Value) -> String {
    match value {
        Value::String(text) => text,
        other => other.to_string(),
    }
}

/// Decode the body as JSON, falling back to UTF-8 text.
pub fn decode_body(bytes: &[u8]) -> Result<Value, NodeError> {
    if let Ok(json) = serde_json::from_slice(bytes) {
        return Ok(json);
    }
    String::from_utf8(bytes.to_vec())
        .map(Value::String)
        .map_err(|e| NodeError::Upstream(format!("response body is neither JSON nor text: {e}")))
}

/// Run one `httpRequest` step.
#[instrument(skip_all, fields(method = %props.method, url = %props.url))]
pub async fn run_http_request(
    client: &dyn HttpClient,
    props: &HttpRequestProps,
    ctx: &ExecutionContext,
) -> Result<StepResult, NodeError> {
    let call = build_call(props, ctx);
    let reply = client.send(call).await?;
    let body = decode_body(&reply.body)?;
    debug!(status = reply.status, "http step completed");

    Ok(StepResult::ok(Some(json!({
        "response": {
            "body": body,
            "status": reply.status,
            "headers": reply.headers,
        }
    }))))
}

// ---------------------------------------------------------------------------
// ReqwestClient
// ---------------------------------------------------------------------------

/// Production `HttpClient` backed by a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    pub fn new(timeout: Duration) -> Result<Self, NodeError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NodeError::Upstream(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn send(&self, call: HttpCall) -> Result<HttpReply, NodeError> {
        let method = reqwest::Method::from_bytes(call.method.as_bytes())
            .map_err(|e| NodeError::Upstream(format!("invalid method '{}': {e}", call.method)))?;

        let mut request = self.client.request(method, call.url.as_str());
        if !call.query.is_empty() {
            request = request.query(&call.query);
        }
        for (name, value) in &call.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        request = match call.body {
            Some(Value::String(text)) => request.body(text),
            Some(other) => request.json(&other),
            None => request,
        };

        let response = request.send().await.map_err(|e| {
            warn!(url = %call.url, error = %e, "outbound call failed");
            NodeError::Upstream(e.to_string())
        })?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_owned(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|e| NodeError::Upstream(e.to_string()))?
            .to_vec();

        Ok(HttpReply {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockHttpClient;

    fn props(value: Value) -> HttpRequestProps {
        serde_json::from_value(value).unwrap()
    }

    fn ctx_with_user() -> ExecutionContext {
        let mut ctx = ExecutionContext::new();
        ctx.record("fetchUser", StepResult::ok(Some(json!({ "id": 42 }))));
        ctx
    }

    #[test]
    fn query_reference_resolves_from_context() {
        let call = build_call(
            &props(json!({
                "url": "http://api/users",
                "method": "get",
                "query": { "id": "${steps.fetchUser.id}", "page": 2, "q": "x" },
            })),
            &ctx_with_user(),
        );
        assert_eq!(call.method, "GET");
        assert_eq!(
            call.query,
            vec![
                ("id".to_owned(), "42".to_owned()),
                ("page".to_owned(), "2".to_owned()),
                ("q".to_owned(), "x".to_owned()),
            ]
        );
    }

    #[test]
    fn unresolved_query_reference_is_omitted() {
        let call = build_call(
            &props(json!({
                "url": "http://api/users",
                "query": { "id": "${steps.fetchUser.id}" },
            })),
            &ExecutionContext::new(),
        );
        assert!(call.query.is_empty());
    }

    #[test]
    fn scalar_query_reference_becomes_the_raw_query() {
        let call = build_call(
            &props(json!({ "url": "http://api/users", "query": "${steps.fetchUser.id}" })),
            &ctx_with_user(),
        );
        assert_eq!(call.url, "http://api/users?42");
        assert!(call.query.is_empty());

        let call = build_call(
            &props(json!({ "url": "http://api/users?a=1", "query": "b=2" })),
            &ExecutionContext::new(),
        );
        assert_eq!(call.url, "http://api/users?a=1&b=2");
    }

    #[test]
    fn unresolved_scalar_query_leaves_url_untouched() {
        let call = build_call(
            &props(json!({ "url": "http://api/users", "query": "${steps.fetchUser.id}" })),
            &ExecutionContext::new(),
        );
        assert_eq!(call.url, "http://api/users");
        assert!(call.query.is_empty());
    }

    #[test]
    fn body_reference_resolves_and_unresolved_body_is_dropped() {
        let ctx = ctx_with_user();
        let call = build_call(
            &props(json!({ "url": "u", "method": "POST", "body": "${steps.fetchUser.id}" })),
            &ctx,
        );
        assert_eq!(call.body, Some(json!(42)));

        let call = build_call(
            &props(json!({ "url": "u", "method": "POST", "body": "${steps.ghost.id}" })),
            &ctx,
        );
        assert_eq!(call.body, None);
    }

    #[test]
    fn body_decoding_falls_back_to_text() {
        assert_eq!(decode_body(br#"{"a":1}"#).unwrap(), json!({ "a": 1 }));
        assert_eq!(decode_body(b"plain text").unwrap(), json!("plain text"));
        assert!(matches!(decode_body(&[0xff, 0xfe, 0x00]), Err(NodeError::Upstream(_))));
    }

    #[tokio::test]
    async fn response_is_wrapped_with_status_and_headers() {
        let client = MockHttpClient::replying(201, br#"{"created":true}"#)
            .with_header("content-type", "application/json");
        let result = run_http_request(
            &client,
            &props(json!({ "url": "http://api/items", "method": "POST", "body": { "n": 1 } })),
            &ExecutionContext::new(),
        )
        .await
        .unwrap();

        assert!(result.success);
        assert_eq!(
            result.result,
            Some(json!({
                "response": {
                    "body": { "created": true },
                    "status": 201,
                    "headers": { "content-type": "application/json" },
                }
            }))
        );
        let sent = client.calls();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].body, Some(json!({ "n": 1 })));
    }

    #[tokio::test]
    async fn transport_failure_is_an_upstream_error() {
        let client = MockHttpClient::failing("connection refused");
        let err = run_http_request(
            &client,
            &props(json!({ "url": "http://down" })),
            &ExecutionContext::new(),
        )
        .await
        .unwrap_err();
        assert_eq!(err, NodeError::Upstream("connection refused".into()));
    }

    #[test]
    fn reqwest_client_builds() {
        assert!(ReqwestClient::new(Duration::from_secs(5)).is_ok());
    }
}
