use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use proxy_router::{build_router, AppState, ProxyConfig, SharedLogger};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

#[derive(Debug, Clone)]
struct Captured {
    method: Method,
    path: String,
    headers: HeaderMap,
    body: Bytes,
}

type Captures = Arc<Mutex<Vec<Captured>>>;

/// Stand-in for the OpenAI-compatible gateway. Records every request.
async fn mock_gateway(
    State(captures): State<Captures>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = uri.path().to_string();
    captures.lock().unwrap().push(Captured {
        method,
        path: path.clone(),
        headers,
        body,
    });

    if path.contains("slow") {
        // Three chunks, each after a pause.
        let chunks = futures::stream::unfold(0u8, |i| async move {
            if i == 3 {
                return None;
            }
            tokio::time::sleep(Duration::from_millis(700)).await;
            Some((Ok::<_, std::io::Error>(Bytes::from(format!("data: {i}\n\n"))), i + 1))
        });
        return axum::http::Response::builder()
            .header("content-type", "text/event-stream")
            .body(axum::body::Body::from_stream(chunks))
            .unwrap();
    }
    if path.contains("fail") {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({"error": {"message": "rate limited"}})),
        )
            .into_response();
    }
    if path.ends_with("/models") {
        return Json(json!({
            "object": "list",
            "data": [
                {"id": "gpt-4", "display_name": "GPT-4"},
                {"id": "claude-3-opus"}
            ]
        }))
        .into_response();
    }
    Json(json!({"id": "chatcmpl-1", "object": "chat.completion", "path": path})).into_response()
}

async fn spawn(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn spawn_gateway() -> (SocketAddr, Captures) {
    let captures: Captures = Arc::default();
    let app = Router::new()
        .fallback(mock_gateway)
        .with_state(captures.clone());
    (spawn(app).await, captures)
}

struct Harness {
    proxy: SocketAddr,
    captures: Captures,
    client: reqwest::Client,
    dir: TempDir,
}

impl Harness {
    async fn start() -> Self {
        Self::start_with(|_| {}).await
    }

    async fn start_with(tweak: impl FnOnce(&mut ProxyConfig)) -> Self {
        let (gateway, captures) = spawn_gateway().await;
        let dir = TempDir::new().unwrap();
        let mut config = proxy_config(&format!("http://{gateway}"), dir.path().join("dashboard.html"));
        tweak(&mut config);
        let proxy = spawn_proxy(config, &dir).await;
        Self {
            proxy,
            captures,
            client: reqwest::Client::new(),
            dir,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.proxy, path)
    }

    fn last(&self) -> Captured {
        self.captures.lock().unwrap().last().cloned().expect("gateway saw no request")
    }

    fn seen(&self) -> usize {
        self.captures.lock().unwrap().len()
    }
}

fn proxy_config(target_url: &str, dashboard: PathBuf) -> ProxyConfig {
    ProxyConfig {
        port: 0,
        target_url: target_url.to_string(),
        dashboard,
        ..ProxyConfig::default()
    }
}

async fn spawn_proxy(config: ProxyConfig, dir: &TempDir) -> SocketAddr {
    let logger = SharedLogger::new(dir.path().join("proxy.log")).unwrap();
    let client = config.http_client().unwrap();
    let state = Arc::new(AppState::new(config, client, logger).unwrap());
    spawn(build_router(state)).await
}

// ────────────────────────────────────────────────────────────────
// Chat completions
// ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_chat_completion_is_rewritten_for_generic_model() {
    let h = Harness::start().await;

    let resp = h
        .client
        .post(h.url("/v1/chat/completions"))
        .json(&json!({
            "model": "cus-gpt-4",
            "stream": false,
            "tools": [{
                "name": "get_weather",
                "description": "Weather for a city",
                "input_schema": {
                    "type": "object",
                    "$schema": "http://json-schema.org/draft-07/schema#",
                    "additionalProperties": false,
                    "properties": {"city": {"type": "string", "title": "City"}}
                }
            }],
            "tool_choice": {"type": "required"},
            "messages": [
                {
                    "role": "user",
                    "content": [
                        {"type": "text", "text": "what is this?", "cache_control": {"type": "ephemeral"}},
                        {"type": "image", "source": {"type": "base64", "media_type": "image/jpeg", "data": "/9j/AA"}}
                    ]
                },
                {
                    "role": "user",
                    "content": [
                        {"type": "tool_result", "tool_use_id": "call_1", "content": "sunny"},
                        {"type": "text", "text": "thanks"}
                    ]
                }
            ]
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["id"], "chatcmpl-1");

    let seen = h.last();
    assert_eq!(seen.method, Method::POST);
    assert_eq!(seen.path, "/v1/chat/completions");
    assert_eq!(seen.headers.get("copilot-vision-request").unwrap(), "true");
    assert_eq!(
        seen.headers.get("content-length").unwrap().to_str().unwrap(),
        seen.body.len().to_string()
    );

    let sent: Value = serde_json::from_slice(&seen.body).unwrap();
    assert_eq!(sent["model"], "gpt-4");
    assert_eq!(sent["stream"], false);
    assert_eq!(sent["tool_choice"], "required");
    assert_eq!(
        sent["tools"],
        json!([{
            "type": "function",
            "function": {
                "name": "get_weather",
                "description": "Weather for a city",
                "parameters": {"type": "object", "properties": {"city": {"type": "string"}}}
            }
        }])
    );

    let messages = sent["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 3);
    assert_eq!(
        messages[0]["content"],
        json!([
            {"type": "text", "text": "what is this?"},
            {"type": "image_url", "image_url": {"url": "data:image/jpeg;base64,/9j/AA"}}
        ])
    );
    assert_eq!(
        messages[1],
        json!({"role": "tool", "tool_call_id": "call_1", "content": "sunny"})
    );
    assert_eq!(
        messages[2],
        json!({"role": "user", "content": [{"type": "text", "text": "thanks"}]})
    );
}

#[tokio::test]
async fn test_chat_completion_strips_images_for_claude_family() {
    let h = Harness::start().await;

    let resp = h
        .client
        .post(h.url("/v1/chat/completions"))
        .json(&json!({
            "model": "cus-claude-3-5-sonnet",
            "messages": [{
                "role": "user",
                "content": [
                    {"type": "image", "source": {"type": "base64", "media_type": "image/png", "data": "iVBOR"}},
                    {"type": "text", "text": "hi"}
                ]
            }]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let seen = h.last();
    assert!(seen.headers.get("copilot-vision-request").is_none());

    let sent: Value = serde_json::from_slice(&seen.body).unwrap();
    assert_eq!(sent["model"], "claude-3-5-sonnet");
    assert_eq!(
        sent["messages"][0]["content"],
        json!([
            {"type": "text", "text": "[Image Omitted]"},
            {"type": "text", "text": "hi"}
        ])
    );
}

#[tokio::test]
async fn test_unprefixed_model_passes_through() {
    let h = Harness::start().await;

    h.client
        .post(h.url("/v1/chat/completions"))
        .json(&json!({"model": "gpt-4o", "messages": [{"role": "user", "content": "hello"}]}))
        .send()
        .await
        .unwrap();

    let sent: Value = serde_json::from_slice(&h.last().body).unwrap();
    assert_eq!(sent["model"], "gpt-4o");
    assert_eq!(sent["messages"][0]["content"], "hello");
}

#[tokio::test]
async fn test_upstream_error_is_relayed_verbatim() {
    let h = Harness::start().await;

    let resp = h
        .client
        .post(h.url("/fail/chat/completions"))
        .json(&json!({"model": "cus-gpt-4", "messages": []}))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 429);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body, json!({"error": {"message": "rate limited"}}));

    let logs: Vec<Value> = h
        .client
        .get(h.url("/proxy/logs?limit=10"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(logs
        .iter()
        .any(|entry| entry["message"].as_str().unwrap_or_default().contains("Upstream error (429)")));
}

#[tokio::test]
async fn test_invalid_json_returns_error_envelope() {
    let h = Harness::start().await;

    let resp = h
        .client
        .post(h.url("/v1/chat/completions"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 500);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Proxy Error");
    assert!(body["details"].is_string());
    assert_eq!(h.seen(), 0);
}

#[tokio::test]
async fn test_unreachable_upstream_returns_error_envelope() {
    let dir = TempDir::new().unwrap();
    let closed = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };
    let proxy = spawn_proxy(
        proxy_config(&format!("http://{closed}"), dir.path().join("none.html")),
        &dir,
    )
    .await;

    let resp = reqwest::Client::new()
        .post(format!("http://{proxy}/v1/chat/completions"))
        .json(&json!({"model": "cus-gpt-4", "messages": []}))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 500);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Proxy Error");
    assert!(body["details"].as_str().unwrap().starts_with("Upstream error"));
}

#[tokio::test]
async fn test_slow_stream_outlives_read_timeout() {
    let h = Harness::start_with(|config| config.read_timeout_secs = 1).await;

    let resp = h
        .client
        .post(h.url("/slow/chat/completions"))
        .json(&json!({"model": "cus-gpt-4", "stream": true, "messages": []}))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    assert_eq!(
        resp.text().await.unwrap(),
        "data: 0\n\ndata: 1\n\ndata: 2\n\n"
    );
}

// ────────────────────────────────────────────────────────────────
// Models and raw relay
// ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_models_list_is_prefixed() {
    let h = Harness::start().await;

    let resp = h.client.get(h.url("/v1/models")).send().await.unwrap();
    assert_eq!(resp.status(), 200);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(
        body,
        json!({
            "object": "list",
            "data": [
                {"id": "cus-gpt-4", "display_name": "cus-GPT-4"},
                {"id": "cus-claude-3-opus", "display_name": "cus-claude-3-opus"}
            ]
        })
    );
    assert_eq!(h.last().method, Method::GET);
}

#[tokio::test]
async fn test_other_requests_are_relayed_unchanged() {
    let h = Harness::start().await;

    let resp = h
        .client
        .put(h.url("/v1/files/abc?purpose=test"))
        .body("raw payload")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let seen = h.last();
    assert_eq!(seen.method, Method::PUT);
    assert_eq!(seen.path, "/v1/files/abc");
    assert_eq!(seen.body, Bytes::from_static(b"raw payload"));

    // A GET on chat/completions is not rewritten either.
    h.client.get(h.url("/v1/chat/completions")).send().await.unwrap();
    let seen = h.last();
    assert_eq!(seen.method, Method::GET);
    assert!(seen.body.is_empty());
}

// ────────────────────────────────────────────────────────────────
// Local routes
// ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_health() {
    let h = Harness::start().await;
    let body: Value = h
        .client
        .get(h.url("/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(h.seen(), 0);
}

#[tokio::test]
async fn test_dashboard_missing_and_present() {
    let h = Harness::start().await;

    let resp = h.client.get(h.url("/")).send().await.unwrap();
    assert_eq!(resp.status(), 404);
    assert_eq!(resp.text().await.unwrap(), "Dashboard not found.");

    std::fs::write(h.dir.path().join("dashboard.html"), "<h1>proxy</h1>").unwrap();

    for path in ["/", "/dashboard.html"] {
        let resp = h.client.get(h.url(path)).send().await.unwrap();
        assert_eq!(resp.status(), 200);
        assert!(resp
            .headers()
            .get("content-type")
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("text/html"));
        assert_eq!(resp.text().await.unwrap(), "<h1>proxy</h1>");
    }
    assert_eq!(h.seen(), 0);
}

#[tokio::test]
async fn test_cors_preflight() {
    let h = Harness::start().await;

    let resp = h
        .client
        .request(Method::OPTIONS, h.url("/v1/chat/completions"))
        .header("origin", "http://localhost:3000")
        .header("access-control-request-method", "POST")
        .header("access-control-request-headers", "content-type")
        .send()
        .await
        .unwrap();

    assert!(resp.status().is_success());
    assert_eq!(resp.headers().get("access-control-allow-origin").unwrap(), "*");
    assert_eq!(h.seen(), 0);
}

#[tokio::test]
async fn test_bare_options_is_not_relayed() {
    let h = Harness::start().await;

    let resp = h
        .client
        .request(Method::OPTIONS, h.url("/v1/files"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(h.seen(), 0);
}

#[tokio::test]
async fn test_cors_header_on_proxied_response() {
    let h = Harness::start().await;

    let resp = h
        .client
        .get(h.url("/v1/models"))
        .header("origin", "http://localhost:3000")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.headers().get("access-control-allow-origin").unwrap(), "*");
}
