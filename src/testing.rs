//! 测试用的 provider 模拟服务器

use crate::functions::{FunctionStatus, PLACEMENT_ANNOTATION};
use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone)]
enum Behaviour {
    Respond {
        status: u16,
        body: String,
        delay: Duration,
    },
    /// 把收到的请求原样描述回去
    Echo,
}

#[derive(Debug, Clone)]
struct MockState {
    behaviour: Arc<Behaviour>,
    hits: Arc<AtomicUsize>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

/// 绑定在 127.0.0.1 随机端口上的 provider
pub struct MockProvider {
    addr: SocketAddr,
    state: MockState,
    _handle: tokio::task::JoinHandle<()>,
}

impl MockProvider {
    async fn spawn(behaviour: Behaviour) -> Self {
        let state = MockState {
            behaviour: Arc::new(behaviour),
            hits: Arc::new(AtomicUsize::new(0)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
        };

        let app = Router::new().fallback(handle).with_state(state.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind mock provider");
        let addr = listener.local_addr().expect("mock provider address");

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.expect("mock provider crashed");
        });

        Self {
            addr,
            state,
            _handle: handle,
        }
    }

    /// 正常返回给定函数列表
    pub async fn start(functions: Vec<FunctionStatus>) -> Self {
        let body = serde_json::to_string(&functions).expect("serialize functions");
        Self::raw(200, &body).await
    }

    /// 所有请求都返回指定状态码
    pub async fn failing(status: u16) -> Self {
        Self::raw(status, "internal error").await
    }

    pub async fn raw(status: u16, body: &str) -> Self {
        Self::spawn(Behaviour::Respond {
            status,
            body: body.to_string(),
            delay: Duration::ZERO,
        })
        .await
    }

    /// 延迟后返回空列表
    pub async fn delayed(delay: Duration) -> Self {
        Self::spawn(Behaviour::Respond {
            status: 200,
            body: "[]".to_string(),
            delay,
        })
        .await
    }

    pub async fn echo() -> Self {
        Self::spawn(Behaviour::Echo).await
    }

    pub fn status(name: &str, placement: Option<&str>) -> FunctionStatus {
        FunctionStatus {
            name: name.to_string(),
            image: format!("functions/{name}:latest"),
            replicas: 1,
            available_replicas: 1,
            annotations: placement.map(|value| {
                HashMap::from([(PLACEMENT_ANNOTATION.to_string(), value.to_string())])
            }),
            ..Default::default()
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn listing_url(&self) -> Url {
        format!("{}/system/functions", self.base_url())
            .parse()
            .expect("listing url")
    }

    pub fn hits(&self) -> usize {
        self.state.hits.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.state.max_in_flight.load(Ordering::SeqCst)
    }
}

async fn handle(
    State(state): State<MockState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    state.hits.fetch_add(1, Ordering::SeqCst);
    let current = state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
    state.max_in_flight.fetch_max(current, Ordering::SeqCst);

    let response = match state.behaviour.as_ref() {
        Behaviour::Respond {
            status,
            body,
            delay,
        } => {
            if !delay.is_zero() {
                tokio::time::sleep(*delay).await;
            }
            (
                StatusCode::from_u16(*status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
                [(header::CONTENT_TYPE, "application/json")],
                body.clone(),
            )
                .into_response()
        }
        Behaviour::Echo => {
            let header_value = |name: &str| {
                headers
                    .get(name)
                    .and_then(|value| value.to_str().ok())
                    .map(str::to_string)
            };
            let described = serde_json::json!({
                "method": method.as_str(),
                "path": uri.path(),
                "query": uri.query(),
                "callId": header_value("x-call-id"),
                "contentType": header_value("content-type"),
                "body": String::from_utf8_lossy(&body),
            });
            (
                StatusCode::ACCEPTED,
                [
                    (header::CONTENT_TYPE, "application/json"),
                    (header::HeaderName::from_static("x-provider"), "mock"),
                ],
                described.to_string(),
            )
                .into_response()
        }
    };

    state.in_flight.fetch_sub(1, Ordering::SeqCst);
    response
}
