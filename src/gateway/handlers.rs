use super::proxy::{self, ForwardRequest, ForwardResponse};
use super::{FluxGateway, GIT_SHA, SERVICE_NAME, VERSION};
use crate::functions::{
    DeleteFunctionRequest, FederationError, FunctionDeployment, FunctionStatus,
};
use crate::routing::ProviderLookup;
use crate::routing::services::read_services;
use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header};
use http_body_util::BodyExt;
use serde::Serialize;
use silent::prelude::full;
use silent::{Request, Response, Result as SilentResult};
use std::sync::Arc;

const LOGS_PATH: &str = "/system/logs";

/// 与框架无关的处理结果，最后统一转换为 silent 响应
#[derive(Debug)]
pub struct Reply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Reply {
    pub fn empty(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn json<T: Serialize>(status: StatusCode, value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(body) => {
                let mut headers = HeaderMap::new();
                headers.insert(
                    header::CONTENT_TYPE,
                    HeaderValue::from_static("application/json"),
                );
                Self {
                    status,
                    headers,
                    body: body.into(),
                }
            }
            Err(e) => Self::text(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        }
    }

    pub fn text(status: StatusCode, message: impl Into<String>) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        Self {
            status,
            headers,
            body: Bytes::from(message.into()),
        }
    }

    pub fn error(error: &FederationError) -> Self {
        let body = serde_json::json!({ "error": error.to_string() });
        Self::json(status_for(error), &body)
    }

    /// 原样回传上游响应
    fn relay(upstream: ForwardResponse) -> Self {
        Self {
            status: StatusCode::from_u16(upstream.status.as_u16()).unwrap_or(StatusCode::BAD_GATEWAY),
            headers: from_upstream_headers(&upstream.headers),
            body: upstream.body,
        }
    }

    pub fn into_response(self) -> Response {
        let mut res = Response::empty();
        res.set_status(self.status);
        for (name, value) in self.headers {
            if let Some(name) = name {
                res.headers_mut().append(name, value);
            }
        }
        res.set_body(full(self.body));
        res
    }
}

/// 健康检查
pub async fn health_check(_req: Request) -> SilentResult<Response> {
    let response = serde_json::json!({
        "status": "healthy",
        "service": SERVICE_NAME,
        "version": VERSION,
        "timestamp": chrono::Utc::now().to_rfc3339()
    });

    Ok(Reply::json(StatusCode::OK, &response).into_response())
}

/// 网关信息
pub async fn system_info(_req: Request, gateway: Arc<FluxGateway>) -> SilentResult<Response> {
    let registry = gateway.routing().registry();
    let response = serde_json::json!({
        "provider": {
            "provider": SERVICE_NAME,
            "orchestration": "federation",
            "version": {
                "release": VERSION,
                "sha": GIT_SHA.unwrap_or("unknown"),
            }
        },
        "version": {
            "release": VERSION,
            "sha": GIT_SHA.unwrap_or("unknown"),
        },
        "providers": registry.providers().iter().map(|p| p.id()).collect::<Vec<_>>(),
        "defaultProvider": registry.default_provider().id(),
        "cachedFunctions": gateway.routing().directory().len().await,
        "uptimeSecs": gateway.uptime_secs(),
    });

    Ok(Reply::json(StatusCode::OK, &response).into_response())
}

/// 列出所有 provider 上的函数
pub async fn list_functions(_req: Request, gateway: Arc<FluxGateway>) -> SilentResult<Response> {
    tracing::info!("read request");
    Ok(list(&gateway).await.into_response())
}

async fn list(gateway: &FluxGateway) -> Reply {
    let routing = gateway.routing();
    match read_services(routing.registry(), routing.fetcher()).await {
        Ok(functions) => Reply::json(StatusCode::OK, &functions),
        Err(e) => {
            tracing::error!("Error getting service list: {}", e);
            Reply::text(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// 部署函数
pub async fn deploy_function(mut req: Request, gateway: Arc<FluxGateway>) -> SilentResult<Response> {
    tracing::info!("deployment request");
    let reply = match read_forward_request(&mut req).await {
        Ok(forward) => deploy_or_update(&gateway, forward, "deployment").await,
        Err(e) => Reply::error(&e),
    };
    Ok(reply.into_response())
}

/// 更新函数
pub async fn update_function(mut req: Request, gateway: Arc<FluxGateway>) -> SilentResult<Response> {
    tracing::info!("update request");
    let reply = match read_forward_request(&mut req).await {
        Ok(forward) => deploy_or_update(&gateway, forward, "update").await,
        Err(e) => Reply::error(&e),
    };
    Ok(reply.into_response())
}

/// 解码部署描述并写入目录，然后把原始请求体转发给所属 provider
async fn deploy_or_update(gateway: &FluxGateway, forward: ForwardRequest, action: &str) -> Reply {
    let function = match decode_deployment(&forward.body) {
        Ok(function) => function,
        Err(e) => {
            tracing::error!("Error during unmarshal of create function request: {}", e);
            return Reply::error(&e);
        }
    };

    let name = function.service.clone();
    let path = forward.path.clone();
    gateway.routing().add_function(function).await;

    let reply = proxy_to_function(gateway, &name, forward).await;
    tracing::info!("{} request for function {} path {}", action, name, path);
    reply
}

/// 删除函数
pub async fn delete_function(mut req: Request, gateway: Arc<FluxGateway>) -> SilentResult<Response> {
    tracing::info!("delete request");
    let reply = match read_forward_request(&mut req).await {
        Ok(forward) => delete(&gateway, forward).await,
        Err(e) => Reply::error(&e),
    };
    Ok(reply.into_response())
}

async fn delete(gateway: &FluxGateway, forward: ForwardRequest) -> Reply {
    let request: DeleteFunctionRequest = match serde_json::from_slice(&forward.body) {
        Ok(request) => request,
        Err(e) => {
            tracing::error!("Error during unmarshal of delete function request: {}", e);
            return Reply::error(&FederationError::Serialization(e));
        }
    };

    if request.function_name.is_empty() {
        tracing::error!("Can not delete a function, request function name is empty");
        return Reply::error(&FederationError::BadRequest(
            "functionName is required".to_string(),
        ));
    }

    let reply = proxy_to_function(gateway, &request.function_name, forward).await;
    tracing::info!("delete request {} forwarded", request.function_name);
    reply
}

/// 读取函数副本信息（来自缓存）
pub async fn replica_reader(req: Request, gateway: Arc<FluxGateway>) -> SilentResult<Response> {
    tracing::info!("read replicas");
    let name: String = req.get_path_params("name").unwrap_or_default();
    Ok(read_replicas(&gateway, name).await.into_response())
}

async fn read_replicas(gateway: &FluxGateway, name: String) -> Reply {
    match gateway.routing().get_function(&name).await {
        Some(function) => {
            let status = FunctionStatus {
                replicas: 0,
                ..FunctionStatus::from(&function)
            };
            Reply::json(StatusCode::OK, &status)
        }
        None => Reply::error(&FederationError::FunctionNotFound { name }),
    }
}

/// 更新副本数：副本由各 provider 自行管理，这里直接接受
pub async fn replica_updater(req: Request) -> SilentResult<Response> {
    let name: String = req.get_path_params("name").unwrap_or_default();
    tracing::info!("update replicas for {}, nothing to do here", name);
    Ok(Reply::empty(StatusCode::OK).into_response())
}

/// 读取函数日志
pub async fn function_logs(req: Request, gateway: Arc<FluxGateway>) -> SilentResult<Response> {
    tracing::info!("log handler");
    let query = req.uri().query().unwrap_or_default().to_string();
    Ok(logs(&gateway, &query).await.into_response())
}

/// 按 `name` 查询参数找到 provider，把原始查询串转发到其日志接口
async fn logs(gateway: &FluxGateway, query: &str) -> Reply {
    let name = url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == "name")
        .map(|(_, value)| value.into_owned())
        .unwrap_or_default();

    if name.is_empty() {
        return Reply::error(&FederationError::BadRequest(
            "name query parameter is required".to_string(),
        ));
    }

    let base = match gateway.proxy().resolve(&name).await {
        Ok(base) => base,
        Err(e) => return Reply::text(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };

    let url = proxy::upstream_url(&base, LOGS_PATH, Some(query));
    tracing::info!("URI forwarding logs to: {}", url);

    let upstream = match gateway.proxy().client().get(url).send().await {
        Ok(upstream) => upstream,
        Err(e) => return Reply::text(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };

    let status = upstream.status().as_u16();
    if status != 200 && status != 100 {
        return Reply::text(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Incorrect HTTP status code: {status}"),
        );
    }

    let content_type = upstream
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("text/plain")
        .to_string();

    match upstream.bytes().await {
        Ok(body) => {
            let mut reply = Reply::empty(StatusCode::OK);
            if let Ok(value) = HeaderValue::from_str(&content_type) {
                reply.headers.insert(header::CONTENT_TYPE, value);
            }
            reply.body = body;
            reply
        }
        Err(e) => Reply::text(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// 调用函数
pub async fn invoke_function(mut req: Request, gateway: Arc<FluxGateway>) -> SilentResult<Response> {
    let name: String = req.get_path_params("name").unwrap_or_default();

    if name.is_empty() {
        return Ok(Reply::error(&FederationError::BadRequest(
            "Function name is required".to_string(),
        ))
        .into_response());
    }

    tracing::info!("Invoking function: {}", name);

    let reply = match read_forward_request(&mut req).await {
        Ok(forward) => proxy_to_function(&gateway, &name, forward).await,
        Err(e) => Reply::error(&e),
    };
    Ok(reply.into_response())
}

async fn proxy_to_function(gateway: &FluxGateway, name: &str, forward: ForwardRequest) -> Reply {
    match gateway.proxy().forward(name, forward).await {
        Ok(upstream) => Reply::relay(upstream),
        Err(e) => {
            tracing::error!("Failed to proxy request for function {}: {}", name, e);
            Reply::error(&e)
        }
    }
}

fn decode_deployment(body: &[u8]) -> Result<FunctionDeployment, FederationError> {
    let function: FunctionDeployment = serde_json::from_slice(body)?;
    if function.service.is_empty() {
        return Err(FederationError::BadRequest("service is required".to_string()));
    }
    Ok(function)
}

async fn read_forward_request(req: &mut Request) -> Result<ForwardRequest, FederationError> {
    let body = req
        .take_body()
        .collect()
        .await
        .map_err(|e| FederationError::BadRequest(format!("error reading request body: {e}")))?
        .to_bytes();

    let method = reqwest::Method::from_bytes(req.method().as_str().as_bytes())
        .map_err(|e| FederationError::BadRequest(format!("unsupported method: {e}")))?;

    Ok(ForwardRequest {
        method,
        path: req.uri().path().to_string(),
        query: req.uri().query().map(str::to_string),
        headers: to_upstream_headers(req.headers()),
        body,
    })
}

fn to_upstream_headers(headers: &HeaderMap) -> reqwest::header::HeaderMap {
    let mut out = reqwest::header::HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if let (Ok(name), Ok(value)) = (
            reqwest::header::HeaderName::from_bytes(name.as_str().as_bytes()),
            reqwest::header::HeaderValue::from_bytes(value.as_bytes()),
        ) {
            out.append(name, value);
        }
    }
    out
}

fn from_upstream_headers(headers: &reqwest::header::HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_str().as_bytes()),
            HeaderValue::from_bytes(value.as_bytes()),
        ) {
            out.append(name, value);
        }
    }
    out
}

/// 错误到 HTTP 状态码的映射
pub fn status_for(error: &FederationError) -> StatusCode {
    match error {
        FederationError::BadRequest(_) | FederationError::Serialization(_) => {
            StatusCode::BAD_REQUEST
        }
        FederationError::FunctionNotFound { .. } => StatusCode::NOT_FOUND,
        FederationError::ReloadFailed { .. }
        | FederationError::ReloadAborted { .. }
        | FederationError::Upstream { .. }
        | FederationError::UpstreamStatus { .. } => StatusCode::BAD_GATEWAY,
        FederationError::Config(_) | FederationError::Internal(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::PLACEMENT_ANNOTATION;
    use crate::routing::DefaultProviderRouting;
    use crate::routing::fanout::FanoutFetcher;
    use crate::testing::MockProvider;
    use std::collections::HashMap;
    use std::time::Duration;

    fn gateway(providers: &[&MockProvider], default: &MockProvider) -> FluxGateway {
        let urls: Vec<_> = providers.iter().map(|p| p.base_url()).collect();
        let routing = Arc::new(
            DefaultProviderRouting::from_urls(&urls, &default.base_url(), FanoutFetcher::default())
                .unwrap(),
        );
        FluxGateway::new(routing, Duration::from_secs(5)).unwrap()
    }

    fn forward(method: reqwest::Method, path: &str, query: Option<&str>, body: &str) -> ForwardRequest {
        ForwardRequest {
            method,
            path: path.to_string(),
            query: query.map(str::to_string),
            headers: Default::default(),
            body: Bytes::from(body.to_string()),
        }
    }

    fn deployment(name: &str, placement: Option<&str>) -> FunctionDeployment {
        FunctionDeployment {
            service: name.to_string(),
            image: format!("functions/{name}"),
            annotations: placement.map(|value| {
                HashMap::from([(PLACEMENT_ANNOTATION.to_string(), value.to_string())])
            }),
            ..Default::default()
        }
    }

    fn body_json(reply: &Reply) -> serde_json::Value {
        serde_json::from_slice(&reply.body).unwrap()
    }

    #[tokio::test]
    async fn test_deploy_caches_and_forwards_raw_body() {
        let a = MockProvider::echo().await;
        let b = MockProvider::echo().await;
        let gateway = gateway(&[&a, &b], &a);

        let body = serde_json::to_string(&deployment("figlet", Some(&b.base_url()))).unwrap();
        let reply = deploy_or_update(
            &gateway,
            forward(reqwest::Method::POST, "/system/functions", None, &body),
            "deployment",
        )
        .await;

        assert_eq!(reply.status, StatusCode::ACCEPTED);
        assert_eq!(reply.headers.get("x-provider").unwrap(), "mock");
        let echoed = body_json(&reply);
        assert_eq!(echoed["method"], "POST");
        assert_eq!(echoed["path"], "/system/functions");
        assert_eq!(echoed["body"], body.as_str());

        let cached = gateway.routing().get_function("figlet").await.unwrap();
        assert_eq!(cached.image, "functions/figlet");
        assert_eq!(a.hits(), 0);
        assert_eq!(b.hits(), 1);
    }

    #[tokio::test]
    async fn test_update_without_placement_goes_to_default() {
        let a = MockProvider::echo().await;
        let b = MockProvider::echo().await;
        let gateway = gateway(&[&a, &b], &a);

        let body = serde_json::to_string(&deployment("cat", None)).unwrap();
        let reply = deploy_or_update(
            &gateway,
            forward(reqwest::Method::PUT, "/system/functions", None, &body),
            "update",
        )
        .await;

        assert_eq!(reply.status, StatusCode::ACCEPTED);
        assert_eq!(body_json(&reply)["method"], "PUT");
        assert_eq!(a.hits(), 1);
        assert_eq!(b.hits(), 0);
    }

    #[tokio::test]
    async fn test_deploy_rejects_invalid_body() {
        let a = MockProvider::echo().await;
        let gateway = gateway(&[&a], &a);

        for body in ["not json", r#"{"service":"","image":"functions/echo"}"#] {
            let reply = deploy_or_update(
                &gateway,
                forward(reqwest::Method::POST, "/system/functions", None, body),
                "deployment",
            )
            .await;
            assert_eq!(reply.status, StatusCode::BAD_REQUEST);
        }

        assert!(gateway.routing().directory().is_empty().await);
        assert_eq!(a.hits(), 0);
    }

    #[tokio::test]
    async fn test_delete_requires_function_name() {
        let a = MockProvider::echo().await;
        let gateway = gateway(&[&a], &a);

        for body in [r#"{"functionName":""}"#, "{}", "not json"] {
            let reply = delete(
                &gateway,
                forward(reqwest::Method::DELETE, "/system/functions", None, body),
            )
            .await;
            assert_eq!(reply.status, StatusCode::BAD_REQUEST);
        }

        assert_eq!(a.hits(), 0);
    }

    #[tokio::test]
    async fn test_delete_forwards_to_owning_provider() {
        let a = MockProvider::echo().await;
        let b = MockProvider::echo().await;
        let gateway = gateway(&[&a, &b], &a);
        gateway
            .routing()
            .add_function(deployment("figlet", Some(&b.base_url())))
            .await;

        let body = r#"{"functionName":"figlet"}"#;
        let reply = delete(
            &gateway,
            forward(reqwest::Method::DELETE, "/system/functions", None, body),
        )
        .await;

        assert_eq!(reply.status, StatusCode::ACCEPTED);
        let echoed = body_json(&reply);
        assert_eq!(echoed["method"], "DELETE");
        assert_eq!(echoed["body"], body);
        assert_eq!(a.hits(), 0);
        assert_eq!(b.hits(), 1);
    }

    #[tokio::test]
    async fn test_read_replicas() {
        let a = MockProvider::echo().await;
        let gateway = gateway(&[&a], &a);

        let missing = read_replicas(&gateway, "figlet".to_string()).await;
        assert_eq!(missing.status, StatusCode::NOT_FOUND);

        gateway
            .routing()
            .add_function(deployment("figlet", Some(&a.base_url())))
            .await;

        let found = read_replicas(&gateway, "figlet".to_string()).await;
        assert_eq!(found.status, StatusCode::OK);
        let status = body_json(&found);
        assert_eq!(status["name"], "figlet");
        assert_eq!(status["availableReplicas"], 1);
        assert_eq!(status["replicas"], 0);
        assert_eq!(status["annotations"][PLACEMENT_ANNOTATION], a.base_url());
        // 副本查询只读缓存
        assert_eq!(a.hits(), 0);
    }

    #[tokio::test]
    async fn test_logs_are_relayed() {
        let a = MockProvider::raw(200, "log line").await;
        let gateway = gateway(&[&a], &a);
        gateway.routing().add_function(deployment("figlet", None)).await;

        let reply = logs(&gateway, "name=figlet&tail=10").await;

        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(&reply.body[..], b"log line");
    }

    #[tokio::test]
    async fn test_logs_upstream_status_is_internal_error() {
        let a = MockProvider::raw(404, "missing").await;
        let gateway = gateway(&[&a], &a);
        gateway.routing().add_function(deployment("figlet", None)).await;

        let reply = logs(&gateway, "name=figlet").await;
        assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);

        let reply = logs(&gateway, "tail=10").await;
        assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_list_returns_partial_on_failure() {
        let a = MockProvider::start(vec![MockProvider::status("echo", None)]).await;
        let b = MockProvider::failing(502).await;
        let c = MockProvider::start(vec![MockProvider::status("cat", None)]).await;
        let gateway = gateway(&[&a, &b, &c], &a);

        let reply = list(&gateway).await;

        assert_eq!(reply.status, StatusCode::OK);
        let functions: Vec<FunctionStatus> = serde_json::from_slice(&reply.body).unwrap();
        assert_eq!(functions.len(), 1);
        assert_eq!(functions[0].name, "echo");
    }

    #[test]
    fn test_status_for() {
        assert_eq!(
            status_for(&FederationError::FunctionNotFound {
                name: "echo".to_string()
            }),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&FederationError::ReloadFailed {
                name: "echo".to_string(),
                source: Box::new(FederationError::ReloadAborted {
                    provider: "http://p-b:8083".to_string(),
                    reason: "503".to_string(),
                }),
            }),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_for(&FederationError::BadRequest("empty".to_string())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&FederationError::Config("bad".to_string())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_decode_deployment() {
        let ok = decode_deployment(br#"{"service":"echo","image":"functions/echo"}"#).unwrap();
        assert_eq!(ok.service, "echo");

        let empty = decode_deployment(br#"{"service":"","image":"functions/echo"}"#);
        assert!(matches!(empty, Err(FederationError::BadRequest(_))));

        let garbage = decode_deployment(b"not json");
        assert!(matches!(garbage, Err(FederationError::Serialization(_))));
    }

    #[test]
    fn test_header_conversion() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        headers.append("x-tag", HeaderValue::from_static("a"));
        headers.append("x-tag", HeaderValue::from_static("b"));

        let upstream = to_upstream_headers(&headers);
        assert_eq!(upstream.get_all("x-tag").iter().count(), 2);

        let back = from_upstream_headers(&upstream);
        assert_eq!(back, headers);
    }
}
