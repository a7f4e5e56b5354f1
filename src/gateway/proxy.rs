use crate::functions::{FederationError, Result};
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// 每个被转发请求携带的调用 ID
pub const CALL_ID_HEADER: &str = "x-call-id";

/// 逐跳头部，不向上游或下游转发
const HOP_BY_HOP: [&str; 9] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "host",
];

/// 将逻辑函数名解析为基础地址
#[async_trait::async_trait]
pub trait BaseUrlResolver: Send + Sync {
    async fn resolve(&self, name: &str) -> Result<Url>;
}

/// 待转发的请求
#[derive(Debug, Clone)]
pub struct ForwardRequest {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// 上游返回的响应
#[derive(Debug, Clone)]
pub struct ForwardResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// 通用反向代理：解析地址后把请求原样转发到上游
#[derive(Clone)]
pub struct ProxyClient {
    client: reqwest::Client,
    resolver: Arc<dyn BaseUrlResolver>,
}

impl std::fmt::Debug for ProxyClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyClient")
            .field("client", &self.client)
            .finish_non_exhaustive()
    }
}

impl ProxyClient {
    /// 创建代理，`timeout` 作用于每次上游请求
    pub fn new(timeout: Duration, resolver: Arc<dyn BaseUrlResolver>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FederationError::Internal(anyhow::anyhow!("building proxy client: {e}")))?;

        Ok(Self::with_client(client, resolver))
    }

    pub fn with_client(client: reqwest::Client, resolver: Arc<dyn BaseUrlResolver>) -> Self {
        Self { client, resolver }
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub async fn resolve(&self, function_name: &str) -> Result<Url> {
        self.resolver.resolve(function_name).await
    }

    /// 转发请求到 `function_name` 所在的 provider
    pub async fn forward(
        &self,
        function_name: &str,
        request: ForwardRequest,
    ) -> Result<ForwardResponse> {
        let base = self.resolver.resolve(function_name).await?;
        let url = upstream_url(&base, &request.path, request.query.as_deref());

        let mut headers = strip_hop_by_hop(&request.headers);
        if !headers.contains_key(CALL_ID_HEADER) {
            if let Ok(value) = HeaderValue::from_str(&scru128::new().to_string()) {
                headers.insert(HeaderName::from_static(CALL_ID_HEADER), value);
            }
        }

        tracing::debug!("Proxying {} {} for function {}", request.method, url, function_name);

        let response = self
            .client
            .request(request.method, url.clone())
            .headers(headers)
            .body(request.body)
            .send()
            .await
            .map_err(|e| FederationError::Upstream {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        let headers = strip_hop_by_hop(response.headers());
        let body = response.bytes().await.map_err(|e| FederationError::Upstream {
            url: url.to_string(),
            reason: format!("error reading response body: {e}"),
        })?;

        Ok(ForwardResponse {
            status,
            headers,
            body,
        })
    }
}

/// 以 provider 基础地址拼接原始请求的路径与查询串
pub fn upstream_url(base: &Url, path: &str, query: Option<&str>) -> Url {
    let mut url = base.clone();
    url.set_path(path);
    url.set_query(query.filter(|q| !q.is_empty()));
    url
}

pub fn strip_hop_by_hop(headers: &HeaderMap) -> HeaderMap {
    let mut out = headers.clone();
    for name in HOP_BY_HOP {
        out.remove(name);
    }
    out.remove(reqwest::header::CONTENT_LENGTH);
    out
}
