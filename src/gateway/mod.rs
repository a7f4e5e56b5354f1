use crate::functions::Result;
use crate::routing::DefaultProviderRouting;
use chrono::{DateTime, Utc};
use lookup::FunctionLookup;
use proxy::ProxyClient;
use std::sync::Arc;
use std::time::Duration;

pub mod handlers;
pub mod lookup;
pub mod proxy;
pub mod routes;

pub const SERVICE_NAME: &str = "flux-federation";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const GIT_SHA: Option<&str> = option_env!("GIT_COMMIT_SHA");

/// 联邦网关，持有路由引擎与代理，供各个处理函数共享
#[derive(Debug, Clone)]
pub struct FluxGateway {
    routing: Arc<DefaultProviderRouting>,
    proxy: ProxyClient,
    started_at: DateTime<Utc>,
}

impl FluxGateway {
    /// 使用路由引擎创建网关，代理请求超时为 `read_timeout`
    pub fn new(routing: Arc<DefaultProviderRouting>, read_timeout: Duration) -> Result<Self> {
        let lookup = FunctionLookup::new(routing.clone());
        let proxy = ProxyClient::new(read_timeout, Arc::new(lookup))?;
        Ok(Self::with_proxy(routing, proxy))
    }

    pub fn with_proxy(routing: Arc<DefaultProviderRouting>, proxy: ProxyClient) -> Self {
        Self {
            routing,
            proxy,
            started_at: Utc::now(),
        }
    }

    pub fn routing(&self) -> &Arc<DefaultProviderRouting> {
        &self.routing
    }

    pub fn proxy(&self) -> &ProxyClient {
        &self.proxy
    }

    pub fn uptime_secs(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds()
    }
}
