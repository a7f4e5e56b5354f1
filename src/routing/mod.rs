use crate::functions::directory::FunctionDirectory;
use crate::functions::{FederationError, FunctionDeployment, Result};
use fanout::FanoutFetcher;
use provider::ProviderRegistry;
use std::sync::Arc;
use url::Url;

pub mod fanout;
pub mod provider;
pub mod services;

/// provider 的函数列表接口路径
pub const FUNCTIONS_PATH: &str = "/system/functions";

/// 决定某个函数当前由哪个 provider 负责
#[async_trait::async_trait]
pub trait ProviderLookup: Send + Sync {
    /// 解析函数所属 provider 的基础地址
    async fn resolve(&self, function_name: &str) -> Result<Url>;

    /// 缓存部署请求中的函数描述
    async fn add_function(&self, function: FunctionDeployment);

    async fn get_function(&self, name: &str) -> Option<FunctionDeployment>;

    /// 从全部 provider 重建函数目录
    async fn reload_cache(&self) -> Result<usize>;
}

/// 基于放置注解的默认路由实现
#[derive(Debug, Clone)]
pub struct DefaultProviderRouting {
    registry: Arc<ProviderRegistry>,
    directory: FunctionDirectory,
    fetcher: FanoutFetcher,
}

impl DefaultProviderRouting {
    pub fn new(registry: ProviderRegistry, fetcher: FanoutFetcher) -> Self {
        Self::with_directory(registry, fetcher, FunctionDirectory::new())
    }

    pub fn with_directory(
        registry: ProviderRegistry,
        fetcher: FanoutFetcher,
        directory: FunctionDirectory,
    ) -> Self {
        Self {
            registry: Arc::new(registry),
            directory,
            fetcher,
        }
    }

    /// 从地址字符串直接构建
    pub fn from_urls<S: AsRef<str>>(
        providers: &[S],
        default_provider: &str,
        fetcher: FanoutFetcher,
    ) -> Result<Self> {
        Ok(Self::new(
            ProviderRegistry::new(providers, default_provider)?,
            fetcher,
        ))
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn directory(&self) -> &FunctionDirectory {
        &self.directory
    }

    pub fn fetcher(&self) -> &FanoutFetcher {
        &self.fetcher
    }

    fn place(&self, function: &FunctionDeployment) -> Url {
        let placement = function.placement();
        let provider = self.registry.place(placement);

        match placement {
            Some(value) if !provider.matches(value) => tracing::debug!(
                "Placement {} of function {} matches no provider, using default {}",
                value,
                function.service,
                provider.id()
            ),
            _ => {}
        }

        provider.url().clone()
    }
}

#[async_trait::async_trait]
impl ProviderLookup for DefaultProviderRouting {
    async fn resolve(&self, function_name: &str) -> Result<Url> {
        if let Some(function) = self.directory.get(function_name).await {
            return Ok(self.place(&function));
        }

        tracing::info!(
            "Function {} not in cache, reloading from providers",
            function_name
        );

        if let Err(e) = self.reload_cache().await {
            tracing::error!("Reload while resolving {} failed: {}", function_name, e);
            return Err(FederationError::ReloadFailed {
                name: function_name.to_string(),
                source: Box::new(e),
            });
        }

        match self.directory.get(function_name).await {
            Some(function) => Ok(self.place(&function)),
            None => Err(FederationError::FunctionNotFound {
                name: function_name.to_string(),
            }),
        }
    }

    async fn add_function(&self, function: FunctionDeployment) {
        self.directory.upsert(function).await;
    }

    async fn get_function(&self, name: &str) -> Option<FunctionDeployment> {
        self.directory.get(name).await
    }

    async fn reload_cache(&self) -> Result<usize> {
        self.directory.reload(&self.registry, &self.fetcher).await
    }
}
