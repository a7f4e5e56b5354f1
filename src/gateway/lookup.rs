use super::proxy::BaseUrlResolver;
use crate::functions::Result;
use crate::routing::ProviderLookup;
use std::sync::Arc;
use url::Url;

/// 把 [`ProviderLookup`] 适配为代理使用的 [`BaseUrlResolver`]
#[derive(Clone)]
pub struct FunctionLookup {
    provider_lookup: Arc<dyn ProviderLookup>,
}

impl FunctionLookup {
    pub fn new(provider_lookup: Arc<dyn ProviderLookup>) -> Self {
        Self { provider_lookup }
    }
}

#[async_trait::async_trait]
impl BaseUrlResolver for FunctionLookup {
    async fn resolve(&self, name: &str) -> Result<Url> {
        self.provider_lookup.resolve(name).await
    }
}
