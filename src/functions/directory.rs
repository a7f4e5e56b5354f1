use super::{
    FederationError, FunctionDeployment, FunctionStatus, PLACEMENT_ANNOTATION, Result,
    ensure_annotation,
};
use crate::routing::fanout::FanoutFetcher;
use crate::routing::provider::ProviderRegistry;
use crate::routing::services::fetch_function_lists;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// 函数目录 - 内存中缓存函数名到部署描述的映射
#[derive(Debug, Clone, Default)]
pub struct FunctionDirectory {
    functions: Arc<RwLock<HashMap<String, FunctionDeployment>>>,
}

impl FunctionDirectory {
    /// 创建空目录
    pub fn new() -> Self {
        Self::default()
    }

    /// 插入或替换函数描述，以 `service` 为键
    pub async fn upsert(&self, function: FunctionDeployment) {
        let mut functions = self.functions.write().await;
        tracing::debug!("Caching function: {}", function.service);
        functions.insert(function.service.clone(), function);
    }

    /// 在同一把写锁内批量写入
    async fn upsert_all(&self, batch: Vec<FunctionDeployment>) {
        let mut functions = self.functions.write().await;
        for function in batch {
            functions.insert(function.service.clone(), function);
        }
    }

    /// 获取函数
    pub async fn get(&self, name: &str) -> Option<FunctionDeployment> {
        let functions = self.functions.read().await;
        functions.get(name).cloned()
    }

    /// 列出所有函数（无序快照）
    pub async fn list(&self) -> Vec<FunctionDeployment> {
        let functions = self.functions.read().await;
        functions.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.functions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.functions.read().await.is_empty()
    }

    /// 从所有 provider 重新加载目录
    ///
    /// 按 provider 注册顺序合并结果。遇到第一个失败的 provider 即中止，
    /// 其后的结果（即使成功）全部丢弃；中止前已合并的函数保留在目录中。
    /// 返回本次合并的函数数量。
    pub async fn reload(&self, registry: &ProviderRegistry, fetcher: &FanoutFetcher) -> Result<usize> {
        let mut merged = 0;
        for (provider, result) in fetch_function_lists(registry, fetcher).await {
            let response = match result.outcome {
                Ok(response) => response,
                Err(e) => {
                    tracing::error!("Error fetching function list for {}: {}", provider.id(), e);
                    return Err(FederationError::ReloadAborted {
                        provider: provider.id().to_string(),
                        reason: e.to_string(),
                    });
                }
            };

            let statuses: Vec<FunctionStatus> = response.json().await.map_err(|e| {
                tracing::error!("Error decoding function list for {}: {}", provider.id(), e);
                FederationError::ReloadAborted {
                    provider: provider.id().to_string(),
                    reason: format!("error decoding response: {e}"),
                }
            })?;

            let batch: Vec<_> = statuses
                .iter()
                .map(|status| {
                    let mut function = FunctionDeployment::from(status);
                    ensure_annotation(&mut function, PLACEMENT_ANNOTATION, provider.id());
                    function
                })
                .collect();

            tracing::debug!("Provider {} reported {} functions", provider.id(), batch.len());
            merged += batch.len();
            self.upsert_all(batch).await;
        }

        tracing::info!(
            "Function directory reloaded: {} functions from {} providers",
            merged,
            registry.len()
        );
        Ok(merged)
    }
}
