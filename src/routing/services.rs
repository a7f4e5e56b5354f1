use super::FUNCTIONS_PATH;
use super::fanout::{FanoutFetcher, FanoutResult};
use super::provider::{Provider, ProviderRegistry};
use crate::functions::{FederationError, FunctionStatus, Result};

/// 并发请求每个 provider 的函数列表，结果按 provider 注册顺序排列
pub async fn fetch_function_lists<'a>(
    registry: &'a ProviderRegistry,
    fetcher: &FanoutFetcher,
) -> Vec<(&'a Provider, FanoutResult)> {
    let providers = registry.providers();
    let urls: Vec<_> = providers
        .iter()
        .map(|provider| provider.endpoint(FUNCTIONS_PATH))
        .collect();

    fetcher
        .get(&urls, providers.len())
        .await
        .into_iter()
        .map(|result| (&providers[result.index], result))
        .collect()
}

/// 查询所有 provider 并合并它们部署的函数列表。
///
/// 遇到第一个请求失败的 provider 时停止并返回已收集的部分；
/// 响应体无法解析则整体返回错误。
pub async fn read_services(
    registry: &ProviderRegistry,
    fetcher: &FanoutFetcher,
) -> Result<Vec<FunctionStatus>> {
    let mut list = Vec::new();
    for (provider, result) in fetch_function_lists(registry, fetcher).await {
        let response = match result.outcome {
            Ok(response) => response,
            Err(e) => {
                tracing::error!("Error fetching function list for {}: {}", provider.id(), e);
                break;
            }
        };

        let functions: Vec<FunctionStatus> = response.json().await.map_err(|e| {
            FederationError::Upstream {
                url: result.url.to_string(),
                reason: format!("error decoding response for {}: {e}", provider.id()),
            }
        })?;

        list.extend(functions);
    }

    Ok(list)
}
