use crate::functions::{FederationError, Result};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{Semaphore, mpsc};
use url::Url;

/// 单个目标地址的请求结果，`index` 为其在输入中的位置
#[derive(Debug)]
pub struct FanoutResult {
    pub index: usize,
    pub url: Url,
    pub outcome: Result<reqwest::Response>,
}

/// 有界并发的多目标 GET 请求器
#[derive(Debug, Clone, Default)]
pub struct FanoutFetcher {
    client: reqwest::Client,
}

impl FanoutFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// 对每个地址发起 GET，同时在途的请求不超过 `concurrency_limit` 个。
    ///
    /// 每个输入地址恰好返回一个结果，按输入顺序排列，与完成顺序无关。
    /// 单个地址失败（连接错误或非 2xx 状态）记录在对应结果中，整体调用不会失败。
    pub async fn get(&self, urls: &[Url], concurrency_limit: usize) -> Vec<FanoutResult> {
        let semaphore = Arc::new(Semaphore::new(concurrency_limit.max(1)));
        let (tx, mut rx) = mpsc::channel(urls.len().max(1));

        for (index, url) in urls.iter().cloned().enumerate() {
            let client = self.client.clone();
            let semaphore = semaphore.clone();
            let tx = tx.clone();

            tokio::spawn(async move {
                let outcome = match semaphore.acquire_owned().await {
                    Ok(_permit) => fetch(&client, &url).await,
                    Err(e) => Err(FederationError::Internal(anyhow::anyhow!(
                        "fan-out semaphore closed: {e}"
                    ))),
                };

                let _ = tx.send(FanoutResult { index, url, outcome }).await;
            });
        }
        drop(tx);

        let mut results = Vec::with_capacity(urls.len());
        while let Some(result) = rx.recv().await {
            results.push(result);
        }

        // 任务异常退出时补齐缺失的结果
        if results.len() < urls.len() {
            let published: HashSet<usize> = results.iter().map(|r| r.index).collect();
            for (index, url) in urls.iter().enumerate() {
                if !published.contains(&index) {
                    tracing::warn!("Fan-out task for {} exited without a result", url);
                    results.push(FanoutResult {
                        index,
                        url: url.clone(),
                        outcome: Err(FederationError::Upstream {
                            url: url.to_string(),
                            reason: "request task aborted".to_string(),
                        }),
                    });
                }
            }
        }

        results.sort_by_key(|result| result.index);
        results
    }
}

async fn fetch(client: &reqwest::Client, url: &Url) -> Result<reqwest::Response> {
    let response = client
        .get(url.clone())
        .send()
        .await
        .map_err(|e| FederationError::Upstream {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    if !response.status().is_success() {
        return Err(FederationError::UpstreamStatus {
            url: url.to_string(),
            status: response.status().as_u16(),
        });
    }

    Ok(response)
}
