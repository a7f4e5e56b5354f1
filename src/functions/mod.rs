use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub mod directory;

/// 保留的放置注解键，值为拥有该函数的 provider 的规范标识
pub const PLACEMENT_ANNOTATION: &str = "federation.provider_name";

/// 函数部署描述（网关缓存的函数元数据）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionDeployment {
    /// 函数名称，同时也是目录中的键
    pub service: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env_process: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env_vars: Option<HashMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraints: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secrets: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
    /// 注解集合，其中可能包含放置键
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<HashMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limits: Option<FunctionResources>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requests: Option<FunctionResources>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_only_root_filesystem: Option<bool>,
}

/// 内存与 CPU 资源
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionResources {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<String>,
}

/// provider 在 `/system/functions` 中返回的函数状态
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionStatus {
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub image: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub invocation_count: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub replicas: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub available_replicas: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env_process: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<HashMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// 删除函数请求
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteFunctionRequest {
    #[serde(default)]
    pub function_name: String,
}

impl FunctionDeployment {
    /// 读取放置注解
    pub fn placement(&self) -> Option<&str> {
        self.annotations
            .as_ref()
            .and_then(|annotations| annotations.get(PLACEMENT_ANNOTATION))
            .map(String::as_str)
    }
}

impl From<&FunctionStatus> for FunctionDeployment {
    fn from(status: &FunctionStatus) -> Self {
        Self {
            service: status.name.clone(),
            image: status.image.clone(),
            env_process: status.env_process.clone(),
            labels: status.labels.clone(),
            annotations: status.annotations.clone(),
            ..Default::default()
        }
    }
}

impl From<&FunctionDeployment> for FunctionStatus {
    fn from(deployment: &FunctionDeployment) -> Self {
        Self {
            name: deployment.service.clone(),
            image: deployment.image.clone(),
            env_process: deployment.env_process.clone(),
            labels: deployment.labels.clone(),
            annotations: deployment.annotations.clone(),
            replicas: 1,
            available_replicas: 1,
            ..Default::default()
        }
    }
}

/// `null` 与缺省字段一样按默认值处理
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// 若注解集合中缺少 `key`，写入 `default`；已有值永不覆盖
pub fn ensure_annotation(deployment: &mut FunctionDeployment, key: &str, default: &str) {
    deployment
        .annotations
        .get_or_insert_with(HashMap::new)
        .entry(key.to_string())
        .or_insert_with(|| default.to_string());
}

/// 系统错误类型
#[derive(Debug, thiserror::Error)]
pub enum FederationError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Function not found: {name}")]
    FunctionNotFound { name: String },

    #[error("Function {name} not found in cache and reload failed: {source}")]
    ReloadFailed {
        name: String,
        #[source]
        source: Box<FederationError>,
    },

    #[error("Reload aborted at provider {provider}: {reason}")]
    ReloadAborted { provider: String, reason: String },

    #[error("Upstream request to {url} failed: {reason}")]
    Upstream { url: String, reason: String },

    #[error("Upstream {url} returned unexpected status {status}")]
    UpstreamStatus { url: String, status: u16 },

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, FederationError>;
