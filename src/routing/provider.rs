use crate::functions::{FederationError, Result};
use url::Url;

/// 后端 provider，一个独立的 FaaS 控制面
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provider {
    /// 规范标识：配置中的原始地址（去掉结尾 `/`）
    id: String,
    url: Url,
}

impl Provider {
    /// 解析 provider 地址
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let url = Url::parse(raw).map_err(|e| {
            FederationError::Config(format!("error parsing URL using value {raw:?}: {e}"))
        })?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(FederationError::Config(format!(
                "unsupported scheme {:?} in provider URL {raw:?}",
                url.scheme()
            )));
        }
        if url.host_str().is_none() {
            return Err(FederationError::Config(format!(
                "provider URL {raw:?} has no host"
            )));
        }

        // `Url` 序列化时会省略协议默认端口，标识保留配置原文
        let id = raw.trim_end_matches('/').to_string();
        Ok(Self { id, url })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// 以当前 provider 为基础地址构造指定路径的 URL
    pub fn endpoint(&self, path: &str) -> Url {
        let mut url = self.url.clone();
        url.set_path(path);
        url.set_query(None);
        url.set_fragment(None);
        url
    }

    /// 放置注解是否指向当前 provider（忽略大小写与结尾 `/`）。
    ///
    /// 配置原文与 `Url` 规范化后的形式都可以匹配，如 `http://p-a:80` 与 `http://p-a`。
    pub fn matches(&self, placement: &str) -> bool {
        let placement = placement.trim().trim_end_matches('/');
        placement.eq_ignore_ascii_case(&self.id)
            || placement.eq_ignore_ascii_case(self.url.as_str().trim_end_matches('/'))
    }
}

/// provider 注册表，启动时构建一次，之后只读
#[derive(Debug, Clone)]
pub struct ProviderRegistry {
    providers: Vec<Provider>,
    default_provider: Provider,
}

impl ProviderRegistry {
    /// 创建注册表；任何地址无法解析都会返回配置错误。
    ///
    /// 重复的 provider 只保留第一次出现的位置，默认 provider 不要求在列表中。
    pub fn new<S: AsRef<str>>(providers: &[S], default_provider: &str) -> Result<Self> {
        let mut parsed: Vec<Provider> = Vec::with_capacity(providers.len());
        for raw in providers {
            let provider = Provider::parse(raw.as_ref())?;
            if parsed.iter().any(|p| p.url == provider.url) {
                tracing::warn!("Ignoring duplicate provider {}", provider.id);
                continue;
            }
            parsed.push(provider);
        }

        let default_provider = Provider::parse(default_provider).map_err(|e| match e {
            FederationError::Config(reason) => {
                FederationError::Config(format!("invalid default provider: {reason}"))
            }
            other => other,
        })?;

        Ok(Self {
            providers: parsed,
            default_provider,
        })
    }

    /// 按注册顺序返回全部 provider
    pub fn providers(&self) -> &[Provider] {
        &self.providers
    }

    pub fn default_provider(&self) -> &Provider {
        &self.default_provider
    }

    /// 按规范标识查找 provider
    pub fn get(&self, id: &str) -> Option<&Provider> {
        self.providers.iter().find(|p| p.matches(id))
    }

    /// 根据放置注解选出 provider，未命中时回退到默认 provider
    pub fn place(&self, placement: Option<&str>) -> &Provider {
        placement
            .and_then(|value| self.get(value))
            .unwrap_or(&self.default_provider)
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
