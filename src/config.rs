use crate::functions::{FederationError, Result};
use std::collections::HashMap;
use std::time::Duration;

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(180);
const REQUIRED: [&str; 2] = ["providers", "default_provider"];

/// 环境变量来源
pub trait HasEnv {
    fn getenv(&self, key: &str) -> Option<String>;
}

/// 读取进程环境变量
#[derive(Debug, Clone, Copy, Default)]
pub struct OsEnv;

impl HasEnv for OsEnv {
    fn getenv(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl HasEnv for HashMap<String, String> {
    fn getenv(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

/// 日志输出格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// 进程启动配置
#[derive(Debug, Clone)]
pub struct BootstrapConfig {
    pub port: u16,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub providers: Vec<String>,
    pub default_provider: String,
    pub log_format: LogFormat,
    pub log_level: Option<String>,
}

/// 从环境变量构建配置
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadConfig;

impl ReadConfig {
    pub fn read(&self, env: &impl HasEnv) -> Result<BootstrapConfig> {
        for key in REQUIRED {
            if env.getenv(key).is_none() {
                return Err(FederationError::Config(format!(
                    "{key} environment variable must be set"
                )));
            }
        }

        let providers = env
            .getenv("providers")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|provider| !provider.is_empty())
            .map(str::to_string)
            .collect();

        let log_format = match env.getenv("LOG_FORMAT") {
            Some(format) if format.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Text,
        };

        Ok(BootstrapConfig {
            port: parse_port(env.getenv("port"), DEFAULT_PORT),
            read_timeout: parse_duration(env.getenv("read_timeout"), DEFAULT_TIMEOUT),
            write_timeout: parse_duration(env.getenv("write_timeout"), DEFAULT_TIMEOUT),
            providers,
            default_provider: env.getenv("default_provider").unwrap_or_default().trim().to_string(),
            log_format,
            log_level: env.getenv("LOG_LEVEL").filter(|level| !level.trim().is_empty()),
        })
    }
}

fn parse_port(val: Option<String>, fallback: u16) -> u16 {
    val.and_then(|v| v.trim().parse().ok()).unwrap_or(fallback)
}

/// 整数按秒解析，否则按 `1m30s` 这类时长字符串解析；非法值使用默认值
fn parse_duration(val: Option<String>, fallback: Duration) -> Duration {
    let Some(val) = val.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) else {
        return fallback;
    };

    if let Ok(secs) = val.parse::<u64>() {
        return Duration::from_secs(secs);
    }

    parse_duration_str(&val).unwrap_or(fallback)
}

fn parse_duration_str(val: &str) -> Option<Duration> {
    let mut total = Duration::ZERO;
    let mut rest = val;

    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if number_len == 0 {
            return None;
        }
        let value: f64 = rest[..number_len].parse().ok()?;
        rest = &rest[number_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let unit = match &rest[..unit_len] {
            "ns" => 1e-9,
            "us" | "µs" => 1e-6,
            "ms" => 1e-3,
            "s" => 1.0,
            "m" => 60.0,
            "h" => 3600.0,
            _ => return None,
        };
        rest = &rest[unit_len..];

        let part = Duration::try_from_secs_f64(value * unit).ok()?;
        total = total.checked_add(part)?;
    }

    Some(total)
}
