use crate::config::LogFormat;
use tracing_subscriber::EnvFilter;

const DEFAULT_LEVEL: &str = "info";

/// 构造日志过滤器，非法或缺失的级别回退到 info
pub fn env_filter(level: Option<&str>) -> EnvFilter {
    level
        .and_then(|level| EnvFilter::try_new(level.trim()).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LEVEL))
}

/// 初始化全局日志
pub fn init(format: LogFormat, level: Option<&str>) {
    let builder = tracing_subscriber::fmt().with_env_filter(env_filter(level));

    let result = match format {
        LogFormat::Json => builder.json().flatten_event(true).try_init(),
        LogFormat::Text => builder.try_init(),
    };

    if let Err(e) = result {
        eprintln!("logging already initialised: {e}");
    }
}
