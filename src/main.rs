#![allow(clippy::uninlined_format_args)]

use flux_federation::config::{OsEnv, ReadConfig};
use flux_federation::gateway::routes::build_routes;
use flux_federation::gateway::{FluxGateway, GIT_SHA, VERSION};
use flux_federation::logging;
use flux_federation::routing::fanout::FanoutFetcher;
use flux_federation::routing::provider::ProviderRegistry;
use flux_federation::routing::{DefaultProviderRouting, ProviderLookup};
use silent::prelude::*;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = ReadConfig.read(&OsEnv)?;

    // 初始化日志
    logging::init(cfg.log_format, cfg.log_level.as_deref());

    info!(
        "🚀 Starting FluxFaaS federation gateway {} (commit {})",
        VERSION,
        GIT_SHA.unwrap_or("unknown")
    );

    let registry = ProviderRegistry::new(&cfg.providers, &cfg.default_provider)?;
    info!(
        "🔗 Providers: [{}], default: {}",
        registry
            .providers()
            .iter()
            .map(|p| p.id())
            .collect::<Vec<_>>()
            .join(", "),
        registry.default_provider().id()
    );

    let client = reqwest::Client::builder().timeout(cfg.read_timeout).build()?;
    let routing = Arc::new(DefaultProviderRouting::new(
        registry,
        FanoutFetcher::new(client),
    ));

    // 启动时加载函数目录
    let loaded = routing.reload_cache().await?;
    info!("📚 Function directory loaded with {} functions", loaded);

    let gateway = Arc::new(FluxGateway::new(routing, cfg.read_timeout)?);
    let routes = build_routes(gateway);

    let addr: SocketAddr = ([0, 0, 0, 0], cfg.port).into();
    info!(
        "🌐 Listening on http://{} (read timeout {:?}, write timeout {:?})",
        addr, cfg.read_timeout, cfg.write_timeout
    );

    Server::new().bind(addr).serve(routes).await;

    Ok(())
}
