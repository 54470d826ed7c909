use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use dc2_engine::dispatcher::{Dispatcher, SpotTiming};
use dc2_executor::{ContainerExecutor, DockerExecutor, InMemoryExecutor};
use dc2_ids::{IdAllocator, OsRng};
use dc2_imds::InMemoryImdsProxy;
use dc2_profile::ProfileEngine;
use dc2_server::BuildInfo;
use dc2_store::ResourceStore;
use tokio_util::sync::CancellationToken;

mod args;

use args::Cli;

fn init_tracing(log_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level.to_string()));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();
}

fn build_executor(cli: &Cli) -> Result<Arc<dyn ContainerExecutor>> {
    match cli.server.executor.as_str() {
        "docker" => Ok(Arc::new(DockerExecutor::new(cli.server.loop_device_dir.clone()))),
        "memory" => Ok(Arc::new(InMemoryExecutor::new())),
        other => anyhow::bail!("unknown --executor '{other}' (expected \"docker\" or \"memory\")"),
    }
}

fn build_profile(cli: &Cli) -> Result<ProfileEngine> {
    match &cli.profile.test_profile_path {
        Some(path) => ProfileEngine::load(path).with_context(|| format!("loading test profile {path}")),
        None => Ok(ProfileEngine::empty()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.server.log_level);

    let addr: SocketAddr = cli.server.addr.parse().with_context(|| format!("invalid --addr {}", cli.server.addr))?;
    let imds_addr: SocketAddr =
        cli.server.imds_addr.parse().with_context(|| format!("invalid --imds-addr {}", cli.server.imds_addr))?;

    let executor = build_executor(&cli)?;
    let profile = Arc::new(build_profile(&cli)?);
    let imds_proxy = InMemoryImdsProxy::new();

    let spot_timing = SpotTiming {
        reclaim_after: Duration::from_secs(cli.spot.spot_reclaim_after_secs),
        reclaim_notice: Duration::from_secs(cli.spot.spot_reclaim_notice_secs),
    };

    let dispatcher = Dispatcher::new(
        ResourceStore::new(),
        IdAllocator::new(OsRng),
        executor,
        Arc::new(imds_proxy.clone()),
        profile,
        cli.server.region.clone(),
        cli.server.owner_id.clone(),
        spot_timing,
    );

    let shutdown = CancellationToken::new();
    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        dc2_common::shutdown::shutdown_signal().await;
        signal_shutdown.cancel();
    });

    dc2_common::signal_ready();

    dc2_server::run(addr, imds_addr, dispatcher, imds_proxy, cli.server.region.clone(), BuildInfo::default(), shutdown)
        .await
}
