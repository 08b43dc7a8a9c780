use anyhow::{anyhow, Context, Result};
use berth_agent::{AgentConfig, HttpService, Service, ServiceError};
use berth_common::{HttpStatusStore, MemoryStatusStore, MemoryTransport, MessageTransport, StatusStore};
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Args, Debug)]
pub struct StartArgs {
    /// Path to the agent config file (YAML)
    #[arg(short, long, env = "BERTH_CONFIG")]
    pub config: Option<PathBuf>,
}

pub async fn run(args: StartArgs) -> Result<()> {
    let config = match &args.config {
        Some(path) => AgentConfig::load(path).context("Failed to load config")?,
        None => {
            info!("No config file given, using defaults");
            AgentConfig::default()
        }
    };

    let store: Arc<dyn StatusStore> = match &config.meta.api_url {
        Some(url) => {
            info!(api_url = %url, "Reporting status to API");
            Arc::new(HttpStatusStore::connect(url.as_str()).context("Failed to build status client")?)
        }
        None => {
            warn!("No api_url configured, status is kept in memory");
            Arc::new(MemoryStatusStore::new())
        }
    };
    let transport: Arc<dyn MessageTransport> = Arc::new(MemoryTransport::new());

    let (provisioners, repositories) = berth_provision::register_all(config.chef_solo(), store.clone())
        .context("Failed to register provisioners")?;
    info!(
        provisioners = ?provisioners.names(),
        repositories = ?repositories.names(),
        "Registries ready"
    );

    let mut http = if config.http.enabled {
        let mut http = HttpService::new(config.http.clone(), config.agent.name.clone());
        http.open().await.context("Failed to start HTTP service")?;
        Some(http)
    } else {
        None
    };
    let mut http_errors = http.as_mut().and_then(HttpService::err);

    let mut service = Service::new(config, transport, store, Arc::new(provisioners));
    let mut service_errors = service.err();

    if let Err(e) = service.open().await {
        if let Some(http) = http.as_mut() {
            http.close().await;
        }
        return Err(e).context("Failed to open agent service");
    }
    info!("berthd started, press Ctrl+C to stop");

    let outcome = tokio::select! {
        _ = shutdown_signal() => Ok(()),
        Some(e) = next_error(&mut service_errors) => Err(anyhow!(e).context("Agent service failed")),
        Some(e) = next_error(&mut http_errors) => Err(anyhow!(e).context("HTTP service failed")),
    };

    info!("Shutting down");
    service.close().await;
    if let Some(http) = http.as_mut() {
        http.close().await;
    }
    outcome
}

async fn next_error(rx: &mut Option<mpsc::Receiver<ServiceError>>) -> Option<ServiceError> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
                info!("Received SIGTERM");
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
