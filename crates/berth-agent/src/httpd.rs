//! HTTP status service

use crate::config::HttpConfig;
use crate::error::{Result, ServiceError};
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug)]
struct AppState {
    agent_name: String,
}

#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
    agent: String,
    version: &'static str,
}

pub fn router(agent_name: impl Into<String>) -> Router {
    let state = Arc::new(AppState {
        agent_name: agent_name.into(),
    });
    Router::new()
        .route("/", get(banner))
        .route("/health", get(health))
        .with_state(state)
}

async fn banner(State(state): State<Arc<AppState>>) -> String {
    format!("{} {}\n", state.agent_name, VERSION)
}

async fn health(State(state): State<Arc<AppState>>) -> Json<Health> {
    Json(Health {
        status: "ok",
        agent: state.agent_name.clone(),
        version: VERSION,
    })
}

pub struct HttpService {
    config: HttpConfig,
    agent_name: String,
    shutdown_tx: watch::Sender<()>,
    err_tx: mpsc::Sender<ServiceError>,
    err_rx: Option<mpsc::Receiver<ServiceError>>,
    server: Option<JoinHandle<()>>,
    local_addr: Option<SocketAddr>,
}

impl HttpService {
    pub fn new(config: HttpConfig, agent_name: impl Into<String>) -> Self {
        let (shutdown_tx, _) = watch::channel(());
        let (err_tx, err_rx) = mpsc::channel(1);
        Self {
            config,
            agent_name: agent_name.into(),
            shutdown_tx,
            err_tx,
            err_rx: Some(err_rx),
            server: None,
            local_addr: None,
        }
    }

    /// Bind the listener and serve in the background
    pub async fn open(&mut self) -> Result<SocketAddr> {
        if self.server.is_some() {
            return Err(ServiceError::AlreadyOpen);
        }

        let addr = self.config.bind_address.clone();
        info!(addr = %addr, "Starting HTTP service");

        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServiceError::HttpBind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener.local_addr().map_err(|source| ServiceError::HttpBind {
            addr: addr.clone(),
            source,
        })?;
        info!(addr = %local_addr, "Listening on HTTP");

        let app = router(self.agent_name.clone());
        let mut shutdown = self.shutdown_tx.subscribe();
        let err_tx = self.err_tx.clone();

        self.server = Some(tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown.changed().await;
                })
                .await;

            if let Err(e) = served {
                error!(addr = %addr, error = %e, "HTTP listener failed");
                let _ = err_tx
                    .send(ServiceError::HttpServe {
                        addr,
                        message: e.to_string(),
                    })
                    .await;
            }
        }));
        self.local_addr = Some(local_addr);
        Ok(local_addr)
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub async fn close(&mut self) {
        let _ = self.shutdown_tx.send(());
        if let Some(server) = self.server.take() {
            if let Err(e) = server.await {
                error!(error = %e, "HTTP server task failed");
            }
        }
        self.local_addr = None;
    }

    /// Fatal listener errors; the receiver can be taken once
    pub fn err(&mut self) -> Option<mpsc::Receiver<ServiceError>> {
        self.err_rx.take()
    }
}
