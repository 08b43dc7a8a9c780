//! Error types for the agent services

use berth_actions::PipelineError;
use berth_provision::ProvisionError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("failed to subscribe to queue '{queue}': {source}")]
    Subscribe {
        queue: String,
        #[source]
        source: berth_common::Error,
    },

    #[error("provisioner setup failed: {0}")]
    Provisioner(#[from] ProvisionError),

    #[error("status bootstrap failed: {0}")]
    Bootstrap(#[source] PipelineError),

    #[error("subscription to queue '{0}' closed")]
    SubscriptionClosed(String),

    #[error("failed to bind HTTP listener on {addr}: {source}")]
    HttpBind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("HTTP listener failed: addr={addr}, err={message}")]
    HttpServe { addr: String, message: String },

    #[error("service is already open")]
    AlreadyOpen,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ServiceError>;
