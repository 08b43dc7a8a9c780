//! Error types for provisioners

use crate::registry::RegistryError;
use berth_actions::PipelineError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("initialization failed: {0}")]
    Initialize(String),

    #[error("invalid repository url '{0}': expected at least five '/'-separated segments")]
    InvalidRepositoryUrl(String),

    #[error("repository error: {0}")]
    Repository(String),

    /// A deploy pipeline failed for the named box
    #[error("deploy of box '{box_name}' failed: {source}")]
    Pipeline {
        box_name: String,
        #[source]
        source: PipelineError,
    },

    #[error(transparent)]
    Model(#[from] berth_common::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ProvisionError>;
