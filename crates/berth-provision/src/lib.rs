//! Provisioners for berth
//!
//! A provisioner configures one box by driving an external
//! configuration-management tool through a rollback-capable pipeline.
//! Provisioners and repository fetchers are selected by name from registries
//! the entrypoint fills at startup.
//!
//! # Example
//!
//! ```ignore
//! use berth_provision::{register_all, ChefSoloConfig};
//!
//! let (provisioners, repositories) = register_all(ChefSoloConfig::default(), store)?;
//! let chef = provisioners.get("chefsolo")?;
//! chef.deploy(&deploy_box, sink).await?;
//! ```

pub mod chefsolo;
pub mod error;
pub mod provisioner;
pub mod registry;
pub mod repository;

pub use chefsolo::{ChefSoloConfig, ChefSoloProvisioner};
pub use error::{ProvisionError, Result};
pub use provisioner::{Capabilities, DeploySettings, Provisioner};
pub use registry::{ProvisionerRegistry, Registry, RegistryError, RepositoryRegistry};
pub use repository::{GitRepository, Repository};

use berth_common::StatusStore;
use std::sync::Arc;

/// Build the registries with every bundled provisioner and fetcher
pub fn register_all(
    config: ChefSoloConfig,
    store: Arc<dyn StatusStore>,
) -> std::result::Result<(ProvisionerRegistry, Arc<RepositoryRegistry>), RegistryError> {
    let mut repositories: RepositoryRegistry = Registry::new("repository");
    repositories.register(repository::GIT_REPOSITORY, Arc::new(GitRepository::new()))?;
    repositories.register(
        berth_common::DEFAULT_REPO_KIND,
        Arc::new(GitRepository::new().with_name(berth_common::DEFAULT_REPO_KIND)),
    )?;
    let repositories = Arc::new(repositories);

    let mut provisioners: ProvisionerRegistry = Registry::new("provisioner");
    provisioners.register(
        chefsolo::PROVISIONER_NAME,
        Arc::new(ChefSoloProvisioner::new(config, repositories.clone(), store)),
    )?;

    Ok((provisioners, repositories))
}
