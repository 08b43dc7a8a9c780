//! Provisioner contract
//!
//! A provisioner turns a [`DeployBox`] into a configured workload by driving
//! an external configuration-management tool.

use crate::error::Result;
use async_trait::async_trait;
use berth_common::{DeployBox, OutputSink};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Optional behaviours a provisioner supports
///
/// Queried by the service before it calls the matching operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// `initialize` does real setup work and must be called on open
    pub initialize: bool,
    /// `startup_message` produces a banner worth logging
    pub startup_message: bool,
}

/// Settings resolved for one deploy
///
/// Built fresh by every deploy call and owned by that call's pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct DeploySettings {
    /// Serialized attributes handed to the tool
    pub attributes: String,
    pub format: String,
    pub log_level: String,
    pub sandbox_path: PathBuf,
    /// Directory holding this deploy's generated files
    pub root_path: PathBuf,
    pub cookbook_path: PathBuf,
    pub sudo: bool,
}

#[async_trait]
pub trait Provisioner: Send + Sync {
    fn name(&self) -> &str;

    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }

    /// One-time setup from the agent's configuration mapping
    async fn initialize(&self, _config: &HashMap<String, String>) -> Result<()> {
        Ok(())
    }

    /// Deploy a box, streaming tool output into `sink`
    async fn deploy(&self, deploy_box: &DeployBox, sink: Arc<dyn OutputSink>) -> Result<()>;

    /// Command line that invokes the tool for the given settings
    fn command(&self, settings: &DeploySettings) -> Vec<String>;

    async fn startup_message(&self) -> Result<String> {
        Ok(String::new())
    }
}
