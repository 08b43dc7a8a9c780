//! Status bootstrap pipeline
//!
//! Runs once when the service opens, before any message is consumed:
//!
//! ```text
//! update_ip → update_credential → update_status → publish_status
//! ```

use async_trait::async_trait;
use berth_actions::{
    Action, ActionError, ActionResult, BackwardContext, ForwardContext, Pipeline, PipelineError,
    Result,
};
use berth_common::{MessageTransport, Status, StatusStore};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// Address probed to find the outbound interface; nothing is sent
const ROUTE_PROBE_ADDR: &str = "8.8.8.8:80";

pub struct BootstrapArgs {
    pub cat_id: String,
    pub cats_id: Vec<String>,
    /// Reported address; detected from the default route when None
    pub host_ip: Option<String>,
    pub credential_path: Option<PathBuf>,
    pub store: Arc<dyn StatusStore>,
    pub transport: Arc<dyn MessageTransport>,
    /// Topic the bootstrapped notice is published on
    pub topic: String,
}

/// Notice published once the host is bootstrapped
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusNotice {
    pub cat_id: String,
    pub cats_id: Vec<String>,
    pub status: Status,
}

pub fn bootstrap_pipeline() -> Pipeline<BootstrapArgs> {
    let actions: Vec<Arc<dyn Action<BootstrapArgs>>> = vec![
        Arc::new(UpdateIp),
        Arc::new(UpdateCredential),
        Arc::new(UpdateStatus),
        Arc::new(PublishStatus),
    ];
    Pipeline::new(actions)
}

/// Run the bootstrap pipeline
pub async fn run(args: &BootstrapArgs) -> std::result::Result<(), PipelineError> {
    bootstrap_pipeline().execute(args).await?;
    info!(cat_id = %args.cat_id, "Host bootstrapped");
    Ok(())
}

fn remote(e: berth_common::Error) -> ActionError {
    ActionError::Remote(e.to_string())
}

async fn detect_host_ip() -> Result<String> {
    let socket = tokio::net::UdpSocket::bind("0.0.0.0:0").await?;
    socket.connect(ROUTE_PROBE_ADDR).await?;
    Ok(socket.local_addr()?.ip().to_string())
}

pub struct UpdateIp;

#[async_trait]
impl Action<BootstrapArgs> for UpdateIp {
    fn name(&self) -> &str {
        "update_ip"
    }

    async fn forward(&self, ctx: ForwardContext<'_, BootstrapArgs>) -> Result<ActionResult> {
        let args = ctx.args();
        let ip = match &args.host_ip {
            Some(ip) => ip.clone(),
            None => detect_host_ip().await?,
        };

        args.store.update_ip(&args.cat_id, &ip).await.map_err(remote)?;
        debug!(cat_id = %args.cat_id, ip = %ip, "Reported host address");
        Ok(ActionResult::success("Address reported").with_output("ip", ip))
    }
}

pub struct UpdateCredential;

#[async_trait]
impl Action<BootstrapArgs> for UpdateCredential {
    fn name(&self) -> &str {
        "update_credential"
    }

    async fn forward(&self, ctx: ForwardContext<'_, BootstrapArgs>) -> Result<ActionResult> {
        let args = ctx.args();
        let Some(path) = &args.credential_path else {
            return Ok(ActionResult::success("No credential configured"));
        };

        let credential = tokio::fs::read_to_string(path).await?;
        args.store
            .update_credential(&args.cat_id, credential.trim())
            .await
            .map_err(remote)?;
        Ok(ActionResult::success("Credential reported").with_output("path", path))
    }
}

/// Marks the host bootstrapped, restoring the previous status on undo
pub struct UpdateStatus;

#[async_trait]
impl Action<BootstrapArgs> for UpdateStatus {
    fn name(&self) -> &str {
        "update_status"
    }

    async fn forward(&self, ctx: ForwardContext<'_, BootstrapArgs>) -> Result<ActionResult> {
        let args = ctx.args();
        let previous = args.store.get_status(&args.cat_id).await.map_err(remote)?;

        args.store
            .update_status(&args.cat_id, Status::Bootstrapped)
            .await
            .map_err(remote)?;
        Ok(ActionResult::success("Status set to bootstrapped").with_output("previous", previous))
    }

    async fn backward(&self, ctx: BackwardContext<'_, BootstrapArgs>) -> Result<()> {
        let args = ctx.args();
        if let Some(previous) = ctx.forward_result().get_output_as::<Option<Status>>("previous").flatten() {
            args.store
                .update_status(&args.cat_id, previous)
                .await
                .map_err(remote)?;
        }
        Ok(())
    }

    fn reversible(&self) -> bool {
        true
    }
}

pub struct PublishStatus;

#[async_trait]
impl Action<BootstrapArgs> for PublishStatus {
    fn name(&self) -> &str {
        "publish_status"
    }

    async fn forward(&self, ctx: ForwardContext<'_, BootstrapArgs>) -> Result<ActionResult> {
        let args = ctx.args();
        let notice = StatusNotice {
            cat_id: args.cat_id.clone(),
            cats_id: args.cats_id.clone(),
            status: Status::Bootstrapped,
        };

        args.transport
            .publish(&args.topic, serde_json::to_vec(&notice)?)
            .await
            .map_err(remote)?;
        Ok(ActionResult::success(format!("Published on {}", args.topic)))
    }
}
