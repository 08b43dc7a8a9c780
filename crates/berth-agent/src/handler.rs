//! Per-message handler

use crate::filelog::FileLogNotifier;
use berth_common::BoxRequest;
use berth_provision::{Provisioner, Result};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Deploys the box carried by one request
#[derive(Clone)]
pub struct Handler {
    provisioner: Arc<dyn Provisioner>,
    notifier: Arc<FileLogNotifier>,
    default_cookbook: String,
}

impl Handler {
    pub fn new(
        provisioner: Arc<dyn Provisioner>,
        notifier: Arc<FileLogNotifier>,
        default_cookbook: impl Into<String>,
    ) -> Self {
        Self {
            provisioner,
            notifier,
            default_cookbook: default_cookbook.into(),
        }
    }

    pub async fn handle(&self, request: BoxRequest) -> Result<()> {
        let mut deploy_box = request.deploy_box;
        if deploy_box.cookbook.is_empty() {
            deploy_box.cookbook = self.default_cookbook.clone();
        }

        let box_name = deploy_box.path_name().map_err(|e| {
            warn!(cat_id = %request.cat_id, error = %e, "Skipping box");
            e
        })?;
        let sink = Arc::new(self.notifier.sink(box_name.clone()));

        info!(box_name = %box_name, cookbook = %deploy_box.cookbook, provisioner = %self.provisioner.name(), "Deploying");
        match self.provisioner.deploy(&deploy_box, sink).await {
            Ok(()) => {
                info!(box_name = %box_name, "Deploy finished");
                Ok(())
            }
            Err(e) => {
                error!(box_name = %box_name, error = %e, "Deploy failed");
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handler")
            .field("provisioner", &self.provisioner.name())
            .field("notifier", &self.notifier)
            .field("default_cookbook", &self.default_cookbook)
            .finish()
    }
}
