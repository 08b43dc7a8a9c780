//! Deploy pipeline stages
//!
//! ```text
//! prepare_json → prepare_config → prepare_box_repository → deploy → update_status
//! ```
//!
//! The three preparation stages undo their own writes. Running chef-solo and
//! reporting status cannot be undone.

use super::{ChefSoloProvisioner, SOLO_CONFIG_FILE, SOLO_JSON_FILE};
use crate::provisioner::{DeploySettings, Provisioner};
use async_trait::async_trait;
use berth_actions::{
    Action, ActionError, ActionResult, BackwardContext, ForwardContext, Pipeline, Result,
};
use berth_common::{DeployBox, OutputSink, Status};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

/// Directory under `<sandbox>/<box>` that receives the box repository
pub const CHECKOUT_DIR: &str = "source";

/// Arguments shared by every stage of one deploy
pub struct DeployArgs {
    pub deploy_box: DeployBox,
    pub sink: Arc<dyn OutputSink>,
    /// Status reported by the final stage
    pub machine_status: Status,
    pub settings: DeploySettings,
    pub provisioner: ChefSoloProvisioner,
}

/// The five deploy stages, in order
pub fn deploy_pipeline() -> Pipeline<DeployArgs> {
    let actions: Vec<Arc<dyn Action<DeployArgs>>> = vec![
        Arc::new(PrepareJson),
        Arc::new(PrepareConfig),
        Arc::new(PrepareBoxRepository),
        Arc::new(RunChefSolo),
        Arc::new(UpdateStatus),
    ];
    Pipeline::new(actions)
}

async fn write_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, contents).await?;
    Ok(())
}

/// Remove a file, treating an already missing file as removed
async fn remove_file(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn output_path(ctx: &BackwardContext<'_, DeployArgs>) -> Option<PathBuf> {
    ctx.forward_result().get_output_as::<PathBuf>("path")
}

/// Writes the attributes to `solo.json`
pub struct PrepareJson;

#[async_trait]
impl Action<DeployArgs> for PrepareJson {
    fn name(&self) -> &str {
        "prepare_json"
    }

    async fn forward(&self, ctx: ForwardContext<'_, DeployArgs>) -> Result<ActionResult> {
        let settings = &ctx.args().settings;
        let path = settings.root_path.join(SOLO_JSON_FILE);

        write_file(&path, &settings.attributes).await?;
        debug!(path = %path.display(), "Wrote chef-solo attributes");

        Ok(ActionResult::success("Attributes written").with_output("path", &path))
    }

    async fn backward(&self, ctx: BackwardContext<'_, DeployArgs>) -> Result<()> {
        match output_path(&ctx) {
            Some(path) => remove_file(&path).await,
            None => Ok(()),
        }
    }

    fn reversible(&self) -> bool {
        true
    }
}

/// Writes `solo.rb`
pub struct PrepareConfig;

impl PrepareConfig {
    fn render(settings: &DeploySettings) -> String {
        let root = &settings.root_path;
        format!(
            "file_cache_path \"{}\"\ncookbook_path \"{}\"\nlog_level :{}\nlog_location \"{}\"\n",
            root.join("cache").display(),
            settings.cookbook_path.display(),
            if settings.log_level.is_empty() {
                super::DEFAULT_LOG_LEVEL
            } else {
                settings.log_level.as_str()
            },
            root.join("solo.log").display(),
        )
    }
}

#[async_trait]
impl Action<DeployArgs> for PrepareConfig {
    fn name(&self) -> &str {
        "prepare_config"
    }

    async fn forward(&self, ctx: ForwardContext<'_, DeployArgs>) -> Result<ActionResult> {
        let settings = &ctx.args().settings;
        let path = settings.root_path.join(SOLO_CONFIG_FILE);

        write_file(&path, &Self::render(settings)).await?;
        debug!(path = %path.display(), "Wrote chef-solo config");

        Ok(ActionResult::success("Config written").with_output("path", &path))
    }

    async fn backward(&self, ctx: BackwardContext<'_, DeployArgs>) -> Result<()> {
        match output_path(&ctx) {
            Some(path) => remove_file(&path).await,
            None => Ok(()),
        }
    }

    fn reversible(&self) -> bool {
        true
    }
}

/// Checks out the box repository, when the box declares one
pub struct PrepareBoxRepository;

#[async_trait]
impl Action<DeployArgs> for PrepareBoxRepository {
    fn name(&self) -> &str {
        "prepare_box_repository"
    }

    async fn forward(&self, ctx: ForwardContext<'_, DeployArgs>) -> Result<ActionResult> {
        let args = ctx.args();
        let repo = match args.deploy_box.repo.as_ref().filter(|r| !r.url.is_empty()) {
            Some(repo) => repo,
            None => {
                return Ok(ActionResult::success("No repository declared")
                    .with_output("created", false));
            }
        };

        let box_dir = args
            .deploy_box
            .path_name()
            .map_err(|e| ActionError::PreconditionFailed(e.to_string()))?;
        let dest = args.settings.sandbox_path.join(box_dir).join(CHECKOUT_DIR);

        if tokio::fs::try_exists(&dest).await? {
            debug!(path = %dest.display(), "Repository already checked out");
            return Ok(ActionResult::success("Repository already present")
                .with_output("created", false)
                .with_output("path", &dest));
        }

        let fetcher = args
            .provisioner
            .fetcher_for(repo)
            .map_err(|e| ActionError::PreconditionFailed(e.to_string()))?;
        fetcher
            .checkout(&repo.url, &dest)
            .await
            .map_err(|e| ActionError::ExecutionFailed(e.to_string()))?;

        info!(url = %repo.url, path = %dest.display(), "Repository checked out");
        Ok(ActionResult::success("Repository checked out")
            .with_output("created", true)
            .with_output("path", &dest))
    }

    async fn backward(&self, ctx: BackwardContext<'_, DeployArgs>) -> Result<()> {
        let created = ctx
            .forward_result()
            .get_output_as::<bool>("created")
            .unwrap_or(false);
        if !created {
            return Ok(());
        }

        if let Some(path) = output_path(&ctx) {
            match tokio::fs::remove_dir_all(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    fn reversible(&self) -> bool {
        true
    }
}

/// Runs chef-solo, streaming its output into the sink
pub struct RunChefSolo;

async fn stream_lines<R>(reader: Option<R>, sink: Arc<dyn OutputSink>) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let Some(reader) = reader else {
        return Ok(());
    };
    let mut lines = BufReader::new(reader).lines();
    while let Some(line) = lines.next_line().await? {
        sink.write_line(&line).await;
    }
    Ok(())
}

#[async_trait]
impl Action<DeployArgs> for RunChefSolo {
    fn name(&self) -> &str {
        "deploy"
    }

    async fn forward(&self, ctx: ForwardContext<'_, DeployArgs>) -> Result<ActionResult> {
        let args = ctx.args();
        let cmd = args.provisioner.command(&args.settings);
        let (program, rest) = cmd
            .split_first()
            .ok_or_else(|| ActionError::InvalidParameters("empty command line".to_string()))?;

        info!(box_name = %args.deploy_box.full_name(), command = %cmd.join(" "), "Running provisioner");

        let mut child = Command::new(program)
            .args(rest)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ActionError::ExecutionFailed(format!("{} execution failed: {}", program, e)))?;

        let stdout = stream_lines(child.stdout.take(), args.sink.clone());
        let stderr = stream_lines(child.stderr.take(), args.sink.clone());
        let (stdout, stderr, status) = tokio::join!(stdout, stderr, child.wait());
        stdout?;
        stderr?;
        let status = status?;

        if !status.success() {
            let code = status.code().unwrap_or(-1);
            return Err(ActionError::CommandFailed {
                code,
                message: format!("{} did not complete", program),
            });
        }

        Ok(ActionResult::success("Provisioner finished")
            .with_exit_code(0)
            .with_output("command", cmd.join(" ")))
    }
}

/// Reports the final machine status for the box
pub struct UpdateStatus;

#[async_trait]
impl Action<DeployArgs> for UpdateStatus {
    fn name(&self) -> &str {
        "update_status"
    }

    async fn forward(&self, ctx: ForwardContext<'_, DeployArgs>) -> Result<ActionResult> {
        let args = ctx.args();
        args.provisioner
            .store()
            .update_status(&args.deploy_box.cat_id, args.machine_status)
            .await
            .map_err(|e| ActionError::Remote(e.to_string()))?;

        debug!(cat_id = %args.deploy_box.cat_id, status = %args.machine_status, "Status updated");
        Ok(ActionResult::success(format!("Status set to {}", args.machine_status))
            .with_output("status", args.machine_status))
    }
}
