//! Repository fetchers
//!
//! A fetcher materializes a source repository on local disk. Some fetchers
//! also support a one-time `initialize` that installs the shared cookbook
//! repository the provisioner runs against.

use crate::error::{ProvisionError, Result};
use async_trait::async_trait;
use std::path::Path;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Name of the bundled fetcher
pub const GIT_REPOSITORY: &str = "github";

#[async_trait]
pub trait Repository: Send + Sync {
    fn name(&self) -> &str;

    /// Whether `initialize` does anything
    fn supports_initialize(&self) -> bool {
        false
    }

    /// Install the repository at `url` under `dir`, falling back to the
    /// tarball at `tar_url`
    async fn initialize(&self, _url: &str, _tar_url: &str, _dir: &Path) -> Result<()> {
        Ok(())
    }

    /// Check out `url` into `dest`
    async fn checkout(&self, url: &str, dest: &Path) -> Result<()>;
}

/// Directory name a repository url unpacks to
///
/// Takes the `/`-separated segment at index 4 and cuts it at the first
/// `.`, so `http://host/org/repo/archive/branch.tar.gz` gives `repo` and
/// `https://github.com/org/chef-repo.git` gives `chef-repo`.
pub fn repository_name(url: &str) -> Result<String> {
    let segment = url
        .split('/')
        .nth(4)
        .ok_or_else(|| ProvisionError::InvalidRepositoryUrl(url.to_string()))?;

    let name = segment.split('.').next().unwrap_or(segment);
    if name.is_empty() {
        return Err(ProvisionError::InvalidRepositoryUrl(url.to_string()));
    }
    Ok(name.to_string())
}

/// Fetches with git, falling back to curl and tar for initialize
#[derive(Debug, Clone)]
pub struct GitRepository {
    name: String,
}

impl GitRepository {
    pub fn new() -> Self {
        Self {
            name: GIT_REPOSITORY.to_string(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl Default for GitRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Repository for GitRepository {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports_initialize(&self) -> bool {
        true
    }

    async fn initialize(&self, url: &str, tar_url: &str, dir: &Path) -> Result<()> {
        let target = dir.join(repository_name(url)?);
        tokio::fs::create_dir_all(dir).await?;

        match clone(url, &target).await {
            Ok(()) => {
                info!(url = %url, dest = %target.display(), "Repository cloned");
                Ok(())
            }
            Err(e) if !tar_url.is_empty() => {
                warn!(url = %url, error = %e, "Clone failed, downloading tarball");
                download_and_unpack(tar_url, dir).await?;
                info!(url = %tar_url, dest = %dir.display(), "Repository tarball unpacked");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn checkout(&self, url: &str, dest: &Path) -> Result<()> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        clone(url, dest).await
    }
}

async fn clone(url: &str, dest: &Path) -> Result<()> {
    debug!(url = %url, dest = %dest.display(), "Cloning repository");

    let output = Command::new("git")
        .arg("clone")
        .arg("--depth")
        .arg("1")
        .arg(url)
        .arg(dest)
        .output()
        .await
        .map_err(|e| ProvisionError::Repository(format!("git execution failed: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ProvisionError::Repository(format!(
            "git clone exited with code {}: {}",
            output.status.code().unwrap_or(-1),
            stderr.trim()
        )));
    }
    Ok(())
}

async fn download_and_unpack(tar_url: &str, dir: &Path) -> Result<()> {
    let archive = dir.join(".berth-download.tar.gz");

    let status = Command::new("curl")
        .arg("-sfL")
        .arg("--connect-timeout")
        .arg("30")
        .arg("--retry")
        .arg("3")
        .arg("-o")
        .arg(&archive)
        .arg(tar_url)
        .status()
        .await
        .map_err(|e| ProvisionError::Repository(format!("curl failed: {}", e)))?;

    if !status.success() {
        return Err(ProvisionError::Repository(format!(
            "download failed ({}): {}",
            status.code().unwrap_or(-1),
            tar_url
        )));
    }

    let status = Command::new("tar")
        .arg("-xzf")
        .arg(&archive)
        .arg("-C")
        .arg(dir)
        .status()
        .await
        .map_err(|e| ProvisionError::Repository(format!("tar failed: {}", e)))?;

    let _ = tokio::fs::remove_file(&archive).await;

    if !status.success() {
        return Err(ProvisionError::Repository(format!(
            "unpacking {} failed ({})",
            tar_url,
            status.code().unwrap_or(-1)
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_name_from_tarball_url() {
        assert_eq!(
            repository_name("http://host/org/repo/archive/branch.tar.gz").unwrap(),
            "repo"
        );
    }

    #[test]
    fn test_repository_name_cuts_extension() {
        assert_eq!(
            repository_name("https://github.com/acme/chef-repo.git").unwrap(),
            "chef-repo"
        );
    }

    #[test]
    fn test_repository_name_needs_five_segments() {
        assert!(matches!(
            repository_name("https://github.com/acme"),
            Err(ProvisionError::InvalidRepositoryUrl(_))
        ));
        assert!(matches!(
            repository_name("https://github.com/acme/.hidden"),
            Err(ProvisionError::InvalidRepositoryUrl(_))
        ));
    }

    #[test]
    fn test_git_repository_defaults() {
        let repo = GitRepository::new();
        assert_eq!(repo.name(), "github");
        assert!(repo.supports_initialize());
        assert_eq!(GitRepository::new().with_name("gitlab").name(), "gitlab");
    }
}
