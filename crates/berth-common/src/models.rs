//! Box and payload models
//!
//! A raw queue message decodes into a [`Payload`], which converts into a
//! [`BoxRequest`] carrying the [`DeployBox`] a handler deploys.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Repository kind assumed when a box does not name one
pub const DEFAULT_REPO_KIND: &str = "git";

/// The unit of deployment
///
/// Named `DeployBox` so it never shadows `std::boxed::Box`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DeployBox {
    pub name: String,
    #[serde(alias = "domainname")]
    pub domain_name: String,
    pub cookbook: String,
    /// Dot-delimited type descriptor, e.g. `compute.tosca.cloud`
    pub tosca: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo: Option<Repo>,
    /// Catalog identifier, copied from the enclosing payload
    pub cat_id: String,
}

impl DeployBox {
    /// Identifying name used in logs, file paths and errors
    pub fn full_name(&self) -> String {
        match (self.name.is_empty(), self.domain_name.is_empty()) {
            (false, false) => format!("{}.{}", self.name, self.domain_name),
            (false, true) => self.name.clone(),
            (true, false) => self.domain_name.clone(),
            (true, true) => self.cat_id.clone(),
        }
    }

    /// [`full_name`](Self::full_name), checked for use as a directory name
    pub fn path_name(&self) -> Result<String> {
        let name = self.full_name();
        path_segment(&name)?;
        Ok(name)
    }

    /// Third segment of the tosca descriptor
    pub fn tosca_type(&self) -> Result<&str> {
        self.tosca
            .split('.')
            .nth(2)
            .ok_or_else(|| Error::InvalidTosca(self.tosca.clone()))
    }

    /// Repository url, if the box declares one
    pub fn repo_url(&self) -> Option<&str> {
        self.repo.as_ref().map(|r| r.url.as_str())
    }
}

/// Check that `name` is one path component that stays under its parent
///
/// Rejects empty names, `.`, `..` and anything containing a separator or
/// NUL, so joining the result onto a base directory never leaves it.
pub fn path_segment(name: &str) -> Result<&str> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0']);
    if invalid {
        return Err(Error::InvalidBoxName(name.to_string()));
    }
    Ok(name)
}

/// Source repository descriptor
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Repo {
    #[serde(default)]
    pub url: String,
    #[serde(rename = "source", alias = "kind", default = "default_repo_kind")]
    pub kind: String,
}

fn default_repo_kind() -> String {
    DEFAULT_REPO_KIND.to_string()
}

/// Decoded message envelope
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Payload {
    #[serde(rename = "CatID", default)]
    pub cat_id: String,
    #[serde(rename = "CatsID", default)]
    pub cats_id: Vec<String>,
    /// Every other top-level key, including `box`
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

impl Payload {
    /// Decode raw message bytes
    pub fn decode(raw: &[u8]) -> Result<Self> {
        serde_json::from_slice(raw).map_err(Error::Decode)
    }

    /// Pull the box out of the metadata and produce a dispatch-ready request
    pub fn convert(mut self) -> Result<BoxRequest> {
        let raw_box = self.metadata.remove("box").ok_or(Error::MissingBox)?;
        if raw_box.is_null() {
            return Err(Error::MissingBox);
        }

        let mut deploy_box: DeployBox = serde_json::from_value(raw_box).map_err(Error::InvalidBox)?;
        if deploy_box.cat_id.is_empty() {
            deploy_box.cat_id = self.cat_id.clone();
        }

        Ok(BoxRequest {
            deploy_box,
            cat_id: self.cat_id,
            cats_id: self.cats_id,
            metadata: self.metadata,
        })
    }
}

/// A converted payload, ready for a handler
#[derive(Debug, Clone, PartialEq)]
pub struct BoxRequest {
    pub deploy_box: DeployBox,
    pub cat_id: String,
    pub cats_id: Vec<String>,
    pub metadata: Map<String, Value>,
}
