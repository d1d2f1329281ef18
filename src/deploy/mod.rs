//! Deployment dispatch.
//!
//! A deployment method name resolves through a static registry,
//! populated at process start, to a backend that publishes the packaged
//! artifacts. Resolution fails before any deployment side effect, so an
//! unknown method never touches the filesystem or the network.
//!
//! Backends receive a [`DeployContext`] (artifact paths and product
//! metadata merged with caller options) and emit [`DeployEvent`]s to an
//! observer callback as they progress.

mod ssh;
mod testflight;
mod web;

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::config::LaneConfig;
use crate::invoke::{InvokeError, ToolInvoker};

/// Errors from deployment resolution or execution.
#[derive(Debug, Error)]
pub enum DeployError {
    #[error("unknown deployment method: {0}")]
    UnknownMethod(String),

    #[error("missing deploy option: {0}")]
    MissingOption(&'static str),

    #[error("missing artifact {path} (run the {produced_by} stage first)")]
    MissingArtifact {
        path: PathBuf,
        produced_by: &'static str,
    },

    #[error(transparent)]
    Invoke(#[from] InvokeError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Progress emitted by a backend during a deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployEvent {
    Started { method: &'static str },
    Progress(String),
    Uploaded { what: String },
    Finished,
}

/// Observer receiving progress events.
pub type ProgressSink<'a> = &'a mut dyn FnMut(DeployEvent);

/// Normalized options bag handed to a backend: the default artifact
/// paths and product metadata, with caller options merged over them.
#[derive(Debug, Clone)]
pub struct DeployContext {
    pub ipa_path: PathBuf,
    pub dsym_zip_path: PathBuf,
    pub ipa_name: String,
    pub app_path: PathBuf,
    pub build_output_path: PathBuf,
    pub product_name: String,
    pub bundle_identifier: Option<String>,
    pub bundle_version: Option<String>,
    pub release_notes: Option<String>,
    /// Backend-specific options (host, path, api_token, ...).
    pub extra: HashMap<String, String>,
}

impl DeployContext {
    /// Default bag derived from the lane configuration.
    pub fn from_config(config: &LaneConfig) -> Self {
        Self {
            ipa_path: config.ipa_path(),
            dsym_zip_path: config.dsym_zip_path(),
            ipa_name: config.ipa_name(),
            app_path: config.app_path(),
            build_output_path: config.configuration_build_path(),
            product_name: config.product_name.clone(),
            bundle_identifier: config.bundle_identifier().map(str::to_string),
            bundle_version: config.bundle_version().map(str::to_string),
            release_notes: None,
            extra: HashMap::new(),
        }
    }

    /// Merge caller options over the defaults. Known keys override the
    /// corresponding field; anything else lands in `extra` for the
    /// backend.
    pub fn merge(mut self, options: HashMap<String, String>) -> Self {
        for (key, value) in options {
            match key.as_str() {
                "ipa_path" => self.ipa_path = PathBuf::from(value),
                "dsym_zip_path" => self.dsym_zip_path = PathBuf::from(value),
                "ipa_name" => self.ipa_name = value,
                "app_path" => self.app_path = PathBuf::from(value),
                "build_output_path" => self.build_output_path = PathBuf::from(value),
                "product_name" => self.product_name = value,
                "bundle_identifier" => self.bundle_identifier = Some(value),
                "bundle_version" => self.bundle_version = Some(value),
                "release_notes" => self.release_notes = Some(value),
                _ => {
                    self.extra.insert(key, value);
                }
            }
        }
        self
    }

    /// Fetch a required backend option.
    pub fn require(&self, key: &'static str) -> Result<&str, DeployError> {
        self.extra
            .get(key)
            .map(String::as_str)
            .ok_or(DeployError::MissingOption(key))
    }

    /// Fail unless the packaged artifacts exist. Called by backends
    /// before any external invocation.
    pub fn require_artifacts(&self) -> Result<(), DeployError> {
        for path in [&self.ipa_path, &self.dsym_zip_path] {
            if !path.exists() {
                return Err(DeployError::MissingArtifact {
                    path: path.clone(),
                    produced_by: "package",
                });
            }
        }
        Ok(())
    }
}

/// A pluggable "publish build artifacts to a destination" implementation.
pub trait DeployBackend {
    fn name(&self) -> &'static str;

    fn deploy(
        &self,
        invoker: &dyn ToolInvoker,
        ctx: &DeployContext,
        progress: ProgressSink<'_>,
    ) -> Result<(), DeployError>;
}

type BackendCtor = fn() -> Box<dyn DeployBackend>;

/// Supported deployment methods, fixed at compile time.
const METHODS: &[(&str, BackendCtor)] = &[
    ("web", web::backend),
    ("ssh", ssh::backend),
    ("testflight", testflight::backend),
];

/// Resolve a method name to its backend.
pub fn resolve(method: &str) -> Result<Box<dyn DeployBackend>, DeployError> {
    METHODS
        .iter()
        .find(|(name, _)| *name == method)
        .map(|(_, ctor)| ctor())
        .ok_or_else(|| DeployError::UnknownMethod(method.to_string()))
}

/// Names of all registered methods, for diagnostics.
pub fn method_names() -> Vec<&'static str> {
    METHODS.iter().map(|(name, _)| *name).collect()
}

/// Hex SHA-256 of a file's contents.
pub(crate) fn sha256_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}
