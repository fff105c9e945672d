// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Per-instance artifact provisioning.
//!
//! Each worker reads a JSON config artifact and a shared secrets file at
//! startup, both mounted read-only. Config writes are idempotent per key;
//! the secrets file is created once with a placeholder and never
//! overwritten, so operator-supplied real secrets survive repeated
//! provisioning.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::backend::FileBinding;
use crate::error::{Error, Result};
use crate::registry::InstanceKey;

/// Worker-side mount point of the config artifact.
pub const WORKER_CONFIG_PATH: &str = "/config/dashboard.json";
/// Worker-side mount point of the shared secrets file.
pub const WORKER_SECRETS_PATH: &str = "/config/secrets.env";
/// Worker-side directory data sources are mounted under.
pub const WORKER_DATA_SOURCE_DIR: &str = "/data/sources";
/// Content written when the shared secrets file does not exist yet.
pub const SECRETS_PLACEHOLDER: &str = "API_KEY=replace_me\n";

/// Configuration payload a worker reads at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceConfig {
    /// Dashboard identifier.
    pub dashboard_id: String,
    /// Owning user.
    pub user_id: String,
    /// Human-readable description.
    pub description: String,
    /// Worker-visible data source path, if one was supplied.
    pub data_source_path: Option<String>,
}

/// A config artifact written to disk.
#[derive(Debug, Clone)]
pub struct WrittenArtifact {
    /// Where the artifact was written.
    pub path: PathBuf,
    /// Host-visible path of the same file, used for the bind mount.
    pub host_path: PathBuf,
}

/// Filesystem store for config and secrets artifacts.
///
/// Write paths and host-visible paths differ only when the control plane
/// itself runs inside a container; bind mounts always use the host side.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    configs_dir: PathBuf,
    host_configs_dir: PathBuf,
    secrets_file: PathBuf,
    host_secrets_file: PathBuf,
}

impl ArtifactStore {
    /// Create a store over the given directories.
    pub fn new(
        configs_dir: impl Into<PathBuf>,
        host_configs_dir: impl Into<PathBuf>,
        secrets_file: impl Into<PathBuf>,
        host_secrets_file: impl Into<PathBuf>,
    ) -> Self {
        Self {
            configs_dir: configs_dir.into(),
            host_configs_dir: host_configs_dir.into(),
            secrets_file: secrets_file.into(),
            host_secrets_file: host_secrets_file.into(),
        }
    }

    /// Write (or overwrite) the config artifact for a key.
    pub async fn write_config(
        &self,
        key: &InstanceKey,
        config: &InstanceConfig,
    ) -> Result<WrittenArtifact> {
        fs::create_dir_all(&self.configs_dir).await?;

        let file_name = format!("{}.json", key.file_stem());
        let path = self.configs_dir.join(&file_name);
        let payload = serde_json::to_string_pretty(config)?;
        fs::write(&path, payload).await?;

        debug!(key = %key, path = %path.display(), "Wrote config artifact");

        Ok(WrittenArtifact {
            path,
            host_path: self.host_configs_dir.join(file_name),
        })
    }

    /// Delete the config artifact for a key. Missing files are fine.
    pub async fn delete_config(&self, key: &InstanceKey) -> Result<()> {
        let path = self.configs_dir.join(format!("{}.json", key.file_stem()));
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!(key = %key, path = %path.display(), "Deleted config artifact");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Create the shared secrets file with a placeholder if absent.
    ///
    /// Never overwrites: once an operator has put real secrets in the
    /// file, repeated provisioning must not clobber them.
    pub async fn ensure_secrets_file(&self) -> Result<()> {
        if let Some(parent) = self.secrets_file.parent() {
            fs::create_dir_all(parent).await?;
        }

        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.secrets_file)
            .await
        {
            Ok(mut file) => {
                file.write_all(SECRETS_PLACEHOLDER.as_bytes()).await?;
                info!(path = %self.secrets_file.display(), "Created secrets file with placeholder");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Host-visible path of the shared secrets file.
    pub fn host_secrets_file(&self) -> &Path {
        &self.host_secrets_file
    }
}

/// Everything provisioned for one instance.
#[derive(Debug, Clone)]
pub struct ProvisionedArtifacts {
    /// The written config artifact.
    pub config: WrittenArtifact,
    /// Worker-visible data source path, when one was supplied.
    pub data_source_path: Option<String>,
    /// Read-only bindings for the worker: config, secrets, and the
    /// optional data source.
    pub bindings: Vec<FileBinding>,
}

/// Builds per-instance config payloads and their file bindings.
#[derive(Debug, Clone)]
pub struct ArtifactProvisioner {
    store: ArtifactStore,
}

impl ArtifactProvisioner {
    /// Create a provisioner over a store.
    pub fn new(store: ArtifactStore) -> Self {
        Self { store }
    }

    /// Provision the config and secrets artifacts for an instance.
    ///
    /// A supplied host data-source path is rewritten for the worker by
    /// taking its base name under [`WORKER_DATA_SOURCE_DIR`], regardless
    /// of the host directory structure.
    pub async fn provision(
        &self,
        key: &InstanceKey,
        description: &str,
        data_source_host_path: Option<&Path>,
    ) -> Result<ProvisionedArtifacts> {
        let data_source = match data_source_host_path {
            Some(host_path) => {
                let file_name = host_path.file_name().ok_or_else(|| {
                    Error::InvalidRequest(format!(
                        "data source path has no file name: {}",
                        host_path.display()
                    ))
                })?;
                let worker_path =
                    format!("{}/{}", WORKER_DATA_SOURCE_DIR, file_name.to_string_lossy());
                Some((host_path.to_path_buf(), worker_path))
            }
            None => None,
        };

        let config = InstanceConfig {
            dashboard_id: key.dashboard_id().to_string(),
            user_id: key.user_id().to_string(),
            description: description.to_string(),
            data_source_path: data_source.as_ref().map(|(_, worker)| worker.clone()),
        };

        let written = self.store.write_config(key, &config).await?;
        self.store.ensure_secrets_file().await?;

        let mut bindings = vec![
            FileBinding {
                host_path: written.host_path.clone(),
                worker_path: WORKER_CONFIG_PATH.to_string(),
            },
            FileBinding {
                host_path: self.store.host_secrets_file().to_path_buf(),
                worker_path: WORKER_SECRETS_PATH.to_string(),
            },
        ];
        if let Some((host_path, worker_path)) = &data_source {
            bindings.push(FileBinding {
                host_path: host_path.clone(),
                worker_path: worker_path.clone(),
            });
        }

        Ok(ProvisionedArtifacts {
            config: written,
            data_source_path: data_source.map(|(_, worker)| worker),
            bindings,
        })
    }

    /// Delete the config artifact for a key.
    pub async fn delete_config(&self, key: &InstanceKey) -> Result<()> {
        self.store.delete_config(key).await
    }
}
