// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Policy State File Store
//!
//! JSON-file implementation of [`PolicyStateStore`]. Writes are atomic: the new
//! state is written to a sibling `.tmp` file, flushed to disk, then renamed over
//! the previous file, so a crash mid-write leaves the old drift baseline intact.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::domain::policy_state::{PolicyState, PolicyStateError, PolicyStateStore};

pub struct JsonFilePolicyStateStore {
    path: PathBuf,
}

impl JsonFilePolicyStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "policy-state.json".to_string());
        self.path.with_file_name(format!(".{}.tmp", file_name))
    }
}

#[async_trait]
impl PolicyStateStore for JsonFilePolicyStateStore {
    async fn load(&self) -> Result<Option<PolicyState>, PolicyStateError> {
        match fs::read_to_string(&self.path).await {
            Ok(json) => Ok(Some(serde_json::from_str(&json)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, state: &PolicyState) -> Result<(), PolicyStateError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let json = serde_json::to_vec_pretty(state)?;
        let temp_path = self.temp_path();

        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(&json).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&temp_path, &self.path).await?;
        debug!("Policy state written to {:?}", self.path);
        Ok(())
    }
}
