//! Application state management

use std::path::{Path, PathBuf};

use crate::error::{Result, RunboardError};
use crate::orchestrator::OrchestratorConfig;
use crate::tracking::{LocalStorage, MemoryStore};

use super::ServerConfig;

/// Application state shared across handlers
pub struct AppState {
    pub config: ServerConfig,
    pub store: MemoryStore,
    pub orchestrator: OrchestratorConfig,
}

impl AppState {
    /// State backed by the configured snapshot file, if any
    pub fn new(config: ServerConfig, orchestrator: OrchestratorConfig) -> Result<Self> {
        let store = match &config.store_path {
            Some(path) => MemoryStore::with_backend(Box::new(LocalStorage::new(path)))?,
            None => MemoryStore::new(),
        };
        Ok(Self::with_store(config, store, orchestrator))
    }

    pub fn with_store(config: ServerConfig, store: MemoryStore, orchestrator: OrchestratorConfig) -> Self {
        Self {
            config,
            store,
            orchestrator,
        }
    }

    /// Final path component of a client-supplied file name
    pub fn dataset_name(filename: &str) -> Result<String> {
        Path::new(filename)
            .file_name()
            .and_then(|n| n.to_str())
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .ok_or_else(|| RunboardError::invalid_param("filename", filename, "not a file name"))
    }

    /// Path of a dataset inside the data directory
    pub fn dataset_path(&self, filename: &str) -> Result<PathBuf> {
        Ok(Path::new(&self.config.data_dir).join(Self::dataset_name(filename)?))
    }

    /// File names in the data directory, sorted
    pub fn list_datasets(&self) -> Result<Vec<String>> {
        let dir = Path::new(&self.config.data_dir);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}
