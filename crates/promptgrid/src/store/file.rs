use super::{Store, StoreFuture};
use crate::error::PersistenceError;
use crate::matrix::{CellResult, Experiment};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Writes each run to its own directory under a root:
///
/// ```text
/// root/
///   run-18c2f.../
///     manifest.json
///     cell-000.json
///     cell-001.json
/// ```
///
/// Every file is written to a temp file and renamed into place, so readers
/// never observe a half-written document.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    /// Create a store, ensuring the root directory exists.
    pub fn new(root: impl Into<PathBuf>) -> std::io::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn dir(&self) -> &Path {
        &self.root
    }

    fn run_dir(&self, run_id: &str) -> PathBuf {
        self.root.join(run_id)
    }

    fn cell_filename(index: usize) -> String {
        format!("cell-{index:03}.json")
    }

    /// Load a run's manifest. `None` if the run doesn't exist.
    pub async fn load_manifest(&self, run_id: &str) -> Result<Option<Experiment>, PersistenceError> {
        read_json(&self.run_dir(run_id).join("manifest.json")).await
    }

    /// Load every recorded cell of a run, ordered by index.
    pub async fn load_cells(&self, run_id: &str) -> Result<Vec<(usize, CellResult)>, PersistenceError> {
        let dir = self.run_dir(run_id);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(PersistenceError::UnknownRun(run_id.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        let mut cells = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            let Some(index) = name
                .strip_prefix("cell-")
                .and_then(|s| s.strip_suffix(".json"))
                .and_then(|s| s.parse::<usize>().ok())
            else {
                continue;
            };
            match read_json::<CellResult>(&entry.path()).await {
                Ok(Some(cell)) => cells.push((index, cell)),
                Ok(None) => {}
                Err(e) => warn!("Skipping unreadable cell file {}: {e}", entry.path().display()),
            }
        }
        cells.sort_by_key(|(i, _)| *i);
        Ok(cells)
    }

    /// Ids of every run directory that holds a manifest.
    pub async fn list_runs(&self) -> Result<Vec<String>, PersistenceError> {
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await.is_ok_and(|ft| ft.is_dir())
                && tokio::fs::try_exists(entry.path().join("manifest.json"))
                    .await
                    .unwrap_or(false)
            {
                ids.push(entry.file_name().to_string_lossy().to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }

    async fn save_manifest(&self, experiment: &Experiment) -> Result<(), PersistenceError> {
        write_atomic(&self.run_dir(&experiment.id), "manifest.json", experiment).await
    }
}

/// Serialize to `.{name}.tmp`, then rename over `name`.
async fn write_atomic<T: Serialize>(dir: &Path, name: &str, value: &T) -> Result<(), PersistenceError> {
    tokio::fs::create_dir_all(dir).await?;
    let final_path = dir.join(name);
    let tmp_path = dir.join(format!(".{name}.tmp"));
    let json = serde_json::to_string_pretty(value)?;
    tokio::fs::write(&tmp_path, json).await?;
    tokio::fs::rename(&tmp_path, &final_path).await?;
    debug!("Wrote {}", final_path.display());
    Ok(())
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, PersistenceError> {
    match tokio::fs::read_to_string(path).await {
        Ok(json) => Ok(Some(serde_json::from_str(&json)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

impl Store for JsonFileStore {
    fn create_run<'a>(&'a self, experiment: &'a Experiment) -> StoreFuture<'a, String> {
        Box::pin(async move {
            self.save_manifest(experiment).await?;
            Ok(experiment.id.clone())
        })
    }

    fn record_cell_result<'a>(
        &'a self,
        run_id: &'a str,
        index: usize,
        result: &'a CellResult,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let dir = self.run_dir(run_id);
            if !tokio::fs::try_exists(&dir).await? {
                return Err(PersistenceError::UnknownRun(run_id.to_string()));
            }
            write_atomic(&dir, &Self::cell_filename(index), result).await
        })
    }

    fn update_run_progress<'a>(&'a self, experiment: &'a Experiment) -> StoreFuture<'a, ()> {
        Box::pin(self.save_manifest(experiment))
    }

    fn finalize_run<'a>(&'a self, experiment: &'a Experiment) -> StoreFuture<'a, ()> {
        Box::pin(self.save_manifest(experiment))
    }
}
