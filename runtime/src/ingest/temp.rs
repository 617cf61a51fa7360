use std::{
    io::Write,
    ops::Deref,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use tempfile::{TempDir, TempPath};
use tracing::{debug, warn};

const TEMP_PREFIX: &str = "docsight-";

/// Where per-call scratch files are created. `None` means the system temp dir.
#[derive(Debug, Clone, Default)]
pub struct TempWorkspace {
    root: Option<PathBuf>,
}

impl TempWorkspace {
    pub fn new(root: Option<PathBuf>) -> Self {
        Self { root }
    }

    pub fn root(&self) -> PathBuf {
        self.root.clone().unwrap_or_else(std::env::temp_dir)
    }

    /// Writes `bytes` to a uniquely named file that is removed when the guard
    /// drops.
    pub fn materialize(&self, bytes: &[u8], suffix: &str) -> Result<ScopedTempFile> {
        let root = self.root();
        let mut file = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .suffix(suffix)
            .tempfile_in(&root)
            .with_context(|| format!("failed to create temp file in {}", root.display()))?;
        file.write_all(bytes).context("failed to write temp file")?;
        file.flush().context("failed to flush temp file")?;

        let path = file.into_temp_path();
        debug!(path = %path.display(), "materialized temp file");
        Ok(ScopedTempFile { path: Some(path) })
    }

    pub fn scratch_dir(&self, label: &str) -> Result<ScopedTempDir> {
        let root = self.root();
        let dir = tempfile::Builder::new()
            .prefix(&format!("{TEMP_PREFIX}{label}-"))
            .tempdir_in(&root)
            .with_context(|| format!("failed to create temp dir in {}", root.display()))?;
        Ok(ScopedTempDir { dir: Some(dir) })
    }
}

#[derive(Debug)]
pub struct ScopedTempFile {
    path: Option<TempPath>,
}

impl ScopedTempFile {
    pub fn path(&self) -> &Path {
        self.path.as_deref().unwrap_or_else(|| Path::new(""))
    }
}

impl Deref for ScopedTempFile {
    type Target = Path;

    fn deref(&self) -> &Path {
        self.path()
    }
}

impl Drop for ScopedTempFile {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            let shown = path.to_path_buf();
            if let Err(err) = path.close() {
                warn!(path = %shown.display(), error = %err, "failed to delete temp file");
            }
        }
    }
}

#[derive(Debug)]
pub struct ScopedTempDir {
    dir: Option<TempDir>,
}

impl ScopedTempDir {
    pub fn path(&self) -> &Path {
        self.dir
            .as_ref()
            .map(TempDir::path)
            .unwrap_or_else(|| Path::new(""))
    }
}

impl Drop for ScopedTempDir {
    fn drop(&mut self) {
        if let Some(dir) = self.dir.take() {
            let shown = dir.path().to_path_buf();
            if let Err(err) = dir.close() {
                warn!(path = %shown.display(), error = %err, "failed to delete temp dir");
            }
        }
    }
}
