//! Per-evaluation working directories.
//!
//! Every evaluation gets a fresh directory under the configured work root,
//! named after a v4 UUID, so concurrent evaluations never share generated
//! artifacts. The directory is removed on [`Workspace::remove`] or, failing
//! that, when the value is dropped.

use crate::error::{EvalError, Result};
use codegrade_common::Language;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use uuid::Uuid;

#[derive(Debug)]
pub struct Workspace {
    dir: PathBuf,
    removed: bool,
}

impl Workspace {
    /// Create `<root>/<language>-<uuid>`; fails rather than reuse a directory
    pub fn create(root: &Path, language: Language) -> Result<Self> {
        std::fs::create_dir_all(root).map_err(|source| EvalError::Workspace {
            path: root.to_path_buf(),
            source,
        })?;

        let dir = root.join(format!("{}-{}", language, Uuid::new_v4()));
        std::fs::create_dir(&dir).map_err(|source| EvalError::Workspace {
            path: dir.clone(),
            source,
        })?;

        tracing::debug!(dir = %dir.display(), "workspace created");
        Ok(Self {
            dir,
            removed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Write `contents` to `file_name` inside the workspace
    pub fn stage(&self, file_name: &str, contents: &str) -> Result<PathBuf> {
        let path = self.dir.join(file_name);
        std::fs::write(&path, contents).map_err(|source| EvalError::Workspace {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }

    /// Remove the directory and everything in it; safe to call repeatedly
    pub fn remove(&mut self) {
        if self.removed {
            return;
        }
        self.removed = true;
        match std::fs::remove_dir_all(&self.dir) {
            Ok(()) => tracing::debug!(dir = %self.dir.display(), "workspace removed"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(dir = %self.dir.display(), error = %e, "failed to remove workspace")
            }
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        self.remove();
    }
}

/// Delete a generated file; a file that is already gone is not an error
pub fn remove_artifact(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => tracing::debug!(artifact = %path.display(), "artifact removed"),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!(artifact = %path.display(), error = %e, "failed to remove artifact")
        }
    }
}
