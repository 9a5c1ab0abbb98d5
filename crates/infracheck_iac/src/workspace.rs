//! Per-run working copies of a definition directory.
//!
//! Concurrent runs of the same definition must not share `.terraform/` or
//! state files, so each run applies from its own copy under a work root,
//! named after the run's unique environment name.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::error::{IacError, IacResult};

/// Engine-local files that must never be carried into a fresh copy.
fn is_engine_state(name: &str) -> bool {
    name == ".terraform"
        || name == ".terraform.tfstate.lock.info"
        || name.starts_with("terraform.tfstate")
}

/// Whether `dir` holds engine state worth destroying.
pub fn has_engine_state(dir: &Path) -> bool {
    dir.join("terraform.tfstate").exists()
        || dir.join(".terraform").exists()
}

/// Path of the working copy for `environment_name` under `work_root`.
pub fn working_copy_path(work_root: &Path, environment_name: &str) -> PathBuf {
    work_root.join(environment_name)
}

/// Copy `source` into `target`, skipping engine state.
///
/// Fails if `target` already exists, which would mean two runs share a name.
pub fn create_working_copy(source: &Path, target: &Path) -> IacResult<()> {
    if !source.is_dir() {
        return Err(IacError::Workspace(format!(
            "definition directory does not exist: {}",
            source.display()
        )));
    }
    if target.exists() {
        return Err(IacError::Workspace(format!(
            "working copy already exists: {}",
            target.display()
        )));
    }

    debug!("Copying {:?} to {:?}", source, target);
    fs::create_dir_all(target)?;

    let walker = WalkDir::new(source)
        .min_depth(1)
        .into_iter()
        .filter_entry(|e| !is_engine_state(&e.file_name().to_string_lossy()));

    for entry in walker {
        let entry = entry.map_err(|e| IacError::Workspace(e.to_string()))?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| IacError::Workspace(e.to_string()))?;
        let dest = target.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&dest)?;
        } else {
            fs::copy(entry.path(), &dest)?;
        }
    }

    Ok(())
}

/// Remove a working copy. Missing directories are not an error.
pub fn remove_working_copy(dir: &Path) -> IacResult<()> {
    match fs::remove_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
