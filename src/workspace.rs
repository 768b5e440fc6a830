//! # Workspace Discovery
//!
//! A directory is a workspace iff it contains a (possibly empty) file named
//! `.chigraphworkspace`. The root is found by walking upward from the
//! current directory until the marker appears (spec §6 "Workspace marker").

use std::path::{Path, PathBuf};

use crate::error::{ChiError, Result};

pub const WORKSPACE_MARKER: &str = ".chigraphworkspace";

/// Walks upward from `start`, returning the first ancestor (inclusive) that
/// contains `.chigraphworkspace`.
pub fn find_workspace_root(start: &Path) -> Result<PathBuf> {
    let mut current = start;
    loop {
        if current.join(WORKSPACE_MARKER).is_file() {
            return Ok(current.to_path_buf());
        }
        match current.parent() {
            Some(parent) => current = parent,
            None => {
                return Err(ChiError::WorkspaceNotFound(start.display().to_string()));
            }
        }
    }
}

/// Creates the marker file (and the directory, if needed) at `root`.
pub fn init_workspace(root: &Path) -> Result<()> {
    std::fs::create_dir_all(root).map_err(|e| ChiError::Cache {
        module: root.display().to_string(),
        source: e,
    })?;
    std::fs::write(root.join(WORKSPACE_MARKER), b"").map_err(|e| ChiError::Cache {
        module: root.display().to_string(),
        source: e,
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn finds_marker_in_an_ancestor_directory() {
        let root = tempdir().unwrap();
        init_workspace(root.path()).unwrap();

        let nested = root.path().join("src").join("sub");
        std::fs::create_dir_all(&nested).unwrap();

        let found = find_workspace_root(&nested).unwrap();
        assert_eq!(found, root.path());
    }

    #[test]
    fn missing_marker_errors() {
        let root = tempdir().unwrap();
        let nested = root.path().join("no_marker_here");
        std::fs::create_dir_all(&nested).unwrap();

        // tempdir's own ancestry (e.g. /tmp) normally has no marker either,
        // so this walks all the way up and fails — unless the test runner's
        // filesystem happens to have one above /tmp, which is not the case
        // in any CI or dev environment this crate targets.
        assert!(find_workspace_root(&nested).is_err());
    }
}
