// SPDX-License-Identifier: Apache-2.0

//! Workspace materialization. The per-job directory is derived state:
//! deleting it is always safe, and any later access rebuilds it from the
//! job record.

use std::path::{Component, Path, PathBuf};
use vda_model::FileArtifact;

#[derive(Debug, thiserror::Error)]
pub(crate) enum WorkspaceError {
    #[error("invalid artifact path: {0}")]
    InvalidPath(String),
    #[error("workspace io failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Write every artifact under `<root>/<job_id>`. Rejects any path whose
/// resolved location would escape the workspace prefix.
pub(crate) fn materialize(
    root: &Path,
    job_id: &str,
    files: &[FileArtifact],
) -> Result<PathBuf, WorkspaceError> {
    let workspace = root.join(job_id);
    create_dir_all_mode(&workspace)?;

    for file in files {
        let Some(rel) = clean_relative(&file.path) else {
            return Err(WorkspaceError::InvalidPath(file.path.clone()));
        };
        if rel.as_os_str().is_empty() {
            continue;
        }
        let abs = workspace.join(&rel);
        if !abs.starts_with(&workspace) {
            return Err(WorkspaceError::InvalidPath(file.path.clone()));
        }
        if let Some(parent) = abs.parent() {
            create_dir_all_mode(parent)?;
        }
        std::fs::write(&abs, file.content.as_bytes())?;
        set_file_mode(&abs)?;
    }
    Ok(workspace)
}

/// Normalize to a strictly relative path: leading slashes are stripped,
/// `.` components dropped, and any `..` or prefix component rejected.
fn clean_relative(raw: &str) -> Option<PathBuf> {
    let trimmed = raw.trim().trim_start_matches('/');
    let mut out = PathBuf::new();
    for component in Path::new(trimmed).components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(out)
}

fn create_dir_all_mode(path: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(path)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))?;
    }
    Ok(())
}

fn set_file_mode(path: &Path) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o644))?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{clean_relative, materialize, WorkspaceError};
    use std::path::PathBuf;
    use vda_model::FileArtifact;

    fn file(path: &str) -> FileArtifact {
        FileArtifact {
            path: path.to_string(),
            language: "text".to_string(),
            content: "x".to_string(),
        }
    }

    #[test]
    fn traversal_components_are_rejected() {
        assert!(clean_relative("../etc/passwd").is_none());
        assert!(clean_relative("a/../../b").is_none());
        assert_eq!(clean_relative("/a/./b"), Some(PathBuf::from("a/b")));
    }

    #[test]
    fn materialize_writes_within_workspace_only() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = materialize(dir.path(), "job_1", &[file("apps/demo/README.md")])
            .expect("materialize");
        assert!(path.join("apps/demo/README.md").is_file());

        let err = materialize(dir.path(), "job_2", &[file("../escape.txt")])
            .expect_err("must reject traversal");
        assert!(matches!(err, WorkspaceError::InvalidPath(_)));
        assert!(!dir.path().join("escape.txt").exists());
    }
}
