use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Directory names under the project root that patch targets may never live in.
pub const FORBIDDEN_DIRS: &[&str] = &["node_modules", ".git", "target", "dist"];

/// Keeps patch targets inside the project root.
///
/// Filenames arriving over the wire come from the build-time tagger and are
/// resolved against the root; anything that canonicalizes outside of it, or
/// into a dependency/build directory, is refused before the file is read.
#[derive(Debug, Clone)]
pub struct WorkspaceGuard {
    /// Canonical path to the project root
    workspace_root: PathBuf,
    forbidden_dirs: Vec<String>,
}

#[derive(Error, Debug)]
pub enum SafetyError {
    #[error("path is outside workspace: {path} (workspace: {workspace})")]
    OutsideWorkspace { path: PathBuf, workspace: PathBuf },

    #[error("path is inside forbidden directory `{dir}`: {path}")]
    ForbiddenPath { path: PathBuf, dir: String },

    #[error("failed to resolve {path}: {source}")]
    Canonicalize {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl WorkspaceGuard {
    /// Create a guard rooted at `workspace_root` (canonicalized, so symlinked
    /// roots compare correctly).
    pub fn new(workspace_root: impl AsRef<Path>) -> Result<Self, SafetyError> {
        Self::with_forbidden(
            workspace_root,
            FORBIDDEN_DIRS.iter().map(|d| d.to_string()).collect(),
        )
    }

    pub fn with_forbidden(
        workspace_root: impl AsRef<Path>,
        forbidden_dirs: Vec<String>,
    ) -> Result<Self, SafetyError> {
        let root = workspace_root.as_ref();
        let workspace_root = root.canonicalize().map_err(|source| SafetyError::Canonicalize {
            path: root.to_path_buf(),
            source,
        })?;
        Ok(Self {
            workspace_root,
            forbidden_dirs,
        })
    }

    /// Resolve `path` (relative paths are joined onto the root) and check it.
    ///
    /// Returns the canonical absolute path if it is safe to patch.
    pub fn validate_path(&self, path: impl AsRef<Path>) -> Result<PathBuf, SafetyError> {
        let path = path.as_ref();

        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workspace_root.join(path)
        };

        // Canonicalize to resolve symlinks and .. components
        let canonical = absolute
            .canonicalize()
            .map_err(|source| SafetyError::Canonicalize {
                path: absolute.clone(),
                source,
            })?;

        self.check_canonical(&canonical)?;

        Ok(canonical)
    }

    fn check_canonical(&self, canonical: &Path) -> Result<(), SafetyError> {
        let relative = canonical
            .strip_prefix(&self.workspace_root)
            .map_err(|_| SafetyError::OutsideWorkspace {
                path: canonical.to_path_buf(),
                workspace: self.workspace_root.clone(),
            })?;

        for component in relative.components() {
            if let Component::Normal(name) = component {
                if let Some(dir) = self.forbidden_dirs.iter().find(|d| name == d.as_str()) {
                    return Err(SafetyError::ForbiddenPath {
                        path: canonical.to_path_buf(),
                        dir: dir.clone(),
                    });
                }
            }
        }

        Ok(())
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }
}
