//! Per-job private directories.
//!
//! A workspace holds the source file, the compiled artifact, and the
//! rendered sandbox config for exactly one job. The guard removes the
//! tree on every exit path, including panics.

use std::fs;
use std::io;
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};

use tracing::warn;

/// Exclusive per-job directory, mode 0700, removed on drop.
#[derive(Debug)]
pub struct Workspace {
    path: PathBuf,
}

impl Workspace {
    pub fn create(jobs_root: &Path, job_id: &str) -> io::Result<Self> {
        fs::DirBuilder::new().recursive(true).create(jobs_root)?;
        let path = jobs_root.join(job_id);
        fs::DirBuilder::new().mode(0o700).create(&path)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write_file(&self, name: &str, contents: &[u8]) -> io::Result<PathBuf> {
        let path = self.path.join(name);
        fs::write(&path, contents)?;
        Ok(path)
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_dir_all(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Failed to clean up workspace"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    #[test]
    fn test_create_and_cleanup_on_drop() {
        let root = tempfile::tempdir().unwrap();
        let path = {
            let workspace = Workspace::create(root.path(), "job_test1").unwrap();
            workspace.write_file("main.py", b"print(1)").unwrap();
            assert!(workspace.path().join("main.py").exists());
            workspace.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn test_mode_is_private() {
        let root = tempfile::tempdir().unwrap();
        let workspace = Workspace::create(root.path(), "job_test2").unwrap();
        let mode = fs::metadata(workspace.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o700);
    }

    #[test]
    fn test_creates_missing_jobs_root() {
        let root = tempfile::tempdir().unwrap();
        let nested = root.path().join("deep/jobs");
        let workspace = Workspace::create(&nested, "job_test3").unwrap();
        assert!(workspace.path().starts_with(&nested));
    }

    #[test]
    fn test_drop_tolerates_already_removed() {
        let root = tempfile::tempdir().unwrap();
        let workspace = Workspace::create(root.path(), "job_test4").unwrap();
        fs::remove_dir_all(workspace.path()).unwrap();
        // Drop must not panic
    }
}
