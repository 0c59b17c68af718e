//! Fix handler contract and the footprint-guarded workspace handlers write through.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;

use crate::error::{CoreError, CoreResult};
use crate::issue::{FixDescriptor, Issue};

/// Applies one kind of fix to the repository.
///
/// Handlers are resolved per issue type when the plan is built. They must
/// only touch files through the provided [`FixWorkspace`].
#[async_trait]
pub trait FixHandler: Send + Sync {
    fn name(&self) -> &str;

    /// Whether this handler understands the descriptor.
    fn supports(&self, _fix: &FixDescriptor) -> bool {
        true
    }

    async fn apply(
        &self,
        issue: &Issue,
        fix: &FixDescriptor,
        workspace: &mut FixWorkspace,
    ) -> CoreResult<()>;
}

/// Repository view restricted to a task footprint.
///
/// Every read and write is checked against the footprint, so the checkpoint
/// taken before the task always covers what the handler changed.
#[derive(Debug)]
pub struct FixWorkspace {
    root: PathBuf,
    footprint: BTreeSet<PathBuf>,
    modified: BTreeSet<PathBuf>,
}

impl FixWorkspace {
    pub fn new(root: impl Into<PathBuf>, footprint: BTreeSet<PathBuf>) -> Self {
        let root = root.into();
        let footprint = footprint
            .into_iter()
            .map(|p| relative_to(&root, &p))
            .collect();
        Self {
            root,
            footprint,
            modified: BTreeSet::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn footprint(&self) -> &BTreeSet<PathBuf> {
        &self.footprint
    }

    /// Files written or removed so far.
    pub fn modified(&self) -> &BTreeSet<PathBuf> {
        &self.modified
    }

    pub fn exists(&self, path: impl AsRef<Path>) -> CoreResult<bool> {
        Ok(self.resolve(path.as_ref())?.1.is_file())
    }

    pub fn read_to_string(&self, path: impl AsRef<Path>) -> CoreResult<String> {
        let (_, absolute) = self.resolve(path.as_ref())?;
        Ok(fs::read_to_string(absolute)?)
    }

    pub fn write(&mut self, path: impl AsRef<Path>, contents: impl AsRef<[u8]>) -> CoreResult<()> {
        let (relative, absolute) = self.resolve(path.as_ref())?;
        if let Some(parent) = absolute.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&absolute, contents)?;
        self.modified.insert(relative);
        Ok(())
    }

    pub fn remove(&mut self, path: impl AsRef<Path>) -> CoreResult<()> {
        let (relative, absolute) = self.resolve(path.as_ref())?;
        if absolute.exists() {
            fs::remove_file(&absolute)?;
            self.modified.insert(relative);
        }
        Ok(())
    }

    fn resolve(&self, path: &Path) -> CoreResult<(PathBuf, PathBuf)> {
        let relative = relative_to(&self.root, path);
        if !self.footprint.contains(&relative) {
            return Err(CoreError::OutsideFootprint(path.to_path_buf()));
        }
        let absolute = self.root.join(&relative);
        Ok((relative, absolute))
    }
}

/// Normalize `path` to a root-relative path without `.` components.
///
/// Paths escaping the root through `..` are kept as-is so they never match a
/// footprint entry.
pub fn relative_to(root: &Path, path: &Path) -> PathBuf {
    let stripped = path.strip_prefix(root).unwrap_or(path);
    stripped
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_workspace_guards_footprint() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.html"), "<img>").unwrap();
        fs::write(dir.path().join("b.html"), "<img>").unwrap();

        let mut workspace = FixWorkspace::new(dir.path(), BTreeSet::from([PathBuf::from("a.html")]));
        assert_eq!(workspace.read_to_string("a.html").unwrap(), "<img>");
        assert_eq!(workspace.read_to_string("./a.html").unwrap(), "<img>");
        workspace.write("a.html", "<img alt=\"\">").unwrap();

        let err = workspace.write("b.html", "changed").unwrap_err();
        assert!(matches!(err, CoreError::OutsideFootprint(_)));
        assert!(matches!(workspace.read_to_string("b.html"), Err(CoreError::OutsideFootprint(_))));
        assert!(workspace.write("../escape.html", "x").is_err());

        assert_eq!(fs::read_to_string(dir.path().join("b.html")).unwrap(), "<img>");
        assert_eq!(workspace.modified().len(), 1);
    }

    #[test]
    fn test_absolute_paths_under_root_are_accepted() {
        let dir = TempDir::new().unwrap();
        let absolute = dir.path().join("src/new.ts");
        let mut workspace = FixWorkspace::new(dir.path(), BTreeSet::from([absolute.clone()]));

        assert!(!workspace.exists("src/new.ts").unwrap());
        workspace.write(&absolute, "export {}").unwrap();
        assert!(workspace.exists("src/new.ts").unwrap());
        workspace.remove("src/new.ts").unwrap();
        assert!(!absolute.exists());
    }
}
