// src/fs/mock.rs

use super::FileSystem;
use anyhow::{anyhow, bail, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct MockState {
    files: BTreeMap<PathBuf, Vec<u8>>,
    dirs: BTreeSet<PathBuf>,
    /// When set, every mutating call fails (simulates a read-only volume).
    read_only: bool,
    writes: usize,
}

/// In-memory filesystem for tests.
///
/// Directories are created implicitly for every file added. Clones share the
/// same underlying state.
#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    state: Arc<Mutex<MockState>>,
}

fn parent_of(path: &Path) -> Option<PathBuf> {
    match path.parent() {
        Some(p) if p.as_os_str().is_empty() => Some(PathBuf::from(".")),
        Some(p) => Some(p.to_path_buf()),
        None => None,
    }
}

impl MockFileSystem {
    pub fn new() -> Self {
        let fs = Self::default();
        fs.lock().dirs.insert(PathBuf::from("."));
        fs
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) {
        let path = path.as_ref().to_path_buf();
        let mut state = self.lock();
        Self::ensure_parents(&mut state, &path);
        state.files.insert(path, content.into());
    }

    pub fn add_dir(&self, path: impl AsRef<Path>) {
        let path = path.as_ref().to_path_buf();
        let mut state = self.lock();
        Self::ensure_parents(&mut state, &path);
        state.dirs.insert(path);
    }

    /// Make every subsequent write/rename/remove fail.
    pub fn set_read_only(&self, read_only: bool) {
        self.lock().read_only = read_only;
    }

    /// Number of successful `write` calls so far.
    pub fn write_count(&self) -> usize {
        self.lock().writes
    }

    pub fn file_contents(&self, path: impl AsRef<Path>) -> Option<String> {
        self.lock()
            .files
            .get(path.as_ref())
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }

    fn ensure_parents(state: &mut MockState, path: &Path) {
        let mut current = parent_of(path);
        while let Some(dir) = current {
            if !state.dirs.insert(dir.clone()) {
                break;
            }
            current = parent_of(&dir);
        }
    }
}

impl FileSystem for MockFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        let state = self.lock();
        match state.files.get(path) {
            Some(content) => {
                String::from_utf8(content.clone()).map_err(|e| anyhow!("Invalid UTF-8: {}", e))
            }
            None if state.dirs.contains(path) => Err(anyhow!("Is a directory: {:?}", path)),
            None => Err(anyhow!("File not found: {:?}", path)),
        }
    }

    fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        let mut state = self.lock();
        if state.read_only {
            bail!("read-only filesystem: cannot write {:?}", path);
        }
        Self::ensure_parents(&mut state, path);
        state.files.insert(path.to_path_buf(), contents.to_vec());
        state.writes += 1;
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        let mut state = self.lock();
        if state.read_only {
            bail!("read-only filesystem: cannot rename {:?}", from);
        }
        let content = state
            .files
            .remove(from)
            .ok_or_else(|| anyhow!("File not found: {:?}", from))?;
        Self::ensure_parents(&mut state, to);
        state.files.insert(to.to_path_buf(), content);
        Ok(())
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        let mut state = self.lock();
        if state.read_only {
            bail!("read-only filesystem: cannot remove {:?}", path);
        }
        state
            .files
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| anyhow!("File not found: {:?}", path))
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        let mut state = self.lock();
        if state.read_only {
            bail!("read-only filesystem: cannot create {:?}", path);
        }
        Self::ensure_parents(&mut state, path);
        state.dirs.insert(path.to_path_buf());
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        let state = self.lock();
        state.files.contains_key(path) || state.dirs.contains(path)
    }

    fn is_file(&self, path: &Path) -> bool {
        self.lock().files.contains_key(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.lock().dirs.contains(path)
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let state = self.lock();
        if !state.dirs.contains(path) {
            bail!("Not a directory or not found: {:?}", path);
        }
        let children = state
            .files
            .keys()
            .chain(state.dirs.iter())
            .filter(|p| p.as_path() != path && parent_of(p).as_deref() == Some(path))
            .cloned()
            .collect::<BTreeSet<_>>();
        Ok(children.into_iter().collect())
    }
}
