// src/fs/mock.rs

use super::FileSystem;
use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
pub enum MockEntry {
    File(Vec<u8>),
    Dir,
}

/// In-memory filesystem for handler tests.
///
/// Flat map of absolute paths to entries; directory listings are derived from
/// path prefixes. `fail_on` marks paths whose operations always error, which
/// is how tests provoke partial batch failures deterministically.
#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    entries: Arc<Mutex<HashMap<PathBuf, MockEntry>>>,
    fail_on: Arc<Mutex<Vec<PathBuf>>>,
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) {
        let path = path.as_ref().to_path_buf();
        let mut entries = self.entries.lock().unwrap();
        Self::ensure_parents(&mut entries, &path);
        entries.insert(path, MockEntry::File(content.into()));
    }

    pub fn add_dir(&self, path: impl AsRef<Path>) {
        let path = path.as_ref().to_path_buf();
        let mut entries = self.entries.lock().unwrap();
        Self::ensure_parents(&mut entries, &path);
        entries.insert(path, MockEntry::Dir);
    }

    /// Every subsequent operation touching `path` fails.
    pub fn fail_on(&self, path: impl AsRef<Path>) {
        self.fail_on.lock().unwrap().push(path.as_ref().to_path_buf());
    }

    pub fn contains(&self, path: impl AsRef<Path>) -> bool {
        self.entries.lock().unwrap().contains_key(path.as_ref())
    }

    fn ensure_parents(entries: &mut HashMap<PathBuf, MockEntry>, path: &Path) {
        let mut current = path.parent();
        while let Some(parent) = current {
            if parent.as_os_str().is_empty() {
                break;
            }
            entries.entry(parent.to_path_buf()).or_insert(MockEntry::Dir);
            current = parent.parent();
        }
    }

    fn check_fail(&self, path: &Path) -> Result<()> {
        let failures = self.fail_on.lock().unwrap();
        if failures.iter().any(|p| path.starts_with(p)) {
            return Err(anyhow!("injected failure for {:?}", path));
        }
        Ok(())
    }
}

impl FileSystem for MockFileSystem {
    fn exists(&self, path: &Path) -> bool {
        self.entries.lock().unwrap().contains_key(path)
    }

    fn is_file(&self, path: &Path) -> bool {
        matches!(
            self.entries.lock().unwrap().get(path),
            Some(MockEntry::File(_))
        )
    }

    fn is_dir(&self, path: &Path) -> bool {
        matches!(self.entries.lock().unwrap().get(path), Some(MockEntry::Dir))
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        self.check_fail(path)?;
        self.add_dir(path);
        Ok(())
    }

    fn copy_file(&self, src: &Path, dest: &Path) -> Result<u64> {
        self.check_fail(src)?;
        self.check_fail(dest)?;
        let content = {
            let entries = self.entries.lock().unwrap();
            match entries.get(src) {
                Some(MockEntry::File(content)) => content.clone(),
                Some(MockEntry::Dir) => return Err(anyhow!("Is a directory: {:?}", src)),
                None => return Err(anyhow!("File not found: {:?}", src)),
            }
        };
        let len = content.len() as u64;
        self.add_file(dest, content);
        Ok(len)
    }

    fn rename(&self, src: &Path, dest: &Path) -> Result<()> {
        self.check_fail(src)?;
        self.check_fail(dest)?;
        let mut entries = self.entries.lock().unwrap();
        if !entries.contains_key(src) {
            return Err(anyhow!("File not found: {:?}", src));
        }
        // Re-key the entry itself plus everything below it.
        let moved: Vec<(PathBuf, MockEntry)> = entries
            .iter()
            .filter(|(path, _)| path.starts_with(src))
            .map(|(path, entry)| {
                let suffix = path.strip_prefix(src).expect("prefix checked above");
                (dest.join(suffix), entry.clone())
            })
            .collect();
        entries.retain(|path, _| !path.starts_with(src));
        Self::ensure_parents(&mut entries, dest);
        for (path, entry) in moved {
            entries.insert(path, entry);
        }
        Ok(())
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        self.check_fail(path)?;
        let mut entries = self.entries.lock().unwrap();
        match entries.remove(path) {
            Some(MockEntry::File(_)) => Ok(()),
            Some(entry) => {
                entries.insert(path.to_path_buf(), entry);
                Err(anyhow!("Is a directory: {:?}", path))
            }
            None => Err(anyhow!("File not found: {:?}", path)),
        }
    }

    fn remove_dir_all(&self, path: &Path) -> Result<()> {
        self.check_fail(path)?;
        let mut entries = self.entries.lock().unwrap();
        if !entries.contains_key(path) {
            return Err(anyhow!("Not found: {:?}", path));
        }
        entries.retain(|p, _| !p.starts_with(path));
        Ok(())
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let entries = self.entries.lock().unwrap();
        if !matches!(entries.get(path), Some(MockEntry::Dir)) {
            return Err(anyhow!("Not a directory or not found: {:?}", path));
        }
        Ok(entries
            .keys()
            .filter(|p| p.parent() == Some(path))
            .cloned()
            .collect())
    }
}
