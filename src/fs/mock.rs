// src/fs/mock.rs

use super::FileSystem;
use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
pub enum MockEntry {
    File(Vec<u8>),
    Dir(Vec<String>), // List of child names
}

/// In-memory filesystem for tests.
///
/// Setup helpers (`add_file`, `add_dir`) are free; every call through the
/// [`FileSystem`] mutating methods increments [`MockFileSystem::mutation_count`].
#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    files: Arc<Mutex<HashMap<PathBuf, MockEntry>>>,
    mutations: Arc<AtomicUsize>,
    fail_removals: Arc<AtomicBool>,
}

impl MockFileSystem {
    pub fn new() -> Self {
        let mut files = HashMap::new();
        // Ensure root exists
        files.insert(PathBuf::from("."), MockEntry::Dir(Vec::new()));

        Self {
            files: Arc::new(Mutex::new(files)),
            mutations: Arc::new(AtomicUsize::new(0)),
            fail_removals: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) {
        let path = path.as_ref().to_path_buf();
        let mut files = self.files.lock().unwrap();
        let parent = parent_of(&path);
        ensure_dir_entry(&mut files, &parent);
        link_child(&mut files, &parent, &path);
        files.insert(path, MockEntry::File(content.into()));
    }

    pub fn add_dir(&self, path: impl AsRef<Path>) {
        let mut files = self.files.lock().unwrap();
        ensure_dir_entry(&mut files, path.as_ref());
    }

    /// Contents of a file, if present.
    pub fn contents(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        let files = self.files.lock().unwrap();
        match files.get(path.as_ref()) {
            Some(MockEntry::File(content)) => Some(content.clone()),
            _ => None,
        }
    }

    /// Number of mutating [`FileSystem`] calls made so far.
    pub fn mutation_count(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }

    /// Make every subsequent `remove_*` call fail without touching anything.
    pub fn fail_removals(&self, fail: bool) {
        self.fail_removals.store(fail, Ordering::SeqCst);
    }

    fn record_mutation(&self) {
        self.mutations.fetch_add(1, Ordering::SeqCst);
    }

    fn check_removal_allowed(&self, path: &Path) -> Result<()> {
        if self.fail_removals.load(Ordering::SeqCst) {
            Err(anyhow!("Permission denied: {:?}", path))
        } else {
            Ok(())
        }
    }
}

impl FileSystem for MockFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        let files = self.files.lock().unwrap();
        match files.get(path) {
            Some(MockEntry::File(content)) => {
                String::from_utf8(content.clone()).map_err(|e| anyhow!("Invalid UTF-8: {}", e))
            }
            Some(MockEntry::Dir(_)) => Err(anyhow!("Is a directory: {:?}", path)),
            None => Err(anyhow!("File not found: {:?}", path)),
        }
    }

    fn exists(&self, path: &Path) -> bool {
        let files = self.files.lock().unwrap();
        files.contains_key(path)
    }

    fn is_file(&self, path: &Path) -> bool {
        let files = self.files.lock().unwrap();
        matches!(files.get(path), Some(MockEntry::File(_)))
    }

    fn is_dir(&self, path: &Path) -> bool {
        let files = self.files.lock().unwrap();
        matches!(files.get(path), Some(MockEntry::Dir(_)))
    }

    fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        self.record_mutation();
        self.add_file(path, contents);
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        self.record_mutation();
        let mut files = self.files.lock().unwrap();
        let entry = match files.remove(from) {
            Some(entry @ MockEntry::File(_)) => entry,
            Some(dir) => {
                files.insert(from.to_path_buf(), dir);
                return Err(anyhow!("Renaming directories is not supported: {:?}", from));
            }
            None => return Err(anyhow!("File not found: {:?}", from)),
        };
        unlink_child(&mut files, &parent_of(from), from);

        let parent = parent_of(to);
        ensure_dir_entry(&mut files, &parent);
        link_child(&mut files, &parent, to);
        files.insert(to.to_path_buf(), entry);
        Ok(())
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        self.record_mutation();
        self.check_removal_allowed(path)?;
        let mut files = self.files.lock().unwrap();
        match files.get(path) {
            Some(MockEntry::File(_)) => {
                files.remove(path);
                unlink_child(&mut files, &parent_of(path), path);
                Ok(())
            }
            Some(MockEntry::Dir(_)) => Err(anyhow!("Is a directory: {:?}", path)),
            None => Err(anyhow!("File not found: {:?}", path)),
        }
    }

    fn remove_dir_all(&self, path: &Path) -> Result<()> {
        self.record_mutation();
        self.check_removal_allowed(path)?;
        let mut files = self.files.lock().unwrap();
        if !files.contains_key(path) {
            return Err(anyhow!("Directory not found: {:?}", path));
        }
        files.retain(|key, _| !key.starts_with(path));
        unlink_child(&mut files, &parent_of(path), path);
        Ok(())
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        self.record_mutation();
        let mut files = self.files.lock().unwrap();
        if let Some(MockEntry::File(_)) = files.get(path) {
            return Err(anyhow!("File exists: {:?}", path));
        }
        ensure_dir_entry(&mut files, path);
        Ok(())
    }
}

fn parent_of(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn ensure_dir_entry(files: &mut HashMap<PathBuf, MockEntry>, path: &Path) {
    if files.contains_key(path) {
        return;
    }
    files.insert(path.to_path_buf(), MockEntry::Dir(Vec::new()));

    let parent = parent_of(path);
    if parent != path {
        // Avoid infinite loop at root
        ensure_dir_entry(files, &parent);
        link_child(files, &parent, path);
    }
}

fn link_child(files: &mut HashMap<PathBuf, MockEntry>, parent: &Path, child: &Path) {
    if let (Some(MockEntry::Dir(children)), Some(name)) =
        (files.get_mut(parent), child.file_name().and_then(|n| n.to_str()))
    {
        if !children.iter().any(|c| c == name) {
            children.push(name.to_string());
        }
    }
}

fn unlink_child(files: &mut HashMap<PathBuf, MockEntry>, parent: &Path, child: &Path) {
    if let (Some(MockEntry::Dir(children)), Some(name)) =
        (files.get_mut(parent), child.file_name().and_then(|n| n.to_str()))
    {
        children.retain(|c| c != name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setup_helpers_do_not_count_as_mutations() {
        let fs = MockFileSystem::new();
        fs.add_file("install/bin/worker", b"bin".to_vec());
        assert!(fs.is_dir(Path::new("install")));
        assert!(fs.is_dir(Path::new("install/bin")));
        assert_eq!(fs.mutation_count(), 0);
    }

    #[test]
    fn remove_dir_all_drops_whole_subtree() {
        let fs = MockFileSystem::new();
        fs.add_file("install/version.txt", b"1".to_vec());
        fs.add_file("install/bin/worker", b"bin".to_vec());
        fs.add_file("other/keep.txt", b"k".to_vec());

        fs.remove_dir_all(Path::new("install")).unwrap();

        assert!(!fs.exists(Path::new("install")));
        assert!(!fs.exists(Path::new("install/bin/worker")));
        assert!(fs.is_file(Path::new("other/keep.txt")));
        assert_eq!(fs.mutation_count(), 1);
    }

    #[test]
    fn rename_moves_file() {
        let fs = MockFileSystem::new();
        fs.write(Path::new("d/a.tmp"), b"x").unwrap();
        fs.rename(Path::new("d/a.tmp"), Path::new("d/a")).unwrap();
        assert!(!fs.exists(Path::new("d/a.tmp")));
        assert_eq!(fs.read_to_string(Path::new("d/a")).unwrap(), "x");
    }

    #[test]
    fn failing_removals_leave_tree_intact() {
        let fs = MockFileSystem::new();
        fs.add_file("install/version.txt", b"1".to_vec());
        fs.fail_removals(true);
        assert!(fs.remove_dir_all(Path::new("install")).is_err());
        assert!(fs.exists(Path::new("install/version.txt")));
    }
}
