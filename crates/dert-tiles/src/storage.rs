//! Storage backends holding landscape files.
//!
//! The tile store never touches the file system directly; it goes through a
//! [`Storage`] so a landscape can live anywhere that can answer "does this
//! file exist" and "give me its bytes". Paths are relative to the landscape
//! root and always use `/` separators.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// An entry returned by [`Storage::list_dir`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEntry {
    /// File or directory name (no path).
    pub name: String,
    /// Whether the entry is a directory.
    pub is_dir: bool,
}

/// Read/write access to the files of one landscape.
///
/// Implementations must be shareable across threads: the tile store reads
/// from the caller's thread and writes the existence-tree cache from a
/// background worker.
pub trait Storage: Send + Sync + 'static {
    /// Human-readable location of the landscape, for logs.
    fn location(&self) -> String;

    /// Whether the landscape root is a directory.
    fn root_is_dir(&self) -> bool;

    /// Whether a file exists. Errors count as "does not exist".
    fn exists(&self, path: &str) -> bool;

    /// List a directory, `""` being the landscape root.
    fn list_dir(&self, path: &str) -> io::Result<Vec<StorageEntry>>;

    /// Read a whole file.
    fn read(&self, path: &str) -> io::Result<Vec<u8>>;

    /// Replace a file's contents, creating parent directories as needed.
    ///
    /// Readers must never observe a partially written file.
    fn write(&self, path: &str, contents: &[u8]) -> io::Result<()>;
}

/// A landscape stored in a local directory.
#[derive(Debug, Clone)]
pub struct FileSystemStorage {
    root: PathBuf,
}

impl FileSystemStorage {
    /// Resolve a landscape location to its canonical directory.
    ///
    /// Returns `None` when the location does not exist or cannot be resolved.
    pub fn connect<P: AsRef<Path>>(location: P) -> Option<Self> {
        let location = location.as_ref();
        match location.canonicalize() {
            Ok(root) => Some(Self { root }),
            Err(e) => {
                tracing::debug!(location = %location.display(), error = %e, "landscape location not reachable");
                None
            }
        }
    }

    /// Canonical landscape root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let mut full = self.root.clone();
        full.extend(path.split('/').filter(|segment| !segment.is_empty()));
        full
    }
}

impl Storage for FileSystemStorage {
    fn location(&self) -> String {
        self.root.display().to_string()
    }

    fn root_is_dir(&self) -> bool {
        self.root.is_dir()
    }

    fn exists(&self, path: &str) -> bool {
        self.resolve(path).exists()
    }

    fn list_dir(&self, path: &str) -> io::Result<Vec<StorageEntry>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(self.resolve(path))? {
            let entry = entry?;
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            // Follows symlinks, so linked layer directories count.
            let is_dir = entry.path().is_dir();
            entries.push(StorageEntry { name, is_dir });
        }
        Ok(entries)
    }

    fn read(&self, path: &str) -> io::Result<Vec<u8>> {
        fs::read(self.resolve(path))
    }

    fn write(&self, path: &str, contents: &[u8]) -> io::Result<()> {
        let target = self.resolve(path);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut tmp_name = target.file_name().unwrap_or_default().to_os_string();
        tmp_name.push(".tmp");
        let tmp = target.with_file_name(tmp_name);
        fs::write(&tmp, contents)?;
        fs::rename(&tmp, &target)
    }
}
