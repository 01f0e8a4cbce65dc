// ABOUTME: Enumeration of candidate key files in an SSH directory.
// ABOUTME: A KeySource lists and reads files; a KeyFileMatcher decides which ones are keys.

use crate::error::{HostAuthError, Result};
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Conventional private key file names, in no particular order.
pub const PRIVATE_KEY_NAMES: [&str; 4] = ["id_rsa", "id_dsa", "id_ecdsa", "id_ed25519"];

/// A single entry in a key directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyFileEntry {
    pub path: PathBuf,
    pub file_name: String,
    /// Regular file (after following symlinks).
    pub is_file: bool,
}

/// A directory of SSH key material.
///
/// The core never writes through a source. Listings are sorted by file name
/// so that "first match wins" is the same on every platform.
pub trait KeySource: Send + Sync {
    /// Directory reported in errors and diagnostics.
    fn location(&self) -> &Path;

    /// List every entry, sorted lexicographically by file name.
    fn entries(&self) -> Result<Vec<KeyFileEntry>>;

    /// Whether the current process can open `entry` for reading. Only asked
    /// about entries a matcher already accepted.
    fn is_readable(&self, entry: &KeyFileEntry) -> bool;

    /// Read a file by name. Returns `Ok(None)` if it does not exist.
    ///
    /// Bytes that are not valid UTF-8 are replaced with U+FFFD.
    fn read_file(&self, file_name: &str) -> Result<Option<String>>;
}

/// Pure predicate selecting key files from a listing.
pub trait KeyFileMatcher: Send + Sync {
    fn matches(&self, entry: &KeyFileEntry) -> bool;
}

impl<F> KeyFileMatcher for F
where
    F: Fn(&KeyFileEntry) -> bool + Send + Sync,
{
    fn matches(&self, entry: &KeyFileEntry) -> bool {
        self(entry)
    }
}

/// Matches regular files whose name is exactly one of a fixed set.
#[derive(Debug, Clone)]
pub struct KeyNameMatcher {
    names: Vec<String>,
}

impl KeyNameMatcher {
    pub fn new<I, N>(names: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// `id_rsa`, `id_dsa`, `id_ecdsa`, `id_ed25519`.
    pub fn private_keys() -> Self {
        Self::new(PRIVATE_KEY_NAMES)
    }

    /// The private key names with a `.pub` suffix.
    pub fn public_keys() -> Self {
        Self::new(PRIVATE_KEY_NAMES.iter().map(|name| format!("{name}.pub")))
    }
}

impl KeyFileMatcher for KeyNameMatcher {
    fn matches(&self, entry: &KeyFileEntry) -> bool {
        entry.is_file && self.names.iter().any(|n| *n == entry.file_name)
    }
}

/// Ordered list of readable entries accepted by `matcher`.
pub fn candidate_files(
    source: &dyn KeySource,
    matcher: &dyn KeyFileMatcher,
) -> Result<Vec<KeyFileEntry>> {
    Ok(source
        .entries()?
        .into_iter()
        .filter(|entry| matcher.matches(entry))
        .filter(|entry| {
            let readable = source.is_readable(entry);
            if !readable {
                debug!("skipping unreadable key file {}", entry.path.display());
            }
            readable
        })
        .collect())
}

/// Key files on the local filesystem.
#[derive(Debug, Clone)]
pub struct DirKeySource {
    dir: PathBuf,
}

impl DirKeySource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl KeySource for DirKeySource {
    fn location(&self) -> &Path {
        &self.dir
    }

    fn entries(&self) -> Result<Vec<KeyFileEntry>> {
        let read_dir = match std::fs::read_dir(&self.dir) {
            Ok(read_dir) => read_dir,
            // A missing directory simply holds no keys
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("SSH directory {} does not exist", self.dir.display());
                return Ok(Vec::new());
            }
            Err(e) => {
                return Err(HostAuthError::ListDirectory {
                    path: self.dir.clone(),
                    source: e,
                })
            }
        };

        let mut entries = Vec::new();
        for dir_entry in read_dir {
            let dir_entry = dir_entry.map_err(|e| HostAuthError::ListDirectory {
                path: self.dir.clone(),
                source: e,
            })?;
            let path = dir_entry.path();
            let Some(file_name) = dir_entry.file_name().to_str().map(str::to_string) else {
                debug!("skipping non-UTF-8 file name {}", path.display());
                continue;
            };

            // Dangling symlinks and races with deletion count as non-files
            let is_file = std::fs::metadata(&path)
                .map(|m| m.is_file())
                .unwrap_or(false);

            entries.push(KeyFileEntry {
                path,
                file_name,
                is_file,
            });
        }

        entries.sort_by(|a, b| a.file_name.cmp(&b.file_name));
        Ok(entries)
    }

    fn is_readable(&self, entry: &KeyFileEntry) -> bool {
        entry.is_file && std::fs::File::open(&entry.path).is_ok()
    }

    fn read_file(&self, file_name: &str) -> Result<Option<String>> {
        let path = self.dir.join(file_name);
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(HostAuthError::ReadKey { path, source: e }),
        }
    }
}

#[derive(Debug, Clone)]
enum MemoryEntry {
    File(String),
    Unreadable,
    Directory,
}

/// In-memory key directory for tests and callers that keep keys elsewhere.
#[derive(Debug, Clone)]
pub struct MemoryKeySource {
    location: PathBuf,
    entries: BTreeMap<String, MemoryEntry>,
}

impl Default for MemoryKeySource {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryKeySource {
    pub fn new() -> Self {
        Self {
            location: PathBuf::from("<memory>"),
            entries: BTreeMap::new(),
        }
    }

    /// Add a readable regular file.
    pub fn with_file(mut self, name: impl Into<String>, contents: impl Into<String>) -> Self {
        self.entries
            .insert(name.into(), MemoryEntry::File(contents.into()));
        self
    }

    /// Add a regular file the process may not read.
    pub fn with_unreadable_file(mut self, name: impl Into<String>) -> Self {
        self.entries.insert(name.into(), MemoryEntry::Unreadable);
        self
    }

    /// Add a subdirectory entry.
    pub fn with_directory(mut self, name: impl Into<String>) -> Self {
        self.entries.insert(name.into(), MemoryEntry::Directory);
        self
    }
}

impl KeySource for MemoryKeySource {
    fn location(&self) -> &Path {
        &self.location
    }

    fn entries(&self) -> Result<Vec<KeyFileEntry>> {
        // BTreeMap iteration is already sorted by name
        Ok(self
            .entries
            .iter()
            .map(|(name, entry)| KeyFileEntry {
                path: self.location.join(name),
                file_name: name.clone(),
                is_file: !matches!(entry, MemoryEntry::Directory),
            })
            .collect())
    }

    fn is_readable(&self, entry: &KeyFileEntry) -> bool {
        matches!(
            self.entries.get(&entry.file_name),
            Some(MemoryEntry::File(_))
        )
    }

    fn read_file(&self, file_name: &str) -> Result<Option<String>> {
        let source = match self.entries.get(file_name) {
            None => return Ok(None),
            Some(MemoryEntry::File(contents)) => return Ok(Some(contents.clone())),
            Some(MemoryEntry::Unreadable) => {
                io::Error::new(io::ErrorKind::PermissionDenied, "permission denied")
            }
            Some(MemoryEntry::Directory) => io::Error::new(io::ErrorKind::Other, "is a directory"),
        };
        Err(HostAuthError::ReadKey {
            path: self.location.join(file_name),
            source,
        })
    }
}
