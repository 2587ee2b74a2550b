//! Local directory enumeration
//!
//! Lazily walks a directory tree and yields one [`FileDescriptor`] per
//! regular file. Traversal is fail-fast: the first unreadable entry or
//! symlink loop ends the walk with an error instead of silently dropping
//! part of the tree.

use crate::error::{Result, SyncError};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;
use walkdir::{DirEntry, WalkDir};

/// Metadata for a single local file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDescriptor {
    /// Path relative to the enumeration root, `/`-separated
    pub relative_path: String,
    /// Absolute path on disk
    pub absolute_path: PathBuf,
    /// File size in bytes
    pub size: u64,
    /// Modification time
    pub modified: SystemTime,
    /// The file itself or one of its directories below the root is a symlink
    pub is_symlink: bool,
}

impl FileDescriptor {
    fn from_entry(entry: &DirEntry, root: &Path, under_link: bool) -> Result<Self> {
        let metadata = entry.metadata()?;
        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());

        Ok(Self {
            relative_path: to_key_path(relative),
            absolute_path: entry.path().to_path_buf(),
            size: metadata.len(),
            modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            is_symlink: under_link || entry.path_is_symlink(),
        })
    }
}

/// Join path components with `/` regardless of platform
pub fn to_key_path(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Walks a local directory tree
#[derive(Debug, Clone)]
pub struct FileEnumerator {
    root: PathBuf,
    follow_symlinks: bool,
}

impl FileEnumerator {
    /// Create an enumerator rooted at `root`
    pub fn new(root: impl Into<PathBuf>, follow_symlinks: bool) -> Self {
        Self {
            root: root.into(),
            follow_symlinks,
        }
    }

    /// Root being enumerated
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Start a lazy walk
    ///
    /// Fails with [`SyncError::DirectoryNotFound`] when the root is missing
    /// or is not a directory.
    pub fn files(&self) -> Result<Files> {
        if !self.root.is_dir() {
            return Err(SyncError::DirectoryNotFound(self.root.clone()));
        }

        let walker = WalkDir::new(&self.root)
            .follow_links(self.follow_symlinks)
            .sort_by_file_name();

        Ok(Files {
            root: self.root.clone(),
            follow_symlinks: self.follow_symlinks,
            inner: walker.into_iter(),
            linked_dirs: Vec::new(),
            done: false,
        })
    }

    /// Walk the whole tree, stopping at the first error
    pub fn collect(&self) -> Result<Vec<FileDescriptor>> {
        self.files()?.collect()
    }
}

/// Lazy iterator over the regular files of a tree
pub struct Files {
    root: PathBuf,
    follow_symlinks: bool,
    inner: walkdir::IntoIter,
    /// Followed directory links enclosing the current entry, outermost first
    linked_dirs: Vec<PathBuf>,
    done: bool,
}

impl Iterator for Files {
    type Item = Result<FileDescriptor>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        loop {
            let entry = match self.inner.next()? {
                Ok(entry) => entry,
                Err(err) => {
                    self.done = true;
                    return Some(Err(SyncError::from(err)));
                }
            };

            // Without follow mode walkdir reports links as links; they are
            // neither descended into nor uploaded.
            if !self.follow_symlinks && entry.path_is_symlink() {
                tracing::debug!("Skipping symlink {}", entry.path().display());
                continue;
            }

            // Depth-first order: links that are not ancestors are finished
            while let Some(link) = self.linked_dirs.last() {
                if entry.path().starts_with(link) {
                    break;
                }
                self.linked_dirs.pop();
            }

            if entry.file_type().is_dir() {
                if entry.depth() > 0 && entry.path_is_symlink() {
                    self.linked_dirs.push(entry.path().to_path_buf());
                }
                continue;
            }

            if !entry.file_type().is_file() {
                continue;
            }

            let under_link = !self.linked_dirs.is_empty();
            let descriptor = FileDescriptor::from_entry(&entry, &self.root, under_link);
            if descriptor.is_err() {
                self.done = true;
            }
            return Some(descriptor);
        }
    }
}

/// Total size of a set of descriptors
pub fn total_size(files: &[FileDescriptor]) -> u64 {
    files.iter().map(|f| f.size).sum()
}
