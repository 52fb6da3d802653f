//! The set of host files copied into the staged container.
//!
//! A plan starts from candidate directories (the interpreter directory, its library search
//! paths, the environment directory and a few fixed extras). Candidates nested inside another
//! candidate are dropped, since walking the ancestor already covers them. The remaining roots are
//! walked in sorted order, following symlinks, and the notebook execution entrypoint is always
//! listed first.

use std::{
    collections::BTreeSet,
    fs,
    path::{Path, PathBuf},
};

use getset::Getters;
use walkdir::WalkDir;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The files to copy into the staged container.
#[derive(Debug, Clone, PartialEq, Getters)]
#[getset(get = "pub with_prefix")]
pub struct CopyPlan {
    /// A file copied ahead of everything else.
    entrypoint: PathBuf,

    /// Candidate directories with nested candidates removed, sorted.
    roots: Vec<PathBuf>,

    /// File extensions, with their leading dot, that are skipped.
    excluded_extensions: Vec<String>,
}

/// A group of files uploaded to the staged container as one archive.
#[derive(Debug, Clone, Default, PartialEq, Getters)]
#[getset(get = "pub with_prefix")]
pub struct FileBatch {
    /// The files in the batch, in plan order.
    files: Vec<PathBuf>,

    /// The combined size of the files.
    size: u64,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl CopyPlan {
    /// Builds a plan from candidate directories.
    ///
    /// Empty candidates are ignored and candidates below another candidate are dropped. Whether a
    /// root exists is only checked when files are listed.
    pub fn new(
        entrypoint: impl Into<PathBuf>,
        candidates: impl IntoIterator<Item = PathBuf>,
        excluded_extensions: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            entrypoint: entrypoint.into(),
            roots: collapse_nested(candidates),
            excluded_extensions: excluded_extensions.into_iter().collect(),
        }
    }

    /// Lists the files to copy. Each call walks the filesystem again.
    pub fn files(&self) -> impl Iterator<Item = PathBuf> + '_ {
        let walked = self
            .roots
            .iter()
            .filter(|root| root.exists())
            .flat_map(|root| {
                WalkDir::new(root)
                    .follow_links(true)
                    .sort_by_file_name()
                    .into_iter()
                    .filter_map(|entry| match entry {
                        Ok(entry) => Some(entry),
                        Err(e) => {
                            tracing::warn!("skipping unreadable entry while planning copy: {e}");
                            None
                        }
                    })
            })
            .filter(|entry| entry.file_type().is_file())
            .map(walkdir::DirEntry::into_path)
            .filter(|path| !self.is_excluded(path));

        std::iter::once(self.entrypoint.clone()).chain(walked)
    }

    /// Lists the files to copy together with their sizes.
    ///
    /// Files whose size cannot be read are skipped with a warning.
    pub fn sized_files(&self) -> impl Iterator<Item = (PathBuf, u64)> + '_ {
        self.files().filter_map(|path| match fs::metadata(&path) {
            Ok(metadata) => Some((path, metadata.len())),
            Err(e) => {
                tracing::warn!("skipping {} while planning copy: {e}", path.display());
                None
            }
        })
    }

    /// The combined size of all files to copy.
    pub fn total_size(&self) -> u64 {
        self.sized_files().map(|(_, size)| size).sum()
    }

    /// Splits the files to copy into batches of at most `max_batch_bytes`.
    pub fn batches(&self, max_batch_bytes: u64) -> Vec<FileBatch> {
        split_into_batches(self.sized_files(), max_batch_bytes)
    }

    fn is_excluded(&self, path: &Path) -> bool {
        let Some(extension) = path.extension() else {
            return false;
        };

        let extension = format!(".{}", extension.to_string_lossy());
        self.excluded_extensions.iter().any(|ex| *ex == extension)
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Removes empty paths and paths lying below another path, then sorts what is left.
///
/// The check is purely lexical; symlinks are not resolved.
pub fn collapse_nested(candidates: impl IntoIterator<Item = PathBuf>) -> Vec<PathBuf> {
    let unique: BTreeSet<PathBuf> = candidates
        .into_iter()
        .filter(|path| !path.as_os_str().is_empty())
        .collect();

    unique
        .iter()
        .filter(|path| {
            !unique
                .iter()
                .any(|other| other != *path && path.starts_with(other))
        })
        .cloned()
        .collect()
}

/// Groups files, in order, into batches whose size stays within `max_batch_bytes`.
///
/// A file that does not fit closes the current batch and starts the next one. A file larger than
/// the maximum gets a batch of its own.
pub fn split_into_batches(
    files: impl IntoIterator<Item = (PathBuf, u64)>,
    max_batch_bytes: u64,
) -> Vec<FileBatch> {
    let mut batches = Vec::new();
    let mut current = FileBatch::default();

    for (path, size) in files {
        if !current.files.is_empty() && current.size + size > max_batch_bytes {
            batches.push(std::mem::take(&mut current));
        }
        current.files.push(path);
        current.size += size;
    }

    if !current.files.is_empty() {
        batches.push(current);
    }

    batches
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
