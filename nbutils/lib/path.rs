//! `nbutils::path` is a module containing path utilities for the nbcontainer project.
//!
//! Notebook paths arrive from clients as strings relative to a notebook root. These helpers turn
//! them into filesystem paths without letting `..` components escape the root, and turn absolute
//! paths back into root-relative strings for reporting.

use std::path::{Path, PathBuf};

use typed_path::{Utf8UnixComponent, Utf8UnixPathBuf};

use crate::{NbutilsError, NbutilsResult};

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Normalizes a client supplied path into a clean relative path.
///
/// Leading separators are ignored, so `/work/nb.ipynb` and `work/nb.ipynb` are the same path.
/// `.` components and repeated separators are dropped and `..` is resolved lexically.
///
/// ## Errors
///
/// Returns [`NbutilsError::PathValidation`] if the path is empty or if a `..` component would
/// climb above the root.
///
/// ## Examples
///
/// ```
/// use nbutils::normalize_relative;
///
/// assert_eq!(normalize_relative("/work//a/../nb.ipynb").unwrap(), "work/nb.ipynb");
/// assert!(normalize_relative("../etc/passwd").is_err());
/// ```
pub fn normalize_relative(path: &str) -> NbutilsResult<String> {
    let trimmed = path.trim_start_matches('/');
    if trimmed.is_empty() {
        return Err(NbutilsError::PathValidation(
            "path cannot be empty".to_string(),
        ));
    }

    let mut parts: Vec<&str> = Vec::new();
    let unix_path = Utf8UnixPathBuf::from(trimmed);
    for component in unix_path.components() {
        match component {
            Utf8UnixComponent::RootDir | Utf8UnixComponent::CurDir => continue,
            Utf8UnixComponent::ParentDir => {
                if parts.pop().is_none() {
                    return Err(NbutilsError::PathValidation(format!(
                        "path {path} traverses above its root"
                    )));
                }
            }
            Utf8UnixComponent::Normal(part) => parts.push(part),
        }
    }

    if parts.is_empty() {
        return Err(NbutilsError::PathValidation(format!(
            "path {path} does not name anything below its root"
        )));
    }

    Ok(parts.join("/"))
}

/// Resolves a client supplied path against `root`, refusing paths that escape it.
pub fn resolve_within(root: &Path, path: &str) -> NbutilsResult<PathBuf> {
    Ok(root.join(normalize_relative(path)?))
}

/// Expresses `path` relative to `root`.
///
/// Only paths strictly below `root` are converted; `root` itself and unrelated paths produce
/// [`NbutilsError::OutsideRoot`].
pub fn relative_to_root(root: &Path, path: &Path) -> NbutilsResult<String> {
    match path.strip_prefix(root) {
        Ok(relative) if !relative.as_os_str().is_empty() => {
            Ok(relative.to_string_lossy().into_owned())
        }
        _ => Err(NbutilsError::OutsideRoot {
            path: path.display().to_string(),
            root: root.display().to_string(),
        }),
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
