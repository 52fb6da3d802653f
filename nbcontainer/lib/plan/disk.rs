use std::path::{Path, PathBuf};

use getset::Getters;
use nbutils::format_size;
use nix::sys::statvfs::statvfs;

use crate::{config::BudgetConfig, NbContainerError, NbContainerResult};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Decides whether the host has room for a containerization.
///
/// Copied data ends up in both the staged container and the committed image, so the requirement
/// is `duplication_factor * bytes_to_copy + safety_margin_bytes` of free space on the filesystem
/// holding `path`.
#[derive(Debug, Clone, PartialEq, Getters)]
#[getset(get = "pub with_prefix")]
pub struct DiskBudget {
    path: PathBuf,
    duplication_factor: f64,
    safety_margin_bytes: u64,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl DiskBudget {
    /// Creates a budget checker.
    pub fn new(path: impl Into<PathBuf>, duplication_factor: f64, safety_margin_bytes: u64) -> Self {
        Self {
            path: path.into(),
            duplication_factor,
            safety_margin_bytes,
        }
    }

    /// The free space needed to copy `total_bytes`.
    pub fn required_bytes(&self, total_bytes: u64) -> f64 {
        self.duplication_factor * total_bytes as f64 + self.safety_margin_bytes as f64
    }

    /// How many more bytes would have to be freed, or `None` if `free_bytes` is enough.
    pub fn shortfall(&self, total_bytes: u64, free_bytes: u64) -> Option<u64> {
        let required = self.required_bytes(total_bytes);
        let free = free_bytes as f64;
        (required > free).then(|| (required - free).ceil() as u64)
    }

    /// Checks the budget against the current free space.
    ///
    /// Returns the message to show the user when there is not enough room. This blocks on a
    /// filesystem query.
    pub fn check(&self, total_bytes: u64) -> NbContainerResult<Option<String>> {
        let free_bytes = free_space(&self.path)?;
        let Some(additional) = self.shortfall(total_bytes, free_bytes) else {
            return Ok(None);
        };

        tracing::info!(
            "insufficient space to containerize: {free_bytes} bytes free, {total_bytes} bytes to copy, {:.0} bytes required",
            self.required_bytes(total_bytes)
        );

        Ok(Some(insufficient_space_message(additional)))
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// The bytes available to unprivileged users on the filesystem holding `path`.
pub fn free_space(path: &Path) -> NbContainerResult<u64> {
    let stats = statvfs(path).map_err(|e| NbContainerError::Io(e.into()))?;
    Ok(stats.blocks_available() as u64 * stats.fragment_size() as u64)
}

/// The message shown when `additional_bytes` more free space is needed.
pub fn insufficient_space_message(additional_bytes: u64) -> String {
    format!(
        "There is insufficient space remaining on this instance to containerize this notebook. \
         Containerization would require {additional_bytes} bytes ({}) of additional space.",
        format_size(additional_bytes)
    )
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl From<&BudgetConfig> for DiskBudget {
    fn from(config: &BudgetConfig) -> Self {
        Self::new(
            config.get_path(),
            *config.get_duplication_factor(),
            *config.get_safety_margin_bytes(),
        )
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
