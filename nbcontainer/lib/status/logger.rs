use std::path::{Path, PathBuf};

use tokio::{
    fs::{File, OpenOptions},
    io::AsyncWriteExt,
};

use crate::NbContainerResult;

use super::StatusLogEntry;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The extension of status log files.
pub const STATUS_LOG_EXTENSION: &str = ".containerizer_log";

/// The longest file name most filesystems accept, in bytes.
const MAX_FILE_NAME_BYTES: usize = 255;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Writes the status entries of one containerization session next to the notebook.
///
/// Opening the logger starts a fresh log; each entry is then appended as one line of JSON.
#[derive(Debug)]
pub struct StatusLogger {
    path: PathBuf,
    file: File,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl StatusLogger {
    /// Starts the status log of the notebook at `notebook_path`.
    pub async fn open(notebook_path: &Path) -> NbContainerResult<Self> {
        let path = status_log_path(notebook_path);
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)
            .await?;

        tracing::debug!("opened status log {}", path.display());
        Ok(Self { path, file })
    }

    /// Appends one entry.
    pub async fn append(&mut self, entry: &StatusLogEntry) -> NbContainerResult<()> {
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');
        self.file.write_all(&line).await?;
        self.file.flush().await?;
        Ok(())
    }

    /// The log file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// The status log path for a notebook: its stem plus [`STATUS_LOG_EXTENSION`], in the notebook's
/// directory.
///
/// The stem is shortened so the file name stays within 255 bytes, cutting only at character
/// boundaries.
pub fn status_log_path(notebook_path: &Path) -> PathBuf {
    let stem = notebook_path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();

    let budget = MAX_FILE_NAME_BYTES - STATUS_LOG_EXTENSION.len();
    let mut cut = stem.len().min(budget);
    while !stem.is_char_boundary(cut) {
        cut -= 1;
    }

    let file_name = format!("{}{STATUS_LOG_EXTENSION}", &stem[..cut]);
    match notebook_path.parent() {
        Some(parent) => parent.join(file_name),
        None => PathBuf::from(file_name),
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
