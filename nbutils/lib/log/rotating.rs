//! Size-based log rotation for the nbcontainer process log.
//!
//! Writes are handed to a background task through an unbounded channel so that synchronous
//! writers (such as a `tracing` fmt layer behind `tracing_appender::non_blocking`) never block on
//! file IO. When the active file would exceed the configured size it is shifted into a numbered
//! backup (`app.log` becomes `app.log.1`, `app.log.1` becomes `app.log.2`, ...) and the oldest
//! backup beyond the configured count is removed.

use std::{
    io::{self, Write},
    path::{Path, PathBuf},
};

use tokio::{
    fs::{self, File, OpenOptions},
    io::AsyncWriteExt,
    sync::mpsc::{self, UnboundedReceiver, UnboundedSender},
    task::JoinHandle,
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A log file that rotates into numbered backups once it reaches a maximum size.
///
/// # Example
///
/// ```no_run
/// use nbutils::RotatingLog;
///
/// #[tokio::main]
/// async fn main() -> std::io::Result<()> {
///     let log = RotatingLog::new("nbcontainer.log", Some(1024 * 1024), 3).await?;
///     let (writer, _guard) = tracing_appender::non_blocking(log.get_sync_writer());
///     # drop(writer);
///     Ok(())
/// }
/// ```
pub struct RotatingLog {
    tx: UnboundedSender<Vec<u8>>,
    task: JoinHandle<()>,
}

/// A sync writer that forwards everything written to it to a [`RotatingLog`].
#[derive(Clone)]
pub struct SyncChannelWriter {
    tx: UnboundedSender<Vec<u8>>,
}

struct RotationTarget {
    file: File,
    path: PathBuf,
    size: u64,
    max_size: u64,
    backups: usize,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl RotatingLog {
    /// Default maximum log file size (10MB)
    pub const DEFAULT_MAX_SIZE: u64 = 10 * 1024 * 1024;

    /// Default number of rotated files kept next to the active one.
    pub const DEFAULT_BACKUPS: usize = 5;

    /// Opens (or creates) the log file at `path` and starts the background writer.
    ///
    /// `max_size` defaults to [`Self::DEFAULT_MAX_SIZE`]. With `backups` set to 0 a full log is
    /// simply truncated.
    pub async fn new(
        path: impl AsRef<Path>,
        max_size: Option<u64>,
        backups: usize,
    ) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let file = open_append(&path).await?;
        let size = file.metadata().await?.len();
        let (tx, rx) = mpsc::unbounded_channel();

        let target = RotationTarget {
            file,
            path,
            size,
            max_size: max_size.unwrap_or(Self::DEFAULT_MAX_SIZE),
            backups,
        };

        let task = tokio::spawn(handle_channel_data(rx, target));

        Ok(Self { tx, task })
    }

    /// Get a sync writer that implements `std::io::Write`.
    pub fn get_sync_writer(&self) -> SyncChannelWriter {
        SyncChannelWriter {
            tx: self.tx.clone(),
        }
    }

    /// Waits until every pending write has reached the file.
    ///
    /// The background task only finishes once all writers obtained from
    /// [`Self::get_sync_writer`] have been dropped as well.
    pub async fn close(self) {
        drop(self.tx);
        if let Err(e) = self.task.await {
            tracing::warn!("log writer task ended abnormally: {e}");
        }
    }
}

impl RotationTarget {
    async fn write(&mut self, data: &[u8]) -> io::Result<()> {
        let len = data.len() as u64;
        if self.size > 0 && self.size + len > self.max_size {
            self.rotate().await?;
        }

        self.file.write_all(data).await?;
        self.file.flush().await?;
        self.size += len;
        Ok(())
    }

    async fn rotate(&mut self) -> io::Result<()> {
        if self.backups == 0 {
            fs::remove_file(&self.path).await?;
        } else {
            let oldest = backup_path(&self.path, self.backups);
            if fs::try_exists(&oldest).await? {
                fs::remove_file(&oldest).await?;
            }

            for index in (1..self.backups).rev() {
                let from = backup_path(&self.path, index);
                if fs::try_exists(&from).await? {
                    fs::rename(&from, backup_path(&self.path, index + 1)).await?;
                }
            }

            fs::rename(&self.path, backup_path(&self.path, 1)).await?;
        }

        self.file = open_append(&self.path).await?;
        self.size = 0;
        Ok(())
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

async fn handle_channel_data(mut rx: UnboundedReceiver<Vec<u8>>, mut target: RotationTarget) {
    while let Some(data) = rx.recv().await {
        if let Err(e) = target.write(&data).await {
            // The log itself is unavailable here.
            eprintln!("failed to write to log file {}: {e}", target.path.display());
        }
    }
}

async fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path).await
}

fn backup_path(path: &Path, index: usize) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(format!(".{index}"));
    PathBuf::from(name)
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Write for SyncChannelWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.tx
            .send(buf.to_vec())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "log writer has shut down"))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
