use getset::{CopyGetters, Getters};
use serde::{Deserialize, Serialize};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The schema version written into every status entry.
pub const STATUS_ENTRY_VERSION: &str = "1.0.0";

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The pipeline stage an event or status entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Copying the kernel environment into an image.
    ImageCreation,

    /// Pushing the image and publishing its metadata.
    ImageUpload,
}

/// One record of a containerization session, as written to the status log and sent to the
/// client.
///
/// Entries are never modified. The `with_*` methods return a copy with one aspect changed and a
/// fresh timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Getters, CopyGetters)]
pub struct StatusLogEntry {
    /// The notebook path relative to the notebook root.
    #[getset(get = "pub")]
    notebook_path: Option<String>,

    /// Seconds since the epoch when the entry was made.
    #[getset(get_copy = "pub")]
    epoch_timestamp: f64,

    /// The stage that produced the entry.
    #[getset(get_copy = "pub")]
    step: Stage,

    /// The notebook's modification time, in seconds since the epoch.
    #[getset(get_copy = "pub")]
    notebook_modification_time: Option<f64>,

    /// Progress of the stage, 0 to 100.
    #[getset(get_copy = "pub")]
    progress: Option<u8>,

    /// A message describing what went wrong, meant for the end user.
    #[getset(get = "pub")]
    error_msg: Option<String>,

    /// Diagnostic detail for the error.
    #[getset(get = "pub")]
    error_trace: Option<String>,

    /// Seconds since the epoch when the session started.
    #[getset(get_copy = "pub")]
    containerization_start: Option<f64>,

    /// The entry schema version.
    #[getset(get = "pub")]
    version: String,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl Stage {
    /// The stage name as written to the status log.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ImageCreation => "image_creation",
            Self::ImageUpload => "image_upload",
        }
    }
}

impl StatusLogEntry {
    /// Creates an entry for `step` with only the notebook path set.
    pub fn new(notebook_path: Option<String>, step: Stage) -> Self {
        Self {
            notebook_path,
            epoch_timestamp: now(),
            step,
            notebook_modification_time: None,
            progress: None,
            error_msg: None,
            error_trace: None,
            containerization_start: None,
            version: STATUS_ENTRY_VERSION.to_string(),
        }
    }

    /// Creates an image creation entry.
    pub fn of_image_creation(notebook_path: Option<String>) -> Self {
        Self::new(notebook_path, Stage::ImageCreation)
    }

    /// Creates an image upload entry.
    pub fn of_image_upload(notebook_path: Option<String>) -> Self {
        Self::new(notebook_path, Stage::ImageUpload)
    }

    /// A copy for a different stage.
    pub fn with_step(&self, step: Stage) -> Self {
        self.copy_with(|entry| entry.step = step)
    }

    /// A copy with the given progress.
    pub fn with_progress(&self, progress: Option<u8>) -> Self {
        self.copy_with(|entry| entry.progress = progress)
    }

    /// A copy carrying an error.
    pub fn with_error(&self, error_msg: impl Into<String>, error_trace: Option<String>) -> Self {
        let error_msg = error_msg.into();
        self.copy_with(|entry| {
            entry.error_msg = Some(error_msg);
            entry.error_trace = error_trace;
        })
    }

    /// A copy with the notebook modification time.
    pub fn with_notebook_modification_time(&self, time: Option<f64>) -> Self {
        self.copy_with(|entry| entry.notebook_modification_time = time)
    }

    /// A copy with the session start time.
    pub fn with_containerization_start(&self, time: Option<f64>) -> Self {
        self.copy_with(|entry| entry.containerization_start = time)
    }

    /// The copy sent to clients, which never carries an error trace.
    pub fn for_client(&self) -> Self {
        Self {
            error_trace: None,
            ..self.clone()
        }
    }

    /// Whether this entry reports an error.
    pub fn is_error(&self) -> bool {
        self.error_msg.is_some()
    }

    fn copy_with(&self, change: impl FnOnce(&mut Self)) -> Self {
        let mut entry = self.clone();
        entry.epoch_timestamp = now();
        change(&mut entry);
        entry
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// The current wall clock time in fractional seconds since the epoch.
pub fn now() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
