use getset::{CopyGetters, Getters};

use crate::status::Stage;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The highest progress reported before the whole containerization has finished.
pub const MAX_INTERIM_PROGRESS: u8 = 99;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A progress report from one of the pipelines.
///
/// An event with an error message is the last event of its stage.
#[derive(Debug, Clone, PartialEq, Getters, CopyGetters)]
pub struct ProgressEvent {
    /// The stage that produced the event.
    #[getset(get_copy = "pub")]
    stage: Stage,

    /// Progress of the stage, 0 to 100.
    #[getset(get_copy = "pub")]
    progress: u8,

    /// The image built by the creation stage.
    #[getset(get = "pub")]
    image: Option<String>,

    /// A message describing what went wrong, meant for the end user.
    #[getset(get = "pub")]
    error_msg: Option<String>,

    /// Diagnostic detail for the error.
    #[getset(get = "pub")]
    error_trace: Option<String>,

    /// Set only on the upload stage's completion event, which marks the end of the whole
    /// containerization.
    #[getset(get_copy = "pub")]
    final_event: bool,
}

/// Filters repeated progress values out of a stream of updates.
#[derive(Debug, Default, Clone)]
pub struct ProgressDeduplicator {
    last: Option<u8>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl ProgressEvent {
    /// A plain progress report.
    pub fn progress(stage: Stage, progress: u8) -> Self {
        Self {
            stage,
            progress: progress.min(100),
            image: None,
            error_msg: None,
            error_trace: None,
            final_event: false,
        }
    }

    /// The creation stage finished and built `image`.
    pub fn built(image: impl Into<String>) -> Self {
        Self {
            image: Some(image.into()),
            ..Self::progress(Stage::ImageCreation, 100)
        }
    }

    /// A report that ends its stage with an error.
    pub fn failed(
        stage: Stage,
        progress: u8,
        error_msg: impl Into<String>,
        error_trace: Option<String>,
    ) -> Self {
        Self {
            error_msg: Some(error_msg.into()),
            error_trace,
            ..Self::progress(stage, progress)
        }
    }

    /// The upload stage finished, and with it the whole containerization.
    pub fn completed() -> Self {
        Self {
            final_event: true,
            ..Self::progress(Stage::ImageUpload, 100)
        }
    }

    /// Whether the event reports an error.
    pub fn is_error(&self) -> bool {
        self.error_msg.is_some()
    }
}

impl ProgressDeduplicator {
    /// Whether an update should be forwarded. Updates carrying an error always are; others only
    /// when their progress differs from the last forwarded one.
    pub fn admit(&mut self, progress: u8, has_error: bool) -> bool {
        if !has_error && self.last == Some(progress) {
            return false;
        }

        self.last = Some(progress);
        true
    }

    /// The last forwarded progress.
    pub fn last(&self) -> Option<u8> {
        self.last
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Holds progress at 99 until the end-to-end completion event.
///
/// Completion events pass through untouched; everything else above 99 becomes 99.
pub fn cap_progress(event: ProgressEvent) -> ProgressEvent {
    if event.final_event || event.progress <= MAX_INTERIM_PROGRESS {
        return event;
    }

    ProgressEvent {
        progress: MAX_INTERIM_PROGRESS,
        ..event
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cap_progress() {
        let capped = cap_progress(ProgressEvent::progress(Stage::ImageUpload, 100));
        assert_eq!(capped.progress(), 99);

        let built = cap_progress(ProgressEvent::built("sha256:abc"));
        assert_eq!(built.progress(), 99);
        assert_eq!(built.image().as_deref(), Some("sha256:abc"));

        assert_eq!(cap_progress(ProgressEvent::completed()).progress(), 100);
        assert_eq!(
            cap_progress(ProgressEvent::progress(Stage::ImageCreation, 42)).progress(),
            42
        );
    }

    #[test]
    fn test_cap_progress_is_idempotent() {
        for event in [
            ProgressEvent::progress(Stage::ImageUpload, 100),
            ProgressEvent::progress(Stage::ImageCreation, 7),
            ProgressEvent::completed(),
            ProgressEvent::failed(Stage::ImageUpload, 100, "already", None),
        ] {
            let once = cap_progress(event);
            assert_eq!(cap_progress(once.clone()), once);
        }
    }

    #[test]
    fn test_deduplicator_forwards_changes_and_errors() {
        let mut dedup = ProgressDeduplicator::default();
        let forwarded: Vec<(u8, bool)> = [(0, false), (0, false), (5, false), (5, true), (5, false), (9, false)]
            .into_iter()
            .filter(|(progress, error)| dedup.admit(*progress, *error))
            .collect();

        assert_eq!(
            forwarded,
            vec![(0, false), (5, false), (5, true), (9, false)]
        );
        assert_eq!(dedup.last(), Some(9));
    }
}
