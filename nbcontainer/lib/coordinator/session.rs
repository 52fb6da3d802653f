use std::{
    path::Path,
    time::UNIX_EPOCH,
};

use futures::StreamExt;
use nbutils::normalize_relative;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    pipeline::{cap_progress, EventStream, ProgressEvent, UploadTarget, EVENT_CHANNEL_CAPACITY},
    registry::manifest_annotations,
    request::parse_request,
    status::{now, StatusLogEntry, StatusLogger},
    NbContainerError, NbContainerResult,
};

use super::{Containerizer, SessionClaim};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Shown to the user when a session faults outside the pipelines' own error reporting.
pub const INTERNAL_FAILURE: &str = "A problem occurred during the containerization process. \
    Please try again. If the problem persists, contact technical support.";

/// Shown to the user when the notebook path escapes the notebook root.
pub const NOTEBOOK_OUTSIDE_ROOT: &str =
    "The notebook path must stay within the notebook directory.";

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for the request.
    Idle,

    /// Checking the request.
    Validating,

    /// Running the image creation pipeline.
    CreatingImage,

    /// Running the image upload pipeline.
    UploadingImage,

    /// Done.
    Finalized(SessionOutcome),
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The image was published.
    Succeeded,

    /// The request was invalid or its destination does not exist.
    Rejected,

    /// A pipeline reported an error.
    Failed,

    /// Something unexpected went wrong.
    Faulted,
}

/// A running containerization session.
///
/// Dropping the session cancels its work. The lock is released once that work has wound down,
/// which includes removing the staged container.
pub struct Session {
    entries: mpsc::Receiver<SessionMessage>,
    outcome: Option<SessionOutcome>,
    owner: Uuid,
    cancel: CancellationToken,
    claim: Option<SessionClaim>,
}

enum SessionMessage {
    Entry(StatusLogEntry),
    Finished(SessionOutcome, SessionClaim),
}

/// Drives one session on its own task. The driver holds the claim until the session's work is
/// done.
struct SessionDriver {
    containerizer: Containerizer,
    owner: Uuid,
    claim: SessionClaim,
    cancel: CancellationToken,
    tx: mpsc::Sender<SessionMessage>,
    state: SessionState,
    logger: Option<StatusLogger>,
    last_entry: Option<StatusLogEntry>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl SessionOutcome {
    /// Whether the image was published.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

impl Session {
    pub(super) fn spawn(containerizer: Containerizer, claim: SessionClaim, message: String) -> Self {
        let (tx, entries) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let owner = claim.owner();
        let cancel = CancellationToken::new();
        let driver = SessionDriver {
            containerizer,
            owner,
            claim,
            cancel: cancel.clone(),
            tx,
            state: SessionState::Idle,
            logger: None,
            last_entry: None,
        };
        tokio::spawn(driver.run(message));

        Self {
            entries,
            outcome: None,
            owner,
            cancel,
            claim: None,
        }
    }

    /// The next entry for the client, or `None` once the session has ended.
    ///
    /// Entries never carry an error trace.
    pub async fn next(&mut self) -> Option<StatusLogEntry> {
        match self.entries.recv().await? {
            SessionMessage::Entry(entry) => Some(entry),
            SessionMessage::Finished(outcome, claim) => {
                self.outcome = Some(outcome);
                self.claim = Some(claim);
                None
            }
        }
    }

    /// How the session ended, once [`Session::next`] has returned `None`.
    ///
    /// A session that ended without reporting an outcome is treated as faulted.
    pub fn outcome(&self) -> SessionOutcome {
        self.outcome.unwrap_or(SessionOutcome::Faulted)
    }

    /// The identity the session holds the lock under.
    pub fn owner(&self) -> Uuid {
        self.owner
    }
}

impl SessionDriver {
    async fn run(mut self, message: String) {
        let outcome = match self.drive(&message).await {
            Ok(outcome) => outcome,
            Err(NbContainerError::ReceiverDropped | NbContainerError::Cancelled) => {
                // Dropping the driver releases the claim.
                tracing::info!("session {} ended by client disconnect", self.owner);
                return;
            }
            Err(e) => {
                self.fault(e).await;
                SessionOutcome::Faulted
            }
        };

        self.transition(SessionState::Finalized(outcome));

        // The session keeps the claim until the client lets go of it.
        let _ = self
            .tx
            .send(SessionMessage::Finished(outcome, self.claim))
            .await;
    }

    async fn drive(&mut self, message: &str) -> NbContainerResult<SessionOutcome> {
        self.transition(SessionState::Validating);

        let request = match parse_request(message) {
            Ok(request) => request,
            Err(e) => return self.reject(raw_notebook_path(message), e.to_string()).await,
        };

        let Ok(relative_path) = normalize_relative(request.get_notebook_path()) else {
            let path = request.get_notebook_path().clone();
            return self.reject(Some(path), NOTEBOOK_OUTSIDE_ROOT).await;
        };

        let config = self.containerizer.get_config();
        let notebook_path = config.get_notebook_root().join(&relative_path);
        self.logger = Some(StatusLogger::open(&notebook_path).await?);

        let base = StatusLogEntry::of_image_creation(Some(relative_path))
            .with_notebook_modification_time(Some(modification_time(&notebook_path).await?))
            .with_containerization_start(Some(now()));
        self.record(base.with_progress(Some(0))).await?;

        let repository = request.get_repository_name();
        let registry = self.containerizer.get_registry();
        let Some(repository_uri) = registry.repository_uri(repository).await? else {
            let message = format!("Destination repository {repository} does not exist.");
            tracing::warn!("{message}");
            self.record(base.with_progress(Some(0)).with_error(message, None))
                .await?;
            return Ok(SessionOutcome::Rejected);
        };

        let target = UploadTarget {
            repository: repository.clone(),
            repository_uri,
            annotations: manifest_annotations(&request)?,
        };

        self.transition(SessionState::CreatingImage);
        let creation = self
            .containerizer
            .creation_pipeline()
            .with_cancellation(self.cancel.clone())
            .run(request.unprefixed_kernel_name(), &notebook_path);

        let mut image = None;
        let mut failed = false;
        self.drain(&base, creation, |event| {
            if let Some(built) = event.image() {
                image = Some(built.clone());
            }
            failed |= event.is_error();
        })
        .await?;

        if failed {
            return Ok(SessionOutcome::Failed);
        }

        let image = image.ok_or_else(|| {
            NbContainerError::custom(anyhow::anyhow!("image creation ended without an image"))
        })?;

        self.transition(SessionState::UploadingImage);
        let upload = self
            .containerizer
            .upload_pipeline()
            .with_cancellation(self.cancel.clone())
            .run(&image, target);

        let mut outcome = None;
        self.drain(&base, upload, |event| {
            if event.is_error() {
                outcome = Some(SessionOutcome::Failed);
            } else if event.final_event() {
                outcome = Some(SessionOutcome::Succeeded);
            }
        })
        .await?;

        outcome.ok_or_else(|| {
            NbContainerError::custom(anyhow::anyhow!("image upload ended without completing"))
        })
    }

    /// Records every event of a pipeline run.
    ///
    /// The stream is always read to its end, so the run has cleaned up by the time this returns.
    /// If the client goes away midway the run is cancelled and the rest of its events discarded.
    async fn drain(
        &mut self,
        base: &StatusLogEntry,
        mut events: EventStream,
        mut observe: impl FnMut(&ProgressEvent) + Send,
    ) -> NbContainerResult<()> {
        let mut interrupted = None;
        while let Some(event) = events.next().await {
            if interrupted.is_some() {
                continue;
            }

            let event = cap_progress(event);
            observe(&event);
            if let Err(e) = self.record(entry_for(base, &event)).await {
                events.cancel();
                interrupted = Some(e);
            }
        }

        match interrupted {
            Some(e) => Err(e),
            None if self.cancel.is_cancelled() => Err(NbContainerError::Cancelled),
            None => Ok(()),
        }
    }

    /// Reports an invalid request. Nothing is written to a status log.
    async fn reject(
        &mut self,
        notebook_path: Option<String>,
        message: impl Into<String>,
    ) -> NbContainerResult<SessionOutcome> {
        let message = message.into();
        tracing::warn!("session {} rejected: {message}", self.owner);

        let entry = StatusLogEntry::of_image_creation(notebook_path)
            .with_progress(Some(0))
            .with_error(message, None);
        self.send(entry).await?;

        Ok(SessionOutcome::Rejected)
    }

    /// Writes an entry to the status log and forwards the client copy.
    async fn record(&mut self, entry: StatusLogEntry) -> NbContainerResult<()> {
        if let Some(logger) = self.logger.as_mut() {
            logger.append(&entry).await?;
        }

        self.send(entry.for_client()).await?;
        self.last_entry = Some(entry);

        Ok(())
    }

    async fn send(&self, entry: StatusLogEntry) -> NbContainerResult<()> {
        self.tx
            .send(SessionMessage::Entry(entry))
            .await
            .map_err(|_| NbContainerError::ReceiverDropped)
    }

    /// Reports an unexpected error. The trace goes to the status log only.
    async fn fault(&mut self, error: NbContainerError) {
        let trace = error.trace();
        tracing::error!("session {} faulted: {trace}", self.owner);

        let entry = self
            .last_entry
            .clone()
            .unwrap_or_else(|| StatusLogEntry::of_image_creation(None).with_progress(Some(0)))
            .with_error(INTERNAL_FAILURE, Some(trace));

        if let Some(logger) = self.logger.as_mut() {
            if let Err(e) = logger.append(&entry).await {
                tracing::warn!("failed to write status log {}: {e}", logger.path().display());
            }
        }

        let _ = self.send(entry.for_client()).await;
    }

    fn transition(&mut self, state: SessionState) {
        tracing::debug!("session {}: {:?} -> {:?}", self.owner, self.state, state);
        self.state = state;
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Drop for Session {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// The status entry for a pipeline event, built on the session's base entry.
fn entry_for(base: &StatusLogEntry, event: &ProgressEvent) -> StatusLogEntry {
    let entry = base
        .with_step(event.stage())
        .with_progress(Some(event.progress()));

    match event.error_msg() {
        Some(message) => entry.with_error(message.clone(), event.error_trace().clone()),
        None => entry,
    }
}

/// The notebook path of a request that failed validation, if it has one.
fn raw_notebook_path(message: &str) -> Option<String> {
    let value = serde_json::from_str::<Value>(message).ok()?;
    value
        .get("notebook_path")
        .and_then(Value::as_str)
        .map(str::to_string)
}

async fn modification_time(path: &Path) -> NbContainerResult<f64> {
    let modified = tokio::fs::metadata(path).await?.modified()?;
    Ok(modified
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64())
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::Stage;

    #[test]
    fn test_entry_for_event() {
        let base = StatusLogEntry::of_image_creation(Some("a.ipynb".to_string()))
            .with_containerization_start(Some(1.0));

        let entry = entry_for(&base, &ProgressEvent::progress(Stage::ImageUpload, 40));
        assert_eq!(entry.step(), Stage::ImageUpload);
        assert_eq!(entry.progress(), Some(40));
        assert_eq!(entry.containerization_start(), Some(1.0));
        assert!(!entry.is_error());

        let event = ProgressEvent::failed(Stage::ImageCreation, 0, "nope", Some("trace".into()));
        let entry = entry_for(&base, &event);
        assert_eq!(entry.error_msg().as_deref(), Some("nope"));
        assert_eq!(entry.error_trace().as_deref(), Some("trace"));
        assert_eq!(entry.for_client().error_trace(), &None);
    }

    #[test]
    fn test_raw_notebook_path() {
        assert_eq!(
            raw_notebook_path(r#"{"notebook_path": "x/y.ipynb"}"#).as_deref(),
            Some("x/y.ipynb")
        );
        assert_eq!(raw_notebook_path(r#"{"notebook_path": 3}"#), None);
        assert_eq!(raw_notebook_path("not json"), None);
    }

    #[test]
    fn test_session_outcome() {
        assert!(SessionOutcome::Succeeded.is_success());
        assert!(!SessionOutcome::Faulted.is_success());
    }
}
