use std::sync::Arc;

use futures::StreamExt;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::{
    registry::{Annotations, Registry},
    runtime::ContainerRuntime,
    status::Stage,
    NbContainerError, NbContainerResult,
};

use super::{EventSender, EventStream, ProgressDeduplicator, ProgressEvent};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Shown to the user when publishing the image faults.
pub const IMAGE_UPLOAD_FAILED: &str = "Image upload failed.";

/// Shown to the user when the registry already holds the image's layers.
pub const ALREADY_UPLOADED: &str = "This image has already been uploaded to this repository.";

/// The tag the image is pushed under before its manifest is annotated.
pub const INTERIM_TAG: &str = "interim";

/// The tag the annotated manifest is published under.
pub const PUBLISHED_TAG: &str = "latest";

const PUSH_PREAMBLE: &str = "The push refers to repository";

const LAYER_EXISTS: &str = "Layer already exists";

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Pushes a built image and publishes it with its annotations.
#[derive(Clone)]
pub struct ImageUploadPipeline {
    runtime: Arc<dyn ContainerRuntime>,
    registry: Arc<dyn Registry>,
    cancel: CancellationToken,
}

/// What a single push status record amounts to.
#[derive(Debug, Clone, PartialEq)]
pub enum PushRecord {
    /// Chatter with no progress information.
    Skip,

    /// A progress update, possibly carrying a reportable error.
    Update {
        /// Progress of the layer, 0 to 100.
        progress: u8,

        /// A message for the user.
        error_msg: Option<String>,
    },

    /// The engine reported that the push failed.
    Fault(String),
}

/// Where an upload should publish to.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadTarget {
    /// The repository name in the registry.
    pub repository: String,

    /// The repository's address, as the engine pushes to it.
    pub repository_uri: String,

    /// Annotations written into the published manifest.
    pub annotations: Annotations,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl ImageUploadPipeline {
    /// Creates a pipeline.
    pub fn new(runtime: Arc<dyn ContainerRuntime>, registry: Arc<dyn Registry>) -> Self {
        Self {
            runtime,
            registry,
            cancel: CancellationToken::new(),
        }
    }

    /// Ties every run of this pipeline to `cancel`.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Starts pushing `image` to `target`.
    ///
    /// The stream ends with the completion event, with an event carrying a reportable error, or
    /// with a single fault event.
    pub fn run(&self, image: &str, target: UploadTarget) -> EventStream {
        let pipeline = self.clone();
        let image = image.to_string();

        EventStream::spawn(self.cancel.child_token(), move |tx| async move {
            let mut dedup = ProgressDeduplicator::default();
            let result = tokio::select! {
                biased;
                _ = tx.cancelled() => Err(NbContainerError::Cancelled),
                result = pipeline.upload(&image, &target, &tx, &mut dedup) => result,
            };

            match result {
                Ok(()) => {}
                Err(NbContainerError::ReceiverDropped | NbContainerError::Cancelled) => {
                    tracing::info!("image upload cancelled");
                }
                Err(e) => {
                    tracing::error!("image upload to {} failed: {e}", target.repository_uri);
                    let event = ProgressEvent::failed(
                        Stage::ImageUpload,
                        dedup.last().unwrap_or(0),
                        IMAGE_UPLOAD_FAILED,
                        Some(e.trace()),
                    );
                    let _ = tx.emit(event).await;
                }
            }
        })
    }

    async fn upload(
        &self,
        image: &str,
        target: &UploadTarget,
        tx: &EventSender,
        dedup: &mut ProgressDeduplicator,
    ) -> NbContainerResult<()> {
        let uri = &target.repository_uri;
        self.runtime.tag_image(image, uri, INTERIM_TAG).await?;
        tracing::info!("pushing {image} as {uri}:{INTERIM_TAG}");

        let mut records = self
            .runtime
            .push_image(uri, INTERIM_TAG, self.registry.credentials());

        while let Some(record) = records.next().await {
            match parse_push_record(&record?) {
                PushRecord::Skip => {}
                PushRecord::Fault(message) => return Err(NbContainerError::PushFailed(message)),
                PushRecord::Update {
                    progress,
                    error_msg,
                } => {
                    if !dedup.admit(progress, error_msg.is_some()) {
                        continue;
                    }

                    let Some(error_msg) = error_msg else {
                        tx.emit(ProgressEvent::progress(Stage::ImageUpload, progress))
                            .await?;
                        continue;
                    };

                    tracing::info!("push of {uri} stopped: {error_msg}");
                    return tx
                        .emit(ProgressEvent::failed(
                            Stage::ImageUpload,
                            progress,
                            error_msg,
                            None,
                        ))
                        .await;
                }
            }
        }

        self.publish(target).await?;
        tracing::info!("published {uri}:{PUBLISHED_TAG}");

        tx.emit(ProgressEvent::completed()).await
    }

    /// Re-publishes the interim manifest with annotations under the published tag and drops the
    /// interim tag.
    async fn publish(&self, target: &UploadTarget) -> NbContainerResult<()> {
        let repository = &target.repository;
        let manifest = self
            .registry
            .fetch_manifest(repository, INTERIM_TAG)
            .await?
            .with_annotations(&target.annotations)?;

        self.registry
            .put_manifest(repository, PUBLISHED_TAG, &manifest)
            .await?;
        self.registry.delete_tag(repository, INTERIM_TAG).await
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Interprets one JSON status record from an image push.
pub fn parse_push_record(record: &Value) -> PushRecord {
    if let Some(error) = record.get("error").and_then(Value::as_str) {
        return PushRecord::Fault(error.to_string());
    }

    let Some(status) = record.get("status").and_then(Value::as_str) else {
        return PushRecord::Skip;
    };

    if status.contains(PUSH_PREAMBLE) {
        return PushRecord::Skip;
    }

    if status == LAYER_EXISTS {
        return layer_exists();
    }

    let detail = match record.get("progressDetail") {
        None | Some(Value::Null) => return PushRecord::Skip,
        Some(Value::String(detail)) if detail.is_empty() => return PushRecord::Skip,
        Some(Value::Object(detail)) if detail.is_empty() => return PushRecord::Skip,
        Some(detail) => detail,
    };

    if detail.as_str() == Some(LAYER_EXISTS) {
        return layer_exists();
    }

    let current = detail.get("current").and_then(Value::as_f64);
    let total = detail.get("total").and_then(Value::as_f64);
    match (current, total) {
        (Some(current), Some(total)) if total > 0.0 => PushRecord::Update {
            progress: (100.0 * current / total).floor().clamp(0.0, 100.0) as u8,
            error_msg: None,
        },
        _ => PushRecord::Skip,
    }
}

fn layer_exists() -> PushRecord {
    PushRecord::Update {
        progress: 100,
        error_msg: Some(ALREADY_UPLOADED.to_string()),
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn update(progress: u8) -> PushRecord {
        PushRecord::Update {
            progress,
            error_msg: None,
        }
    }

    #[test]
    fn test_parse_push_record_skips_chatter() {
        for record in [
            json!({}),
            json!({"progressDetail": {"current": 1, "total": 2}}),
            json!({"status": "The push refers to repository [localhost:5000/foo]"}),
            json!({"status": "Preparing", "progressDetail": {}}),
            json!({"status": "Waiting", "progressDetail": ""}),
            json!({"status": "Pushing", "progressDetail": null}),
            json!({"status": "Pushing"}),
            json!({"status": "Pushing", "progressDetail": {"current": 5, "total": 0}}),
            json!({"status": "Pushing", "progressDetail": {"current": 5}}),
        ] {
            assert_eq!(parse_push_record(&record), PushRecord::Skip, "{record}");
        }
    }

    #[test]
    fn test_parse_push_record_progress() {
        let record = json!({"status": "Pushing", "progressDetail": {"current": 1, "total": 3}});
        assert_eq!(parse_push_record(&record), update(33));

        let record = json!({"status": "Pushing", "progressDetail": {"current": 10, "total": 10}});
        assert_eq!(parse_push_record(&record), update(100));
    }

    #[test]
    fn test_parse_push_record_layer_exists() {
        let record = json!({"status": "Layer already exists", "progressDetail": "Layer already exists"});
        assert_eq!(
            parse_push_record(&record),
            PushRecord::Update {
                progress: 100,
                error_msg: Some(ALREADY_UPLOADED.to_string()),
            }
        );
    }

    #[test]
    fn test_parse_push_record_layer_exists_status() {
        let record = json!({
            "status": "Layer already exists",
            "progressDetail": {},
            "id": "5f70bf18a086"
        });
        assert_eq!(
            parse_push_record(&record),
            PushRecord::Update {
                progress: 100,
                error_msg: Some(ALREADY_UPLOADED.to_string()),
            }
        );
    }

    #[test]
    fn test_parse_push_record_error() {
        let record = json!({"error": "denied: requested access to the resource is denied"});
        assert_eq!(
            parse_push_record(&record),
            PushRecord::Fault("denied: requested access to the resource is denied".to_string())
        );
    }

    #[test]
    fn test_forwarded_updates_are_distinct_or_errors() {
        let records = [
            json!({"status": "Pushing", "progressDetail": {"current": 0, "total": 4}}),
            json!({"status": "Pushing", "progressDetail": {"current": 0, "total": 4}}),
            json!({"status": "Pushing", "progressDetail": {"current": 1, "total": 4}}),
            json!({"status": "Pushing", "progressDetail": {"current": 1, "total": 4}}),
            json!({"status": "Pushed", "progressDetail": "Layer already exists"}),
        ];

        let mut dedup = ProgressDeduplicator::default();
        let forwarded: Vec<_> = records
            .iter()
            .map(parse_push_record)
            .filter_map(|record| match record {
                PushRecord::Update {
                    progress,
                    error_msg,
                } => dedup
                    .admit(progress, error_msg.is_some())
                    .then_some((progress, error_msg.is_some())),
                _ => None,
            })
            .collect();

        assert_eq!(forwarded, vec![(0, false), (25, false), (100, true)]);
    }
}
