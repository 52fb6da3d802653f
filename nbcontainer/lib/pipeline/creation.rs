use std::{path::Path, sync::Arc};

use tokio_util::sync::CancellationToken;

use crate::{
    config::NbContainerConfig,
    kernel::{KernelEnvironment, KernelResolver},
    plan::{build_archive, CopyPlan, DiskBudget},
    runtime::{ContainerRuntime, ContainerSpec},
    status::Stage,
    utils::WorkerPool,
    NbContainerError, NbContainerResult,
};

use super::{EventSender, EventStream, ProgressEvent};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Shown to the user when building the image faults.
pub const IMAGE_CREATION_FAILED: &str = "Image creation failed.";

/// The variable telling the entrypoint which notebook to run.
pub const NOTEBOOK_PATH_ENV_VAR: &str = "NOTEBOOK_PATH";

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Builds the output image from a kernel's environment.
///
/// The environment is copied into a staged container created from the kernel container's image,
/// and the staged container is committed once everything is in place.
#[derive(Clone)]
pub struct ImageCreationPipeline {
    runtime: Arc<dyn ContainerRuntime>,
    kernels: Arc<dyn KernelResolver>,
    pool: WorkerPool,
    config: Arc<NbContainerConfig>,
    cancel: CancellationToken,
}

/// The staged container of one run. The run's own task removes it, whether the run completed,
/// failed or was cancelled.
struct StagedContainer {
    runtime: Arc<dyn ContainerRuntime>,
    name: String,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl ImageCreationPipeline {
    /// Creates a pipeline.
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        kernels: Arc<dyn KernelResolver>,
        pool: WorkerPool,
        config: Arc<NbContainerConfig>,
    ) -> Self {
        Self {
            runtime,
            kernels,
            pool,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Ties every run of this pipeline to `cancel`.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Starts building an image for the notebook at `notebook_path` run by `kernel`.
    ///
    /// The stream ends with either an event carrying the built image at progress 100 or a single
    /// error event. A cancelled run ends without an event, and only once the staged container is
    /// gone.
    pub fn run(&self, kernel: &str, notebook_path: &Path) -> EventStream {
        let pipeline = self.clone();
        let kernel = kernel.to_string();
        let notebook_path = notebook_path.to_path_buf();

        EventStream::spawn(self.cancel.child_token(), move |tx| async move {
            let staged = StagedContainer::new(
                Arc::clone(&pipeline.runtime),
                pipeline.config.get_staged_container(),
            );

            let result = tokio::select! {
                biased;
                _ = tx.cancelled() => Err(NbContainerError::Cancelled),
                result = pipeline.create(&kernel, &notebook_path, &tx, &staged) => result,
            };

            match result {
                Ok(()) => {}
                Err(NbContainerError::ReceiverDropped | NbContainerError::Cancelled) => {
                    tracing::info!("image creation cancelled");
                }
                Err(e) => {
                    tracing::error!("image creation failed: {e}");
                    let event = ProgressEvent::failed(
                        Stage::ImageCreation,
                        0,
                        IMAGE_CREATION_FAILED,
                        Some(e.trace()),
                    );
                    let _ = tx.emit(event).await;
                }
            }

            staged.remove().await;
        })
    }

    async fn create(
        &self,
        kernel: &str,
        notebook_path: &Path,
        tx: &EventSender,
        staged: &StagedContainer,
    ) -> NbContainerResult<()> {
        let config = &self.config;

        tracing::info!("removing previous output image {}", config.get_output_image());
        self.runtime
            .remove_image_and_dependents(config.get_output_image())
            .await?;

        let environment = self.kernels.resolve(kernel).await?;
        tracing::info!(
            "resolved kernel {kernel} to interpreter {}",
            environment.get_interpreter().display()
        );

        self.kernels
            .install_packages(&environment, config.get_required_packages())
            .await?;
        self.materialize_entrypoint().await?;

        let plan = Arc::new(self.plan(kernel, &environment));
        let total = {
            let plan = Arc::clone(&plan);
            self.pool.run(move || Ok(plan.total_size())).await?
        };
        tracing::info!("{total} bytes to copy from {} roots", plan.get_roots().len());

        let budget = DiskBudget::from(config.get_budget());
        if let Some(message) = self.pool.run(move || budget.check(total)).await? {
            return tx
                .emit(ProgressEvent::failed(Stage::ImageCreation, 0, message, None))
                .await;
        }

        self.stage_container(&environment, notebook_path, staged).await?;

        let batches = {
            let plan = Arc::clone(&plan);
            let max_batch_bytes = *config.get_max_batch_bytes();
            self.pool.run(move || Ok(plan.batches(max_batch_bytes))).await?
        };

        let mut copied = 0;
        for batch in batches {
            let size = *batch.get_size();
            let file_count = batch.get_files().len();
            let archive = self.pool.run(move || build_archive(&batch)).await?;
            self.runtime.upload_archive(&staged.name, archive).await?;

            copied += size;
            tracing::debug!("copied {file_count} files ({copied}/{total} bytes)");
            tx.emit(ProgressEvent::progress(
                Stage::ImageCreation,
                percent(copied, total),
            ))
            .await?;
        }

        let entrypoint = vec![
            environment.get_interpreter().to_string_lossy().into_owned(),
            config.get_entrypoint_path().to_string_lossy().into_owned(),
        ];
        let image = self
            .runtime
            .commit_container(&staged.name, config.get_output_image(), &entrypoint)
            .await?;
        tracing::info!("committed {} as image {image}", staged.name);

        tx.emit(ProgressEvent::built(image)).await
    }

    fn plan(&self, kernel: &str, environment: &KernelEnvironment) -> CopyPlan {
        let config = &self.config;
        CopyPlan::new(
            config.get_entrypoint_path(),
            environment.copy_candidates(kernel, config.get_extra_copy_paths(), config.get_env_root()),
            config.get_excluded_extensions().iter().cloned(),
        )
    }

    async fn materialize_entrypoint(&self) -> NbContainerResult<()> {
        let source = self.config.get_entrypoint_source().clone();
        let destination = self.config.get_entrypoint_path().clone();
        if source == destination {
            return Ok(());
        }

        self.pool
            .run(move || {
                if let Some(parent) = destination.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::copy(&source, &destination)?;
                Ok(())
            })
            .await
    }

    async fn stage_container(
        &self,
        environment: &KernelEnvironment,
        notebook_path: &Path,
        staged: &StagedContainer,
    ) -> NbContainerResult<()> {
        let image = self
            .runtime
            .container_image(self.config.get_kernel_container())
            .await?;

        self.runtime.remove_container(&staged.name).await?;

        let notebook_path = notebook_path.to_string_lossy().into_owned();
        let spec = ContainerSpec::builder()
            .name(staged.name.as_str())
            .image(image)
            .env(environment.container_env(&[(NOTEBOOK_PATH_ENV_VAR, notebook_path.as_str())]))
            .build();

        self.runtime.create_container(&spec).await?;
        self.runtime.start_container(&staged.name).await?;
        tracing::info!("started staged container {}", staged.name);

        Ok(())
    }
}

impl StagedContainer {
    fn new(runtime: Arc<dyn ContainerRuntime>, name: impl Into<String>) -> Self {
        Self {
            runtime,
            name: name.into(),
        }
    }

    async fn remove(self) {
        if let Err(e) = self.runtime.remove_container(&self.name).await {
            tracing::warn!("failed to remove staged container {}: {e}", self.name);
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// `floor(100 * copied / total)`, or 100 when there is nothing to copy.
pub fn percent(copied: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }

    (u128::from(copied) * 100 / u128::from(total)).min(100) as u8
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
