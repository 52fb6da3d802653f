use std::sync::Arc;

use crate::{
    config::NbContainerConfig,
    kernel::KernelResolver,
    pipeline::{ImageCreationPipeline, ImageUploadPipeline},
    registry::Registry,
    runtime::ContainerRuntime,
    utils::WorkerPool,
};

use super::{Session, SessionClaim, SessionLock};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Logged when a containerization is turned away because another one is running.
pub const ALREADY_ONGOING: &str =
    "Blocking a containerization attempt as a containerization process is already ongoing.";

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Runs containerization sessions, one at a time.
///
/// Cloning is cheap and every clone shares the same lock.
#[derive(Clone)]
pub struct Containerizer {
    config: Arc<NbContainerConfig>,
    runtime: Arc<dyn ContainerRuntime>,
    registry: Arc<dyn Registry>,
    kernels: Arc<dyn KernelResolver>,
    pool: WorkerPool,
    lock: Arc<SessionLock>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl Containerizer {
    /// Creates a containerizer over the given services.
    pub fn new(
        config: NbContainerConfig,
        runtime: Arc<dyn ContainerRuntime>,
        registry: Arc<dyn Registry>,
        kernels: Arc<dyn KernelResolver>,
    ) -> Self {
        let pool = WorkerPool::new(*config.get_worker_threads());
        Self {
            config: Arc::new(config),
            runtime,
            registry,
            kernels,
            pool,
            lock: Arc::new(SessionLock::new()),
        }
    }

    /// The configuration.
    pub fn get_config(&self) -> &NbContainerConfig {
        &self.config
    }

    /// The destination registry.
    pub fn get_registry(&self) -> &Arc<dyn Registry> {
        &self.registry
    }

    /// The lock guarding sessions.
    pub fn get_lock(&self) -> &Arc<SessionLock> {
        &self.lock
    }

    /// Whether a session is running.
    pub fn is_ongoing(&self) -> bool {
        self.lock.is_held()
    }

    /// Claims the right to run a session, or returns `None` if one is already running.
    pub fn try_claim(&self) -> Option<SessionClaim> {
        let claim = SessionLock::claim(&self.lock);
        match &claim {
            Some(claim) => tracing::info!("session {} claimed the containerization lock", claim.owner()),
            None => tracing::warn!("{ALREADY_ONGOING}"),
        }

        claim
    }

    /// Starts a session for the raw request `message`.
    ///
    /// The lock stays claimed until the session is dropped and everything it started has been
    /// cleaned up.
    pub fn start(&self, claim: SessionClaim, message: impl Into<String>) -> Session {
        Session::spawn(self.clone(), claim, message.into())
    }

    pub(super) fn creation_pipeline(&self) -> ImageCreationPipeline {
        ImageCreationPipeline::new(
            Arc::clone(&self.runtime),
            Arc::clone(&self.kernels),
            self.pool.clone(),
            Arc::clone(&self.config),
        )
    }

    pub(super) fn upload_pipeline(&self) -> ImageUploadPipeline {
        ImageUploadPipeline::new(Arc::clone(&self.runtime), Arc::clone(&self.registry))
    }
}
