use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::{NbContainerError, NbContainerResult};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A bounded pool for blocking filesystem work.
///
/// Jobs run on tokio's blocking threads, but at most `size` of them at a time. Callers await each
/// job, so jobs submitted by one task complete in submission order.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl WorkerPool {
    /// Creates a pool running at most `size` jobs at once. A size of 0 is treated as 1.
    pub fn new(size: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(size.max(1))),
        }
    }

    /// Runs `job` on a blocking thread once a slot is free and returns its result.
    pub async fn run<F, T>(&self, job: F) -> NbContainerResult<T>
    where
        F: FnOnce() -> NbContainerResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(NbContainerError::custom)?;

        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            job()
        })
        .await?
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
