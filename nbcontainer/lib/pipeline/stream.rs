use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use futures::Stream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

use crate::{NbContainerError, NbContainerResult};

use super::ProgressEvent;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// How many events a pipeline may get ahead of its consumer.
pub const EVENT_CHANNEL_CAPACITY: usize = 16;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The events of one pipeline run.
///
/// Dropping the stream cancels the run. The pipeline task still gets to clean up after itself
/// and the stream only ends once it has, so draining a cancelled stream waits for the cleanup.
#[derive(Debug)]
pub struct EventStream {
    events: ReceiverStream<ProgressEvent>,
    cancel: CancellationToken,
}

/// The producing half handed to a pipeline task.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::Sender<ProgressEvent>,
    cancel: CancellationToken,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl EventStream {
    /// Spawns `pipeline` with a fresh channel and returns the consuming end.
    ///
    /// The run is cancelled when `cancel` is, or when the stream is dropped.
    pub fn spawn<F, Fut>(cancel: CancellationToken, pipeline: F) -> Self
    where
        F: FnOnce(EventSender) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        tokio::spawn(pipeline(EventSender {
            tx,
            cancel: cancel.clone(),
        }));

        Self {
            events: ReceiverStream::new(rx),
            cancel,
        }
    }

    /// Asks the pipeline to stop. Keep polling the stream to wait for it to finish.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

impl EventSender {
    /// Sends an event, waiting while the channel is full.
    ///
    /// Fails with [`NbContainerError::ReceiverDropped`] once nobody is listening.
    pub async fn emit(&self, event: ProgressEvent) -> NbContainerResult<()> {
        self.tx
            .send(event)
            .await
            .map_err(|_| NbContainerError::ReceiverDropped)
    }

    /// Resolves once the run has been cancelled.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    /// Whether the run has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Stream for EventStream {
    type Item = ProgressEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.events).poll_next(cx)
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
