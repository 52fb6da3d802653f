//! The image creation and image upload pipelines.
//!
//! Each pipeline run is a spawned task that reports [`ProgressEvent`]s through a bounded
//! channel. The consuming side holds an [`EventStream`]; dropping it aborts the task.

mod creation;
mod progress;
mod stream;
mod upload;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use creation::*;
pub use progress::*;
pub use stream::*;
pub use upload::*;
