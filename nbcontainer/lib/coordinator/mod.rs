//! Single-flight containerization sessions.
//!
//! A [`Containerizer`] owns the shared services and the global [`SessionLock`]. Each accepted
//! connection claims the lock and drives one [`Session`], which validates the request, runs the
//! creation and upload pipelines, writes every event to the notebook's status log and hands a
//! client copy of each entry to the connection.

mod containerizer;
mod lock;
mod session;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use containerizer::*;
pub use lock::*;
pub use session::*;
