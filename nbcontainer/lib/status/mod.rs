//! Per-notebook containerization status records.

mod entry;
mod logger;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use entry::*;
pub use logger::*;
