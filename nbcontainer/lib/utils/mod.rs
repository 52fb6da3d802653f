//! Utility functions and types.

mod pool;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use pool::*;
