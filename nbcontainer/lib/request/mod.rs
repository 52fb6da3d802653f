//! Containerization requests and their validation.

mod types;
mod validate;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use types::*;
pub use validate::*;
