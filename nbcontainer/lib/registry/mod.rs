//! Destination registry access.

mod annotations;
mod distribution;
mod traits;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use annotations::*;
pub use distribution::*;
pub use traits::*;
