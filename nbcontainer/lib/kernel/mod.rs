//! Resolving a kernel name to the interpreter environment behind it.

mod spec;
mod traits;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use spec::*;
pub use traits::*;
