//! Planning what gets copied into the staged container, and whether it fits.

mod archive;
mod copy_plan;
mod disk;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use archive::*;
pub use copy_plan::*;
pub use disk::*;
