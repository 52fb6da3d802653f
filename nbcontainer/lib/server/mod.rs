//! The HTTP and WebSocket front end.
//!
//! Routes live under the configured base URL:
//! - `POST create_repo` creates a repository from the `repository_name` form field
//! - `GET list_repos` lists repositories a page at a time
//! - `GET upload_to_repo/is_ongoing` tells whether a containerization is running
//! - `GET upload_to_repo` upgrades to a WebSocket that runs one containerization session

mod api;
mod handlers;
mod routes;
mod state;
mod types;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use api::*;
pub use handlers::*;
pub use routes::*;
pub use state::*;
pub use types::*;
