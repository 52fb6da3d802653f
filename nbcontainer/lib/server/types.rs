//! Request and response bodies of the HTTP endpoints.

use serde::{Deserialize, Serialize};

//-------------------------------------------------------------------------------------------------
// Types
//-------------------------------------------------------------------------------------------------

/// Form body of `POST create_repo`.
#[derive(Debug, Deserialize)]
pub struct CreateRepoForm {
    /// The repository to create.
    pub repository_name: String,
}

/// Response body of `POST create_repo`.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct CreateRepoResponse {
    /// The repository that was created.
    #[serde(rename = "repositoryName")]
    pub repository_name: String,
}

/// Query string of `GET list_repos`.
#[derive(Debug, Default, Deserialize)]
pub struct ListReposQuery {
    /// The token returned with the previous page.
    pub next_token: Option<String>,
}

/// Body of every error response.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ErrorResponse {
    /// What went wrong.
    pub error: String,
}
