use axum::{
    routing::{get, post},
    Router,
};

use super::{handlers, state::ServerState};

//-------------------------------------------------------------------------------------------------
// Functions
//-------------------------------------------------------------------------------------------------

/// Creates the router with every endpoint mounted under `base_url`.
pub fn create_router(state: ServerState, base_url: &str) -> Router {
    let routes = Router::new()
        .route("/create_repo", post(handlers::create_repo_handler))
        .route("/list_repos", get(handlers::list_repos_handler))
        .route(
            "/upload_to_repo/is_ongoing",
            get(handlers::is_ongoing_handler),
        )
        .route("/upload_to_repo", get(handlers::upload_to_repo_handler))
        .with_state(state);

    match normalize_base_url(base_url) {
        Some(base) => Router::new().nest(&base, routes),
        None => routes,
    }
}

/// `/`-prefixed base without a trailing slash, or `None` for the root.
fn normalize_base_url(base_url: &str) -> Option<String> {
    let trimmed = base_url.trim_matches('/');
    (!trimmed.is_empty()).then(|| format!("/{trimmed}"))
}

//-------------------------------------------------------------------------------------------------
// Tests
//-------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_base_url() {
        assert_eq!(normalize_base_url("/"), None);
        assert_eq!(normalize_base_url(""), None);
        assert_eq!(normalize_base_url("/nb/"), Some("/nb".to_string()));
        assert_eq!(normalize_base_url("user/jupyter"), Some("/user/jupyter".to_string()));
    }
}
