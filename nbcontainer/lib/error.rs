use std::{
    error::Error,
    fmt::{self, Display},
};
use thiserror::Error;

use crate::registry::RegistryResponseError;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The result of an nbcontainer-related operation.
pub type NbContainerResult<T> = Result<T, NbContainerError>;

/// An error that occurred while containerizing or publishing a notebook.
#[derive(pretty_error_debug::Debug, Error)]
pub enum NbContainerError {
    /// An I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// An error that can represent any error.
    #[error(transparent)]
    Custom(#[from] AnyError),

    /// An error that occurred during an HTTP request.
    #[error("http request error: {0}")]
    HttpRequest(#[from] reqwest::Error),

    /// An error that occurred during an HTTP middleware operation.
    #[error("http middleware error: {0}")]
    HttpMiddleware(#[from] reqwest_middleware::Error),

    /// The registry answered with an error payload.
    #[error("registry error: {0}")]
    Registry(#[from] RegistryResponseError),

    /// The registry answered with a status the client does not handle.
    #[error("unexpected registry status {status} for {url}")]
    UnexpectedRegistryStatus {
        /// The HTTP status code.
        status: u16,

        /// The requested URL.
        url: String,
    },

    /// An error reported by the container engine.
    #[error("container runtime error: {0}")]
    Runtime(#[from] bollard::errors::Error),

    /// A JSON (de)serialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A configuration file could not be parsed.
    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// A path helper failed.
    #[error(transparent)]
    Path(#[from] nbutils::NbutilsError),

    /// An error that occurred when a join handle returned an error.
    #[error("join error: {0}")]
    JoinError(#[from] tokio::task::JoinError),

    /// A manifest could not be found in the registry.
    #[error("manifest not found: {repository}:{reference}")]
    ManifestNotFound {
        /// The repository that was queried.
        repository: String,

        /// The tag or digest that was queried.
        reference: String,
    },

    /// A repository with the requested name already exists.
    #[error("repository already exists: {0}")]
    RepositoryAlreadyExists(String),

    /// No kernel specification exists for the given kernel.
    #[error("kernel not found: {0}")]
    KernelNotFound(String),

    /// A kernel specification could not be used.
    #[error("invalid kernel spec: {0}")]
    InvalidKernelSpec(String),

    /// The container engine reported a failure while pushing an image.
    #[error("image push failed: {0}")]
    PushFailed(String),

    /// The container engine did not report an identifier for a committed image.
    #[error("committed image {0} has no identifier")]
    MissingImageId(String),

    /// The consumer of an event stream went away.
    #[error("event receiver has been dropped")]
    ReceiverDropped,

    /// The work was cancelled before it finished.
    #[error("cancelled")]
    Cancelled,
}

/// An error that can represent any error.
#[derive(Debug)]
pub struct AnyError {
    error: anyhow::Error,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl NbContainerError {
    /// Wraps any error.
    pub fn custom(error: impl Into<anyhow::Error>) -> NbContainerError {
        NbContainerError::Custom(AnyError {
            error: error.into(),
        })
    }

    /// Renders the error together with its chain of causes.
    pub fn trace(self) -> String {
        format!("{:?}", anyhow::Error::from(self))
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl PartialEq for AnyError {
    fn eq(&self, other: &Self) -> bool {
        self.error.to_string() == other.error.to_string()
    }
}

impl Display for AnyError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl Error for AnyError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.error.source()
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
