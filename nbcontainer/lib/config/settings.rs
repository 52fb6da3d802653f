//! The nbcontainer service configuration.

use std::path::{Path, PathBuf};

use getset::Getters;
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::NbContainerResult;

use super::*;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The nbcontainer configuration, usually loaded from a TOML file.
///
/// Every field has a default, so an empty file (or no file at all) yields a working
/// configuration for a notebook instance laid out the standard way.
///
/// ## Examples
///
/// ```
/// use nbcontainer::config::NbContainerConfig;
///
/// let config: NbContainerConfig = toml::from_str(
///     r#"
///     notebook_root = "/srv/notebooks"
///
///     [registry]
///     endpoint = "https://registry.example.com"
///     "#,
/// )
/// .unwrap();
///
/// assert_eq!(config.get_notebook_root().to_str(), Some("/srv/notebooks"));
/// assert_eq!(config.get_output_image(), "output_image");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder, PartialEq, Getters)]
#[getset(get = "pub with_prefix")]
#[serde(default)]
pub struct NbContainerConfig {
    /// The directory notebook paths are relative to.
    #[builder(default = PathBuf::from(DEFAULT_NOTEBOOK_ROOT), setter(into))]
    notebook_root: PathBuf,

    /// The running container hosting the kernels.
    #[builder(default = DEFAULT_KERNEL_CONTAINER.to_string(), setter(into))]
    kernel_container: String,

    /// The staged container name.
    #[builder(default = DEFAULT_STAGED_CONTAINER.to_string(), setter(into))]
    staged_container: String,

    /// The output image name.
    #[builder(default = DEFAULT_OUTPUT_IMAGE.to_string(), setter(into))]
    output_image: String,

    /// Where the entrypoint script is copied from.
    #[builder(default = PathBuf::from(DEFAULT_ENTRYPOINT_SOURCE), setter(into))]
    entrypoint_source: PathBuf,

    /// Where the entrypoint script is placed, on the host and inside the image.
    #[builder(default = PathBuf::from(DEFAULT_ENTRYPOINT_PATH), setter(into))]
    entrypoint_path: PathBuf,

    /// Additional directories copied into the image.
    #[builder(default = to_paths(DEFAULT_EXTRA_COPY_PATHS))]
    extra_copy_paths: Vec<PathBuf>,

    /// Directories searched for kernel specifications.
    #[builder(default = to_paths(DEFAULT_KERNEL_SPEC_DIRS))]
    kernel_spec_dirs: Vec<PathBuf>,

    /// The directory of conda environments.
    #[builder(default = PathBuf::from(DEFAULT_ENV_ROOT), setter(into))]
    env_root: PathBuf,

    /// Extensions, including the leading dot, skipped while copying.
    #[builder(default = to_strings(DEFAULT_EXCLUDED_EXTENSIONS))]
    excluded_extensions: Vec<String>,

    /// Packages installed into the kernel environment before copying.
    #[builder(default = to_strings(DEFAULT_REQUIRED_PACKAGES))]
    required_packages: Vec<String>,

    /// The maximum size of one upload batch.
    #[builder(default = DEFAULT_MAX_BATCH_BYTES)]
    max_batch_bytes: u64,

    /// The size of the blocking worker pool.
    #[builder(default = DEFAULT_WORKER_THREADS)]
    worker_threads: usize,

    /// The disk budget settings.
    #[builder(default)]
    budget: BudgetConfig,

    /// The destination registry settings.
    #[builder(default)]
    registry: RegistryConfig,

    /// The HTTP server settings.
    #[builder(default)]
    server: ServerConfig,

    /// The process log settings.
    #[builder(default)]
    log: LogConfig,
}

/// Free space requirements checked before a staged container is created.
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder, PartialEq, Getters)]
#[getset(get = "pub with_prefix")]
#[serde(default)]
pub struct BudgetConfig {
    /// A path on the filesystem that will hold the container and the image.
    #[builder(default = PathBuf::from(DEFAULT_BUDGET_PATH), setter(into))]
    path: PathBuf,

    /// Bytes of free space required per copied byte.
    #[builder(default = DEFAULT_DUPLICATION_FACTOR)]
    duplication_factor: f64,

    /// Extra bytes of free space required.
    #[builder(default = DEFAULT_SAFETY_MARGIN_BYTES)]
    safety_margin_bytes: u64,
}

/// Where images are published.
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder, PartialEq, Getters)]
#[getset(get = "pub with_prefix")]
#[serde(default)]
pub struct RegistryConfig {
    /// The registry base URL, including its scheme.
    #[builder(default = DEFAULT_REGISTRY_ENDPOINT.to_string(), setter(into))]
    endpoint: String,

    /// The user name used for registry requests and pushes.
    #[builder(default, setter(into, strip_option))]
    username: Option<String>,

    /// The password used for registry requests and pushes.
    #[builder(default, setter(into, strip_option))]
    password: Option<String>,
}

/// The HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder, PartialEq, Getters)]
#[getset(get = "pub with_prefix")]
#[serde(default)]
pub struct ServerConfig {
    /// The address to bind.
    #[builder(default = DEFAULT_SERVER_HOST.to_string(), setter(into))]
    host: String,

    /// The port to bind.
    #[builder(default = DEFAULT_SERVER_PORT)]
    port: u16,

    /// The prefix all routes are nested under.
    #[builder(default = DEFAULT_BASE_URL.to_string(), setter(into))]
    base_url: String,
}

/// The process log settings.
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder, PartialEq, Getters)]
#[getset(get = "pub with_prefix")]
#[serde(default)]
pub struct LogConfig {
    /// The active log file.
    #[builder(default = PathBuf::from(DEFAULT_LOG_PATH), setter(into))]
    path: PathBuf,

    /// The size at which the log rotates.
    #[builder(default = DEFAULT_LOG_MAX_BYTES)]
    max_bytes: u64,

    /// The number of rotated logs kept.
    #[builder(default = DEFAULT_LOG_BACKUPS)]
    backups: usize,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl NbContainerConfig {
    /// Loads the configuration from `path`, or the defaults when no path is given.
    ///
    /// Registry credentials found in the environment take precedence over the file.
    pub async fn load(path: Option<&Path>) -> NbContainerResult<Self> {
        let mut config = match path {
            Some(path) => {
                let contents = tokio::fs::read_to_string(path).await?;
                toml::from_str::<Self>(&contents)?
            }
            None => Self::default(),
        };

        config.registry.apply_env();
        Ok(config)
    }

    /// Overrides where the HTTP server listens.
    pub fn override_server(
        &mut self,
        host: Option<String>,
        port: Option<u16>,
        base_url: Option<String>,
    ) {
        if let Some(host) = host {
            self.server.host = host;
        }
        if let Some(port) = port {
            self.server.port = port;
        }
        if let Some(base_url) = base_url {
            self.server.base_url = base_url;
        }
    }
}

impl RegistryConfig {
    fn apply_env(&mut self) {
        if let Ok(username) = std::env::var(REGISTRY_USERNAME_ENV_VAR) {
            self.username = Some(username);
        }
        if let Ok(password) = std::env::var(REGISTRY_PASSWORD_ENV_VAR) {
            self.password = Some(password);
        }
    }

    /// The registry host as used in image references, without the URL scheme.
    pub fn host(&self) -> &str {
        let endpoint = self.endpoint.trim_end_matches('/');
        endpoint
            .split_once("://")
            .map(|(_, host)| host)
            .unwrap_or(endpoint)
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

fn to_paths(paths: &[&str]) -> Vec<PathBuf> {
    paths.iter().map(PathBuf::from).collect()
}

fn to_strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Default for NbContainerConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
