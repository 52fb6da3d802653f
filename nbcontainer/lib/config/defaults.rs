//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The directory notebook paths sent by clients are relative to.
pub const DEFAULT_NOTEBOOK_ROOT: &str = "/home/ec2-user/SageMaker";

/// The name of the running container that hosts the containerized kernels.
pub const DEFAULT_KERNEL_CONTAINER: &str = "containerized_kernels";

/// The fixed name of the container files are staged into before committing.
pub const DEFAULT_STAGED_CONTAINER: &str = "interim_containerized_kernel";

/// The fixed name of the image produced by the creation pipeline.
pub const DEFAULT_OUTPUT_IMAGE: &str = "output_image";

/// Where the notebook execution entrypoint is shipped on the host.
pub const DEFAULT_ENTRYPOINT_SOURCE: &str = "/usr/share/nbcontainer/iota_run_nb.py";

/// Where the notebook execution entrypoint lives, both on the host and inside the image.
pub const DEFAULT_ENTRYPOINT_PATH: &str = "/home/ec2-user/iota_run_nb.py";

/// Directories always copied into the image besides the kernel's own paths.
pub const DEFAULT_EXTRA_COPY_PATHS: &[&str] = &["/home/ec2-user/SageMaker", "/home/ec2-user/.aws"];

/// Directories searched for `<kernel>/kernel.json`.
pub const DEFAULT_KERNEL_SPEC_DIRS: &[&str] = &[
    "/home/ec2-user/.local/share/jupyter/kernels",
    "/usr/local/share/jupyter/kernels",
    "/usr/share/jupyter/kernels",
];

/// The directory holding one folder per conda environment.
pub const DEFAULT_ENV_ROOT: &str = "/home/ec2-user/anaconda3/envs";

/// File extensions never copied into the image.
pub const DEFAULT_EXCLUDED_EXTENSIONS: &[&str] = &[".pyc"];

/// Packages the entrypoint needs inside the kernel environment.
pub const DEFAULT_REQUIRED_PACKAGES: &[&str] = &["asttokens==1.1.10"];

/// The largest amount of file data uploaded to the staged container in one archive (512 MiB).
pub const DEFAULT_MAX_BATCH_BYTES: u64 = 512 * 1024 * 1024;

/// The number of blocking filesystem jobs allowed to run at once.
pub const DEFAULT_WORKER_THREADS: usize = 4;

/// The path whose filesystem must hold the staged container and image.
pub const DEFAULT_BUDGET_PATH: &str = "/";

/// Bytes of free space required per byte copied.
///
/// Copied data lives in both the staged container and the committed image. A quick measurement
/// found roughly 1.45x actual use because images are compressed, so this is conservative while
/// still allowing instances with little headroom to containerize.
pub const DEFAULT_DUPLICATION_FACTOR: f64 = 1.9;

/// Extra free space required on top of the duplicated copy size (10 MiB).
pub const DEFAULT_SAFETY_MARGIN_BYTES: u64 = 10 * 1024 * 1024;

/// The registry used when none is configured.
pub const DEFAULT_REGISTRY_ENDPOINT: &str = "http://localhost:5000";

/// Default host for the HTTP server
pub const DEFAULT_SERVER_HOST: &str = "127.0.0.1";

/// Default port for the HTTP server
pub const DEFAULT_SERVER_PORT: u16 = 8989;

/// Default prefix the routes are nested under.
pub const DEFAULT_BASE_URL: &str = "/";

/// Default location of the process log.
pub const DEFAULT_LOG_PATH: &str = "/var/log/nbcontainer.log";

/// Default size at which the process log rotates (10 MiB).
pub const DEFAULT_LOG_MAX_BYTES: u64 = 10 * 1024 * 1024;

/// Default number of rotated process logs kept.
pub const DEFAULT_LOG_BACKUPS: usize = 5;

/// Environment variable overriding the registry user name.
pub const REGISTRY_USERNAME_ENV_VAR: &str = "NBCONTAINER_REGISTRY_USERNAME";

/// Environment variable overriding the registry password.
pub const REGISTRY_PASSWORD_ENV_VAR: &str = "NBCONTAINER_REGISTRY_PASSWORD";

/// Environment variable naming the configuration file.
pub const CONFIG_ENV_VAR: &str = "NBCONTAINER_CONFIG";
