use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use getset::Getters;
use typed_builder::TypedBuilder;

use crate::NbContainerResult;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The prefix conda kernels carry in front of their environment name.
pub const CONDA_PREFIX: &str = "conda_";

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The interpreter environment a kernel runs in.
#[derive(Debug, Clone, PartialEq, TypedBuilder, Getters)]
#[getset(get = "pub with_prefix")]
pub struct KernelEnvironment {
    /// The interpreter executable.
    #[builder(setter(into))]
    interpreter: PathBuf,

    /// Environment variables the kernel is started with.
    #[builder(default)]
    env: BTreeMap<String, String>,

    /// The interpreter's library search paths.
    #[builder(default)]
    search_paths: Vec<PathBuf>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl KernelEnvironment {
    /// The directories worth copying for `kernel`: the search paths, the interpreter's directory,
    /// `extra_paths` and the kernel's environment directory under `env_root`.
    pub fn copy_candidates(
        &self,
        kernel: &str,
        extra_paths: &[PathBuf],
        env_root: &Path,
    ) -> Vec<PathBuf> {
        let env_name = kernel.strip_prefix(CONDA_PREFIX).unwrap_or(kernel);

        self.search_paths
            .iter()
            .cloned()
            .chain(self.interpreter.parent().map(Path::to_path_buf))
            .chain(extra_paths.iter().cloned())
            .chain(std::iter::once(env_root.join(env_name)))
            .collect()
    }

    /// `KEY=value` pairs for a container, with `extra` added last.
    pub fn container_env(&self, extra: &[(&str, &str)]) -> Vec<String> {
        self.env
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
            .chain(extra.iter().copied())
            .map(|(key, value)| format!("{key}={value}"))
            .collect()
    }
}

//--------------------------------------------------------------------------------------------------
// Traits
//--------------------------------------------------------------------------------------------------

/// Looks up kernels and prepares their environments.
#[async_trait::async_trait]
pub trait KernelResolver: Send + Sync {
    /// Resolves a kernel name, without its `containerized_` prefix.
    async fn resolve(&self, kernel: &str) -> NbContainerResult<KernelEnvironment>;

    /// Installs packages into the kernel environment.
    async fn install_packages(
        &self,
        environment: &KernelEnvironment,
        packages: &[String],
    ) -> NbContainerResult<()>;
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Whether `name` is a usable kernel name: ASCII letters, digits, `.`, `_` and `-`, as Jupyter
/// allows for kernel directories. Names that could step out of a directory are refused.
pub fn is_valid_kernel_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && !name.contains("..")
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
