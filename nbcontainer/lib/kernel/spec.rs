//! Kernels described by Jupyter `kernel.json` files.

use std::{collections::BTreeMap, path::PathBuf, process::Output};

use serde::Deserialize;
use tokio::process::Command;

use crate::{NbContainerError, NbContainerResult};

use super::{is_valid_kernel_name, KernelEnvironment, KernelResolver};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

const KERNEL_SPEC_FILE: &str = "kernel.json";

const SYS_PATH_SCRIPT: &str = "import json, sys; print(json.dumps(sys.path))";

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Resolves kernels from `<dir>/<kernel>/kernel.json` in a list of spec directories.
///
/// The first directory holding the kernel wins. The interpreter is `argv[0]` of the spec and its
/// search paths are asked from the interpreter itself.
#[derive(Debug, Clone)]
pub struct KernelSpecResolver {
    spec_dirs: Vec<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct KernelSpec {
    argv: Vec<String>,

    #[serde(default)]
    env: BTreeMap<String, String>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl KernelSpecResolver {
    /// Creates a resolver searching `spec_dirs` in order.
    pub fn new(spec_dirs: Vec<PathBuf>) -> Self {
        Self { spec_dirs }
    }

    async fn read_spec(&self, kernel: &str) -> NbContainerResult<KernelSpec> {
        if !is_valid_kernel_name(kernel) {
            return Err(NbContainerError::KernelNotFound(kernel.to_string()));
        }

        for dir in &self.spec_dirs {
            let path = dir.join(kernel).join(KERNEL_SPEC_FILE);
            if !tokio::fs::try_exists(&path).await? {
                continue;
            }

            tracing::debug!("reading kernel spec {}", path.display());
            let contents = tokio::fs::read(&path).await?;
            return Ok(serde_json::from_slice(&contents)?);
        }

        Err(NbContainerError::KernelNotFound(kernel.to_string()))
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

fn ensure_success(what: &str, output: &Output) -> NbContainerResult<()> {
    if output.status.success() {
        return Ok(());
    }

    Err(NbContainerError::InvalidKernelSpec(format!(
        "{what} exited with {}: {}",
        output.status,
        String::from_utf8_lossy(&output.stderr).trim()
    )))
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

#[async_trait::async_trait]
impl KernelResolver for KernelSpecResolver {
    async fn resolve(&self, kernel: &str) -> NbContainerResult<KernelEnvironment> {
        let spec = self.read_spec(kernel).await?;
        let interpreter = spec.argv.first().cloned().ok_or_else(|| {
            NbContainerError::InvalidKernelSpec(format!("kernel {kernel} has an empty argv"))
        })?;

        let output = Command::new(&interpreter)
            .args(["-c", SYS_PATH_SCRIPT])
            .output()
            .await?;
        ensure_success(&interpreter, &output)?;

        let search_paths: Vec<String> = serde_json::from_slice(&output.stdout)?;

        Ok(KernelEnvironment::builder()
            .interpreter(interpreter)
            .env(spec.env)
            .search_paths(
                search_paths
                    .into_iter()
                    .filter(|path| !path.is_empty())
                    .map(PathBuf::from)
                    .collect(),
            )
            .build())
    }

    async fn install_packages(
        &self,
        environment: &KernelEnvironment,
        packages: &[String],
    ) -> NbContainerResult<()> {
        if packages.is_empty() {
            return Ok(());
        }

        let pip = environment
            .get_interpreter()
            .parent()
            .map(|dir| dir.join("pip"))
            .unwrap_or_else(|| PathBuf::from("pip"));

        tracing::info!("installing {} into the kernel environment", packages.join(", "));
        let output = Command::new(&pip)
            .args(["install", "-q"])
            .args(packages)
            .output()
            .await?;
        ensure_success(&pip.display().to_string(), &output)
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
