#![allow(dead_code)]

use std::{
    collections::{BTreeMap, BTreeSet},
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use bytes::Bytes;
use futures::{stream::BoxStream, StreamExt};
use nbcontainer::{
    config::{BudgetConfig, NbContainerConfig},
    coordinator::{Containerizer, Session},
    kernel::{KernelEnvironment, KernelResolver},
    registry::{
        Manifest, ManifestStore, Registry, RegistryCredentials, RepositoryCatalog, RepositoryPage,
    },
    runtime::{ContainerRuntime, ContainerSpec},
    status::StatusLogEntry,
    NbContainerError, NbContainerResult,
};
use serde_json::{json, Value};
use tempfile::TempDir;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

pub const NOTEBOOK: &str = "project/analysis.ipynb";

pub const REPOSITORY: &str = "demo";

pub const BUILT_IMAGE: &str = "sha256:0123456789abcdef";

pub const KERNEL_IMAGE: &str = "sha256:kernel";

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A container engine that records what it is asked to do.
#[derive(Default)]
pub struct FakeRuntime {
    pub calls: Mutex<Vec<String>>,
    pub containers: Mutex<BTreeSet<String>>,
    pub archives: Mutex<Vec<Vec<PathBuf>>>,
    pub commits: Mutex<Vec<Vec<String>>>,
    pub push_records: Mutex<Vec<Value>>,
    pub fail_commit: AtomicBool,
    pub upload_delay: Mutex<Option<Duration>>,
    pub remove_delay: Mutex<Option<Duration>>,
}

/// An in-memory registry.
#[derive(Default)]
pub struct FakeRegistry {
    pub repositories: Mutex<BTreeMap<String, BTreeMap<String, Manifest>>>,
}

/// Resolves every kernel to the same environment.
pub struct FakeKernels {
    pub environment: KernelEnvironment,
    pub installed: Mutex<Vec<String>>,
}

/// A containerizer over fakes and a scratch directory laid out like a notebook instance.
pub struct Harness {
    pub dir: TempDir,
    pub runtime: Arc<FakeRuntime>,
    pub registry: Arc<FakeRegistry>,
    pub kernels: Arc<FakeKernels>,
    pub containerizer: Containerizer,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl FakeRuntime {
    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn called(&self, prefix: &str) -> bool {
        self.calls().iter().any(|call| call.starts_with(prefix))
    }

    pub fn set_push_records(&self, records: Vec<Value>) {
        *self.push_records.lock().unwrap() = records;
    }

    /// Makes every archive upload take `delay`.
    pub fn set_upload_delay(&self, delay: Duration) {
        *self.upload_delay.lock().unwrap() = Some(delay);
    }

    /// Makes every container removal take `delay`.
    pub fn set_remove_delay(&self, delay: Duration) {
        *self.remove_delay.lock().unwrap() = Some(delay);
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| call.starts_with(prefix))
            .count()
    }
}

impl FakeRegistry {
    pub fn with_repository(name: &str) -> Self {
        let registry = Self::default();
        registry.seed(name, "interim", interim_manifest());
        registry
    }

    pub fn seed(&self, repository: &str, tag: &str, manifest: Manifest) {
        self.repositories
            .lock()
            .unwrap()
            .entry(repository.to_string())
            .or_default()
            .insert(tag.to_string(), manifest);
    }

    pub fn manifest(&self, repository: &str, tag: &str) -> Option<Manifest> {
        self.repositories
            .lock()
            .unwrap()
            .get(repository)?
            .get(tag)
            .cloned()
    }
}

impl FakeKernels {
    pub fn new(environment: KernelEnvironment) -> Self {
        Self {
            environment,
            installed: Mutex::new(Vec::new()),
        }
    }
}

impl Harness {
    /// A harness with the `demo` repository and default settings.
    pub fn new() -> anyhow::Result<Self> {
        Self::with(base_config, FakeRegistry::with_repository(REPOSITORY))
    }

    /// A harness whose configuration is built by `configure` from the scratch directory.
    pub fn with(
        configure: impl FnOnce(&Path) -> NbContainerConfig,
        registry: FakeRegistry,
    ) -> anyhow::Result<Self> {
        let dir = TempDir::new()?;
        let root = dir.path();

        write(&root.join("notebooks").join(NOTEBOOK), "{\"cells\": []}")?;
        write(&root.join("src/run_nb.py"), "print('run')\n")?;
        write(&root.join("env/bin/python"), "#!/bin/sh\n")?;
        write(&root.join("env/lib/site.py"), "import sys\nprint(sys.path)\n")?;
        write(&root.join("env/lib/cache.pyc"), "compiled")?;
        write(&root.join("env/lib/pkg/mod.py"), "VALUE = 1\n")?;

        let config = configure(root);
        let environment = KernelEnvironment::builder()
            .interpreter(root.join("env/bin/python"))
            .env(BTreeMap::from([(
                "PATH".to_string(),
                "/usr/bin".to_string(),
            )]))
            .search_paths(vec![root.join("env/lib")])
            .build();

        let runtime = Arc::new(FakeRuntime::default());
        let registry = Arc::new(registry);
        let kernels = Arc::new(FakeKernels::new(environment));
        let containerizer = Containerizer::new(
            config,
            runtime.clone(),
            registry.clone(),
            kernels.clone(),
        );

        Ok(Self {
            dir,
            runtime,
            registry,
            kernels,
            containerizer,
        })
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn status_log(&self) -> PathBuf {
        self.root()
            .join("notebooks/project/analysis.containerizer_log")
    }

    /// Runs a session for `message` to its end and returns the entries and the session.
    pub async fn run(&self, message: &str) -> (Vec<StatusLogEntry>, Session) {
        let claim = self
            .containerizer
            .try_claim()
            .expect("no session should be running");
        let mut session = self.containerizer.start(claim, message);

        let mut entries = Vec::new();
        while let Some(entry) = session.next().await {
            entries.push(entry);
        }

        (entries, session)
    }

    /// The status log, one entry per line.
    /// Polls `condition` for up to a second.
    pub async fn wait_until(&self, condition: impl Fn() -> bool) -> bool {
        for _ in 0..100 {
            if condition() {
                return true;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        condition()
    }

    pub fn read_status_log(&self) -> anyhow::Result<Vec<StatusLogEntry>> {
        let contents = std::fs::read_to_string(self.status_log())?;
        contents
            .lines()
            .map(|line| Ok(serde_json::from_str(line)?))
            .collect()
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

#[async_trait::async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn remove_image_and_dependents(&self, image: &str) -> NbContainerResult<()> {
        self.record(format!("remove_image {image}"));
        Ok(())
    }

    async fn remove_container(&self, name: &str) -> NbContainerResult<()> {
        self.record(format!("remove_container {name}"));
        pause(&self.remove_delay).await;
        self.containers.lock().unwrap().remove(name);
        Ok(())
    }

    async fn container_image(&self, name: &str) -> NbContainerResult<String> {
        self.record(format!("container_image {name}"));
        Ok(KERNEL_IMAGE.to_string())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> NbContainerResult<String> {
        self.record(format!(
            "create_container {} {} {}",
            spec.get_name(),
            spec.get_image(),
            spec.get_env().join(" ")
        ));
        self.containers
            .lock()
            .unwrap()
            .insert(spec.get_name().clone());
        Ok(format!("id-{}", spec.get_name()))
    }

    async fn start_container(&self, name: &str) -> NbContainerResult<()> {
        self.record(format!("start_container {name}"));
        Ok(())
    }

    async fn upload_archive(&self, container: &str, archive: Bytes) -> NbContainerResult<()> {
        self.record(format!("upload_archive {container}"));
        pause(&self.upload_delay).await;
        if !self.containers.lock().unwrap().contains(container) {
            return Err(NbContainerError::custom(anyhow::anyhow!(
                "no such container: {container}"
            )));
        }

        let mut reader = tar::Archive::new(archive.as_ref());
        let mut paths = Vec::new();
        for entry in reader.entries()? {
            paths.push(entry?.path()?.into_owned());
        }
        self.archives.lock().unwrap().push(paths);
        Ok(())
    }

    async fn commit_container(
        &self,
        container: &str,
        image: &str,
        entrypoint: &[String],
    ) -> NbContainerResult<String> {
        self.record(format!("commit_container {container} {image}"));
        if self.fail_commit.load(Ordering::SeqCst) {
            return Err(NbContainerError::MissingImageId(image.to_string()));
        }

        self.commits.lock().unwrap().push(entrypoint.to_vec());
        Ok(BUILT_IMAGE.to_string())
    }

    async fn tag_image(&self, image: &str, repository: &str, tag: &str) -> NbContainerResult<()> {
        self.record(format!("tag_image {image} {repository}:{tag}"));
        Ok(())
    }

    fn push_image(
        &self,
        repository: &str,
        tag: &str,
        _credentials: Option<RegistryCredentials>,
    ) -> BoxStream<'static, NbContainerResult<Value>> {
        self.record(format!("push_image {repository}:{tag}"));
        let records = self.push_records.lock().unwrap().clone();
        futures::stream::iter(records.into_iter().map(Ok)).boxed()
    }
}

#[async_trait::async_trait]
impl RepositoryCatalog for FakeRegistry {
    async fn create_repository(&self, name: &str) -> NbContainerResult<()> {
        let mut repositories = self.repositories.lock().unwrap();
        if repositories.contains_key(name) {
            return Err(NbContainerError::RepositoryAlreadyExists(name.to_string()));
        }

        repositories.insert(name.to_string(), BTreeMap::new());
        Ok(())
    }

    async fn list_repositories(
        &self,
        _next_token: Option<&str>,
    ) -> NbContainerResult<RepositoryPage> {
        Ok(RepositoryPage {
            repositories: self.repositories.lock().unwrap().keys().cloned().collect(),
            next_token: None,
        })
    }

    async fn repository_uri(&self, name: &str) -> NbContainerResult<Option<String>> {
        let exists = self.repositories.lock().unwrap().contains_key(name);
        Ok(exists.then(|| format!("registry.test/{name}")))
    }
}

#[async_trait::async_trait]
impl ManifestStore for FakeRegistry {
    async fn fetch_manifest(&self, repository: &str, tag: &str) -> NbContainerResult<Manifest> {
        self.manifest(repository, tag)
            .ok_or_else(|| NbContainerError::ManifestNotFound {
                repository: repository.to_string(),
                reference: tag.to_string(),
            })
    }

    async fn put_manifest(
        &self,
        repository: &str,
        tag: &str,
        manifest: &Manifest,
    ) -> NbContainerResult<()> {
        self.seed(repository, tag, manifest.clone());
        Ok(())
    }

    async fn delete_tag(&self, repository: &str, tag: &str) -> NbContainerResult<()> {
        if let Some(tags) = self.repositories.lock().unwrap().get_mut(repository) {
            tags.remove(tag);
        }
        Ok(())
    }
}

impl Registry for FakeRegistry {
    fn credentials(&self) -> Option<RegistryCredentials> {
        None
    }
}

#[async_trait::async_trait]
impl KernelResolver for FakeKernels {
    async fn resolve(&self, _kernel: &str) -> NbContainerResult<KernelEnvironment> {
        Ok(self.environment.clone())
    }

    async fn install_packages(
        &self,
        _environment: &KernelEnvironment,
        packages: &[String],
    ) -> NbContainerResult<()> {
        self.installed.lock().unwrap().extend_from_slice(packages);
        Ok(())
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Settings pointing every path into `root`.
pub fn base_config(root: &Path) -> NbContainerConfig {
    config_with_margin(root, 0)
}

/// Like [`base_config`] but requiring `safety_margin_bytes` of spare disk space.
pub fn config_with_margin(root: &Path, safety_margin_bytes: u64) -> NbContainerConfig {
    config(root, safety_margin_bytes, 24)
}

/// Like [`base_config`] but copying at most `max_batch_bytes` per archive.
pub fn config_with_batch_limit(root: &Path, max_batch_bytes: u64) -> NbContainerConfig {
    config(root, 0, max_batch_bytes)
}

fn config(root: &Path, safety_margin_bytes: u64, max_batch_bytes: u64) -> NbContainerConfig {
    NbContainerConfig::builder()
        .notebook_root(root.join("notebooks"))
        .entrypoint_source(root.join("src/run_nb.py"))
        .entrypoint_path(root.join("image/run_nb.py"))
        .extra_copy_paths(vec![])
        .env_root(root.join("envs"))
        .max_batch_bytes(max_batch_bytes)
        .worker_threads(2)
        .budget(
            BudgetConfig::builder()
                .path(root)
                .duplication_factor(1.9)
                .safety_margin_bytes(safety_margin_bytes)
                .build(),
        )
        .build()
}

pub fn interim_manifest() -> Manifest {
    Manifest::new(
        "application/vnd.docker.distribution.manifest.v2+json",
        json!({
            "schemaVersion": 2,
            "mediaType": "application/vnd.docker.distribution.manifest.v2+json",
            "config": {"digest": "sha256:config"},
            "layers": [{"digest": "sha256:layer"}],
        }),
    )
}

/// Push records for a single layer pushed in four steps.
pub fn push_progress() -> Vec<Value> {
    vec![
        json!({"status": "The push refers to repository [registry.test/demo]"}),
        json!({"status": "Preparing", "progressDetail": {}}),
        json!({"status": "Pushing", "progressDetail": {"current": 0, "total": 4}}),
        json!({"status": "Pushing", "progressDetail": {"current": 0, "total": 4}}),
        json!({"status": "Pushing", "progressDetail": {"current": 2, "total": 4}}),
        json!({"status": "Pushing", "progressDetail": {"current": 4, "total": 4}}),
        json!({"status": "Pushed", "progressDetail": {}}),
        json!({"status": "interim: digest: sha256:abc size: 528"}),
    ]
}

pub fn request(repository: &str) -> String {
    json!({
        "notebook_path": NOTEBOOK,
        "kernel_name": "containerized_python3",
        "repository_name": repository,
        "container_name": "Demo",
        "container_description": "A demo notebook",
        "variables": [
            {"name": "alpha", "type": "double", "description": "Learning rate"},
            {"name": "output", "type": "outputFileUri", "description": ""},
        ],
    })
    .to_string()
}

async fn pause(delay: &Mutex<Option<Duration>>) {
    let delay = *delay.lock().unwrap();
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }
}

fn write(path: &Path, contents: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, contents)
}
