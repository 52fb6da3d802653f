use bytes::Bytes;
use futures::stream::BoxStream;
use getset::Getters;
use typed_builder::TypedBuilder;

use crate::{registry::RegistryCredentials, NbContainerResult};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// What the staged container is created from.
#[derive(Debug, Clone, PartialEq, TypedBuilder, Getters)]
#[getset(get = "pub with_prefix")]
pub struct ContainerSpec {
    /// The container name.
    #[builder(setter(into))]
    name: String,

    /// The image the container runs.
    #[builder(setter(into))]
    image: String,

    /// Environment variables as `KEY=value` pairs.
    #[builder(default)]
    env: Vec<String>,
}

//--------------------------------------------------------------------------------------------------
// Traits
//--------------------------------------------------------------------------------------------------

/// The container engine operations used to stage, commit and push an image.
///
/// Containers created through this trait share the host network and keep stdin open, matching
/// how the kernel container itself runs.
#[async_trait::async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Removes `image` along with every container created from it. Missing images are ignored.
    async fn remove_image_and_dependents(&self, image: &str) -> NbContainerResult<()>;

    /// Stops and removes a container. Missing containers are ignored.
    async fn remove_container(&self, name: &str) -> NbContainerResult<()>;

    /// Returns the identifier of the image a container runs.
    async fn container_image(&self, name: &str) -> NbContainerResult<String>;

    /// Creates a container and returns its identifier.
    async fn create_container(&self, spec: &ContainerSpec) -> NbContainerResult<String>;

    /// Starts a created container.
    async fn start_container(&self, name: &str) -> NbContainerResult<()>;

    /// Extracts a tar archive into the container's root directory.
    async fn upload_archive(&self, container: &str, archive: Bytes) -> NbContainerResult<()>;

    /// Commits a container to `image` with the given entrypoint and returns the image identifier.
    async fn commit_container(
        &self,
        container: &str,
        image: &str,
        entrypoint: &[String],
    ) -> NbContainerResult<String>;

    /// Tags `image` as `repository:tag`.
    async fn tag_image(&self, image: &str, repository: &str, tag: &str) -> NbContainerResult<()>;

    /// Pushes `repository:tag`, yielding the engine's raw JSON status records.
    ///
    /// Records look like `{"status": ..., "progressDetail": {"current": .., "total": ..}}`, and
    /// carry an `error` field when the push fails.
    fn push_image(
        &self,
        repository: &str,
        tag: &str,
        credentials: Option<RegistryCredentials>,
    ) -> BoxStream<'static, NbContainerResult<serde_json::Value>>;
}
