//! A [`ContainerRuntime`] backed by the Docker Engine API.

use bollard::{
    auth::DockerCredentials,
    container::{
        Config, CreateContainerOptions, InspectContainerOptions, ListContainersOptions,
        RemoveContainerOptions, StartContainerOptions, UploadToContainerOptions,
    },
    errors::Error as BollardError,
    image::{CommitContainerOptions, PushImageOptions, RemoveImageOptions, TagImageOptions},
    models::HostConfig,
    Docker,
};
use bytes::Bytes;
use futures::{stream::BoxStream, StreamExt};

use crate::{registry::RegistryCredentials, NbContainerError, NbContainerResult};

use super::{ContainerRuntime, ContainerSpec};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Seconds to wait on the engine before giving up on a request.
const DOCKER_TIMEOUT_SECS: u64 = 600;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Drives the local Docker daemon.
#[derive(Debug, Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl DockerRuntime {
    /// Connects to the daemon using the usual environment and socket defaults.
    pub fn connect() -> NbContainerResult<Self> {
        let docker = Docker::connect_with_local_defaults()?.with_timeout(
            std::time::Duration::from_secs(DOCKER_TIMEOUT_SECS),
        );
        Ok(Self { docker })
    }

    /// Wraps an existing client.
    pub fn with_client(docker: Docker) -> Self {
        Self { docker }
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

fn is_not_found(error: &BollardError) -> bool {
    matches!(
        error,
        BollardError::DockerResponseServerError {
            status_code: 404,
            ..
        }
    )
}

fn ignore_not_found(result: Result<(), BollardError>) -> NbContainerResult<()> {
    match result {
        Err(e) if is_not_found(&e) => Ok(()),
        other => Ok(other?),
    }
}

fn entrypoint_change(entrypoint: &[String]) -> NbContainerResult<String> {
    Ok(format!("ENTRYPOINT {}", serde_json::to_string(entrypoint)?))
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

#[async_trait::async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn remove_image_and_dependents(&self, image: &str) -> NbContainerResult<()> {
        let image_id = match self.docker.inspect_image(image).await {
            Ok(inspect) => inspect.id,
            Err(e) if is_not_found(&e) => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        let containers = self
            .docker
            .list_containers(Some(ListContainersOptions::<String> {
                all: true,
                ..Default::default()
            }))
            .await?;

        for container in containers {
            if container.image_id.is_none() || container.image_id != image_id {
                continue;
            }
            if let Some(id) = container.id {
                tracing::info!("removing container {id} created from {image}");
                self.remove_container(&id).await?;
            }
        }

        let removed = self
            .docker
            .remove_image(
                image,
                Some(RemoveImageOptions {
                    force: true,
                    ..Default::default()
                }),
                None,
            )
            .await
            .map(|_| ());
        ignore_not_found(removed)
    }

    async fn remove_container(&self, name: &str) -> NbContainerResult<()> {
        let removed = self
            .docker
            .remove_container(
                name,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await;
        ignore_not_found(removed)
    }

    async fn container_image(&self, name: &str) -> NbContainerResult<String> {
        let inspect = self
            .docker
            .inspect_container(name, None::<InspectContainerOptions>)
            .await?;

        inspect
            .image
            .ok_or_else(|| NbContainerError::custom(anyhow::anyhow!("container {name} has no image")))
    }

    async fn create_container(&self, spec: &ContainerSpec) -> NbContainerResult<String> {
        let config = Config {
            image: Some(spec.get_image().clone()),
            env: Some(spec.get_env().clone()),
            open_stdin: Some(true),
            host_config: Some(HostConfig {
                network_mode: Some("host".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };

        let response = self
            .docker
            .create_container(
                Some(CreateContainerOptions {
                    name: spec.get_name().as_str(),
                    platform: None,
                }),
                config,
            )
            .await?;

        if !response.warnings.is_empty() {
            tracing::warn!(
                "warnings while creating container {}: {:?}",
                spec.get_name(),
                response.warnings
            );
        }

        Ok(response.id)
    }

    async fn start_container(&self, name: &str) -> NbContainerResult<()> {
        self.docker
            .start_container(name, None::<StartContainerOptions<String>>)
            .await?;
        Ok(())
    }

    async fn upload_archive(&self, container: &str, archive: Bytes) -> NbContainerResult<()> {
        self.docker
            .upload_to_container(
                container,
                Some(UploadToContainerOptions {
                    path: "/",
                    ..Default::default()
                }),
                archive,
            )
            .await?;
        Ok(())
    }

    async fn commit_container(
        &self,
        container: &str,
        image: &str,
        entrypoint: &[String],
    ) -> NbContainerResult<String> {
        let changes = entrypoint_change(entrypoint)?;
        self.docker
            .commit_container(
                CommitContainerOptions {
                    container,
                    repo: image,
                    changes: Some(changes.as_str()),
                    ..Default::default()
                },
                Config::<String>::default(),
            )
            .await?;

        self.docker
            .inspect_image(image)
            .await?
            .id
            .ok_or_else(|| NbContainerError::MissingImageId(image.to_string()))
    }

    async fn tag_image(&self, image: &str, repository: &str, tag: &str) -> NbContainerResult<()> {
        self.docker
            .tag_image(image, Some(TagImageOptions { repo: repository, tag }))
            .await?;
        Ok(())
    }

    fn push_image(
        &self,
        repository: &str,
        tag: &str,
        credentials: Option<RegistryCredentials>,
    ) -> BoxStream<'static, NbContainerResult<serde_json::Value>> {
        let docker = self.docker.clone();
        let repository = repository.to_string();
        let tag = tag.to_string();
        let credentials = credentials.map(|c| DockerCredentials {
            username: c.get_username().clone(),
            password: c.get_password().clone(),
            serveraddress: Some(c.get_server_address().clone()),
            ..Default::default()
        });

        async_stream::stream! {
            let mut records = docker.push_image(
                &repository,
                Some(PushImageOptions { tag }),
                credentials,
            );

            while let Some(record) = records.next().await {
                match record {
                    Ok(info) => yield serde_json::to_value(info).map_err(NbContainerError::from),
                    Err(BollardError::DockerStreamError { error }) => {
                        yield Ok(serde_json::json!({ "error": error }));
                    }
                    Err(e) => yield Err(e.into()),
                }
            }
        }
        .boxed()
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
