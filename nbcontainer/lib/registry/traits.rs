use getset::Getters;
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::NbContainerResult;

use super::{Annotations, BearerChallenge};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Credentials handed to the container engine when pushing.
#[derive(Debug, Clone, PartialEq, TypedBuilder, Getters)]
#[getset(get = "pub with_prefix")]
pub struct RegistryCredentials {
    /// The user name.
    #[builder(default, setter(into, strip_option))]
    pub(super) username: Option<String>,

    /// The password.
    #[builder(default, setter(into, strip_option))]
    pub(super) password: Option<String>,

    /// The registry host the credentials belong to.
    #[builder(setter(into))]
    pub(super) server_address: String,
}

/// One page of repository names.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepositoryPage {
    /// Repository names on this page.
    pub repositories: Vec<String>,

    /// Passed back to fetch the next page; `None` on the last page.
    pub next_token: Option<String>,
}

/// A manifest as stored in the registry.
///
/// The body is kept as loose JSON so that fields this crate does not know about survive a
/// fetch-modify-put round trip.
#[derive(Debug, Clone, PartialEq, Getters)]
#[getset(get = "pub with_prefix")]
pub struct Manifest {
    /// The manifest media type.
    media_type: String,

    /// The manifest document.
    body: serde_json::Value,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl Manifest {
    /// Creates a manifest.
    pub fn new(media_type: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            media_type: media_type.into(),
            body,
        }
    }

    /// A copy whose `annotations` field is replaced.
    pub fn with_annotations(&self, annotations: &Annotations) -> NbContainerResult<Self> {
        let mut body = self.body.clone();
        if let Some(object) = body.as_object_mut() {
            object.insert("annotations".to_string(), serde_json::to_value(annotations)?);
        }

        Ok(Self {
            media_type: self.media_type.clone(),
            body,
        })
    }
}

//--------------------------------------------------------------------------------------------------
// Traits
//--------------------------------------------------------------------------------------------------

/// Trait for establishing authentication necessary for a registry client.
#[async_trait::async_trait]
pub trait AuthProvider {
    /// The type of the authentication material.
    type AuthMaterial;

    /// Answers an authentication challenge returned by the registry.
    async fn get_auth_material(
        &self,
        challenge: &BearerChallenge,
    ) -> NbContainerResult<Self::AuthMaterial>;
}

/// Repository level operations.
#[async_trait::async_trait]
pub trait RepositoryCatalog: Send + Sync {
    /// Creates an empty repository.
    async fn create_repository(&self, name: &str) -> NbContainerResult<()>;

    /// Lists repositories a page at a time.
    async fn list_repositories(&self, next_token: Option<&str>) -> NbContainerResult<RepositoryPage>;

    /// Returns the URI images of `name` are pushed to, or `None` if the repository does not exist.
    async fn repository_uri(&self, name: &str) -> NbContainerResult<Option<String>>;
}

/// Manifest operations on tags.
#[async_trait::async_trait]
pub trait ManifestStore: Send + Sync {
    /// Fetches the manifest `repository:tag` points at.
    async fn fetch_manifest(&self, repository: &str, tag: &str) -> NbContainerResult<Manifest>;

    /// Stores `manifest` and points `repository:tag` at it.
    async fn put_manifest(
        &self,
        repository: &str,
        tag: &str,
        manifest: &Manifest,
    ) -> NbContainerResult<()>;

    /// Removes a tag.
    async fn delete_tag(&self, repository: &str, tag: &str) -> NbContainerResult<()>;
}

/// Everything the service needs from a registry.
pub trait Registry: RepositoryCatalog + ManifestStore {
    /// Credentials for pushing images, if the registry needs them.
    fn credentials(&self) -> Option<RegistryCredentials>;
}
