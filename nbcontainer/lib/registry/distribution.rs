use chrono::{DateTime, Utc};
use getset::Getters;
use reqwest::{
    header::{ACCEPT, CONTENT_TYPE, LINK, LOCATION, WWW_AUTHENTICATE},
    Client, Method, Response, StatusCode, Url,
};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware, RequestBuilder};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::{config::RegistryConfig, NbContainerError, NbContainerResult};

use super::{
    AuthProvider, Manifest, ManifestStore, Registry, RegistryCredentials, RepositoryCatalog,
    RepositoryPage,
};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The MIME type of OCI image manifests.
const OCI_MANIFEST_MIME_TYPE: &str = "application/vnd.oci.image.manifest.v1+json";

/// The MIME type of OCI image configs.
const OCI_CONFIG_MIME_TYPE: &str = "application/vnd.oci.image.config.v1+json";

/// The MIME type for Docker Registry v2 manifests, used to identify the format of the manifest data.
const DOCKER_MANIFEST_MIME_TYPE: &str = "application/vnd.docker.distribution.manifest.v2+json";

/// The header carrying a manifest digest.
const DOCKER_CONTENT_DIGEST: &str = "Docker-Content-Digest";

/// The config blob of the placeholder manifest that seeds new repositories.
const EMPTY_CONFIG: &[u8] = b"{}";

/// The number of repositories requested per catalog page.
const CATALOG_PAGE_SIZE: u32 = 100;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A client for registries speaking the Docker Registry HTTP API v2.
///
/// Requests carry basic auth when credentials are configured. When the registry answers with a
/// bearer challenge instead, a token is fetched from the advertised realm and the request is sent
/// again.
///
/// [See Docker Registry API for more details on the API][Docker Registry API]
///
/// [Docker Registry API]: https://distribution.github.io/distribution/spec/api/#introduction
#[derive(Debug, Getters)]
#[getset(get = "pub")]
pub struct DistributionRegistry {
    /// The HTTP client used to make requests to the registry.
    client: ClientWithMiddleware,

    /// The registry base URL.
    endpoint: String,

    /// The registry host as used in image references.
    host: String,

    #[getset(skip)]
    username: Option<String>,

    #[getset(skip)]
    password: Option<String>,
}

/// Token material returned by a registry's auth realm.
#[derive(Debug, Serialize, Deserialize, Getters)]
#[getset(get = "pub")]
pub struct RegistryAuthMaterial {
    /// The token used to authenticate requests.
    #[serde(default)]
    token: Option<String>,

    /// The OAuth2 flavored name some realms use for the token.
    #[serde(default)]
    access_token: Option<String>,

    /// Seconds the token stays valid.
    #[serde(default)]
    expires_in: Option<u32>,

    /// The time the token was issued.
    #[serde(default)]
    issued_at: Option<DateTime<Utc>>,
}

/// A parsed `WWW-Authenticate: Bearer ...` challenge.
#[derive(Debug, Clone, PartialEq, Getters)]
#[getset(get = "pub")]
pub struct BearerChallenge {
    /// Where tokens are requested.
    realm: String,

    /// The service the token is for.
    service: Option<String>,

    /// The access the token must grant.
    scope: Option<String>,
}

/// Represents an error response from the registry, including detailed error messages.
#[derive(Debug, Serialize, Deserialize, Error)]
#[error("{errors}")]
pub struct RegistryResponseError {
    /// The errors returned by the registry.
    errors: serde_json::Value,
}

#[derive(Deserialize)]
struct CatalogResponse {
    #[serde(default)]
    repositories: Vec<String>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl DistributionRegistry {
    /// Creates a client with an HTTP stack that retries transient errors.
    pub fn new(config: &RegistryConfig) -> Self {
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(3);
        let client = ClientBuilder::new(Client::new())
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Self {
            client,
            endpoint: config.get_endpoint().trim_end_matches('/').to_string(),
            host: config.host().to_string(),
            username: config.get_username().clone(),
            password: config.get_password().clone(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v2/{}", self.endpoint, path)
    }

    fn with_basic_auth(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.username {
            Some(username) => request.basic_auth(username, self.password.as_deref()),
            None => request,
        }
    }

    /// Sends a request, answering a bearer challenge once if the registry issues one.
    async fn send<F>(&self, method: Method, url: &str, build: F) -> NbContainerResult<Response>
    where
        F: Fn(RequestBuilder) -> RequestBuilder + Send + Sync,
    {
        let request = self.with_basic_auth(build(self.client.request(method.clone(), url)));
        let response = request.send().await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        let challenge = response
            .headers()
            .get(WWW_AUTHENTICATE)
            .and_then(|value| value.to_str().ok())
            .and_then(BearerChallenge::parse);
        let Some(challenge) = challenge else {
            return Ok(response);
        };

        let material = self.get_auth_material(&challenge).await?;
        let Some(token) = material.bearer_token() else {
            return Ok(response);
        };

        let request = build(self.client.request(method, url)).bearer_auth(token);
        Ok(request.send().await?)
    }

    async fn upload_blob(&self, repository: &str, blob: &'static [u8]) -> NbContainerResult<String> {
        let digest = sha256_digest(blob);

        let response = self
            .send(Method::POST, &self.url(&format!("{repository}/blobs/uploads/")), |b| b)
            .await?;
        let response = check(response).await?;

        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| {
                NbContainerError::custom(anyhow::anyhow!(
                    "blob upload for {repository} returned no location"
                ))
            })?;

        let upload_url = if location.starts_with("http://") || location.starts_with("https://") {
            location.to_string()
        } else {
            format!("{}{location}", self.endpoint)
        };
        let separator = if upload_url.contains('?') { '&' } else { '?' };
        let upload_url = format!("{upload_url}{separator}digest={digest}");

        let response = self
            .send(Method::PUT, &upload_url, |b| {
                b.header(CONTENT_TYPE, "application/octet-stream")
                    .body(blob)
            })
            .await?;
        check(response).await?;

        Ok(digest)
    }
}

impl RegistryAuthMaterial {
    /// The token to send, whichever field the realm used.
    pub fn bearer_token(&self) -> Option<&str> {
        self.token.as_deref().or(self.access_token.as_deref())
    }
}

impl BearerChallenge {
    /// Parses a `WWW-Authenticate` header value. Non-bearer challenges yield `None`.
    pub fn parse(header: &str) -> Option<Self> {
        let (scheme, params) = header.trim().split_once(' ')?;
        if !scheme.eq_ignore_ascii_case("bearer") {
            return None;
        }

        let mut realm = None;
        let mut service = None;
        let mut scope = None;
        for (key, value) in split_auth_params(params) {
            match key.to_ascii_lowercase().as_str() {
                "realm" => realm = Some(value),
                "service" => service = Some(value),
                "scope" => scope = Some(value),
                _ => {}
            }
        }

        Some(Self {
            realm: realm?,
            service,
            scope,
        })
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Turns a non-success response into an error, preferring the registry's own error payload.
async fn check(response: Response) -> NbContainerResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let url = response.url().to_string();
    let body = response.bytes().await?;
    match serde_json::from_slice::<RegistryResponseError>(&body) {
        Ok(error) => Err(error.into()),
        Err(_) => Err(NbContainerError::UnexpectedRegistryStatus {
            status: status.as_u16(),
            url,
        }),
    }
}

fn sha256_digest(bytes: &[u8]) -> String {
    format!("sha256:{}", hex::encode(Sha256::digest(bytes)))
}

/// Splits `key="value", key=value` pairs, honoring commas inside quotes.
fn split_auth_params(params: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    let mut current = String::new();
    let mut quoted = false;

    for c in params.chars().chain(std::iter::once(',')) {
        match c {
            '"' => quoted = !quoted,
            ',' if !quoted => {
                if let Some((key, value)) = current.split_once('=') {
                    pairs.push((key.trim().to_string(), value.trim().to_string()));
                }
                current.clear();
            }
            c => current.push(c),
        }
    }

    pairs
}

/// Extracts the `last` marker from a catalog `Link: <...>; rel="next"` header.
fn next_token_from_link(link: &str) -> Option<String> {
    let start = link.find('<')? + 1;
    let end = start + link[start..].find('>')?;
    let base = Url::parse("http://registry.invalid/").ok()?;
    let target = base.join(&link[start..end]).ok()?;

    target
        .query_pairs()
        .find(|(key, _)| key == "last")
        .map(|(_, value)| value.into_owned())
}

fn empty_manifest(config_digest: &str) -> serde_json::Value {
    serde_json::json!({
        "schemaVersion": 2,
        "mediaType": OCI_MANIFEST_MIME_TYPE,
        "config": {
            "mediaType": OCI_CONFIG_MIME_TYPE,
            "digest": config_digest,
            "size": EMPTY_CONFIG.len(),
        },
        "layers": [],
    })
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

#[async_trait::async_trait]
impl AuthProvider for DistributionRegistry {
    type AuthMaterial = RegistryAuthMaterial;

    async fn get_auth_material(
        &self,
        challenge: &BearerChallenge,
    ) -> NbContainerResult<Self::AuthMaterial> {
        let mut query = Vec::new();
        if let Some(service) = &challenge.service {
            query.push(("service", service.as_str()));
        }
        if let Some(scope) = &challenge.scope {
            query.push(("scope", scope.as_str()));
        }

        let url = Url::parse_with_params(&challenge.realm, &query)
            .map_err(NbContainerError::custom)?;
        let request = self.with_basic_auth(self.client.get(url));
        let response = check(request.send().await?).await?;

        Ok(response.json::<RegistryAuthMaterial>().await?)
    }
}

#[async_trait::async_trait]
impl RepositoryCatalog for DistributionRegistry {
    async fn create_repository(&self, name: &str) -> NbContainerResult<()> {
        if self.repository_uri(name).await?.is_some() {
            return Err(NbContainerError::RepositoryAlreadyExists(name.to_string()));
        }

        // A v2 registry creates repositories on first write, so seed it with an untagged
        // manifest that references an empty config.
        let config_digest = self.upload_blob(name, EMPTY_CONFIG).await?;
        let manifest = serde_json::to_vec(&empty_manifest(&config_digest))?;
        let manifest_digest = sha256_digest(&manifest);

        let response = self
            .send(
                Method::PUT,
                &self.url(&format!("{name}/manifests/{manifest_digest}")),
                |b| {
                    b.header(CONTENT_TYPE, OCI_MANIFEST_MIME_TYPE)
                        .body(manifest.clone())
                },
            )
            .await?;
        check(response).await?;

        tracing::info!("created repository {name}");
        Ok(())
    }

    async fn list_repositories(&self, next_token: Option<&str>) -> NbContainerResult<RepositoryPage> {
        let page_size = CATALOG_PAGE_SIZE.to_string();
        let mut params = vec![("n", page_size.as_str())];
        if let Some(last) = next_token {
            params.push(("last", last));
        }

        let url = Url::parse_with_params(&self.url("_catalog"), &params)
            .map_err(NbContainerError::custom)?;
        let response = check(self.send(Method::GET, url.as_str(), |b| b).await?).await?;

        let next_token = response
            .headers()
            .get(LINK)
            .and_then(|value| value.to_str().ok())
            .and_then(next_token_from_link);
        let catalog = response.json::<CatalogResponse>().await?;

        Ok(RepositoryPage {
            repositories: catalog.repositories,
            next_token,
        })
    }

    async fn repository_uri(&self, name: &str) -> NbContainerResult<Option<String>> {
        let response = self
            .send(Method::GET, &self.url(&format!("{name}/tags/list")), |b| b)
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        check(response).await?;

        Ok(Some(format!("{}/{name}", self.host)))
    }
}

#[async_trait::async_trait]
impl ManifestStore for DistributionRegistry {
    async fn fetch_manifest(&self, repository: &str, tag: &str) -> NbContainerResult<Manifest> {
        let accept = format!("{OCI_MANIFEST_MIME_TYPE}, {DOCKER_MANIFEST_MIME_TYPE}");
        let response = self
            .send(
                Method::GET,
                &self.url(&format!("{repository}/manifests/{tag}")),
                |b| b.header(ACCEPT, accept.as_str()),
            )
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(NbContainerError::ManifestNotFound {
                repository: repository.to_string(),
                reference: tag.to_string(),
            });
        }
        let response = check(response).await?;

        let header_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.split(';').next().unwrap_or(value).trim().to_string());
        let body = response.json::<serde_json::Value>().await?;
        let media_type = body
            .get("mediaType")
            .and_then(|value| value.as_str())
            .map(str::to_string)
            .or(header_type)
            .unwrap_or_else(|| DOCKER_MANIFEST_MIME_TYPE.to_string());

        Ok(Manifest::new(media_type, body))
    }

    async fn put_manifest(
        &self,
        repository: &str,
        tag: &str,
        manifest: &Manifest,
    ) -> NbContainerResult<()> {
        let body = serde_json::to_vec(manifest.get_body())?;
        let response = self
            .send(
                Method::PUT,
                &self.url(&format!("{repository}/manifests/{tag}")),
                |b| {
                    b.header(CONTENT_TYPE, manifest.get_media_type().as_str())
                        .body(body.clone())
                },
            )
            .await?;
        check(response).await?;
        Ok(())
    }

    async fn delete_tag(&self, repository: &str, tag: &str) -> NbContainerResult<()> {
        let accept = format!("{OCI_MANIFEST_MIME_TYPE}, {DOCKER_MANIFEST_MIME_TYPE}");
        let response = self
            .send(
                Method::HEAD,
                &self.url(&format!("{repository}/manifests/{tag}")),
                |b| b.header(ACCEPT, accept.as_str()),
            )
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(NbContainerError::ManifestNotFound {
                repository: repository.to_string(),
                reference: tag.to_string(),
            });
        }
        let response = check(response).await?;

        let digest = response
            .headers()
            .get(DOCKER_CONTENT_DIGEST)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| {
                NbContainerError::custom(anyhow::anyhow!(
                    "registry returned no digest for {repository}:{tag}"
                ))
            })?;

        let response = self
            .send(
                Method::DELETE,
                &self.url(&format!("{repository}/manifests/{digest}")),
                |b| b,
            )
            .await?;
        check(response).await?;
        Ok(())
    }
}

impl Registry for DistributionRegistry {
    fn credentials(&self) -> Option<RegistryCredentials> {
        self.username.as_ref().map(|username| RegistryCredentials {
            username: Some(username.clone()),
            password: self.password.clone(),
            server_address: self.host.clone(),
        })
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bearer_challenge_parse() {
        let challenge = BearerChallenge::parse(
            r#"Bearer realm="https://auth.example.com/token",service="registry.example.com",scope="repository:models:pull,push""#,
        )
        .unwrap();

        assert_eq!(challenge.realm(), "https://auth.example.com/token");
        assert_eq!(challenge.service().as_deref(), Some("registry.example.com"));
        assert_eq!(challenge.scope().as_deref(), Some("repository:models:pull,push"));

        assert!(BearerChallenge::parse(r#"Basic realm="registry""#).is_none());
        assert!(BearerChallenge::parse(r#"Bearer service="registry""#).is_none());
    }

    #[test]
    fn test_next_token_from_link() {
        assert_eq!(
            next_token_from_link(r#"</v2/_catalog?last=models%2Fb&n=100>; rel="next""#).as_deref(),
            Some("models/b")
        );
        assert_eq!(next_token_from_link(r#"</v2/_catalog?n=100>; rel="next""#), None);
        assert_eq!(next_token_from_link("garbage"), None);
    }

    #[test]
    fn test_empty_config_digest() {
        assert_eq!(
            sha256_digest(EMPTY_CONFIG),
            "sha256:44136fa355b3678a1146ad16f7e8649e94fb4fc21fe77e8310c060f61caaff8a"
        );

        let manifest = empty_manifest(&sha256_digest(EMPTY_CONFIG));
        assert_eq!(manifest["config"]["size"], 2);
        assert_eq!(manifest["layers"], serde_json::json!([]));
    }

    #[test]
    fn test_credentials_follow_config() {
        let anonymous = DistributionRegistry::new(&RegistryConfig::default());
        assert!(anonymous.credentials().is_none());

        let config = RegistryConfig::builder()
            .endpoint("https://registry.example.com")
            .username("robot")
            .password("secret")
            .build();
        let registry = DistributionRegistry::new(&config);
        let credentials = registry.credentials().unwrap();

        assert_eq!(credentials.get_server_address(), "registry.example.com");
        assert_eq!(credentials.get_username().as_deref(), Some("robot"));
    }
}
