use std::{
    collections::{BTreeMap, BTreeSet},
    net::SocketAddr,
    sync::{Arc, Mutex},
};

use axum::{
    body::Bytes,
    extract::{Request, State},
    http::{header, HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use nbcontainer::{
    config::RegistryConfig,
    registry::{
        manifest_annotations, DistributionRegistry, ManifestStore, Registry, RepositoryCatalog,
    },
    NbContainerError,
};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tokio::net::TcpListener;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Just enough of a v2 registry to exercise the client.
#[derive(Default)]
struct MockRegistry {
    repositories: BTreeMap<String, MockRepository>,
    page_size: usize,
    token: Option<String>,
    realm: String,
}

#[derive(Default)]
struct MockRepository {
    blobs: BTreeSet<String>,
    manifests: BTreeMap<String, (String, Vec<u8>)>,
    tags: BTreeMap<String, String>,
}

type Shared = Arc<Mutex<MockRegistry>>;

//--------------------------------------------------------------------------------------------------
// Functions: Mock
//--------------------------------------------------------------------------------------------------

fn digest(bytes: &[u8]) -> String {
    format!("sha256:{}", hex::encode(Sha256::digest(bytes)))
}

async fn handle(State(state): State<Shared>, request: Request) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let headers = request.headers().clone();
    let body = axum::body::to_bytes(request.into_body(), usize::MAX)
        .await
        .unwrap_or_default();

    let mut registry = state.lock().unwrap();

    if uri.path() == "/token" {
        let token = registry.token.clone().unwrap_or_default();
        return axum::Json(json!({"token": token})).into_response();
    }

    if let Some(token) = &registry.token {
        let expected = format!("Bearer {token}");
        let authorized = headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            == Some(expected.as_str());
        if !authorized {
            let challenge = format!(
                "Bearer realm=\"{}\",service=\"mock\",scope=\"registry:catalog:*\"",
                registry.realm
            );
            return (
                StatusCode::UNAUTHORIZED,
                [(header::WWW_AUTHENTICATE, challenge)],
            )
                .into_response();
        }
    }

    let Some(path) = uri.path().strip_prefix("/v2/") else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let query: BTreeMap<String, String> = uri
        .query()
        .map(url_pairs)
        .unwrap_or_default();

    if path == "_catalog" {
        return catalog(&registry, &query);
    }

    if let Some(name) = path.strip_suffix("/tags/list") {
        return match registry.repositories.get(name) {
            Some(repository) => axum::Json(json!({
                "name": name,
                "tags": repository.tags.keys().collect::<Vec<_>>(),
            }))
            .into_response(),
            None => not_found(),
        };
    }

    if let Some((name, upload)) = path.split_once("/blobs/uploads/") {
        let repository = registry.repositories.entry(name.to_string()).or_default();
        return match method {
            Method::POST => (
                StatusCode::ACCEPTED,
                [(header::LOCATION, format!("/v2/{name}/blobs/uploads/session-1"))],
            )
                .into_response(),
            Method::PUT if !upload.is_empty() => {
                let Some(expected) = query.get("digest") else {
                    return StatusCode::BAD_REQUEST.into_response();
                };
                assert_eq!(&digest(&body), expected);
                repository.blobs.insert(expected.clone());
                StatusCode::CREATED.into_response()
            }
            _ => StatusCode::METHOD_NOT_ALLOWED.into_response(),
        };
    }

    let Some((name, reference)) = path.rsplit_once("/manifests/") else {
        return not_found();
    };

    match method {
        Method::PUT => {
            let media_type = headers
                .get(header::CONTENT_TYPE)
                .and_then(|value| value.to_str().ok())
                .unwrap_or_default()
                .to_string();
            let manifest_digest = digest(&body);
            let repository = registry.repositories.entry(name.to_string()).or_default();
            repository
                .manifests
                .insert(manifest_digest.clone(), (media_type, body.to_vec()));
            if !reference.starts_with("sha256:") {
                repository
                    .tags
                    .insert(reference.to_string(), manifest_digest.clone());
            }
            (
                StatusCode::CREATED,
                [("Docker-Content-Digest", manifest_digest)],
            )
                .into_response()
        }
        Method::GET | Method::HEAD => {
            let Some(repository) = registry.repositories.get(name) else {
                return not_found();
            };
            let manifest_digest = repository
                .tags
                .get(reference)
                .cloned()
                .unwrap_or_else(|| reference.to_string());
            let Some((media_type, manifest)) = repository.manifests.get(&manifest_digest) else {
                return not_found();
            };

            let body = if method == Method::HEAD {
                Bytes::new()
            } else {
                Bytes::from(manifest.clone())
            };
            (
                [
                    (header::CONTENT_TYPE.as_str(), media_type.clone()),
                    ("Docker-Content-Digest", manifest_digest),
                ],
                body,
            )
                .into_response()
        }
        Method::DELETE => {
            let Some(repository) = registry.repositories.get_mut(name) else {
                return not_found();
            };
            if repository.manifests.remove(reference).is_none() {
                return not_found();
            }
            repository.tags.retain(|_, target| target != reference);
            StatusCode::ACCEPTED.into_response()
        }
        _ => StatusCode::METHOD_NOT_ALLOWED.into_response(),
    }
}

fn catalog(registry: &MockRegistry, query: &BTreeMap<String, String>) -> Response {
    let requested = query
        .get("n")
        .and_then(|n| n.parse::<usize>().ok())
        .unwrap_or(usize::MAX);
    let page_size = requested.min(registry.page_size);

    let names: Vec<&String> = registry
        .repositories
        .keys()
        .filter(|name| query.get("last").map_or(true, |last| *name > last))
        .collect();
    let page: Vec<&String> = names.iter().take(page_size).copied().collect();

    let mut headers = HeaderMap::new();
    if names.len() > page.len() {
        if let Some(last) = page.last() {
            let link = format!("</v2/_catalog?last={last}&n={page_size}>; rel=\"next\"");
            headers.insert(header::LINK, link.parse().unwrap());
        }
    }

    (headers, axum::Json(json!({ "repositories": page }))).into_response()
}

fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        axum::Json(json!({"errors": [{"code": "NAME_UNKNOWN", "message": "unknown"}]})),
    )
        .into_response()
}

fn url_pairs(query: &str) -> BTreeMap<String, String> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .map(|(key, value)| (key.to_string(), value.replace("%3A", ":")))
        .collect()
}

async fn start(mock: MockRegistry) -> anyhow::Result<(SocketAddr, Shared)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;

    let state: Shared = Arc::new(Mutex::new(mock));
    state.lock().unwrap().realm = format!("http://{addr}/token");

    let app = Router::new().fallback(handle).with_state(state.clone());
    tokio::spawn(async move { axum::serve(listener, app).await });

    Ok((addr, state))
}

fn client(addr: SocketAddr) -> DistributionRegistry {
    let config = RegistryConfig::builder()
        .endpoint(format!("http://{addr}/"))
        .build();
    DistributionRegistry::new(&config)
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[test_log::test(tokio::test)]
async fn test_create_and_list_repositories() -> anyhow::Result<()> {
    let (addr, state) = start(MockRegistry {
        page_size: 2,
        ..Default::default()
    })
    .await?;
    let registry = client(addr);

    assert_eq!(registry.repository_uri("alpha").await?, None);

    for name in ["gamma", "alpha", "beta"] {
        registry.create_repository(name).await?;
    }
    assert!(matches!(
        registry.create_repository("alpha").await,
        Err(NbContainerError::RepositoryAlreadyExists(_))
    ));

    assert_eq!(
        registry.repository_uri("alpha").await?,
        Some(format!("{addr}/alpha"))
    );

    // Seeded repositories hold a manifest but no tags.
    {
        let mock = state.lock().unwrap();
        let alpha = &mock.repositories["alpha"];
        assert_eq!(alpha.blobs.len(), 1);
        assert_eq!(alpha.manifests.len(), 1);
        assert!(alpha.tags.is_empty());
    }

    let first = registry.list_repositories(None).await?;
    assert_eq!(first.repositories, vec!["alpha", "beta"]);
    assert_eq!(first.next_token.as_deref(), Some("beta"));

    let second = registry.list_repositories(first.next_token.as_deref()).await?;
    assert_eq!(second.repositories, vec!["gamma"]);
    assert_eq!(second.next_token, None);

    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_manifest_is_republished_with_annotations() -> anyhow::Result<()> {
    let (addr, state) = start(MockRegistry {
        page_size: 100,
        ..Default::default()
    })
    .await?;
    let registry = client(addr);
    registry.create_repository("demo").await?;

    let interim = json!({
        "schemaVersion": 2,
        "mediaType": "application/vnd.docker.distribution.manifest.v2+json",
        "config": {"digest": "sha256:config", "size": 2},
        "layers": [],
    });
    registry
        .put_manifest(
            "demo",
            "interim",
            &nbcontainer::registry::Manifest::new(
                "application/vnd.docker.distribution.manifest.v2+json",
                interim.clone(),
            ),
        )
        .await?;

    let request = nbcontainer::request::parse_request(
        &json!({
            "notebook_path": "a.ipynb",
            "kernel_name": "containerized_python3",
            "repository_name": "demo",
            "container_name": "Demo",
            "container_description": "",
            "variables": [{"name": "rate", "type": "double"}],
        })
        .to_string(),
    )?;
    let annotations = manifest_annotations(&request)?;

    let fetched = registry.fetch_manifest("demo", "interim").await?;
    assert_eq!(fetched.get_body(), &interim);
    assert_eq!(
        fetched.get_media_type(),
        "application/vnd.docker.distribution.manifest.v2+json"
    );

    registry
        .put_manifest("demo", "latest", &fetched.with_annotations(&annotations)?)
        .await?;
    registry.delete_tag("demo", "interim").await?;

    let latest = registry.fetch_manifest("demo", "latest").await?;
    let published: &Value = latest.get_body();
    assert_eq!(published["annotations"]["@iota_container_name"], "Demo");
    assert_eq!(published["annotations"]["@iota_container_description"], "");
    assert_eq!(
        published["annotations"]["rate"],
        r#"{"type":"double","description":null}"#
    );

    assert!(matches!(
        registry.fetch_manifest("demo", "interim").await,
        Err(NbContainerError::ManifestNotFound { .. })
    ));
    assert_eq!(
        state.lock().unwrap().repositories["demo"]
            .tags
            .keys()
            .collect::<Vec<_>>(),
        vec!["latest"]
    );

    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_bearer_challenge_is_answered() -> anyhow::Result<()> {
    let (addr, _) = start(MockRegistry {
        page_size: 100,
        token: Some("secret-token".to_string()),
        ..Default::default()
    })
    .await?;
    let registry = client(addr);

    registry.create_repository("private").await?;
    let page = registry.list_repositories(None).await?;
    assert_eq!(page.repositories, vec!["private"]);

    assert!(registry.credentials().is_none());

    Ok(())
}
