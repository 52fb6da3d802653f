mod common;

use std::net::SocketAddr;

use common::*;
use nbcontainer::{
    coordinator::ALREADY_ONGOING,
    server::{CreateRepoResponse, NbContainerServer},
};
use reqwest::StatusCode;
use serde_json::{json, Value};
use tokio::net::TcpListener;

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

async fn serve(harness: &Harness) -> anyhow::Result<SocketAddr> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let server = NbContainerServer::new(harness.containerizer.clone());
    tokio::spawn(async move { server.serve_on(listener).await });
    Ok(addr)
}

fn harness() -> anyhow::Result<Harness> {
    Harness::with(
        |root| {
            let mut config = base_config(root);
            config.override_server(None, None, Some("/nb/".to_string()));
            config
        },
        FakeRegistry::with_repository(REPOSITORY),
    )
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[test_log::test(tokio::test)]
async fn test_repository_endpoints() -> anyhow::Result<()> {
    let harness = harness()?;
    let addr = serve(&harness).await?;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("http://{addr}/nb/create_repo"))
        .form(&[("repository_name", "fresh")])
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.json::<CreateRepoResponse>().await?,
        CreateRepoResponse {
            repository_name: "fresh".to_string()
        }
    );

    let response = client
        .post(format!("http://{addr}/nb/create_repo"))
        .form(&[("repository_name", "fresh")])
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let listing: Value = client
        .get(format!("http://{addr}/nb/list_repos"))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(
        listing,
        json!({"repositories": ["demo", "fresh"], "next_token": null})
    );

    let response = client
        .get(format!("http://{addr}/list_repos"))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_upload_is_refused_while_ongoing() -> anyhow::Result<()> {
    let harness = harness()?;
    let addr = serve(&harness).await?;
    let client = reqwest::Client::new();
    let is_ongoing = format!("http://{addr}/nb/upload_to_repo/is_ongoing");

    let ongoing: bool = client.get(&is_ongoing).send().await?.json().await?;
    assert!(!ongoing);

    let claim = harness.containerizer.try_claim().unwrap();
    let ongoing: bool = client.get(&is_ongoing).send().await?.json().await?;
    assert!(ongoing);

    let response = client
        .get(format!("http://{addr}/nb/upload_to_repo"))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(response.text().await?, ALREADY_ONGOING);

    drop(claim);

    // Without upgrade headers the request fails, and the lock is not kept.
    let response = client
        .get(format!("http://{addr}/nb/upload_to_repo"))
        .send()
        .await?;
    assert!(response.status().is_client_error());
    assert_ne!(response.status(), StatusCode::CONFLICT);

    let ongoing: bool = client.get(&is_ongoing).send().await?.json().await?;
    assert!(!ongoing);

    Ok(())
}
