use axum::{
    extract::{
        ws::{
            close_code, rejection::WebSocketUpgradeRejection, CloseFrame, Message, WebSocket,
            WebSocketUpgrade,
        },
        Form, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use futures::{SinkExt, StreamExt};

use crate::{
    coordinator::{Containerizer, SessionClaim, SessionOutcome, ALREADY_ONGOING},
    NbContainerError,
};

use super::{
    state::ServerState,
    types::{CreateRepoForm, CreateRepoResponse, ErrorResponse, ListReposQuery},
};

//-------------------------------------------------------------------------------------------------
// Functions: Handlers
//-------------------------------------------------------------------------------------------------

/// Handler for `POST create_repo`.
pub async fn create_repo_handler(
    State(state): State<ServerState>,
    Form(form): Form<CreateRepoForm>,
) -> Response {
    let registry = state.containerizer().get_registry();
    match registry.create_repository(&form.repository_name).await {
        Ok(()) => {
            tracing::info!("created repository {}", form.repository_name);
            Json(CreateRepoResponse {
                repository_name: form.repository_name,
            })
            .into_response()
        }
        Err(e) => error_response(e),
    }
}

/// Handler for `GET list_repos`.
pub async fn list_repos_handler(
    State(state): State<ServerState>,
    Query(query): Query<ListReposQuery>,
) -> Response {
    let registry = state.containerizer().get_registry();
    match registry.list_repositories(query.next_token.as_deref()).await {
        Ok(page) => Json(page).into_response(),
        Err(e) => error_response(e),
    }
}

/// Handler for `GET upload_to_repo/is_ongoing`.
pub async fn is_ongoing_handler(State(state): State<ServerState>) -> Json<bool> {
    Json(state.containerizer().is_ongoing())
}

/// Handler for `GET upload_to_repo`.
///
/// Attempts made while a session is running are refused with 409 before the upgrade.
pub async fn upload_to_repo_handler(
    State(state): State<ServerState>,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let containerizer = state.containerizer().clone();
    let Some(claim) = containerizer.try_claim() else {
        return (StatusCode::CONFLICT, ALREADY_ONGOING).into_response();
    };

    match upgrade {
        Ok(upgrade) => upgrade
            .on_upgrade(move |socket| run_session(socket, containerizer, claim))
            .into_response(),
        Err(rejection) => rejection.into_response(),
    }
}

//-------------------------------------------------------------------------------------------------
// Functions: Helpers
//-------------------------------------------------------------------------------------------------

/// Bridges one session to a socket. The first text message is the request.
async fn run_session(socket: WebSocket, containerizer: Containerizer, claim: SessionClaim) {
    let owner = claim.owner();
    let (mut sender, mut receiver) = socket.split();

    let message = loop {
        match receiver.next().await {
            Some(Ok(Message::Text(text))) => break text.as_str().to_string(),
            Some(Ok(Message::Close(_))) | Some(Err(_)) | None => {
                tracing::info!("client of session {owner} left before sending a request");
                return;
            }
            Some(Ok(_)) => {}
        }
    };

    let mut session = containerizer.start(claim, message);
    loop {
        tokio::select! {
            entry = session.next() => {
                let Some(entry) = entry else {
                    break;
                };

                let payload = match serde_json::to_string(&entry) {
                    Ok(payload) => payload,
                    Err(e) => {
                        tracing::error!("failed to encode status entry: {e}");
                        break;
                    }
                };

                if sender.send(Message::Text(payload.into())).await.is_err() {
                    tracing::info!("client of session {owner} disconnected");
                    return;
                }
            }
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => {
                    tracing::info!("client of session {owner} disconnected");
                    return;
                }
                Some(Ok(_)) => {}
            }
        }
    }

    let outcome = session.outcome();
    drop(session);
    tracing::info!("session {owner} finished: {outcome:?}");

    let code = match outcome {
        SessionOutcome::Faulted => close_code::ERROR,
        _ => close_code::NORMAL,
    };
    let frame = CloseFrame {
        code,
        reason: "".into(),
    };
    let _ = sender.send(Message::Close(Some(frame))).await;
}

fn error_response(error: NbContainerError) -> Response {
    let status = match &error {
        NbContainerError::RepositoryAlreadyExists(_) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    tracing::error!("request failed: {error}");
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
        }),
    )
        .into_response()
}
