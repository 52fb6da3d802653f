use tokio::net::TcpListener;

use crate::{coordinator::Containerizer, NbContainerResult};

use super::{routes::create_router, state::ServerState};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The nbcontainer HTTP server.
#[derive(Clone)]
pub struct NbContainerServer {
    containerizer: Containerizer,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl NbContainerServer {
    /// Creates a server for `containerizer`, configured by its server settings.
    pub fn new(containerizer: Containerizer) -> Self {
        Self { containerizer }
    }

    /// Binds the configured address and serves until the process exits.
    pub async fn serve(&self) -> NbContainerResult<()> {
        let server = self.containerizer.get_config().get_server();
        let listener = TcpListener::bind((server.get_host().as_str(), *server.get_port())).await?;
        self.serve_on(listener).await
    }

    /// Serves on an already bound listener.
    pub async fn serve_on(&self, listener: TcpListener) -> NbContainerResult<()> {
        let base_url = self.containerizer.get_config().get_server().get_base_url();
        let app = create_router(ServerState::new(self.containerizer.clone()), base_url);

        tracing::info!(
            "server listening on {} under {base_url}",
            listener.local_addr()?
        );

        axum::serve(listener, app.into_make_service()).await?;

        Ok(())
    }
}
