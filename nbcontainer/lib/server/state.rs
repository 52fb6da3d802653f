use crate::coordinator::Containerizer;

//-------------------------------------------------------------------------------------------------
// Types
//-------------------------------------------------------------------------------------------------

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct ServerState {
    containerizer: Containerizer,
}

//-------------------------------------------------------------------------------------------------
// Methods
//-------------------------------------------------------------------------------------------------

impl ServerState {
    /// Creates the server state.
    pub fn new(containerizer: Containerizer) -> Self {
        Self { containerizer }
    }

    /// The containerizer sessions run on.
    pub fn containerizer(&self) -> &Containerizer {
        &self.containerizer
    }
}
