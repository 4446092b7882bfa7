use peer_session::error::SessionError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("session stopped sending events")]
    EventsClosed,
}
