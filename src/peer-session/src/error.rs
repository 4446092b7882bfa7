use common::model::messages::EndpointId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("unknown endpoint {0}")]
    UnknownEndpoint(EndpointId),

    #[error("not connected to {0}")]
    NotConnected(EndpointId),

    #[error("{0} is not advertising")]
    NotAdvertising(EndpointId),

    #[error("link to {0} is closed")]
    LinkClosed(EndpointId),

    #[error("beacon of {len} bytes exceeds the {max} byte limit")]
    BeaconTooLarge { len: usize, max: usize },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("session task has stopped")]
    Closed,
}
