use common::model::{game::Move, messages::EndpointId};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::external::{UiEvent, UserRequest};

/// Where adapters push their events. Unbounded so a transport invoked from
/// inside the session task can never wait on the queue that task drains.
pub type EventSink = mpsc::UnboundedSender<AdapterEvent>;
pub type EventSource = mpsc::UnboundedReceiver<AdapterEvent>;

pub fn adapter_channel() -> (EventSink, EventSource) {
    mpsc::unbounded_channel()
}

// Adapter -> core
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum AdapterEvent {
    EndpointFound {
        endpoint_id: EndpointId,
        name: String,
    },
    ConnectionRequested {
        endpoint_id: EndpointId,
        name: String,
    },
    ConnectionEstablished {
        endpoint_id: EndpointId,
    },
    ConnectionFailed {
        endpoint_id: EndpointId,
    },
    BytesReceived {
        endpoint_id: EndpointId,
        #[serde(with = "payload_text")]
        bytes: Vec<u8>,
    },
    Disconnected {
        endpoint_id: EndpointId,
    },
}

// Core -> adapter
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum AdapterCommand {
    Advertise {
        local_name: String,
        service_id: String,
    },
    Discover {
        service_id: String,
    },
    StopAdvertising,
    StopDiscovery,
    AcceptConnection {
        endpoint_id: EndpointId,
    },
    RejectConnection {
        endpoint_id: EndpointId,
    },
    RequestConnection {
        local_name: String,
        endpoint_id: EndpointId,
    },
    Disconnect {
        endpoint_id: EndpointId,
    },
    DisconnectAll,
    Send {
        endpoint_id: EndpointId,
        #[serde(with = "payload_text")]
        bytes: Vec<u8>,
    },
}

impl AdapterCommand {
    /// Variant name, as it appears in the serialized `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            AdapterCommand::Advertise { .. } => "Advertise",
            AdapterCommand::Discover { .. } => "Discover",
            AdapterCommand::StopAdvertising => "StopAdvertising",
            AdapterCommand::StopDiscovery => "StopDiscovery",
            AdapterCommand::AcceptConnection { .. } => "AcceptConnection",
            AdapterCommand::RejectConnection { .. } => "RejectConnection",
            AdapterCommand::RequestConnection { .. } => "RequestConnection",
            AdapterCommand::Disconnect { .. } => "Disconnect",
            AdapterCommand::DisconnectAll => "DisconnectAll",
            AdapterCommand::Send { .. } => "Send",
        }
    }

    pub fn send_move(endpoint_id: EndpointId, value: Move) -> Self {
        AdapterCommand::Send {
            endpoint_id,
            bytes: value.encode(),
        }
    }
}

/// Everything the session state machine consumes, one at a time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionRequest {
    User(UserRequest),
    Adapter(AdapterEvent),
    CommandFailed {
        command: AdapterCommand,
        reason: String,
    },
    RoundTimeout {
        round: u64,
    },
    // The adapter took our move for the current round
    MoveDelivered,
}

/// Instruction produced by a transition, executed in order by the session task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Command(AdapterCommand),
    Emit(UiEvent),
}

// Payload bytes are kept as text in JSON so fixtures and logs stay readable.
mod payload_text {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&String::from_utf8_lossy(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(s.into_bytes())
    }
}
