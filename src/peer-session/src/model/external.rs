use common::model::game::{Move, Outcome};
use serde::{Deserialize, Serialize};

// UI -> core
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum UserRequest {
    StartSearching,
    StopSearching,
    SubmitMove { value: Move },
    Disconnect,
}

// Core -> UI
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum UiEvent {
    SearchingStarted,
    Connected {
        peer_name: String,
    },
    MoveAccepted {
        my_move: Move,
    },
    RoundResult {
        my_move: Move,
        peer_move: Move,
        outcome: Outcome,
        my_score: u32,
        peer_score: u32,
    },
    Disconnected,
    ProtocolError {
        reason: String,
    },
    // Request rejected in the current phase, nothing changed
    NotAllowed {
        reason: String,
    },
    // Advertise, discover or connect failed; retry with StartSearching
    SearchFailed {
        reason: String,
    },
    SendFailed {
        reason: String,
    },
    RoundTimedOut,
}
