use std::collections::HashMap;

use common::model::{
    game::{resolve, Move, Outcome},
    messages::{EndpointId, PeerIdentity},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    config::SessionConfig,
    model::{
        external::{UiEvent, UserRequest},
        internal::{AdapterCommand, AdapterEvent, Effect, SessionRequest},
    },
};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Searching,
    Connected,
    AwaitingMoves,
}

/// Which of the search commands are believed to be running on the adapter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Radio {
    advertising: bool,
    discovering: bool,
}

/// The single opponent relationship of this process.
///
/// Pure state machine: [`Session::apply`] consumes one [`SessionRequest`] and
/// returns the [`Effect`]s the caller must carry out, in order. Nothing here
/// touches the network, so every transition can be driven directly in tests.
#[derive(Debug, Clone)]
pub struct Session {
    local_name: String,
    service_id: String,
    phase: Phase,
    peer: Option<PeerIdentity>,
    my_move: Option<Move>,
    // Set once the adapter accepted the Send carrying `my_move`
    delivered: bool,
    peer_move: Option<Move>,
    my_score: u32,
    peer_score: u32,
    round: u64,
    radio: Radio,
    // Names of endpoints seen while searching, keyed by endpoint id
    candidates: HashMap<EndpointId, String>,
}

impl Session {
    pub fn new(config: &SessionConfig) -> Self {
        Session {
            local_name: config.local_name.clone(),
            service_id: config.service_id.clone(),
            phase: Phase::Idle,
            peer: None,
            my_move: None,
            delivered: false,
            peer_move: None,
            my_score: 0,
            peer_score: 0,
            round: 0,
            radio: Radio::default(),
            candidates: HashMap::new(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn peer(&self) -> Option<&PeerIdentity> {
        self.peer.as_ref()
    }

    pub fn my_move(&self) -> Option<Move> {
        self.my_move
    }

    pub fn peer_move(&self) -> Option<Move> {
        self.peer_move
    }

    /// (mine, peer's)
    pub fn scores(&self) -> (u32, u32) {
        (self.my_score, self.peer_score)
    }

    /// Counter identifying the round in progress. Advances whenever a round
    /// is resolved or abandoned.
    pub fn round(&self) -> u64 {
        self.round
    }

    pub fn local_name(&self) -> &str {
        &self.local_name
    }

    pub fn apply(&mut self, request: SessionRequest) -> Vec<Effect> {
        debug!("{:?} <- {:?}", self.phase, request);
        match request {
            SessionRequest::User(request) => self.handle_user(request),
            SessionRequest::Adapter(event) => self.handle_adapter(event),
            SessionRequest::CommandFailed { command, reason } => {
                self.command_failed(command, reason)
            }
            SessionRequest::RoundTimeout { round } => self.round_timeout(round),
            SessionRequest::MoveDelivered => self.move_delivered(),
        }
    }

    fn handle_user(&mut self, request: UserRequest) -> Vec<Effect> {
        match request {
            UserRequest::StartSearching => self.start_searching(),
            UserRequest::StopSearching => self.stop_searching(),
            UserRequest::SubmitMove { value } => self.submit_move(value),
            UserRequest::Disconnect => self.disconnect(),
        }
    }

    fn handle_adapter(&mut self, event: AdapterEvent) -> Vec<Effect> {
        match event {
            AdapterEvent::EndpointFound { endpoint_id, name } => {
                self.endpoint_found(endpoint_id, name)
            }
            AdapterEvent::ConnectionRequested { endpoint_id, name } => {
                self.connection_requested(endpoint_id, name)
            }
            AdapterEvent::ConnectionEstablished { endpoint_id } => {
                self.connection_established(endpoint_id)
            }
            AdapterEvent::ConnectionFailed { endpoint_id } => self.connection_failed(endpoint_id),
            AdapterEvent::BytesReceived { endpoint_id, bytes } => {
                self.bytes_received(endpoint_id, &bytes)
            }
            AdapterEvent::Disconnected { endpoint_id } => self.disconnected(endpoint_id),
        }
    }

    fn start_searching(&mut self) -> Vec<Effect> {
        let first_attempt = match self.phase {
            Phase::Idle => true,
            Phase::Searching => false,
            _ => {
                debug!("Already connected, ignoring StartSearching");
                return vec![];
            }
        };
        let mut effects = vec![];
        if !self.radio.advertising {
            self.radio.advertising = true;
            effects.push(Effect::Command(AdapterCommand::Advertise {
                local_name: self.local_name.clone(),
                service_id: self.service_id.clone(),
            }));
        }
        if !self.radio.discovering {
            self.radio.discovering = true;
            effects.push(Effect::Command(AdapterCommand::Discover {
                service_id: self.service_id.clone(),
            }));
        }
        if first_attempt {
            info!("{} is searching for opponents", self.local_name);
            self.phase = Phase::Searching;
            effects.push(Effect::Emit(UiEvent::SearchingStarted));
        } else if effects.is_empty() {
            debug!("Already searching, ignoring StartSearching");
        } else {
            info!("Retrying failed search commands");
        }
        effects
    }

    fn stop_searching(&mut self) -> Vec<Effect> {
        if self.phase != Phase::Searching {
            debug!("Not searching, ignoring StopSearching");
            return vec![];
        }
        self.reset()
    }

    fn submit_move(&mut self, value: Move) -> Vec<Effect> {
        let Some(peer) = self.peer.as_ref() else {
            return not_allowed(format!("cannot play {value} without an opponent"));
        };
        if let Some(pending) = self.my_move {
            return not_allowed(format!("already played {pending} this round"));
        }
        if self.phase != Phase::Connected {
            return not_allowed(format!("cannot play {value} while {:?}", self.phase));
        }

        let endpoint_id = peer.endpoint_id.clone();
        self.my_move = Some(value);
        self.delivered = false;
        self.phase = Phase::AwaitingMoves;
        // Resolution waits for MoveDelivered, even with the peer move buffered
        vec![
            Effect::Command(AdapterCommand::send_move(endpoint_id, value)),
            Effect::Emit(UiEvent::MoveAccepted { my_move: value }),
        ]
    }

    fn move_delivered(&mut self) -> Vec<Effect> {
        if self.phase != Phase::AwaitingMoves || self.delivered {
            debug!("Stale delivery notice while {:?}", self.phase);
            return vec![];
        }
        self.delivered = true;
        self.try_resolve()
    }

    fn disconnect(&mut self) -> Vec<Effect> {
        if self.phase == Phase::Idle {
            debug!("Already idle, ignoring Disconnect");
            return vec![];
        }
        self.reset()
    }

    fn endpoint_found(&mut self, endpoint_id: EndpointId, name: String) -> Vec<Effect> {
        if self.phase != Phase::Searching {
            debug!("Ignoring endpoint {} ({}) while {:?}", endpoint_id, name, self.phase);
            return vec![];
        }
        info!("Found {} ({}), requesting connection", name, endpoint_id);
        self.candidates.insert(endpoint_id.clone(), name);
        vec![Effect::Command(AdapterCommand::RequestConnection {
            local_name: self.local_name.clone(),
            endpoint_id,
        })]
    }

    fn connection_requested(&mut self, endpoint_id: EndpointId, name: String) -> Vec<Effect> {
        if self.phase != Phase::Searching {
            warn!(
                "Rejecting connection from {} ({}) while {:?}",
                name, endpoint_id, self.phase
            );
            return vec![Effect::Command(AdapterCommand::RejectConnection {
                endpoint_id,
            })];
        }
        debug!("Accepting connection from {} ({})", name, endpoint_id);
        self.candidates.insert(endpoint_id.clone(), name);
        vec![Effect::Command(AdapterCommand::AcceptConnection {
            endpoint_id,
        })]
    }

    fn connection_established(&mut self, endpoint_id: EndpointId) -> Vec<Effect> {
        match self.phase {
            Phase::Searching => {}
            Phase::Connected | Phase::AwaitingMoves if self.is_peer(&endpoint_id) => {
                debug!("Duplicate connection notice for {}", endpoint_id);
                return vec![];
            }
            _ => {
                warn!(
                    "Dropping extra connection to {} while {:?}",
                    endpoint_id, self.phase
                );
                return vec![Effect::Command(AdapterCommand::Disconnect {
                    endpoint_id,
                })];
            }
        }

        let name = self
            .candidates
            .remove(&endpoint_id)
            .unwrap_or_else(|| endpoint_id.to_string());
        info!("Connected to {} ({})", name, endpoint_id);
        self.peer = Some(PeerIdentity {
            endpoint_id,
            name: name.clone(),
        });
        self.phase = Phase::Connected;
        let mut effects = self.silence_radio();
        effects.push(Effect::Emit(UiEvent::Connected { peer_name: name }));
        effects
    }

    fn connection_failed(&mut self, endpoint_id: EndpointId) -> Vec<Effect> {
        if self.phase != Phase::Searching {
            debug!("Ignoring connection failure for {} while {:?}", endpoint_id, self.phase);
            return vec![];
        }
        let name = self
            .candidates
            .remove(&endpoint_id)
            .unwrap_or_else(|| endpoint_id.to_string());
        warn!("Connection to {} ({}) failed", name, endpoint_id);
        vec![Effect::Emit(UiEvent::SearchFailed {
            reason: format!("connection to {name} failed"),
        })]
    }

    fn bytes_received(&mut self, endpoint_id: EndpointId, bytes: &[u8]) -> Vec<Effect> {
        if !self.is_peer(&endpoint_id) {
            warn!(
                "Ignoring {} bytes from {}, not our opponent",
                bytes.len(),
                endpoint_id
            );
            return vec![];
        }
        if !matches!(self.phase, Phase::Connected | Phase::AwaitingMoves) {
            warn!("Ignoring payload while {:?}", self.phase);
            return vec![];
        }

        let value = match Move::decode(bytes) {
            Ok(value) => value,
            Err(e) => return self.abandon_round(UiEvent::ProtocolError { reason: e.to_string() }),
        };
        if let Some(buffered) = self.peer_move {
            return self.abandon_round(UiEvent::ProtocolError {
                reason: format!("opponent played {value} after already playing {buffered}"),
            });
        }

        self.peer_move = Some(value);
        if !self.delivered {
            debug!("Buffered opponent move until ours is out");
        }
        self.try_resolve()
    }

    fn disconnected(&mut self, endpoint_id: EndpointId) -> Vec<Effect> {
        if self.is_peer(&endpoint_id) {
            info!("Opponent {} disconnected", endpoint_id);
            return self.reset();
        }
        if self.candidates.remove(&endpoint_id).is_some() {
            debug!("Candidate {} went away", endpoint_id);
        }
        vec![]
    }

    fn command_failed(&mut self, command: AdapterCommand, reason: String) -> Vec<Effect> {
        match command {
            AdapterCommand::Advertise { .. } => {
                self.radio.advertising = false;
                self.search_failed("advertising", reason)
            }
            AdapterCommand::Discover { .. } => {
                self.radio.discovering = false;
                self.search_failed("discovery", reason)
            }
            AdapterCommand::RequestConnection { endpoint_id, .. }
            | AdapterCommand::AcceptConnection { endpoint_id } => {
                self.candidates.remove(&endpoint_id);
                self.search_failed("connecting", reason)
            }
            AdapterCommand::Send { .. } => {
                // Nothing was resolved yet; a buffered peer move stays put
                if self.phase == Phase::AwaitingMoves && !self.delivered {
                    self.my_move = None;
                    self.phase = Phase::Connected;
                }
                vec![Effect::Emit(UiEvent::SendFailed { reason })]
            }
            other => {
                // Release commands; we are already on our way to Idle
                warn!("{:?} failed: {}", other, reason);
                vec![]
            }
        }
    }

    fn search_failed(&self, what: &str, reason: String) -> Vec<Effect> {
        if self.phase != Phase::Searching {
            debug!("Stale {} failure: {}", what, reason);
            return vec![];
        }
        vec![Effect::Emit(UiEvent::SearchFailed {
            reason: format!("{what} failed: {reason}"),
        })]
    }

    fn round_timeout(&mut self, round: u64) -> Vec<Effect> {
        if round != self.round || self.phase != Phase::AwaitingMoves {
            debug!("Ignoring timer for round {}", round);
            return vec![];
        }
        warn!("Opponent did not answer round {}", round);
        self.abandon_round(UiEvent::RoundTimedOut)
    }

    fn try_resolve(&mut self) -> Vec<Effect> {
        let (Some(my_move), Some(peer_move)) = (self.my_move, self.peer_move) else {
            return vec![];
        };
        if !self.delivered {
            return vec![];
        }
        let outcome = resolve(my_move, peer_move);
        match outcome {
            Outcome::Win => self.my_score += 1,
            Outcome::Loss => self.peer_score += 1,
            Outcome::Tie => {}
        }
        info!(
            "Round {}: {} vs {} -> {:?} ({}:{})",
            self.round, my_move, peer_move, outcome, self.my_score, self.peer_score
        );
        self.clear_round();
        vec![Effect::Emit(UiEvent::RoundResult {
            my_move,
            peer_move,
            outcome,
            my_score: self.my_score,
            peer_score: self.peer_score,
        })]
    }

    fn abandon_round(&mut self, event: UiEvent) -> Vec<Effect> {
        warn!("Abandoning round {}: {:?}", self.round, event);
        self.clear_round();
        vec![Effect::Emit(event)]
    }

    fn clear_round(&mut self) {
        self.my_move = None;
        self.delivered = false;
        self.peer_move = None;
        self.round += 1;
        self.phase = Phase::Connected;
    }

    fn silence_radio(&mut self) -> Vec<Effect> {
        let mut effects = vec![];
        if std::mem::take(&mut self.radio.advertising) {
            effects.push(Effect::Command(AdapterCommand::StopAdvertising));
        }
        if std::mem::take(&mut self.radio.discovering) {
            effects.push(Effect::Command(AdapterCommand::StopDiscovery));
        }
        effects
    }

    /// Back to Idle from anywhere, releasing everything the adapter holds.
    fn reset(&mut self) -> Vec<Effect> {
        let mut effects = vec![];
        if let Some(peer) = self.peer.take() {
            effects.push(Effect::Command(AdapterCommand::Disconnect {
                endpoint_id: peer.endpoint_id,
            }));
        }
        effects.extend(self.silence_radio());
        effects.push(Effect::Command(AdapterCommand::DisconnectAll));
        effects.push(Effect::Emit(UiEvent::Disconnected));

        self.phase = Phase::Idle;
        self.my_move = None;
        self.delivered = false;
        self.peer_move = None;
        self.my_score = 0;
        self.peer_score = 0;
        self.candidates.clear();
        effects
    }

    fn is_peer(&self, endpoint_id: &EndpointId) -> bool {
        self.peer
            .as_ref()
            .is_some_and(|peer| &peer.endpoint_id == endpoint_id)
    }
}

fn not_allowed(reason: String) -> Vec<Effect> {
    warn!("Not allowed: {}", reason);
    vec![Effect::Emit(UiEvent::NotAllowed { reason })]
}
