//! Property-based tests for the session state machine.
//!
//! Arbitrary interleavings of user requests, adapter events, command
//! failures and timer expiries must never leave the session inconsistent.

use common::model::{game::Move, messages::EndpointId};
use peer_session::{
    config::SessionConfig,
    model::{
        external::{UiEvent, UserRequest},
        internal::{AdapterCommand, AdapterEvent, Effect, SessionRequest},
    },
    service::session::{Phase, Session},
};
use proptest::prelude::*;

fn config() -> SessionConfig {
    SessionConfig {
        local_name: "Red Pie".to_owned(),
        service_id: "test.service".to_owned(),
        round_timeout: None,
    }
}

fn endpoint_strategy() -> impl Strategy<Value = EndpointId> {
    prop_oneof![Just(EndpointId::from("E1")), Just(EndpointId::from("E2"))]
}

fn move_strategy() -> impl Strategy<Value = Move> {
    prop_oneof![Just(Move::Rock), Just(Move::Paper), Just(Move::Scissors)]
}

fn payload_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop_oneof![
        4 => move_strategy().prop_map(|value| value.encode()),
        1 => Just(b"LIZARD".to_vec()),
        1 => Just(vec![0xff, 0xfe]),
    ]
}

fn user_strategy() -> impl Strategy<Value = UserRequest> {
    prop_oneof![
        1 => Just(UserRequest::StartSearching),
        1 => Just(UserRequest::StopSearching),
        3 => move_strategy().prop_map(|value| UserRequest::SubmitMove { value }),
        1 => Just(UserRequest::Disconnect),
    ]
}

fn adapter_strategy() -> impl Strategy<Value = AdapterEvent> {
    prop_oneof![
        1 => endpoint_strategy().prop_map(|endpoint_id| AdapterEvent::EndpointFound {
            endpoint_id,
            name: "Bob".to_owned(),
        }),
        1 => endpoint_strategy().prop_map(|endpoint_id| AdapterEvent::ConnectionRequested {
            endpoint_id,
            name: "Bob".to_owned(),
        }),
        2 => endpoint_strategy()
            .prop_map(|endpoint_id| AdapterEvent::ConnectionEstablished { endpoint_id }),
        1 => endpoint_strategy().prop_map(|endpoint_id| AdapterEvent::ConnectionFailed { endpoint_id }),
        4 => (endpoint_strategy(), payload_strategy())
            .prop_map(|(endpoint_id, bytes)| AdapterEvent::BytesReceived { endpoint_id, bytes }),
        1 => endpoint_strategy().prop_map(|endpoint_id| AdapterEvent::Disconnected { endpoint_id }),
    ]
}

fn failure_strategy() -> impl Strategy<Value = SessionRequest> {
    let command = prop_oneof![
        Just(AdapterCommand::Advertise {
            local_name: "Red Pie".to_owned(),
            service_id: "test.service".to_owned(),
        }),
        Just(AdapterCommand::Discover {
            service_id: "test.service".to_owned(),
        }),
        (endpoint_strategy(), move_strategy())
            .prop_map(|(endpoint_id, value)| AdapterCommand::send_move(endpoint_id, value)),
        Just(AdapterCommand::DisconnectAll),
    ];
    command.prop_map(|command| SessionRequest::CommandFailed {
        command,
        reason: "radio off".to_owned(),
    })
}

fn request_strategy() -> impl Strategy<Value = SessionRequest> {
    prop_oneof![
        4 => user_strategy().prop_map(SessionRequest::User),
        6 => adapter_strategy().prop_map(SessionRequest::Adapter),
        1 => failure_strategy(),
        1 => (0u64..4).prop_map(|round| SessionRequest::RoundTimeout { round }),
        1 => Just(SessionRequest::MoveDelivered),
    ]
}

/// A request paired with whether the adapter delivers any Send it triggers.
fn step_strategy() -> impl Strategy<Value = (SessionRequest, bool)> {
    (request_strategy(), prop::bool::weighted(0.8))
}

/// Apply `request` and answer its Send commands the way the session task
/// does, returning every effect produced along the way.
fn step(session: &mut Session, request: SessionRequest, send_ok: bool) -> Vec<Effect> {
    let mut effects = session.apply(request);
    let mut answered = 0;
    while let Some(send) = effects[answered..]
        .iter()
        .find_map(|effect| match effect {
            Effect::Command(command @ AdapterCommand::Send { .. }) => Some(command.clone()),
            _ => None,
        })
    {
        answered = effects.len();
        let reply = if send_ok {
            SessionRequest::MoveDelivered
        } else {
            SessionRequest::CommandFailed {
                command: send,
                reason: "radio off".to_owned(),
            }
        };
        effects.extend(session.apply(reply));
    }
    effects
}

fn check(session: &Session) -> Result<(), String> {
    let (mine, theirs) = session.scores();
    match session.phase() {
        Phase::Idle | Phase::Searching => {
            if session.peer().is_some() {
                return Err("peer recorded while not connected".to_owned());
            }
            if session.my_move().is_some() || session.peer_move().is_some() {
                return Err("moves recorded while not connected".to_owned());
            }
            if (mine, theirs) != (0, 0) {
                return Err(format!("score {mine}:{theirs} survived the opponent"));
            }
        }
        Phase::Connected => {
            if session.peer().is_none() {
                return Err("connected without a peer".to_owned());
            }
            if session.my_move().is_some() {
                return Err("own move pending while Connected".to_owned());
            }
        }
        Phase::AwaitingMoves => {
            if session.peer().is_none() {
                return Err("awaiting moves without a peer".to_owned());
            }
            if session.my_move().is_none() {
                return Err("awaiting moves without an own move".to_owned());
            }
        }
    }
    if session.my_move().is_some() && session.peer_move().is_some() {
        return Err("round left unresolved with both moves in".to_owned());
    }
    if u64::from(mine) + u64::from(theirs) > session.round() {
        return Err(format!(
            "score {mine}:{theirs} exceeds {} rounds",
            session.round()
        ));
    }
    Ok(())
}

proptest! {
    /// Session invariants hold under arbitrary request sequences.
    #[test]
    fn prop_session_invariants_hold(steps in prop::collection::vec(step_strategy(), 0..80)) {
        let mut session = Session::new(&config());
        for (request, send_ok) in steps {
            let _ = step(&mut session, request.clone(), send_ok);
            let result = check(&session);
            prop_assert!(result.is_ok(), "{:?} after {:?}", result, request);
        }
    }

    /// Every entry to Idle from elsewhere is announced exactly once.
    #[test]
    fn prop_idle_entry_is_announced(steps in prop::collection::vec(step_strategy(), 0..80)) {
        let mut session = Session::new(&config());
        for (request, send_ok) in steps {
            let before = session.phase();
            let effects = step(&mut session, request.clone(), send_ok);
            let announced = effects
                .iter()
                .filter(|effect| matches!(effect, Effect::Emit(UiEvent::Disconnected)))
                .count();
            let entered_idle = before != Phase::Idle && session.phase() == Phase::Idle;
            prop_assert_eq!(announced, usize::from(entered_idle), "after {:?}", request);
            if entered_idle {
                prop_assert!(
                    effects.contains(&Effect::Command(AdapterCommand::DisconnectAll)),
                    "adapter not released after {:?}", request
                );
            }
        }
    }

    /// Only a delivered move of ours or our opponent's bytes can produce
    /// a result.
    #[test]
    fn prop_results_need_both_moves(steps in prop::collection::vec(step_strategy(), 0..80)) {
        let mut session = Session::new(&config());
        for (request, send_ok) in steps {
            let scores = session.scores();
            let effects = step(&mut session, request.clone(), send_ok);
            let resolved = effects.iter().any(|effect| {
                matches!(effect, Effect::Emit(UiEvent::RoundResult { .. }))
            });
            if resolved {
                prop_assert!(
                    matches!(
                        request,
                        SessionRequest::User(UserRequest::SubmitMove { .. })
                            | SessionRequest::Adapter(AdapterEvent::BytesReceived { .. })
                    ),
                    "result produced by {:?}", request
                );
                prop_assert_eq!(session.phase(), Phase::Connected);
            }
            if !send_ok && matches!(request, SessionRequest::User(UserRequest::SubmitMove { .. })) {
                prop_assert!(!resolved, "undelivered move scored");
                prop_assert_eq!(session.scores(), scores);
            }
        }
    }
}
