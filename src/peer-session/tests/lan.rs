use std::{net::SocketAddr, time::Duration};

use common::model::game::{Move, Outcome};
use peer_session::{
    config::{LanConfig, SessionConfig},
    entrypoint::{init_logging, serve, PeerSession},
    model::{external::UiEvent, internal::adapter_channel},
    service::lan::LanTransport,
};
use tokio::{net::UdpSocket, sync::broadcast, time::timeout};

async fn free_udp_port() -> u16 {
    UdpSocket::bind("127.0.0.1:0")
        .await
        .expect("Failed to get random port")
        .local_addr()
        .expect("Failed to unwrap local address")
        .port()
}

// Listens on `listen_port`, beacons to `beacon_port`
fn lan_config(listen_port: u16, beacon_port: u16) -> LanConfig {
    LanConfig {
        bind_address: SocketAddr::from(([127, 0, 0, 1], 0)),
        discovery_port: listen_port,
        broadcast_address: SocketAddr::from(([127, 0, 0, 1], beacon_port)),
        beacon_interval: Duration::from_millis(50),
    }
}

fn device(name: &str, lan: LanConfig, shutdown_sender: &broadcast::Sender<()>) -> PeerSession {
    let (sink, source) = adapter_channel();
    let config = SessionConfig {
        local_name: name.to_owned(),
        service_id: "test.service".to_owned(),
        round_timeout: None,
    };
    serve(
        config,
        LanTransport::new(lan, sink),
        source,
        shutdown_sender.subscribe(),
    )
}

async fn next_ui(session: &mut PeerSession) -> UiEvent {
    timeout(Duration::from_secs(5), session.ui_events.recv())
        .await
        .expect("Timeout waiting for UI event")
        .expect("UI event stream closed")
}

#[tokio::test]
async fn sessions_meet_over_localhost() {
    init_logging("debug");
    let (alice_port, bob_port) = (free_udp_port().await, free_udp_port().await);
    let (shutdown_sender, _) = broadcast::channel(1);
    let mut alice = device("Alice", lan_config(alice_port, bob_port), &shutdown_sender);
    let mut bob = device("Bob", lan_config(bob_port, alice_port), &shutdown_sender);

    alice.handle.start_searching().await.unwrap();
    bob.handle.start_searching().await.unwrap();
    assert_eq!(next_ui(&mut alice).await, UiEvent::SearchingStarted);
    assert_eq!(next_ui(&mut bob).await, UiEvent::SearchingStarted);
    assert_eq!(
        next_ui(&mut alice).await,
        UiEvent::Connected {
            peer_name: "Bob".to_owned()
        }
    );
    assert_eq!(
        next_ui(&mut bob).await,
        UiEvent::Connected {
            peer_name: "Alice".to_owned()
        }
    );

    bob.handle.submit_move(Move::Paper).await.unwrap();
    alice.handle.submit_move(Move::Scissors).await.unwrap();
    assert!(matches!(
        next_ui(&mut alice).await,
        UiEvent::MoveAccepted { .. }
    ));
    assert_eq!(
        next_ui(&mut alice).await,
        UiEvent::RoundResult {
            my_move: Move::Scissors,
            peer_move: Move::Paper,
            outcome: Outcome::Win,
            my_score: 1,
            peer_score: 0,
        }
    );
    assert!(matches!(
        next_ui(&mut bob).await,
        UiEvent::MoveAccepted { .. }
    ));
    assert!(matches!(
        next_ui(&mut bob).await,
        UiEvent::RoundResult {
            outcome: Outcome::Loss,
            ..
        }
    ));

    bob.handle.disconnect().await.unwrap();
    assert_eq!(next_ui(&mut bob).await, UiEvent::Disconnected);
    assert_eq!(next_ui(&mut alice).await, UiEvent::Disconnected);

    shutdown_sender.send(()).unwrap();
    alice.task.await.unwrap();
    bob.task.await.unwrap();
}
