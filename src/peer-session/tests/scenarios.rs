use peer_session::{config::SessionConfig, entrypoint::init_logging, service::session::Phase, test::TestCase};

fn config() -> SessionConfig {
    SessionConfig {
        local_name: "Red Pie".to_owned(),
        service_id: "test.service".to_owned(),
        round_timeout: None,
    }
}

fn load(name: &str) -> TestCase {
    init_logging("debug");
    let file_path = env!("CARGO_MANIFEST_DIR").to_string() + "/test/data/" + name;
    let replacements = vec![
        ("peer", "E1"),
        ("local_name", "Red Pie"),
        ("service_id", "test.service"),
    ];
    TestCase::load(file_path, replacements)
}

#[tokio::test]
async fn connect_and_win() {
    let session = load("connect_and_win.json").run(config()).await;
    // Shutdown releases the opponent
    assert_eq!(session.phase(), Phase::Idle);
    assert_eq!(session.round(), 2);
}

#[tokio::test]
async fn buffered_peer_move() {
    let session = load("buffered_peer_move.json").run(config()).await;
    assert_eq!(session.round(), 1);
}

#[tokio::test]
async fn disconnect_mid_round() {
    let session = load("disconnect_mid_round.json").run(config()).await;
    assert_eq!(session.phase(), Phase::Idle);
    assert!(session.peer().is_none());
    assert_eq!(session.scores(), (0, 0));
}

#[tokio::test]
async fn malformed_payload() {
    let session = load("malformed_payload.json").run(config()).await;
    // The abandoned round still counts
    assert_eq!(session.round(), 2);
}

#[tokio::test]
async fn search_failure() {
    let session = load("search_failure.json").run(config()).await;
    assert_eq!(session.phase(), Phase::Idle);
}

#[tokio::test]
async fn send_failure() {
    let session = load("send_failure.json").run(config()).await;
    assert_eq!(session.round(), 1);
}
