use tokio::{
    sync::{broadcast, mpsc},
    task::JoinHandle,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::{
    config::SessionConfig,
    model::{external::UiEvent, internal::EventSource},
    service::{
        session::Session,
        session_thread::{SessionHandle, SessionThread},
        transport::Transport,
    },
};

/// Init logging, ignore error if already set. `RUST_LOG` wins over `level`.
pub fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_line_number(true)
        .with_file(true)
        .with_env_filter(filter)
        .try_init();
}

/// A session task running in the background.
pub struct PeerSession {
    pub handle: SessionHandle,
    pub ui_events: mpsc::Receiver<UiEvent>,
    pub task: JoinHandle<Session>,
}

/// Spawn the session task for `transport`, whose events arrive on `adapter_events`.
pub fn serve<T: Transport>(
    config: SessionConfig,
    transport: T,
    adapter_events: EventSource,
    shutdown_receiver: broadcast::Receiver<()>,
) -> PeerSession {
    let (ui_sender, ui_receiver) = mpsc::channel::<UiEvent>(100);
    let (to_session_sender, to_session_receiver) = mpsc::channel(100);

    let mut shutdown_receiver = shutdown_receiver;
    let thread = SessionThread::new(&config, transport, ui_sender);
    let task = tokio::spawn(async move {
        thread
            .run(&mut shutdown_receiver, to_session_receiver, adapter_events)
            .await
    });
    info!("Spawned session for {}", config.local_name);

    PeerSession {
        handle: SessionHandle::new(to_session_sender),
        ui_events: ui_receiver,
        task,
    }
}
