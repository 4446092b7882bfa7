use std::{collections::VecDeque, time::Duration};

use common::model::game::Move;
use tokio::{
    sync::{broadcast, mpsc},
    time::{self, Instant},
};
use tracing::{debug, error, info, warn};

use crate::{
    config::SessionConfig,
    error::SessionError,
    model::{
        external::{UiEvent, UserRequest},
        internal::{AdapterCommand, Effect, EventSource, SessionRequest},
    },
    service::{
        session::{Phase, Session},
        transport::Transport,
    },
};

/// Cloneable UI-side entry point into a running session task.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    sender: mpsc::Sender<UserRequest>,
}

impl SessionHandle {
    pub fn new(sender: mpsc::Sender<UserRequest>) -> Self {
        SessionHandle { sender }
    }

    pub async fn request(&self, request: UserRequest) -> Result<(), SessionError> {
        self.sender
            .send(request)
            .await
            .map_err(|_| SessionError::Closed)
    }

    pub async fn start_searching(&self) -> Result<(), SessionError> {
        self.request(UserRequest::StartSearching).await
    }

    pub async fn stop_searching(&self) -> Result<(), SessionError> {
        self.request(UserRequest::StopSearching).await
    }

    pub async fn submit_move(&self, value: Move) -> Result<(), SessionError> {
        self.request(UserRequest::SubmitMove { value }).await
    }

    pub async fn disconnect(&self) -> Result<(), SessionError> {
        self.request(UserRequest::Disconnect).await
    }
}

/// Single owner of the [`Session`] and its transport.
///
/// Requests from the UI, adapter events and timer expiries are applied one
/// at a time; every effect of a request is carried out before the next one
/// is taken.
pub struct SessionThread<T: Transport> {
    session: Session,
    transport: T,
    to_ui: mpsc::Sender<UiEvent>,
    round_timeout: Option<Duration>,
    // (round, deadline) of the armed round timer
    deadline: Option<(u64, Instant)>,
}

impl<T: Transport> SessionThread<T> {
    pub fn new(config: &SessionConfig, transport: T, to_ui: mpsc::Sender<UiEvent>) -> Self {
        SessionThread {
            session: Session::new(config),
            transport,
            to_ui,
            round_timeout: config.round_timeout,
            deadline: None,
        }
    }

    pub async fn run(
        mut self,
        shutdown_receiver: &mut broadcast::Receiver<()>,
        mut from_ui: mpsc::Receiver<UserRequest>,
        mut from_adapter: EventSource,
    ) -> Session {
        info!(
            "Session for {} ({}) started",
            self.session.local_name(),
            self.transport.local_endpoint()
        );
        loop {
            let timer = time::sleep_until(
                self.deadline
                    .map(|(_, at)| at)
                    .unwrap_or_else(Instant::now),
            );
            tokio::select! {
                request = from_ui.recv() => {
                    let Some(request) = request else {
                        debug!("All session handles dropped");
                        break;
                    };
                    self.dispatch(SessionRequest::User(request)).await;
                }
                event = from_adapter.recv() => {
                    let Some(event) = event else {
                        warn!("Adapter event stream closed");
                        break;
                    };
                    self.dispatch(SessionRequest::Adapter(event)).await;
                }
                _ = timer, if self.deadline.is_some() => {
                    if let Some((round, _)) = self.deadline.take() {
                        self.dispatch(SessionRequest::RoundTimeout { round }).await;
                    }
                }
                _ = shutdown_receiver.recv() => {
                    break;
                }
            }
        }

        // Leave the adapter idle whatever state we stopped in
        self.dispatch(SessionRequest::User(UserRequest::Disconnect))
            .await;
        info!("Session for {} stopped", self.session.local_name());
        self.session
    }

    async fn dispatch(&mut self, request: SessionRequest) {
        let mut pending = VecDeque::from([request]);
        while let Some(request) = pending.pop_front() {
            for effect in self.session.apply(request) {
                match effect {
                    Effect::Command(command) => match self.transport.execute(&command).await {
                        Ok(()) => {
                            if matches!(command, AdapterCommand::Send { .. }) {
                                pending.push_back(SessionRequest::MoveDelivered);
                            }
                        }
                        Err(e) => {
                            error!("Adapter command {:?} failed: {}", command, e);
                            pending.push_back(SessionRequest::CommandFailed {
                                command,
                                reason: e.to_string(),
                            });
                        }
                    },
                    Effect::Emit(event) => {
                        if self.to_ui.send(event).await.is_err() {
                            debug!("UI stopped listening");
                        }
                    }
                }
            }
        }
        self.arm_timer();
    }

    fn arm_timer(&mut self) {
        let Some(timeout) = self.round_timeout else {
            return;
        };
        if self.session.phase() != Phase::AwaitingMoves {
            self.deadline = None;
            return;
        }
        let round = self.session.round();
        if !matches!(self.deadline, Some((armed, _)) if armed == round) {
            debug!("Round {} times out in {:?}", round, timeout);
            self.deadline = Some((round, Instant::now() + timeout));
        }
    }
}
