use common::model::game::Move;
use peer_session::{model::external::UiEvent, service::session_thread::SessionHandle};
use std::time::Duration;

use tokio::{sync::mpsc, time};
use tracing::{debug, info, warn};

use crate::{
    error::AgentError,
    strategy::{Round, Strategy},
};

/// Pause before searching again after a failed attempt.
const SEARCH_RETRY_DELAY: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchSummary {
    pub opponent: Option<String>,
    pub rounds: Vec<Round>,
    pub my_score: u32,
    pub peer_score: u32,
    /// The session ended before all rounds were played.
    pub cut_short: bool,
}

pub struct Client {
    strategy: Box<dyn Strategy + Send>,
    history: Vec<Round>,
    last_move: Option<Move>,
}

impl Client {
    pub fn new(strategy: Box<dyn Strategy + Send>) -> Self {
        Client {
            strategy,
            history: Vec::new(),
            last_move: None,
        }
    }

    fn next_move(&mut self) -> Move {
        let next_move = self.strategy.make_move(&self.history);
        self.last_move = Some(next_move);
        next_move
    }

    async fn submit(&mut self, handle: &SessionHandle) -> Result<(), AgentError> {
        let next_move = self.next_move();
        debug!("Playing {}", next_move);
        handle.submit_move(next_move).await?;
        Ok(())
    }

    /// Search for an opponent and play `rounds` rounds against it.
    ///
    /// Ends early, with [`MatchSummary::cut_short`] set, if the session drops
    /// back to Idle before then.
    pub async fn play(
        &mut self,
        handle: &SessionHandle,
        ui_events: &mut mpsc::Receiver<UiEvent>,
        rounds: usize,
    ) -> Result<MatchSummary, AgentError> {
        self.history.clear();
        let mut summary = MatchSummary {
            opponent: None,
            rounds: vec![],
            my_score: 0,
            peer_score: 0,
            cut_short: false,
        };
        if rounds == 0 {
            return Ok(summary);
        }

        handle.start_searching().await?;
        let mut leaving = false;
        // Disconnected events still owed for searches we stopped ourselves
        let mut restarts = 0usize;
        loop {
            let event = ui_events.recv().await.ok_or(AgentError::EventsClosed)?;
            match event {
                UiEvent::SearchingStarted => info!("Searching for an opponent"),
                UiEvent::Connected { peer_name } => {
                    info!("Playing {} rounds against {}", rounds, peer_name);
                    restarts = 0;
                    summary.opponent = Some(peer_name);
                    self.submit(handle).await?;
                }
                UiEvent::MoveAccepted { my_move } => debug!("{} accepted", my_move),
                UiEvent::RoundResult {
                    my_move,
                    peer_move,
                    outcome,
                    my_score,
                    peer_score,
                } => {
                    info!(
                        "{} vs {}: {:?} ({}:{})",
                        my_move, peer_move, outcome, my_score, peer_score
                    );
                    self.history.push(Round {
                        my_move,
                        their_move: peer_move,
                        outcome,
                    });
                    summary.my_score = my_score;
                    summary.peer_score = peer_score;
                    if self.history.len() >= rounds {
                        leaving = true;
                        handle.disconnect().await?;
                    } else {
                        self.submit(handle).await?;
                    }
                }
                UiEvent::NotAllowed { reason } => warn!("Not allowed: {}", reason),
                UiEvent::SearchFailed { reason } => {
                    warn!("Search failed: {}", reason);
                    // Restart from scratch so every endpoint is reported again
                    time::sleep(SEARCH_RETRY_DELAY).await;
                    restarts += 1;
                    handle.stop_searching().await?;
                    handle.start_searching().await?;
                }
                UiEvent::SendFailed { reason } => {
                    warn!("Move {:?} was not delivered: {}", self.last_move, reason);
                    self.submit(handle).await?;
                }
                UiEvent::ProtocolError { reason } => {
                    warn!("Round abandoned: {}", reason);
                    self.submit(handle).await?;
                }
                UiEvent::RoundTimedOut => {
                    warn!("Opponent did not answer, replaying the round");
                    self.submit(handle).await?;
                }
                UiEvent::Disconnected if restarts > 0 => {
                    restarts -= 1;
                    debug!("Search stopped for a retry");
                }
                UiEvent::Disconnected => {
                    summary.cut_short = !leaving;
                    break;
                }
            }
        }
        summary.rounds = std::mem::take(&mut self.history);
        Ok(summary)
    }
}
