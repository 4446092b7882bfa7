//! Automated player for nearby rock-paper-scissors sessions.

use std::{error::Error, net::SocketAddr, time::Duration};

use agent::{
    client::{Client, MatchSummary},
    error::AgentError,
    strategy::{BeatLast, OnlyPaper, OnlyRock, OnlyScissors, RandomMove, Strategy},
};
use clap::{Parser, ValueEnum};
use common::{model::identity, utility::create_shutdown_channel};
use peer_session::{
    config::{LanConfig, SessionConfig, DEFAULT_DISCOVERY_PORT, DEFAULT_SERVICE_ID},
    entrypoint::{init_logging, serve, PeerSession},
    model::internal::adapter_channel,
    service::{lan::LanTransport, loopback::Airwaves},
};
use tracing::{error, info};

#[derive(ValueEnum, Clone, Copy, Debug)]
enum StrategyKind {
    Rock,
    Paper,
    Scissors,
    Random,
    BeatLast,
}

impl StrategyKind {
    fn build(self) -> Box<dyn Strategy + Send> {
        match self {
            StrategyKind::Rock => Box::new(OnlyRock {}),
            StrategyKind::Paper => Box::new(OnlyPaper {}),
            StrategyKind::Scissors => Box::new(OnlyScissors {}),
            StrategyKind::Random => Box::new(RandomMove::new()),
            StrategyKind::BeatLast => Box::new(BeatLast {}),
        }
    }
}

/// Rock-paper-scissors agent
#[derive(Parser, Debug)]
#[command(name = "agent")]
#[command(about = "Finds a nearby opponent and plays rock-paper-scissors against it")]
#[command(version)]
struct Args {
    /// Display name advertised to nearby devices; a random codename if omitted
    #[arg(short, long)]
    name: Option<String>,

    #[arg(short, long, value_enum, default_value_t = StrategyKind::Random)]
    strategy: StrategyKind,

    /// Rounds to play before leaving
    #[arg(short, long, default_value_t = 3)]
    rounds: usize,

    #[arg(long, default_value = DEFAULT_SERVICE_ID)]
    service_id: String,

    /// UDP port for discovery beacons
    #[arg(long, default_value_t = DEFAULT_DISCOVERY_PORT)]
    discovery_port: u16,

    /// Address the peer link listener binds to
    #[arg(long, default_value = "0.0.0.0:0")]
    bind: SocketAddr,

    /// Give up on a round the opponent does not answer in time
    #[arg(long)]
    round_timeout_secs: Option<u64>,

    /// Play against a second in-process agent instead of the network
    #[arg(long)]
    loopback: bool,

    /// Strategy of the in-process opponent
    #[arg(long, value_enum, default_value_t = StrategyKind::Random)]
    opponent_strategy: StrategyKind,

    /// Log filter, overridden by RUST_LOG
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn session_config(&self, local_name: String) -> SessionConfig {
        SessionConfig {
            local_name,
            service_id: self.service_id.clone(),
            round_timeout: self.round_timeout_secs.map(Duration::from_secs),
        }
    }
}

async fn run_agent(
    session: PeerSession,
    strategy: StrategyKind,
    rounds: usize,
) -> Result<MatchSummary, Box<dyn Error>> {
    let PeerSession {
        handle,
        mut ui_events,
        task,
    } = session;
    let result = Client::new(strategy.build())
        .play(&handle, &mut ui_events, rounds)
        .await;
    // Last handle gone, the session task releases the adapter and exits
    drop(handle);
    let session = task.await?;
    info!("{} done", session.local_name());
    Ok(result?)
}

fn report(name: &str, result: Result<MatchSummary, Box<dyn Error>>) {
    match result {
        Ok(summary) => {
            let opponent = summary.opponent.as_deref().unwrap_or("nobody");
            info!(
                "{} vs {}: {}:{} after {} rounds{}",
                name,
                opponent,
                summary.my_score,
                summary.peer_score,
                summary.rounds.len(),
                if summary.cut_short { " (cut short)" } else { "" }
            );
        }
        Err(e) => match e.downcast_ref::<AgentError>() {
            Some(AgentError::EventsClosed) => info!("{} stopped before the match ended", name),
            _ => error!("{} failed: {}", name, e),
        },
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    init_logging(&args.log_level);
    let shutdown_receiver = create_shutdown_channel();
    let name = args.name.clone().unwrap_or_else(identity::generate);

    if args.loopback {
        let airwaves = Airwaves::new();
        let opponent_name = identity::generate();

        let (sink, source) = adapter_channel();
        let transport = airwaves.transport(sink).await;
        let mine = serve(
            args.session_config(name.clone()),
            transport,
            source,
            shutdown_receiver.resubscribe(),
        );
        let (sink, source) = adapter_channel();
        let transport = airwaves.transport(sink).await;
        let theirs = serve(
            args.session_config(opponent_name.clone()),
            transport,
            source,
            shutdown_receiver,
        );

        let (mine, theirs) = tokio::join!(
            run_agent(mine, args.strategy, args.rounds),
            run_agent(theirs, args.opponent_strategy, args.rounds),
        );
        report(&name, mine);
        report(&opponent_name, theirs);
    } else {
        let lan = LanConfig {
            bind_address: args.bind,
            ..LanConfig::default().with_discovery_port(args.discovery_port)
        };
        let (sink, source) = adapter_channel();
        let session = serve(
            args.session_config(name.clone()),
            LanTransport::new(lan, sink),
            source,
            shutdown_receiver,
        );
        info!("{} looking for an opponent on the local network", name);
        report(&name, run_agent(session, args.strategy, args.rounds).await);
    }
    Ok(())
}
