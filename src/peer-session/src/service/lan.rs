use std::{collections::HashMap, net::SocketAddr, sync::Arc, time::Duration};

use async_trait::async_trait;
use common::model::messages::EndpointId;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::{TcpListener, TcpStream, UdpSocket},
    sync::{mpsc, Mutex},
    task::JoinHandle,
    time,
};
use tokio_tungstenite::{accept_async, connect_async, tungstenite::Message, WebSocketStream};
use tracing::{debug, error, info, warn};

use crate::{
    config::LanConfig,
    error::TransportError,
    model::internal::{AdapterEvent, EventSink},
    service::transport::Transport,
};

type Result<T> = std::result::Result<T, TransportError>;

const HELLO_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_BEACON_LEN: usize = 1024;

/// Broadcast periodically by an advertising endpoint.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
struct Beacon {
    service_id: String,
    endpoint_id: EndpointId,
    name: String,
    port: u16,
}

// Text frames on a link; payloads travel as binary frames
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type")]
enum ControlFrame {
    Hello { endpoint_id: EndpointId, name: String },
    Accept,
    Reject,
}

#[derive(Debug)]
enum Outbound {
    Control(ControlFrame),
    Payload(Vec<u8>),
    Close,
}

struct Found {
    address: SocketAddr,
    name: String,
}

struct Link {
    outbound: mpsc::Sender<Outbound>,
    accepted: bool,
    remote_accepted: bool,
    established: bool,
}

impl Link {
    fn new(outbound: mpsc::Sender<Outbound>) -> Self {
        Link {
            outbound,
            accepted: false,
            remote_accepted: false,
            established: false,
        }
    }
}

#[derive(Default)]
struct LanState {
    found: HashMap<EndpointId, Found>,
    links: HashMap<EndpointId, Link>,
}

/// State shared with the listener, discovery and link tasks.
struct Shared {
    endpoint_id: EndpointId,
    events: EventSink,
    state: Mutex<LanState>,
}

impl Shared {
    fn notify(&self, event: AdapterEvent) {
        if self.events.send(event).is_err() {
            debug!("Session no longer listening to the LAN adapter");
        }
    }

    /// Marks the link established once both ends accepted.
    async fn maybe_establish(&self, peer_id: &EndpointId) {
        let mut state = self.state.lock().await;
        let Some(link) = state.links.get_mut(peer_id) else {
            return;
        };
        if link.accepted && link.remote_accepted && !link.established {
            link.established = true;
            info!("Link to {} established", peer_id);
            self.notify(AdapterEvent::ConnectionEstablished {
                endpoint_id: peer_id.clone(),
            });
        }
    }

    /// Link task ended on its own; tell the session if it still cared.
    async fn link_lost(&self, peer_id: &EndpointId) {
        let removed = {
            let mut state = self.state.lock().await;
            // Its next beacon reports it afresh
            state.found.remove(peer_id);
            state.links.remove(peer_id)
        };
        let Some(link) = removed else {
            return;
        };
        let endpoint_id = peer_id.clone();
        self.notify(if link.established {
            AdapterEvent::Disconnected { endpoint_id }
        } else {
            AdapterEvent::ConnectionFailed { endpoint_id }
        });
    }
}

struct Advertiser {
    port: u16,
    listener_task: JoinHandle<()>,
    beacon_task: JoinHandle<()>,
}

impl Advertiser {
    fn abort(self) {
        self.listener_task.abort();
        self.beacon_task.abort();
    }
}

/// Nearby play over the local network: UDP broadcast beacons for discovery,
/// a websocket over TCP for each peer link.
pub struct LanTransport {
    config: LanConfig,
    shared: Arc<Shared>,
    advertiser: Option<Advertiser>,
    discoverer: Option<JoinHandle<()>>,
}

impl LanTransport {
    pub fn new(config: LanConfig, events: EventSink) -> Self {
        LanTransport {
            config,
            shared: Arc::new(Shared {
                endpoint_id: EndpointId::random(),
                events,
                state: Mutex::new(LanState::default()),
            }),
            advertiser: None,
            discoverer: None,
        }
    }

    /// TCP port peers dial while we advertise.
    pub fn listening_port(&self) -> Option<u16> {
        self.advertiser.as_ref().map(|advertiser| advertiser.port)
    }

    fn link_channel() -> (mpsc::Sender<Outbound>, mpsc::Receiver<Outbound>) {
        mpsc::channel(16)
    }

    async fn link_sender(&self, endpoint_id: &EndpointId) -> Result<mpsc::Sender<Outbound>> {
        self.shared
            .state
            .lock()
            .await
            .links
            .get(endpoint_id)
            .map(|link| link.outbound.clone())
            .ok_or_else(|| TransportError::UnknownEndpoint(endpoint_id.clone()))
    }
}

impl Drop for LanTransport {
    fn drop(&mut self) {
        if let Some(advertiser) = self.advertiser.take() {
            advertiser.abort();
        }
        if let Some(discoverer) = self.discoverer.take() {
            discoverer.abort();
        }
    }
}

#[async_trait]
impl Transport for LanTransport {
    fn local_endpoint(&self) -> EndpointId {
        self.shared.endpoint_id.clone()
    }

    async fn advertise(&mut self, local_name: &str, service_id: &str) -> Result<()> {
        if let Some(previous) = self.advertiser.take() {
            previous.abort();
        }
        let listener = TcpListener::bind(self.config.bind_address).await?;
        let port = listener.local_addr()?.port();
        let socket = UdpSocket::bind(SocketAddr::from(([0, 0, 0, 0], 0))).await?;
        socket.set_broadcast(true)?;
        let beacon = serde_json::to_vec(&Beacon {
            service_id: service_id.to_owned(),
            endpoint_id: self.shared.endpoint_id.clone(),
            name: local_name.to_owned(),
            port,
        })?;
        // Longer beacons would be cut short by the discovery buffer
        if beacon.len() > MAX_BEACON_LEN {
            return Err(TransportError::BeaconTooLarge {
                len: beacon.len(),
                max: MAX_BEACON_LEN,
            });
        }
        info!("Advertising {} as {} on port {}", service_id, local_name, port);

        let listener_task = tokio::spawn(listen(self.shared.clone(), listener));
        let beacon_task = tokio::spawn(beacon_loop(
            socket,
            beacon,
            self.config.broadcast_address,
            self.config.beacon_interval,
        ));
        self.advertiser = Some(Advertiser {
            port,
            listener_task,
            beacon_task,
        });
        Ok(())
    }

    async fn discover(&mut self, service_id: &str) -> Result<()> {
        if self.discoverer.is_some() {
            debug!("Already discovering");
            return Ok(());
        }
        let socket =
            UdpSocket::bind(SocketAddr::from(([0, 0, 0, 0], self.config.discovery_port))).await?;
        info!("Discovering {} on port {}", service_id, self.config.discovery_port);
        self.discoverer = Some(tokio::spawn(discovery_loop(
            self.shared.clone(),
            socket,
            service_id.to_owned(),
        )));
        Ok(())
    }

    async fn stop_advertising(&mut self) -> Result<()> {
        if let Some(advertiser) = self.advertiser.take() {
            debug!("Stopped advertising");
            advertiser.abort();
        }
        Ok(())
    }

    async fn stop_discovery(&mut self) -> Result<()> {
        if let Some(discoverer) = self.discoverer.take() {
            debug!("Stopped discovery");
            discoverer.abort();
        }
        Ok(())
    }

    async fn accept_connection(&mut self, endpoint_id: &EndpointId) -> Result<()> {
        let outbound = {
            let mut state = self.shared.state.lock().await;
            let link = state
                .links
                .get_mut(endpoint_id)
                .ok_or_else(|| TransportError::UnknownEndpoint(endpoint_id.clone()))?;
            link.accepted = true;
            link.outbound.clone()
        };
        outbound
            .send(Outbound::Control(ControlFrame::Accept))
            .await
            .map_err(|_| TransportError::LinkClosed(endpoint_id.clone()))?;
        self.shared.maybe_establish(endpoint_id).await;
        Ok(())
    }

    async fn reject_connection(&mut self, endpoint_id: &EndpointId) -> Result<()> {
        let removed = {
            let mut state = self.shared.state.lock().await;
            state.found.remove(endpoint_id);
            state.links.remove(endpoint_id)
        };
        if let Some(link) = removed {
            // The link may already be gone; nothing left to reject then
            let _ = link
                .outbound
                .send(Outbound::Control(ControlFrame::Reject))
                .await;
            let _ = link.outbound.send(Outbound::Close).await;
        }
        Ok(())
    }

    async fn request_connection(
        &mut self,
        local_name: &str,
        endpoint_id: &EndpointId,
    ) -> Result<()> {
        let (address, far_name, outbound_receiver) = {
            let mut state = self.shared.state.lock().await;
            if state.links.contains_key(endpoint_id) {
                debug!("Already linked to {}", endpoint_id);
                return Ok(());
            }
            let found = state
                .found
                .get(endpoint_id)
                .ok_or_else(|| TransportError::UnknownEndpoint(endpoint_id.clone()))?;
            // Both sides discover each other; only the smaller id dials
            if self.shared.endpoint_id > *endpoint_id {
                debug!("Waiting for {} to dial us", endpoint_id);
                return Ok(());
            }
            let (address, far_name) = (found.address, found.name.clone());
            let (sender, receiver) = Self::link_channel();
            state.links.insert(endpoint_id.clone(), Link::new(sender));
            (address, far_name, receiver)
        };

        tokio::spawn(dial(
            self.shared.clone(),
            endpoint_id.clone(),
            far_name,
            local_name.to_owned(),
            address,
            outbound_receiver,
        ));
        Ok(())
    }

    async fn disconnect(&mut self, endpoint_id: &EndpointId) -> Result<()> {
        let removed = self.shared.state.lock().await.links.remove(endpoint_id);
        if let Some(link) = removed {
            info!("Closing link to {}", endpoint_id);
            let _ = link.outbound.send(Outbound::Close).await;
        }
        Ok(())
    }

    async fn disconnect_all(&mut self) -> Result<()> {
        let links: Vec<(EndpointId, Link)> = {
            let mut state = self.shared.state.lock().await;
            state.found.clear();
            state.links.drain().collect()
        };
        for (endpoint_id, link) in links {
            debug!("Closing link to {}", endpoint_id);
            let _ = link.outbound.send(Outbound::Close).await;
        }
        Ok(())
    }

    async fn send(&mut self, endpoint_id: &EndpointId, bytes: &[u8]) -> Result<()> {
        let established = self
            .shared
            .state
            .lock()
            .await
            .links
            .get(endpoint_id)
            .is_some_and(|link| link.established);
        if !established {
            return Err(TransportError::NotConnected(endpoint_id.clone()));
        }
        self.link_sender(endpoint_id)
            .await?
            .send(Outbound::Payload(bytes.to_vec()))
            .await
            .map_err(|_| TransportError::LinkClosed(endpoint_id.clone()))
    }
}

async fn beacon_loop(socket: UdpSocket, beacon: Vec<u8>, target: SocketAddr, every: Duration) {
    let mut interval = time::interval(every);
    loop {
        interval.tick().await;
        if let Err(e) = socket.send_to(&beacon, target).await {
            warn!("Failed to send beacon to {}: {}", target, e);
        }
    }
}

async fn discovery_loop(shared: Arc<Shared>, socket: UdpSocket, service_id: String) {
    let mut buffer = [0u8; MAX_BEACON_LEN];
    loop {
        let (len, source) = match socket.recv_from(&mut buffer).await {
            Ok(received) => received,
            Err(e) => {
                error!("Discovery socket failed: {}", e);
                break;
            }
        };
        let beacon: Beacon = match serde_json::from_slice(&buffer[..len]) {
            Ok(beacon) => beacon,
            Err(e) => {
                debug!("Ignoring stray datagram from {}: {}", source, e);
                continue;
            }
        };
        if beacon.service_id != service_id || beacon.endpoint_id == shared.endpoint_id {
            continue;
        }

        let address = SocketAddr::new(source.ip(), beacon.port);
        let mut state = shared.state.lock().await;
        let is_new = state
            .found
            .insert(
                beacon.endpoint_id.clone(),
                Found {
                    address,
                    name: beacon.name.clone(),
                },
            )
            .is_none();
        if is_new {
            info!("Found {} ({}) at {}", beacon.name, beacon.endpoint_id, address);
            shared.notify(AdapterEvent::EndpointFound {
                endpoint_id: beacon.endpoint_id,
                name: beacon.name,
            });
        }
    }
}

async fn listen(shared: Arc<Shared>, listener: TcpListener) {
    loop {
        match listener.accept().await {
            Ok((stream, address)) => {
                tokio::spawn(inbound(shared.clone(), stream, address));
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}

/// Far side dialed us: wait for its hello, then hand the link to the session.
async fn inbound(shared: Arc<Shared>, stream: TcpStream, address: SocketAddr) {
    let mut ws = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("Websocket handshake with {} failed: {}", address, e);
            return;
        }
    };
    let hello = match time::timeout(HELLO_TIMEOUT, ws.next()).await {
        Ok(Some(Ok(Message::Text(text)))) => serde_json::from_str::<ControlFrame>(&text).ok(),
        _ => None,
    };
    let Some(ControlFrame::Hello { endpoint_id, name }) = hello else {
        warn!("No hello from {}, dropping", address);
        return;
    };

    let (sender, receiver) = LanTransport::link_channel();
    {
        let mut state = shared.state.lock().await;
        if state.links.contains_key(&endpoint_id) {
            warn!("Duplicate link from {} ({})", name, endpoint_id);
            return;
        }
        state.links.insert(endpoint_id.clone(), Link::new(sender));
    }
    debug!("{} ({}) dialed us from {}", name, endpoint_id, address);
    shared.notify(AdapterEvent::ConnectionRequested {
        endpoint_id: endpoint_id.clone(),
        name,
    });
    run_link(shared, endpoint_id, ws, receiver).await;
}

async fn dial(
    shared: Arc<Shared>,
    peer_id: EndpointId,
    peer_name: String,
    local_name: String,
    address: SocketAddr,
    outbound: mpsc::Receiver<Outbound>,
) {
    let url = format!("ws://{address}");
    let mut ws = match connect_async(url.as_str()).await {
        Ok((ws, _)) => ws,
        Err(e) => {
            warn!("Failed to dial {} at {}: {}", peer_id, url, e);
            shared.link_lost(&peer_id).await;
            return;
        }
    };
    let hello = ControlFrame::Hello {
        endpoint_id: shared.endpoint_id.clone(),
        name: local_name,
    };
    let sent = match serde_json::to_string(&hello) {
        Ok(text) => ws.send(Message::Text(text)).await.map_err(TransportError::from),
        Err(e) => Err(TransportError::from(e)),
    };
    if let Err(e) = sent {
        warn!("Failed to greet {}: {}", peer_id, e);
        shared.link_lost(&peer_id).await;
        return;
    }
    shared.notify(AdapterEvent::ConnectionRequested {
        endpoint_id: peer_id.clone(),
        name: peer_name,
    });
    run_link(shared, peer_id, ws, outbound).await;
}

/// Pump one peer link until either side closes it.
async fn run_link<S>(
    shared: Arc<Shared>,
    peer_id: EndpointId,
    ws: WebSocketStream<S>,
    mut outbound: mpsc::Receiver<Outbound>,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut write, mut read) = ws.split();
    loop {
        tokio::select! {
            frame = outbound.recv() => {
                let message = match frame {
                    Some(Outbound::Control(control)) => match serde_json::to_string(&control) {
                        Ok(text) => Message::Text(text),
                        Err(e) => {
                            error!("Could not serialize {:?}: {}", control, e);
                            continue;
                        }
                    },
                    Some(Outbound::Payload(bytes)) => Message::Binary(bytes),
                    Some(Outbound::Close) | None => {
                        // Closed from our side, the session already knows
                        let _ = write.send(Message::Close(None)).await;
                        return;
                    }
                };
                if let Err(e) = write.send(message).await {
                    warn!("Write to {} failed: {}", peer_id, e);
                    break;
                }
            }
            message = read.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ControlFrame>(&text) {
                            Ok(ControlFrame::Accept) => {
                                if let Some(link) = shared.state.lock().await.links.get_mut(&peer_id) {
                                    link.remote_accepted = true;
                                }
                                shared.maybe_establish(&peer_id).await;
                            }
                            Ok(ControlFrame::Reject) => {
                                info!("{} rejected the connection", peer_id);
                                break;
                            }
                            Ok(ControlFrame::Hello { .. }) => {
                                warn!("Unexpected hello from {}", peer_id);
                            }
                            Err(e) => warn!("Bad control frame from {}: {}", peer_id, e),
                        }
                    }
                    Some(Ok(Message::Binary(bytes))) => {
                        let established = shared
                            .state
                            .lock()
                            .await
                            .links
                            .get(&peer_id)
                            .is_some_and(|link| link.established);
                        if established {
                            shared.notify(AdapterEvent::BytesReceived {
                                endpoint_id: peer_id.clone(),
                                bytes,
                            });
                        } else {
                            warn!("Dropping payload from {} before the link is up", peer_id);
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("{} closed the link", peer_id);
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("Read from {} failed: {}", peer_id, e);
                        break;
                    }
                }
            }
        }
    }
    shared.link_lost(&peer_id).await;
}
