use std::{net::SocketAddr, time::Duration};

use common::model::identity;

pub const DEFAULT_SERVICE_ID: &str = "com.aziantic.p2p";
pub const DEFAULT_DISCOVERY_PORT: u16 = 47474;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Display name advertised to nearby devices.
    pub local_name: String,
    /// Only endpoints advertising the same service id are discovered.
    pub service_id: String,
    /// Abandon a round when the peer has not answered a submitted move in
    /// time. `None` waits indefinitely.
    pub round_timeout: Option<Duration>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            local_name: identity::generate(),
            service_id: DEFAULT_SERVICE_ID.to_owned(),
            round_timeout: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LanConfig {
    /// Listener for incoming peer links while advertising.
    pub bind_address: SocketAddr,
    /// UDP port beacons are sent to and discovery listens on.
    pub discovery_port: u16,
    pub broadcast_address: SocketAddr,
    pub beacon_interval: Duration,
}

impl Default for LanConfig {
    fn default() -> Self {
        LanConfig {
            bind_address: SocketAddr::from(([0, 0, 0, 0], 0)),
            discovery_port: DEFAULT_DISCOVERY_PORT,
            broadcast_address: SocketAddr::from(([255, 255, 255, 255], DEFAULT_DISCOVERY_PORT)),
            beacon_interval: Duration::from_secs(1),
        }
    }
}

impl LanConfig {
    pub fn with_discovery_port(mut self, port: u16) -> Self {
        self.discovery_port = port;
        self.broadcast_address.set_port(port);
        self
    }
}
