use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use common::model::messages::EndpointId;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{
    error::TransportError,
    model::internal::{AdapterEvent, EventSink},
    service::transport::Transport,
};

type Result<T> = std::result::Result<T, TransportError>;

#[derive(Debug, Default)]
struct Link {
    accepted: bool,
    established: bool,
}

struct Station {
    events: EventSink,
    // (name, service id)
    advertising: Option<(String, String)>,
    discovering: Option<String>,
    links: HashMap<EndpointId, Link>,
}

impl Station {
    fn notify(&self, event: AdapterEvent) {
        if self.events.send(event).is_err() {
            debug!("Station no longer listening");
        }
    }
}

#[derive(Default)]
struct AirwavesState {
    stations: HashMap<EndpointId, Station>,
}

impl AirwavesState {
    fn station(&self, id: &EndpointId) -> Result<&Station> {
        self.stations
            .get(id)
            .ok_or_else(|| TransportError::UnknownEndpoint(id.clone()))
    }

    fn station_mut(&mut self, id: &EndpointId) -> Result<&mut Station> {
        self.stations
            .get_mut(id)
            .ok_or_else(|| TransportError::UnknownEndpoint(id.clone()))
    }

    /// Drop the link between `a` and `b` on both sides. `b` learns about it.
    fn unlink(&mut self, a: &EndpointId, b: &EndpointId) {
        let removed = self
            .stations
            .get_mut(a)
            .and_then(|station| station.links.remove(b));
        let Some(link) = removed else {
            return;
        };
        if let Some(far) = self.stations.get_mut(b) {
            far.links.remove(a);
            let endpoint_id = a.clone();
            far.notify(if link.established {
                AdapterEvent::Disconnected { endpoint_id }
            } else {
                AdapterEvent::ConnectionFailed { endpoint_id }
            });
        }
    }
}

/// In-process stand-in for the radio: every [`LoopbackTransport`] created
/// from the same `Airwaves` can find and connect to the others.
#[derive(Clone, Default)]
pub struct Airwaves {
    state: Arc<Mutex<AirwavesState>>,
}

impl Airwaves {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new device whose adapter events go to `events`.
    pub async fn transport(&self, events: EventSink) -> LoopbackTransport {
        let endpoint_id = EndpointId::random();
        self.state.lock().await.stations.insert(
            endpoint_id.clone(),
            Station {
                events,
                advertising: None,
                discovering: None,
                links: HashMap::new(),
            },
        );
        LoopbackTransport {
            endpoint_id,
            airwaves: self.clone(),
        }
    }
}

pub struct LoopbackTransport {
    endpoint_id: EndpointId,
    airwaves: Airwaves,
}

#[async_trait]
impl Transport for LoopbackTransport {
    fn local_endpoint(&self) -> EndpointId {
        self.endpoint_id.clone()
    }

    async fn advertise(&mut self, local_name: &str, service_id: &str) -> Result<()> {
        let mut state = self.airwaves.state.lock().await;
        state.station_mut(&self.endpoint_id)?.advertising =
            Some((local_name.to_owned(), service_id.to_owned()));
        for (id, station) in state.stations.iter() {
            if id != &self.endpoint_id && station.discovering.as_deref() == Some(service_id) {
                station.notify(AdapterEvent::EndpointFound {
                    endpoint_id: self.endpoint_id.clone(),
                    name: local_name.to_owned(),
                });
            }
        }
        info!("{} advertising {}", self.endpoint_id, service_id);
        Ok(())
    }

    async fn discover(&mut self, service_id: &str) -> Result<()> {
        let mut state = self.airwaves.state.lock().await;
        state.station_mut(&self.endpoint_id)?.discovering = Some(service_id.to_owned());
        let me = state.station(&self.endpoint_id)?;
        for (id, station) in state.stations.iter() {
            let Some((name, service)) = &station.advertising else {
                continue;
            };
            if id != &self.endpoint_id && service == service_id {
                me.notify(AdapterEvent::EndpointFound {
                    endpoint_id: id.clone(),
                    name: name.clone(),
                });
            }
        }
        Ok(())
    }

    async fn stop_advertising(&mut self) -> Result<()> {
        let mut state = self.airwaves.state.lock().await;
        state.station_mut(&self.endpoint_id)?.advertising = None;
        Ok(())
    }

    async fn stop_discovery(&mut self) -> Result<()> {
        let mut state = self.airwaves.state.lock().await;
        state.station_mut(&self.endpoint_id)?.discovering = None;
        Ok(())
    }

    async fn accept_connection(&mut self, endpoint_id: &EndpointId) -> Result<()> {
        let mut state = self.airwaves.state.lock().await;
        let link = state
            .station_mut(&self.endpoint_id)?
            .links
            .get_mut(endpoint_id)
            .ok_or_else(|| TransportError::UnknownEndpoint(endpoint_id.clone()))?;
        link.accepted = true;

        let far_accepted = state
            .station(endpoint_id)?
            .links
            .get(&self.endpoint_id)
            .is_some_and(|link| link.accepted);
        if !far_accepted {
            return Ok(());
        }
        for (side, other) in [
            (&self.endpoint_id, endpoint_id),
            (endpoint_id, &self.endpoint_id),
        ] {
            let station = state.station_mut(side)?;
            if let Some(link) = station.links.get_mut(other) {
                link.established = true;
            }
            station.notify(AdapterEvent::ConnectionEstablished {
                endpoint_id: other.clone(),
            });
        }
        Ok(())
    }

    async fn reject_connection(&mut self, endpoint_id: &EndpointId) -> Result<()> {
        let mut state = self.airwaves.state.lock().await;
        state.unlink(&self.endpoint_id, endpoint_id);
        Ok(())
    }

    async fn request_connection(
        &mut self,
        local_name: &str,
        endpoint_id: &EndpointId,
    ) -> Result<()> {
        let mut state = self.airwaves.state.lock().await;
        let Some((far_name, _)) = state.station(endpoint_id)?.advertising.clone() else {
            return Err(TransportError::NotAdvertising(endpoint_id.clone()));
        };
        if state
            .station(&self.endpoint_id)?
            .links
            .contains_key(endpoint_id)
        {
            debug!("Already linked to {}", endpoint_id);
            return Ok(());
        }

        let me = state.station_mut(&self.endpoint_id)?;
        me.links.insert(endpoint_id.clone(), Link::default());
        me.notify(AdapterEvent::ConnectionRequested {
            endpoint_id: endpoint_id.clone(),
            name: far_name,
        });
        let far = state.station_mut(endpoint_id)?;
        far.links.insert(self.endpoint_id.clone(), Link::default());
        far.notify(AdapterEvent::ConnectionRequested {
            endpoint_id: self.endpoint_id.clone(),
            name: local_name.to_owned(),
        });
        Ok(())
    }

    async fn disconnect(&mut self, endpoint_id: &EndpointId) -> Result<()> {
        let mut state = self.airwaves.state.lock().await;
        state.unlink(&self.endpoint_id, endpoint_id);
        Ok(())
    }

    async fn disconnect_all(&mut self) -> Result<()> {
        let mut state = self.airwaves.state.lock().await;
        let linked: Vec<EndpointId> = state
            .station(&self.endpoint_id)?
            .links
            .keys()
            .cloned()
            .collect();
        for endpoint_id in linked {
            state.unlink(&self.endpoint_id, &endpoint_id);
        }
        Ok(())
    }

    async fn send(&mut self, endpoint_id: &EndpointId, bytes: &[u8]) -> Result<()> {
        let state = self.airwaves.state.lock().await;
        let established = state
            .station(&self.endpoint_id)?
            .links
            .get(endpoint_id)
            .is_some_and(|link| link.established);
        if !established {
            warn!("Dropping send to unconnected {}", endpoint_id);
            return Err(TransportError::NotConnected(endpoint_id.clone()));
        }
        state.station(endpoint_id)?.notify(AdapterEvent::BytesReceived {
            endpoint_id: self.endpoint_id.clone(),
            bytes: bytes.to_vec(),
        });
        Ok(())
    }
}
