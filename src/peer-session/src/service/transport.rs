use async_trait::async_trait;
use common::model::messages::EndpointId;

use crate::{error::TransportError, model::internal::AdapterCommand};

type Result<T> = std::result::Result<T, TransportError>;

/// Discovery/transport collaborator driven by the session task.
///
/// Implementations report back through the
/// [`EventSink`](crate::model::internal::EventSink) they were built with.
/// No method may wait for a remote peer: anything slow is spawned and its
/// outcome delivered later as an event.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Id other endpoints know us by.
    fn local_endpoint(&self) -> EndpointId;

    async fn advertise(&mut self, local_name: &str, service_id: &str) -> Result<()>;

    async fn discover(&mut self, service_id: &str) -> Result<()>;

    async fn stop_advertising(&mut self) -> Result<()>;

    async fn stop_discovery(&mut self) -> Result<()>;

    async fn accept_connection(&mut self, endpoint_id: &EndpointId) -> Result<()>;

    async fn reject_connection(&mut self, endpoint_id: &EndpointId) -> Result<()>;

    async fn request_connection(&mut self, local_name: &str, endpoint_id: &EndpointId)
        -> Result<()>;

    async fn disconnect(&mut self, endpoint_id: &EndpointId) -> Result<()>;

    async fn disconnect_all(&mut self) -> Result<()>;

    async fn send(&mut self, endpoint_id: &EndpointId, bytes: &[u8]) -> Result<()>;

    /// Route a command to the matching method.
    async fn execute(&mut self, command: &AdapterCommand) -> Result<()> {
        match command {
            AdapterCommand::Advertise {
                local_name,
                service_id,
            } => self.advertise(local_name, service_id).await,
            AdapterCommand::Discover { service_id } => self.discover(service_id).await,
            AdapterCommand::StopAdvertising => self.stop_advertising().await,
            AdapterCommand::StopDiscovery => self.stop_discovery().await,
            AdapterCommand::AcceptConnection { endpoint_id } => {
                self.accept_connection(endpoint_id).await
            }
            AdapterCommand::RejectConnection { endpoint_id } => {
                self.reject_connection(endpoint_id).await
            }
            AdapterCommand::RequestConnection {
                local_name,
                endpoint_id,
            } => self.request_connection(local_name, endpoint_id).await,
            AdapterCommand::Disconnect { endpoint_id } => self.disconnect(endpoint_id).await,
            AdapterCommand::DisconnectAll => self.disconnect_all().await,
            AdapterCommand::Send { endpoint_id, bytes } => self.send(endpoint_id, bytes).await,
        }
    }
}
