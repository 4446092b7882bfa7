use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Transport-assigned endpoint id. Opaque to the session.
#[derive(Serialize, Deserialize, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Clone)]
#[serde(transparent)]
pub struct EndpointId(pub String);

impl EndpointId {
    /// Fresh id for adapters that have to mint their own.
    pub fn random() -> Self {
        EndpointId(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EndpointId {
    fn from(value: &str) -> Self {
        EndpointId(value.to_owned())
    }
}

impl From<String> for EndpointId {
    fn from(value: String) -> Self {
        EndpointId(value)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PeerIdentity {
    pub endpoint_id: EndpointId,
    pub name: String,
}
