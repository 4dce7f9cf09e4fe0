//! Service tags and the generic envelope.

use ciborium::Value;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ProtocolError;

/// Discriminator selecting an envelope's meaning.
///
/// Carried as a bare integer so that tags introduced by newer coordinators
/// still decode; the receiver decides what to do with tags it does not know.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceTag(u16);

impl ServiceTag {
    /// Placeholder for "nothing received".
    pub const NONE: ServiceTag = ServiceTag(0);
    /// Join request (node → coordinator) and join response.
    pub const JOIN: ServiceTag = ServiceTag(1);
    /// Heartbeat telemetry and its acknowledgement.
    pub const HEARTBEAT: ServiceTag = ServiceTag(2);
    /// Full node test: port reachability plus speed test.
    pub const SPEED_TEST: ServiceTag = ServiceTag(3);
    /// Port reachability only.
    pub const PORT_CHECK: ServiceTag = ServiceTag(4);

    pub fn new(value: u16) -> Self {
        Self(value)
    }

    pub fn as_u16(&self) -> u16 {
        self.0
    }

    /// Name of a known tag.
    pub fn name(&self) -> Option<&'static str> {
        match *self {
            ServiceTag::NONE => Some("none"),
            ServiceTag::JOIN => Some("join"),
            ServiceTag::HEARTBEAT => Some("heartbeat"),
            ServiceTag::SPEED_TEST => Some("speed_test"),
            ServiceTag::PORT_CHECK => Some("port_check"),
            _ => None,
        }
    }
}

impl fmt::Display for ServiceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{}", name),
            None => write!(f, "service:{}", self.0),
        }
    }
}

/// The unit exchanged on the session stream: a service tag plus an opaque,
/// tag-typed payload.
///
/// The payload is kept as a self-describing CBOR value so the envelope can
/// be decoded without knowing the tag; typed access goes through
/// [`Envelope::payload`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub service: ServiceTag,
    #[serde(default = "null_value")]
    pub data: Value,
}

fn null_value() -> Value {
    Value::Null
}

impl Default for Envelope {
    fn default() -> Self {
        Self {
            service: ServiceTag::NONE,
            data: Value::Null,
        }
    }
}

impl Envelope {
    /// Build an envelope carrying `payload`.
    pub fn new<T: Serialize>(service: ServiceTag, payload: &T) -> Result<Self, ProtocolError> {
        let data = Value::serialized(payload).map_err(|e| ProtocolError::Encode(e.to_string()))?;
        Ok(Self { service, data })
    }

    /// Build a payload-less envelope (a bare command).
    pub fn command(service: ServiceTag) -> Self {
        Self {
            service,
            data: Value::Null,
        }
    }

    /// True for the empty envelope returned when nothing was received.
    pub fn is_empty(&self) -> bool {
        self.service == ServiceTag::NONE
    }

    /// Decode the payload as `T`.
    pub fn payload<T: DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        self.data
            .deserialized()
            .map_err(|e| ProtocolError::Decode(e.to_string()))
    }

    /// Decode the payload as `T`, checking the tag first.
    pub fn expect_payload<T: DeserializeOwned>(
        &self,
        service: ServiceTag,
    ) -> Result<T, ProtocolError> {
        if self.service != service {
            return Err(ProtocolError::UnexpectedService {
                expected: service.to_string(),
                got: self.service.to_string(),
            });
        }
        self.payload()
    }

    /// Serialize to CBOR bytes.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let mut buf = Vec::new();
        ciborium::ser::into_writer(self, &mut buf)
            .map_err(|e| ProtocolError::Encode(e.to_string()))?;
        Ok(buf)
    }

    /// Parse CBOR bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        ciborium::de::from_reader(bytes).map_err(|e| ProtocolError::Decode(e.to_string()))
    }
}
