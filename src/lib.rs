//! nodelink: coordinator session client for storage nodes.
//!
//! A node joins its coordinator over a single QUIC stream, authenticates
//! with a signed join request, and then keeps that stream alive for
//! periodic heartbeat telemetry and coordinator-triggered diagnostics,
//! rejoining whenever a write fails.

pub mod bandwidth;
pub mod config;
pub mod diagnostics;
pub mod identity;
pub mod node;
pub mod protocol;
pub mod session;
pub mod transport;

// Re-export identity types
pub use identity::{
    decode_npub, decode_nsec, decode_secret, encode_npub, encode_nsec, verify_signature,
    Identity, IdentityError,
};

// Re-export config types
pub use config::{
    Config, ConfigError, CoordinatorConfig, DiagnosticsConfig, IdentityConfig, NodeConfig,
};

// Re-export bandwidth types
pub use bandwidth::{BandwidthCounter, BandwidthTotals, TrafficMeter};

// Re-export protocol types
pub use protocol::{
    CertPair, Envelope, EnvelopeCodec, HeartbeatRequest, IpInfo, JoinRequest, JoinResponse,
    ProtocolError, ServiceTag, Stats, TestResult,
};

// Re-export transport types
pub use transport::{Connector, QuicConnector, Session, TransportError};

// Re-export session types
pub use session::{CertStore, JoinError, JoinHandshake, SendOutcome, SessionError, SessionManager};

// Re-export diagnostics types
pub use diagnostics::{
    AddressProbe, Diagnostics, HttpAddressProbe, HttpSpeedTester, IpVersion, SpeedReport,
    SpeedTester,
};

// Re-export node types
pub use node::{Command, CommandDispatcher, HeartbeatEmitter, Node, NodeError, NodeState};
