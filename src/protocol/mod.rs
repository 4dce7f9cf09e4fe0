//! Coordinator Session Protocol
//!
//! Wire format for the single duplex stream between a node and its
//! coordinator. Every message is an [`Envelope`]: a [`ServiceTag`] plus a
//! CBOR payload whose type depends on the tag and direction.
//!
//! | Tag          | Node → coordinator   | Coordinator → node          |
//! |--------------|----------------------|-----------------------------|
//! | `JOIN`       | [`JoinRequest`]      | [`JoinResponse`]            |
//! | `HEARTBEAT`  | [`HeartbeatRequest`] | acknowledgement (ignored)   |
//! | `SPEED_TEST` | [`TestResult`]       | command, no payload         |
//! | `PORT_CHECK` | [`TestResult`]       | command, no payload         |
//!
//! There are no sequence numbers or acknowledgements; the stream is
//! free-running request/response.

mod codec;
mod envelope;
mod error;
mod messages;

pub use codec::{EnvelopeCodec, MAX_FRAME_LENGTH};
pub use envelope::{Envelope, ServiceTag};
pub use error::ProtocolError;
pub use messages::{
    CertPair, HeartbeatRequest, IpInfo, JoinRequest, JoinResponse, Stats, TestResult,
};
