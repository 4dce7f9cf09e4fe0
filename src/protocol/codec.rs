//! Envelope codec: frames the session byte stream into envelopes.
//!
//! Each envelope travels as a 4-byte big-endian length followed by its CBOR
//! encoding. A frame whose body is not a valid envelope, or whose length
//! prefix exceeds [`MAX_FRAME_LENGTH`], is logged and surfaced as the empty
//! envelope; oversize bodies are skipped without buffering and the stream
//! stays usable.

use std::sync::Arc;

use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};
use tracing::warn;

use super::{Envelope, ProtocolError};
use crate::bandwidth::TrafficMeter;

/// Maximum envelope body size (1 MiB).
pub const MAX_FRAME_LENGTH: usize = 1024 * 1024;

/// Length prefix size.
const LENGTH_PREFIX_SIZE: usize = 4;

/// A tokio codec for length-delimited CBOR envelopes.
///
/// Framing on the write side goes through [`LengthDelimitedCodec`]; the read
/// side parses the prefix itself so oversize frames can be skipped.
#[derive(Debug)]
pub struct EnvelopeCodec {
    frames: LengthDelimitedCodec,
    meter: Option<Arc<TrafficMeter>>,
    /// Bytes of an oversize frame body still to be skipped.
    discarding: usize,
}

impl EnvelopeCodec {
    pub fn new() -> Self {
        Self {
            frames: LengthDelimitedCodec::builder()
                .length_field_length(LENGTH_PREFIX_SIZE)
                .max_frame_length(MAX_FRAME_LENGTH)
                .new_codec(),
            meter: None,
            discarding: 0,
        }
    }

    fn record_in(&self, bytes: usize) {
        if let Some(meter) = &self.meter {
            meter.record_in(bytes as u64);
        }
    }

    /// Drop buffered bytes of an oversize frame. Returns true once the
    /// whole body has been skipped.
    fn skip_oversize(&mut self, src: &mut BytesMut) -> bool {
        let n = self.discarding.min(src.len());
        src.advance(n);
        self.record_in(n);
        self.discarding -= n;
        self.discarding == 0
    }

    /// Account every frame sent and received on `meter`.
    pub fn with_meter(mut self, meter: Arc<TrafficMeter>) -> Self {
        self.meter = Some(meter);
        self
    }
}

impl Default for EnvelopeCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for EnvelopeCodec {
    type Item = Envelope;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if self.discarding > 0 {
            return Ok(self.skip_oversize(src).then(Envelope::default));
        }

        if src.len() < LENGTH_PREFIX_SIZE {
            return Ok(None);
        }
        let len = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;
        if len > MAX_FRAME_LENGTH {
            warn!(bytes = len, max = MAX_FRAME_LENGTH, "codec: skipping oversize envelope");
            src.advance(LENGTH_PREFIX_SIZE);
            self.record_in(LENGTH_PREFIX_SIZE);
            self.discarding = len;
            return Ok(self.skip_oversize(src).then(Envelope::default));
        }
        if src.len() < LENGTH_PREFIX_SIZE + len {
            src.reserve(LENGTH_PREFIX_SIZE + len - src.len());
            return Ok(None);
        }

        src.advance(LENGTH_PREFIX_SIZE);
        let frame = src.split_to(len);
        self.record_in(frame.len() + LENGTH_PREFIX_SIZE);

        match Envelope::decode(&frame) {
            Ok(envelope) => Ok(Some(envelope)),
            Err(e) => {
                warn!(bytes = frame.len(), error = %e, "codec: dropping malformed envelope");
                Ok(Some(Envelope::default()))
            }
        }
    }
}

impl Encoder<Envelope> for EnvelopeCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Envelope, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let body = item.encode()?;
        if body.len() > MAX_FRAME_LENGTH {
            return Err(ProtocolError::FrameTooLong {
                max: MAX_FRAME_LENGTH,
                got: body.len(),
            });
        }

        let len = body.len();
        self.frames.encode(Bytes::from(body), dst)?;

        if let Some(meter) = &self.meter {
            meter.record_out((len + LENGTH_PREFIX_SIZE) as u64);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ServiceTag;
    use bytes::BufMut;

    fn encode_one(codec: &mut EnvelopeCodec, envelope: Envelope) -> BytesMut {
        let mut buf = BytesMut::new();
        codec.encode(envelope, &mut buf).unwrap();
        buf
    }

    #[test]
    fn test_decode_needs_full_frame() {
        let mut codec = EnvelopeCodec::new();
        let full = encode_one(&mut codec, Envelope::command(ServiceTag::SPEED_TEST));

        let mut partial = BytesMut::from(&full[..full.len() - 1]);
        assert!(codec.decode(&mut partial).unwrap().is_none());

        partial.put_u8(full[full.len() - 1]);
        let decoded = codec.decode(&mut partial).unwrap().unwrap();
        assert_eq!(decoded.service, ServiceTag::SPEED_TEST);
        assert!(partial.is_empty());
    }

    #[test]
    fn test_decode_back_to_back_frames() {
        let mut codec = EnvelopeCodec::new();
        let mut buf = encode_one(&mut codec, Envelope::command(ServiceTag::SPEED_TEST));
        buf.extend_from_slice(&encode_one(
            &mut codec,
            Envelope::command(ServiceTag::PORT_CHECK),
        ));

        let first = codec.decode(&mut buf).unwrap().unwrap();
        let second = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(first.service, ServiceTag::SPEED_TEST);
        assert_eq!(second.service, ServiceTag::PORT_CHECK);
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_malformed_body_yields_empty_envelope() {
        let mut codec = EnvelopeCodec::new();
        let mut buf = BytesMut::new();
        buf.put_u32(3);
        buf.put_slice(&[0xff, 0xff, 0xff]);

        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert!(decoded.is_empty());

        // The stream stays usable after the bad frame.
        buf.extend_from_slice(&encode_one(
            &mut codec,
            Envelope::command(ServiceTag::HEARTBEAT),
        ));
        let next = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(next.service, ServiceTag::HEARTBEAT);
    }

    #[test]
    fn test_oversize_frame_is_skipped() {
        let mut codec = EnvelopeCodec::new();
        let oversize = MAX_FRAME_LENGTH + 10;
        let mut buf = BytesMut::new();
        buf.put_u32(oversize as u32);
        buf.put_slice(&vec![0xAA; MAX_FRAME_LENGTH]);

        // Body only partly buffered: nothing to yield yet.
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert!(buf.is_empty());

        buf.put_slice(&[0xAA; 10]);
        buf.extend_from_slice(&encode_one(
            &mut codec,
            Envelope::command(ServiceTag::PORT_CHECK),
        ));

        let skipped = codec.decode(&mut buf).unwrap().unwrap();
        assert!(skipped.is_empty());
        let next = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(next.service, ServiceTag::PORT_CHECK);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_meter_counts_frames() {
        let meter = Arc::new(TrafficMeter::new());
        let mut codec = EnvelopeCodec::new().with_meter(meter.clone());

        let mut buf = encode_one(&mut codec, Envelope::command(ServiceTag::HEARTBEAT));
        let sent = buf.len() as u64;
        assert_eq!(meter.total_out(), sent);

        codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(meter.total_in(), sent);
    }
}
