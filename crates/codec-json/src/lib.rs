//! Reference wire codec framing packets as `u32 length ‖ JSON`.
//!
//! Production deployments talk hessian2 to real Dubbo providers; this codec
//! keeps the exact same packet semantics over a trivially inspectable byte
//! layout, which makes it the codec of choice for tests, examples, and
//! in-house peers.

use bytes::{Buf, BufMut, BytesMut};
use dubbo_codec::{Codec, CodecError, CodecFactory, Packet, Request, Response};

/// Maximum frame size (10MB by default).
pub const MAX_FRAME_SIZE: usize = 10 * 1024 * 1024;

/// Frame header size: 4 bytes big-endian payload length.
pub const FRAME_HEADER_SIZE: usize = 4;

/// Codec framing one JSON-serialized [`Packet`] per length-prefixed frame.
pub struct JsonCodec {
    max_frame_size: usize,
}

impl JsonCodec {
    /// Create a new codec with the default frame size cap.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_frame_size: MAX_FRAME_SIZE,
        }
    }

    /// Create a codec with a custom max frame size.
    #[must_use]
    pub const fn with_max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self
    }

    fn encode_packet(&self, packet: &Packet, dst: &mut BytesMut) -> Result<(), CodecError> {
        let payload =
            serde_json::to_vec(packet).map_err(|e| CodecError::Serialization(e.to_string()))?;

        if payload.len() > self.max_frame_size {
            return Err(CodecError::FrameTooLarge {
                size: payload.len(),
                max: self.max_frame_size,
            });
        }

        dst.reserve(FRAME_HEADER_SIZE + payload.len());
        #[allow(clippy::cast_possible_truncation)]
        dst.put_u32(payload.len() as u32);
        dst.put_slice(&payload);
        Ok(())
    }
}

impl Default for JsonCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Codec for JsonCodec {
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Packet>, CodecError> {
        if src.len() < FRAME_HEADER_SIZE {
            return Ok(None);
        }

        // Parse header without consuming
        let mut header = &src[..FRAME_HEADER_SIZE];
        let payload_len = header.get_u32() as usize;

        if payload_len > self.max_frame_size {
            return Err(CodecError::FrameTooLarge {
                size: payload_len,
                max: self.max_frame_size,
            });
        }

        let frame_len = FRAME_HEADER_SIZE + payload_len;
        if src.len() < frame_len {
            // Reserve space for the full frame
            src.reserve(frame_len - src.len());
            return Ok(None);
        }

        src.advance(FRAME_HEADER_SIZE);
        let payload = src.split_to(payload_len);

        let packet: Packet = serde_json::from_slice(&payload)
            .map_err(|e| CodecError::Deserialization(e.to_string()))?;
        Ok(Some(packet))
    }

    fn encode_request(&mut self, request: &Request, dst: &mut BytesMut) -> Result<(), CodecError> {
        self.encode_packet(&Packet::Request(request.clone()), dst)
    }

    fn encode_response(
        &mut self,
        response: &Response,
        dst: &mut BytesMut,
    ) -> Result<(), CodecError> {
        self.encode_packet(&Packet::Response(response.clone()), dst)
    }
}

/// Factory producing [`JsonCodec`] instances.
#[derive(Debug, Clone, Default)]
pub struct JsonCodecFactory;

impl CodecFactory for JsonCodecFactory {
    type Codec = JsonCodec;

    fn create(&self, _serialization: &str) -> Self::Codec {
        JsonCodec::new()
    }
}
