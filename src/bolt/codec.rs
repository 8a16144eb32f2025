//! Chunked message framing for tokio-util.
//!
//! A message is written as one or more chunks, each prefixed with a 2-byte
//! big-endian length, followed by a zero-length chunk. Chunk boundaries carry
//! no meaning: a decoder must reassemble the same message however the bytes
//! were split. An empty message (a bare end marker) is a keep-alive and is
//! skipped.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::error::{BoltError, BoltResult};
use super::handshake::BoltVersion;
use super::message::{BoltRequest, BoltResponse};
use super::packstream::{decode, PackStreamEncoder, PackStreamStructure, PackStreamValue};

/// Largest chunk the 2-byte header can describe.
pub const MAX_CHUNK_SIZE: usize = u16::MAX as usize;

/// Chunk size used when writing.
pub const DEFAULT_CHUNK_SIZE: usize = 16 * 1024;

/// Default cap on a reassembled message.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

pub const END_MARKER: [u8; 2] = [0x00, 0x00];

/// Splits outgoing payloads into chunks and reassembles incoming ones.
#[derive(Debug)]
pub struct ChunkCodec {
    chunk_size: usize,
    max_message_size: usize,
    /// Payload of the message currently being reassembled.
    message: BytesMut,
}

impl ChunkCodec {
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_CHUNK_SIZE, DEFAULT_MAX_MESSAGE_SIZE)
    }

    /// `chunk_size` is clamped to `1..=MAX_CHUNK_SIZE`.
    pub fn with_limits(chunk_size: usize, max_message_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.clamp(1, MAX_CHUNK_SIZE),
            max_message_size,
            message: BytesMut::new(),
        }
    }

    /// Append `payload` to `dst` as a complete chunked message.
    pub fn write_message(&self, payload: &[u8], dst: &mut BytesMut) {
        dst.reserve(payload.len() + 2 * (payload.len() / self.chunk_size + 2));
        for chunk in payload.chunks(self.chunk_size) {
            dst.put_u16(chunk.len() as u16);
            dst.put_slice(chunk);
        }
        dst.put_slice(&END_MARKER);
    }
}

impl Default for ChunkCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for ChunkCodec {
    type Item = BytesMut;
    type Error = BoltError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            if src.len() < 2 {
                return Ok(None);
            }
            let size = u16::from_be_bytes([src[0], src[1]]) as usize;

            if size == 0 {
                src.advance(2);
                if self.message.is_empty() {
                    continue;
                }
                return Ok(Some(self.message.split()));
            }

            if src.len() < 2 + size {
                src.reserve(2 + size - src.len());
                return Ok(None);
            }
            let total = self.message.len() + size;
            if total > self.max_message_size {
                return Err(BoltError::MessageTooLarge {
                    size: total,
                    max: self.max_message_size,
                });
            }
            src.advance(2);
            self.message.extend_from_slice(&src.split_to(size));
        }
    }
}

impl Encoder<&[u8]> for ChunkCodec {
    type Error = BoltError;

    fn encode(&mut self, payload: &[u8], dst: &mut BytesMut) -> Result<(), Self::Error> {
        self.write_message(payload, dst);
        Ok(())
    }
}

fn into_structure(payload: &[u8]) -> BoltResult<PackStreamStructure> {
    match decode(payload)? {
        PackStreamValue::Structure(s) => Ok(s),
        other => Err(BoltError::Decode(format!(
            "Expected a message structure, got {}",
            other.type_name()
        ))),
    }
}

fn serialize(structure: PackStreamStructure) -> BoltResult<BytesMut> {
    let mut encoder = PackStreamEncoder::new();
    encoder.encode(&PackStreamValue::Structure(structure))?;
    Ok(encoder.into_bytes())
}

/// Client side: writes requests for the negotiated version, reads responses.
#[derive(Debug)]
pub struct ClientCodec {
    chunks: ChunkCodec,
    version: BoltVersion,
}

impl ClientCodec {
    pub fn new(version: BoltVersion) -> Self {
        Self::with_chunks(version, ChunkCodec::new())
    }

    pub fn with_chunks(version: BoltVersion, chunks: ChunkCodec) -> Self {
        Self { chunks, version }
    }

    pub fn version(&self) -> BoltVersion {
        self.version
    }
}

impl Decoder for ClientCodec {
    type Item = BoltResponse;
    type Error = BoltError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.chunks.decode(src)? {
            Some(payload) => BoltResponse::from_structure(into_structure(&payload)?).map(Some),
            None => Ok(None),
        }
    }
}

impl Encoder<&BoltRequest> for ClientCodec {
    type Error = BoltError;

    /// The whole message is serialized before anything is appended to `dst`,
    /// so a failed encode leaves `dst` untouched.
    fn encode(&mut self, request: &BoltRequest, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let payload = serialize(request.to_structure(self.version)?)?;
        self.chunks.write_message(&payload, dst);
        Ok(())
    }
}

/// Server side of the same framing, for loopback responders.
#[derive(Debug, Default)]
pub struct ServerCodec {
    chunks: ChunkCodec,
}

impl ServerCodec {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for ServerCodec {
    type Item = BoltRequest;
    type Error = BoltError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.chunks.decode(src)? {
            Some(payload) => BoltRequest::from_structure(&into_structure(&payload)?).map(Some),
            None => Ok(None),
        }
    }
}

impl Encoder<BoltResponse> for ServerCodec {
    type Error = BoltError;

    fn encode(&mut self, response: BoltResponse, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let payload = serialize(response.to_structure())?;
        self.chunks.write_message(&payload, dst);
        Ok(())
    }
}

/// Encode one request as a complete chunked frame.
pub fn encode_request(request: &BoltRequest, version: BoltVersion) -> BoltResult<BytesMut> {
    let mut dst = BytesMut::new();
    ClientCodec::new(version).encode(request, &mut dst)?;
    Ok(dst)
}

/// Decode one response from a complete chunked frame.
///
/// Incomplete input or bytes after the end marker are decode errors.
pub fn decode_response(frame: &[u8]) -> BoltResult<BoltResponse> {
    let mut src = BytesMut::from(frame);
    let response = ClientCodec::new(BoltVersion::V4_4)
        .decode(&mut src)?
        .ok_or_else(|| BoltError::Decode("Incomplete message frame".to_string()))?;
    if !src.is_empty() {
        return Err(BoltError::Decode(format!(
            "{} bytes after end of message",
            src.len()
        )));
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bolt::message::{RecordMessage, RunMessage, SuccessMessage};
    use crate::bolt::packstream::PackStreamError;

    fn record_frame() -> BytesMut {
        let mut dst = BytesMut::new();
        let values = (0..40).map(|i| PackStreamValue::from(format!("value-{}", i))).collect();
        ServerCodec::new()
            .encode(BoltResponse::Record(RecordMessage::new(values)), &mut dst)
            .unwrap();
        dst
    }

    #[test]
    fn test_small_message_is_one_chunk() {
        let frame = encode_request(&BoltRequest::Reset, BoltVersion::V3).unwrap();
        assert_eq!(&frame[..], &[0x00, 0x02, 0xB0, 0x0F, 0x00, 0x00]);
    }

    #[test]
    fn test_large_payload_spans_several_chunks() {
        let mut codec = ChunkCodec::with_limits(8, DEFAULT_MAX_MESSAGE_SIZE);
        let payload: Vec<u8> = (0..20).collect();
        let mut dst = BytesMut::new();
        codec.encode(&payload[..], &mut dst).unwrap();
        // 8 + 8 + 4 bytes, three headers and an end marker
        assert_eq!(dst.len(), 20 + 3 * 2 + 2);
        assert_eq!(&dst[..2], &[0, 8]);

        let decoded = codec.decode(&mut dst).unwrap().unwrap();
        assert_eq!(&decoded[..], &payload[..]);
        assert!(dst.is_empty());
    }

    #[test]
    fn test_reassembles_at_every_split_point() {
        let frame = record_frame();
        let expected = decode_response(&frame).unwrap();
        for split in 0..=frame.len() {
            let mut codec = ClientCodec::new(BoltVersion::V4_4);
            let mut src = BytesMut::from(&frame[..split]);
            let early = codec.decode(&mut src).unwrap();
            src.extend_from_slice(&frame[split..]);
            let message = match early {
                Some(message) => message,
                None => codec.decode(&mut src).unwrap().expect("complete after second feed"),
            };
            assert_eq!(message, expected, "split at {}", split);
        }
    }

    #[test]
    fn test_rechunking_does_not_change_the_message() {
        let payload = serialize(BoltResponse::Success(SuccessMessage::new().with("db", "neo4j")).to_structure())
            .unwrap();
        let mut tiny = BytesMut::new();
        ChunkCodec::with_limits(1, 1024).write_message(&payload, &mut tiny);
        assert_eq!(tiny.len(), payload.len() * 3 + 2);
        let mut whole = BytesMut::new();
        ChunkCodec::new().write_message(&payload, &mut whole);
        assert_eq!(decode_response(&tiny).unwrap(), decode_response(&whole).unwrap());
    }

    #[test]
    fn test_keep_alive_messages_are_skipped() {
        let mut src = BytesMut::from(&END_MARKER[..]);
        src.extend_from_slice(&END_MARKER);
        src.extend_from_slice(&encode_request(&BoltRequest::Reset, BoltVersion::V3).unwrap());
        let mut codec = ServerCodec::new();
        assert_eq!(codec.decode(&mut src).unwrap(), Some(BoltRequest::Reset));
        assert_eq!(codec.decode(&mut src).unwrap(), None);
    }

    #[test]
    fn test_oversized_message_is_rejected() {
        let mut codec = ChunkCodec::with_limits(DEFAULT_CHUNK_SIZE, 10);
        let mut dst = BytesMut::new();
        ChunkCodec::new().write_message(&[0u8; 32], &mut dst);
        assert!(matches!(
            codec.decode(&mut dst),
            Err(BoltError::MessageTooLarge { size: 32, max: 10 })
        ));
    }

    #[test]
    fn test_failed_encode_leaves_buffer_untouched() {
        let mut dst = BytesMut::from(&b"queued"[..]);
        let err = ClientCodec::new(BoltVersion::V2)
            .encode(&BoltRequest::Commit, &mut dst)
            .unwrap_err();
        assert!(matches!(err, BoltError::Encode(_)));
        assert_eq!(&dst[..], b"queued");
    }

    #[test]
    fn test_frame_helpers_reject_bad_frames() {
        let run = encode_request(&BoltRequest::Run(RunMessage::new("RETURN 1")), BoltVersion::V4_0).unwrap();
        // A request is not a response.
        assert!(matches!(decode_response(&run), Err(BoltError::Decode(_))));

        let mut truncated = record_frame();
        truncated.truncate(truncated.len() - 2);
        assert!(matches!(decode_response(&truncated), Err(BoltError::Decode(_))));

        let mut trailing = record_frame();
        trailing.extend_from_slice(&[0x00]);
        assert!(matches!(decode_response(&trailing), Err(BoltError::Decode(_))));

        // A bare value instead of a structure.
        let mut scalar = BytesMut::new();
        ChunkCodec::new().write_message(&[0x01], &mut scalar);
        assert!(matches!(decode_response(&scalar), Err(BoltError::Decode(_))));
    }

    #[test]
    fn test_deeply_nested_record_is_a_decode_error() {
        // RECORD [[[[...]]]] a million levels down, far below the size limit
        let mut payload = vec![0xB1, 0x71, 0x91];
        payload.extend(std::iter::repeat(0x91).take(1_000_000));
        payload.push(0xC0);
        let mut frame = BytesMut::new();
        ChunkCodec::new().write_message(&payload, &mut frame);

        let err = decode_response(&frame).unwrap_err();
        assert!(matches!(err, BoltError::PackStream(PackStreamError::TooDeep(_))));
        assert!(err.is_fatal());
    }
}
