use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{ProtocolError, ProtocolResult};
use crate::message::{Decoded, Message, MAX_FRAME_SIZE};

const HEADER_SIZE: usize = 4;
const PREALLOC_LIMIT: usize = 64 * 1024;

/// Codec for encoding/decoding Trail peer messages.
pub struct TrailCodec;

impl TrailCodec {
    /// Encode a message with framing: [4 bytes len, big-endian][JSON envelope]
    pub fn encode(msg: &Message) -> ProtocolResult<Bytes> {
        let payload = Self::encode_payload(msg)?;
        if payload.len() > MAX_FRAME_SIZE {
            return Err(ProtocolError::FrameTooLarge {
                size: payload.len(),
                max: MAX_FRAME_SIZE,
            });
        }
        let mut buf = BytesMut::with_capacity(HEADER_SIZE + payload.len());
        buf.put_u32(payload.len() as u32);
        buf.put_slice(&payload);
        Ok(buf.freeze())
    }

    /// Decode a framed message. Returns (decoded, bytes_consumed).
    pub fn decode(data: &[u8]) -> ProtocolResult<(Decoded, usize)> {
        if data.len() < HEADER_SIZE {
            return Err(ProtocolError::FramingError("too short".into()));
        }
        let len = frame_len([data[0], data[1], data[2], data[3]])?;
        let total = HEADER_SIZE + len;
        if data.len() < total {
            return Err(ProtocolError::FramingError(format!(
                "incomplete: have {}, need {}",
                data.len(),
                total
            )));
        }
        let decoded = Self::decode_payload(&data[HEADER_SIZE..total])?;
        Ok((decoded, total))
    }

    /// Encode payload only (no framing).
    pub fn encode_payload(msg: &Message) -> ProtocolResult<Vec<u8>> {
        serde_json::to_vec(msg).map_err(|e| ProtocolError::Serialization(e.to_string()))
    }

    /// Decode payload only (no framing).
    pub fn decode_payload(data: &[u8]) -> ProtocolResult<Decoded> {
        Decoded::from_json(data)
    }

    /// Read one frame from a stream.
    ///
    /// Returns `Ok(None)` when the stream ends before a new frame starts.
    /// A stream that ends inside a frame, header included, is an I/O error.
    pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> ProtocolResult<Option<Decoded>> {
        let mut header = [0u8; HEADER_SIZE];
        let mut filled = 0;
        while filled < HEADER_SIZE {
            let n = reader.read(&mut header[filled..]).await?;
            if n == 0 {
                if filled == 0 {
                    return Ok(None);
                }
                return Err(truncated("frame header").into());
            }
            filled += n;
        }
        let len = frame_len(header)?;

        // Grow with the data actually received rather than trusting the header.
        let mut payload = Vec::with_capacity(len.min(PREALLOC_LIMIT));
        (&mut *reader).take(len as u64).read_to_end(&mut payload).await?;
        if payload.len() < len {
            return Err(truncated("frame payload").into());
        }
        Self::decode_payload(&payload).map(Some)
    }

    /// Encode and write one frame, flushing the stream.
    pub async fn write_message<W: AsyncWrite + Unpin>(writer: &mut W, msg: &Message) -> ProtocolResult<()> {
        let frame = Self::encode(msg)?;
        writer.write_all(&frame).await?;
        writer.flush().await?;
        Ok(())
    }
}

fn truncated(part: &str) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::UnexpectedEof, format!("stream ended inside {part}"))
}

fn frame_len(header: [u8; HEADER_SIZE]) -> ProtocolResult<usize> {
    let len = u32::from_be_bytes(header) as usize;
    if len == 0 {
        return Err(ProtocolError::FramingError("zero-length frame".into()));
    }
    if len > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge { size: len, max: MAX_FRAME_SIZE });
    }
    Ok(len)
}
