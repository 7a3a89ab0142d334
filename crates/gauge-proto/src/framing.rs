//! Length-prefixed framing over async byte streams.
//!
//! Every message on the wire is a uvarint byte length followed by that many
//! bytes of encoded envelope. Reading distinguishes a clean close (EOF on a
//! frame boundary, `Ok(None)`) from a truncated frame (an error), and frame
//! decoding is deliberately separate from frame reading: a service that
//! fails to decode a frame still owns a healthy stream and can answer with
//! an error response.

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::wire::{WireDecode, WireEncode, put_uvarint};

/// Upper bound on a single frame. Anything larger is a corrupt stream, not
/// a plausible message.
pub const MAX_FRAME_LEN: u64 = 64 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("frame of {0} bytes exceeds the {MAX_FRAME_LEN} byte limit")]
    Oversized(u64),
    #[error("stream closed mid-frame")]
    TruncatedFrame,
}

/// Write one frame: uvarint length, then the payload bytes.
pub async fn write_frame<W>(writer: &mut W, bytes: &[u8]) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    let mut prefix = Vec::with_capacity(10);
    put_uvarint(&mut prefix, bytes.len() as u64);
    writer.write_all(&prefix).await?;
    writer.write_all(bytes).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame. `Ok(None)` means the peer closed the stream on a frame
/// boundary; EOF anywhere else is [`FrameError::TruncatedFrame`].
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Vec<u8>>, FrameError>
where
    R: AsyncRead + Unpin,
{
    let len = match read_uvarint(reader).await? {
        Some(len) => len,
        None => return Ok(None),
    };
    if len > MAX_FRAME_LEN {
        return Err(FrameError::Oversized(len));
    }
    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            FrameError::TruncatedFrame
        } else {
            FrameError::Io(e)
        }
    })?;
    Ok(Some(buf))
}

/// Encode a message and write it as one frame.
pub async fn write_message<W, M>(writer: &mut W, message: &M) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
    M: WireEncode,
{
    write_frame(writer, &message.encode_to_vec()).await
}

/// Read one frame and decode it. Decode failures surface through the inner
/// `Result` so callers can keep the connection and answer with an error.
pub async fn read_message<R, M>(
    reader: &mut R,
) -> Result<Option<Result<M, crate::wire::WireError>>, FrameError>
where
    R: AsyncRead + Unpin,
    M: WireDecode,
{
    match read_frame(reader).await? {
        Some(bytes) => Ok(Some(M::decode_from_slice(&bytes))),
        None => Ok(None),
    }
}

async fn read_uvarint<R>(reader: &mut R) -> Result<Option<u64>, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut value = 0u64;
    let mut shift = 0u32;
    loop {
        let byte = match reader.read_u8().await {
            Ok(byte) => byte,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                if shift == 0 {
                    return Ok(None);
                }
                return Err(FrameError::TruncatedFrame);
            }
            Err(e) => return Err(FrameError::Io(e)),
        };
        value |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Ok(Some(value));
        }
        shift += 7;
        if shift > 63 {
            return Err(FrameError::Oversized(u64::MAX));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ApiMessage, ApiPayload};

    #[tokio::test]
    async fn frames_round_trip_over_a_duplex_stream() {
        let (mut client, mut server) = tokio::io::duplex(1024);

        let request = ApiMessage {
            message_id: 42,
            payload: ApiPayload::GetAllStepsRequest,
        };
        write_message(&mut client, &request).await.unwrap();

        let received: ApiMessage = read_message(&mut server).await.unwrap().unwrap().unwrap();
        assert_eq!(received, request);
    }

    #[tokio::test]
    async fn consecutive_frames_stay_separate() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        for id in 0..3 {
            let message = ApiMessage {
                message_id: id,
                payload: ApiPayload::GetProjectRootRequest,
            };
            write_message(&mut client, &message).await.unwrap();
        }
        drop(client);

        for id in 0..3 {
            let message: ApiMessage = read_message(&mut server).await.unwrap().unwrap().unwrap();
            assert_eq!(message.message_id, id);
        }
        assert!(read_message::<_, ApiMessage>(&mut server).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn eof_mid_frame_is_a_truncation_error() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        // Announce 100 bytes but deliver 3.
        let mut bytes = Vec::new();
        put_uvarint(&mut bytes, 100);
        bytes.extend_from_slice(&[1, 2, 3]);
        tokio::io::AsyncWriteExt::write_all(&mut client, &bytes).await.unwrap();
        drop(client);

        let err = read_frame(&mut server).await.unwrap_err();
        assert!(matches!(err, FrameError::TruncatedFrame));
    }

    #[tokio::test]
    async fn oversized_frames_are_rejected() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        let mut bytes = Vec::new();
        put_uvarint(&mut bytes, MAX_FRAME_LEN + 1);
        tokio::io::AsyncWriteExt::write_all(&mut client, &bytes).await.unwrap();

        let err = read_frame(&mut server).await.unwrap_err();
        assert!(matches!(err, FrameError::Oversized(_)));
    }

    #[tokio::test]
    async fn decode_failure_keeps_the_stream_usable() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        // A frame whose body is not a valid envelope...
        write_frame(&mut client, &[0xff, 0xff, 0xff]).await.unwrap();
        // ...followed by a valid one.
        let ok = ApiMessage {
            message_id: 8,
            payload: ApiPayload::GetAllSpecsRequest,
        };
        write_message(&mut client, &ok).await.unwrap();

        let bad = read_message::<_, ApiMessage>(&mut server).await.unwrap().unwrap();
        assert!(bad.is_err());
        let good: ApiMessage = read_message(&mut server).await.unwrap().unwrap().unwrap();
        assert_eq!(good, ok);
    }
}
