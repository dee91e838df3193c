//! Length-prefixed framing for the native transport.
//!
//! Every frame is a 4-byte little-endian length followed by that many
//! bytes of UTF-8 JSON. Lengths of zero or at least [`MAX_FRAME_LEN`] are
//! protocol errors; the stream cannot be resynchronized after one.

use loopcast_common::error::{LoopcastError, LoopcastResult};
use loopcast_model::ipc::{HostReply, IncomingMessage};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Exclusive upper bound on a frame payload.
pub const MAX_FRAME_LEN: u32 = 1024 * 1024;

/// Read one frame payload.
///
/// Returns `Ok(None)` on a clean end of stream between frames.
pub async fn read_frame<R>(reader: &mut R) -> LoopcastResult<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; 4];
    let mut got = 0;
    while got < header.len() {
        let n = reader.read(&mut header[got..]).await?;
        if n == 0 {
            if got == 0 {
                return Ok(None);
            }
            return Err(LoopcastError::protocol(format!(
                "stream ended inside a length prefix ({got} of 4 bytes)"
            )));
        }
        got += n;
    }

    let len = u32::from_le_bytes(header);
    if len == 0 || len >= MAX_FRAME_LEN {
        return Err(LoopcastError::protocol(format!(
            "frame length {len} outside 1..{MAX_FRAME_LEN}"
        )));
    }

    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload).await.map_err(|e| {
        LoopcastError::protocol(format!("stream ended inside a {len}-byte frame: {e}"))
    })?;
    Ok(Some(payload))
}

/// Write one frame and flush it.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> LoopcastResult<()>
where
    W: AsyncWrite + Unpin,
{
    let len = u32::try_from(payload.len())
        .ok()
        .filter(|len| *len > 0 && *len < MAX_FRAME_LEN)
        .ok_or_else(|| {
            LoopcastError::protocol(format!("cannot frame a {}-byte payload", payload.len()))
        })?;
    writer.write_all(&len.to_le_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

pub fn decode_message(payload: &[u8]) -> LoopcastResult<IncomingMessage> {
    Ok(serde_json::from_slice(payload)?)
}

pub fn encode_reply(reply: &HostReply) -> LoopcastResult<Vec<u8>> {
    Ok(serde_json::to_vec(reply)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use loopcast_model::ipc::Command;

    fn framed(payload: &[u8]) -> Vec<u8> {
        let mut bytes = (payload.len() as u32).to_le_bytes().to_vec();
        bytes.extend_from_slice(payload);
        bytes
    }

    #[tokio::test]
    async fn reads_consecutive_frames_then_clean_eof() {
        let mut wire = framed(br#"{"command":"ping"}"#);
        wire.extend(framed(br#"{"command":"stop"}"#));
        let mut reader = wire.as_slice();

        let first = read_frame(&mut reader).await.unwrap().unwrap();
        assert_eq!(decode_message(&first).unwrap().command(), Command::Ping);
        let second = read_frame(&mut reader).await.unwrap().unwrap();
        assert_eq!(decode_message(&second).unwrap().command(), Command::Stop);
        assert!(read_frame(&mut reader).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn zero_and_oversized_lengths_are_protocol_errors() {
        let mut zero: &[u8] = &[0, 0, 0, 0];
        assert!(matches!(
            read_frame(&mut zero).await,
            Err(LoopcastError::Protocol { .. })
        ));

        let oversized = MAX_FRAME_LEN.to_le_bytes();
        let mut reader: &[u8] = &oversized;
        assert!(matches!(
            read_frame(&mut reader).await,
            Err(LoopcastError::Protocol { .. })
        ));
    }

    #[tokio::test]
    async fn truncated_input_is_a_protocol_error() {
        let mut short_header: &[u8] = &[5, 0];
        assert!(read_frame(&mut short_header).await.is_err());

        let wire = framed(b"{\"command\":");
        let mut short_body: &[u8] = &wire[..wire.len() - 3];
        assert!(read_frame(&mut short_body).await.is_err());
    }

    #[tokio::test]
    async fn replies_are_written_little_endian() {
        let mut out = Vec::new();
        let payload = encode_reply(&HostReply::Pong).unwrap();
        write_frame(&mut out, &payload).await.unwrap();
        assert_eq!(&out[..4], &(payload.len() as u32).to_le_bytes());
        assert_eq!(&out[4..], br#"{"status":"pong"}"#);
    }

    #[tokio::test]
    async fn empty_payload_is_not_written() {
        let mut out = Vec::new();
        assert!(write_frame(&mut out, b"").await.is_err());
        assert!(out.is_empty());
    }
}
