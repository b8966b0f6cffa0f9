//! Length-prefixed JSON framing for envelopes on a byte stream
//! (the backend binary talks to the UI process over stdin/stdout).

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use super::Envelope;

pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

pub fn encode(envelope: &Envelope) -> Result<Vec<u8>, String> {
    serde_json::to_vec(envelope).map_err(|e| format!("encode: {}", e))
}

pub fn decode(bytes: &[u8]) -> Result<Envelope, String> {
    serde_json::from_slice(bytes).map_err(|e| format!("decode: {}", e))
}

/// Write one frame: u32 big-endian length, then the JSON body.
pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, envelope: &Envelope) -> Result<(), String> {
    let data = encode(envelope)?;
    if data.len() > MAX_FRAME_LEN {
        return Err("frame too large".into());
    }
    write_frame_bytes(writer, &data).await
}

async fn write_frame_bytes<W: AsyncWrite + Unpin>(writer: &mut W, data: &[u8]) -> Result<(), String> {
    let len = (data.len() as u32).to_be_bytes();
    writer.write_all(&len).await.map_err(|e| format!("write len: {}", e))?;
    writer.write_all(data).await.map_err(|e| format!("write data: {}", e))?;
    writer.flush().await.map_err(|e| format!("flush: {}", e))?;
    Ok(())
}

/// Read one frame body. `Ok(None)` on a clean end of stream between frames.
pub async fn read_frame_bytes<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<Vec<u8>>, String> {
    let mut len_buf = [0u8; 4];
    let first = reader.read(&mut len_buf[..1]).await.map_err(|e| format!("read len: {}", e))?;
    if first == 0 {
        return Ok(None);
    }
    reader
        .read_exact(&mut len_buf[1..])
        .await
        .map_err(|e| format!("read len: {}", e))?;
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        return Err("frame too large".into());
    }
    let mut buf = vec![0u8; len];
    reader
        .read_exact(&mut buf)
        .await
        .map_err(|e| format!("read data: {}", e))?;
    Ok(Some(buf))
}

pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<Envelope>, String> {
    match read_frame_bytes(reader).await? {
        Some(buf) => decode(&buf).map(Some),
        None => Ok(None),
    }
}

/// Forward frames from `reader` into `tx` until end of stream. A frame whose
/// body is not a valid envelope is skipped; framing errors end the pump.
pub async fn pump_in<R: AsyncRead + Unpin>(mut reader: R, tx: mpsc::UnboundedSender<Envelope>) -> Result<(), String> {
    while let Some(buf) = read_frame_bytes(&mut reader).await? {
        match decode(&buf) {
            Ok(envelope) => {
                if tx.send(envelope).is_err() {
                    break;
                }
            }
            Err(e) => tracing::warn!(error = %e, len = buf.len(), "skipping malformed frame"),
        }
    }
    Ok(())
}

/// Write every envelope from `rx` to `writer` until the channel closes.
pub async fn pump_out<W: AsyncWrite + Unpin>(mut writer: W, mut rx: mpsc::UnboundedReceiver<Envelope>) -> Result<(), String> {
    while let Some(envelope) = rx.recv().await {
        let data = match encode(&envelope) {
            Ok(d) if d.len() <= MAX_FRAME_LEN => d,
            Ok(d) => {
                tracing::warn!(channel = %envelope.channel, len = d.len(), "reply too large, dropped");
                continue;
            }
            Err(e) => {
                tracing::warn!(channel = %envelope.channel, error = %e, "reply dropped");
                continue;
            }
        };
        write_frame_bytes(&mut writer, &data).await?;
    }
    Ok(())
}
