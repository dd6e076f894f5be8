//! Length-prefixed framing for the TCP transport.
//!
//! Wire format: `[u32 length (big-endian)][JSON payload]`

use std::io::{self, Read, Write};

use serde::{de::DeserializeOwned, Serialize};

/// Audio frames are large; anything past this is a corrupt stream.
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

/// Write a length-prefixed JSON frame and flush.
pub fn write_frame<W: Write, T: Serialize>(writer: &mut W, msg: &T) -> io::Result<()> {
    let payload =
        serde_json::to_vec(msg).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    if payload.len() > MAX_FRAME_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("frame too large: {} bytes", payload.len()),
        ));
    }

    writer.write_all(&(payload.len() as u32).to_be_bytes())?;
    writer.write_all(&payload)?;
    writer.flush()
}

/// Read one length-prefixed JSON frame.
pub fn read_frame<R: Read, T: DeserializeOwned>(reader: &mut R) -> io::Result<T> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf)?;
    let len = u32::from_be_bytes(len_buf) as usize;

    if len > MAX_FRAME_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame too large: {} bytes", len),
        ));
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload)?;

    serde_json::from_slice(&payload).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{AudioChunk, ServerContent, ServerMessage};
    use std::io::Cursor;

    #[test]
    fn frame_carries_server_content() {
        let msg = ServerMessage::ServerContent(ServerContent {
            audio_chunks: vec![AudioChunk::new("AAECAw==")],
        });

        let mut buf = Vec::new();
        write_frame(&mut buf, &msg).unwrap();
        let declared = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
        assert_eq!(declared, buf.len() - 4);

        let mut cursor = Cursor::new(buf);
        let result: ServerMessage = read_frame(&mut cursor).unwrap();
        assert_eq!(result, msg);
    }

    #[test]
    fn oversized_length_is_rejected() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&((MAX_FRAME_LEN as u32) + 1).to_be_bytes());
        let mut cursor = Cursor::new(buf);
        let err = read_frame::<_, ServerMessage>(&mut cursor).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn truncated_stream_is_eof() {
        let mut cursor = Cursor::new(vec![0u8, 0, 0, 10, b'{']);
        let err = read_frame::<_, ServerMessage>(&mut cursor).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
