//! Length-prefixed wire framing.
//!
//! Every message is `u32 length (big-endian) | u32 type (big-endian) |
//! payload`, where `length` counts the type word plus the payload. Oversize
//! payloads are drained and reported separately from malformed framing: the
//! former keeps the connection alive (the server answers with an error
//! response), the latter closes it.

use std::io::{Read, Write};
use thiserror::Error;

/// Maximum payload size (type word excluded).
pub const MAX_PAYLOAD: usize = 1024 * 1024;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    /// Length word smaller than the mandatory type word.
    #[error("malformed frame: {0}")]
    Malformed(String),
    /// Payload over [`MAX_PAYLOAD`]; the frame was consumed from the stream.
    #[error("payload of {0} bytes exceeds the 1 MiB limit")]
    Oversize(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub type_code: u32,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(type_code: u32, payload: Vec<u8>) -> Self {
        Self { type_code, payload }
    }
}

pub fn read_frame<R: Read>(reader: &mut R) -> Result<Frame, FrameError> {
    let mut word = [0u8; 4];
    reader.read_exact(&mut word)?;
    let length = u32::from_be_bytes(word) as usize;
    if length < 4 {
        return Err(FrameError::Malformed(format!(
            "length {length} cannot hold a type word"
        )));
    }
    let payload_len = length - 4;
    if payload_len > MAX_PAYLOAD {
        // Drain the oversized frame so the stream stays in sync and the
        // connection can continue.
        std::io::copy(
            &mut reader.by_ref().take(length as u64),
            &mut std::io::sink(),
        )?;
        return Err(FrameError::Oversize(payload_len));
    }
    reader.read_exact(&mut word)?;
    let type_code = u32::from_be_bytes(word);
    let mut payload = vec![0u8; payload_len];
    reader.read_exact(&mut payload)?;
    Ok(Frame { type_code, payload })
}

pub fn write_frame<W: Write>(writer: &mut W, frame: &Frame) -> std::io::Result<()> {
    let length = (frame.payload.len() + 4) as u32;
    writer.write_all(&length.to_be_bytes())?;
    writer.write_all(&frame.type_code.to_be_bytes())?;
    writer.write_all(&frame.payload)?;
    writer.flush()
}
