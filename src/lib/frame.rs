//! Length-prefixed record framing.
//!
//! The `tandem` binary consumes streams of discrete opaque records framed as
//! a 4-byte little-endian payload length followed by the payload itself.
//! [`FrameReader`] decodes such a stream into items for the pipeline; clean
//! EOF at a frame boundary ends the stream, while EOF inside a header or
//! payload is reported as corruption. [`write_frame`] produces the format.

use std::io::{self, Read, Write};

use crate::pipeline::Source;

/// Size of the frame header (payload length, `u32` little-endian).
pub const FRAME_HEADER_SIZE: usize = 4;

/// Upper bound on a single frame's payload, guarding against corrupt
/// headers turning into absurd allocations.
pub const MAX_FRAME_LEN: usize = 256 * 1024 * 1024;

/// Reads length-prefixed records from a byte stream.
///
/// Non-restartable: records are yielded once, in stream order.
pub struct FrameReader<R> {
    reader: R,
    name: String,
}

impl<R: Read> FrameReader<R> {
    /// Wrap a reader; `name` identifies the input in diagnostics.
    pub fn new(reader: R, name: impl Into<String>) -> Self {
        Self { reader, name: name.into() }
    }

    /// Read the next frame's payload.
    ///
    /// Returns `Ok(None)` on clean EOF at a frame boundary. EOF anywhere
    /// inside a frame is an `InvalidData` error.
    pub fn read_frame(&mut self) -> io::Result<Option<Vec<u8>>> {
        let mut header = [0u8; FRAME_HEADER_SIZE];
        let filled = read_fully(&mut self.reader, &mut header)?;
        if filled == 0 {
            return Ok(None);
        }
        if filled < FRAME_HEADER_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("truncated frame header: got {filled} of {FRAME_HEADER_SIZE} bytes"),
            ));
        }

        let len = u32::from_le_bytes(header) as usize;
        if len > MAX_FRAME_LEN {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("frame length {len} exceeds maximum {MAX_FRAME_LEN}"),
            ));
        }

        let mut payload = vec![0u8; len];
        self.reader.read_exact(&mut payload).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("truncated frame payload: expected {len} bytes"),
                )
            } else {
                e
            }
        })?;
        Ok(Some(payload))
    }
}

impl<R: Read> Source for FrameReader<R> {
    fn next_item(&mut self) -> io::Result<Option<Vec<u8>>> {
        self.read_frame()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Fill `buf` as far as the stream allows, returning the byte count.
///
/// Unlike `read_exact`, a clean EOF before any byte is distinguishable from
/// one mid-buffer.
fn read_fully<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Write one record in framed form.
///
/// # Errors
///
/// Fails with `InvalidInput` if the payload exceeds `u32` range, or with the
/// underlying writer's error.
pub fn write_frame<W: Write>(writer: &mut W, payload: &[u8]) -> io::Result<()> {
    let len = u32::try_from(payload.len()).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("payload of {} bytes does not fit a frame", payload.len()),
        )
    })?;
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn framed(payloads: &[&[u8]]) -> Vec<u8> {
        let mut buf = Vec::new();
        for payload in payloads {
            write_frame(&mut buf, payload).unwrap();
        }
        buf
    }

    #[test]
    fn test_round_trip() {
        let data = framed(&[b"hello", b"", b"world"]);
        let mut reader = FrameReader::new(Cursor::new(data), "<test>");
        assert_eq!(reader.read_frame().unwrap(), Some(b"hello".to_vec()));
        assert_eq!(reader.read_frame().unwrap(), Some(Vec::new()));
        assert_eq!(reader.read_frame().unwrap(), Some(b"world".to_vec()));
        assert_eq!(reader.read_frame().unwrap(), None);
        // Exhausted streams stay exhausted.
        assert_eq!(reader.read_frame().unwrap(), None);
    }

    #[test]
    fn test_empty_stream() {
        let mut reader = FrameReader::new(Cursor::new(Vec::<u8>::new()), "<test>");
        assert_eq!(reader.read_frame().unwrap(), None);
    }

    #[test]
    fn test_truncated_header() {
        let mut data = framed(&[b"ok"]);
        data.extend_from_slice(&[1, 0]); // two bytes of a second header
        let mut reader = FrameReader::new(Cursor::new(data), "<test>");
        assert_eq!(reader.read_frame().unwrap(), Some(b"ok".to_vec()));
        let err = reader.read_frame().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert!(err.to_string().contains("truncated frame header"));
    }

    #[test]
    fn test_truncated_payload() {
        let mut data = framed(&[b"hello"]);
        data.truncate(data.len() - 2);
        let mut reader = FrameReader::new(Cursor::new(data), "<test>");
        let err = reader.read_frame().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert!(err.to_string().contains("truncated frame payload"));
    }

    #[test]
    fn test_oversized_length_rejected() {
        let mut data = Vec::new();
        data.extend_from_slice(&u32::MAX.to_le_bytes());
        let mut reader = FrameReader::new(Cursor::new(data), "<test>");
        let err = reader.read_frame().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert!(err.to_string().contains("exceeds maximum"));
    }

    #[test]
    fn test_source_name() {
        let reader = FrameReader::new(Cursor::new(Vec::<u8>::new()), "input.bin");
        assert_eq!(Source::name(&reader), "input.bin");
    }
}
