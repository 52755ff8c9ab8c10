//! Built-in transforms for the `tandem` binary.
//!
//! Each implements [`Transform`] over one whole record; all are safe to call
//! concurrently from both transformer threads.

use std::io::{self, Read};

use flate2::read::ZlibDecoder;

use crate::pipeline::Transform;

/// Bytes rendered per hex-dump line.
const HEX_LINE_WIDTH: usize = 16;

/// Reverse each record's bytes.
pub struct Reverse;

impl Transform for Reverse {
    fn name(&self) -> &'static str {
        "reverse"
    }

    fn apply(&self, mut item: Vec<u8>) -> io::Result<Vec<u8>> {
        item.reverse();
        Ok(item)
    }
}

/// Render each record as an `xxd`-style hex dump.
///
/// Offsets restart at zero for every record.
pub struct HexDump;

impl Transform for HexDump {
    fn name(&self) -> &'static str {
        "hex"
    }

    fn apply(&self, item: Vec<u8>) -> io::Result<Vec<u8>> {
        let mut out = Vec::with_capacity(item.len() * 4);
        for (line, chunk) in item.chunks(HEX_LINE_WIDTH).enumerate() {
            out.extend_from_slice(format!("{:08x}: ", line * HEX_LINE_WIDTH).as_bytes());
            for i in 0..HEX_LINE_WIDTH {
                match chunk.get(i) {
                    Some(byte) => out.extend_from_slice(format!("{byte:02x} ").as_bytes()),
                    None => out.extend_from_slice(b"   "),
                }
            }
            out.extend_from_slice(b" |");
            for &byte in chunk {
                out.push(if byte.is_ascii_graphic() || byte == b' ' { byte } else { b'.' });
            }
            out.extend_from_slice(b"|\n");
        }
        Ok(out)
    }
}

/// Inflate each zlib-compressed record.
pub struct Inflate;

impl Transform for Inflate {
    fn name(&self) -> &'static str {
        "inflate"
    }

    fn apply(&self, item: Vec<u8>) -> io::Result<Vec<u8>> {
        if item.is_empty() {
            return Ok(Vec::new());
        }
        let mut out = Vec::with_capacity(item.len() * 2);
        ZlibDecoder::new(item.as_slice()).read_to_end(&mut out).map_err(|e| {
            io::Error::new(io::ErrorKind::InvalidData, format!("zlib inflate failed: {e}"))
        })?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::io::Write;

    #[test]
    fn test_reverse() {
        let out = Reverse.apply(b"abc".to_vec()).unwrap();
        assert_eq!(out, b"cba");
        assert!(Reverse.apply(Vec::new()).unwrap().is_empty());
    }

    #[test]
    fn test_hex_dump_layout() {
        let out = HexDump.apply(b"AB\x00".to_vec()).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("00000000: 41 42 00 "));
        assert!(text.ends_with("|AB.|\n"));
        // Offset prefix + 3 columns per byte position + ascii gutter.
        assert_eq!(text.len(), 10 + 16 * 3 + 2 + 3 + 2);
    }

    #[test]
    fn test_hex_dump_multi_line_offsets() {
        let out = HexDump.apply(vec![0u8; 17]).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("00000000: "));
        assert!(lines[1].starts_with("00000010: "));
    }

    #[test]
    fn test_inflate_round_trip() {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"squeeze me").unwrap();
        let compressed = encoder.finish().unwrap();

        let out = Inflate.apply(compressed).unwrap();
        assert_eq!(out, b"squeeze me");
    }

    #[test]
    fn test_inflate_rejects_garbage() {
        let err = Inflate.apply(b"not zlib at all".to_vec()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert!(err.to_string().contains("zlib inflate failed"));
    }

    #[test]
    fn test_inflate_empty_record() {
        assert!(Inflate.apply(Vec::new()).unwrap().is_empty());
    }
}
