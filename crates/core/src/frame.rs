//! Checksummed record framing for append-only files.
//!
//! Frame layout: `[checksum: u64 le][len: u32 le][payload]`. The checksum is
//! a CRC-64 over the length prefix and payload, so a torn tail write is
//! indistinguishable from end-of-file on the read side.

use std::io::{self, Read, Write};

use crc64fast::Digest;

const HEADER_SIZE: usize = 8 + 4;

/// Outcome of reading one frame.
#[derive(Debug)]
pub enum Frame {
    /// A complete, checksum-valid payload.
    Record(Vec<u8>),
    /// Clean end of file.
    End,
    /// A torn or corrupt tail; nothing after this point is trustworthy.
    Corrupt,
}

fn checksum(len: u32, payload: &[u8]) -> u64 {
    let mut digest = Digest::new();
    digest.write(&len.to_le_bytes());
    digest.write(payload);
    digest.sum64()
}

/// Append one frame to `writer`.
pub fn write_frame(writer: &mut impl Write, payload: &[u8]) -> io::Result<()> {
    let len = u32::try_from(payload.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "frame payload too large"))?;

    let mut header = [0u8; HEADER_SIZE];
    header[0..8].copy_from_slice(&checksum(len, payload).to_le_bytes());
    header[8..12].copy_from_slice(&len.to_le_bytes());

    writer.write_all(&header)?;
    writer.write_all(payload)?;
    Ok(())
}

/// Read one frame from `reader`.
///
/// Anything short of a complete, checksum-valid frame is reported as
/// [`Frame::Corrupt`]; only real I/O failures surface as errors.
pub fn read_frame(reader: &mut impl Read) -> io::Result<Frame> {
    let mut header = [0u8; HEADER_SIZE];
    match reader.read_exact(&mut header) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(Frame::End),
        Err(e) => return Err(e),
    }

    let expected = u64::from_le_bytes(header[0..8].try_into().expect("fixed-width slice"));
    let len = u32::from_le_bytes(header[8..12].try_into().expect("fixed-width slice"));

    let mut payload = vec![0u8; len as usize];
    match reader.read_exact(&mut payload) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(Frame::Corrupt),
        Err(e) => return Err(e),
    }

    if checksum(len, &payload) != expected {
        return Ok(Frame::Corrupt);
    }
    Ok(Frame::Record(payload))
}
