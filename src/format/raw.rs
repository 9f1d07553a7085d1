//! Raw capture preamble: fixed header followed by untouched sample bytes

use crate::error::{Result, StreamError};
use std::io::{Read, Write};

/// Magic tag at offset 0
pub const RAW_MAGIC: [u8; 4] = *b"FMCW";

/// Current header version
pub const RAW_VERSION: i32 = 0;

/// Encoded header length: magic, version, length, four f64 fields, flags
pub const RAW_HEADER_LEN: usize = 4 + 4 + 4 + 8 + 8 + 8 + 8 + 4;

/// Sweep parameters recorded ahead of the sample payload
///
/// All fields are little-endian on disk.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawHeader {
    /// Sample rate in Hz
    pub sample_rate: f64,
    /// Sweep start / center frequency in Hz
    pub center_freq: f64,
    /// Sweep bandwidth in Hz
    pub bandwidth: f64,
    /// Sweep duration in seconds
    pub sweep_duration: f64,
    pub flags: i32,
}

impl Default for RawHeader {
    fn default() -> Self {
        // 204 MHz reference clock with a divider of 20, I and Q interleaved
        Self {
            sample_rate: 204e6 / (2.0 * 20.0),
            center_freq: 5.6e9,
            bandwidth: 200e6,
            sweep_duration: 1.0e-3,
            flags: 0,
        }
    }
}

impl RawHeader {
    /// Encode to the on-disk layout
    pub fn to_bytes(&self) -> [u8; RAW_HEADER_LEN] {
        let mut out = [0u8; RAW_HEADER_LEN];
        out[0..4].copy_from_slice(&RAW_MAGIC);
        out[4..8].copy_from_slice(&RAW_VERSION.to_le_bytes());
        out[8..12].copy_from_slice(&(RAW_HEADER_LEN as i32).to_le_bytes());
        out[12..20].copy_from_slice(&self.sample_rate.to_le_bytes());
        out[20..28].copy_from_slice(&self.center_freq.to_le_bytes());
        out[28..36].copy_from_slice(&self.bandwidth.to_le_bytes());
        out[36..44].copy_from_slice(&self.sweep_duration.to_le_bytes());
        out[44..48].copy_from_slice(&self.flags.to_le_bytes());
        out
    }

    /// Decode a header, checking magic, version and length
    pub fn from_bytes(bytes: &[u8; RAW_HEADER_LEN]) -> Result<Self> {
        if bytes[0..4] != RAW_MAGIC {
            return Err(StreamError::InvalidHeader(format!(
                "bad raw header magic {:?}",
                &bytes[0..4]
            )));
        }

        let version = i32::from_le_bytes(le4(&bytes[4..8]));
        if version != RAW_VERSION {
            return Err(StreamError::InvalidHeader(format!(
                "unsupported raw header version {}",
                version
            )));
        }

        let header_length = i32::from_le_bytes(le4(&bytes[8..12]));
        if header_length != RAW_HEADER_LEN as i32 {
            return Err(StreamError::InvalidHeader(format!(
                "unexpected raw header length {}",
                header_length
            )));
        }

        Ok(Self {
            sample_rate: f64::from_le_bytes(le8(&bytes[12..20])),
            center_freq: f64::from_le_bytes(le8(&bytes[20..28])),
            bandwidth: f64::from_le_bytes(le8(&bytes[28..36])),
            sweep_duration: f64::from_le_bytes(le8(&bytes[36..44])),
            flags: i32::from_le_bytes(le4(&bytes[44..48])),
        })
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(&self.to_bytes())
    }

    /// Read a header from the start of a capture; the reader is left at the
    /// first sample byte
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut bytes = [0u8; RAW_HEADER_LEN];
        reader.read_exact(&mut bytes)?;
        Self::from_bytes(&bytes)
    }
}

fn le4(bytes: &[u8]) -> [u8; 4] {
    let mut out = [0u8; 4];
    out.copy_from_slice(bytes);
    out
}

fn le8(bytes: &[u8]) -> [u8; 8] {
    let mut out = [0u8; 8];
    out.copy_from_slice(bytes);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_header_layout() {
        let bytes = RawHeader::default().to_bytes();
        assert_eq!(&bytes[0..4], b"FMCW");
        assert_eq!(&bytes[4..8], &[0, 0, 0, 0]);
        assert_eq!(&bytes[8..12], &[48, 0, 0, 0]);
        assert_eq!(f64::from_le_bytes(le8(&bytes[12..20])), 5.1e6);
        assert_eq!(f64::from_le_bytes(le8(&bytes[20..28])), 5.6e9);
    }

    #[test]
    fn test_payload_recovered_after_header() {
        let header = RawHeader {
            sample_rate: 10e6,
            center_freq: 2.4e9,
            bandwidth: 20e6,
            sweep_duration: 2.5e-3,
            flags: 3,
        };
        let payload: Vec<u8> = (0..=255u8).cycle().take(1000).collect();

        let mut file = Vec::new();
        header.write_to(&mut file).unwrap();
        file.extend_from_slice(&payload);

        let mut cursor = Cursor::new(file);
        let parsed = RawHeader::read_from(&mut cursor).unwrap();
        assert_eq!(parsed, header);

        let offset = cursor.position() as usize;
        assert_eq!(offset, RAW_HEADER_LEN);
        assert_eq!(&cursor.get_ref()[offset..], payload.as_slice());
    }

    #[test]
    fn test_rejects_bad_magic() {
        let mut bytes = RawHeader::default().to_bytes();
        bytes[0] = b'X';
        assert!(RawHeader::from_bytes(&bytes).is_err());
    }
}
