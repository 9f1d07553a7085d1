//! RIFF/WAVE container for interleaved 8-bit I/Q captures
//!
//! Layout (44 bytes, little-endian), compatible with SDR# IQ recordings:
//!
//! ```text
//! "RIFF" riff_size "WAVE"
//! "fmt " 16 tag=1 channels=2 sample_rate avg_bytes block_align=2 bits=8
//! "data" data_size
//! ```
//!
//! Sizes are written as zero placeholders when the capture opens and patched
//! once the final file length is known.

use chrono::{DateTime, Utc};
use std::io::Write;
use tracing::warn;

/// Encoded length of the three chunk headers
pub const WAV_HEADER_LEN: usize = 44;

const FMT_CHUNK_LEN: u32 = 16;
const FORMAT_TAG_PCM: u16 = 1;
const CHANNELS: u16 = 2;
const BLOCK_ALIGN: u16 = 2;
const BITS_PER_SAMPLE: u16 = 8;

/// Mutable fields of the container header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WavHeader {
    /// File length minus the 8-byte RIFF descriptor
    pub riff_size: u32,
    pub sample_rate: u32,
    /// Payload length in bytes
    pub data_size: u32,
}

impl WavHeader {
    /// Header written at open time, before any size is known
    pub fn placeholder() -> Self {
        Self::default()
    }

    /// Header describing a finished file of `file_len` bytes
    ///
    /// Sizes that do not fit in 32 bits saturate.
    pub fn for_file_len(sample_rate: u32, file_len: u64) -> Self {
        let riff_size = saturate(file_len.saturating_sub(8));
        let data_size = saturate(file_len.saturating_sub(WAV_HEADER_LEN as u64));
        if file_len > u32::MAX as u64 {
            warn!(
                "Capture is {} bytes, WAV size fields saturated at {}",
                file_len,
                u32::MAX
            );
        }

        Self {
            riff_size,
            sample_rate,
            data_size,
        }
    }

    /// Average byte rate: one I and one Q byte per sample
    pub fn avg_bytes_per_sec(&self) -> u32 {
        self.sample_rate.saturating_mul(BLOCK_ALIGN as u32)
    }

    pub fn to_bytes(&self) -> [u8; WAV_HEADER_LEN] {
        let mut out = [0u8; WAV_HEADER_LEN];

        out[0..4].copy_from_slice(b"RIFF");
        out[4..8].copy_from_slice(&self.riff_size.to_le_bytes());
        out[8..12].copy_from_slice(b"WAVE");

        out[12..16].copy_from_slice(b"fmt ");
        out[16..20].copy_from_slice(&FMT_CHUNK_LEN.to_le_bytes());
        out[20..22].copy_from_slice(&FORMAT_TAG_PCM.to_le_bytes());
        out[22..24].copy_from_slice(&CHANNELS.to_le_bytes());
        out[24..28].copy_from_slice(&self.sample_rate.to_le_bytes());
        out[28..32].copy_from_slice(&self.avg_bytes_per_sec().to_le_bytes());
        out[32..34].copy_from_slice(&BLOCK_ALIGN.to_le_bytes());
        out[34..36].copy_from_slice(&BITS_PER_SAMPLE.to_le_bytes());

        out[36..40].copy_from_slice(b"data");
        out[40..44].copy_from_slice(&self.data_size.to_le_bytes());

        out
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(&self.to_bytes())
    }
}

fn saturate(value: u64) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

/// Convert signed I/Q bytes to the unsigned encoding WAV expects, in place
#[inline]
pub fn to_unsigned(samples: &mut [u8]) {
    for byte in samples.iter_mut() {
        *byte ^= 0x80;
    }
}

/// Automatic capture name: `HackRF_20131128_142312Z_900000kHz_IQ.wav`
pub fn capture_file_name(freq_hz: u64, time: DateTime<Utc>) -> String {
    format!(
        "HackRF_{}Z_{}kHz_IQ.wav",
        time.format("%Y%m%d_%H%M%S"),
        freq_hz / 1000
    )
}
