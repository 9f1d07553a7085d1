//! On-disk capture formats

pub mod raw;
pub mod wav;

pub use raw::{RawHeader, RAW_HEADER_LEN};
pub use wav::{WavHeader, WAV_HEADER_LEN};

use crate::error::Result;
use std::io::{Seek, SeekFrom, Write};
use tracing::{debug, info};

/// Framing applied to a capture file
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputFormat {
    /// Sweep preamble followed by signed I/Q bytes
    Raw(RawHeader),
    /// RIFF/WAVE container with unsigned I/Q bytes
    Wav { sample_rate: u32 },
}

impl OutputFormat {
    /// Bytes written ahead of the sample payload
    pub fn header_len(&self) -> usize {
        match self {
            OutputFormat::Raw(_) => RAW_HEADER_LEN,
            OutputFormat::Wav { .. } => WAV_HEADER_LEN,
        }
    }

    /// Whether payload bytes must be flipped from signed to unsigned
    pub fn needs_unsigned(&self) -> bool {
        matches!(self, OutputFormat::Wav { .. })
    }

    /// Write the header at stream open
    pub fn write_preamble<W: Write>(&self, store: &mut W) -> Result<()> {
        match self {
            OutputFormat::Raw(header) => header.write_to(store)?,
            OutputFormat::Wav { .. } => WavHeader::placeholder().write_to(store)?,
        }
        debug!("Wrote {} byte preamble", self.header_len());
        Ok(())
    }

    /// Patch the header once the writer is done
    ///
    /// The raw format has no trailer and only needs a flush. The WAV header
    /// is rewritten with sizes derived from the current end position, and
    /// the store is left positioned at the end.
    pub fn finalize<W: Write + Seek>(&self, store: &mut W) -> Result<()> {
        if let OutputFormat::Wav { sample_rate } = self {
            let file_len = store.stream_position()?;
            let header = WavHeader::for_file_len(*sample_rate, file_len);

            store.seek(SeekFrom::Start(0))?;
            header.write_to(store)?;
            store.seek(SeekFrom::Start(file_len))?;

            info!(
                "WAV header finalized: {} data bytes at {} Hz",
                header.data_size, sample_rate
            );
        }
        store.flush()?;
        Ok(())
    }
}
