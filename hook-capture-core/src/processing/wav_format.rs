//! RIFF/WAV header handling for WAV-format session sinks.
//!
//! The header is written with zero sizes when the sink opens and patched in
//! place once the sink closes and the data length is known.

use std::io::{self, Seek, SeekFrom, Write};

/// Size of the canonical PCM WAV header in bytes.
pub const WAV_HEADER_SIZE: usize = 44;

const RIFF_SIZE_OFFSET: u64 = 4;
const DATA_SIZE_OFFSET: u64 = 40;

/// Build a 44-byte PCM WAV header for `data_size` bytes of audio.
///
/// Sizes and rates are clamped to what the header fields can hold.
pub fn header(sample_rate: u32, channels: u16, bit_depth: u16, data_size: u64) -> [u8; WAV_HEADER_SIZE] {
    let block_align = channels.saturating_mul(bit_depth / 8);
    let byte_rate = sample_rate.saturating_mul(u32::from(block_align));
    let data_size = clamp_u32(data_size);

    let mut out = [0u8; WAV_HEADER_SIZE];
    out[0..4].copy_from_slice(b"RIFF");
    out[4..8].copy_from_slice(&data_size.saturating_add(36).to_le_bytes());
    out[8..12].copy_from_slice(b"WAVE");
    out[12..16].copy_from_slice(b"fmt ");
    out[16..20].copy_from_slice(&16u32.to_le_bytes());
    out[20..22].copy_from_slice(&1u16.to_le_bytes()); // PCM
    out[22..24].copy_from_slice(&channels.to_le_bytes());
    out[24..28].copy_from_slice(&sample_rate.to_le_bytes());
    out[28..32].copy_from_slice(&byte_rate.to_le_bytes());
    out[32..34].copy_from_slice(&block_align.to_le_bytes());
    out[34..36].copy_from_slice(&bit_depth.to_le_bytes());
    out[36..40].copy_from_slice(b"data");
    out[40..44].copy_from_slice(&data_size.to_le_bytes());
    out
}

/// Rewrite the RIFF and data size fields of a header already on disk.
///
/// Leaves the cursor at the end of the stream.
pub fn patch_sizes<W: Write + Seek>(out: &mut W, data_size: u64) -> io::Result<()> {
    let data_size = clamp_u32(data_size);

    out.seek(SeekFrom::Start(RIFF_SIZE_OFFSET))?;
    out.write_all(&data_size.saturating_add(36).to_le_bytes())?;
    out.seek(SeekFrom::Start(DATA_SIZE_OFFSET))?;
    out.write_all(&data_size.to_le_bytes())?;
    out.seek(SeekFrom::End(0))?;
    Ok(())
}

fn clamp_u32(value: u64) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn u32_at(bytes: &[u8], offset: usize) -> u32 {
        u32::from_le_bytes([bytes[offset], bytes[offset + 1], bytes[offset + 2], bytes[offset + 3]])
    }

    #[test]
    fn mono_16k_header_fields() {
        let h = header(16000, 1, 16, 4096);

        assert_eq!(&h[0..4], b"RIFF");
        assert_eq!(&h[8..16], b"WAVEfmt ");
        assert_eq!(&h[36..40], b"data");
        assert_eq!(u32_at(&h, 24), 16000);
        assert_eq!(u32_at(&h, 28), 32000);
        assert_eq!(u16::from_le_bytes([h[32], h[33]]), 2);
        assert_eq!(u32_at(&h, 40), 4096);
        assert_eq!(u32_at(&h, 4), 4096 + 36);
    }

    #[test]
    fn patch_rewrites_sizes_and_returns_to_end() {
        let mut file = Cursor::new(Vec::new());
        file.write_all(&header(16000, 1, 16, 0)).unwrap();
        file.write_all(&[0u8; 100]).unwrap();

        patch_sizes(&mut file, 100).unwrap();
        assert_eq!(file.position(), 144);

        let bytes = file.into_inner();
        assert_eq!(u32_at(&bytes, 40), 100);
        assert_eq!(u32_at(&bytes, 4), 136);
    }

    #[test]
    fn extreme_format_saturates_instead_of_overflowing() {
        let h = header(200_000_000, 8, 32, 0);
        assert_eq!(u32_at(&h, 24), 200_000_000);
        assert_eq!(u32_at(&h, 28), u32::MAX);
        assert_eq!(u16::from_le_bytes([h[32], h[33]]), 32);

        let h = header(16000, u16::MAX, 32, 0);
        assert_eq!(u16::from_le_bytes([h[32], h[33]]), u16::MAX);
    }

    #[test]
    fn oversized_data_is_clamped() {
        let h = header(48000, 2, 16, u64::MAX);
        assert_eq!(u32_at(&h, 40), u32::MAX);
        assert_eq!(u32_at(&h, 4), u32::MAX);
    }
}
