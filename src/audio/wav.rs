//! Canonical 44-byte WAV header writer.
//!
//! The capture path writes headerless little-endian PCM-16 to disk.  Before a
//! recording can be uploaded or played back, [`inject_header`] prepends a
//! canonical RIFF/WAVE header describing that payload and swaps the combined
//! file in place of the raw one.
//!
//! # Header layout (all fields little-endian)
//!
//! | Offset | Size | Value |
//! |--------|------|-------|
//! | 0  | 4 | `"RIFF"` |
//! | 4  | 4 | `36 + data_size` |
//! | 8  | 4 | `"WAVE"` |
//! | 12 | 4 | `"fmt "` |
//! | 16 | 4 | `16` |
//! | 20 | 2 | `1` (PCM) |
//! | 22 | 2 | channels |
//! | 24 | 4 | sample rate |
//! | 28 | 4 | byte rate |
//! | 32 | 2 | block align |
//! | 34 | 2 | bits per sample |
//! | 36 | 4 | `"data"` |
//! | 40 | 4 | `data_size` |
//!
//! # Example
//!
//! ```rust
//! use mewsage::audio::wav::{encode_header, WavSpec, WAV_HEADER_LEN};
//!
//! let header = encode_header(WavSpec::pcm16_mono(48_000), 96_000);
//! assert_eq!(header.len(), WAV_HEADER_LEN);
//! assert_eq!(&header[0..4], b"RIFF");
//! assert_eq!(u32::from_le_bytes(header[4..8].try_into().unwrap()), 36 + 96_000);
//! ```

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Size of the canonical header in bytes.
pub const WAV_HEADER_LEN: usize = 44;

const FMT_CHUNK_LEN: u32 = 16;
const FORMAT_PCM: u16 = 1;

// ---------------------------------------------------------------------------
// WavError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum WavError {
    /// The raw capture file holds no audio beyond header size.
    #[error("empty recording: no audio was captured")]
    EmptyRecording,

    /// The payload does not fit in the 32-bit RIFF size field.
    #[error("recording too large for a WAV file: {0} bytes")]
    TooLarge(u64),

    /// The bytes do not start with a canonical PCM WAV header.
    #[error("malformed WAV header: {0}")]
    Malformed(&'static str),

    #[error("WAV file I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// WavSpec
// ---------------------------------------------------------------------------

/// Sample layout described by the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavSpec {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
}

impl WavSpec {
    /// 16-bit mono PCM at `sample_rate`; the only layout the capture path
    /// produces.
    pub fn pcm16_mono(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            channels: 1,
            bits_per_sample: 16,
        }
    }

    /// `channels × bytes_per_sample`.
    pub fn block_align(&self) -> u16 {
        self.channels * (self.bits_per_sample / 8)
    }

    /// `sample_rate × block_align`.
    pub fn byte_rate(&self) -> u32 {
        self.sample_rate * u32::from(self.block_align())
    }
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Build the 44-byte header for a payload of `data_size` bytes.
pub fn encode_header(spec: WavSpec, data_size: u32) -> [u8; WAV_HEADER_LEN] {
    let mut h = [0u8; WAV_HEADER_LEN];

    h[0..4].copy_from_slice(b"RIFF");
    h[4..8].copy_from_slice(&(36u32.wrapping_add(data_size)).to_le_bytes());
    h[8..12].copy_from_slice(b"WAVE");

    h[12..16].copy_from_slice(b"fmt ");
    h[16..20].copy_from_slice(&FMT_CHUNK_LEN.to_le_bytes());
    h[20..22].copy_from_slice(&FORMAT_PCM.to_le_bytes());
    h[22..24].copy_from_slice(&spec.channels.to_le_bytes());
    h[24..28].copy_from_slice(&spec.sample_rate.to_le_bytes());
    h[28..32].copy_from_slice(&spec.byte_rate().to_le_bytes());
    h[32..34].copy_from_slice(&spec.block_align().to_le_bytes());
    h[34..36].copy_from_slice(&spec.bits_per_sample.to_le_bytes());

    h[36..40].copy_from_slice(b"data");
    h[40..44].copy_from_slice(&data_size.to_le_bytes());

    h
}

/// Concatenate a header and `pcm` into a complete WAV byte buffer.
///
/// Works for any payload length, including zero.
pub fn wrap_pcm(spec: WavSpec, pcm: &[u8]) -> Result<Vec<u8>, WavError> {
    let data_size = checked_data_size(pcm.len() as u64)?;
    let mut out = Vec::with_capacity(WAV_HEADER_LEN + pcm.len());
    out.extend_from_slice(&encode_header(spec, data_size));
    out.extend_from_slice(pcm);
    Ok(out)
}

/// Turn the raw PCM file at `path` into a WAV file in place.
///
/// The combined bytes are written to a sibling temporary file which is then
/// renamed over `path`, so readers see either the raw file or the finished
/// WAV, never a partial one.  Returns the payload size.
///
/// # Errors
///
/// [`WavError::EmptyRecording`] when the file is no longer than a header;
/// the file is left untouched in that case.
pub fn inject_header(path: &Path, spec: WavSpec) -> Result<u32, WavError> {
    let pcm = fs::read(path)?;
    if pcm.len() <= WAV_HEADER_LEN {
        return Err(WavError::EmptyRecording);
    }

    let wav = wrap_pcm(spec, &pcm)?;
    let tmp = temp_sibling(path);
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(&wav)?;
        file.sync_all()?;
    }

    if let Err(e) = fs::rename(&tmp, path) {
        if let Err(cleanup) = fs::remove_file(&tmp) {
            log::warn!("wav: could not remove {}: {cleanup}", tmp.display());
        }
        return Err(e.into());
    }

    log::debug!(
        "wav: header injected into {} ({} payload bytes @ {} Hz)",
        path.display(),
        pcm.len(),
        spec.sample_rate
    );
    Ok(pcm.len() as u32)
}

fn checked_data_size(len: u64) -> Result<u32, WavError> {
    if len > u64::from(u32::MAX - 36) {
        return Err(WavError::TooLarge(len));
    }
    Ok(len as u32)
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    path.with_file_name(name)
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Parse a canonical header, returning the sample layout and the declared
/// payload size.
pub fn read_header(bytes: &[u8]) -> Result<(WavSpec, u32), WavError> {
    if bytes.len() < WAV_HEADER_LEN {
        return Err(WavError::Malformed("shorter than 44 bytes"));
    }
    if &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
        return Err(WavError::Malformed("missing RIFF/WAVE tags"));
    }
    if &bytes[12..16] != b"fmt " || &bytes[36..40] != b"data" {
        return Err(WavError::Malformed("not a canonical fmt/data layout"));
    }

    let u16_at = |o: usize| u16::from_le_bytes([bytes[o], bytes[o + 1]]);
    let u32_at =
        |o: usize| u32::from_le_bytes([bytes[o], bytes[o + 1], bytes[o + 2], bytes[o + 3]]);

    if u16_at(20) != FORMAT_PCM {
        return Err(WavError::Malformed("audio format is not PCM"));
    }

    let spec = WavSpec {
        channels: u16_at(22),
        sample_rate: u32_at(24),
        bits_per_sample: u16_at(34),
    };
    let data_size = u32_at(40);

    if u32_at(4) != 36u32.wrapping_add(data_size) {
        return Err(WavError::Malformed("RIFF size disagrees with data size"));
    }
    if u32_at(28) != spec.byte_rate() || u16_at(32) != spec.block_align() {
        return Err(WavError::Malformed("byte rate / block align inconsistent"));
    }

    Ok((spec, data_size))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn le32(b: &[u8], o: usize) -> u32 {
        u32::from_le_bytes(b[o..o + 4].try_into().unwrap())
    }

    fn le16(b: &[u8], o: usize) -> u16 {
        u16::from_le_bytes(b[o..o + 2].try_into().unwrap())
    }

    #[test]
    fn header_fields_match_layout() {
        let h = encode_header(WavSpec::pcm16_mono(48_000), 1_000);

        assert_eq!(&h[0..4], b"RIFF");
        assert_eq!(le32(&h, 4), 1_036);
        assert_eq!(&h[8..12], b"WAVE");
        assert_eq!(&h[12..16], b"fmt ");
        assert_eq!(le32(&h, 16), 16);
        assert_eq!(le16(&h, 20), 1);
        assert_eq!(le16(&h, 22), 1);
        assert_eq!(le32(&h, 24), 48_000);
        assert_eq!(le32(&h, 28), 96_000);
        assert_eq!(le16(&h, 32), 2);
        assert_eq!(le16(&h, 34), 16);
        assert_eq!(&h[36..40], b"data");
        assert_eq!(le32(&h, 40), 1_000);
    }

    #[test]
    fn wrapped_length_and_sizes_for_various_payloads() {
        for n in [0usize, 1, 2, 43, 44, 45, 4_800, 96_001] {
            let pcm = vec![0x5Au8; n];
            let wav = wrap_pcm(WavSpec::pcm16_mono(44_100), &pcm).unwrap();

            assert_eq!(wav.len(), WAV_HEADER_LEN + n, "n = {n}");
            assert_eq!(le32(&wav, 4), 36 + n as u32, "n = {n}");
            assert_eq!(le32(&wav, 40), n as u32, "n = {n}");
            assert_eq!(&wav[WAV_HEADER_LEN..], &pcm[..]);
        }
    }

    #[test]
    fn byte_rate_follows_spec() {
        let stereo = WavSpec {
            sample_rate: 44_100,
            channels: 2,
            bits_per_sample: 16,
        };
        assert_eq!(stereo.block_align(), 4);
        assert_eq!(stereo.byte_rate(), 176_400);
    }

    #[test]
    fn inject_header_rewrites_file_in_place() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("recording_1.wav");
        let pcm: Vec<u8> = (0..9_600u32).map(|i| (i % 251) as u8).collect();
        fs::write(&path, &pcm).unwrap();

        let size = inject_header(&path, WavSpec::pcm16_mono(48_000)).unwrap();
        assert_eq!(size, 9_600);

        let bytes = fs::read(&path).unwrap();
        assert_eq!(bytes.len(), 44 + 9_600);
        assert_eq!(le32(&bytes, 4), 36 + 9_600);
        assert_eq!(le32(&bytes, 40), 9_600);
        assert_eq!(&bytes[44..], &pcm[..]);

        // No temporary file left behind.
        let leftovers: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[test]
    fn inject_header_rejects_empty_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.wav");
        fs::write(&path, b"").unwrap();

        let err = inject_header(&path, WavSpec::pcm16_mono(48_000)).unwrap_err();
        assert!(matches!(err, WavError::EmptyRecording));
        assert_eq!(fs::read(&path).unwrap().len(), 0);
    }

    #[test]
    fn inject_header_rejects_header_sized_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tiny.wav");
        fs::write(&path, [0u8; WAV_HEADER_LEN]).unwrap();

        let err = inject_header(&path, WavSpec::pcm16_mono(48_000)).unwrap_err();
        assert!(matches!(err, WavError::EmptyRecording));
    }

    #[test]
    fn inject_header_missing_file_is_io_error() {
        let dir = tempdir().unwrap();
        let err =
            inject_header(&dir.path().join("nope.wav"), WavSpec::pcm16_mono(48_000)).unwrap_err();
        assert!(matches!(err, WavError::Io(_)));
    }

    #[test]
    fn read_header_recovers_spec() {
        let spec = WavSpec::pcm16_mono(44_100);
        let wav = wrap_pcm(spec, &[0u8; 200]).unwrap();
        let (parsed, size) = read_header(&wav).unwrap();
        assert_eq!(parsed, spec);
        assert_eq!(size, 200);
    }

    #[test]
    fn read_header_rejects_garbage() {
        assert!(matches!(
            read_header(b"RIFF"),
            Err(WavError::Malformed(_))
        ));

        let mut wav = wrap_pcm(WavSpec::pcm16_mono(48_000), &[0u8; 10]).unwrap();
        wav[4] ^= 0xFF;
        assert!(matches!(read_header(&wav), Err(WavError::Malformed(_))));
    }
}
