//! Sample conversion between the capture callback and the on-disk payload.
//!
//! cpal delivers interleaved `f32` frames at the device's native rate.  The
//! recording file must hold **mono PCM-16 little-endian** at the configured
//! rate, so every chunk goes through:
//!
//! 1. [`downmix_to_mono`]: average interleaved channels.
//! 2. [`LinearResampler`]: convert the device rate to the target rate,
//!    carrying its position across chunk boundaries.
//! 3. [`f32_to_pcm16_le`]: quantise to signed 16-bit little-endian bytes.

// ---------------------------------------------------------------------------
// downmix_to_mono
// ---------------------------------------------------------------------------

/// Mix interleaved multi-channel audio down to mono by averaging all channels.
///
/// * `channels == 1` returns the input unchanged.
/// * `channels == 0` returns an empty vector.
///
/// ```rust
/// use mewsage::audio::pcm::downmix_to_mono;
///
/// let stereo = vec![0.5_f32, -0.5, 0.2, 0.4]; // L R L R
/// let mono = downmix_to_mono(&stereo, 2);
/// assert_eq!(mono.len(), 2);
/// assert!((mono[1] - 0.3).abs() < 1e-6);
/// ```
pub fn downmix_to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    match channels {
        0 => Vec::new(),
        1 => samples.to_vec(),
        n => {
            let n = n as usize;
            samples
                .chunks_exact(n)
                .map(|frame| frame.iter().sum::<f32>() / n as f32)
                .collect()
        }
    }
}

// ---------------------------------------------------------------------------
// LinearResampler
// ---------------------------------------------------------------------------

/// Streaming linear-interpolation resampler from `from_rate` to `to_rate` Hz.
///
/// cpal hands over audio in callback-sized chunks, so the resampler keeps
/// its position in the source stream and the last sample of the previous
/// chunk.  Output sample `k` always sits at source position
/// `k * from_rate / to_rate`, whatever the chunk boundaries were, and after
/// `n` input samples the total output is within one sample of
/// `n * to_rate / from_rate`.
///
/// Equal rates pass samples through unchanged.
///
/// ```rust
/// use mewsage::audio::pcm::LinearResampler;
///
/// let mut resampler = LinearResampler::new(44_100, 48_000);
/// let mut total = 0;
/// for _ in 0..100 {
///     total += resampler.process(&[0.25_f32; 441]).len(); // 10 ms @ 44.1 kHz
/// }
/// assert!(total.abs_diff(48_000) <= 1);              // 1 s @ 48 kHz
/// ```
#[derive(Debug, Clone)]
pub struct LinearResampler {
    from_rate: u32,
    to_rate: u32,
    /// Source samples consumed so far.
    consumed: u64,
    /// Output samples emitted so far.
    produced: u64,
    /// Source sample `consumed - 1`, needed to interpolate across a chunk seam.
    last: f32,
}

impl LinearResampler {
    pub fn new(from_rate: u32, to_rate: u32) -> Self {
        Self {
            from_rate,
            to_rate,
            consumed: 0,
            produced: 0,
            last: 0.0,
        }
    }

    /// Rate of the samples fed to [`process`](Self::process).
    pub fn from_rate(&self) -> u32 {
        self.from_rate
    }

    fn is_passthrough(&self) -> bool {
        self.from_rate == self.to_rate || self.from_rate == 0 || self.to_rate == 0
    }

    /// Resample the next chunk of mono `input`.
    pub fn process(&mut self, input: &[f32]) -> Vec<f32> {
        if self.is_passthrough() {
            return input.to_vec();
        }
        if input.is_empty() {
            return Vec::new();
        }

        let from = self.from_rate as u64;
        let to = self.to_rate as u64;
        let base = self.consumed;
        let end = base + input.len() as u64;
        let last = self.last;
        let sample_at = |i: u64| if i < base { last } else { input[(i - base) as usize] };

        let mut output = Vec::with_capacity((input.len() as u64 * to / from + 1) as usize);
        let mut produced = self.produced;
        loop {
            let pos = produced * from;
            let idx = pos / to;
            // Wait for the right-hand neighbour before emitting.
            if idx + 1 >= end {
                break;
            }
            let frac = (pos % to) as f32 / to as f32;
            let (a, b) = (sample_at(idx), sample_at(idx + 1));
            output.push(a + (b - a) * frac);
            produced += 1;
        }

        self.produced = produced;
        self.consumed = end;
        self.last = input[input.len() - 1];
        output
    }
}

// ---------------------------------------------------------------------------
// f32_to_pcm16_le
// ---------------------------------------------------------------------------

/// Quantise `[-1.0, 1.0]` floats to signed 16-bit little-endian bytes.
///
/// Out-of-range input is clamped.  Output length is `2 × samples.len()`.
pub fn f32_to_pcm16_le(samples: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for &s in samples {
        let v = (s.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16;
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // ---- downmix_to_mono ---------------------------------------------------

    #[test]
    fn downmix_already_mono() {
        let input = vec![0.1_f32, 0.2, 0.3];
        assert_eq!(downmix_to_mono(&input, 1), input);
    }

    #[test]
    fn downmix_two_channel() {
        let out = downmix_to_mono(&[1.0_f32, -1.0, 0.5, 0.5], 2);
        assert_eq!(out.len(), 2);
        assert!((out[0] - 0.0).abs() < 1e-6);
        assert!((out[1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn downmix_zero_channels() {
        assert!(downmix_to_mono(&[1.0_f32, 2.0], 0).is_empty());
    }

    #[test]
    fn downmix_drops_partial_frame() {
        let out = downmix_to_mono(&[0.2_f32, 0.4, 0.9], 2);
        assert_eq!(out.len(), 1);
    }

    // ---- LinearResampler ---------------------------------------------------

    fn feed_in_chunks(resampler: &mut LinearResampler, input: &[f32], sizes: &[usize]) -> Vec<f32> {
        let mut out = Vec::new();
        let mut rest = input;
        let mut i = 0;
        while !rest.is_empty() {
            let n = sizes[i % sizes.len()].min(rest.len());
            out.extend(resampler.process(&rest[..n]));
            rest = &rest[n..];
            i += 1;
        }
        out
    }

    #[test]
    fn resample_same_rate_is_noop() {
        let input: Vec<f32> = (0..160).map(|i| i as f32 / 160.0).collect();
        assert_eq!(LinearResampler::new(48_000, 48_000).process(&input), input);
    }

    #[test]
    fn resample_empty_input() {
        assert!(LinearResampler::new(44_100, 48_000).process(&[]).is_empty());
    }

    #[test]
    fn resample_44100_to_48000_one_second() {
        let out = LinearResampler::new(44_100, 48_000).process(&vec![0.0_f32; 44_100]);
        assert!(out.len().abs_diff(48_000) <= 1, "got {}", out.len());
    }

    #[test]
    fn resample_96k_down_to_48k() {
        let out = LinearResampler::new(96_000, 48_000).process(&vec![0.5_f32; 960]);
        assert_eq!(out.len(), 480);
    }

    #[test]
    fn resample_preserves_dc_level() {
        let out = LinearResampler::new(44_100, 48_000).process(&vec![0.5_f32; 441]);
        for &s in &out {
            assert!((s - 0.5).abs() < 1e-5, "amplitude drift: {s}");
        }
    }

    #[test]
    fn chunked_output_length_tracks_the_rate_ratio() {
        // 10 s of 44.1 kHz audio in odd callback sizes.
        let frames = 441_000;
        let input = vec![0.1_f32; frames];
        let mut resampler = LinearResampler::new(44_100, 48_000);
        let out = feed_in_chunks(&mut resampler, &input, &[512, 441, 1, 1023, 7, 480]);
        let expected = frames as u64 * 48_000 / 44_100;
        assert!(
            (out.len() as u64).abs_diff(expected) <= 1,
            "got {} samples, expected about {expected}",
            out.len()
        );
    }

    #[test]
    fn chunked_downsampling_length_tracks_the_rate_ratio() {
        let frames = 96_000 * 3;
        let input = vec![0.0_f32; frames];
        let mut resampler = LinearResampler::new(96_000, 48_000);
        let out = feed_in_chunks(&mut resampler, &input, &[333, 1, 2048, 97]);
        assert!((out.len() as u64).abs_diff(48_000 * 3) <= 1, "got {}", out.len());
    }

    #[test]
    fn chunk_boundaries_do_not_change_the_signal() {
        // A ramp resampled in one piece and in ragged chunks must match
        // sample for sample: no repeated or dropped samples at the seams.
        let input: Vec<f32> = (0..4_410).map(|i| i as f32 / 4_410.0).collect();
        let whole = LinearResampler::new(44_100, 48_000).process(&input);
        let mut resampler = LinearResampler::new(44_100, 48_000);
        let chunked = feed_in_chunks(&mut resampler, &input, &[100, 3, 257, 1]);

        assert_eq!(whole.len(), chunked.len());
        for (i, (a, b)) in whole.iter().zip(&chunked).enumerate() {
            assert!((a - b).abs() < 1e-6, "sample {i}: {a} vs {b}");
        }
        // Strictly increasing input stays strictly increasing.
        assert!(chunked.windows(2).all(|w| w[1] > w[0]));
    }

    // ---- PCM-16 ------------------------------------------------------------

    #[test]
    fn pcm16_extremes_and_zero() {
        let bytes = f32_to_pcm16_le(&[0.0, 1.0, -1.0, 2.0]);
        assert_eq!(bytes.len(), 8);
        assert_eq!(i16::from_le_bytes([bytes[0], bytes[1]]), 0);
        assert_eq!(i16::from_le_bytes([bytes[2], bytes[3]]), i16::MAX);
        assert_eq!(i16::from_le_bytes([bytes[4], bytes[5]]), -i16::MAX);
        // clamped
        assert_eq!(i16::from_le_bytes([bytes[6], bytes[7]]), i16::MAX);
    }
}
