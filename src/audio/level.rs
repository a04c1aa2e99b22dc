//! Input level metering for the recording indicator.
//!
//! The capture thread reduces each chunk to an RMS level in dBFS
//! ([`rms_dbfs`]); the recorder's amplitude poll maps that reading onto a
//! `[0.0, 1.0]` display level with [`normalize_level`].  Neither value has
//! any influence on what is captured.

/// Level reported for digital silence.
pub const SILENCE_DBFS: f32 = -160.0;

/// RMS level of `samples` in dBFS, clamped to `[SILENCE_DBFS, 0.0]`.
///
/// ```rust
/// use mewsage::audio::level::{rms_dbfs, SILENCE_DBFS};
///
/// assert_eq!(rms_dbfs(&[]), SILENCE_DBFS);
/// assert!(rms_dbfs(&[1.0; 64]).abs() < 1e-4); // full scale → 0 dBFS
/// ```
pub fn rms_dbfs(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return SILENCE_DBFS;
    }
    let mean_sq = samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32;
    let rms = mean_sq.sqrt();
    if rms <= 0.0 {
        return SILENCE_DBFS;
    }
    (20.0 * rms.log10()).clamp(SILENCE_DBFS, 0.0)
}

/// Map a dBFS reading onto `[0.0, 1.0]`.
///
/// `floor_db` (negative) maps to `0.0`, `0 dBFS` maps to `1.0`, linear in
/// between.  A non-negative floor is treated as `-60 dB`.
pub fn normalize_level(dbfs: f32, floor_db: f32) -> f32 {
    let floor = if floor_db < 0.0 { floor_db } else { -60.0 };
    if !dbfs.is_finite() {
        return 0.0;
    }
    ((dbfs - floor) / -floor).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_is_floor() {
        assert_eq!(rms_dbfs(&[0.0; 128]), SILENCE_DBFS);
    }

    #[test]
    fn half_scale_is_about_minus_six_db() {
        let db = rms_dbfs(&[0.5; 128]);
        assert!((db + 6.02).abs() < 0.01, "db = {db}");
    }

    #[test]
    fn normalize_endpoints() {
        assert_eq!(normalize_level(0.0, -60.0), 1.0);
        assert_eq!(normalize_level(-60.0, -60.0), 0.0);
        assert_eq!(normalize_level(-160.0, -60.0), 0.0);
        assert!((normalize_level(-30.0, -60.0) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn normalize_clamps_and_handles_nan() {
        assert_eq!(normalize_level(6.0, -60.0), 1.0);
        assert_eq!(normalize_level(f32::NAN, -60.0), 0.0);
        assert!((normalize_level(-30.0, 0.0) - 0.5).abs() < 1e-6);
    }
}
