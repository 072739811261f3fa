//! Playback gain computation from measured loudness.
//!
//! Pure arithmetic: the same inputs always yield the same percent, so the
//! playback collaborator can apply it without consulting any state here.

pub const MAX_VOLUME_PERCENT: u32 = 200;

/// Computes the final playback volume percent in `[0, 200]`.
///
/// The gap between the target and the measured mean level is clamped to
/// `±max_gain_db`, converted from dB to a linear factor, and applied to
/// the slider (linear, `0.0..=2.0`). Without a measurement the slider
/// alone is scaled to the same range.
pub fn normalized_volume_percent(
    target_db: f64,
    measured_mean_db: Option<f64>,
    max_gain_db: f64,
    slider_linear: f64,
) -> u32 {
    let slider = slider_linear.clamp(0.0, 2.0);
    let normalized = match measured_mean_db {
        Some(measured) => {
            let diff = (target_db - measured).clamp(-max_gain_db.abs(), max_gain_db.abs());
            let gain_linear = 10f64.powf(diff / 20.0);
            (slider * gain_linear).clamp(0.0, 2.0)
        }
        None => slider,
    };
    let percent = (normalized * 100.0).round() as u32;
    percent.min(MAX_VOLUME_PERCENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matching_loudness_passes_slider_through() {
        assert_eq!(normalized_volume_percent(-18.0, Some(-18.0), 6.0, 1.0), 100);
        assert_eq!(normalized_volume_percent(-18.0, Some(-18.0), 6.0, 0.5), 50);
    }

    #[test]
    fn test_quiet_item_gain_is_capped() {
        // 12 dB below target, cap +6 dB: ×10^(6/20) ≈ 1.995 → 200.
        assert_eq!(normalized_volume_percent(-18.0, Some(-30.0), 6.0, 1.0), 200);
    }

    #[test]
    fn test_loud_item_is_attenuated() {
        // 6 dB above target: ×10^(-6/20) ≈ 0.501 → 50.
        assert_eq!(normalized_volume_percent(-18.0, Some(-12.0), 6.0, 1.0), 50);
    }

    #[test]
    fn test_attenuation_is_capped_too() {
        // 20 dB above target but cap 6 dB: still ≈ 0.501.
        assert_eq!(normalized_volume_percent(-18.0, Some(2.0), 6.0, 1.0), 50);
    }

    #[test]
    fn test_without_measurement_slider_scales_directly() {
        assert_eq!(normalized_volume_percent(-18.0, None, 6.0, 1.3), 130);
        assert_eq!(normalized_volume_percent(-18.0, None, 6.0, 5.0), 200);
        assert_eq!(normalized_volume_percent(-18.0, None, 6.0, -1.0), 0);
    }

    #[test]
    fn test_result_never_exceeds_bounds() {
        assert_eq!(normalized_volume_percent(-10.0, Some(-40.0), 30.0, 2.0), 200);
        assert_eq!(normalized_volume_percent(-40.0, Some(-10.0), 30.0, 0.0), 0);
    }

    #[test]
    fn test_determinism() {
        let first = normalized_volume_percent(-18.0, Some(-23.7), 6.0, 0.9);
        let second = normalized_volume_percent(-18.0, Some(-23.7), 6.0, 0.9);
        assert_eq!(first, second);
    }
}
