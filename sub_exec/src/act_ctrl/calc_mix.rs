//! Axis mixing calculations
//!
//! Maps raw stick deflections onto per-thruster duties. All maps use integer
//! truncation toward zero, so a centred stick always lands on the neutral
//! duty of 50.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// Internal
use super::{AXIS_RAW_MAX, AXIS_RAW_MIN, DUTY_MAX, DUTY_MIN};
use util::maths::lin_map_int;

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Surge duty for the horizontal pair.
///
/// The horizontal thrusters are mounted reversed, so the raw range maps onto
/// the inverted duty range: full stick forward (most negative raw value)
/// gives full duty.
pub fn fwdbk_duty(raw: i64) -> u8 {
    lin_map_int((AXIS_RAW_MIN, AXIS_RAW_MAX), (DUTY_MAX, DUTY_MIN), raw) as u8
}

/// Heave duty for the vertical pair.
pub fn updwn_duty(raw: i64) -> u8 {
    lin_map_int((AXIS_RAW_MIN, AXIS_RAW_MAX), (DUTY_MIN, DUTY_MAX), raw) as u8
}

/// Differential duty split for a rotation axis (yaw or roll).
///
/// The raw deflection is first mapped to a 0-100 rate, then split around
/// neutral: one side takes half the offset from 50, the other mirrors it so
/// the pair always sums to 100. A centred stick gives (50, 50).
pub fn differential_duty(raw: i64) -> (u8, u8) {
    let rate = lin_map_int((AXIS_RAW_MIN, AXIS_RAW_MAX), (DUTY_MIN, DUTY_MAX), raw);

    let a = 50 + (rate - 50) / 2;
    let b = 100 - a;

    (a as u8, b as u8)
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_fwdbk_is_inverted() {
        assert_eq!(fwdbk_duty(AXIS_RAW_MIN), 100);
        assert_eq!(fwdbk_duty(AXIS_RAW_MAX), 0);
        assert_eq!(fwdbk_duty(0), 50);
    }

    #[test]
    fn test_updwn_endpoints() {
        assert_eq!(updwn_duty(AXIS_RAW_MIN), 0);
        assert_eq!(updwn_duty(AXIS_RAW_MAX), 100);
        assert_eq!(updwn_duty(0), 50);
    }

    #[test]
    fn test_differential_neutral_tie() {
        assert_eq!(differential_duty(0), (50, 50));
    }

    #[test]
    fn test_differential_endpoints() {
        assert_eq!(differential_duty(AXIS_RAW_MIN), (25, 75));
        assert_eq!(differential_duty(AXIS_RAW_MAX), (75, 25));
    }

    #[test]
    fn test_differential_always_sums_to_100() {
        for raw in (AXIS_RAW_MIN..=AXIS_RAW_MAX).step_by(517) {
            let (a, b) = differential_duty(raw);
            assert_eq!(a as i64 + b as i64, 100, "raw = {}", raw);
            assert!(a as i64 >= 25 && a as i64 <= 75);
        }
    }

    #[test]
    fn test_differential_symmetry() {
        // Mirrored deflections swap the pair
        let (a_pos, b_pos) = differential_duty(16000);
        let (a_neg, b_neg) = differential_duty(-16000);

        assert!(a_pos > 50 && b_pos < 50);
        assert!(a_neg < 50 && b_neg > 50);
    }
}
