/// 2-D loudness-war restraint
///
/// Already-loud material never gets compressed further. The two axes are
/// chunk loudness and crest factor:
///
/// - loud + crushed  -> expand upward, skip clipping and normalization
/// - loud + dynamic  -> hands off entirely
/// - quiet/moderate  -> full adaptive chain
///
/// On the loudness boundary itself, a dynamic chunk is treated as
/// loud-and-dynamic (pass-through wins ties); a crushed chunk at that exact
/// loudness falls through to the moderate branch.

use crate::models::DynamicsDecision;

pub const LOUD_LUFS: f32 = -12.0;
pub const COMPRESSED_CREST_DB: f32 = 13.0;

/// Makeup applied alongside upward expansion, in dB.
pub const EXPANSION_MAKEUP_DB: f32 = -0.5;

pub fn decide(lufs: f32, crest_db: f32) -> DynamicsDecision {
    if lufs >= LOUD_LUFS && crest_db >= COMPRESSED_CREST_DB {
        DynamicsDecision::DynamicLoud
    } else if lufs > LOUD_LUFS && crest_db < COMPRESSED_CREST_DB {
        DynamicsDecision::CompressedLoud {
            expansion_factor: expansion_factor(crest_db),
        }
    } else {
        DynamicsDecision::QuietModerate
    }
}

/// How hard to expand: deeper crush (lower crest) expands more.
pub fn expansion_factor(crest_db: f32) -> f32 {
    ((COMPRESSED_CREST_DB - crest_db) / 10.0).clamp(0.1, 0.5)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loud_crushed_expands() {
        match decide(-9.0, 8.5) {
            DynamicsDecision::CompressedLoud { expansion_factor } => {
                assert!((expansion_factor - 0.45).abs() < 1e-6);
            }
            other => panic!("expected CompressedLoud, got {other:?}"),
        }
    }

    #[test]
    fn test_loud_dynamic_passes_through() {
        assert_eq!(decide(-11.0, 15.0), DynamicsDecision::DynamicLoud);
    }

    #[test]
    fn test_quiet_gets_full_chain() {
        assert_eq!(decide(-20.0, 10.0), DynamicsDecision::QuietModerate);
        assert_eq!(decide(-20.0, 18.0), DynamicsDecision::QuietModerate);
    }

    #[test]
    fn test_exact_boundary_is_dynamic_loud() {
        // Both thresholds hit exactly: pass-through wins
        assert_eq!(decide(-12.0, 13.0), DynamicsDecision::DynamicLoud);
    }

    #[test]
    fn test_boundary_loudness_with_low_crest_is_moderate() {
        assert_eq!(decide(-12.0, 8.0), DynamicsDecision::QuietModerate);
    }

    #[test]
    fn test_expansion_factor_clamped() {
        assert_eq!(expansion_factor(12.9), 0.1); // barely crushed
        assert_eq!(expansion_factor(0.0), 0.5); // slammed
        assert!((expansion_factor(8.5) - 0.45).abs() < 1e-6);
    }
}
