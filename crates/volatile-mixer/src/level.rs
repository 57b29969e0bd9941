//! Conversion between driver volume and user-facing level
//!
//! The driver side is expressed in `[0, max_volume]`, the user side in
//! `[0, 100]`. Both directions scale, round to nearest and saturate at the
//! destination bounds.

/// Highest user-facing level
pub const MAX_LEVEL: u32 = 100;

/// Default soft ceiling for driver volume
pub const DEFAULT_MAX_VOLUME: u32 = 100;

/// Maps levels onto a driver volume range capped at `max_volume`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelMapper {
    max_volume: u32,
}

impl LevelMapper {
    /// Create a mapper; `max_volume` is clamped to `[0, 100]`
    pub fn new(max_volume: u32) -> Self {
        Self {
            max_volume: max_volume.min(MAX_LEVEL),
        }
    }

    pub fn max_volume(&self) -> u32 {
        self.max_volume
    }

    /// Convert a level (any integer) to a driver volume in `[0, max_volume]`
    pub fn level_to_volume(&self, level: i64) -> u32 {
        if self.max_volume == 0 {
            return 0;
        }

        let volume = level as f64 * self.max_volume as f64 / MAX_LEVEL as f64;
        saturate(volume, self.max_volume)
    }

    /// Convert a driver volume (any integer) to a level in `[0, 100]`
    pub fn volume_to_level(&self, volume: i64) -> u32 {
        if self.max_volume == 0 {
            return 0;
        }

        let level = volume as f64 * MAX_LEVEL as f64 / self.max_volume as f64;
        saturate(level, MAX_LEVEL)
    }
}

impl Default for LevelMapper {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_VOLUME)
    }
}

fn saturate(value: f64, max: u32) -> u32 {
    value.round().clamp(0.0, max as f64) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_at_full_scale() {
        let mapper = LevelMapper::default();
        for level in 0..=100 {
            assert_eq!(mapper.level_to_volume(level), level as u32);
            assert_eq!(mapper.volume_to_level(level), level as u32);
        }
        assert_eq!(mapper.level_to_volume(50), 50);
    }

    #[test]
    fn test_reduced_ceiling_endpoints() {
        let mapper = LevelMapper::new(90);
        assert_eq!(mapper.level_to_volume(100), 90);
        assert_eq!(mapper.volume_to_level(90), 100);
        assert_eq!(mapper.level_to_volume(0), 0);
        assert_eq!(mapper.volume_to_level(0), 0);
    }

    #[test]
    fn test_saturates_out_of_range() {
        let mapper = LevelMapper::new(80);
        assert_eq!(mapper.level_to_volume(150), 80);
        assert_eq!(mapper.level_to_volume(-20), 0);
        assert_eq!(mapper.volume_to_level(500), 100);
        assert_eq!(mapper.volume_to_level(-1), 0);
        assert_eq!(mapper.level_to_volume(i64::MAX), 80);
        assert_eq!(mapper.volume_to_level(i64::MIN), 0);
    }

    #[test]
    fn test_volume_round_trip_is_exact() {
        for max in 1..=100 {
            let mapper = LevelMapper::new(max);
            for volume in 0..=max {
                let level = mapper.volume_to_level(volume as i64);
                assert_eq!(
                    mapper.level_to_volume(level as i64),
                    volume,
                    "max={} volume={}",
                    max,
                    volume
                );
            }
        }
    }

    #[test]
    fn test_level_round_trip_within_one_volume_step() {
        for max in 1..=100u32 {
            let mapper = LevelMapper::new(max);
            let step = MAX_LEVEL as f64 / max as f64;
            for level in 0..=100i64 {
                let back = mapper.volume_to_level(mapper.level_to_volume(level) as i64);
                let diff = (back as f64 - level as f64).abs();
                assert!(diff <= step / 2.0 + 1.0, "max={} level={} back={}", max, level, back);
            }
        }
    }

    #[test]
    fn test_repeated_mapping_is_idempotent() {
        let mapper = LevelMapper::new(37);
        for level in 0..=100 {
            let once = mapper.volume_to_level(mapper.level_to_volume(level) as i64);
            let twice = mapper.volume_to_level(mapper.level_to_volume(once as i64) as i64);
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn test_zero_ceiling_maps_everything_to_zero() {
        let mapper = LevelMapper::new(0);
        assert_eq!(mapper.level_to_volume(100), 0);
        assert_eq!(mapper.volume_to_level(0), 0);
        assert_eq!(mapper.volume_to_level(42), 0);
    }

    #[test]
    fn test_ceiling_clamped() {
        assert_eq!(LevelMapper::new(250).max_volume(), 100);
    }
}
