use crate::{Real, Vec2};

/// Deterministic uniform pixel noise in `[-max_abs_px, +max_abs_px]`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PixelNoise {
    pub seed: u64,
    pub max_abs_px: Real,
}

impl PixelNoise {
    pub fn new(seed: u64, max_abs_px: Real) -> Self {
        Self { seed, max_abs_px }
    }

    /// Noise for observation `(frame_key, point_idx)`.
    pub fn sample(&self, frame_key: u64, point_idx: usize) -> Vec2 {
        let max_abs = self.max_abs_px.abs();
        if max_abs == 0.0 {
            return Vec2::zeros();
        }
        let key = mix(self.seed, frame_key, point_idx as u64);
        let u = unit(splitmix64(key));
        let v = unit(splitmix64(key ^ 0x94D0_49BB_1331_11EB));
        Vec2::new((u - 0.5) * 2.0 * max_abs, (v - 0.5) * 2.0 * max_abs)
    }
}

/// Deterministic value in `[0, 1)` for `(seed, a, b)`.
pub fn hash_unit(seed: u64, a: u64, b: u64) -> Real {
    unit(splitmix64(mix(seed, a, b)))
}

fn mix(seed: u64, a: u64, b: u64) -> u64 {
    seed ^ a.wrapping_mul(0x9E37_79B9_7F4A_7C15) ^ b.wrapping_mul(0xBF58_476D_1CE4_E5B9)
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

fn unit(x: u64) -> Real {
    (x >> 11) as Real * (1.0 / (1u64 << 53) as Real)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noise_is_deterministic_and_bounded() {
        let n = PixelNoise::new(7, 0.5);
        for f in 0..5 {
            for p in 0..50 {
                let a = n.sample(f, p);
                assert_eq!(a, n.sample(f, p));
                assert!(a.x.abs() <= 0.5 && a.y.abs() <= 0.5);
            }
        }
        assert_ne!(n.sample(0, 1), n.sample(1, 0));
        assert_eq!(PixelNoise::default().sample(3, 4), Vec2::zeros());
    }
}
