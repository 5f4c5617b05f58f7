//! # Resolution Ladder
//!
//! The sequence of working box sizes a particle is aligned at, from coarse to fine,
//! and the search parameters derived for each of them.
//!
//! ## Construction
//!
//! The base sizes are powers of two from 16 to 2048 with the first two stretched by
//! 3/2 (`24, 48, 64, 128, …`). Sizes below the resolution ceiling are kept and the
//! ceiling itself is appended; when that leaves a single rung, the ceiling is
//! appended a second time so there is always at least one refinement pass.
//!
//! ## Per-rung parameters
//!
//! - `angular_step = 89.999 / floor(π / (3·atan(2/box)))`
//! - `max_shift` is a fixed fraction of the box, or a full-box limit rescaled to it
//! - `band` is the half-open range of Fourier shells the scorer averages over

use std::f64::consts::PI;
use std::ops::Range;

pub const BASE_BOX_SIZES: [usize; 8] = [24, 48, 64, 128, 256, 512, 1024, 2048];

/// Smallest even integer `>= target` whose prime factors are all in `{2, 3, 5, 7}`.
pub fn good_size(target: usize) -> usize {
    let mut n = target.max(2);
    if n % 2 == 1 {
        n += 1;
    }
    loop {
        let mut rest = n;
        for p in [2, 3, 5, 7] {
            while rest % p == 0 {
                rest /= p;
            }
        }
        if rest == 1 {
            return n;
        }
        n += 2;
    }
}

/// Angular step in degrees matched to the sampling of a `box_size` box.
pub fn angular_step(box_size: usize) -> f64 {
    let steps = (PI / (3.0 * (2.0 / box_size as f64).atan())).floor().max(1.0);
    89.999 / steps
}

/// Candidates kept for a warm start that skips `strength` rungs of the full base
/// ladder, whatever the ceiling truncates it to.
pub fn warm_capacity(initial_pool: usize, strength: usize) -> usize {
    (initial_pool >> strength.min(BASE_BOX_SIZES.len() - 1)).max(1)
}

/// Largest working box needed to reach `max_resolution` Å, never above `box_size`.
pub fn resolution_ceiling(box_size: usize, pixel_size: f64, max_resolution: Option<f64>) -> usize {
    match max_resolution {
        Some(res) if res > 0.0 => {
            let cutoff = (box_size as f64 * pixel_size / res).ceil();
            if cutoff * 3.0 >= box_size as f64 {
                return box_size;
            }
            good_size(cutoff as usize * 3).min(box_size)
        }
        _ => box_size,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ShiftPolicy {
    /// `box / divisor` pixels at every rung.
    Fraction(usize),
    /// A limit in full-box pixels, rescaled to each rung.
    Absolute(usize),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BandPolicy {
    /// `[min_res_pixels, floor(0.4·box))`, as used for projection scoring.
    Projection { min_res_pixels: usize },
    /// A fixed shell range, clamped to the shells available at the rung.
    Shells { min: usize, max: usize },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RungPolicy {
    pub shift: ShiftPolicy,
    pub band: BandPolicy,
}

/// Everything the aligners need to know about one ladder step.
#[derive(Debug, Clone, PartialEq)]
pub struct Rung {
    pub index: usize,
    pub box_size: usize,
    pub full_box: usize,
    pub max_shift: usize,
    pub angular_step: f64,
    pub band: Range<usize>,
}

impl Rung {
    /// Factor converting full-box pixels into rung pixels.
    pub fn scale(&self) -> f64 {
        self.box_size as f64 / self.full_box as f64
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolutionLadder {
    full_box: usize,
    ceiling: usize,
    sizes: Vec<usize>,
}

impl ResolutionLadder {
    pub fn new(full_box: usize, ceiling: usize) -> Self {
        let ceiling = ceiling.min(full_box);
        let mut sizes: Vec<usize> = BASE_BOX_SIZES
            .iter()
            .copied()
            .filter(|&s| s < ceiling)
            .collect();
        sizes.push(ceiling);
        if sizes.len() == 1 {
            sizes.push(ceiling);
        }
        Self {
            full_box,
            ceiling,
            sizes,
        }
    }

    pub fn for_reference(full_box: usize, pixel_size: f64, max_resolution: Option<f64>) -> Self {
        Self::new(
            full_box,
            resolution_ceiling(full_box, pixel_size, max_resolution),
        )
    }

    pub fn len(&self) -> usize {
        self.sizes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty()
    }

    pub fn sizes(&self) -> &[usize] {
        &self.sizes
    }

    pub fn ceiling(&self) -> usize {
        self.ceiling
    }

    pub fn full_box(&self) -> usize {
        self.full_box
    }

    /// Whether the search stops after rung `index`. Rung 0 is never terminal.
    pub fn is_terminal(&self, index: usize) -> bool {
        index > 0 && self.sizes.get(index).is_none_or(|&s| s >= self.ceiling)
    }

    /// Starting rung for a warm start that skips `strength` rungs.
    pub fn local_start(&self, strength: usize) -> usize {
        strength.min(self.len() - 1)
    }

    /// Starting rung for a sub-tomogram local search: the last rung, never rung 0.
    pub fn final_start(&self) -> usize {
        (self.len() - 1).max(1)
    }

    pub fn rung(&self, index: usize, policy: &RungPolicy) -> Rung {
        let box_size = self.sizes[index.min(self.len() - 1)].min(self.ceiling);
        let max_shift = match policy.shift {
            ShiftPolicy::Fraction(divisor) => box_size / divisor.max(1),
            ShiftPolicy::Absolute(pixels) => pixels * box_size / self.full_box,
        };
        let shells = box_size / 2;
        let (start, end) = match policy.band {
            BandPolicy::Projection { min_res_pixels } => {
                (min_res_pixels, (box_size as f64 * 0.4) as usize)
            }
            BandPolicy::Shells { min, max } => (min, max.min(shells)),
        };
        let end = end.clamp(1, shells);
        let start = start.min(end - 1);

        Rung {
            index,
            box_size,
            full_box: self.full_box,
            max_shift,
            angular_step: angular_step(box_size),
            band: start..end,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPA: RungPolicy = RungPolicy {
        shift: ShiftPolicy::Fraction(8),
        band: BandPolicy::Projection { min_res_pixels: 4 },
    };

    #[test]
    fn good_size_picks_smooth_even_numbers() {
        assert_eq!(good_size(1), 2);
        assert_eq!(good_size(22), 24);
        assert_eq!(good_size(33), 36);
        assert_eq!(good_size(39), 40);
        assert_eq!(good_size(66), 70);
        assert_eq!(good_size(100), 100);
    }

    #[test]
    fn angular_step_shrinks_with_box_size() {
        assert!((angular_step(24) - 89.999 / 12.0).abs() < 1e-12);
        assert!((angular_step(64) - 89.999 / 33.0).abs() < 1e-12);
        assert!(angular_step(128) < angular_step(64));
    }

    #[test]
    fn ceiling_follows_requested_resolution() {
        assert_eq!(resolution_ceiling(128, 2.0, Some(20.0)), 40);
        assert_eq!(resolution_ceiling(128, 2.0, None), 128);
        assert_eq!(resolution_ceiling(64, 1.0, Some(1.0)), 64);
    }

    #[test]
    fn vanishing_resolution_falls_back_to_the_full_box() {
        assert_eq!(resolution_ceiling(64, 2.0, Some(1e-300)), 64);
        assert_eq!(resolution_ceiling(64, 2.0, Some(f64::MIN_POSITIVE)), 64);
        assert_eq!(resolution_ceiling(64, 2.0, Some(f64::NAN)), 64);
    }

    #[test]
    fn warm_capacity_halves_per_skipped_base_rung() {
        assert_eq!(warm_capacity(32, 0), 32);
        assert_eq!(warm_capacity(32, 2), 8);
        assert_eq!(warm_capacity(32, 7), 1);
        assert_eq!(warm_capacity(32, 50), 1);
    }

    #[test]
    fn ladder_ends_exactly_at_the_ceiling() {
        for (full, ceiling) in [(64, 64), (128, 40), (256, 256), (100, 100), (512, 70)] {
            let ladder = ResolutionLadder::new(full, ceiling);

            assert_eq!(*ladder.sizes().last().unwrap(), ceiling);
            assert!(ladder.len() >= 2);
            assert!(ladder.len() <= BASE_BOX_SIZES.len() + 1);
            for pair in ladder.sizes()[..ladder.len() - 1].windows(2) {
                assert!(pair[0] < pair[1]);
            }
        }
    }

    #[test]
    fn tiny_ceiling_still_gets_a_refinement_rung() {
        let ladder = ResolutionLadder::new(16, 16);

        assert_eq!(ladder.sizes(), &[16, 16]);
        assert!(!ladder.is_terminal(0));
        assert!(ladder.is_terminal(1));
    }

    #[test]
    fn terminal_rung_is_the_first_at_the_ceiling_after_rung_zero() {
        let ladder = ResolutionLadder::new(128, 64);

        assert_eq!(ladder.sizes(), &[24, 48, 64]);
        let terminal: Vec<bool> = (0..ladder.len()).map(|i| ladder.is_terminal(i)).collect();
        assert_eq!(terminal, vec![false, false, true]);
    }

    #[test]
    fn start_rungs_are_clamped_to_the_ladder() {
        let ladder = ResolutionLadder::new(128, 64);

        assert_eq!(ladder.local_start(1), 1);
        assert_eq!(ladder.local_start(9), 2);
        assert_eq!(ladder.final_start(), 2);
        assert_eq!(ResolutionLadder::new(16, 16).final_start(), 1);
    }

    #[test]
    fn rung_parameters_follow_the_box() {
        let ladder = ResolutionLadder::new(128, 128);

        let rung = ladder.rung(2, &SPA);

        assert_eq!(rung.box_size, 64);
        assert_eq!(rung.max_shift, 8);
        assert_eq!(rung.band, 4..25);
        assert!((rung.scale() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn absolute_shift_is_rescaled_and_shell_band_is_clamped() {
        let ladder = ResolutionLadder::new(128, 128);
        let policy = RungPolicy {
            shift: ShiftPolicy::Absolute(20),
            band: BandPolicy::Shells { min: 3, max: 40 },
        };

        let coarse = ladder.rung(0, &policy);
        let fine = ladder.rung(3, &policy);

        assert_eq!(coarse.max_shift, 3);
        assert_eq!(coarse.band, 3..12);
        assert_eq!(fine.max_shift, 20);
        assert_eq!(fine.band, 3..40);
    }

    #[test]
    fn degenerate_band_keeps_one_shell() {
        let ladder = ResolutionLadder::new(16, 16);
        let policy = RungPolicy {
            shift: ShiftPolicy::Fraction(6),
            band: BandPolicy::Shells { min: 12, max: 20 },
        };

        let rung = ladder.rung(0, &policy);

        assert_eq!(rung.band, 7..8);
    }
}
