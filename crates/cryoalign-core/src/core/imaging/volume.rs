use super::fourier::{hermitian_weight, parabolic_offset, phase_index, signed_index, twiddle_table};
use nalgebra::{Complex, Vector3};
use std::f64::consts::PI;
use std::ops::Range;

const POPULATED_POWER: f64 = 1e-20;

/// Fourier transform of a real cubic volume of even edge length.
///
/// Storage mirrors [`super::FourierImage`]: half volume `0 <= hx <= n/2`, full `hy`
/// and `hz` ranges with negative frequencies stored above `n/2`.
#[derive(Debug, Clone, PartialEq)]
pub struct FourierVolume {
    size: usize,
    data: Vec<Complex<f64>>,
}

impl FourierVolume {
    pub fn zeros(size: usize) -> Self {
        debug_assert!(size % 2 == 0, "Fourier volumes need an even box");
        Self {
            size,
            data: vec![Complex::new(0.0, 0.0); (size / 2 + 1) * size * size],
        }
    }

    pub fn from_fn(size: usize, mut f: impl FnMut(i64, i64, i64) -> Complex<f64>) -> Self {
        let mut volume = Self::zeros(size);
        let width = volume.width();
        for plane in 0..size {
            let hz = signed_index(plane, size);
            for row in 0..size {
                let hy = signed_index(row, size);
                let offset = (plane * size + row) * width;
                for hx in 0..width {
                    volume.data[offset + hx] = f(hx as i64, hy, hz);
                }
            }
        }
        volume
    }

    pub fn size(&self) -> usize {
        self.size
    }

    fn width(&self) -> usize {
        self.size / 2 + 1
    }

    pub fn get(&self, hx: i64, hy: i64, hz: i64) -> Complex<f64> {
        let half = (self.size / 2) as i64;
        if hx.abs() > half || hy.abs() > half || hz.abs() > half {
            return Complex::new(0.0, 0.0);
        }
        if hx < 0 {
            return self.get(-hx, -hy, -hz).conj();
        }
        let n = self.size as i64;
        let plane = hz.rem_euclid(n) as usize;
        let row = hy.rem_euclid(n) as usize;
        self.data[(plane * self.size + row) * self.width() + hx as usize]
    }

    pub fn coefficients(&self) -> impl Iterator<Item = (i64, i64, i64, Complex<f64>)> + '_ {
        let width = self.width();
        let size = self.size;
        self.data.iter().enumerate().map(move |(i, &value)| {
            let hx = (i % width) as i64;
            let hy = signed_index((i / width) % size, size);
            let hz = signed_index(i / (width * size), size);
            (hx, hy, hz, value)
        })
    }

    pub fn clip(&self, box_size: usize) -> Self {
        if box_size == self.size {
            return self.clone();
        }
        Self::from_fn(box_size, |hx, hy, hz| self.get(hx, hy, hz))
    }

    pub fn shifted(&self, dx: f64, dy: f64, dz: f64) -> Self {
        let n = self.size as f64;
        Self::from_fn(self.size, |hx, hy, hz| {
            let phase = -2.0 * PI * (hx as f64 * dx + hy as f64 * dy + hz as f64 * dz) / n;
            self.get(hx, hy, hz) * Complex::from_polar(1.0, phase)
        })
    }

    /// Zeroes the coefficients outside a single-axis tilt series of `±max_tilt`
    /// degrees about y, the missing wedge of a tomographic reconstruction.
    pub fn with_missing_wedge(&self, max_tilt: f64) -> Self {
        let slope = max_tilt.to_radians().tan();
        Self::from_fn(self.size, |hx, hy, hz| {
            if (hz as f64).abs() <= (hx as f64).abs() * slope + 1e-9 || hz == 0 {
                self.get(hx, hy, hz)
            } else {
                Complex::new(0.0, 0.0)
            }
        })
    }

    /// Periodic 3D analogue of [`super::FourierImage::cross_correlation_peak`].
    pub fn cross_correlation_peak(&self, other: &FourierVolume, max_shift: usize) -> Vector3<f64> {
        let n = self.size;
        let width = self.width();
        let m = max_shift.min(n / 2) as i64;
        let g = m + 1;
        let span = (2 * g + 1) as usize;
        let twiddle = &twiddle_table(n);

        let product: Vec<Complex<f64>> = self
            .coefficients()
            .map(|(hx, hy, hz, a)| other.get(hx, hy, hz) * a.conj() * hermitian_weight(hx, n))
            .collect();

        // Separable evaluation: collapse hx, then hy, then hz.
        let mut over_x = vec![Complex::new(0.0, 0.0); span * n * n];
        for (di, dx) in (-g..=g).enumerate() {
            for line in 0..n * n {
                over_x[di * n * n + line] = (0..width)
                    .map(|hx| product[line * width + hx] * twiddle[phase_index(hx as i64, dx, n)])
                    .sum();
            }
        }

        let mut over_y = vec![Complex::new(0.0, 0.0); span * span * n];
        for di in 0..span {
            for (dj, dy) in (-g..=g).enumerate() {
                for plane in 0..n {
                    over_y[(di * span + dj) * n + plane] = (0..n)
                        .map(|row| {
                            let hy = signed_index(row, n);
                            over_x[di * n * n + plane * n + row] * twiddle[phase_index(hy, dy, n)]
                        })
                        .sum();
                }
            }
        }

        let mut grid = vec![0.0; span * span * span];
        for di in 0..span {
            for dj in 0..span {
                for (dk, dz) in (-g..=g).enumerate() {
                    grid[(di * span + dj) * span + dk] = (0..n)
                        .map(|plane| {
                            let hz = signed_index(plane, n);
                            (over_y[(di * span + dj) * n + plane]
                                * twiddle[phase_index(hz, dz, n)])
                            .re
                        })
                        .sum();
                }
            }
        }
        let at = |dx: i64, dy: i64, dz: i64| {
            grid[(((dx + g) as usize) * span + (dy + g) as usize) * span + (dz + g) as usize]
        };

        let (mut best, mut best_value) = ((0, 0, 0), f64::NEG_INFINITY);
        for dx in -m..=m {
            for dy in -m..=m {
                for dz in -m..=m {
                    let value = at(dx, dy, dz);
                    if value.total_cmp(&best_value).is_gt() {
                        best = (dx, dy, dz);
                        best_value = value;
                    }
                }
            }
        }

        let (px, py, pz) = best;
        let limit = m as f64;
        let refine = |lo: f64, hi: f64, p: i64| {
            (p as f64 + parabolic_offset(lo, best_value, hi)).clamp(-limit, limit)
        };
        Vector3::new(
            refine(at(px - 1, py, pz), at(px + 1, py, pz), px),
            refine(at(px, py - 1, pz), at(px, py + 1, pz), py),
            refine(at(px, py, pz - 1), at(px, py, pz + 1), pz),
        )
    }

    /// Normalized correlation over the voxels with shell radius in `band` that are
    /// populated in both volumes, so missing-wedge regions do not count against a fit.
    pub fn normalized_correlation(&self, other: &FourierVolume, band: Range<usize>) -> f64 {
        let mut cross = 0.0;
        let mut power_a = 0.0;
        let mut power_b = 0.0;

        for (hx, hy, hz, a) in self.coefficients() {
            let radius = ((hx * hx + hy * hy + hz * hz) as f64).sqrt().round() as usize;
            if !band.contains(&radius) {
                continue;
            }
            let b = other.get(hx, hy, hz);
            if a.norm_sqr() <= POPULATED_POWER || b.norm_sqr() <= POPULATED_POWER {
                continue;
            }
            let w = hermitian_weight(hx, self.size);
            cross += w * (a * b.conj()).re;
            power_a += w * a.norm_sqr();
            power_b += w * b.norm_sqr();
        }

        let denom = (power_a * power_b).sqrt();
        if denom > 0.0 { cross / denom } else { 0.0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blob_volume(size: usize, centers: &[[f64; 3]]) -> FourierVolume {
        let n = size as f64;
        FourierVolume::from_fn(size, |hx, hy, hz| {
            let k2 = (hx * hx + hy * hy + hz * hz) as f64;
            let envelope = (-2.0 * PI * PI * 2.25 * k2 / (n * n)).exp();
            centers
                .iter()
                .map(|c| {
                    let phase =
                        -2.0 * PI * (hx as f64 * c[0] + hy as f64 * c[1] + hz as f64 * c[2]) / n;
                    Complex::from_polar(envelope, phase)
                })
                .sum()
        })
    }

    #[test]
    fn hermitian_lookup_matches_stored_half() {
        let volume = blob_volume(12, &[[1.0, -2.0, 0.5]]);

        assert!((volume.get(2, 1, -3) - volume.get(-2, -1, 3).conj()).norm() < 1e-12);
    }

    #[test]
    fn clip_preserves_low_frequencies() {
        let volume = blob_volume(16, &[[2.0, 0.0, -1.0], [-3.0, 1.0, 2.0]]);

        let clipped = volume.clip(8);

        assert_eq!(clipped.size(), 8);
        assert_eq!(clipped.get(2, -3, 1), volume.get(2, -3, 1));
    }

    #[test]
    fn cross_correlation_recovers_shift() {
        let volume = blob_volume(16, &[[2.0, 0.0, -1.0], [-3.0, 1.0, 2.0]]);
        let moved = volume.shifted(2.0, -1.0, 1.0);

        let peak = volume.cross_correlation_peak(&moved, 3);

        assert!((peak - Vector3::new(2.0, -1.0, 1.0)).norm() < 0.2, "peak {:?}", peak);
    }

    #[test]
    fn self_correlation_is_one_even_with_a_wedge() {
        let volume = blob_volume(16, &[[2.0, 0.0, -1.0], [-3.0, 1.0, 2.0]]);
        let wedged = volume.with_missing_wedge(60.0);

        let score = wedged.normalized_correlation(&volume, 2..6);

        assert!((score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn missing_wedge_removes_steep_coefficients() {
        let volume = blob_volume(16, &[[0.0, 0.0, 0.0]]);

        let wedged = volume.with_missing_wedge(45.0);

        assert_eq!(wedged.get(1, 0, 4), Complex::new(0.0, 0.0));
        assert_eq!(wedged.get(4, 0, 1), volume.get(4, 0, 1));
    }
}
