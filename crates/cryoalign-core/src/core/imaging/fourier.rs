use nalgebra::{Complex, Vector2};
use std::f64::consts::PI;

/// One shell of a Fourier shell correlation curve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FscShell {
    /// Shell radius in Fourier pixels.
    pub index: usize,
    /// Spatial frequency in cycles per pixel of the buffer's box.
    pub frequency: f64,
    pub correlation: f64,
}

/// Fourier transform of a real, square image of even edge length.
///
/// Only the Hermitian half plane `0 <= hx <= n/2` is stored; row `r` holds
/// `hy = r` for `r <= n/2` and `hy = r - n` above. Clipping to a smaller box keeps
/// the low frequencies, so a frequency index keeps its meaning across box sizes
/// and translations scale with the box.
#[derive(Debug, Clone, PartialEq)]
pub struct FourierImage {
    size: usize,
    data: Vec<Complex<f64>>,
}

impl FourierImage {
    pub fn zeros(size: usize) -> Self {
        debug_assert!(size % 2 == 0, "Fourier images need an even box");
        Self {
            size,
            data: vec![Complex::new(0.0, 0.0); (size / 2 + 1) * size],
        }
    }

    /// Builds an image by evaluating `f(hx, hy)` at every stored coefficient.
    pub fn from_fn(size: usize, mut f: impl FnMut(i64, i64) -> Complex<f64>) -> Self {
        let mut image = Self::zeros(size);
        let width = image.width();
        for row in 0..size {
            let hy = signed_index(row, size);
            for hx in 0..width {
                image.data[row * width + hx] = f(hx as i64, hy);
            }
        }
        image
    }

    pub fn size(&self) -> usize {
        self.size
    }

    fn width(&self) -> usize {
        self.size / 2 + 1
    }

    /// Coefficient at `(hx, hy)`, using Hermitian symmetry for `hx < 0`.
    /// Frequencies beyond Nyquist are zero.
    pub fn get(&self, hx: i64, hy: i64) -> Complex<f64> {
        let half = (self.size / 2) as i64;
        if hx.abs() > half || hy.abs() > half {
            return Complex::new(0.0, 0.0);
        }
        if hx < 0 {
            return self.get(-hx, -hy).conj();
        }
        let row = hy.rem_euclid(self.size as i64) as usize;
        self.data[row * self.width() + hx as usize]
    }

    /// Stored coefficients as `(hx, hy, value)`.
    pub fn coefficients(&self) -> impl Iterator<Item = (i64, i64, Complex<f64>)> + '_ {
        let width = self.width();
        self.data.iter().enumerate().map(move |(i, &value)| {
            let hy = signed_index(i / width, self.size);
            ((i % width) as i64, hy, value)
        })
    }

    /// The same image sampled on a `box_size` grid: lower frequencies are kept when
    /// shrinking, missing ones are zero when growing.
    pub fn clip(&self, box_size: usize) -> Self {
        if box_size == self.size {
            return self.clone();
        }
        Self::from_fn(box_size, |hx, hy| self.get(hx, hy))
    }

    /// Real-space translation by `(dx, dy)` pixels.
    pub fn shifted(&self, dx: f64, dy: f64) -> Self {
        let n = self.size as f64;
        Self::from_fn(self.size, |hx, hy| {
            let phase = -2.0 * PI * (hx as f64 * dx + hy as f64 * dy) / n;
            self.get(hx, hy) * Complex::from_polar(1.0, phase)
        })
    }

    pub fn fourier_shell_correlation(&self, other: &FourierImage) -> Vec<FscShell> {
        let shells = self.size / 2;
        let mut cross = vec![0.0; shells];
        let mut power_a = vec![0.0; shells];
        let mut power_b = vec![0.0; shells];

        for (hx, hy, a) in self.coefficients() {
            let radius = ((hx * hx + hy * hy) as f64).sqrt().round() as usize;
            if radius >= shells {
                continue;
            }
            let b = other.get(hx, hy);
            let w = hermitian_weight(hx, self.size);
            cross[radius] += w * (a * b.conj()).re;
            power_a[radius] += w * a.norm_sqr();
            power_b[radius] += w * b.norm_sqr();
        }

        (0..shells)
            .map(|index| {
                let denom = (power_a[index] * power_b[index]).sqrt();
                FscShell {
                    index,
                    frequency: index as f64 / self.size as f64,
                    correlation: if denom > 0.0 {
                        cross[index] / denom
                    } else {
                        0.0
                    },
                }
            })
            .collect()
    }

    /// Displacement `d` within `±(max_dx, max_dy)` maximizing the correlation between
    /// `self` shifted by `d` and `other`.
    ///
    /// The search is periodic over the box and the integer peak is refined to
    /// sub-pixel precision with a parabola through its neighbours.
    pub fn cross_correlation_peak(
        &self,
        other: &FourierImage,
        max_dx: usize,
        max_dy: usize,
    ) -> Vector2<f64> {
        let n = self.size;
        let width = self.width();
        let half = n / 2;
        let (mx, my) = (max_dx.min(half) as i64, max_dy.min(half) as i64);
        let (gx, gy) = (mx + 1, my + 1);
        let twiddle = &twiddle_table(n);

        let product: Vec<Complex<f64>> = self
            .coefficients()
            .map(|(hx, hy, a)| other.get(hx, hy) * a.conj() * hermitian_weight(hx, n))
            .collect();

        // Sum over hx for every candidate dx, then over hy for every dy.
        let columns: Vec<Vec<Complex<f64>>> = (-gx..=gx)
            .map(|dx| {
                (0..n)
                    .map(|row| {
                        (0..width)
                            .map(|hx| {
                                product[row * width + hx] * twiddle[phase_index(hx as i64, dx, n)]
                            })
                            .sum()
                    })
                    .collect()
            })
            .collect();

        let grid_width = (2 * gy + 1) as usize;
        let grid: Vec<f64> = columns
            .iter()
            .flat_map(|column| {
                (-gy..=gy).map(move |dy| {
                    column
                        .iter()
                        .enumerate()
                        .map(|(row, s)| {
                            let hy = signed_index(row, n);
                            (s * twiddle[phase_index(hy, dy, n)]).re
                        })
                        .sum::<f64>()
                })
            })
            .collect();
        let at = |dx: i64, dy: i64| grid[((dx + gx) as usize) * grid_width + (dy + gy) as usize];

        let (mut best, mut best_value) = ((0, 0), f64::NEG_INFINITY);
        for dx in -mx..=mx {
            for dy in -my..=my {
                let value = at(dx, dy);
                if value.total_cmp(&best_value).is_gt() {
                    best = (dx, dy);
                    best_value = value;
                }
            }
        }

        let (px, py) = best;
        let fx = parabolic_offset(at(px - 1, py), best_value, at(px + 1, py));
        let fy = parabolic_offset(at(px, py - 1), best_value, at(px, py + 1));
        Vector2::new(
            (px as f64 + fx).clamp(-(mx as f64), mx as f64),
            (py as f64 + fy).clamp(-(my as f64), my as f64),
        )
    }
}

pub(crate) fn signed_index(stored: usize, size: usize) -> i64 {
    if stored <= size / 2 {
        stored as i64
    } else {
        stored as i64 - size as i64
    }
}

/// Interior columns of a half plane stand for themselves and their conjugate twin.
pub(crate) fn hermitian_weight(hx: i64, size: usize) -> f64 {
    if hx == 0 || hx == (size / 2) as i64 {
        1.0
    } else {
        2.0
    }
}

/// `exp(2πi k / n)` for `k` in `0..n`.
pub(crate) fn twiddle_table(n: usize) -> Vec<Complex<f64>> {
    (0..n)
        .map(|k| Complex::from_polar(1.0, 2.0 * PI * k as f64 / n as f64))
        .collect()
}

pub(crate) fn phase_index(h: i64, d: i64, n: usize) -> usize {
    (h * d).rem_euclid(n as i64) as usize
}

/// Vertex offset of the parabola through three equally spaced samples, in `[-0.5, 0.5]`.
pub(crate) fn parabolic_offset(lo: f64, center: f64, hi: f64) -> f64 {
    let curvature = lo - 2.0 * center + hi;
    if curvature >= 0.0 || !curvature.is_finite() {
        return 0.0;
    }
    (0.5 * (lo - hi) / curvature).clamp(-0.5, 0.5)
}
