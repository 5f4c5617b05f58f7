//! One-dimensional CTF amplitude envelope used to weight FSC curves.
//!
//! Only the rotationally averaged amplitude `|CTF(s)|` is modelled. The weight
//! curve used by the scorer flattens everything below the first falloff of the
//! envelope, so the low-frequency rise of the CTF does not suppress the shells
//! that carry most of the alignment signal.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use thiserror::Error;

/// B-factor applied when deriving scorer weights, in Å².
pub const WEIGHTING_BFACTOR: f64 = 10.0;

#[derive(Debug, Error, PartialEq, Clone)]
pub enum CtfWeightError {
    #[error("CTF parameter '{name}' has invalid value {value}")]
    InvalidParameter { name: &'static str, value: f64 },
    #[error("CTF amplitude curve has no falloff within {points} points")]
    NoFalloff { points: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CtfParams {
    /// Underfocus in µm.
    pub defocus: f64,
    /// Accelerating voltage in kV.
    pub voltage: f64,
    /// Spherical aberration in mm.
    pub cs: f64,
    /// Amplitude contrast in percent.
    pub ampcont: f64,
    /// Envelope B-factor in Å².
    #[serde(default)]
    pub bfactor: f64,
}

impl CtfParams {
    /// Relativistic electron wavelength in Å.
    pub fn wavelength(&self) -> f64 {
        let volts = self.voltage * 1000.0;
        12.2643247 / (volts * (1.0 + volts * 0.978466e-6)).sqrt()
    }

    pub fn with_bfactor(mut self, bfactor: f64) -> Self {
        self.bfactor = bfactor;
        self
    }

    fn validate(&self) -> Result<(), CtfWeightError> {
        let checks = [
            ("defocus", self.defocus, self.defocus.is_finite()),
            ("voltage", self.voltage, self.voltage.is_finite() && self.voltage > 0.0),
            ("cs", self.cs, self.cs.is_finite() && self.cs >= 0.0),
            (
                "ampcont",
                self.ampcont,
                self.ampcont.is_finite() && (0.0..=100.0).contains(&self.ampcont),
            ),
            ("bfactor", self.bfactor, self.bfactor.is_finite()),
        ];
        match checks.into_iter().find(|(_, _, ok)| !ok) {
            Some((name, value, _)) => Err(CtfWeightError::InvalidParameter { name, value }),
            None => Ok(()),
        }
    }

    /// `|CTF|` sampled at `s = i·ds` for `i` in `0..n`, `ds` in 1/Å.
    pub fn amplitude_curve(&self, n: usize, ds: f64) -> Vec<f64> {
        let lambda = self.wavelength();
        let defocus = self.defocus * 1e4;
        let cs = self.cs * 1e7;
        let amp = (self.ampcont / 100.0).clamp(0.0, 1.0);
        let phase_weight = (1.0 - amp * amp).sqrt();

        (0..n)
            .map(|i| {
                let s = i as f64 * ds;
                let s2 = s * s;
                let gamma = PI * defocus * lambda * s2 - 0.5 * PI * cs * lambda.powi(3) * s2 * s2;
                let envelope = (-self.bfactor * s2 / 4.0).exp();
                ((phase_weight * gamma.sin() + amp * gamma.cos()) * envelope).abs()
            })
            .collect()
    }
}

/// Per-shell FSC weights derived from a particle's CTF, indexed by Fourier shell of
/// the full-size box.
#[derive(Debug, Clone, PartialEq)]
pub struct CtfWeights {
    curve: Vec<f64>,
}

impl CtfWeights {
    pub fn derive(ctf: &CtfParams, box_size: usize, pixel_size: f64) -> Result<Self, CtfWeightError> {
        ctf.validate()?;
        if !(pixel_size.is_finite() && pixel_size > 0.0) {
            return Err(CtfWeightError::InvalidParameter {
                name: "pixel_size",
                value: pixel_size,
            });
        }

        let ds = 1.0 / (box_size as f64 * pixel_size);
        let mut curve = ctf
            .with_bfactor(WEIGHTING_BFACTOR)
            .amplitude_curve(box_size, ds);

        let falloff = curve
            .windows(2)
            .position(|pair| pair[1] < pair[0])
            .ok_or(CtfWeightError::NoFalloff {
                points: curve.len(),
            })?;
        let plateau = curve[falloff];
        curve[..falloff].iter_mut().for_each(|w| *w = plateau);

        Ok(Self { curve })
    }

    pub fn weight(&self, shell: usize) -> f64 {
        self.curve.get(shell).copied().unwrap_or(0.0)
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.curve
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn typical() -> CtfParams {
        CtfParams {
            defocus: 1.5,
            voltage: 300.0,
            cs: 2.7,
            ampcont: 10.0,
            bfactor: 0.0,
        }
    }

    #[test]
    fn wavelength_at_300kv_matches_reference_value() {
        assert!((typical().wavelength() - 0.019687).abs() < 1e-5);
    }

    #[test]
    fn amplitude_at_origin_equals_amplitude_contrast() {
        let curve = typical().amplitude_curve(8, 0.01);

        assert!((curve[0] - 0.1).abs() < 1e-12);
    }

    #[test]
    fn weights_are_flat_before_the_first_falloff() {
        let weights = CtfWeights::derive(&typical(), 128, 1.0).unwrap();
        let curve = weights.as_slice();

        let falloff = curve.windows(2).position(|p| p[1] < p[0]).unwrap();
        assert!(falloff > 0);
        assert!(curve[..=falloff].iter().all(|w| (w - curve[0]).abs() < 1e-12));
        assert_eq!(curve.len(), 128);
    }

    #[test]
    fn zero_defocus_without_amplitude_contrast_reports_no_falloff() {
        // No defocus, aberration or amplitude contrast: the envelope is zero.
        let flat = CtfParams {
            defocus: 0.0,
            voltage: 300.0,
            cs: 0.0,
            ampcont: 0.0,
            bfactor: 0.0,
        };

        assert_eq!(
            CtfWeights::derive(&flat, 64, 1.0),
            Err(CtfWeightError::NoFalloff { points: 64 })
        );
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        let broken = CtfParams {
            voltage: 0.0,
            ..typical()
        };

        assert!(matches!(
            CtfWeights::derive(&broken, 64, 1.0),
            Err(CtfWeightError::InvalidParameter { name: "voltage", .. })
        ));
        assert!(matches!(
            CtfWeights::derive(&typical(), 64, f64::NAN),
            Err(CtfWeightError::InvalidParameter {
                name: "pixel_size",
                ..
            })
        ));
    }
}
