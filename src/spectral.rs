// src/spectral.rs
use crate::error::{OscillationError, Result};
use rustfft::{num_complex::Complex64, FftPlanner};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Taper applied before the FFT. Discriminants follow BrainFlow's
/// `WindowOperations` codes; JSON accepts either the code or the name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case", try_from = "WindowSetting")]
pub enum WindowFunction {
    NoWindow = 0,
    Hanning = 1,
    Hamming = 2,
    BlackmanHarris = 3,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WindowSetting {
    Code(i32),
    Name(String),
}

impl TryFrom<WindowSetting> for WindowFunction {
    type Error = String;

    fn try_from(setting: WindowSetting) -> std::result::Result<Self, String> {
        match setting {
            WindowSetting::Code(code) => Self::from_code(code)
                .ok_or_else(|| format!("unknown BrainFlow window code {code}")),
            WindowSetting::Name(name) => match name.as_str() {
                "no_window" => Ok(Self::NoWindow),
                "hanning" => Ok(Self::Hanning),
                "hamming" => Ok(Self::Hamming),
                "blackman_harris" => Ok(Self::BlackmanHarris),
                other => Err(format!("unknown window function {other:?}")),
            },
        }
    }
}

impl WindowFunction {
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::NoWindow),
            1 => Some(Self::Hanning),
            2 => Some(Self::Hamming),
            3 => Some(Self::BlackmanHarris),
            _ => None,
        }
    }

    /// Symmetric window coefficients of length `len`.
    pub fn coefficients(self, len: usize) -> Vec<f64> {
        if len < 2 {
            return vec![1.0; len];
        }
        let denom = (len - 1) as f64;
        (0..len)
            .map(|i| {
                let x = 2.0 * PI * i as f64 / denom;
                match self {
                    Self::NoWindow => 1.0,
                    Self::Hanning => 0.5 - 0.5 * x.cos(),
                    Self::Hamming => 0.54 - 0.46 * x.cos(),
                    Self::BlackmanHarris => {
                        0.35875 - 0.48829 * x.cos() + 0.14128 * (2.0 * x).cos()
                            - 0.01168 * (3.0 * x).cos()
                    }
                }
            })
            .collect()
    }
}

/// Something that turns one channel's samples into the power inside a band.
pub trait SpectralEstimator {
    fn band_power(
        &self,
        samples: &[f64],
        sampling_rate: f64,
        low_hz: f64,
        high_hz: f64,
        window: WindowFunction,
    ) -> Result<f64>;
}

/// One-sided power spectral density of a single segment.
#[derive(Clone, Debug)]
pub struct PowerSpectrum {
    pub frequencies_hz: Vec<f64>,
    pub density: Vec<f64>,
}

impl PowerSpectrum {
    /// Trapezoidal integral of the density over `[low_hz, high_hz]`.
    pub fn band_power(&self, low_hz: f64, high_hz: f64) -> Result<f64> {
        let bins: Vec<(f64, f64)> = self
            .frequencies_hz
            .iter()
            .copied()
            .zip(self.density.iter().copied())
            .filter(|(f, _)| *f >= low_hz && *f <= high_hz)
            .collect();
        match bins.len() {
            0 => Err(OscillationError::Spectral(format!(
                "no frequency bins between {low_hz} Hz and {high_hz} Hz"
            ))),
            1 => Ok(bins[0].1 * self.resolution_hz()),
            _ => Ok(bins
                .windows(2)
                .map(|pair| (pair[1].0 - pair[0].0) * (pair[0].1 + pair[1].1) * 0.5)
                .sum()),
        }
    }

    fn resolution_hz(&self) -> f64 {
        match self.frequencies_hz.as_slice() {
            [first, second, ..] => second - first,
            _ => 0.0,
        }
    }
}

/// Periodogram estimator: remove the mean, taper, FFT, integrate.
#[derive(Clone, Copy, Debug, Default)]
pub struct PeriodogramEstimator;

impl PeriodogramEstimator {
    pub fn psd(
        &self,
        samples: &[f64],
        sampling_rate: f64,
        window: WindowFunction,
    ) -> Result<PowerSpectrum> {
        let n = samples.len();
        if n < 2 || n % 2 != 0 {
            return Err(OscillationError::Spectral(format!(
                "need an even number of at least 2 samples, got {n}"
            )));
        }
        if !sampling_rate.is_finite() || sampling_rate <= 0.0 {
            return Err(OscillationError::Spectral(format!(
                "sampling rate must be positive, got {sampling_rate}"
            )));
        }
        if samples.iter().any(|v| !v.is_finite()) {
            return Err(OscillationError::Spectral(
                "samples contain NaN or infinite values".into(),
            ));
        }
        let mean = samples.iter().sum::<f64>() / n as f64;
        let taper = window.coefficients(n);
        let taper_energy: f64 = taper.iter().map(|w| w * w).sum();
        let mut buffer: Vec<Complex64> = samples
            .iter()
            .zip(&taper)
            .map(|(v, w)| Complex64::new((v - mean) * w, 0.0))
            .collect();
        let mut planner = FftPlanner::<f64>::new();
        planner.plan_fft_forward(n).process(&mut buffer);

        let scale = 1.0 / (sampling_rate * taper_energy);
        let half = n / 2;
        let mut frequencies_hz = Vec::with_capacity(half + 1);
        let mut density = Vec::with_capacity(half + 1);
        for (k, bin) in buffer.iter().take(half + 1).enumerate() {
            let mut power = bin.norm_sqr() * scale;
            if k != 0 && k != half {
                power *= 2.0;
            }
            frequencies_hz.push(k as f64 * sampling_rate / n as f64);
            density.push(power);
        }
        Ok(PowerSpectrum {
            frequencies_hz,
            density,
        })
    }
}

impl SpectralEstimator for PeriodogramEstimator {
    fn band_power(
        &self,
        samples: &[f64],
        sampling_rate: f64,
        low_hz: f64,
        high_hz: f64,
        window: WindowFunction,
    ) -> Result<f64> {
        let nyquist = sampling_rate / 2.0;
        if !(low_hz >= 0.0 && low_hz < high_hz) {
            return Err(OscillationError::Spectral(format!(
                "invalid band {low_hz}..{high_hz} Hz"
            )));
        }
        if low_hz >= nyquist {
            return Err(OscillationError::Spectral(format!(
                "band starts at {low_hz} Hz, above the {nyquist} Hz Nyquist limit"
            )));
        }
        let spectrum = self.psd(samples, sampling_rate, window)?;
        spectrum.band_power(low_hz, high_hz.min(nyquist))
    }
}
