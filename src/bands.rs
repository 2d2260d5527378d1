// src/bands.rs
use crate::board::SampleWindow;
use crate::error::{OscillationError, Result};
use crate::spectral::{SpectralEstimator, WindowFunction};
use serde::{Deserialize, Serialize};

/// Canonical EEG frequency bands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum Band {
    Delta,
    Theta,
    Alpha,
    Beta,
    Gamma,
}

impl Band {
    pub const ALL: [Band; 5] = [Band::Delta, Band::Theta, Band::Alpha, Band::Beta, Band::Gamma];

    /// `(low, high)` edges in Hz.
    pub fn range_hz(self) -> (f64, f64) {
        match self {
            Band::Delta => (0.5, 4.0),
            Band::Theta => (4.0, 8.0),
            Band::Alpha => (8.0, 13.0),
            Band::Beta => (13.0, 32.0),
            Band::Gamma => (32.0, 100.0),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Band::Delta => "delta",
            Band::Theta => "theta",
            Band::Alpha => "alpha",
            Band::Beta => "beta",
            Band::Gamma => "gamma",
        }
    }
}

/// Which bands get computed. A disabled band costs no estimator call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BandSelection {
    pub delta: bool,
    pub theta: bool,
    pub alpha: bool,
    pub beta: bool,
    pub gamma: bool,
}

impl Default for BandSelection {
    fn default() -> Self {
        Self {
            delta: false,
            theta: true,
            alpha: true,
            beta: true,
            gamma: true,
        }
    }
}

impl BandSelection {
    #[cfg(test)]
    pub fn all() -> Self {
        Self {
            delta: true,
            theta: true,
            alpha: true,
            beta: true,
            gamma: true,
        }
    }

    /// Exactly the listed bands.
    pub fn only(bands: &[Band]) -> Self {
        Self {
            delta: bands.contains(&Band::Delta),
            theta: bands.contains(&Band::Theta),
            alpha: bands.contains(&Band::Alpha),
            beta: bands.contains(&Band::Beta),
            gamma: bands.contains(&Band::Gamma),
        }
    }

    pub fn enabled(&self) -> Vec<Band> {
        Band::ALL.into_iter().filter(|b| self.is_enabled(*b)).collect()
    }

    pub fn is_enabled(&self, band: Band) -> bool {
        match band {
            Band::Delta => self.delta,
            Band::Theta => self.theta,
            Band::Alpha => self.alpha,
            Band::Beta => self.beta,
            Band::Gamma => self.gamma,
        }
    }

    pub fn any_ratio_band(&self) -> bool {
        self.theta || self.alpha || self.beta || self.gamma
    }
}

/// Across-channel mean band power for one cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BandPowers {
    pub delta: f64,
    pub theta: f64,
    pub alpha: f64,
    pub beta: f64,
    pub gamma: f64,
    /// Bands that were actually estimated; the rest hold `0.0`.
    pub computed: BandSelection,
}

impl BandPowers {
    /// Powers for the four ratio bands, all marked as computed.
    #[cfg(test)]
    pub fn new(theta: f64, alpha: f64, beta: f64, gamma: f64) -> Self {
        Self {
            delta: 0.0,
            theta,
            alpha,
            beta,
            gamma,
            computed: BandSelection::default(),
        }
    }

    pub fn get(&self, band: Band) -> f64 {
        match band {
            Band::Delta => self.delta,
            Band::Theta => self.theta,
            Band::Alpha => self.alpha,
            Band::Beta => self.beta,
            Band::Gamma => self.gamma,
        }
    }

    fn set(&mut self, band: Band, value: f64) {
        match band {
            Band::Delta => self.delta = value,
            Band::Theta => self.theta = value,
            Band::Alpha => self.alpha = value,
            Band::Beta => self.beta = value,
            Band::Gamma => self.gamma = value,
        }
    }
}

/// Averages per-channel band powers over the first `channel_count` EEG rows.
pub struct BandAggregator<E: SpectralEstimator> {
    estimator: E,
    selection: BandSelection,
    window: WindowFunction,
    channel_count: usize,
}

impl<E: SpectralEstimator> BandAggregator<E> {
    pub fn new(
        estimator: E,
        selection: BandSelection,
        window: WindowFunction,
        channel_count: usize,
    ) -> Result<Self> {
        if channel_count == 0 {
            return Err(OscillationError::Config(
                "band aggregation needs at least one channel".into(),
            ));
        }
        Ok(Self {
            estimator,
            selection,
            window,
            channel_count,
        })
    }

    pub fn channel_count(&self) -> usize {
        self.channel_count
    }

    pub fn selection(&self) -> BandSelection {
        self.selection
    }

    pub fn aggregate(&self, window: &SampleWindow) -> Result<BandPowers> {
        if window.eeg_channel_count() < self.channel_count {
            return Err(OscillationError::Config(format!(
                "window has {} EEG channels, {} requested",
                window.eeg_channel_count(),
                self.channel_count
            )));
        }
        let channels: Vec<Vec<f64>> = (0..self.channel_count)
            .map(|c| window.eeg_channel(c).to_vec())
            .collect();
        let mut powers = BandPowers {
            computed: self.selection,
            ..BandPowers::default()
        };
        for band in Band::ALL {
            if !self.selection.is_enabled(band) {
                continue;
            }
            let (low, high) = band.range_hz();
            let mut sum = 0.0;
            for samples in &channels {
                sum += self.estimator.band_power(
                    samples,
                    window.sampling_rate(),
                    low,
                    high,
                    self.window,
                )?;
            }
            powers.set(band, sum / self.channel_count as f64);
        }
        Ok(powers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;
    use std::cell::RefCell;

    /// Returns `low_hz * samples[0]` and records each call.
    struct RecordingEstimator {
        calls: RefCell<Vec<(f64, f64)>>,
    }

    impl SpectralEstimator for RecordingEstimator {
        fn band_power(
            &self,
            samples: &[f64],
            _rate: f64,
            low_hz: f64,
            high_hz: f64,
            _window: WindowFunction,
        ) -> Result<f64> {
            self.calls.borrow_mut().push((low_hz, high_hz));
            Ok(low_hz * samples[0])
        }
    }

    struct FailingEstimator;

    impl SpectralEstimator for FailingEstimator {
        fn band_power(&self, _: &[f64], _: f64, _: f64, _: f64, _: WindowFunction) -> Result<f64> {
            Err(OscillationError::Spectral("not enough samples".into()))
        }
    }

    /// Row 0 is a timestamp-like row; EEG rows 1..=3 hold constant 1, 2, 3.
    fn window() -> SampleWindow {
        let mut data = Array2::<f64>::zeros((4, 8));
        for row in 1..4 {
            data.row_mut(row).fill(row as f64);
        }
        SampleWindow::new(data, vec![1, 2, 3], 250.0).unwrap()
    }

    #[test]
    fn averages_across_selected_channels() {
        let est = RecordingEstimator {
            calls: RefCell::new(Vec::new()),
        };
        let agg = BandAggregator::new(est, BandSelection::default(), WindowFunction::Hanning, 2)
            .unwrap();
        let powers = agg.aggregate(&window()).unwrap();
        // channels hold 1 and 2 -> mean factor 1.5
        assert_eq!(powers.theta, 4.0 * 1.5);
        assert_eq!(powers.alpha, 8.0 * 1.5);
        assert_eq!(powers.beta, 13.0 * 1.5);
        assert_eq!(powers.gamma, 32.0 * 1.5);
        assert_eq!(powers.delta, 0.0);
        assert_eq!(agg.estimator.calls.borrow().len(), 4 * 2);
    }

    #[test]
    fn disabled_bands_are_never_estimated() {
        let est = RecordingEstimator {
            calls: RefCell::new(Vec::new()),
        };
        let selection = BandSelection {
            delta: false,
            theta: true,
            alpha: true,
            beta: false,
            gamma: false,
        };
        let agg = BandAggregator::new(est, selection, WindowFunction::Hanning, 3).unwrap();
        let powers = agg.aggregate(&window()).unwrap();
        let calls = agg.estimator.calls.borrow();
        assert_eq!(calls.len(), 2 * 3);
        assert!(calls.iter().all(|(low, _)| *low == 4.0 || *low == 8.0));
        assert_eq!(powers.beta, 0.0);
        assert!(!powers.computed.beta && powers.computed.alpha);
    }

    #[test]
    fn delta_is_computed_when_enabled() {
        let est = RecordingEstimator {
            calls: RefCell::new(Vec::new()),
        };
        let agg = BandAggregator::new(est, BandSelection::all(), WindowFunction::Hanning, 1)
            .unwrap();
        let powers = agg.aggregate(&window()).unwrap();
        assert_eq!(powers.delta, 0.5);
    }

    #[test]
    fn estimator_failure_propagates() {
        let agg = BandAggregator::new(
            FailingEstimator,
            BandSelection::default(),
            WindowFunction::Hanning,
            1,
        )
        .unwrap();
        assert!(matches!(
            agg.aggregate(&window()),
            Err(OscillationError::Spectral(_))
        ));
    }

    #[test]
    fn more_channels_than_window_is_rejected() {
        let agg = BandAggregator::new(
            FailingEstimator,
            BandSelection::default(),
            WindowFunction::Hanning,
            4,
        )
        .unwrap();
        assert!(matches!(agg.aggregate(&window()), Err(OscillationError::Config(_))));
        let no_channels = BandAggregator::new(
            FailingEstimator,
            BandSelection::default(),
            WindowFunction::Hanning,
            0,
        );
        assert!(no_channels.is_err());
    }

    #[test]
    fn selection_from_band_list() {
        let selection = BandSelection::only(&[Band::Delta, Band::Alpha]);
        assert_eq!(selection.enabled(), vec![Band::Delta, Band::Alpha]);
        assert!(!selection.is_enabled(Band::Theta));
        assert_eq!(BandSelection::default().enabled().len(), 4);
    }
}
