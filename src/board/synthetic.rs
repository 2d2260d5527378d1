// src/board/synthetic.rs
use crate::board::{BoardSession, SampleWindow};
use crate::error::{OscillationError, Result};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use std::f64::consts::PI;
use std::time::Instant;

/// Shape of the generated signal.
#[derive(Clone, Debug)]
pub struct SyntheticSettings {
    pub sampling_rate: f64,
    pub eeg_channels: usize,
    /// `(frequency Hz, amplitude µV)` oscillations summed on every channel.
    pub components: Vec<(f64, f64)>,
    /// Peak amplitude of uniform noise, µV.
    pub noise: f64,
    /// Samples kept per row.
    pub history: usize,
    pub seed: Option<u64>,
}

impl Default for SyntheticSettings {
    fn default() -> Self {
        Self {
            sampling_rate: 250.0,
            eeg_channels: 8,
            components: vec![(6.0, 10.0), (10.0, 20.0), (20.0, 5.0), (40.0, 2.0)],
            noise: 3.0,
            history: 250 * 60,
            seed: None,
        }
    }
}

/// In-process board: row 0 is a package counter, rows `1..=eeg_channels`
/// carry EEG, the last row is a timestamp in seconds.
pub struct SyntheticBoard {
    settings: SyntheticSettings,
    rows: Vec<VecDeque<f64>>,
    rng: StdRng,
    generated: u64,
    started_at: Option<Instant>,
    prepared: bool,
}

impl SyntheticBoard {
    pub fn new(settings: SyntheticSettings) -> Self {
        let rng = match settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let rows = (0..settings.eeg_channels + 2)
            .map(|_| VecDeque::with_capacity(settings.history))
            .collect();
        Self {
            settings,
            rows,
            rng,
            generated: 0,
            started_at: None,
            prepared: false,
        }
    }

    fn eeg_rows(&self) -> Vec<usize> {
        (1..=self.settings.eeg_channels).collect()
    }

    /// Appends `count` samples to every row.
    fn advance(&mut self, count: usize) {
        let timestamp_row = self.rows.len() - 1;
        for _ in 0..count {
            let t = self.generated as f64 / self.settings.sampling_rate;
            for (row, queue) in self.rows.iter_mut().enumerate() {
                let value = if row == 0 {
                    (self.generated % 256) as f64
                } else if row == timestamp_row {
                    t
                } else {
                    let phase = row as f64 * 0.3;
                    let clean: f64 = self
                        .settings
                        .components
                        .iter()
                        .map(|(freq, amp)| amp * (2.0 * PI * freq * t + phase).sin())
                        .sum();
                    clean + self.rng.gen_range(-1.0..=1.0) * self.settings.noise
                };
                if queue.len() == self.settings.history {
                    queue.pop_front();
                }
                queue.push_back(value);
            }
            self.generated += 1;
        }
    }

    /// Generates whatever wall-clock time says is due since the stream started.
    fn catch_up(&mut self) {
        if let Some(start) = self.started_at {
            let due = (start.elapsed().as_secs_f64() * self.settings.sampling_rate) as u64;
            let missing = due.saturating_sub(self.generated) as usize;
            self.advance(missing.min(self.settings.history));
            self.generated = self.generated.max(due);
        }
    }
}

impl BoardSession for SyntheticBoard {
    fn prepare(&mut self) -> Result<()> {
        self.prepared = true;
        Ok(())
    }

    fn start_stream(&mut self) -> Result<()> {
        if !self.prepared {
            return Err(OscillationError::device(
                "start_stream",
                "session is not prepared",
            ));
        }
        self.started_at.get_or_insert_with(Instant::now);
        Ok(())
    }

    fn get_latest_samples(&mut self, n: usize) -> Result<SampleWindow> {
        if self.started_at.is_none() {
            return Err(OscillationError::device(
                "get_current_board_data",
                "stream is not running",
            ));
        }
        self.catch_up();
        let available = self.rows[0].len().min(n);
        let mut data = Array2::<f64>::zeros((self.rows.len(), available));
        for (row, queue) in self.rows.iter().enumerate() {
            let skip = queue.len() - available;
            for (col, value) in queue.iter().skip(skip).enumerate() {
                data[[row, col]] = *value;
            }
        }
        SampleWindow::new(data, self.eeg_rows(), self.settings.sampling_rate)
    }

    fn stop_stream(&mut self) -> Result<()> {
        self.started_at = None;
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        self.prepared = false;
        self.rows.iter_mut().for_each(VecDeque::clear);
        Ok(())
    }

    fn sampling_rate(&self) -> f64 {
        self.settings.sampling_rate
    }

    fn eeg_channel_count(&self) -> usize {
        self.settings.eeg_channels
    }

    fn description(&self) -> String {
        format!(
            "synthetic board ({} ch @ {} Hz)",
            self.settings.eeg_channels, self.settings.sampling_rate
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bands::{BandAggregator, BandSelection};
    use crate::spectral::{PeriodogramEstimator, WindowFunction};

    fn seeded() -> SyntheticBoard {
        SyntheticBoard::new(SyntheticSettings {
            seed: Some(7),
            ..SyntheticSettings::default()
        })
    }

    #[test]
    fn reading_before_start_fails() {
        let mut board = seeded();
        board.prepare().unwrap();
        assert!(board.get_latest_samples(512).is_err());
    }

    #[test]
    fn start_requires_prepare() {
        assert!(seeded().start_stream().is_err());
    }

    #[test]
    fn returns_at_most_what_was_generated() {
        let mut board = seeded();
        board.prepare().unwrap();
        board.start_stream().unwrap();
        board.advance(100);
        let window = board.get_latest_samples(512).unwrap();
        assert!(window.num_samples() >= 100 && window.num_samples() < 512);
        board.advance(600);
        let window = board.get_latest_samples(512).unwrap();
        assert_eq!(window.num_samples(), 512);
        assert_eq!(window.eeg_channel_count(), 8);
    }

    #[test]
    fn alpha_dominates_generated_signal() {
        let mut board = seeded();
        board.prepare().unwrap();
        board.start_stream().unwrap();
        board.advance(512);
        let window = board.get_latest_samples(512).unwrap();
        let agg = BandAggregator::new(
            PeriodogramEstimator,
            BandSelection::default(),
            WindowFunction::BlackmanHarris,
            8,
        )
        .unwrap();
        let powers = agg.aggregate(&window).unwrap();
        assert!(powers.alpha > powers.theta);
        assert!(powers.theta > powers.gamma);
    }

    #[test]
    fn history_is_bounded() {
        let mut board = SyntheticBoard::new(SyntheticSettings {
            history: 64,
            seed: Some(1),
            ..SyntheticSettings::default()
        });
        board.advance(200);
        assert!(board.rows.iter().all(|q| q.len() == 64));
    }
}
