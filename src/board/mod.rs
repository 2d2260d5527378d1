// src/board/mod.rs
pub mod brainflow;
pub mod synthetic;

pub use brainflow::BrainFlowBoard;
pub use synthetic::SyntheticBoard;

use crate::config::BoardConfig;
use crate::error::{OscillationError, Result};
use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};

// BrainFlow board ids.
pub const CYTON_BOARD: i32 = 0;
pub const NO_BOARD: i32 = -100;

/// Which driver serves the session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum BoardBackend {
    /// BrainFlow's `BoardController` shared library.
    #[serde(rename = "brainflow")]
    #[value(name = "brainflow")]
    BrainFlow,
    /// In-process signal generator, no hardware needed.
    Synthetic,
}

/// Latest samples of every board row (`rows x num_samples`).
#[derive(Clone, Debug)]
pub struct SampleWindow {
    data: Array2<f64>,
    eeg_channels: Vec<usize>,
    sampling_rate: f64,
}

impl SampleWindow {
    pub fn new(data: Array2<f64>, eeg_channels: Vec<usize>, sampling_rate: f64) -> Result<Self> {
        if let Some(&row) = eeg_channels.iter().find(|&&row| row >= data.nrows()) {
            return Err(OscillationError::device(
                "get_current_board_data",
                format!("EEG row {row} outside a {}-row buffer", data.nrows()),
            ));
        }
        Ok(Self {
            data,
            eeg_channels,
            sampling_rate,
        })
    }

    pub fn num_samples(&self) -> usize {
        self.data.ncols()
    }

    pub fn eeg_channel_count(&self) -> usize {
        self.eeg_channels.len()
    }

    /// Samples of the `index`-th EEG channel (not the raw row number).
    pub fn eeg_channel(&self, index: usize) -> ArrayView1<'_, f64> {
        self.data.row(self.eeg_channels[index])
    }

    pub fn sampling_rate(&self) -> f64 {
        self.sampling_rate
    }
}

/// Board session lifecycle as seen by the acquisition loop.
pub trait BoardSession {
    fn prepare(&mut self) -> Result<()>;
    fn start_stream(&mut self) -> Result<()>;
    /// Up to `n` most recent samples; fewer columns when the buffer is still
    /// filling. Fails if the stream is not running.
    fn get_latest_samples(&mut self, n: usize) -> Result<SampleWindow>;
    fn stop_stream(&mut self) -> Result<()>;
    fn release(&mut self) -> Result<()>;
    fn sampling_rate(&self) -> f64;
    /// Number of EEG rows the board exposes.
    fn eeg_channel_count(&self) -> usize;
    fn description(&self) -> String;
}

/// Opens a session for the configured backend. Nothing is prepared yet.
pub fn open(config: &BoardConfig) -> Result<Box<dyn BoardSession>> {
    match config.backend {
        BoardBackend::BrainFlow => Ok(Box::new(BrainFlowBoard::open(config)?)),
        BoardBackend::Synthetic => Ok(Box::new(SyntheticBoard::new(
            synthetic::SyntheticSettings::default(),
        ))),
    }
}

/// Owns a session and guarantees stop + release, even on early return.
pub struct SessionGuard {
    session: Box<dyn BoardSession>,
    streaming: bool,
    released: bool,
}

impl SessionGuard {
    pub fn new(session: Box<dyn BoardSession>) -> Self {
        Self {
            session,
            streaming: false,
            released: false,
        }
    }

    pub fn session(&mut self) -> &mut dyn BoardSession {
        self.session.as_mut()
    }

    pub fn start_stream(&mut self) -> Result<()> {
        self.session.start_stream()?;
        self.streaming = true;
        Ok(())
    }

    /// Stops the stream (if running) and releases the session once. Release is
    /// attempted even when stopping fails; the first error is returned.
    pub fn shutdown(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        let stopped = if self.streaming {
            self.streaming = false;
            self.session.stop_stream()
        } else {
            Ok(())
        };
        self.released = true;
        let released = self.session.release();
        stopped.and(released)
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            log::error!("board shutdown for {} failed: {err}", self.session.description());
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted board shared by the loop tests.
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Debug, Default)]
    pub struct BoardLog {
        pub calls: Vec<&'static str>,
    }

    pub struct ScriptedBoard {
        pub log: Rc<RefCell<BoardLog>>,
        pub rows: usize,
        pub eeg_rows: Vec<usize>,
        pub sampling_rate: f64,
        /// Column counts returned by successive reads; the last one repeats.
        pub available: Vec<usize>,
        pub fail_prepare: bool,
        /// Read index that fails with a device error.
        pub fail_read_at: Option<usize>,
        /// Invoked on every read with the read index.
        pub on_read: Option<Box<dyn FnMut(usize)>>,
        reads: usize,
    }

    impl ScriptedBoard {
        pub fn new(log: Rc<RefCell<BoardLog>>) -> Self {
            Self {
                log,
                rows: 4,
                eeg_rows: vec![1, 2, 3],
                sampling_rate: 256.0,
                available: vec![512],
                fail_prepare: false,
                fail_read_at: None,
                on_read: None,
                reads: 0,
            }
        }
    }

    impl BoardSession for ScriptedBoard {
        fn prepare(&mut self) -> Result<()> {
            self.log.borrow_mut().calls.push("prepare");
            if self.fail_prepare {
                return Err(OscillationError::device("prepare_session", "port busy"));
            }
            Ok(())
        }

        fn start_stream(&mut self) -> Result<()> {
            self.log.borrow_mut().calls.push("start_stream");
            Ok(())
        }

        fn get_latest_samples(&mut self, n: usize) -> Result<SampleWindow> {
            self.log.borrow_mut().calls.push("get_latest_samples");
            let index = self.reads;
            self.reads += 1;
            if let Some(hook) = self.on_read.as_mut() {
                hook(index);
            }
            if self.fail_read_at == Some(index) {
                return Err(OscillationError::device("get_current_board_data", "board unplugged"));
            }
            let cols = self
                .available
                .get(index)
                .or(self.available.last())
                .copied()
                .unwrap_or(0)
                .min(n);
            let mut data = Array2::<f64>::zeros((self.rows, cols));
            for (j, mut col) in data.columns_mut().into_iter().enumerate() {
                let t = j as f64 / self.sampling_rate;
                for &row in &self.eeg_rows {
                    col[row] = (2.0 * std::f64::consts::PI * 10.0 * t).sin()
                        + 0.5 * (2.0 * std::f64::consts::PI * 6.0 * t).sin();
                }
            }
            SampleWindow::new(data, self.eeg_rows.clone(), self.sampling_rate)
        }

        fn stop_stream(&mut self) -> Result<()> {
            self.log.borrow_mut().calls.push("stop_stream");
            Ok(())
        }

        fn release(&mut self) -> Result<()> {
            self.log.borrow_mut().calls.push("release");
            Ok(())
        }

        fn sampling_rate(&self) -> f64 {
            self.sampling_rate
        }

        fn eeg_channel_count(&self) -> usize {
            self.eeg_rows.len()
        }

        fn description(&self) -> String {
            "scripted board".into()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{BoardLog, ScriptedBoard};
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn guard_releases_on_drop() {
        let log = Rc::new(RefCell::new(BoardLog::default()));
        {
            let mut guard = SessionGuard::new(Box::new(ScriptedBoard::new(log.clone())));
            guard.session().prepare().unwrap();
            guard.start_stream().unwrap();
        }
        assert_eq!(
            log.borrow().calls,
            vec!["prepare", "start_stream", "stop_stream", "release"]
        );
    }

    #[test]
    fn guard_releases_once() {
        let log = Rc::new(RefCell::new(BoardLog::default()));
        {
            let mut guard = SessionGuard::new(Box::new(ScriptedBoard::new(log.clone())));
            guard.shutdown().unwrap();
            guard.shutdown().unwrap();
        }
        assert_eq!(log.borrow().calls, vec!["release"]);
    }

    #[test]
    fn window_rejects_rows_outside_buffer() {
        let data = Array2::<f64>::zeros((3, 4));
        assert!(SampleWindow::new(data.clone(), vec![1, 2], 250.0).is_ok());
        assert!(SampleWindow::new(data, vec![1, 3], 250.0).is_err());
    }
}
