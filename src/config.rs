// src/config.rs
use crate::bands::BandSelection;
use crate::board::{BoardBackend, CYTON_BOARD, NO_BOARD};
use crate::error::{OscillationError, Result};
use crate::spectral::WindowFunction;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Window length that keeps every band from delta to gamma resolvable.
pub const DEFAULT_NUM_SAMPLES: usize = 512;
pub const DEFAULT_EEG_CHANNEL_COUNT: usize = 8;
const ARCHIVE_DIR_NAME: &str = "archive";

/// Connection parameters handed to the board driver.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoardConfig {
    pub backend: BoardBackend,
    pub board_id: i32,
    /// Overrides the platform default `BoardController` library name.
    pub library_path: Option<PathBuf>,
    pub timeout: i32,
    pub ip_port: i32,
    pub ip_protocol: i32,
    pub ip_address: String,
    pub serial_port: String,
    pub mac_address: String,
    pub streamer_params: String,
    pub serial_number: String,
    pub file: String,
    pub master_board: i32,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            backend: BoardBackend::BrainFlow,
            board_id: CYTON_BOARD,
            library_path: None,
            timeout: 0,
            ip_port: 0,
            ip_protocol: 0,
            ip_address: String::new(),
            serial_port: String::new(),
            mac_address: String::new(),
            streamer_params: String::new(),
            serial_number: String::new(),
            file: String::new(),
            master_board: NO_BOARD,
        }
    }
}

/// Everything a recording session needs. Built once, read-only afterwards.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    pub board: BoardConfig,
    pub eeg_channel_count: usize,
    pub bands: BandSelection,
    pub window: WindowFunction,
    pub num_samples: usize,
    pub warmup_secs: f64,
    pub interval_secs: f64,
    pub retry_delay_ms: u64,
    /// Defaults to `archive/` next to the executable.
    pub archive_dir: Option<PathBuf>,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            board: BoardConfig::default(),
            eeg_channel_count: DEFAULT_EEG_CHANNEL_COUNT,
            bands: BandSelection::default(),
            window: WindowFunction::BlackmanHarris,
            num_samples: DEFAULT_NUM_SAMPLES,
            warmup_secs: 3.0,
            interval_secs: 1.0,
            retry_delay_ms: 100,
            archive_dir: None,
        }
    }
}

impl RecordingConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            OscillationError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|e| {
            OscillationError::Config(format!("cannot parse {}: {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.eeg_channel_count == 0 {
            return Err(OscillationError::Config(
                "eeg_channel_count must be at least 1".into(),
            ));
        }
        if self.num_samples < 2 || self.num_samples % 2 != 0 {
            return Err(OscillationError::Config(format!(
                "num_samples must be an even number >= 2, got {}",
                self.num_samples
            )));
        }
        self.warmup()?;
        self.interval()?;
        if !self.bands.any_ratio_band() {
            log::warn!("theta, alpha, beta and gamma are all disabled; every ratio will be 0");
        }
        Ok(())
    }

    pub fn warmup(&self) -> Result<Duration> {
        seconds("warmup_secs", self.warmup_secs)
    }

    pub fn interval(&self) -> Result<Duration> {
        seconds("interval_secs", self.interval_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Resolves the archive directory, falling back to `<program_dir>/archive`.
    pub fn resolved_archive_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.archive_dir {
            return Ok(dir.clone());
        }
        let exe = std::env::current_exe()
            .map_err(|e| OscillationError::Config(format!("cannot locate executable: {e}")))?;
        let program_dir = exe
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Ok(program_dir.join(ARCHIVE_DIR_NAME))
    }
}

/// Rejects negative, NaN and values too large for a `Duration`.
fn seconds(name: &str, secs: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(secs).map_err(|_| {
        OscillationError::Config(format!(
            "{name} must be a non-negative number of seconds, got {secs}"
        ))
    })
}
