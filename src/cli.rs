// src/cli.rs
use crate::bands::{Band, BandSelection};
use crate::board::BoardBackend;
use crate::config::RecordingConfig;
use crate::error::{OscillationError, Result};
use crate::feedback::{FeedbackSettings, KeyMap, Metric};
use crate::keyboard::check_key;
use crate::spectral::WindowFunction;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "neural-oscillations",
    version,
    about = "Stream EEG band powers and ratios from a BrainFlow board",
    long_about = "Records theta/alpha/beta/gamma band powers and their six ratios once per \
                  cycle until Ctrl-C, then writes the session to archive/output_<timestamp>.csv.\n\
                  Needs BrainFlow's BoardController library unless --backend synthetic is used."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Command {
    /// Stream band powers until Ctrl-C and save the session as CSV
    Record(RecordArgs),
    /// Evaluate one metric against a threshold and press the matching key
    Feedback(FeedbackArgs),
}

/// Flags override values read from `--config`.
#[derive(Args, Debug)]
pub struct RecordArgs {
    /// JSON recording configuration
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Board driver
    #[arg(long, value_enum)]
    pub backend: Option<BoardBackend>,

    /// BrainFlow board id (0 = Cyton, 2 = Cyton+Daisy, -1 = synthetic)
    #[arg(long, allow_negative_numbers = true)]
    pub board_id: Option<i32>,

    /// Path to the BoardController shared library
    #[arg(long, env = "BRAINFLOW_LIB")]
    pub library_path: Option<PathBuf>,

    #[arg(long)]
    pub serial_port: Option<String>,

    #[arg(long)]
    pub mac_address: Option<String>,

    #[arg(long)]
    pub ip_address: Option<String>,

    #[arg(long)]
    pub ip_port: Option<i32>,

    #[arg(long)]
    pub ip_protocol: Option<i32>,

    #[arg(long)]
    pub serial_number: Option<String>,

    #[arg(long)]
    pub file: Option<String>,

    #[arg(long, allow_negative_numbers = true)]
    pub master_board: Option<i32>,

    /// Board discovery timeout in seconds
    #[arg(long)]
    pub timeout: Option<i32>,

    /// BrainFlow streamer, e.g. file://raw.csv:w
    #[arg(long)]
    pub streamer_params: Option<String>,

    /// Number of EEG channels averaged per band
    #[arg(long)]
    pub channels: Option<usize>,

    /// Bands to compute (default: theta alpha beta gamma)
    #[arg(long, value_enum, num_args = 1.., value_delimiter = ',')]
    pub bands: Option<Vec<Band>>,

    /// Window applied before the PSD
    #[arg(long, value_enum)]
    pub window: Option<WindowFunction>,

    /// Samples per analysis window (even)
    #[arg(long)]
    pub num_samples: Option<usize>,

    /// Seconds to wait after starting the stream
    #[arg(long)]
    pub warmup: Option<f64>,

    /// Seconds between cycles
    #[arg(long)]
    pub interval: Option<f64>,

    /// Where output_<timestamp>.csv is written (default: <program dir>/archive)
    #[arg(long)]
    pub archive_dir: Option<PathBuf>,

    /// Drive the feedback controller from this column every cycle
    #[arg(long, value_enum, requires = "threshold")]
    pub feedback_metric: Option<Metric>,

    #[arg(long, allow_negative_numbers = true)]
    pub threshold: Option<f64>,

    #[arg(long, default_value_t = 0.0)]
    pub margin: f64,

    #[command(flatten)]
    pub keys: KeyArgs,

    /// Log feedback keys instead of sending them
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,
}

#[derive(Args, Debug)]
pub struct KeyArgs {
    /// Key pressed when the metric is below the dead zone
    #[arg(long, default_value_t = 'd')]
    pub up_key: char,

    /// Key pressed when the metric is above the dead zone
    #[arg(long, default_value_t = 's')]
    pub down_key: char,
}

impl KeyArgs {
    pub fn key_map(&self) -> Result<KeyMap> {
        Ok(KeyMap {
            up: check_key(self.up_key)?,
            down: check_key(self.down_key)?,
        })
    }
}

#[derive(Args, Debug)]
pub struct FeedbackArgs {
    /// Current metric value
    #[arg(allow_negative_numbers = true)]
    pub metric: f64,

    #[arg(allow_negative_numbers = true)]
    pub threshold: f64,

    /// Half-width of the dead zone around the threshold
    #[arg(default_value_t = 0.0)]
    pub margin: f64,

    #[command(flatten)]
    pub keys: KeyArgs,

    /// Log the key instead of sending it
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,
}

impl RecordArgs {
    /// Config file (or defaults) with every given flag applied on top.
    pub fn to_config(&self) -> Result<RecordingConfig> {
        let mut config = match &self.config {
            Some(path) => RecordingConfig::from_json_file(path)?,
            None => RecordingConfig::default(),
        };
        let board = &mut config.board;
        if let Some(backend) = self.backend {
            board.backend = backend;
        }
        if let Some(id) = self.board_id {
            board.board_id = id;
        }
        if let Some(path) = &self.library_path {
            board.library_path = Some(path.clone());
        }
        override_string(&mut board.serial_port, &self.serial_port);
        override_string(&mut board.mac_address, &self.mac_address);
        override_string(&mut board.ip_address, &self.ip_address);
        override_string(&mut board.serial_number, &self.serial_number);
        override_string(&mut board.file, &self.file);
        override_string(&mut board.streamer_params, &self.streamer_params);
        if let Some(port) = self.ip_port {
            board.ip_port = port;
        }
        if let Some(protocol) = self.ip_protocol {
            board.ip_protocol = protocol;
        }
        if let Some(master) = self.master_board {
            board.master_board = master;
        }
        if let Some(timeout) = self.timeout {
            board.timeout = timeout;
        }

        if let Some(channels) = self.channels {
            config.eeg_channel_count = channels;
        }
        if let Some(bands) = &self.bands {
            config.bands = BandSelection::only(bands);
        }
        if let Some(window) = self.window {
            config.window = window;
        }
        if let Some(n) = self.num_samples {
            config.num_samples = n;
        }
        if let Some(secs) = self.warmup {
            config.warmup_secs = secs;
        }
        if let Some(secs) = self.interval {
            config.interval_secs = secs;
        }
        if let Some(dir) = &self.archive_dir {
            config.archive_dir = Some(dir.clone());
        }
        config.validate()?;
        Ok(config)
    }

    /// Per-cycle controller settings; `bands` is what the recording computes.
    pub fn feedback(&self, bands: &BandSelection) -> Result<Option<FeedbackSettings>> {
        let Some(metric) = self.feedback_metric else {
            return Ok(None);
        };
        metric.check_bands(bands)?;
        let threshold = self.threshold.ok_or_else(|| {
            OscillationError::Config("--feedback-metric needs --threshold".into())
        })?;
        Ok(Some(FeedbackSettings {
            metric,
            threshold,
            margin: checked_margin(self.margin)?,
            keys: self.keys.key_map()?,
        }))
    }
}

fn override_string(target: &mut String, value: &Option<String>) {
    if let Some(value) = value {
        target.clone_from(value);
    }
}

/// The dead zone is `threshold ± margin`, so the margin cannot be negative.
pub fn checked_margin(margin: f64) -> Result<f64> {
    if margin.is_finite() && margin >= 0.0 {
        Ok(margin)
    } else {
        Err(OscillationError::Config(format!(
            "margin must be a non-negative number, got {margin}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Cli {
        let argv = std::iter::once("neural-oscillations").chain(args.iter().copied());
        Cli::try_parse_from(argv).unwrap()
    }

    fn record(args: &[&str]) -> RecordArgs {
        let mut full = vec!["record"];
        full.extend_from_slice(args);
        match parse(&full).command {
            Command::Record(args) => args,
            Command::Feedback(_) => unreachable!(),
        }
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn no_flags_gives_defaults() {
        assert_eq!(record(&[]).to_config().unwrap(), RecordingConfig::default());
    }

    #[test]
    fn flags_override_defaults() {
        let args = record(&[
            "--backend",
            "synthetic",
            "--board-id",
            "-1",
            "--serial-port",
            "COM3",
            "--channels",
            "4",
            "--bands",
            "delta,theta,alpha",
            "--window",
            "hanning",
            "--interval",
            "0.5",
        ]);
        let config = args.to_config().unwrap();
        assert_eq!(config.board.backend, BoardBackend::Synthetic);
        assert_eq!(config.board.board_id, -1);
        assert_eq!(config.board.serial_port, "COM3");
        assert_eq!(config.eeg_channel_count, 4);
        assert!(config.bands.delta && !config.bands.beta);
        assert_eq!(config.window, WindowFunction::Hanning);
        assert_eq!(config.interval_secs, 0.5);
    }

    #[test]
    fn invalid_values_are_config_errors() {
        assert!(matches!(
            record(&["--channels", "0"]).to_config(),
            Err(OscillationError::Config(_))
        ));
        assert!(matches!(
            record(&["--num-samples", "511"]).to_config(),
            Err(OscillationError::Config(_))
        ));
    }

    #[test]
    fn feedback_settings_for_record() {
        let bands = BandSelection::default();
        assert!(record(&[]).feedback(&bands).unwrap().is_none());
        let args = record(&["--feedback-metric", "tar", "--threshold", "1.2", "--margin", "0.1"]);
        let settings = args.feedback(&bands).unwrap().unwrap();
        assert_eq!(settings.metric, Metric::Tar);
        assert_eq!(settings.threshold, 1.2);
        assert_eq!(settings.keys, KeyMap::default());
    }

    #[test]
    fn feedback_metric_requires_threshold() {
        let parsed =
            Cli::try_parse_from(["neural-oscillations", "record", "--feedback-metric", "tar"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn feedback_metric_on_a_disabled_band_is_rejected() {
        let args = record(&[
            "--bands",
            "theta,alpha,gamma",
            "--feedback-metric",
            "tbr",
            "--threshold",
            "1.0",
        ]);
        let config = args.to_config().unwrap();
        assert!(matches!(
            args.feedback(&config.bands),
            Err(OscillationError::Config(msg)) if msg.contains("beta")
        ));
        let args = record(&[
            "--bands",
            "theta,alpha",
            "--feedback-metric",
            "tar",
            "--threshold",
            "1",
        ]);
        assert!(args.feedback(&args.to_config().unwrap().bands).unwrap().is_some());
    }

    #[test]
    fn feedback_subcommand_takes_positionals() {
        match parse(&["-v", "feedback", "5.0", "4.0", "0.5", "--dry-run"]).command {
            Command::Feedback(args) => {
                assert_eq!((args.metric, args.threshold, args.margin), (5.0, 4.0, 0.5));
                assert!(args.dry_run);
                assert_eq!(args.keys.key_map().unwrap(), KeyMap::default());
            }
            Command::Record(_) => unreachable!(),
        }
    }

    #[test]
    fn negative_margin_is_rejected() {
        assert!(checked_margin(-0.1).is_err());
        assert!(checked_margin(f64::NAN).is_err());
        assert_eq!(checked_margin(0.0).unwrap(), 0.0);
    }
}
