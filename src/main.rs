// src/main.rs
mod acquisition;
mod bands;
mod board;
mod cli;
mod config;
mod error;
mod feedback;
mod keyboard;
mod ratios;
mod recorder;
mod series;
mod spectral;

use acquisition::{AcquisitionLoop, CancellationToken, RunOutcome};
use anyhow::Context;
use clap::Parser;
use cli::{Cli, Command, FeedbackArgs, RecordArgs};
use feedback::{dispatch, threshold_control, FeedbackHook};
use recorder::SessionRecorder;
use spectral::PeriodogramEstimator;

/// Exit status after Ctrl-C, as a shell reports SIGINT.
const EXIT_CANCELLED: i32 = 130;
const EXIT_FAILURE: i32 = 1;

fn main() {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp(None)
        .init();

    let exit_code = match cli.command {
        Command::Record(args) => run_record(args),
        Command::Feedback(args) => run_feedback(args),
    };
    std::process::exit(exit_code);
}

fn run_record(args: RecordArgs) -> i32 {
    match record(&args) {
        Ok(RunOutcome::Cancelled(report)) => {
            println!(
                "Stopped after {} cycles ({} with a zero denominator).",
                report.cycles, report.flagged_cycles
            );
            println!("Data has been written to {}", report.saved_to.display());
            EXIT_CANCELLED
        }
        Err(err) => {
            log::error!("{err:#}");
            eprintln!("error: {err:#}");
            EXIT_FAILURE
        }
    }
}

fn record(args: &RecordArgs) -> anyhow::Result<RunOutcome> {
    let config = args.to_config().context("invalid recording configuration")?;
    let feedback = args.feedback(&config.bands)?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    ctrlc::set_handler(move || {
        log::info!("interrupt received, finishing the current cycle");
        on_signal.cancel();
    })
    .context("failed to install the Ctrl-C handler")?;

    let recorder = SessionRecorder::new(config.resolved_archive_dir()?);
    log::info!("sessions are saved under {}", recorder.archive_dir().display());

    let mut acquisition = AcquisitionLoop::new(&config, PeriodogramEstimator, recorder, cancel)?;
    if let Some(settings) = feedback {
        log::info!(
            "feedback on {:?}: threshold {} ± {}",
            settings.metric,
            settings.threshold,
            settings.margin
        );
        let presser = keyboard::default_presser(args.dry_run);
        acquisition = acquisition.with_hook(Box::new(FeedbackHook::new(settings, presser)));
    }

    let session = board::open(&config.board)
        .with_context(|| format!("could not open board {}", config.board.board_id))?;
    Ok(acquisition.run(session)?)
}

fn run_feedback(args: FeedbackArgs) -> i32 {
    match feedback_once(&args) {
        Ok(key) => {
            match key {
                Some(key) => println!("{key}"),
                None => println!("-"),
            }
            0
        }
        Err(err) => {
            log::error!("{err:#}");
            eprintln!("error: {err:#}");
            EXIT_FAILURE
        }
    }
}

fn feedback_once(args: &FeedbackArgs) -> anyhow::Result<Option<char>> {
    let margin = cli::checked_margin(args.margin)?;
    let keys = args.keys.key_map()?;
    let action = threshold_control(args.metric, args.threshold, margin);
    log::info!(
        "metric {} vs {} ± {}: {:?}",
        args.metric,
        args.threshold,
        margin,
        action
    );
    let mut presser = keyboard::default_presser(args.dry_run);
    Ok(dispatch(action, &keys, presser.as_mut())?)
}
