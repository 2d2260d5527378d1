// src/acquisition.rs
use crate::bands::{Band, BandAggregator, BandPowers};
use crate::board::{BoardSession, SampleWindow, SessionGuard};
use crate::config::RecordingConfig;
use crate::error::{OscillationError, Result};
use crate::ratios::{compute_ratios, RatioOutcome, Ratios};
use crate::recorder::SessionRecorder;
use crate::series::TimeSeries;
use crate::spectral::SpectralEstimator;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Longest stretch the loop sleeps without looking at the cancellation flag.
const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// Shared stop flag, set from the Ctrl-C handler.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopState {
    Uninitialized,
    SessionOpen,
    Streaming,
    Stopped,
}

/// Called after every completed cycle. `outcome.flagged` and
/// `powers.computed` tell real values from sentinels.
pub trait CycleHook {
    fn on_cycle(&mut self, cycle: usize, powers: &BandPowers, outcome: &RatioOutcome);
}

/// How a run ends without error. Cancellation is the only way out.
#[derive(Clone, Debug)]
pub enum RunOutcome {
    Cancelled(SessionReport),
}

/// What a finished run leaves behind.
#[derive(Clone, Debug)]
pub struct SessionReport {
    pub cycles: usize,
    pub flagged_cycles: usize,
    pub saved_to: PathBuf,
}

/// One console line per cycle.
pub fn format_summary(powers: &BandPowers, ratios: &Ratios) -> String {
    let mut line = format!(
        "Theta: {:.6}\tAlpha: {:.6}\tTAR: {:.6}",
        powers.theta, powers.alpha, ratios.tar
    );
    if powers.computed.delta {
        line.push_str(&format!("\tDelta: {:.6}", powers.delta));
    }
    line
}

/// Poll → band powers → ratios → print → accumulate, until cancelled.
pub struct AcquisitionLoop<E: SpectralEstimator> {
    aggregator: BandAggregator<E>,
    recorder: SessionRecorder,
    num_samples: usize,
    warmup: Duration,
    interval: Duration,
    retry_delay: Duration,
    cancel: CancellationToken,
    hook: Option<Box<dyn CycleHook>>,
    state: LoopState,
}

impl<E: SpectralEstimator> AcquisitionLoop<E> {
    pub fn new(
        config: &RecordingConfig,
        estimator: E,
        recorder: SessionRecorder,
        cancel: CancellationToken,
    ) -> Result<Self> {
        config.validate()?;
        let aggregator = BandAggregator::new(
            estimator,
            config.bands,
            config.window,
            config.eeg_channel_count,
        )?;
        Ok(Self {
            aggregator,
            recorder,
            num_samples: config.num_samples,
            warmup: config.warmup()?,
            interval: config.interval()?,
            retry_delay: config.retry_delay(),
            cancel,
            hook: None,
            state: LoopState::Uninitialized,
        })
    }

    pub fn with_hook(mut self, hook: Box<dyn CycleHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    #[cfg(test)]
    pub fn state(&self) -> LoopState {
        self.state
    }

    fn transition(&mut self, next: LoopState) {
        log::debug!("acquisition: {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Runs until cancellation. The session is stopped and released on every
    /// path; once streaming has started the collected series is saved even if
    /// the loop fails.
    pub fn run(&mut self, session: Box<dyn BoardSession>) -> Result<RunOutcome> {
        self.state = LoopState::Uninitialized;
        let mut guard = SessionGuard::new(session);
        let description = guard.session().description();

        if let Err(err) = guard.session().prepare() {
            log::error!("could not prepare {description}: {err}");
            return Err(err);
        }
        self.transition(LoopState::SessionOpen);

        let available = guard.session().eeg_channel_count();
        if available < self.aggregator.channel_count() {
            return Err(OscillationError::Config(format!(
                "{description} exposes {available} EEG channels, {} requested",
                self.aggregator.channel_count()
            )));
        }

        if let Err(err) = guard.start_stream() {
            log::error!("could not start streaming from {description}: {err}");
            return Err(err);
        }
        self.transition(LoopState::Streaming);
        let bands: Vec<&str> = self
            .aggregator
            .selection()
            .enabled()
            .into_iter()
            .map(Band::name)
            .collect();
        log::info!(
            "streaming from {description} at {} Hz; bands: {}",
            guard.session().sampling_rate(),
            bands.join(", ")
        );

        let mut series = TimeSeries::new();
        let streamed = self.stream(&mut guard, &mut series);

        if let Err(err) = guard.shutdown() {
            log::error!("shutting down {description}: {err}");
        }
        self.transition(LoopState::Stopped);

        if series.is_empty() {
            log::warn!("no cycle completed; the saved file has only a header");
        }
        let cycles = series.len();
        let flagged_cycles = series.flagged_cycles().len();
        let saved = self.recorder.save(series);
        match (streamed, saved) {
            (Ok(()), Ok(saved_to)) => Ok(RunOutcome::Cancelled(SessionReport {
                cycles,
                flagged_cycles,
                saved_to,
            })),
            (Ok(()), Err(err)) => Err(err),
            (Err(err), saved) => {
                match saved {
                    Ok(path) => {
                        log::warn!("partial session ({cycles} cycles) saved to {}", path.display())
                    }
                    Err(save_err) => log::error!("partial session lost: {save_err}"),
                }
                Err(err)
            }
        }
    }

    /// Returns `Ok(())` once cancelled.
    fn stream(&mut self, guard: &mut SessionGuard, series: &mut TimeSeries) -> Result<()> {
        if !self.sleep(self.warmup) {
            return Ok(());
        }
        loop {
            if self.cancel.is_cancelled() {
                return Ok(());
            }
            let Some(window) = self.read_window(guard.session())? else {
                return Ok(());
            };
            let powers = self.aggregator.aggregate(&window)?;
            let outcome = compute_ratios(&powers);
            if outcome.is_flagged() {
                let labels: Vec<&str> = outcome.flagged.iter().map(|kind| kind.label()).collect();
                log::warn!(
                    "cycle {}: zero denominator in {}; recorded as 0",
                    series.len(),
                    labels.join(", ")
                );
            }
            println!("{}", format_summary(&powers, &outcome.ratios));
            series.push(&powers, &outcome);
            if let Some(hook) = self.hook.as_mut() {
                hook.on_cycle(series.len() - 1, &powers, &outcome);
            }
            if !self.sleep(self.interval) {
                return Ok(());
            }
        }
    }

    /// Polls until a full window is available. `None` means cancelled.
    fn read_window(&self, session: &mut dyn BoardSession) -> Result<Option<SampleWindow>> {
        let mut attempts = 0usize;
        loop {
            if self.cancel.is_cancelled() {
                return Ok(None);
            }
            let window = session.get_latest_samples(self.num_samples)?;
            if window.num_samples() >= self.num_samples {
                return Ok(Some(window));
            }
            let shortfall = OscillationError::InsufficientData {
                requested: self.num_samples,
                available: window.num_samples(),
            };
            if attempts == 0 {
                log::warn!("{shortfall}; waiting for the buffer to fill");
            } else {
                log::debug!("{shortfall} (retry {attempts})");
            }
            attempts += 1;
            if !self.sleep(self.retry_delay) {
                return Ok(None);
            }
        }
    }

    /// Sleeps in slices; `false` if cancelled before or during the wait. A
    /// deadline past what `Instant` can represent waits for cancellation.
    fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now().checked_add(duration);
        loop {
            if self.cancel.is_cancelled() {
                return false;
            }
            let slice = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return true;
                    }
                    (deadline - now).min(SLEEP_SLICE)
                }
                None => SLEEP_SLICE,
            };
            thread::sleep(slice);
        }
    }
}
