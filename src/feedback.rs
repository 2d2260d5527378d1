// src/feedback.rs
use crate::acquisition::CycleHook;
use crate::bands::{Band, BandPowers, BandSelection};
use crate::error::{OscillationError, Result};
use crate::ratios::{RatioKind, RatioOutcome};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    Up,
    Down,
    None,
}

/// Above `threshold + margin` → Down, below `threshold - margin` → Up.
/// The band in between, both edges included, is a dead zone. NaN never acts.
pub fn threshold_control(metric: f64, threshold: f64, margin: f64) -> Action {
    if metric > threshold + margin {
        Action::Down
    } else if metric < threshold - margin {
        Action::Up
    } else {
        Action::None
    }
}

/// Keys sent for each action.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyMap {
    pub up: char,
    pub down: char,
}

impl Default for KeyMap {
    fn default() -> Self {
        Self { up: 'd', down: 's' }
    }
}

impl KeyMap {
    pub fn key_for(&self, action: Action) -> Option<char> {
        match action {
            Action::Up => Some(self.up),
            Action::Down => Some(self.down),
            Action::None => None,
        }
    }
}

/// Something that can emit a single keystroke.
pub trait KeyPresser {
    fn press_key(&mut self, key: char) -> Result<()>;
}

/// Presses the mapped key, if any. Returns the key that was sent.
pub fn dispatch(
    action: Action,
    keys: &KeyMap,
    presser: &mut dyn KeyPresser,
) -> Result<Option<char>> {
    let Some(key) = keys.key_for(action) else {
        return Ok(None);
    };
    presser.press_key(key)?;
    Ok(Some(key))
}

/// Which per-cycle value drives the controller.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Theta,
    Alpha,
    Beta,
    Gamma,
    Tar,
    Tbr,
    Tgr,
    Abr,
    Agr,
    Bgr,
}

/// Where a metric's value comes from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum MetricSource {
    Band(Band),
    Ratio(RatioKind),
}

impl Metric {
    fn source(self) -> MetricSource {
        match self {
            Metric::Theta => MetricSource::Band(Band::Theta),
            Metric::Alpha => MetricSource::Band(Band::Alpha),
            Metric::Beta => MetricSource::Band(Band::Beta),
            Metric::Gamma => MetricSource::Band(Band::Gamma),
            Metric::Tar => MetricSource::Ratio(RatioKind::ThetaAlpha),
            Metric::Tbr => MetricSource::Ratio(RatioKind::ThetaBeta),
            Metric::Tgr => MetricSource::Ratio(RatioKind::ThetaGamma),
            Metric::Abr => MetricSource::Ratio(RatioKind::AlphaBeta),
            Metric::Agr => MetricSource::Ratio(RatioKind::AlphaGamma),
            Metric::Bgr => MetricSource::Ratio(RatioKind::BetaGamma),
        }
    }

    /// Bands that must be computed for the metric to mean anything.
    pub fn required_bands(self) -> Vec<Band> {
        match self.source() {
            MetricSource::Band(band) => vec![band],
            MetricSource::Ratio(kind) => {
                let (num, den) = kind.bands();
                vec![num, den]
            }
        }
    }

    /// `None` when this cycle only has a placeholder for the metric.
    pub fn value(self, powers: &BandPowers, outcome: &RatioOutcome) -> Option<f64> {
        match self.source() {
            MetricSource::Band(band) => powers
                .computed
                .is_enabled(band)
                .then(|| powers.get(band)),
            MetricSource::Ratio(kind) => outcome.measured(kind, &powers.computed),
        }
    }

    /// Fails if a band the metric needs is switched off.
    pub fn check_bands(self, bands: &BandSelection) -> Result<()> {
        match self.required_bands().into_iter().find(|b| !bands.is_enabled(*b)) {
            Some(band) => Err(OscillationError::Config(format!(
                "feedback metric {self:?} needs the {} band, which is disabled",
                band.name()
            ))),
            None => Ok(()),
        }
    }
}

/// Threshold controller parameters for a recording.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FeedbackSettings {
    pub metric: Metric,
    pub threshold: f64,
    pub margin: f64,
    pub keys: KeyMap,
}

/// Runs the threshold controller on every acquisition cycle.
pub struct FeedbackHook {
    settings: FeedbackSettings,
    presser: Box<dyn KeyPresser>,
}

impl FeedbackHook {
    pub fn new(settings: FeedbackSettings, presser: Box<dyn KeyPresser>) -> Self {
        Self { settings, presser }
    }
}

impl CycleHook for FeedbackHook {
    fn on_cycle(&mut self, cycle: usize, powers: &BandPowers, outcome: &RatioOutcome) {
        let FeedbackSettings {
            metric,
            threshold,
            margin,
            keys,
        } = self.settings;
        let Some(value) = metric.value(powers, outcome) else {
            log::debug!("cycle {cycle}: {metric:?} not measured, no key sent");
            return;
        };
        let action = threshold_control(value, threshold, margin);
        match dispatch(action, &keys, self.presser.as_mut()) {
            Ok(Some(key)) => {
                log::debug!("cycle {cycle}: {metric:?} = {value:.6}, pressed '{key}'")
            }
            Ok(None) => {}
            // A missed keypress must not end the recording.
            Err(err) => log::warn!("cycle {cycle}: feedback key not sent: {err}"),
        }
    }
}
