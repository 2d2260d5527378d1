// src/series.rs
use crate::bands::BandPowers;
use crate::ratios::RatioOutcome;

/// Column names in file order.
pub const COLUMN_NAMES: [&str; 10] = [
    "Theta_pow", "Alpha_pow", "Beta_pow", "Gamma_pow", "TAR", "TBR", "TGR", "ABR", "AGR", "BGR",
];

/// Ten parallel per-cycle sequences; index `i` is the same cycle everywhere.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TimeSeries {
    theta: Vec<f64>,
    alpha: Vec<f64>,
    beta: Vec<f64>,
    gamma: Vec<f64>,
    tar: Vec<f64>,
    tbr: Vec<f64>,
    tgr: Vec<f64>,
    abr: Vec<f64>,
    agr: Vec<f64>,
    bgr: Vec<f64>,
    flagged_cycles: Vec<usize>,
}

impl TimeSeries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, powers: &BandPowers, outcome: &RatioOutcome) {
        if outcome.is_flagged() {
            self.flagged_cycles.push(self.len());
        }
        self.theta.push(powers.theta);
        self.alpha.push(powers.alpha);
        self.beta.push(powers.beta);
        self.gamma.push(powers.gamma);
        let r = &outcome.ratios;
        self.tar.push(r.tar);
        self.tbr.push(r.tbr);
        self.tgr.push(r.tgr);
        self.abr.push(r.abr);
        self.agr.push(r.agr);
        self.bgr.push(r.bgr);
    }

    pub fn len(&self) -> usize {
        self.theta.len()
    }

    pub fn is_empty(&self) -> bool {
        self.theta.is_empty()
    }

    /// Cycles where at least one ratio fell back to the sentinel.
    pub fn flagged_cycles(&self) -> &[usize] {
        &self.flagged_cycles
    }

    pub fn columns(&self) -> [(&'static str, &[f64]); 10] {
        [
            (COLUMN_NAMES[0], self.theta.as_slice()),
            (COLUMN_NAMES[1], self.alpha.as_slice()),
            (COLUMN_NAMES[2], self.beta.as_slice()),
            (COLUMN_NAMES[3], self.gamma.as_slice()),
            (COLUMN_NAMES[4], self.tar.as_slice()),
            (COLUMN_NAMES[5], self.tbr.as_slice()),
            (COLUMN_NAMES[6], self.tgr.as_slice()),
            (COLUMN_NAMES[7], self.abr.as_slice()),
            (COLUMN_NAMES[8], self.agr.as_slice()),
            (COLUMN_NAMES[9], self.bgr.as_slice()),
        ]
    }
}
