// src/ratios.rs
use crate::bands::{Band, BandPowers, BandSelection};
use crate::error::{OscillationError, Result};

/// Denominators with a smaller magnitude count as zero.
pub const RATIO_EPSILON: f64 = 1e-12;
/// Value recorded in place of a ratio that could not be computed.
pub const RATIO_SENTINEL: f64 = 0.0;

/// The six band ratios, in column order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RatioKind {
    ThetaAlpha,
    ThetaBeta,
    ThetaGamma,
    AlphaBeta,
    AlphaGamma,
    BetaGamma,
}

impl RatioKind {
    pub const ALL: [RatioKind; 6] = [
        RatioKind::ThetaAlpha,
        RatioKind::ThetaBeta,
        RatioKind::ThetaGamma,
        RatioKind::AlphaBeta,
        RatioKind::AlphaGamma,
        RatioKind::BetaGamma,
    ];

    pub fn bands(self) -> (Band, Band) {
        match self {
            RatioKind::ThetaAlpha => (Band::Theta, Band::Alpha),
            RatioKind::ThetaBeta => (Band::Theta, Band::Beta),
            RatioKind::ThetaGamma => (Band::Theta, Band::Gamma),
            RatioKind::AlphaBeta => (Band::Alpha, Band::Beta),
            RatioKind::AlphaGamma => (Band::Alpha, Band::Gamma),
            RatioKind::BetaGamma => (Band::Beta, Band::Gamma),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            RatioKind::ThetaAlpha => "TAR",
            RatioKind::ThetaBeta => "TBR",
            RatioKind::ThetaGamma => "TGR",
            RatioKind::AlphaBeta => "ABR",
            RatioKind::AlphaGamma => "AGR",
            RatioKind::BetaGamma => "BGR",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Ratios {
    pub tar: f64,
    pub tbr: f64,
    pub tgr: f64,
    pub abr: f64,
    pub agr: f64,
    pub bgr: f64,
}

impl Ratios {
    pub fn get(&self, kind: RatioKind) -> f64 {
        match kind {
            RatioKind::ThetaAlpha => self.tar,
            RatioKind::ThetaBeta => self.tbr,
            RatioKind::ThetaGamma => self.tgr,
            RatioKind::AlphaBeta => self.abr,
            RatioKind::AlphaGamma => self.agr,
            RatioKind::BetaGamma => self.bgr,
        }
    }

    fn set(&mut self, kind: RatioKind, value: f64) {
        match kind {
            RatioKind::ThetaAlpha => self.tar = value,
            RatioKind::ThetaBeta => self.tbr = value,
            RatioKind::ThetaGamma => self.tgr = value,
            RatioKind::AlphaBeta => self.abr = value,
            RatioKind::AlphaGamma => self.agr = value,
            RatioKind::BetaGamma => self.bgr = value,
        }
    }

    #[cfg(test)]
    pub fn as_array(&self) -> [f64; 6] {
        RatioKind::ALL.map(|kind| self.get(kind))
    }
}

/// Ratios for one cycle plus the ones that hit a zero denominator.
#[derive(Clone, Debug, PartialEq)]
pub struct RatioOutcome {
    pub ratios: Ratios,
    pub flagged: Vec<RatioKind>,
}

impl RatioOutcome {
    pub fn is_flagged(&self) -> bool {
        !self.flagged.is_empty()
    }

    /// The ratio, unless it is a sentinel (zero denominator or a band that
    /// was not computed).
    pub fn measured(&self, kind: RatioKind, computed: &BandSelection) -> Option<f64> {
        let (num, den) = kind.bands();
        if !computed.is_enabled(num) || !computed.is_enabled(den) || self.flagged.contains(&kind) {
            return None;
        }
        Some(self.ratios.get(kind))
    }
}

pub fn guarded_ratio(numerator: f64, denominator: f64) -> Result<f64> {
    if !denominator.is_finite() || denominator.abs() < RATIO_EPSILON {
        return Err(OscillationError::DivisionByZero {
            numerator,
            denominator,
        });
    }
    Ok(numerator / denominator)
}

/// Computes all six ratios. Zero denominators become [`RATIO_SENTINEL`] and
/// are listed in `flagged`; ratios that involve a band that was not computed
/// are the sentinel without being flagged.
pub fn compute_ratios(powers: &BandPowers) -> RatioOutcome {
    let mut ratios = Ratios::default();
    let mut flagged = Vec::new();
    for kind in RatioKind::ALL {
        let (num, den) = kind.bands();
        if !powers.computed.is_enabled(num) || !powers.computed.is_enabled(den) {
            ratios.set(kind, RATIO_SENTINEL);
            continue;
        }
        match guarded_ratio(powers.get(num), powers.get(den)) {
            Ok(value) => ratios.set(kind, value),
            Err(err) => {
                log::debug!("{}: {err}", kind.label());
                ratios.set(kind, RATIO_SENTINEL);
                flagged.push(kind);
            }
        }
    }
    RatioOutcome { ratios, flagged }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_powers_give_reference_ratios() {
        let outcome = compute_ratios(&BandPowers::new(2.0, 4.0, 1.0, 0.5));
        let r = outcome.ratios;
        assert_eq!(r.tar, 0.5);
        assert_eq!(r.tbr, 2.0);
        assert_eq!(r.tgr, 4.0);
        assert_eq!(r.abr, 4.0);
        assert_eq!(r.agr, 8.0);
        assert_eq!(r.bgr, 2.0);
        assert!(!outcome.is_flagged());
        assert_eq!(r.as_array(), [0.5, 2.0, 4.0, 4.0, 8.0, 2.0]);
    }

    #[test]
    fn same_input_same_output() {
        let powers = BandPowers::new(1.3, 0.7, 2.9, 0.11);
        assert_eq!(compute_ratios(&powers), compute_ratios(&powers));
    }

    #[test]
    fn non_negative_inputs_give_non_negative_ratios() {
        let samples = [0.0, 1e-13, 1e-6, 0.25, 1.0, 3.5, 1e6];
        for &t in &samples {
            for &a in &samples {
                for &b in &samples {
                    for &g in &samples {
                        let out = compute_ratios(&BandPowers::new(t, a, b, g));
                        for v in out.ratios.as_array() {
                            assert!(v >= 0.0 && v.is_finite(), "{t} {a} {b} {g} -> {v}");
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn zero_alpha_is_flagged_not_infinite() {
        let out = compute_ratios(&BandPowers::new(1.0, 0.0, 2.0, 4.0));
        assert_eq!(out.ratios.tar, RATIO_SENTINEL);
        assert_eq!(out.ratios.agr, 0.0);
        assert_eq!(out.ratios.tbr, 0.5);
        assert_eq!(out.flagged, vec![RatioKind::ThetaAlpha]);
        assert!(out.ratios.as_array().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn guarded_ratio_reports_the_operands() {
        match guarded_ratio(1.0, 1e-15) {
            Err(OscillationError::DivisionByZero {
                numerator,
                denominator,
            }) => {
                assert_eq!(numerator, 1.0);
                assert_eq!(denominator, 1e-15);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(guarded_ratio(3.0, 1.5).unwrap(), 2.0);
    }

    #[test]
    fn disabled_bands_do_not_flag() {
        let mut powers = BandPowers::new(1.0, 2.0, 0.0, 0.0);
        powers.computed = BandSelection {
            beta: false,
            gamma: false,
            ..BandSelection::default()
        };
        let out = compute_ratios(&powers);
        assert_eq!(out.ratios.tar, 0.5);
        assert_eq!(out.ratios.tbr, RATIO_SENTINEL);
        assert!(!out.is_flagged());
    }

    #[test]
    fn sentinels_are_not_measurements() {
        let out = compute_ratios(&BandPowers::new(1.0, 0.0, 2.0, 4.0));
        assert_eq!(out.measured(RatioKind::ThetaAlpha, &BandSelection::default()), None);
        assert_eq!(out.measured(RatioKind::ThetaBeta, &BandSelection::default()), Some(0.5));

        let beta_off = BandSelection {
            beta: false,
            ..BandSelection::default()
        };
        assert_eq!(out.measured(RatioKind::ThetaBeta, &beta_off), None);
    }
}
