#![deny(warnings)]

//! Core domain models and invariants for the duopoly pricing simulation.
//!
//! This crate defines the serializable types shared across the simulation
//! with validation helpers to guarantee basic invariants: market parameters,
//! the price band, per-firm period outcomes, reasoning records, the audit
//! trail, and run metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Identifier for one of the two duopoly firms (0 or 1).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FirmId(u8);

impl FirmId {
    /// Both firms, in decision order.
    pub const BOTH: [FirmId; 2] = [FirmId(0), FirmId(1)];

    /// Build a firm id; only 0 and 1 exist in a duopoly.
    pub fn new(index: u8) -> Option<FirmId> {
        (index < 2).then_some(FirmId(index))
    }

    /// Index into per-firm arrays.
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// The competing firm.
    pub fn rival(self) -> FirmId {
        FirmId(1 - self.0)
    }
}

impl fmt::Display for FirmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "firm_{}", self.0)
    }
}

/// Prompt framing handed to the pricing oracle. Both variants share the same
/// instruction base; they differ only in how exploration is framed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PromptVariant {
    /// "P1": avoid actions that undermine profitability.
    #[serde(rename = "P1")]
    Defensive,
    /// "P2": aggressive pricing to outperform the competitor.
    #[serde(rename = "P2")]
    Offensive,
}

impl PromptVariant {
    /// Short label used in run directory names and metadata ("P1"/"P2").
    pub fn label(self) -> &'static str {
        match self {
            PromptVariant::Defensive => "P1",
            PromptVariant::Offensive => "P2",
        }
    }
}

impl fmt::Display for PromptVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for PromptVariant {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "P1" | "p1" | "defensive" => Ok(PromptVariant::Defensive),
            "P2" | "p2" | "offensive" => Ok(PromptVariant::Offensive),
            other => Err(ValidationError::UnknownPromptVariant(other.to_string())),
        }
    }
}

/// Logit Bertrand market parameters, symmetric across both firms.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct MarketParams {
    /// Scale parameter β for quantity sold.
    pub beta: f64,
    /// Product quality g (average consumer utility).
    pub quality: f64,
    /// Substitutability μ (> 0).
    pub substitutability: f64,
    /// Marginal cost c for both firms.
    pub marginal_cost: f64,
}

impl Default for MarketParams {
    fn default() -> Self {
        MarketParams {
            beta: 100.0,
            quality: 2.0,
            substitutability: 0.4,
            marginal_cost: 1.0,
        }
    }
}

/// Admissible price range. Prices the oracle proposes outside the band are
/// clipped to the nearer bound, never rejected.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct PriceBand {
    /// Lowest price the firm will accept.
    pub min: f64,
    /// Highest price consumers will bear.
    pub max: f64,
}

impl Default for PriceBand {
    fn default() -> Self {
        PriceBand {
            min: 1.40,
            max: 2.20,
        }
    }
}

impl PriceBand {
    /// Clip a price into the band. Returns the admissible price and whether
    /// clipping occurred.
    pub fn clip(&self, price: f64) -> (f64, bool) {
        if price < self.min {
            (self.min, true)
        } else if price > self.max {
            (self.max, true)
        } else {
            (price, false)
        }
    }
}

/// Simulation run parameters.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct SimParams {
    /// Number of decision periods per run (period 0 is the seeded opener).
    pub num_periods: u32,
    /// Rolling window of past outcomes shown to a firm (N).
    pub history_length: usize,
    /// Rolling window of past reasoning entries shown to a firm (M).
    /// Kept independent of `history_length`: recent strategic context is a
    /// much shorter window than the full outcome table.
    pub reasoning_history_length: usize,
}

impl Default for SimParams {
    fn default() -> Self {
        SimParams {
            num_periods: 100,
            history_length: 30,
            reasoning_history_length: 3,
        }
    }
}

/// Analytic benchmarks for the default market parameterization.
pub mod benchmarks {
    /// Symmetric Nash equilibrium price.
    pub const NASH_PRICE: f64 = 1.68;
    /// Per-firm profit at the Nash equilibrium.
    pub const NASH_PROFIT: f64 = 27.7;
    /// Joint-monopoly price.
    pub const MONOPOLY_PRICE: f64 = 2.07;
    /// Per-firm profit at the monopoly price.
    pub const MONOPOLY_PROFIT: f64 = 33.5;
}

/// One firm's view of a resolved period. Immutable once written.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PeriodOutcome {
    /// Period number, 0-based.
    pub period: u32,
    /// Price this firm set (after clipping).
    pub own_price: f64,
    /// Quantity this firm sold.
    pub own_sales: f64,
    /// Profit this firm earned; negative when priced below cost.
    pub own_profit: f64,
    /// This firm's share of total sales, in percent.
    pub market_share: f64,
    /// Price the competitor set (after clipping).
    pub competitor_price: f64,
}

/// One entry of a firm's rolling reasoning log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReasoningEntry {
    /// Period the reasoning belongs to; `None` for legacy records that
    /// predate period tracking.
    pub period: Option<u32>,
    /// Raw reasoning text returned by the oracle.
    pub reasoning: String,
}

/// One period of the append-only audit trail: both firms' outcomes in flat
/// form plus the raw reasoning behind each decision.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub period: u32,
    pub price_0: f64,
    pub price_1: f64,
    pub demand_0: f64,
    pub demand_1: f64,
    pub profit_0: f64,
    pub profit_1: f64,
    pub market_share_0: f64,
    pub market_share_1: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_0: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_1: Option<String>,
}

/// Terminal state of a run. Written only when every period resolved; an
/// aborted run leaves no metadata at all, so the presence of this record is
/// the external success signal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Completed,
}

/// Metadata describing one completed run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunMetadata {
    pub prompt_variant: PromptVariant,
    pub run_id: u32,
    pub num_periods: u32,
    pub status: RunStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub elapsed_seconds: u64,
}

/// Round to 2 decimal places for storage. Computation stays at full f64
/// precision; rounding happens once, at the storage boundary.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Validation errors for domain invariants.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    /// β must be finite and strictly positive.
    #[error("beta must be finite and > 0, got {0}")]
    InvalidBeta(f64),
    /// μ must be finite and strictly positive.
    #[error("substitutability must be finite and > 0, got {0}")]
    InvalidSubstitutability(f64),
    /// Quality and cost must be finite; cost must be non-negative.
    #[error("invalid quality or marginal cost")]
    InvalidQualityOrCost,
    /// Price band bounds must be finite, positive, and ordered.
    #[error("price band [{0}, {1}] is not a valid range")]
    InvalidPriceBand(f64, f64),
    /// History windows must hold at least one record.
    #[error("history window must be >= 1")]
    EmptyHistoryWindow,
    /// Unrecognized prompt variant label.
    #[error("unknown prompt variant: {0}")]
    UnknownPromptVariant(String),
}

/// Validate market parameters.
pub fn validate_market_params(p: &MarketParams) -> Result<(), ValidationError> {
    if !p.beta.is_finite() || p.beta <= 0.0 {
        return Err(ValidationError::InvalidBeta(p.beta));
    }
    if !p.substitutability.is_finite() || p.substitutability <= 0.0 {
        return Err(ValidationError::InvalidSubstitutability(p.substitutability));
    }
    if !p.quality.is_finite() || !p.marginal_cost.is_finite() || p.marginal_cost < 0.0 {
        return Err(ValidationError::InvalidQualityOrCost);
    }
    Ok(())
}

/// Validate the price band.
pub fn validate_price_band(b: &PriceBand) -> Result<(), ValidationError> {
    if !b.min.is_finite() || !b.max.is_finite() || b.min <= 0.0 || b.min >= b.max {
        return Err(ValidationError::InvalidPriceBand(b.min, b.max));
    }
    Ok(())
}

/// Validate simulation parameters.
pub fn validate_sim_params(s: &SimParams) -> Result<(), ValidationError> {
    if s.history_length == 0 || s.reasoning_history_length == 0 {
        return Err(ValidationError::EmptyHistoryWindow);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn firm_ids_are_a_duopoly() {
        assert_eq!(FirmId::new(0).unwrap().rival(), FirmId::new(1).unwrap());
        assert_eq!(FirmId::new(1).unwrap().rival(), FirmId::new(0).unwrap());
        assert_eq!(FirmId::new(2), None);
        assert_eq!(FirmId::BOTH[0].to_string(), "firm_0");
    }

    #[test]
    fn prompt_variant_labels_roundtrip() {
        for v in [PromptVariant::Defensive, PromptVariant::Offensive] {
            let back: PromptVariant = v.label().parse().unwrap();
            assert_eq!(back, v);
        }
        assert!("P3".parse::<PromptVariant>().is_err());
    }

    #[test]
    fn default_params_validate() {
        validate_market_params(&MarketParams::default()).unwrap();
        validate_price_band(&PriceBand::default()).unwrap();
        validate_sim_params(&SimParams::default()).unwrap();
    }

    #[test]
    fn invalid_params_are_rejected() {
        let mut p = MarketParams::default();
        p.substitutability = 0.0;
        assert_eq!(
            validate_market_params(&p),
            Err(ValidationError::InvalidSubstitutability(0.0))
        );
        let b = PriceBand { min: 2.0, max: 1.0 };
        assert!(validate_price_band(&b).is_err());
    }

    #[test]
    fn clip_is_observable() {
        let band = PriceBand::default();
        assert_eq!(band.clip(5.00), (2.20, true));
        assert_eq!(band.clip(0.10), (1.40, true));
        assert_eq!(band.clip(1.85), (1.85, false));
        // Bounds themselves are admissible.
        assert_eq!(band.clip(1.40), (1.40, false));
        assert_eq!(band.clip(2.20), (2.20, false));
    }

    #[test]
    fn round2_is_storage_rounding() {
        assert_eq!(round2(27.6666), 27.67);
        assert_eq!(round2(1.684999), 1.68);
        assert_eq!(round2(-0.005), -0.01);
    }

    #[test]
    fn serde_roundtrip_outcome() {
        let o = PeriodOutcome {
            period: 7,
            own_price: 1.85,
            own_sales: 45.12,
            own_profit: 38.35,
            market_share: 51.02,
            competitor_price: 1.90,
        };
        let s = serde_json::to_string(&o).unwrap();
        let back: PeriodOutcome = serde_json::from_str(&s).unwrap();
        assert_eq!(back, o);
    }

    #[test]
    fn audit_record_omits_absent_reasoning() {
        let r = AuditRecord {
            period: 1,
            price_0: 1.68,
            price_1: 1.68,
            demand_0: 40.0,
            demand_1: 40.0,
            profit_0: 27.2,
            profit_1: 27.2,
            market_share_0: 50.0,
            market_share_1: 50.0,
            reasoning_0: None,
            reasoning_1: Some("hold at equilibrium".into()),
        };
        let s = serde_json::to_string(&r).unwrap();
        assert!(!s.contains("reasoning_0"));
        assert!(s.contains("reasoning_1"));
    }

    #[test]
    fn run_status_serializes_lowercase() {
        let s = serde_json::to_string(&RunStatus::Completed).unwrap();
        assert_eq!(s, "\"completed\"");
    }

    proptest! {
        #[test]
        fn clipped_price_is_always_in_band(p in -100.0f64..100.0) {
            let band = PriceBand::default();
            let (clipped, _) = band.clip(p);
            prop_assert!(clipped >= band.min && clipped <= band.max);
        }

        #[test]
        fn round2_stays_within_half_a_cent(v in -1_000.0f64..1_000.0) {
            prop_assert!((round2(v) - v).abs() <= 0.005 + 1e-9);
        }
    }
}
