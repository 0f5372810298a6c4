#![deny(warnings)]

//! Logit Bertrand market model for the differentiated-product duopoly.
//!
//! Demand for firm i is
//!
//! ```text
//! d_i = β · exp((g − p_i)/μ) / (exp((g − p_i)/μ) + exp((g − p_j)/μ) + 1)
//! ```
//!
//! and profit is `π_i = (p_i − c) · d_i`. The `+ 1` in the denominator is the
//! outside option (a consumer may buy from neither firm), which keeps total
//! demand strictly below β and the denominator strictly positive.

use serde::{Deserialize, Serialize};
use sim_core::{round2, validate_market_params, MarketParams, ValidationError};
use thiserror::Error;

/// Errors produced when constructing the market.
#[derive(Debug, Error, PartialEq)]
pub enum EconError {
    /// Market parameters failed validation.
    #[error("invalid market parameters: {0}")]
    InvalidParams(#[from] ValidationError),
}

/// One firm's market outcome for a period, rounded for storage.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FirmOutcome {
    /// Price the firm charged.
    pub price: f64,
    /// Quantity sold.
    pub demand: f64,
    /// Profit earned; negative when the price is below marginal cost.
    pub profit: f64,
    /// Share of total sales, in percent.
    pub market_share: f64,
}

/// Both firms' outcomes for one cleared period.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PeriodResult {
    pub firms: [FirmOutcome; 2],
}

/// The symmetric logit Bertrand duopoly market.
#[derive(Clone, Copy, Debug)]
pub struct LogitMarket {
    params: MarketParams,
}

impl LogitMarket {
    /// Build a market from validated parameters.
    pub fn new(params: MarketParams) -> Result<Self, EconError> {
        validate_market_params(&params)?;
        Ok(LogitMarket { params })
    }

    /// The parameters this market was built with.
    pub fn params(&self) -> &MarketParams {
        &self.params
    }

    /// Exponential utility term `exp((g − p)/μ)`.
    pub fn utility(&self, price: f64) -> f64 {
        ((self.params.quality - price) / self.params.substitutability).exp()
    }

    /// Demand for the firm charging `own_price` against `rival_price`.
    pub fn demand(&self, own_price: f64, rival_price: f64) -> f64 {
        let own = self.utility(own_price);
        let rival = self.utility(rival_price);
        // exp(0) = 1: the outside option's fixed utility mass.
        let outside_option = 1.0;
        self.params.beta * own / (own + rival + outside_option)
    }

    /// Profit `(p − c) · d`. May be negative; that is a pricing mistake by
    /// the decision-maker, not a model fault.
    pub fn profit(&self, price: f64, demand: f64) -> f64 {
        (price - self.params.marginal_cost) * demand
    }

    /// Market share in percent. Zero total demand splits 50/50.
    pub fn market_share(own_demand: f64, rival_demand: f64) -> f64 {
        let total = own_demand + rival_demand;
        if total == 0.0 {
            return 50.0;
        }
        100.0 * own_demand / total
    }

    /// Clear one period given both firms' prices. All outputs are rounded to
    /// 2 decimals for storage; intermediate math runs at full precision.
    pub fn simulate_period(&self, price_0: f64, price_1: f64) -> PeriodResult {
        let demand_0 = self.demand(price_0, price_1);
        let demand_1 = self.demand(price_1, price_0);

        let profit_0 = self.profit(price_0, demand_0);
        let profit_1 = self.profit(price_1, demand_1);

        let share_0 = Self::market_share(demand_0, demand_1);
        let share_1 = Self::market_share(demand_1, demand_0);

        PeriodResult {
            firms: [
                FirmOutcome {
                    price: round2(price_0),
                    demand: round2(demand_0),
                    profit: round2(profit_0),
                    market_share: round2(share_0),
                },
                FirmOutcome {
                    price: round2(price_1),
                    demand: round2(demand_1),
                    profit: round2(profit_1),
                    market_share: round2(share_1),
                },
            ],
        }
    }
}
