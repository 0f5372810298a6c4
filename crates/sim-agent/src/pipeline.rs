//! The per-firm, per-period decision pipeline.
//!
//! One call to [`PricingAgent::decide`] performs the full loop: compose the
//! prompt, invoke the oracle, resolve the two reply channels, extract a
//! price, clip it into the band, and retry with exponential backoff on any
//! attempt failure. Only an exhausted retry budget surfaces as an error.

use crate::oracle::{Oracle, OracleError, OracleReply};
use crate::parse::{parse_price, PriceParseError};
use crate::prompts::compose_prompt;
use sim_core::{FirmId, MarketParams, PriceBand, PromptVariant};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Retry budget and backoff schedule for oracle attempts.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    /// Total attempts before the failure becomes terminal.
    pub max_attempts: u32,
    /// Base unit of the exponential schedule; attempt `k` waits
    /// `backoff_base · 2^k` before re-prompting.
    pub backoff_base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            backoff_base: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Backoff before the retry following failed attempt `attempt` (0-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        self.backoff_base * 2u32.saturating_pow(attempt.min(16))
    }
}

/// A resolved pricing decision.
#[derive(Clone, Debug, PartialEq)]
pub struct Decision {
    /// The accepted price, already clipped into the band.
    pub price: f64,
    /// Reasoning text to record alongside the decision.
    pub reasoning: String,
    /// Whether the oracle's price needed clipping.
    pub clipped: bool,
}

/// Terminal pipeline failure. Transient errors never escape `decide`; this
/// is raised only once the attempt budget is spent, and it aborts the
/// enclosing period.
#[derive(Debug, Error)]
pub enum DecisionError {
    #[error("{firm} produced no valid price after {attempts} attempts: {last_error}")]
    AttemptsExhausted {
        firm: FirmId,
        attempts: u32,
        last_error: String,
    },
}

/// Failure of a single attempt; retried until the budget runs out.
#[derive(Debug, Error)]
enum AttemptError {
    #[error(transparent)]
    Oracle(#[from] OracleError),
    #[error("empty oracle response (finish reason: {0:?})")]
    EmptyResponse(Option<String>),
    #[error(transparent)]
    Parse(#[from] PriceParseError),
}

/// Resolve the oracle's two payload channels into (content, reasoning).
///
/// Decision table over (content blank, reasoning blank):
///
/// | content | reasoning | result                               |
/// |---------|-----------|--------------------------------------|
/// | text    | text      | both kept as-is                      |
/// | text    | blank     | reasoning defaults to the content    |
/// | blank   | text      | reasoning promoted to content        |
/// | blank   | blank     | empty-response failure               |
fn resolve_channels(reply: OracleReply) -> Result<(String, String), AttemptError> {
    let OracleReply {
        content,
        reasoning,
        finish_reason,
    } = reply;
    let content = content.filter(|s| !s.trim().is_empty());
    let reasoning = reasoning.filter(|s| !s.trim().is_empty());

    match (content, reasoning) {
        (Some(c), Some(r)) => Ok((c, r)),
        (Some(c), None) => Ok((c.clone(), c)),
        (None, Some(r)) => Ok((r.clone(), r)),
        (None, None) => Err(AttemptError::EmptyResponse(finish_reason)),
    }
}

/// One firm's pricing decision-maker.
#[derive(Clone, Debug)]
pub struct PricingAgent {
    firm: FirmId,
    variant: PromptVariant,
    params: MarketParams,
    band: PriceBand,
    retry: RetryPolicy,
}

impl PricingAgent {
    pub fn new(
        firm: FirmId,
        variant: PromptVariant,
        params: MarketParams,
        band: PriceBand,
    ) -> Self {
        PricingAgent {
            firm,
            variant,
            params,
            band,
            retry: RetryPolicy::default(),
        }
    }

    /// Override the retry schedule (tests use millisecond backoffs).
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn firm(&self) -> FirmId {
        self.firm
    }

    /// Produce this period's price from the formatted history and prior
    /// reasoning. Retries transient failures; a terminal error means the
    /// attempt budget is exhausted and the period must abort.
    pub fn decide<O: Oracle>(
        &self,
        oracle: &O,
        market_history: &str,
        prior_reasoning: &str,
    ) -> Result<Decision, DecisionError> {
        let prompt = compose_prompt(
            self.variant,
            &self.params,
            &self.band,
            market_history,
            prior_reasoning,
        );

        let mut last_error = String::new();
        for attempt in 0..self.retry.max_attempts {
            debug!(firm = %self.firm, attempt = attempt + 1, "requesting pricing decision");
            match self.attempt(oracle, &prompt) {
                Ok(decision) => {
                    info!(
                        firm = %self.firm,
                        price = decision.price,
                        clipped = decision.clipped,
                        "pricing decision resolved"
                    );
                    return Ok(decision);
                }
                Err(err) => {
                    warn!(
                        firm = %self.firm,
                        attempt = attempt + 1,
                        error = %err,
                        "pricing attempt failed"
                    );
                    last_error = err.to_string();
                    if attempt + 1 < self.retry.max_attempts {
                        std::thread::sleep(self.retry.delay(attempt));
                    }
                }
            }
        }

        Err(DecisionError::AttemptsExhausted {
            firm: self.firm,
            attempts: self.retry.max_attempts,
            last_error,
        })
    }

    fn attempt<O: Oracle>(&self, oracle: &O, prompt: &str) -> Result<Decision, AttemptError> {
        let reply = oracle.complete(prompt)?;
        let (content, reasoning) = resolve_channels(reply)?;

        // Content first; the reasoning channel is the fallback when it
        // actually carries different text.
        let price = match parse_price(&content) {
            Ok(price) => price,
            Err(err) => {
                if reasoning != content {
                    parse_price(&reasoning)?
                } else {
                    return Err(err.into());
                }
            }
        };

        let (price, clipped) = self.band.clip(price);
        if clipped {
            warn!(firm = %self.firm, price, "oracle price outside band, clipped");
        }

        Ok(Decision {
            price,
            reasoning,
            clipped,
        })
    }
}
