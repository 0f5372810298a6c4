#![deny(warnings)]

//! LLM-backed pricing decisions for the duopoly simulation.
//!
//! A [`PricingAgent`] turns formatted market context into a validated price:
//! it composes the oracle prompt, invokes the oracle, extracts a numeric
//! price from the free-text reply (with a reasoning-channel fallback), clips
//! it into the admissible band, and retries transient failures with
//! exponential backoff. Exhausting the retry budget is terminal and aborts
//! the enclosing period.

pub mod oracle;
pub mod parse;
pub mod pipeline;
pub mod prompts;

pub use oracle::{HttpOracle, Oracle, OracleConfig, OracleError, OracleReply};
pub use parse::{parse_price, PriceParseError};
pub use pipeline::{Decision, DecisionError, PricingAgent, RetryPolicy};
pub use prompts::compose_prompt;
