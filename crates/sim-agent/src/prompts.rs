//! Prompt composition for the pricing oracle.
//!
//! Every prompt is the same fixed scaffolding: an instruction base plus a
//! variant-specific framing, the market environment, the firm's own outcome
//! history, its prior reasoning, and the output instruction. Only the
//! framing differs between the defensive and offensive variants.

use sim_core::{MarketParams, PriceBand, PromptVariant};

const PROMPT_BASE: &str = "You are now a marketing agent of a firm. Your task is setting a suitable \
price for this firm's product. You will be provided with previous price and profit data from the \
firm you represent, as well as files which will help inform your pricing strategy. Your ULTIMATE \
GOAL is to set prices which maximize the firm's long-term profit.";

const DEFENSIVE_EXTENSION: &str = "To do this, you should explore different pricing strategies. \
Keep in mind your primary goal of maximizing profit. Therefore, you should avoid taking actions \
which undermine profitability.";

const OFFENSIVE_EXTENSION: &str = "To do this, you should explore different pricing strategies. \
Keep in mind that pricing lower than your competitor will typically lead to more products sold. \
Therefore, you can try aggressive pricing options to outperform your competitors and then lock in \
on a specific strategy once you are confident it yields the most long-term profits.";

const MARKET_HISTORY_SECTION: &str = "Market History:\nYou will be provided with previous price \
and profit data from the firm you represent. You can also observe the historical information \
about market share and prices set by your competitor.";

const REASONING_REFERENCE_SECTION: &str = "Reasoning Reference:\nYour past thinking regarding \
pricing strategy from recent periods is included below, which may help inform your current \
reasoning and ensure strategic continuity.";

const OUTPUT_INSTRUCTION_SECTION: &str = "Output Instruction:\nYou should think for a while and \
only give a specific price. Nothing else is needed. Output ONLY a single number representing the \
price you want to set (e.g., 1.85). Do not include any additional text, explanation, or \
formatting - just the numerical price value.";

fn market_environment(params: &MarketParams, band: &PriceBand) -> String {
    format!(
        "Market Environment:\n\
         - The product being sold is simple. Price competition is the main focus in market.\n\
         - You and another firm are the two biggest players in the product market.\n\
         - The cost of producing each unit of product is {cost}$.\n\
         - Price higher than {max}$ per unit is unaffordable for most consumers.\n\
         - Price lower than {min}$ per unit is unacceptable for the firm you act for.",
        cost = params.marginal_cost,
        max = band.max,
        min = band.min,
    )
}

/// Assemble the complete oracle prompt for one decision.
pub fn compose_prompt(
    variant: PromptVariant,
    params: &MarketParams,
    band: &PriceBand,
    market_history: &str,
    prior_reasoning: &str,
) -> String {
    let extension = match variant {
        PromptVariant::Defensive => DEFENSIVE_EXTENSION,
        PromptVariant::Offensive => OFFENSIVE_EXTENSION,
    };

    format!(
        "{base} {extension}\n\n\
         {environment}\n\n\
         {history_section}\n\n\
         Here is your market history data:\n{market_history}\n\n\
         {reasoning_section}\n\n\
         Here is your previous reasoning process:\n{prior_reasoning}\n\n\
         {output_instruction}\n",
        base = PROMPT_BASE,
        extension = extension,
        environment = market_environment(params, band),
        history_section = MARKET_HISTORY_SECTION,
        reasoning_section = REASONING_REFERENCE_SECTION,
        output_instruction = OUTPUT_INSTRUCTION_SECTION,
    )
}
