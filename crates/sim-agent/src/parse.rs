//! Price extraction from free-text oracle output.
//!
//! The oracle is instructed to answer with a bare number, but replies range
//! from `"1.85"` over `"$1.85"` to whole paragraphs that mention a price
//! somewhere. Extraction therefore runs a fixed ladder of patterns and must
//! stay stable: recorded runs are only comparable if the same reply text
//! always yields the same price.

use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

/// No numeric price could be extracted from the text.
#[derive(Debug, Error, PartialEq)]
#[error("could not parse a price from oracle output: {snippet:?}")]
pub struct PriceParseError {
    /// Leading fragment of the offending text, for diagnostics.
    pub snippet: String,
}

impl PriceParseError {
    fn new(text: &str) -> Self {
        let snippet: String = text.chars().take(80).collect();
        PriceParseError { snippet }
    }
}

fn whole_number() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d+\.?\d*)$").expect("static pattern"))
}

fn first_decimal() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+\.\d+)").expect("static pattern"))
}

fn first_integer() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+)").expect("static pattern"))
}

fn any_number() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+\.?\d*").expect("static pattern"))
}

/// Extract a price from oracle text.
///
/// Ladder, in order, on the whitespace-trimmed text with currency symbols
/// (`$`, `€`, `£`) removed:
///
/// 1. the entire remaining string is exactly one number,
/// 2. the first decimal number anywhere,
/// 3. the first integer anywhere.
///
/// If all three fail, every numeric substring of the *original* text is
/// scanned and the first whose value lies strictly between 0 and 100 wins.
/// Range clipping is not this function's job; callers clip afterwards.
pub fn parse_price(text: &str) -> Result<f64, PriceParseError> {
    let cleaned = text.trim().replace(['$', '€', '£'], "");

    for pattern in [whole_number(), first_decimal(), first_integer()] {
        if let Some(captures) = pattern.captures(&cleaned) {
            if let Ok(price) = captures[1].parse::<f64>() {
                return Ok(price);
            }
        }
    }

    for m in any_number().find_iter(text) {
        if let Ok(price) = m.as_str().parse::<f64>() {
            if price > 0.0 && price < 100.0 {
                return Ok(price);
            }
        }
    }

    Err(PriceParseError::new(text))
}
