// crates/core/src/cost.rs
//! Per-model cost accounting.
//!
//! Rates are USD per million tokens, input and output only: cache
//! creation/read sub-counts are excluded from usage totals upstream, so
//! they never reach the cost calculation. Unknown models fall back to a
//! baseline tier.

use std::collections::HashMap;

/// USD per million tokens for one model.
#[derive(Debug, Clone, Copy)]
pub struct ModelRates {
    pub input_per_mtok: f64,
    pub output_per_mtok: f64,
}

/// Baseline tier applied when the model is unknown or missing.
pub const FALLBACK_RATES: ModelRates = ModelRates {
    input_per_mtok: 3.0,
    output_per_mtok: 15.0,
};

/// Static rate table covering current and legacy Claude models.
pub fn default_rates() -> HashMap<String, ModelRates> {
    let mut m = HashMap::new();

    // Current generation
    m.insert(
        "claude-opus-4-6".into(),
        ModelRates {
            input_per_mtok: 5.0,
            output_per_mtok: 25.0,
        },
    );
    m.insert(
        "claude-sonnet-4-5".into(),
        ModelRates {
            input_per_mtok: 3.0,
            output_per_mtok: 15.0,
        },
    );
    m.insert(
        "claude-haiku-4-5".into(),
        ModelRates {
            input_per_mtok: 1.0,
            output_per_mtok: 5.0,
        },
    );

    // Legacy
    m.insert(
        "claude-opus-4-1".into(),
        ModelRates {
            input_per_mtok: 15.0,
            output_per_mtok: 75.0,
        },
    );
    m.insert(
        "claude-sonnet-4".into(),
        ModelRates {
            input_per_mtok: 3.0,
            output_per_mtok: 15.0,
        },
    );
    m.insert(
        "claude-3-5-haiku".into(),
        ModelRates {
            input_per_mtok: 0.8,
            output_per_mtok: 4.0,
        },
    );
    m.insert(
        "claude-3-opus".into(),
        ModelRates {
            input_per_mtok: 15.0,
            output_per_mtok: 75.0,
        },
    );
    m.insert(
        "claude-3-haiku".into(),
        ModelRates {
            input_per_mtok: 0.25,
            output_per_mtok: 1.25,
        },
    );

    m
}

/// Look up rates for a model ID. Tries exact match, then key-as-prefix
/// (e.g. `claude-opus-4-6-20260101` matches key `claude-opus-4-6`), then
/// model-as-prefix of a key.
pub fn lookup_rates<'a>(
    model_id: &str,
    rates: &'a HashMap<String, ModelRates>,
) -> Option<&'a ModelRates> {
    if let Some(r) = rates.get(model_id) {
        return Some(r);
    }
    for (key, r) in rates {
        if model_id.starts_with(key.as_str()) {
            return Some(r);
        }
    }
    for (key, r) in rates {
        if key.starts_with(model_id) {
            return Some(r);
        }
    }
    None
}

/// Cost in USD for the given token totals.
pub fn cost_usd(
    input_tokens: u64,
    output_tokens: u64,
    model: Option<&str>,
    rates: &HashMap<String, ModelRates>,
) -> f64 {
    let r = model
        .and_then(|m| lookup_rates(m, rates))
        .copied()
        .unwrap_or(FALLBACK_RATES);
    input_tokens as f64 * r.input_per_mtok / 1e6 + output_tokens as f64 * r.output_per_mtok / 1e6
}
