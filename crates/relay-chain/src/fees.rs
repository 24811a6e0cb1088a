//! Fee derivation.
//!
//! The chain adapter suggests a market fee; the relayer scales it by the
//! configured multiplier and clamps the result into
//! `[min_gas_price, max_gas_price]` so a spiking market cannot drain the
//! wallets and a collapsing one cannot stall submissions.

use serde::{Deserialize, Serialize};
use shared_types::config::GasConfig;
use shared_types::U256;

/// EIP-1559-style fee pair, wei per gas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSuggestion {
    /// Total fee ceiling per gas.
    pub max_fee_per_gas: U256,
    /// Priority tip per gas.
    pub max_priority_fee_per_gas: U256,
}

/// Applies the multiplier and clamps both components.
///
/// The multiplier is applied in integer arithmetic at 1/1000 resolution
/// to keep U256 math exact.
pub fn derive_fee(suggestion: FeeSuggestion, config: &GasConfig) -> FeeSuggestion {
    let scaled_max = scale(suggestion.max_fee_per_gas, config.gas_price_multiplier);
    let scaled_tip = scale(suggestion.max_priority_fee_per_gas, config.gas_price_multiplier);

    let floor = U256::from(config.min_gas_price);
    let ceiling = U256::from(config.max_gas_price);

    FeeSuggestion {
        max_fee_per_gas: clamp(scaled_max, floor, ceiling),
        // The tip has no floor of its own; it only respects the ceiling
        max_priority_fee_per_gas: clamp(scaled_tip, U256::zero(), ceiling),
    }
}

fn scale(value: U256, multiplier: f64) -> U256 {
    let per_mille = (multiplier * 1000.0).round() as u64;
    value * U256::from(per_mille) / U256::from(1000u64)
}

fn clamp(value: U256, floor: U256, ceiling: U256) -> U256 {
    if value < floor {
        floor
    } else if value > ceiling {
        ceiling
    } else {
        value
    }
}
