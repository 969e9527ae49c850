//! Block reward schedule and supply cap enforcement

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal_macros::dec;

/// Smallest reward the schedule ever pays out before hitting the cap.
const MIN_REWARD: Decimal = dec!(0);

/// `reward_schedule(height) = max(min_reward, R0 / 2^(height / H))`
#[must_use]
pub fn reward_schedule(height: u64, initial_reward: Decimal, halving_interval: u64) -> Decimal {
    if halving_interval == 0 {
        return initial_reward;
    }
    let halvings = height / halving_interval;
    // Beyond ~64 halvings the reward underflows to zero regardless of precision.
    if halvings >= 64 {
        return MIN_REWARD;
    }
    let divisor = Decimal::from(1u64 << halvings);
    (initial_reward / divisor).max(MIN_REWARD)
}

/// Clips `reward` so that `current_supply + reward <= max_supply`.
#[must_use]
pub fn clip_to_supply_cap(reward: Decimal, current_supply: Decimal, max_supply: Decimal) -> Decimal {
    let headroom = max_supply - current_supply;
    if headroom <= Decimal::ZERO {
        Decimal::ZERO
    } else {
        reward.min(headroom)
    }
}

/// Convenience used by tests/CLI output to render a reward as an `f64`.
#[must_use]
pub fn to_f64_lossy(amount: Decimal) -> f64 {
    amount.to_f64().unwrap_or(0.0)
}
