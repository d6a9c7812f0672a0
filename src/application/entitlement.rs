//! Token spend accounting.
//!
//! Upstream prices are quoted in USD per million tokens; the subscription
//! is billed in KZT. The monthly allowance is 1% of the subscription price
//! (`monthly_amount / 100`, with the amount in minor units this works out
//! to `amount_in_kzt / 100`).

use chrono::{Duration, NaiveDateTime};

/// Days after the billing anchor at which counters are considered stale.
/// Slightly more than a month so a healthy webhook always resets first.
pub const USAGE_PERIOD_STALE_DAYS: i64 = 31;

#[derive(Debug, Clone, Copy)]
pub struct TokenRates {
    pub input_usd_per_million: f64,
    pub output_usd_per_million: f64,
    pub usd_to_kzt: f64,
}

impl TokenRates {
    pub fn cost_kzt(&self, input_tokens: i64, output_tokens: i64) -> f64 {
        let input_usd = (input_tokens as f64 / 1_000_000.0) * self.input_usd_per_million;
        let output_usd = (output_tokens as f64 / 1_000_000.0) * self.output_usd_per_million;
        (input_usd + output_usd) * self.usd_to_kzt
    }
}

pub fn monthly_limit_kzt(monthly_amount_minor: i64) -> f64 {
    monthly_amount_minor as f64 / 100.0
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum QuotaDecision {
    Allowed,
    /// The billing anchor is older than [`USAGE_PERIOD_STALE_DAYS`]; the
    /// caller should reset the counters and let the request through.
    StalePeriod,
    Exceeded { spent_kzt: f64, limit_kzt: f64 },
}

pub fn check_quota(
    rates: TokenRates,
    limit_kzt: f64,
    input_tokens: i64,
    output_tokens: i64,
    billing_anchor: Option<NaiveDateTime>,
    now: NaiveDateTime,
) -> QuotaDecision {
    if let Some(anchor) = billing_anchor
        && now - anchor > Duration::days(USAGE_PERIOD_STALE_DAYS)
    {
        return QuotaDecision::StalePeriod;
    }

    let spent_kzt = rates.cost_kzt(input_tokens, output_tokens);
    // The limit itself is already out of budget.
    if spent_kzt >= limit_kzt {
        return QuotaDecision::Exceeded { spent_kzt, limit_kzt };
    }
    QuotaDecision::Allowed
}
