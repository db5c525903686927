//! Schedule arithmetic. Stateless; every function is total over finite input.

use chrono::{Days, NaiveDate};

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Completed quantity per manday, to 3 decimals. 0 when no manday was spent.
pub fn productivity_rate(qty_done: f64, manday: f64) -> f64 {
    if manday <= 0.0 {
        return 0.0;
    }
    round_to(qty_done / manday, 3)
}

/// `max(0, qty - done)`
pub fn remaining_qty(qty: f64, done: f64) -> f64 {
    round_to(qty - done, 3).max(0.0)
}

/// `100 * done / qty` clamped to `[0, 100]`, to 1 decimal. 0 when qty is 0.
pub fn progress_pct(qty: f64, done: f64) -> f64 {
    if qty <= 0.0 {
        return 0.0;
    }
    round_to((done / qty * 100.0).clamp(0.0, 100.0), 1)
}

/// Positive means more crew than planned
pub fn variance(actual: f64, planned: f64) -> f64 {
    round_to(actual - planned, 2)
}

/// SPI = actual / planned, to 3 decimals. 0 when nothing was planned.
pub fn schedule_performance_index(planned: f64, actual: f64) -> f64 {
    if planned <= 0.0 {
        return 0.0;
    }
    round_to(actual / planned, 3)
}

/// Working days left at the current rate, or `None` when the rate or crew
/// size gives no basis for an estimate.
pub fn remaining_days(remaining: f64, rate: f64, avg_daily_manpower: f64) -> Option<u32> {
    if rate <= 0.0 || avg_daily_manpower <= 0.0 {
        return None;
    }
    let days = (remaining.max(0.0) / (rate * avg_daily_manpower)).ceil();
    if !days.is_finite() || days >= f64::from(u32::MAX) {
        return None;
    }
    Some(days as u32)
}

/// Calendar date the remaining quantity would be finished, counting from
/// `from`.
pub fn estimate_completion_date(
    remaining: f64,
    rate: f64,
    avg_daily_manpower: f64,
    from: NaiveDate,
) -> Option<NaiveDate> {
    if remaining <= 0.0 {
        return Some(from);
    }
    let days = remaining_days(remaining, rate, avg_daily_manpower)?;
    from.checked_add_days(Days::new(u64::from(days)))
}

/// Quantity-weighted progress over `(qty, done)` pairs, each item capped at
/// 100%. Items with no quantity carry no weight.
pub fn weighted_progress<I>(items: I) -> f64
where
    I: IntoIterator<Item = (f64, f64)>,
{
    let mut total_qty = 0.0;
    let mut weighted = 0.0;
    for (qty, done) in items {
        if qty <= 0.0 {
            continue;
        }
        total_qty += qty;
        weighted += (done / qty).clamp(0.0, 1.0) * qty;
    }
    if total_qty <= 0.0 {
        return 0.0;
    }
    round_to(weighted / total_qty * 100.0, 1)
}
