/// Price statistics
///
/// Everything here is a pure function over a product's price history and is
/// recomputed on each read. Histories are small (one point per price change),
/// so a full O(n) pass per request is cheap and avoids keeping aggregates in
/// sync with the append-only table.
///
/// Money values in results are rounded to cents.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::models::price_history::PricePoint;

/// Summary shown next to every product in the list view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductStats {
    pub lowest_price: f64,
    pub highest_price: f64,
    /// Current price minus the previous recorded price
    pub price_change: f64,
    pub price_change_percent: f64,
    pub is_at_target: bool,
    /// Highest price minus current price
    pub savings_from_highest: f64,
    pub savings_percent: f64,
    pub days_tracked: i64,
}

/// Extra figures shown on the product detail view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductAnalytics {
    pub total_data_points: usize,
    pub average_price: f64,
    /// Population standard deviation of the recorded prices
    pub price_volatility: f64,
    pub best_time_to_buy: String,
    /// Number of recorded prices at or below the target
    pub price_drop_alerts: usize,
    pub last_updated: Option<DateTime<Utc>>,
}

/// Rounds to two decimal places
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Mean of `values`, None when empty
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Population standard deviation; 0 with fewer than two values
pub fn population_std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }

    let avg = values.iter().sum::<f64>() / values.len() as f64;
    let variance = values.iter().map(|v| (v - avg).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Percent change from `previous` to `current`; 0 when `previous` is 0
pub fn percent_change(previous: f64, current: f64) -> f64 {
    if previous == 0.0 {
        0.0
    } else {
        (current - previous) / previous * 100.0
    }
}

fn prices(history: &[PricePoint]) -> Vec<f64> {
    history.iter().map(|p| p.price).collect()
}

/// Computes [`ProductStats`]
///
/// With an empty history the current price stands in for lowest/highest.
pub fn product_stats(
    current_price: f64,
    target_price: f64,
    history: &[PricePoint],
    created_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> ProductStats {
    let values = prices(history);

    let lowest_price = values.iter().copied().fold(None, |acc: Option<f64>, v| {
        Some(acc.map_or(v, |a| a.min(v)))
    });
    let highest_price = values.iter().copied().fold(None, |acc: Option<f64>, v| {
        Some(acc.map_or(v, |a| a.max(v)))
    });
    let lowest_price = lowest_price.unwrap_or(current_price);
    let highest_price = highest_price.unwrap_or(current_price);

    let previous = if values.len() >= 2 {
        values[values.len() - 2]
    } else {
        current_price
    };

    let savings_from_highest = highest_price - current_price;

    ProductStats {
        lowest_price,
        highest_price,
        price_change: round2(current_price - previous),
        price_change_percent: round2(percent_change(previous, current_price)),
        is_at_target: current_price <= target_price,
        savings_from_highest: round2(savings_from_highest),
        savings_percent: if highest_price > 0.0 {
            round2(savings_from_highest / highest_price * 100.0)
        } else {
            0.0
        },
        days_tracked: days_since(created_at, now),
    }
}

/// Whole days since `created_at`, rounded up
pub fn days_since(created_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let elapsed_secs = (now - created_at).num_seconds().max(0);
    (elapsed_secs + 86_399) / 86_400
}

/// Computes [`ProductAnalytics`]
///
/// The average falls back to `current_price` while there is no history.
pub fn product_analytics(
    current_price: f64,
    target_price: f64,
    history: &[PricePoint],
) -> ProductAnalytics {
    let values = prices(history);

    let best = history
        .iter()
        .fold(None::<&PricePoint>, |best, point| match best {
            Some(b) if b.price <= point.price => Some(b),
            _ => Some(point),
        });

    let best_time_to_buy = match best {
        Some(point) => format!(
            "Best price was ${:.2} on {}",
            point.price,
            point.date.format("%Y-%m-%d")
        ),
        None => "No data available".to_string(),
    };

    ProductAnalytics {
        total_data_points: history.len(),
        average_price: round2(mean(&values).unwrap_or(current_price)),
        price_volatility: population_std_dev(&values),
        best_time_to_buy,
        price_drop_alerts: values.iter().filter(|&&p| p <= target_price).count(),
        last_updated: history.last().map(|p| p.date),
    }
}

/// Entries recorded within the last `days` days
pub fn filter_since(history: &[PricePoint], days: i64, now: DateTime<Utc>) -> Vec<PricePoint> {
    let cutoff = now - Duration::days(days);
    history.iter().filter(|p| p.date >= cutoff).copied().collect()
}
