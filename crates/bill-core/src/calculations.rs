use serde::Serialize;

use crate::models::DerivedBillRecord;

/// Direction of the latest bill relative to the historical average.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CostTrend {
    /// The latest daily cost is below the historical average.
    Improved,
    /// The latest daily cost is at or above the historical average.
    Worse,
}

impl CostTrend {
    pub fn as_str(&self) -> &'static str {
        match self {
            CostTrend::Improved => "improved",
            CostTrend::Worse => "worse",
        }
    }
}

/// Latest bill versus the mean of every older bill in the same view.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonResult {
    /// Daily cost of the most recent bill.
    pub latest: f64,
    /// Mean daily cost of the older bills.
    pub historical_average: f64,
    /// `latest - historical_average`.
    pub difference: f64,
    /// Difference as a percentage of the average; `0` when the average is not positive.
    pub percent_change: f64,
    pub trend: CostTrend,
}

/// Stateless comparison of a projected bill list.
pub struct CostComparator;

impl CostComparator {
    /// Compare the first (most recent) entry against the rest.
    ///
    /// `projected` must already be sorted newest first, as produced by the
    /// aggregator. Returns `None` with fewer than two entries.
    pub fn compare(projected: &[DerivedBillRecord]) -> Option<ComparisonResult> {
        let (first, historical) = projected.split_first()?;
        if historical.is_empty() {
            return None;
        }

        let latest = first.daily_cost;
        let historical_average =
            historical.iter().map(|b| b.daily_cost).sum::<f64>() / historical.len() as f64;
        let difference = latest - historical_average;
        let percent_change = if historical_average > 0.0 {
            (difference / historical_average) * 100.0
        } else {
            0.0
        };
        let trend = if difference < 0.0 {
            CostTrend::Improved
        } else {
            CostTrend::Worse
        };

        Some(ComparisonResult {
            latest,
            historical_average,
            difference,
            percent_change,
            trend,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BillRecord;

    fn with_daily_cost(daily_cost: f64) -> DerivedBillRecord {
        let record = BillRecord {
            id: format!("id-{daily_cost}"),
            author_id: "u".to_string(),
            recorder_name: "r".to_string(),
            contract_type: "c".to_string(),
            billing_date: String::new(),
            usage_kwh: 0.0,
            total_cost: daily_cost * 30.0,
            period_days: 30,
            notes: String::new(),
            timestamp: None,
        };
        DerivedBillRecord::from_record(record)
    }

    #[test]
    fn test_compare_empty_and_single() {
        assert!(CostComparator::compare(&[]).is_none());
        assert!(CostComparator::compare(&[with_daily_cost(10.0)]).is_none());
    }

    #[test]
    fn test_compare_improved() {
        let projected = vec![
            with_daily_cost(10.0),
            with_daily_cost(20.0),
            with_daily_cost(30.0),
        ];
        let result = CostComparator::compare(&projected).unwrap();
        assert!((result.latest - 10.0).abs() < 1e-9);
        assert!((result.historical_average - 25.0).abs() < 1e-9);
        assert!((result.difference + 15.0).abs() < 1e-9);
        assert!((result.percent_change + 60.0).abs() < 1e-9);
        assert_eq!(result.trend, CostTrend::Improved);
        assert_eq!(result.trend.as_str(), "improved");
    }

    #[test]
    fn test_compare_equal_is_worse() {
        let projected = vec![with_daily_cost(20.0), with_daily_cost(20.0)];
        let result = CostComparator::compare(&projected).unwrap();
        assert_eq!(result.difference, 0.0);
        assert_eq!(result.trend, CostTrend::Worse);
    }

    #[test]
    fn test_compare_zero_average_has_zero_percent() {
        let projected = vec![with_daily_cost(5.0), with_daily_cost(0.0)];
        let result = CostComparator::compare(&projected).unwrap();
        assert_eq!(result.percent_change, 0.0);
        assert_eq!(result.trend, CostTrend::Worse);
    }
}
