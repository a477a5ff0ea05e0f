// src/services/stock.rs
use std::collections::HashMap;

use chrono::NaiveDate;
use serde::Serialize;

/// Stock of a plain product: initial stock plus adjustments minus units sold
/// on or after the initial-stock date. Without a date everything counts.
pub fn current_stock(
    initial_stock: i64,
    since: Option<NaiveDate>,
    adjustments: impl IntoIterator<Item = (NaiveDate, i64)>,
    sold: impl IntoIterator<Item = (NaiveDate, i64)>,
) -> i64 {
    let counts = |date: &NaiveDate| since.map_or(true, |s| *date >= s);
    let adjusted: i64 = adjustments
        .into_iter()
        .filter(|(date, _)| counts(date))
        .map(|(_, qty)| qty)
        .sum();
    let sold: i64 = sold
        .into_iter()
        .filter(|(date, _)| counts(date))
        .map(|(_, qty)| qty)
        .sum();
    initial_stock + adjusted - sold
}

pub fn is_low_stock(stock: i64, threshold: i64) -> bool {
    stock <= threshold
}

// ==================== Stock checks ====================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Variance {
    pub sku: String,
    pub expected: i64,
    pub counted: i64,
    pub variance: i64,
}

/// Counted minus expected for each counted SKU; unknown SKUs expect zero.
pub fn variances<'a>(
    counted: impl IntoIterator<Item = (&'a str, i64)>,
    expected: &HashMap<String, i64>,
) -> Vec<Variance> {
    counted
        .into_iter()
        .map(|(sku, counted)| {
            let expected = expected.get(sku).copied().unwrap_or(0);
            Variance {
                sku: sku.to_string(),
                expected,
                counted,
                variance: counted - expected,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn stock_is_initial_plus_adjustments_minus_sold() {
        let stock = current_stock(
            100,
            None,
            vec![(date(2024, 1, 2), 10), (date(2024, 1, 3), -4)],
            vec![(date(2024, 1, 5), 30)],
        );
        assert_eq!(stock, 76);
    }

    #[test]
    fn movements_before_initial_stock_date_are_ignored() {
        let since = Some(date(2024, 2, 1));
        let stock = current_stock(
            50,
            since,
            vec![(date(2024, 1, 20), 99), (date(2024, 2, 1), 5)],
            vec![(date(2024, 1, 31), 40), (date(2024, 2, 3), 60)],
        );
        assert_eq!(stock, -5);
        assert!(is_low_stock(stock, 20));
    }

    #[test]
    fn backdated_sales_before_initial_stock_date_leave_stock_unchanged() {
        let since = Some(date(2024, 6, 1));
        let before = current_stock(25, since, vec![], vec![(date(2024, 6, 2), 5)]);
        let after = current_stock(
            25,
            since,
            vec![],
            vec![(date(2024, 6, 2), 5), (date(2024, 5, 28), 9), (date(2023, 12, 1), 3)],
        );
        assert_eq!(before, 20);
        assert_eq!(after, before);
    }

    #[test]
    fn variance_is_counted_minus_expected() {
        let expected = HashMap::from([("A".to_string(), 12), ("B".to_string(), 3)]);
        let out = variances(vec![("A", 10), ("B", 3), ("NEW", 4)], &expected);
        assert_eq!(out[0].variance, -2);
        assert_eq!(out[1].variance, 0);
        assert_eq!(out[2].expected, 0);
        assert_eq!(out[2].variance, 4);
    }
}
