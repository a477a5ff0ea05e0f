// src/services/aggregation.rs
use std::collections::HashMap;
use std::hash::Hash;
use std::ops::Add;

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::services::profitability::{margin, SaleProfitability};

// ==================== Totals ====================

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Totals {
    pub sale_count: i64,
    pub quantity: i64,
    pub revenue: f64,
    pub profit: f64,
}

impl Totals {
    pub fn record(&mut self, sale: &SaleProfitability) {
        self.sale_count += 1;
        self.quantity += i64::from(sale.quantity);
        self.revenue += sale.total_price;
        self.profit += sale.profitability.profit;
    }

    /// Recomputed from the summed figures, never averaged.
    pub fn margin(&self) -> f64 {
        margin(self.profit, self.revenue)
    }
}

impl Add for Totals {
    type Output = Totals;

    fn add(self, other: Totals) -> Totals {
        Totals {
            sale_count: self.sale_count + other.sale_count,
            quantity: self.quantity + other.quantity,
            revenue: self.revenue + other.revenue,
            profit: self.profit + other.profit,
        }
    }
}

pub fn summarize<'a>(sales: impl IntoIterator<Item = &'a SaleProfitability>) -> Totals {
    let mut totals = Totals::default();
    for sale in sales {
        totals.record(sale);
    }
    totals
}

// ==================== Grouping ====================

/// Groups in first-seen order.
#[derive(Debug, Clone)]
pub struct Grouped<K> {
    groups: Vec<(K, Totals)>,
    index: HashMap<K, usize>,
}

impl<K: Clone + Eq + Hash> Grouped<K> {
    pub fn new() -> Self {
        Grouped {
            groups: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn add(&mut self, key: K, sale: &SaleProfitability) {
        let slot = match self.index.get(&key) {
            Some(&i) => i,
            None => {
                self.index.insert(key.clone(), self.groups.len());
                self.groups.push((key, Totals::default()));
                self.groups.len() - 1
            }
        };
        if let Some((_, totals)) = self.groups.get_mut(slot) {
            totals.record(sale);
        }
    }

    pub fn groups(&self) -> &[(K, Totals)] {
        &self.groups
    }

    pub fn into_groups(self) -> Vec<(K, Totals)> {
        self.groups
    }

    /// Single pass; the first group seen wins a tie.
    pub fn best_by<F>(&self, score: F) -> Option<&(K, Totals)>
    where
        F: Fn(&Totals) -> f64,
    {
        let mut best: Option<&(K, Totals)> = None;
        for entry in &self.groups {
            match best {
                Some(current) if score(&entry.1) <= score(&current.1) => {}
                _ => best = Some(entry),
            }
        }
        best
    }

    /// Stable descending sort: ties keep first-seen order.
    pub fn top_by<F>(&self, limit: usize, score: F) -> Vec<(K, Totals)>
    where
        F: Fn(&Totals) -> f64,
    {
        let mut ranked = self.groups.clone();
        ranked.sort_by(|a, b| score(&b.1).total_cmp(&score(&a.1)));
        ranked.truncate(limit);
        ranked
    }
}

impl<K: Clone + Eq + Hash> Default for Grouped<K> {
    fn default() -> Self {
        Self::new()
    }
}

pub fn group_by<'a, K, F>(sales: impl IntoIterator<Item = &'a SaleProfitability>, key: F) -> Grouped<K>
where
    K: Clone + Eq + Hash,
    F: Fn(&SaleProfitability) -> K,
{
    let mut grouped = Grouped::new();
    for sale in sales {
        grouped.add(key(sale), sale);
    }
    grouped
}

/// Daily totals in ascending date order.
pub fn daily<'a>(sales: impl IntoIterator<Item = &'a SaleProfitability>) -> Vec<(NaiveDate, Totals)> {
    let mut days = group_by(sales, |s| s.sale_date).into_groups();
    days.sort_by_key(|(date, _)| *date);
    days
}

pub fn by_product<'a>(
    sales: impl IntoIterator<Item = &'a SaleProfitability>,
) -> Grouped<(String, String)> {
    group_by(sales, |s| (s.sku.clone(), s.listing_title.clone()))
}

pub fn by_platform<'a>(sales: impl IntoIterator<Item = &'a SaleProfitability>) -> Grouped<String> {
    group_by(sales, |s| s.platform.clone())
}

pub fn by_quantity(t: &Totals) -> f64 {
    t.quantity as f64
}

pub fn by_profit(t: &Totals) -> f64 {
    t.profit
}

// ==================== Date ranges ====================

/// Both bounds inclusive; `None` is unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        DateRange { start, end }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RangePreset {
    Today,
    Yesterday,
    Last7Days,
    Last30Days,
    ThisMonth,
    LastMonth,
    ThisYear,
    All,
}

impl RangePreset {
    /// Ranges that run up to today are left open-ended.
    pub fn resolve(self, today: NaiveDate) -> DateRange {
        let first_of_month = today.with_day(1).unwrap_or(today);
        match self {
            RangePreset::Today => DateRange::new(Some(today), None),
            RangePreset::Yesterday => {
                let day = today - Duration::days(1);
                DateRange::new(Some(day), Some(day))
            }
            RangePreset::Last7Days => DateRange::new(Some(today - Duration::days(6)), None),
            RangePreset::Last30Days => DateRange::new(Some(today - Duration::days(29)), None),
            RangePreset::ThisMonth => DateRange::new(Some(first_of_month), None),
            RangePreset::LastMonth => {
                let last_of_prev = first_of_month - Duration::days(1);
                DateRange::new(last_of_prev.with_day(1), Some(last_of_prev))
            }
            RangePreset::ThisYear => DateRange::new(NaiveDate::from_ymd_opt(today.year(), 1, 1), None),
            RangePreset::All => DateRange::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::profitability::{CostBreakdown, Profitability};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn sale(id: i64, day: NaiveDate, sku: &str, qty: i32, revenue: f64, profit: f64) -> SaleProfitability {
        SaleProfitability {
            id,
            sale_date: day,
            platform: if id % 2 == 0 { "Amazon" } else { "eBay" }.to_string(),
            sku: sku.to_string(),
            listing_title: format!("{sku} listing"),
            quantity: qty,
            total_price: revenue,
            promoted: false,
            verified: false,
            costs: CostBreakdown::default(),
            profitability: Profitability {
                total_costs: revenue - profit,
                profit,
                profit_margin: margin(profit, revenue),
            },
        }
    }

    #[test]
    fn same_day_sales_roll_up_with_recomputed_margin() {
        let day = date(2024, 5, 1);
        let sales = vec![sale(1, day, "A", 1, 50.0, 10.0), sale(2, day, "B", 2, 70.0, 14.0)];

        let days = daily(&sales);
        assert_eq!(days.len(), 1);
        let (d, totals) = days[0];
        assert_eq!(d, day);
        assert!((totals.revenue - 120.0).abs() < 1e-9);
        assert!((totals.profit - 24.0).abs() < 1e-9);
        assert!((totals.margin() - 20.0).abs() < 1e-9);
        assert_eq!(totals.quantity, 3);
    }

    #[test]
    fn partitioned_aggregation_matches_whole() {
        let sales: Vec<_> = (0..9)
            .map(|i| sale(i, date(2024, 5, 1 + (i as u32 % 3)), "A", (i + 1) as i32, 10.0 * i as f64, 2.5 * i as f64 - 3.0))
            .collect();
        let whole = summarize(&sales);
        for split in 0..=sales.len() {
            let (left, right) = sales.split_at(split);
            let merged = summarize(left) + summarize(right);
            assert_eq!(merged.quantity, whole.quantity);
            assert_eq!(merged.sale_count, whole.sale_count);
            assert!((merged.revenue - whole.revenue).abs() < 1e-9);
            assert!((merged.profit - whole.profit).abs() < 1e-9);
            assert!((merged.margin() - whole.margin()).abs() < 1e-9);
        }
    }

    #[test]
    fn empty_revenue_group_has_zero_margin() {
        assert_eq!(Totals::default().margin(), 0.0);
    }

    #[test]
    fn ranking_ties_keep_first_seen_order() {
        let day = date(2024, 5, 1);
        let sales = vec![
            sale(1, day, "B", 5, 10.0, 4.0),
            sale(2, day, "A", 5, 10.0, 4.0),
            sale(3, day, "C", 9, 10.0, 1.0),
        ];
        let products = by_product(&sales);

        let top = products.top_by(2, by_quantity);
        assert_eq!(top[0].0 .0, "C");
        assert_eq!(top[1].0 .0, "B");

        let best = products.best_by(by_profit).unwrap();
        assert_eq!(best.0 .0, "B");
    }

    #[test]
    fn platform_groups_follow_first_seen_order() {
        let day = date(2024, 5, 1);
        let sales = vec![sale(1, day, "A", 1, 5.0, 1.0), sale(2, day, "A", 1, 5.0, 1.0), sale(3, day, "A", 1, 5.0, 1.0)];
        let platforms = by_platform(&sales);
        let names: Vec<_> = platforms.groups().iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(names, vec!["eBay", "Amazon"]);
        assert_eq!(platforms.groups()[0].1.sale_count, 2);
    }

    #[test]
    fn today_is_open_ended() {
        let today = date(2024, 5, 15);
        assert_eq!(RangePreset::Today.resolve(today), DateRange::new(Some(today), None));
        assert_eq!(
            RangePreset::Yesterday.resolve(today),
            DateRange::new(Some(date(2024, 5, 14)), Some(date(2024, 5, 14)))
        );
    }

    #[test]
    fn presets_resolve_calendar_boundaries() {
        let today = date(2024, 3, 15);
        assert_eq!(
            RangePreset::LastMonth.resolve(today),
            DateRange::new(Some(date(2024, 2, 1)), Some(date(2024, 2, 29)))
        );
        assert_eq!(RangePreset::Last7Days.resolve(today).start, Some(date(2024, 3, 9)));
        assert_eq!(RangePreset::ThisYear.resolve(today).start, Some(date(2024, 1, 1)));
        assert_eq!(RangePreset::All.resolve(today), DateRange::default());
    }
}
