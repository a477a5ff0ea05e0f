// src/services/profitability.rs
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::models::product::VatStatus;

// Standard-rated prices are VAT-inclusive at 20%, so the VAT share is 1/6.
const STANDARD_VAT_DIVISOR: f64 = 6.0;

// ==================== Inputs ====================

/// Cost inputs for one sale line. Any missing value counts as zero.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SaleInput {
    #[serde(default)]
    pub quantity: i32,
    #[serde(default)]
    pub total_price: f64,
    pub product_cost_per_unit: Option<f64>,
    pub platform_fees: Option<f64>,
    pub shipping_cost: Option<f64>,
    pub vat_status: Option<VatStatus>,
    #[serde(default)]
    pub promoted: bool,
    pub promoted_listing_percentage: Option<f64>,
}

// ==================== Outputs ====================

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CostBreakdown {
    pub total_product_cost: f64,
    pub platform_fees: f64,
    pub shipping_cost: f64,
    pub vat_cost: f64,
    pub advertising_cost: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Profitability {
    pub total_costs: f64,
    pub profit: f64,
    pub profit_margin: f64,
}

/// A sale line joined with its resolved costs and profitability.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SaleProfitability {
    pub id: i64,
    pub sale_date: NaiveDate,
    pub platform: String,
    pub sku: String,
    pub listing_title: String,
    pub quantity: i32,
    pub total_price: f64,
    pub promoted: bool,
    pub verified: bool,
    #[serde(flatten)]
    pub costs: CostBreakdown,
    #[serde(flatten)]
    pub profitability: Profitability,
}

// ==================== Fee/Cost Resolver ====================

fn amount(value: Option<f64>) -> f64 {
    value.filter(|v| v.is_finite()).unwrap_or(0.0)
}

pub fn resolve_costs(input: &SaleInput) -> CostBreakdown {
    let total_price = amount(Some(input.total_price));

    // Only a known standard status is charged; missing or unknown means no VAT.
    let vat_cost = match input.vat_status {
        Some(VatStatus::Standard) => total_price / STANDARD_VAT_DIVISOR,
        Some(VatStatus::Reduced | VatStatus::Zero | VatStatus::Exempt) | None => 0.0,
    };

    let advertising_cost = if input.promoted {
        total_price * amount(input.promoted_listing_percentage) / 100.0
    } else {
        0.0
    };

    CostBreakdown {
        total_product_cost: amount(input.product_cost_per_unit) * f64::from(input.quantity),
        platform_fees: amount(input.platform_fees),
        shipping_cost: amount(input.shipping_cost),
        vat_cost,
        advertising_cost,
    }
}

// ==================== Profitability Calculator ====================

/// Profit as a percentage of revenue; zero revenue yields 0 rather than NaN.
pub fn margin(profit: f64, revenue: f64) -> f64 {
    if revenue != 0.0 {
        profit / revenue * 100.0
    } else {
        0.0
    }
}

pub fn compute_profitability(total_price: f64, costs: &CostBreakdown) -> Profitability {
    let total_price = amount(Some(total_price));
    let total_costs = costs.total_product_cost
        + costs.platform_fees
        + costs.shipping_cost
        + costs.vat_cost
        + costs.advertising_cost;
    let profit = total_price - total_costs;

    Profitability {
        total_costs,
        profit,
        profit_margin: margin(profit, total_price),
    }
}

pub fn evaluate(input: &SaleInput) -> (CostBreakdown, Profitability) {
    let costs = resolve_costs(input);
    let profitability = compute_profitability(input.total_price, &costs);
    (costs, profitability)
}

// ==================== Presentation ====================

pub fn format_currency(value: f64) -> String {
    format!("{value:.2}")
}

pub fn format_percent(value: f64) -> String {
    format!("{value:.1}%")
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn promoted_standard_sale() -> SaleInput {
        SaleInput {
            quantity: 1,
            total_price: 100.0,
            product_cost_per_unit: Some(20.0),
            platform_fees: Some(15.0),
            shipping_cost: Some(5.0),
            vat_status: Some(VatStatus::Standard),
            promoted: true,
            promoted_listing_percentage: Some(10.0),
        }
    }

    #[test]
    fn promoted_standard_sale_matches_worked_example() {
        let (costs, p) = evaluate(&promoted_standard_sale());
        assert!((costs.vat_cost - 100.0 / 6.0).abs() < EPS);
        assert!((costs.advertising_cost - 10.0).abs() < EPS);
        assert!((p.total_costs - 66.666_666_666_666_67).abs() < 1e-6);
        assert!((p.profit - 33.333_333_333_333_33).abs() < 1e-6);
        assert!((p.profit_margin - 33.333_333_333_333_33).abs() < 1e-6);
    }

    #[test]
    fn unpromoted_sale_has_no_advertising_cost() {
        let input = SaleInput {
            promoted: false,
            promoted_listing_percentage: Some(35.0),
            ..promoted_standard_sale()
        };
        assert_eq!(resolve_costs(&input).advertising_cost, 0.0);
    }

    #[test]
    fn non_standard_vat_statuses_cost_nothing() {
        for status in [VatStatus::Reduced, VatStatus::Zero, VatStatus::Exempt] {
            let input = SaleInput {
                vat_status: Some(status),
                ..promoted_standard_sale()
            };
            assert_eq!(resolve_costs(&input).vat_cost, 0.0, "{status:?}");
        }
    }

    #[test]
    fn omitted_vat_status_is_not_charged() {
        let input: SaleInput = serde_json::from_str(r#"{"quantity": 1, "total_price": 60.0}"#).unwrap();
        assert_eq!(input.vat_status, None);
        assert_eq!(resolve_costs(&input).vat_cost, 0.0);

        let input = SaleInput {
            vat_status: None,
            ..promoted_standard_sale()
        };
        assert_eq!(resolve_costs(&input).vat_cost, 0.0);
    }

    #[test]
    fn zero_price_sale_has_zero_margin() {
        let input = SaleInput {
            quantity: 1,
            total_price: 0.0,
            product_cost_per_unit: Some(4.0),
            shipping_cost: Some(2.5),
            ..SaleInput::default()
        };
        let (costs, p) = evaluate(&input);
        assert_eq!(p.profit_margin, 0.0);
        assert!(p.profit_margin.is_finite());
        assert_eq!(p.profit, -p.total_costs);
        assert_eq!(costs.total_product_cost, 4.0);
    }

    #[test]
    fn total_costs_is_exact_sum_for_refunds() {
        let input = SaleInput {
            quantity: 2,
            total_price: -48.0,
            product_cost_per_unit: Some(3.1),
            platform_fees: Some(-4.2),
            shipping_cost: Some(0.0),
            vat_status: Some(VatStatus::Standard),
            promoted: true,
            promoted_listing_percentage: Some(7.5),
        };
        let (c, p) = evaluate(&input);
        let sum = c.total_product_cost + c.platform_fees + c.shipping_cost + c.vat_cost + c.advertising_cost;
        assert_eq!(p.total_costs, sum);
        assert_eq!(p.profit, -48.0 - sum);
    }

    #[test]
    fn missing_and_non_finite_inputs_count_as_zero() {
        let input = SaleInput {
            quantity: 3,
            total_price: 30.0,
            product_cost_per_unit: None,
            platform_fees: Some(f64::NAN),
            shipping_cost: Some(f64::INFINITY),
            vat_status: Some(VatStatus::Exempt),
            promoted: true,
            promoted_listing_percentage: None,
        };
        let (c, p) = evaluate(&input);
        assert_eq!(c, CostBreakdown::default());
        assert_eq!(p.profit, 30.0);
        assert_eq!(p.profit_margin, 100.0);
    }

    #[test]
    fn evaluation_is_repeatable_bit_for_bit() {
        let input = promoted_standard_sale();
        let (_, first) = evaluate(&input);
        let (_, second) = evaluate(&input);
        assert_eq!(first.profit.to_bits(), second.profit.to_bits());
        assert_eq!(first.profit_margin.to_bits(), second.profit_margin.to_bits());
    }

    #[test]
    fn presentation_rounds_only_at_format_time() {
        assert_eq!(format_currency(33.333_333), "33.33");
        assert_eq!(format_percent(33.333_333), "33.3%");
        assert_eq!(format_currency(-12.5), "-12.50");
    }
}
