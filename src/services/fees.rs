// src/services/fees.rs
use std::collections::HashMap;

use chrono::NaiveDate;

use crate::models::fee::{PickingFee, PlatformFee, ProductCost, ShippingRate};
use crate::models::product::VatStatus;
use crate::models::sale::SaleCostRow;
use crate::services::profitability::{evaluate, SaleInput, SaleProfitability};

// ==================== Effective dating ====================

pub trait EffectiveDated {
    fn effective_from(&self) -> NaiveDate;
    fn effective_to(&self) -> Option<NaiveDate>;

    /// `effective_to` is exclusive: a superseded record stops applying on the
    /// day its successor starts.
    fn covers(&self, date: NaiveDate) -> bool {
        self.effective_from() <= date && self.effective_to().map_or(true, |to| date < to)
    }

    fn is_current(&self) -> bool {
        self.effective_to().is_none()
    }
}

macro_rules! effective_dated {
    ($($ty:ty),*) => {
        $(impl EffectiveDated for $ty {
            fn effective_from(&self) -> NaiveDate {
                self.effective_from
            }

            fn effective_to(&self) -> Option<NaiveDate> {
                self.effective_to
            }
        })*
    };
}

effective_dated!(PlatformFee, ShippingRate, PickingFee, ProductCost);

/// Record in force on `date`. Dates before the first record fall back to the
/// current (open-ended) record.
pub fn effective_at<T: EffectiveDated>(records: &[T], date: NaiveDate) -> Option<&T> {
    records
        .iter()
        .filter(|r| r.covers(date))
        .max_by_key(|r| r.effective_from())
        .or_else(|| records.iter().find(|r| r.is_current()))
}

// ==================== Pass-through costs ====================

pub fn platform_fee_amount(fee: Option<&PlatformFee>, total_price: f64) -> f64 {
    match fee {
        Some(f) => total_price * f.percentage / 100.0 + f.flat_fee,
        None => 0.0,
    }
}

/// Courier rate for the parcel plus the warehouse picking fee.
pub fn fulfilment_cost(rate: Option<&ShippingRate>, picking: Option<&PickingFee>) -> f64 {
    rate.map_or(0.0, |r| r.price) + picking.map_or(0.0, |p| p.fee)
}

// ==================== Fee book ====================

/// Fee history grouped by key, used to resolve a sale's cost inputs as of
/// its sale date.
#[derive(Debug, Default)]
pub struct FeeBook {
    platform_fees: HashMap<String, Vec<PlatformFee>>,
    shipping_rates: HashMap<i64, Vec<ShippingRate>>,
    picking_fees: HashMap<String, Vec<PickingFee>>,
    product_costs: HashMap<String, Vec<ProductCost>>,
}

impl FeeBook {
    pub fn new(
        platform_fees: Vec<PlatformFee>,
        shipping_rates: Vec<ShippingRate>,
        picking_fees: Vec<PickingFee>,
        product_costs: Vec<ProductCost>,
    ) -> Self {
        let mut book = FeeBook::default();
        for fee in platform_fees {
            book.platform_fees
                .entry(fee.platform.to_lowercase())
                .or_default()
                .push(fee);
        }
        for rate in shipping_rates {
            book.shipping_rates.entry(rate.shipping_service_id).or_default().push(rate);
        }
        for fee in picking_fees {
            book.picking_fees.entry(fee.name.clone()).or_default().push(fee);
        }
        for cost in product_costs {
            book.product_costs.entry(cost.sku.clone()).or_default().push(cost);
        }
        book
    }

    pub fn platform_fee(&self, platform: &str, date: NaiveDate) -> Option<&PlatformFee> {
        self.platform_fees
            .get(&platform.to_lowercase())
            .and_then(|records| effective_at(records, date))
    }

    pub fn shipping_rate(&self, service_id: i64, date: NaiveDate) -> Option<&ShippingRate> {
        self.shipping_rates
            .get(&service_id)
            .and_then(|records| effective_at(records, date))
    }

    pub fn picking_fee(&self, name: &str, date: NaiveDate) -> Option<&PickingFee> {
        self.picking_fees
            .get(name)
            .and_then(|records| effective_at(records, date))
    }

    pub fn product_cost(&self, sku: &str, date: NaiveDate) -> Option<&ProductCost> {
        self.product_costs
            .get(sku)
            .and_then(|records| effective_at(records, date))
    }

    pub fn resolve(&self, row: &SaleCostRow) -> SaleInput {
        // Historical unit cost wins over the product's current cost components.
        let product_cost_per_unit = match self.product_cost(&row.sku, row.sale_date) {
            Some(cost) => Some(cost.unit_cost),
            None => {
                let parts = [row.product_cost, row.packaging_cost, row.making_up_cost, row.additional_costs];
                parts.iter().any(Option::is_some).then(|| parts.into_iter().flatten().sum::<f64>())
            }
        };

        let rate = row
            .shipping_service_id
            .and_then(|id| self.shipping_rate(id, row.sale_date));
        let picking = row
            .picking_fee_name
            .as_deref()
            .and_then(|name| self.picking_fee(name, row.sale_date));

        SaleInput {
            quantity: row.quantity,
            total_price: row.total_price,
            product_cost_per_unit,
            platform_fees: Some(platform_fee_amount(
                self.platform_fee(&row.platform, row.sale_date),
                row.total_price,
            )),
            shipping_cost: Some(fulfilment_cost(rate, picking)),
            vat_status: VatStatus::from_db(row.vat_status.as_deref()),
            promoted: row.promoted,
            promoted_listing_percentage: row.promoted_listing_percentage,
        }
    }

    pub fn price(&self, row: &SaleCostRow) -> SaleProfitability {
        let (costs, profitability) = evaluate(&self.resolve(row));
        SaleProfitability {
            id: row.id,
            sale_date: row.sale_date,
            platform: row.platform.clone(),
            sku: row.sku.clone(),
            listing_title: row.listing_title.clone(),
            quantity: row.quantity,
            total_price: row.total_price,
            promoted: row.promoted,
            verified: row.verified,
            costs,
            profitability,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn fee(id: i64, platform: &str, pct: f64, from: NaiveDate, to: Option<NaiveDate>) -> PlatformFee {
        PlatformFee {
            id,
            platform: platform.to_string(),
            percentage: pct,
            flat_fee: 0.30,
            effective_from: from,
            effective_to: to,
        }
    }

    fn sale_row() -> SaleCostRow {
        SaleCostRow {
            id: 1,
            sale_date: date(2024, 3, 10),
            platform: "eBay".to_string(),
            sku: "MUG-01".to_string(),
            listing_title: "Mug".to_string(),
            quantity: 2,
            total_price: 20.0,
            promoted: false,
            verified: false,
            product_cost: Some(3.0),
            packaging_cost: Some(0.5),
            making_up_cost: None,
            additional_costs: None,
            vat_status: Some("zero".to_string()),
            promoted_listing_percentage: None,
            shipping_service_id: Some(7),
            picking_fee_name: Some("standard".to_string()),
        }
    }

    #[test]
    fn picks_record_covering_the_date() {
        let records = vec![
            fee(1, "eBay", 10.0, date(2023, 1, 1), Some(date(2024, 1, 1))),
            fee(2, "eBay", 12.0, date(2024, 1, 1), None),
        ];
        assert_eq!(effective_at(&records, date(2023, 12, 31)).map(|f| f.id), Some(1));
        assert_eq!(effective_at(&records, date(2024, 1, 1)).map(|f| f.id), Some(2));
        assert_eq!(effective_at(&records, date(2030, 6, 1)).map(|f| f.id), Some(2));
    }

    #[test]
    fn dates_before_history_fall_back_to_current_record() {
        let records = vec![fee(5, "Amazon", 15.0, date(2024, 6, 1), None)];
        assert_eq!(effective_at(&records, date(2020, 1, 1)).map(|f| f.id), Some(5));
        assert!(effective_at::<PlatformFee>(&[], date(2020, 1, 1)).is_none());
    }

    #[test]
    fn platform_fee_is_percentage_plus_flat() {
        let f = fee(1, "eBay", 12.8, date(2024, 1, 1), None);
        assert!((platform_fee_amount(Some(&f), 50.0) - 6.7).abs() < 1e-9);
        assert_eq!(platform_fee_amount(None, 50.0), 0.0);
    }

    #[test]
    fn resolves_sale_inputs_from_history() {
        let book = FeeBook::new(
            vec![fee(1, "ebay", 10.0, date(2024, 1, 1), None)],
            vec![ShippingRate {
                id: 1,
                shipping_service_id: 7,
                price: 3.2,
                effective_from: date(2024, 1, 1),
                effective_to: None,
            }],
            vec![PickingFee {
                id: 1,
                name: "standard".to_string(),
                fee: 0.8,
                effective_from: date(2024, 1, 1),
                effective_to: None,
            }],
            vec![],
        );

        let input = book.resolve(&sale_row());
        assert_eq!(input.product_cost_per_unit, Some(3.5));
        assert!((input.platform_fees.unwrap() - 2.3).abs() < 1e-9);
        assert!((input.shipping_cost.unwrap() - 4.0).abs() < 1e-9);
        assert_eq!(input.vat_status, Some(VatStatus::Zero));
    }

    #[test]
    fn null_or_unknown_vat_status_is_not_charged() {
        let book = FeeBook::new(vec![], vec![], vec![], vec![]);
        for vat_status in [None, Some("20%".to_string())] {
            let row = SaleCostRow {
                vat_status,
                ..sale_row()
            };
            assert_eq!(book.resolve(&row).vat_status, None);
            assert_eq!(book.price(&row).costs.vat_cost, 0.0);
        }
    }

    #[test]
    fn historical_product_cost_overrides_current_components() {
        let book = FeeBook::new(
            vec![],
            vec![],
            vec![],
            vec![ProductCost {
                id: 1,
                sku: "MUG-01".to_string(),
                unit_cost: 2.75,
                effective_from: date(2024, 1, 1),
                effective_to: None,
            }],
        );
        let input = book.resolve(&sale_row());
        assert_eq!(input.product_cost_per_unit, Some(2.75));
        assert_eq!(input.platform_fees, Some(0.0));
        assert_eq!(input.shipping_cost, Some(0.0));
    }

    #[test]
    fn priced_sale_carries_row_identity() {
        let row = SaleCostRow {
            promoted: true,
            promoted_listing_percentage: Some(5.0),
            ..sale_row()
        };
        let priced = FeeBook::default().price(&row);
        assert_eq!(priced.sku, "MUG-01");
        assert!((priced.costs.total_product_cost - 7.0).abs() < 1e-9);
        assert!((priced.costs.advertising_cost - 1.0).abs() < 1e-9);
        assert!((priced.profitability.profit - 12.0).abs() < 1e-9);
        assert!((priced.profitability.profit_margin - 60.0).abs() < 1e-9);
    }

    #[test]
    fn product_without_costs_resolves_to_none() {
        let row = SaleCostRow {
            product_cost: None,
            packaging_cost: None,
            ..sale_row()
        };
        assert_eq!(FeeBook::default().resolve(&row).product_cost_per_unit, None);
    }
}
