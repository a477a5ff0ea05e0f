// src/services/export.rs
use std::io::Write;

use crate::services::profitability::{format_currency, format_percent, SaleProfitability};

const HEADER: [&str; 15] = [
    "Date",
    "Platform",
    "SKU",
    "Listing Title",
    "Quantity",
    "Total Price",
    "Product Cost",
    "Platform Fees",
    "Shipping",
    "VAT",
    "Advertising",
    "Total Costs",
    "Profit",
    "Margin",
    "Verified",
];

/// Writes sales as CSV, rounding money to 2 dp and margins to 1 dp.
pub fn write_sales<W: Write>(out: W, sales: &[SaleProfitability]) -> Result<(), csv::Error> {
    let mut wtr = csv::Writer::from_writer(out);
    wtr.write_record(HEADER)?;
    for s in sales {
        wtr.write_record([
            s.sale_date.to_string(),
            s.platform.clone(),
            s.sku.clone(),
            s.listing_title.clone(),
            s.quantity.to_string(),
            format_currency(s.total_price),
            format_currency(s.costs.total_product_cost),
            format_currency(s.costs.platform_fees),
            format_currency(s.costs.shipping_cost),
            format_currency(s.costs.vat_cost),
            format_currency(s.costs.advertising_cost),
            format_currency(s.profitability.total_costs),
            format_currency(s.profitability.profit),
            format_percent(s.profitability.profit_margin),
            if s.verified { "yes" } else { "no" }.to_string(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::product::VatStatus;
    use crate::services::profitability::{evaluate, SaleInput};
    use chrono::NaiveDate;

    #[test]
    fn export_rounds_for_display() {
        let (costs, profitability) = evaluate(&SaleInput {
            quantity: 1,
            total_price: 100.0,
            product_cost_per_unit: Some(20.0),
            platform_fees: Some(15.0),
            shipping_cost: Some(5.0),
            vat_status: Some(VatStatus::Standard),
            promoted: true,
            promoted_listing_percentage: Some(10.0),
        });
        let sale = SaleProfitability {
            id: 1,
            sale_date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            platform: "eBay".to_string(),
            sku: "MUG-01".to_string(),
            listing_title: "Mug, blue".to_string(),
            quantity: 1,
            total_price: 100.0,
            promoted: true,
            verified: false,
            costs,
            profitability,
        };

        let mut buf = Vec::new();
        write_sales(&mut buf, &[sale]).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let mut lines = text.lines();
        assert!(lines.next().unwrap().starts_with("Date,Platform,SKU"));
        assert_eq!(
            lines.next().unwrap(),
            "2024-05-01,eBay,MUG-01,\"Mug, blue\",1,100.00,20.00,15.00,5.00,16.67,10.00,66.67,33.33,33.3%,no"
        );
    }
}
