pub mod aggregation;
pub mod bundles;
pub mod csv_import;
pub mod export;
pub mod fees;
pub mod invalidation;
pub mod profitability;
pub mod stock;
