pub mod fee;
pub mod product;
pub mod report;
pub mod sale;
pub mod stock_adjustment;
pub mod stock_check;
pub mod stock_sync;
