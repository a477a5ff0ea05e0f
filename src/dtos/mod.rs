pub mod fee;
pub mod product;
pub mod report;
pub mod sale;
pub mod stock;
