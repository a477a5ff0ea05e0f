pub mod fee;
pub mod product;
pub mod sale;
pub mod stock;
