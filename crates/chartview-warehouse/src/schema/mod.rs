pub mod common;
pub mod stock;
