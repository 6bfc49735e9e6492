pub mod manager;
pub mod vwap;

pub use manager::VwapManager;
pub use vwap::{VwapCalculator, VwapSnapshot, VwapUpdate};
