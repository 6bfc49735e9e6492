//! Market data distribution module
//!
//! This module routes ticks from tick sources to the handlers subscribed for
//! each instrument (VWAP calculators, loggers, probes).

pub mod handler;
pub mod tick_distributor;

pub use handler::{FnHandler, TickHandler, TickLogger};
pub use tick_distributor::{DispatchSummary, TickDistributor, TickDistributorStats};
