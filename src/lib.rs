// Library Crate Root
// lib.rs

// main.rs imports through lib.rs like an external crate
pub mod algorithms;
pub mod config;
pub mod engine;
pub mod market_data;
pub mod models;
pub mod simulation;
pub mod sink;

// pub use = re-export at crate root
pub use algorithms::{VwapCalculator, VwapManager, VwapSnapshot, VwapUpdate};
pub use config::{ConfigError, VwapConfig};
pub use engine::{DispatchError, HandlerError, TickError};
pub use market_data::{DispatchSummary, FnHandler, TickDistributor, TickHandler, TickLogger};
pub use models::MarketTick;
pub use sink::{ChannelSink, FanoutSink, MemorySink, TracingSink, VwapBroadcaster, VwapSink};
