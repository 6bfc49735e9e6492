pub mod market_tick;

pub use market_tick::MarketTick;
