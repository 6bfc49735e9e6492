use serde::{Deserialize, Serialize};
use std::fmt;

use crate::engine::errors::TickError;
use crate::engine::validation::validate_tick;

/// One bid/ask market observation for an instrument at a market place
///
/// Ticks are immutable values: fields are private, the only way to build one
/// is [`MarketTick::new`], which enforces a non-blank instrument and strictly
/// positive prices. Volumes are carried as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawMarketTick")]
pub struct MarketTick {
    instrument: String,
    market_place: String,
    bid_price: f64,
    ask_price: f64,
    bid_volume: i64,
    ask_volume: i64,
}

/// Unvalidated wire shape, only used to route deserialization through `new`
#[derive(Deserialize)]
struct RawMarketTick {
    instrument: String,
    market_place: String,
    bid_price: f64,
    ask_price: f64,
    bid_volume: i64,
    ask_volume: i64,
}

impl TryFrom<RawMarketTick> for MarketTick {
    type Error = TickError;

    fn try_from(raw: RawMarketTick) -> Result<Self, Self::Error> {
        MarketTick::new(
            raw.instrument,
            raw.market_place,
            raw.bid_price,
            raw.ask_price,
            raw.bid_volume,
            raw.ask_volume,
        )
    }
}

impl MarketTick {
    /// Build a validated tick
    ///
    /// # Errors
    /// * `TickError::InvalidInstrument` if `instrument` is empty or blank
    /// * `TickError::InvalidPrice` if either price is not a finite number > 0
    pub fn new(
        instrument: impl Into<String>,
        market_place: impl Into<String>,
        bid_price: f64,
        ask_price: f64,
        bid_volume: i64,
        ask_volume: i64,
    ) -> Result<Self, TickError> {
        let instrument = instrument.into();
        validate_tick(&instrument, bid_price, ask_price)?;

        Ok(Self {
            instrument,
            market_place: market_place.into(),
            bid_price,
            ask_price,
            bid_volume,
            ask_volume,
        })
    }

    pub fn instrument(&self) -> &str {
        &self.instrument
    }

    pub fn market_place(&self) -> &str {
        &self.market_place
    }

    pub fn bid_price(&self) -> f64 {
        self.bid_price
    }

    pub fn ask_price(&self) -> f64 {
        self.ask_price
    }

    pub fn bid_volume(&self) -> i64 {
        self.bid_volume
    }

    pub fn ask_volume(&self) -> i64 {
        self.ask_volume
    }

    /// Notional traded on the bid side (price * volume)
    pub fn bid_notional(&self) -> f64 {
        self.bid_price * self.bid_volume as f64
    }

    /// Notional traded on the ask side (price * volume)
    pub fn ask_notional(&self) -> f64 {
        self.ask_price * self.ask_volume as f64
    }

    /// Calculate mid-price
    pub fn mid_price(&self) -> f64 {
        (self.bid_price + self.ask_price) / 2.0
    }

    /// Calculate spread (ask - bid); negative for a crossed quote
    pub fn spread(&self) -> f64 {
        self.ask_price - self.bid_price
    }

    /// True if either side carries a negative volume
    pub fn has_negative_volume(&self) -> bool {
        self.bid_volume < 0 || self.ask_volume < 0
    }
}

impl fmt::Display for MarketTick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Tick[{}-{} | Bid: {:.2}@{} | Ask: {:.2}@{}]",
            self.instrument,
            self.market_place,
            self.bid_price,
            self.bid_volume,
            self.ask_price,
            self.ask_volume
        )
    }
}
