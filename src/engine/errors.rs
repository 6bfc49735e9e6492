//! Error types for tick construction and dispatch
//!
//! This module centralizes the error types used by the tick pipeline, from the
//! validation boundary where ticks are built to the dispatch site where
//! consumers are invoked.

use thiserror::Error;

/// Errors raised while constructing a [`MarketTick`](crate::models::MarketTick)
///
/// These are the only validation-time failures of the pipeline. They are
/// returned synchronously to the tick source, which decides whether to retry
/// with corrected data or drop the observation.
///
/// # Error Categories
///
/// - **Invalid arguments**: `InvalidInstrument`, `InvalidPrice`
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TickError {
    /// Instrument identifier is empty or blank
    #[error("Invalid instrument: {0}")]
    InvalidInstrument(String),

    /// Bid or ask price is zero, negative, NaN or infinite
    #[error("Invalid price: {0}")]
    InvalidPrice(String),
}

impl TickError {
    /// Returns true if the tick was rejected because of a bad argument
    pub fn is_invalid_argument(&self) -> bool {
        matches!(
            self,
            TickError::InvalidInstrument(_) | TickError::InvalidPrice(_)
        )
    }
}

/// Errors a [`TickHandler`](crate::market_data::TickHandler) may report
/// while processing a tick
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HandlerError {
    /// The handler refused the tick
    #[error("Handler rejected tick: {0}")]
    Rejected(String),

    /// The handler panicked; the payload message is carried when available
    #[error("Handler panicked: {0}")]
    Panicked(String),

    /// A downstream sink the handler writes to is gone
    #[error("Sink closed: {0}")]
    SinkClosed(String),
}

/// A consumer failure caught at the dispatch site
///
/// Dispatch errors are recovered conditions: they are logged and counted by
/// the distributor and never propagated to the publisher or to sibling
/// consumers.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("Consumer '{handler}' failed on {instrument}: {source}")]
pub struct DispatchError {
    pub handler: String,
    pub instrument: String,
    #[source]
    pub source: HandlerError,
}

/// Errors from the distributor's own lifecycle (not from consumers)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DistributorError {
    /// The ingress loop was already started
    #[error("TickDistributor already started")]
    AlreadyStarted,
}
