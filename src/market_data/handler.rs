use tracing::Level;

use crate::engine::errors::HandlerError;
use crate::models::MarketTick;

/// A consumer of market ticks
///
/// Anything that wants ticks from the [`TickDistributor`](super::TickDistributor)
/// implements this single-method capability: VWAP calculators, loggers, test
/// probes. Handlers are shared across publisher threads, so `handle` takes
/// `&self` and implementations synchronize their own state.
pub trait TickHandler: Send + Sync {
    /// Name used in logs and stats
    fn name(&self) -> &str;

    /// Process one tick. An `Err` is logged by the distributor and does not
    /// affect delivery to other handlers.
    fn handle(&self, tick: &MarketTick) -> Result<(), HandlerError>;
}

/// Adapts a closure into a [`TickHandler`]
///
/// # Example
/// ```ignore
/// let probe = FnHandler::new("probe", |tick: &MarketTick| {
///     println!("{}", tick);
///     Ok(())
/// });
/// distributor.subscribe("OIL", Arc::new(probe));
/// ```
pub struct FnHandler<F> {
    name: String,
    f: F,
}

impl<F> FnHandler<F>
where
    F: Fn(&MarketTick) -> Result<(), HandlerError> + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> TickHandler for FnHandler<F>
where
    F: Fn(&MarketTick) -> Result<(), HandlerError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn handle(&self, tick: &MarketTick) -> Result<(), HandlerError> {
        (self.f)(tick)
    }
}

/// Logs every tick it receives through `tracing`
pub struct TickLogger {
    name: String,
    level: Level,
}

impl TickLogger {
    pub fn new(level: Level) -> Self {
        Self {
            name: "tick-logger".to_string(),
            level,
        }
    }
}

impl Default for TickLogger {
    fn default() -> Self {
        Self::new(Level::DEBUG)
    }
}

impl TickHandler for TickLogger {
    fn name(&self) -> &str {
        &self.name
    }

    fn handle(&self, tick: &MarketTick) -> Result<(), HandlerError> {
        // tracing levels must be static, hence the match
        match self.level {
            Level::ERROR => tracing::error!(instrument = tick.instrument(), "{}", tick),
            Level::WARN => tracing::warn!(instrument = tick.instrument(), "{}", tick),
            Level::INFO => tracing::info!(instrument = tick.instrument(), "{}", tick),
            Level::DEBUG => tracing::debug!(instrument = tick.instrument(), "{}", tick),
            _ => tracing::trace!(instrument = tick.instrument(), "{}", tick),
        }
        Ok(())
    }
}
