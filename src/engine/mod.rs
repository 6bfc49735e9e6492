pub mod errors;
pub mod validation;

pub use errors::{DispatchError, DistributorError, HandlerError, TickError};
pub use validation::validate_tick;
