//! Tick validation functions
//!
//! Every rule a tick must satisfy before it can enter the pipeline lives here,
//! so the constructor, deserialization and the simulator all reject the same
//! inputs.

use super::errors::TickError;

// ============================================================================
// Individual Validation Functions
// ============================================================================

/// Validate that the instrument identifier is not empty or blank
///
/// # Returns
/// * `Ok(())` if the identifier contains at least one non-whitespace character
/// * `Err(TickError::InvalidInstrument)` otherwise
pub fn validate_instrument(instrument: &str) -> Result<(), TickError> {
    if instrument.trim().is_empty() {
        return Err(TickError::InvalidInstrument(format!(
            "Instrument must not be blank, got: {:?}",
            instrument
        )));
    }
    Ok(())
}

/// Validate that a price is a finite, strictly positive number
///
/// `side` is only used to build the error message ("bid" or "ask").
///
/// # Example
/// ```ignore
/// assert!(validate_price("bid", 100.0).is_ok());
/// assert!(validate_price("bid", 0.0).is_err());
/// assert!(validate_price("ask", f64::NAN).is_err());
/// ```
pub fn validate_price(side: &str, price: f64) -> Result<(), TickError> {
    // `!(price > 0.0)` also catches NaN
    if !(price > 0.0) || !price.is_finite() {
        return Err(TickError::InvalidPrice(format!(
            "{} price must be positive, got: {}",
            side, price
        )));
    }
    Ok(())
}

// ============================================================================
// Composite Validation Function
// ============================================================================

/// Validate the fields of a tick before construction
///
/// Returns the first error encountered. Volumes are deliberately not checked.
pub fn validate_tick(instrument: &str, bid_price: f64, ask_price: f64) -> Result<(), TickError> {
    validate_instrument(instrument)?;
    validate_price("bid", bid_price)?;
    validate_price("ask", ask_price)?;
    Ok(())
}
