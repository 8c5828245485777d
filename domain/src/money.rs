//! Major/minor currency unit conversion.

use crate::CoreError;

/// Largest amount that survives an f64 round-trip exactly (2^53).
const MAX_MINOR_UNITS: f64 = 9_007_199_254_740_992.0;

/// Convert a major-unit price (e.g. `19.99`) to minor units (`1999`).
///
/// The result is `price * 100` rounded to the nearest integer, which absorbs
/// binary floating point noise such as `19.99 * 100 == 1998.9999999999998`.
pub fn to_minor_units(price: f64) -> Result<u64, CoreError> {
    if !price.is_finite() {
        return Err(CoreError::invalid("price must be a finite number"));
    }
    if price < 0.0 {
        return Err(CoreError::invalid("price must not be negative"));
    }
    let minor = (price * 100.0).round();
    if minor > MAX_MINOR_UNITS {
        return Err(CoreError::invalid("price is too large"));
    }
    Ok(minor as u64)
}
