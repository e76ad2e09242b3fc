//! Bounded payload formatting.
//!
//! Every outbound payload is rendered into a `heapless::String` of fixed
//! capacity. Output that would not fit is reported as [`FormatError`] instead
//! of being cut short.

use std::fmt::{self, Write};

use heapless::String;

use crate::error::FormatError;

pub const TOPIC_CAPACITY: usize = 64;
pub const REPORT_CAPACITY: usize = 512;
pub const STATUS_CAPACITY: usize = 2048;
pub const DIAGNOSTIC_CAPACITY: usize = 1024;
pub const VALUE_CAPACITY: usize = 20;

/// Render `args` into a buffer of `N` bytes.
pub fn bounded<const N: usize>(
    what: &'static str,
    args: fmt::Arguments<'_>,
) -> Result<String<N>, FormatError> {
    let mut buf = String::new();
    buf.write_fmt(args)
        .map_err(|_| FormatError::Overflow { what, capacity: N })?;
    Ok(buf)
}

/// Copy an already rendered string into a buffer of `N` bytes.
pub fn bounded_str<const N: usize>(what: &'static str, s: &str) -> Result<String<N>, FormatError> {
    let mut buf = String::new();
    buf.push_str(s)
        .map_err(|_| FormatError::Overflow { what, capacity: N })?;
    Ok(buf)
}

/// Two decimals, or `NaN` for a missing value.
pub fn float_or_nan(value: Option<f32>) -> Result<String<VALUE_CAPACITY>, FormatError> {
    match value {
        Some(v) => bounded("value", format_args!("{v:.2}")),
        None => bounded_str("value", "NaN"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fits_exactly() {
        let s: String<5> = bounded("t", format_args!("{}", 12345)).unwrap();
        assert_eq!(s.as_str(), "12345");
    }

    #[test]
    fn overflow_is_an_error_not_a_truncation() {
        let r: Result<String<4>, _> = bounded("t", format_args!("{}", 12345));
        assert_eq!(
            r.unwrap_err(),
            FormatError::Overflow {
                what: "t",
                capacity: 4
            }
        );
    }

    #[test]
    fn floats_render_with_two_decimals() {
        assert_eq!(float_or_nan(Some(230.456)).unwrap().as_str(), "230.46");
        assert_eq!(float_or_nan(None).unwrap().as_str(), "NaN");
    }

    #[test]
    fn huge_float_does_not_fit_value_buffer() {
        assert!(float_or_nan(Some(f32::MAX)).is_err());
    }
}
