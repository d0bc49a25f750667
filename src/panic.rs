//! Utilities for working with panic payloads.
//!
//! Connection reader tasks run under `catch_unwind`; these helpers turn the
//! captured payload into something that can be logged and reported to the
//! session's client.

use std::{any::Any, fmt};

/// Wrapper that formats a panic payload when logged or displayed.
///
/// The payload is downcast to `String` or `&'static str` if possible and falls
/// back to a generic description otherwise.
///
/// ```
/// use chatgate::panic::format_panic;
/// assert_eq!(format_panic(&"boom").to_string(), "boom");
/// assert_eq!(format_panic(&String::from("boom")).to_string(), "boom");
/// assert_eq!(format_panic(&5_u32).to_string(), "non-string panic payload");
/// ```
#[derive(Debug)]
#[must_use]
pub struct PanicMessage<'a>(&'a (dyn Any + Send));

impl fmt::Display for PanicMessage<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(s) = self.0.downcast_ref::<String>() {
            f.write_str(s)
        } else if let Some(s) = self.0.downcast_ref::<&'static str>() {
            f.write_str(s)
        } else {
            f.write_str("non-string panic payload")
        }
    }
}

/// Create a [`PanicMessage`] borrowing the given payload.
///
/// Pass `payload.as_ref()` for a boxed payload captured by `catch_unwind`, so
/// the downcast sees the payload rather than the box.
pub fn format_panic(panic: &(dyn Any + Send)) -> PanicMessage<'_> { PanicMessage(panic) }
