//! Lenient scalar decoders.
//!
//! The delivery backend returns the same logical field as a number on one
//! endpoint, a string on another, and `null` on a third. These wrappers accept
//! every representation that has been observed and normalize it into a single
//! canonical type, failing only when the value is structurally wrong (an array
//! or object where a scalar was expected, or an unparsable timestamp).
//!
//! Missing fields still need `#[serde(default)]` on the containing struct;
//! explicit `null` is handled by the wrappers themselves.

mod int;
mod string;
mod time;

pub use int::FlexibleInt;
pub use string::FlexibleString;
pub use time::{FlexibleTime, MILLIS_THRESHOLD};
