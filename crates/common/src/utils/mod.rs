//! Small shared helpers
//!
//! - **[`serde`]**: millisecond encoding for `Duration` fields in config and
//!   health reports

pub mod serde;

pub use self::serde::duration_millis;
