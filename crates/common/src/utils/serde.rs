//! Serde helpers for durations
//!
//! Config files and health reports carry every duration as an integer
//! number of milliseconds.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serializer};

/// `Duration` as whole milliseconds (u64)
///
/// ```rust
/// use std::time::Duration;
///
/// use lumen_common::duration_millis;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize)]
/// struct Stage {
///     #[serde(with = "duration_millis")]
///     timeout: Duration,
/// }
/// ```
pub mod duration_millis {
    use super::{Deserialize, Deserializer, Duration, Serializer};

    /// Serialize a Duration as milliseconds, saturating at `u64::MAX`
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(millis)
    }

    /// Deserialize milliseconds into a Duration
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
