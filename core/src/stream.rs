//! Event stream identification and versioning types.
//!
//! Every aggregate instance owns one journal stream named
//! `"{aggregate-type}-{identity}"`, e.g. `"vendor-vendor:VendorName1"`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of one aggregate instance's event stream.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamId(String);

impl StreamId {
    /// Create a new `StreamId` from a string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Build the stream of one aggregate instance.
    ///
    /// # Examples
    ///
    /// ```
    /// use mealorder_core::stream::StreamId;
    ///
    /// let id = StreamId::for_aggregate("purchase-order", "vendor:Pasta/2019-02-15");
    /// assert_eq!(id.as_str(), "purchase-order-vendor:Pasta/2019-02-15");
    /// ```
    #[must_use]
    pub fn for_aggregate(aggregate_type: &str, identity: impl fmt::Display) -> Self {
        Self(format!("{aggregate_type}-{identity}"))
    }

    /// Prefix shared by every stream of one aggregate type.
    ///
    /// ```
    /// use mealorder_core::stream::StreamId;
    ///
    /// let id = StreamId::for_aggregate("purchase-order", "vendor:Pasta/2019-02-15");
    /// assert!(id.as_str().starts_with(&StreamId::aggregate_prefix("purchase-order")));
    /// ```
    #[must_use]
    pub fn aggregate_prefix(aggregate_type: &str) -> String {
        format!("{aggregate_type}-")
    }

    /// Get the stream ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Number of events committed to a stream.
///
/// A stream that has never been written is at [`Version::INITIAL`]; appending
/// `n` events moves it to `version + n`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Version(u64);

impl Version {
    /// Version of an empty stream
    pub const INITIAL: Self = Self(0);

    /// Create a version from a raw count
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Raw event count
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Version after appending `count` events
    #[must_use]
    pub const fn advance(self, count: u64) -> Self {
        Self(self.0 + count)
    }

    /// True for a stream that holds no events
    #[must_use]
    pub const fn is_initial(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregate_stream_names_are_prefixed() {
        let id = StreamId::for_aggregate("order", "user@example.com/vendor:A/2019-02-15");
        assert_eq!(id.to_string(), "order-user@example.com/vendor:A/2019-02-15");
    }

    #[test]
    fn version_advances_by_event_count() {
        let v = Version::INITIAL;
        assert!(v.is_initial());
        assert_eq!(v.advance(3), Version::new(3));
        assert_eq!(v.advance(3).advance(1).value(), 4);
        assert!(Version::new(1) > Version::INITIAL);
    }
}
