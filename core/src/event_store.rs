//! Event store trait - the journal seam of the aggregate runtime.
//!
//! The store appends serialized events to per-aggregate streams with
//! optimistic concurrency and loads them back for replay. A durable engine is
//! not part of this workspace; `mealorder-testing` ships an in-memory one.

use crate::event::SerializedEvent;
use crate::stream::{StreamId, Version};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Boxed future returned by [`EventStore`] methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, EventStoreError>> + Send + 'a>>;

/// Errors that can occur during event store operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventStoreError {
    /// Expected version doesn't match the stream's current version.
    ///
    /// Another writer appended to the stream since it was loaded.
    #[error("Concurrency conflict on {stream_id}: expected version {expected}, found {actual}")]
    ConcurrencyConflict {
        /// The stream where the conflict occurred.
        stream_id: StreamId,
        /// The version the writer expected.
        expected: Version,
        /// The stream's actual version.
        actual: Version,
    },

    /// The backing storage is unavailable.
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Append-only storage for aggregate event streams.
///
/// Uses explicit `Pin<Box<dyn Future>>` returns so repositories can hold an
/// `Arc<dyn EventStore>`.
pub trait EventStore: Send + Sync {
    /// Append events to a stream.
    ///
    /// `expected_version` of `Some(v)` asserts the stream is at `v`
    /// (`Version::INITIAL` for a new stream); `None` skips the check.
    /// Returns the stream version after the append.
    ///
    /// # Errors
    ///
    /// - `ConcurrencyConflict`: the stream moved since it was loaded
    /// - `Unavailable`: the storage could not be reached
    fn append_events(
        &self,
        stream_id: StreamId,
        expected_version: Option<Version>,
        events: Vec<SerializedEvent>,
    ) -> StoreFuture<'_, Version>;

    /// Load every event of a stream, oldest first.
    ///
    /// A stream that was never written loads as an empty vector.
    ///
    /// # Errors
    ///
    /// - `Unavailable`: the storage could not be reached
    fn load_events(&self, stream_id: StreamId) -> StoreFuture<'_, Vec<SerializedEvent>>;

    /// Ids of every written stream whose name starts with `prefix`.
    ///
    /// Consumers use it to find the streams of one aggregate type after a
    /// restart. Order is unspecified.
    ///
    /// # Errors
    ///
    /// - `Unavailable`: the storage could not be reached
    fn stream_ids(&self, prefix: &str) -> StoreFuture<'_, Vec<StreamId>>;
}
