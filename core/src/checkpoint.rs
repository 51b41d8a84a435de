//! Delivery checkpoints for stream consumers.
//!
//! A consumer that reacts to a stream records how far it got, so after a
//! failure or a restart it resumes right after the last event it finished
//! instead of skipping the rest or reacting to old events again.
//!
//! Positions are stream versions: a checkpoint at `Version::new(3)` means the
//! first three events of the stream were handled.
//!
//! # Example
//!
//! ```ignore
//! let position = checkpoint.load_position(&stream_id).await?.unwrap_or(Version::INITIAL);
//! for (index, event) in journal.iter().enumerate().skip(position.value() as usize) {
//!     react(event).await?;
//!     checkpoint.save_position(&stream_id, Version::new(index as u64 + 1)).await?;
//! }
//! ```

use crate::event_store::StoreFuture;
use crate::stream::{StreamId, Version};

/// Storage for per-stream delivery positions.
///
/// Like [`EventStore`](crate::event_store::EventStore), methods return boxed
/// futures so consumers can hold an `Arc<dyn DeliveryCheckpoint>`.
pub trait DeliveryCheckpoint: Send + Sync {
    /// Record that every event up to `position` was handled.
    ///
    /// # Errors
    ///
    /// - `Unavailable`: the storage could not be reached
    fn save_position(&self, stream_id: &StreamId, position: Version) -> StoreFuture<'_, ()>;

    /// Last recorded position, `None` for a stream never handled.
    ///
    /// # Errors
    ///
    /// - `Unavailable`: the storage could not be reached
    fn load_position(&self, stream_id: &StreamId) -> StoreFuture<'_, Option<Version>>;
}
