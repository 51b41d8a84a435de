//! # Meal Order Testing
//!
//! Test doubles and helpers for the meal order reducers and runtime.
//!
//! This crate provides:
//! - Deterministic clocks (`FixedClock`, `test_clock`)
//! - An in-memory event store with optimistic concurrency
//! - In-memory delivery checkpoints
//! - `ReducerTest`, a Given-When-Then builder for reducers
//!
//! ## Example
//!
//! ```ignore
//! use mealorder_testing::{InMemoryEventStore, test_clock};
//! use mealorder_runtime::Repository;
//!
//! #[tokio::test]
//! async fn vendor_is_journaled() {
//!     let store = Arc::new(InMemoryEventStore::new());
//!     let vendors = Repository::new(VendorReducer, VendorEnvironment::new(Arc::new(test_clock())), store.clone());
//!
//!     vendors
//!         .send(VendorCommand::AddVendor {
//!             vendor_id: "vendor:VendorName1".parse().unwrap(),
//!             who_adds: "admin@example.com".parse().unwrap(),
//!             vendor_name: "VendorName1".parse().unwrap(),
//!             email: "vendor@example.com".parse().unwrap(),
//!             phone_numbers: vec![],
//!             po_daily_deadline: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
//!         })
//!         .await
//!         .unwrap();
//!     assert_eq!(store.event_count().await, 1);
//! }
//! ```

use chrono::{DateTime, Utc};
use mealorder_core::environment::Clock;

/// Given-When-Then builder for reducers
pub mod reducer_test;

pub use reducer_test::ReducerTest;

/// Mock implementations of environment traits and the event store.
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use mealorder_core::checkpoint::DeliveryCheckpoint;
    use mealorder_core::event::SerializedEvent;
    use mealorder_core::event_store::{EventStore, EventStoreError, StoreFuture};
    use mealorder_core::stream::{StreamId, Version};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::sync::RwLock;

    /// Fixed clock for deterministic tests
    ///
    /// # Example
    ///
    /// ```
    /// use mealorder_testing::mocks::FixedClock;
    /// use mealorder_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Default fixed clock for tests: 2019-02-01 00:00:00 UTC.
    ///
    /// Menu ranges used across the test suites start mid-February 2019, so
    /// they are in the future for this clock.
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(DateTime::<Utc>::from_timestamp(1_548_979_200, 0).unwrap_or_default())
    }

    /// In-memory event store.
    ///
    /// Streams live in a `HashMap` behind a `tokio::sync::RwLock`. Appends
    /// check the expected version exactly like a durable store would, and
    /// [`InMemoryEventStore::fail_next_appends`] makes the next appends fail
    /// with `Unavailable` so retry paths can be exercised.
    #[derive(Debug, Default)]
    pub struct InMemoryEventStore {
        streams: RwLock<HashMap<StreamId, Vec<SerializedEvent>>>,
        failing_appends: AtomicU32,
    }

    impl InMemoryEventStore {
        /// Create an empty store
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Make the next `count` appends fail with `EventStoreError::Unavailable`
        pub fn fail_next_appends(&self, count: u32) {
            self.failing_appends.store(count, Ordering::SeqCst);
        }

        /// Total number of events across all streams
        pub async fn event_count(&self) -> usize {
            self.streams.read().await.values().map(Vec::len).sum()
        }

        /// Event type names of one stream, oldest first
        pub async fn event_types(&self, stream_id: &StreamId) -> Vec<String> {
            self.streams
                .read()
                .await
                .get(stream_id)
                .map(|events| events.iter().map(|e| e.event_type.clone()).collect())
                .unwrap_or_default()
        }

        fn take_failure(&self) -> bool {
            self.failing_appends
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        }
    }

    impl EventStore for InMemoryEventStore {
        fn append_events(
            &self,
            stream_id: StreamId,
            expected_version: Option<Version>,
            events: Vec<SerializedEvent>,
        ) -> StoreFuture<'_, Version> {
            Box::pin(async move {
                if self.take_failure() {
                    return Err(EventStoreError::Unavailable(format!(
                        "injected append failure on {stream_id}"
                    )));
                }

                let mut streams = self.streams.write().await;
                let stream = streams.entry(stream_id.clone()).or_default();
                let actual = Version::new(stream.len() as u64);

                if let Some(expected) = expected_version {
                    if expected != actual {
                        return Err(EventStoreError::ConcurrencyConflict {
                            stream_id,
                            expected,
                            actual,
                        });
                    }
                }

                let appended = events.len() as u64;
                stream.extend(events);
                Ok(actual.advance(appended))
            })
        }

        fn load_events(&self, stream_id: StreamId) -> StoreFuture<'_, Vec<SerializedEvent>> {
            Box::pin(async move {
                Ok(self
                    .streams
                    .read()
                    .await
                    .get(&stream_id)
                    .cloned()
                    .unwrap_or_default())
            })
        }

        fn stream_ids(&self, prefix: &str) -> StoreFuture<'_, Vec<StreamId>> {
            let prefix = prefix.to_string();
            Box::pin(async move {
                Ok(self
                    .streams
                    .read()
                    .await
                    .iter()
                    .filter(|(id, events)| !events.is_empty() && id.as_str().starts_with(&prefix))
                    .map(|(id, _)| id.clone())
                    .collect())
            })
        }
    }

    /// In-memory delivery checkpoints.
    ///
    /// Share one instance between service restarts to model a durable
    /// checkpoint table.
    #[derive(Debug, Default)]
    pub struct InMemoryCheckpoint {
        positions: RwLock<HashMap<StreamId, Version>>,
    }

    impl InMemoryCheckpoint {
        /// Create a checkpoint store with no positions
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl DeliveryCheckpoint for InMemoryCheckpoint {
        fn save_position(&self, stream_id: &StreamId, position: Version) -> StoreFuture<'_, ()> {
            let stream_id = stream_id.clone();
            Box::pin(async move {
                self.positions.write().await.insert(stream_id, position);
                Ok(())
            })
        }

        fn load_position(&self, stream_id: &StreamId) -> StoreFuture<'_, Option<Version>> {
            let stream_id = stream_id.clone();
            Box::pin(async move { Ok(self.positions.read().await.get(&stream_id).copied()) })
        }
    }
}

// Re-export commonly used items
pub use mocks::{FixedClock, InMemoryCheckpoint, InMemoryEventStore, test_clock};
