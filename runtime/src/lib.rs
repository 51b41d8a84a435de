//! # Meal Order Runtime
//!
//! Hosts reducers as event-sourced repositories.
//!
//! ## Core Components
//!
//! - **Repository**: One per aggregate type. Serialises commands per identity,
//!   journals the produced events, folds them into the committed view, and
//!   publishes them to subscribers.
//! - **Retry**: Exponential backoff for journal faults.
//!
//! ## Command Flow
//!
//! ```text
//! command ─► target id ─► per-id lock ─► hydrate (cache or journal replay)
//!         ─► reduce ─► Err: rejection, nothing written
//!                   └► Ok: append (expected version) ─► fold ─► publish
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use mealorder_runtime::Repository;
//!
//! let orders = Repository::new(OrderReducer, order_environment, event_store);
//! let mut committed = orders.subscribe();
//!
//! orders.send(OrderCommand::CreateOrder { .. }).await?;
//! let envelope = committed.recv().await;
//! ```

use mealorder_core::command::Command;
use mealorder_core::event::SerializedEvent;
use mealorder_core::event_store::{EventStore, EventStoreError};
use mealorder_core::reducer::{Events, Reducer};
use mealorder_core::stream::{StreamId, Version};
use serde::{Serialize, de::DeserializeOwned};
use std::collections::HashMap;
use std::convert::Infallible;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio::sync::{OwnedMutexGuard, mpsc};

/// Retry logic with exponential backoff
pub mod retry;

pub use retry::{RetryPolicy, retry_with_predicate};

/// Error types for repositories
pub mod error {
    use mealorder_core::event::EventError;
    use mealorder_core::event_store::EventStoreError;
    use std::convert::Infallible;
    use thiserror::Error;

    /// Outcome of a command that did not commit.
    ///
    /// `Rejected` is a business outcome and final. The other variants are
    /// infrastructure faults; a caller may retry the same command.
    #[derive(Error, Debug)]
    pub enum RepositoryError<R> {
        /// The aggregate refused the command
        #[error("Command rejected: {0}")]
        Rejected(R),

        /// The journal failed to load or append
        #[error("Event store error: {0}")]
        EventStore(#[from] EventStoreError),

        /// An event could not be encoded or decoded
        #[error("Event encoding error: {0}")]
        Event(#[from] EventError),
    }

    impl<R> RepositoryError<R> {
        /// The rejection, if the command was refused
        #[must_use]
        pub const fn rejection(&self) -> Option<&R> {
            match self {
                Self::Rejected(rejection) => Some(rejection),
                _ => None,
            }
        }

        /// Consume the error, returning the rejection if there is one
        pub fn into_rejection(self) -> Option<R> {
            match self {
                Self::Rejected(rejection) => Some(rejection),
                _ => None,
            }
        }

        /// True for faults that may clear on retry
        #[must_use]
        pub const fn is_retryable(&self) -> bool {
            matches!(
                self,
                Self::EventStore(EventStoreError::Unavailable(_) | EventStoreError::ConcurrencyConflict { .. })
            )
        }
    }

    impl RepositoryError<Infallible> {
        /// Reuse a read-side failure where a command's error type is expected
        #[must_use]
        pub fn widen<R>(self) -> RepositoryError<R> {
            match self {
                Self::Rejected(never) => match never {},
                Self::EventStore(err) => RepositoryError::EventStore(err),
                Self::Event(err) => RepositoryError::Event(err),
            }
        }
    }
}

pub use error::RepositoryError;

/// Events committed by one command, as seen by subscribers.
#[derive(Debug, Clone)]
pub struct EventEnvelope<I, E> {
    /// Aggregate instance the events belong to
    pub aggregate_id: I,
    /// Stream version after the commit
    pub version: Version,
    /// Committed events, in order
    pub events: Vec<E>,
}

struct Committed<S> {
    state: S,
    version: Version,
}

type Subscriber<R> = mpsc::UnboundedSender<EventEnvelope<<R as Reducer>::Id, <R as Reducer>::Event>>;

type IdentityLocks<I> = Mutex<HashMap<I, Arc<tokio::sync::Mutex<()>>>>;

/// Exclusive access to one identity.
///
/// Dropping the permit releases the lock and forgets the identity once no
/// other command is holding or waiting for it.
struct Permit<'a, I: Eq + Hash> {
    locks: &'a IdentityLocks<I>,
    id: I,
    guard: Option<OwnedMutexGuard<()>>,
}

impl<I: Eq + Hash> Drop for Permit<'_, I> {
    fn drop(&mut self) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        drop(self.guard.take());
        if locks.get(&self.id).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(&self.id);
        }
    }
}

/// Event-sourced host for one aggregate type.
///
/// Commands for the same identity run one at a time: the repository holds a
/// per-identity async lock across validate, journal append and fold. Commands
/// for different identities run concurrently.
///
/// Subscribers get every committed batch on an unbounded channel, so a slow
/// subscriber never loses events.
pub struct Repository<R: Reducer> {
    reducer: R,
    environment: R::Environment,
    event_store: Arc<dyn EventStore>,
    committed: RwLock<HashMap<R::Id, Committed<R::State>>>,
    locks: IdentityLocks<R::Id>,
    subscribers: Mutex<Vec<Subscriber<R>>>,
}

impl<R> Repository<R>
where
    R: Reducer,
    R::Event: Serialize + DeserializeOwned + std::fmt::Debug,
{
    /// Create a repository journaling into `event_store`
    #[must_use]
    pub fn new(reducer: R, environment: R::Environment, event_store: Arc<dyn EventStore>) -> Self {
        Self {
            reducer,
            environment,
            event_store,
            committed: RwLock::new(HashMap::new()),
            locks: Mutex::new(HashMap::new()),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// The environment commands are reduced with
    pub const fn environment(&self) -> &R::Environment {
        &self.environment
    }

    /// Receive every batch of events committed from now on
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<EventEnvelope<R::Id, R::Event>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    /// Committed state of an aggregate this repository has already loaded.
    ///
    /// Never touches the journal; use [`Repository::load`] to hydrate an
    /// aggregate first.
    pub fn find(&self, id: &R::Id) -> Option<R::State> {
        self.committed
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .filter(|committed| !committed.version.is_initial())
            .map(|committed| committed.state.clone())
    }

    /// Committed state of an aggregate, replaying its journal if needed.
    ///
    /// Returns `None` when the aggregate has no events.
    ///
    /// # Errors
    ///
    /// Returns an infrastructure error if the journal cannot be read or
    /// decoded.
    pub async fn load(&self, id: &R::Id) -> Result<Option<R::State>, RepositoryError<Infallible>> {
        let _permit = self.acquire(id).await;

        let (state, version) = self.hydrate::<Infallible>(id).await?;
        Ok((!version.is_initial()).then_some(state))
    }

    /// Send a command to the aggregate it targets.
    ///
    /// Returns the committed events; an accepted command may commit none
    /// (an idempotent no-op).
    ///
    /// # Errors
    ///
    /// - [`RepositoryError::Rejected`]: the aggregate refused the command
    /// - [`RepositoryError::EventStore`]: the journal failed (retryable)
    /// - [`RepositoryError::Event`]: an event could not be encoded
    #[tracing::instrument(
        skip(self, command),
        fields(aggregate = R::AGGREGATE_TYPE, command = command.command_name())
    )]
    pub async fn send(&self, command: R::Command) -> Result<Events<R::Event>, RepositoryError<R::Rejection>> {
        let command_name = command.command_name();
        let id = R::target(&command);
        let _permit = self.acquire(&id).await;

        let (mut state, version) = self.hydrate::<R::Rejection>(&id).await?;

        let events = match self.reducer.reduce(&state, command, &self.environment) {
            Ok(events) => events,
            Err(rejection) => {
                metrics::counter!(
                    "repository.command.rejected",
                    "aggregate" => R::AGGREGATE_TYPE,
                    "command" => command_name
                )
                .increment(1);
                tracing::warn!(aggregate_id = %id, %rejection, "Command rejected");
                return Err(RepositoryError::Rejected(rejection));
            }
        };

        if events.is_empty() {
            metrics::counter!(
                "repository.command.noop",
                "aggregate" => R::AGGREGATE_TYPE,
                "command" => command_name
            )
            .increment(1);
            tracing::debug!(aggregate_id = %id, "Command accepted without events");
            return Ok(events);
        }

        let serialized = events
            .iter()
            .map(SerializedEvent::from_event)
            .collect::<Result<Vec<_>, _>>()?;

        let new_version = match self
            .event_store
            .append_events(Self::stream_id(&id), Some(version), serialized)
            .await
        {
            Ok(new_version) => new_version,
            Err(err) => {
                if matches!(err, EventStoreError::ConcurrencyConflict { .. }) {
                    // Another writer moved the stream; re-read it next time.
                    self.evict(&id);
                }
                return Err(err.into());
            }
        };

        R::replay(&mut state, &events);
        self.store_committed(id.clone(), state, new_version);

        metrics::counter!(
            "repository.command.committed",
            "aggregate" => R::AGGREGATE_TYPE,
            "command" => command_name
        )
        .increment(1);
        tracing::info!(
            aggregate_id = %id,
            version = %new_version,
            events = ?events.iter().map(mealorder_core::event::Event::event_type).collect::<Vec<_>>(),
            "Events committed"
        );

        self.publish(EventEnvelope {
            aggregate_id: id,
            version: new_version,
            events: events.to_vec(),
        });

        Ok(events)
    }

    /// Journal stream of one aggregate instance
    #[must_use]
    pub fn stream_id(id: &R::Id) -> StreamId {
        StreamId::for_aggregate(R::AGGREGATE_TYPE, id)
    }

    async fn acquire(&self, id: &R::Id) -> Permit<'_, R::Id> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(id.clone()).or_default())
        };

        Permit {
            locks: &self.locks,
            id: id.clone(),
            guard: Some(lock.lock_owned().await),
        }
    }

    fn cached(&self, id: &R::Id) -> Option<(R::State, Version)> {
        self.committed
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .map(|committed| (committed.state.clone(), committed.version))
    }

    fn store_committed(&self, id: R::Id, state: R::State, version: Version) {
        self.committed
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, Committed { state, version });
    }

    fn evict(&self, id: &R::Id) {
        self.committed
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
    }

    /// Current state and version, from the committed view or the journal.
    ///
    /// Caller must hold the identity's lock.
    async fn hydrate<X>(&self, id: &R::Id) -> Result<(R::State, Version), RepositoryError<X>> {
        if let Some(cached) = self.cached(id) {
            return Ok(cached);
        }

        let journal = self.event_store.load_events(Self::stream_id(id)).await?;
        let mut state = R::State::default();
        for serialized in &journal {
            let event: R::Event = serialized.decode()?;
            R::apply_event(&mut state, &event);
        }

        let version = Version::new(journal.len() as u64);
        if !version.is_initial() {
            tracing::debug!(aggregate_id = %id, %version, "Aggregate replayed from journal");
            self.store_committed(id.clone(), state.clone(), version);
        }
        Ok((state, version))
    }

    fn publish(&self, envelope: EventEnvelope<R::Id, R::Event>) {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|subscriber| subscriber.send(envelope.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mealorder_core::smallvec;
    use mealorder_macros::{Command, Event};
    use mealorder_testing::InMemoryEventStore;
    use serde::Deserialize;

    #[derive(Clone, Debug, Default)]
    struct TabState {
        open: bool,
        items: u32,
    }

    #[derive(Clone, Debug, Command)]
    enum TabCommand {
        Open { tab: String },
        Add { tab: String },
        Touch { tab: String },
    }

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Event)]
    enum TabEvent {
        Opened,
        ItemAdded,
    }

    #[derive(Debug, thiserror::Error)]
    enum TabRejection {
        #[error("tab already open")]
        AlreadyOpen,
        #[error("tab not open")]
        NotOpen,
    }

    struct TabReducer;

    impl Reducer for TabReducer {
        type Id = String;
        type State = TabState;
        type Command = TabCommand;
        type Event = TabEvent;
        type Rejection = TabRejection;
        type Environment = ();

        const AGGREGATE_TYPE: &'static str = "tab";

        fn target(command: &TabCommand) -> String {
            match command {
                TabCommand::Open { tab } | TabCommand::Add { tab } | TabCommand::Touch { tab } => tab.clone(),
            }
        }

        fn reduce(&self, state: &TabState, command: TabCommand, _env: &()) -> Result<Events<TabEvent>, TabRejection> {
            match command {
                TabCommand::Open { .. } if state.open => Err(TabRejection::AlreadyOpen),
                TabCommand::Open { .. } => Ok(smallvec![TabEvent::Opened]),
                TabCommand::Add { .. } if !state.open => Err(TabRejection::NotOpen),
                TabCommand::Add { .. } => Ok(smallvec![TabEvent::ItemAdded]),
                TabCommand::Touch { .. } => Ok(Events::new()),
            }
        }

        fn apply_event(state: &mut TabState, event: &TabEvent) {
            match event {
                TabEvent::Opened => state.open = true,
                TabEvent::ItemAdded => state.items += 1,
            }
        }
    }

    fn repository(store: &Arc<InMemoryEventStore>) -> Repository<TabReducer> {
        Repository::new(TabReducer, (), Arc::clone(store) as Arc<dyn EventStore>)
    }

    fn open(tab: &str) -> TabCommand {
        TabCommand::Open { tab: tab.to_string() }
    }

    fn add(tab: &str) -> TabCommand {
        TabCommand::Add { tab: tab.to_string() }
    }

    #[tokio::test]
    async fn accepted_commands_are_journaled_and_folded() {
        let store = Arc::new(InMemoryEventStore::new());
        let tabs = repository(&store);

        let events = tabs.send(open("t1")).await;
        assert!(matches!(events.as_deref(), Ok([TabEvent::Opened])));
        assert!(tabs.send(add("t1")).await.is_ok());

        let state = tabs.find(&"t1".to_string());
        assert!(matches!(state, Some(TabState { open: true, items: 1 })));
        assert_eq!(
            store.event_types(&StreamId::new("tab-t1")).await,
            vec!["Opened.v1".to_string(), "ItemAdded.v1".to_string()]
        );
    }

    #[tokio::test]
    async fn rejected_commands_write_nothing() {
        let store = Arc::new(InMemoryEventStore::new());
        let tabs = repository(&store);

        let result = tabs.send(add("t1")).await;
        assert!(matches!(result, Err(RepositoryError::Rejected(TabRejection::NotOpen))));
        assert_eq!(store.event_count().await, 0);
        assert!(tabs.find(&"t1".to_string()).is_none());
    }

    #[tokio::test]
    async fn noop_commands_do_not_touch_the_journal() {
        let store = Arc::new(InMemoryEventStore::new());
        let tabs = repository(&store);
        let mut committed = tabs.subscribe();

        let events = tabs.send(TabCommand::Touch { tab: "t1".to_string() }).await;
        assert!(matches!(events.as_deref(), Ok([])));
        assert_eq!(store.event_count().await, 0);
        assert!(committed.try_recv().is_err());
    }

    #[tokio::test]
    async fn fresh_repository_replays_the_journal() {
        let store = Arc::new(InMemoryEventStore::new());
        {
            let tabs = repository(&store);
            let _ = tabs.send(open("t1")).await;
            let _ = tabs.send(add("t1")).await;
            let _ = tabs.send(add("t1")).await;
        }

        let restarted = repository(&store);
        assert!(restarted.find(&"t1".to_string()).is_none());

        let loaded = restarted.load(&"t1".to_string()).await;
        assert!(matches!(loaded, Ok(Some(TabState { open: true, items: 2 }))));

        let reopened = restarted.send(open("t1")).await;
        assert!(matches!(reopened, Err(RepositoryError::Rejected(TabRejection::AlreadyOpen))));
    }

    #[tokio::test]
    async fn unknown_aggregate_loads_as_none() {
        let store = Arc::new(InMemoryEventStore::new());
        let tabs = repository(&store);
        assert!(matches!(tabs.load(&"nope".to_string()).await, Ok(None)));
    }

    #[test]
    fn read_failures_widen_into_command_errors() {
        let read: RepositoryError<Infallible> = EventStoreError::Unavailable("offline".to_string()).into();
        let widened: RepositoryError<TabRejection> = read.widen();
        assert!(widened.is_retryable());
        assert!(widened.rejection().is_none());
    }

    #[tokio::test]
    async fn subscribers_receive_committed_batches() {
        let store = Arc::new(InMemoryEventStore::new());
        let tabs = repository(&store);
        let mut committed = tabs.subscribe();

        let _ = tabs.send(open("t1")).await;
        let _ = tabs.send(add("t1")).await;

        let first = committed.recv().await;
        assert!(matches!(
            first,
            Some(EventEnvelope { ref aggregate_id, version, ref events })
                if aggregate_id == "t1" && version == Version::new(1) && events == &[TabEvent::Opened]
        ));
        let second = committed.recv().await;
        assert!(matches!(second, Some(EventEnvelope { version, .. }) if version == Version::new(2)));
    }

    #[tokio::test]
    async fn journal_failure_leaves_state_unchanged() {
        let store = Arc::new(InMemoryEventStore::new());
        let tabs = repository(&store);
        let _ = tabs.send(open("t1")).await;

        store.fail_next_appends(1);
        let failed = tabs.send(add("t1")).await;
        assert!(matches!(&failed, Err(err) if err.is_retryable()));
        assert!(matches!(tabs.find(&"t1".to_string()), Some(TabState { items: 0, .. })));

        assert!(tabs.send(add("t1")).await.is_ok());
        assert!(matches!(tabs.find(&"t1".to_string()), Some(TabState { items: 1, .. })));
    }

    #[tokio::test]
    async fn concurrent_writer_conflict_is_recovered_by_rehydration() {
        let store = Arc::new(InMemoryEventStore::new());
        let first = repository(&store);
        let second = repository(&store);

        let _ = first.send(open("t1")).await;
        assert!(second.load(&"t1".to_string()).await.is_ok());
        let _ = first.send(add("t1")).await;

        let stale = second.send(add("t1")).await;
        assert!(matches!(
            stale,
            Err(RepositoryError::EventStore(EventStoreError::ConcurrencyConflict { .. }))
        ));

        assert!(second.send(add("t1")).await.is_ok());
        assert!(matches!(second.find(&"t1".to_string()), Some(TabState { items: 2, .. })));
    }

    fn tracked_identities(tabs: &Repository<TabReducer>) -> usize {
        tabs.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[tokio::test]
    async fn identity_locks_are_released_after_use() {
        let store = Arc::new(InMemoryEventStore::new());
        let tabs = Arc::new(repository(&store));

        for tab in ["ghost-1", "ghost-2", "ghost-3"] {
            assert!(matches!(tabs.load(&tab.to_string()).await, Ok(None)));
        }
        let _ = tabs.send(add("t1")).await;
        assert_eq!(tracked_identities(&tabs), 0);

        let _ = tabs.send(open("t1")).await;
        let mut handles = Vec::new();
        for _ in 0..8 {
            let tabs = Arc::clone(&tabs);
            handles.push(tokio::spawn(async move { tabs.send(add("t1")).await.is_ok() }));
        }
        for handle in handles {
            assert!(matches!(handle.await, Ok(true)));
        }
        assert_eq!(tracked_identities(&tabs), 0);
    }

    #[tokio::test]
    async fn commands_for_one_identity_are_serialised() {
        let store = Arc::new(InMemoryEventStore::new());
        let tabs = Arc::new(repository(&store));
        let _ = tabs.send(open("t1")).await;

        let mut handles = Vec::new();
        for _ in 0..16 {
            let tabs = Arc::clone(&tabs);
            handles.push(tokio::spawn(async move { tabs.send(add("t1")).await.is_ok() }));
        }
        for handle in handles {
            assert!(matches!(handle.await, Ok(true)));
        }

        assert!(matches!(tabs.find(&"t1".to_string()), Some(TabState { items: 16, .. })));
        assert_eq!(store.event_count().await, 17);
    }
}
