//! # Meal Order Core
//!
//! Core traits and types shared by the meal order aggregates and the runtime
//! that hosts them.
//!
//! ## Core Concepts
//!
//! - **State**: The folded state of one aggregate instance (a vendor, an order,
//!   a purchase order)
//! - **Command**: A request to change one aggregate instance
//! - **Event**: A fact recorded by an aggregate, folded into its state
//! - **Rejection**: A typed, expected refusal of a command
//! - **Reducer**: Pure pair `(State, Command, Environment) → Events | Rejection`
//!   and `(State, Event) → State`
//! - **Environment**: Injected collaborators (clock, menu lookup, vendor sender)
//!
//! ## Example
//!
//! ```ignore
//! use mealorder_core::reducer::Reducer;
//!
//! impl Reducer for OrderReducer {
//!     type Id = OrderId;
//!     type State = OrderState;
//!     type Command = OrderCommand;
//!     type Event = OrderEvent;
//!     type Rejection = OrderRejection;
//!     type Environment = OrderEnvironment;
//!
//!     const AGGREGATE_TYPE: &'static str = "order";
//!
//!     fn target(command: &OrderCommand) -> OrderId { command.order_id().clone() }
//!
//!     fn reduce(
//!         &self,
//!         state: &OrderState,
//!         command: OrderCommand,
//!         env: &OrderEnvironment,
//!     ) -> Result<SmallVec<[OrderEvent; 4]>, OrderRejection> {
//!         // Validation goes here
//!         Ok(SmallVec::new())
//!     }
//!
//!     fn apply_event(state: &mut OrderState, event: &OrderEvent) {
//!         // Folding goes here
//!     }
//! }
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
pub use serde::{Deserialize, Serialize};
pub use smallvec::{SmallVec, smallvec};

/// Domain event trait and serialized event envelope
pub mod event;

/// Event store abstraction (the journal seam)
pub mod event_store;

/// Stream identity and versioning
pub mod stream;

/// Delivery progress of stream consumers
pub mod checkpoint;

/// Command module - inputs addressed to a single aggregate instance
pub mod command {
    /// A command addressed to one aggregate instance.
    ///
    /// The name is used for tracing spans and metrics labels; it is usually
    /// generated with `#[derive(Command)]` from `mealorder-macros`.
    pub trait Command: Send + 'static {
        /// Returns the command name (e.g. `"CreateOrder"`)
        fn command_name(&self) -> &'static str;
    }
}

/// Reducer module - the core trait for business logic
///
/// Reducers are pure: `reduce` validates a command against the current state
/// and either returns the events it produces or a typed rejection, and
/// `apply_event` folds one event into state. The only side effects allowed in
/// `reduce` are the ones reached through the injected environment.
pub mod reducer {
    use crate::command::Command;
    use crate::event::Event;
    use smallvec::SmallVec;
    use std::fmt::Display;
    use std::hash::Hash;

    /// Events produced by a single command.
    ///
    /// The largest command (purchase order consolidation) emits three events,
    /// so four inline slots avoid heap allocation for every command.
    pub type Events<E> = SmallVec<[E; 4]>;

    /// The Reducer trait - one aggregate type's state machine
    ///
    /// # Type Parameters
    ///
    /// - `Id`: Identity of an aggregate instance
    /// - `State`: Folded state of one instance (`Default` is the state before
    ///   the first event)
    /// - `Command`: Inputs the aggregate accepts
    /// - `Event`: Facts the aggregate records
    /// - `Rejection`: Typed refusal of a command
    /// - `Environment`: Injected collaborators
    pub trait Reducer {
        /// Identity of one aggregate instance
        type Id: Clone + Eq + Hash + Display;

        /// The state type this reducer folds events into
        type State: Default + Clone;

        /// The command type this reducer validates
        type Command: Command;

        /// The event type this reducer produces and folds
        type Event: Event + Clone;

        /// The rejection type returned for refused commands
        type Rejection: std::error::Error;

        /// The environment type with injected dependencies
        type Environment;

        /// Stream prefix for this aggregate type (e.g. `"order"`)
        const AGGREGATE_TYPE: &'static str;

        /// The aggregate instance a command is addressed to
        fn target(command: &Self::Command) -> Self::Id;

        /// Validate a command against current state.
        ///
        /// # Errors
        ///
        /// Returns the aggregate's rejection when the command is not allowed in
        /// the current state. A rejected command produces no events.
        fn reduce(
            &self,
            state: &Self::State,
            command: Self::Command,
            env: &Self::Environment,
        ) -> Result<Events<Self::Event>, Self::Rejection>;

        /// Fold one event into state.
        ///
        /// Must be deterministic: replaying a journal rebuilds the same state.
        fn apply_event(state: &mut Self::State, event: &Self::Event);

        /// Fold a sequence of events into state
        fn replay<'a, I>(state: &mut Self::State, events: I)
        where
            I: IntoIterator<Item = &'a Self::Event>,
            Self::Event: 'a,
        {
            for event in events {
                Self::apply_event(state, event);
            }
        }
    }
}

/// Environment module - Dependency injection traits
///
/// External collaborators are abstracted behind traits and injected through
/// each reducer's `Environment`.
pub mod environment {
    use chrono::{DateTime, NaiveDate, Utc};

    /// Clock trait - abstracts time for testability
    ///
    /// Rejections and events are time-stamped with `now()`, and the menu date
    /// range rule compares against `today()`.
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;

        /// Get the current calendar date (UTC)
        fn today(&self) -> NaiveDate {
            self.now().date_naive()
        }
    }

    /// System clock backed by `Utc::now()`
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}
