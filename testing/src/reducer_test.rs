//! Given-When-Then testing for reducers
//!
//! A test folds the given events into the default state, sends one command
//! through `reduce`, folds whatever it produced, and then runs assertions on
//! the produced events, the rejection, or the resulting state.

#![allow(clippy::module_name_repetitions)] // ReducerTest is the natural name

use mealorder_core::reducer::Reducer;

type StateAssertion<S> = Box<dyn FnOnce(&S)>;
type EventAssertion<E> = Box<dyn FnOnce(&[E])>;
type RejectionAssertion<R> = Box<dyn FnOnce(&R)>;

/// Fluent API for testing reducers with Given-When-Then syntax
///
/// # Example
///
/// ```ignore
/// use mealorder_testing::ReducerTest;
///
/// ReducerTest::new(OrderReducer)
///     .with_env(order_environment())
///     .given_events(vec![OrderEvent::OrderCreated { .. }])
///     .when_command(OrderCommand::CancelOrder { .. })
///     .then_events(|events| assert_eq!(events.len(), 1))
///     .then_state(|state| assert_eq!(state.status, OrderStatus::Canceled))
///     .run();
/// ```
pub struct ReducerTest<R: Reducer> {
    reducer: R,
    environment: Option<R::Environment>,
    given: Vec<R::Event>,
    initial_state: Option<R::State>,
    command: Option<R::Command>,
    state_assertions: Vec<StateAssertion<R::State>>,
    event_assertions: Vec<EventAssertion<R::Event>>,
    rejection_assertions: Vec<RejectionAssertion<R::Rejection>>,
}

impl<R> ReducerTest<R>
where
    R: Reducer,
    R::Event: std::fmt::Debug,
    R::Rejection: std::fmt::Debug,
{
    /// Create a new reducer test with the given reducer
    #[must_use]
    pub const fn new(reducer: R) -> Self {
        Self {
            reducer,
            environment: None,
            given: Vec::new(),
            initial_state: None,
            command: None,
            state_assertions: Vec::new(),
            event_assertions: Vec::new(),
            rejection_assertions: Vec::new(),
        }
    }

    /// Set the environment for the test
    #[must_use]
    pub fn with_env(mut self, env: R::Environment) -> Self {
        self.environment = Some(env);
        self
    }

    /// Start from an explicit state instead of `Default`
    #[must_use]
    pub fn given_state(mut self, state: R::State) -> Self {
        self.initial_state = Some(state);
        self
    }

    /// Events already in the journal (Given)
    #[must_use]
    pub fn given_events(mut self, events: Vec<R::Event>) -> Self {
        self.given.extend(events);
        self
    }

    /// Set the command to test (When)
    #[must_use]
    pub fn when_command(mut self, command: R::Command) -> Self {
        self.command = Some(command);
        self
    }

    /// Assert on the events the command produced (Then)
    ///
    /// The command must be accepted.
    #[must_use]
    pub fn then_events<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&[R::Event]) + 'static,
    {
        self.event_assertions.push(Box::new(assertion));
        self
    }

    /// Assert on the rejection (Then)
    ///
    /// The command must be rejected.
    #[must_use]
    pub fn then_rejection<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&R::Rejection) + 'static,
    {
        self.rejection_assertions.push(Box::new(assertion));
        self
    }

    /// Assert on the state after folding the produced events (Then)
    ///
    /// On rejection this is the state before the command.
    #[must_use]
    pub fn then_state<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&R::State) + 'static,
    {
        self.state_assertions.push(Box::new(assertion));
        self
    }

    /// Run the test and execute all assertions
    ///
    /// # Panics
    ///
    /// Panics if the command or environment is not set, if the outcome does
    /// not match the kind of assertions registered, or if any assertion fails.
    #[allow(clippy::panic)] // Test code can panic
    #[allow(clippy::expect_used)] // Test code can use expect
    pub fn run(self) {
        let mut state = self.initial_state.unwrap_or_default();
        R::replay(&mut state, &self.given);

        let command = self.command.expect("Command must be set with when_command()");
        let env = self
            .environment
            .expect("Environment must be set with with_env()");

        match self.reducer.reduce(&state, command, &env) {
            Ok(events) => {
                assert!(
                    self.rejection_assertions.is_empty(),
                    "Expected a rejection, but the command produced {events:?}"
                );
                R::replay(&mut state, &events);
                for assertion in self.event_assertions {
                    assertion(&events);
                }
            }
            Err(rejection) => {
                assert!(
                    self.event_assertions.is_empty(),
                    "Expected events, but the command was rejected: {rejection:?}"
                );
                for assertion in self.rejection_assertions {
                    assertion(&rejection);
                }
            }
        }

        for assertion in self.state_assertions {
            assertion(&state);
        }
    }
}

/// Helper assertions for produced events
pub mod assertions {
    use mealorder_core::event::Event;

    /// Assert that no events were produced
    ///
    /// # Panics
    ///
    /// Panics if events is not empty.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_no_events<E: std::fmt::Debug>(events: &[E]) {
        assert!(
            events.is_empty(),
            "Expected no events, but found {}: {:?}",
            events.len(),
            events
        );
    }

    /// Assert the produced event types, in order
    ///
    /// # Panics
    ///
    /// Panics if the event type names differ from `expected`.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_event_types<E: Event>(events: &[E], expected: &[&str]) {
        let actual: Vec<&str> = events.iter().map(Event::event_type).collect();
        assert_eq!(actual, expected, "Unexpected event types");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mealorder_core::command::Command;
    use mealorder_core::event::Event;
    use mealorder_core::reducer::Events;
    use mealorder_core::smallvec;
    use serde::{Deserialize, Serialize};

    #[derive(Clone, Debug, Default)]
    struct TrayState {
        meals: u32,
    }

    #[derive(Clone, Debug)]
    enum TrayCommand {
        Add,
        Take,
    }

    impl Command for TrayCommand {
        fn command_name(&self) -> &'static str {
            match self {
                Self::Add => "Add",
                Self::Take => "Take",
            }
        }
    }

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    enum TrayEvent {
        Added,
        Taken,
    }

    impl Event for TrayEvent {
        fn event_type(&self) -> &'static str {
            match self {
                Self::Added => "Added.v1",
                Self::Taken => "Taken.v1",
            }
        }
    }

    #[derive(Debug, thiserror::Error)]
    #[error("tray is empty")]
    struct EmptyTray;

    struct TrayReducer;

    impl Reducer for TrayReducer {
        type Id = String;
        type State = TrayState;
        type Command = TrayCommand;
        type Event = TrayEvent;
        type Rejection = EmptyTray;
        type Environment = ();

        const AGGREGATE_TYPE: &'static str = "tray";

        fn target(_command: &TrayCommand) -> String {
            "tray".to_string()
        }

        fn reduce(&self, state: &TrayState, command: TrayCommand, _env: &()) -> Result<Events<TrayEvent>, EmptyTray> {
            match command {
                TrayCommand::Add => Ok(smallvec![TrayEvent::Added]),
                TrayCommand::Take if state.meals == 0 => Err(EmptyTray),
                TrayCommand::Take => Ok(smallvec![TrayEvent::Taken]),
            }
        }

        fn apply_event(state: &mut TrayState, event: &TrayEvent) {
            match event {
                TrayEvent::Added => state.meals += 1,
                TrayEvent::Taken => state.meals -= 1,
            }
        }
    }

    #[test]
    fn given_events_are_folded_before_the_command() {
        ReducerTest::new(TrayReducer)
            .with_env(())
            .given_events(vec![TrayEvent::Added, TrayEvent::Added])
            .when_command(TrayCommand::Take)
            .then_events(|events| assertions::assert_event_types(events, &["Taken.v1"]))
            .then_state(|state| assert_eq!(state.meals, 1))
            .run();
    }

    #[test]
    fn rejection_leaves_state_untouched() {
        ReducerTest::new(TrayReducer)
            .with_env(())
            .when_command(TrayCommand::Take)
            .then_rejection(|rejection| assert_eq!(rejection.to_string(), "tray is empty"))
            .then_state(|state| assert_eq!(state.meals, 0))
            .run();
    }

    #[test]
    #[should_panic(expected = "Expected events")]
    fn event_assertion_on_rejected_command_fails() {
        ReducerTest::new(TrayReducer)
            .with_env(())
            .when_command(TrayCommand::Take)
            .then_events(assertions::assert_no_events)
            .run();
    }
}
