//! Event trait and serialized envelope for the aggregate journals.
//!
//! Events are facts recorded by an aggregate. They are serialized with
//! `bincode` before they reach the event store, and every event type carries
//! a stable, versioned name (`"OrderCreated.v1"`) so journals can be replayed
//! after a schema change.
//!
//! # Example
//!
//! ```
//! use mealorder_core::event::Event;
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Clone, Debug, Serialize, Deserialize)]
//! enum VendorEvent {
//!     VendorAdded { vendor_id: String },
//!     MenuImported { vendor_id: String, dishes: u32 },
//! }
//!
//! impl Event for VendorEvent {
//!     fn event_type(&self) -> &'static str {
//!         match self {
//!             VendorEvent::VendorAdded { .. } => "VendorAdded.v1",
//!             VendorEvent::MenuImported { .. } => "MenuImported.v1",
//!         }
//!     }
//! }
//! ```

use serde::{Serialize, de::DeserializeOwned};
use std::fmt;
use thiserror::Error;

/// Error types for event encoding.
#[derive(Error, Debug)]
pub enum EventError {
    /// Failed to serialize event to bytes.
    #[error("Failed to serialize event: {0}")]
    SerializationError(String),

    /// Failed to deserialize event from bytes.
    #[error("Failed to deserialize event: {0}")]
    DeserializationError(String),

    /// The journal holds an event type this aggregate does not know.
    #[error("Unknown event type: {0}")]
    UnknownEventType(String),
}

/// An event that can be journaled and replayed to reconstruct state.
///
/// Usually implemented with `#[derive(Event)]` from `mealorder-macros`, which
/// names each variant `"{Variant}.v1"`.
pub trait Event: Send + Sync + 'static {
    /// Returns the versioned event type identifier.
    fn event_type(&self) -> &'static str;

    /// Serialize this event to bincode bytes.
    ///
    /// # Errors
    ///
    /// Returns `EventError::SerializationError` if the event cannot be serialized.
    fn to_bytes(&self) -> Result<Vec<u8>, EventError>
    where
        Self: Serialize,
    {
        bincode::serialize(self).map_err(|e| EventError::SerializationError(e.to_string()))
    }

    /// Deserialize an event from bincode bytes.
    ///
    /// # Errors
    ///
    /// Returns `EventError::DeserializationError` if the bytes do not decode
    /// into this event type.
    fn from_bytes(bytes: &[u8]) -> Result<Self, EventError>
    where
        Self: DeserializeOwned + Sized,
    {
        bincode::deserialize(bytes).map_err(|e| EventError::DeserializationError(e.to_string()))
    }
}

/// A serialized event ready for the journal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SerializedEvent {
    /// The event type identifier (e.g. `"PurchaseOrderSent.v1"`).
    pub event_type: String,

    /// The bincode-serialized event data.
    pub data: Vec<u8>,
}

impl SerializedEvent {
    /// Create a new serialized event.
    #[must_use]
    pub const fn new(event_type: String, data: Vec<u8>) -> Self {
        Self { event_type, data }
    }

    /// Serialize a domain event.
    ///
    /// # Errors
    ///
    /// Returns `EventError::SerializationError` if the event cannot be serialized.
    pub fn from_event<E: Event + Serialize>(event: &E) -> Result<Self, EventError> {
        Ok(Self {
            event_type: event.event_type().to_string(),
            data: event.to_bytes()?,
        })
    }

    /// Decode this envelope back into a domain event.
    ///
    /// The decoded event's type name must match the envelope's; a mismatch
    /// means the journal holds a foreign or renamed event.
    ///
    /// # Errors
    ///
    /// Returns `EventError::DeserializationError` for undecodable bytes and
    /// `EventError::UnknownEventType` for a type-name mismatch.
    pub fn decode<E: Event + DeserializeOwned>(&self) -> Result<E, EventError> {
        let event = E::from_bytes(&self.data)?;
        if event.event_type() != self.event_type {
            return Err(EventError::UnknownEventType(self.event_type.clone()));
        }
        Ok(event)
    }
}

impl fmt::Display for SerializedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} bytes)", self.event_type, self.data.len())
    }
}
