use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use rolegate_core::Identity;

use crate::Event;

/// Envelope for an event, carrying routing + schema metadata.
///
/// This is the unit handed to an [`crate::EventBus`]. Subscribers route on
/// `identity` (sibling sessions of the same user) and `event_type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: Uuid,
    identity: Identity,
    event_type: String,
    version: u32,
    occurred_at: DateTime<Utc>,
    payload: E,
}

impl<E> EventEnvelope<E> {
    pub fn new(
        event_id: Uuid,
        identity: Identity,
        event_type: impl Into<String>,
        version: u32,
        occurred_at: DateTime<Utc>,
        payload: E,
    ) -> Self {
        Self {
            event_id,
            identity,
            event_type: event_type.into(),
            version,
            occurred_at,
            payload,
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn into_payload(self) -> E {
        self.payload
    }
}

impl<E: Event> EventEnvelope<E> {
    /// Wrap an event for `identity`, taking type/version/time from the event.
    pub fn wrap(identity: Identity, event: E) -> Self {
        Self::new(
            Uuid::now_v7(),
            identity,
            event.event_type(),
            event.version(),
            event.occurred_at(),
            event,
        )
    }
}
