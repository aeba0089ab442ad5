use serde::{Deserialize, Serialize};
use uuid::Uuid;

use buildledger_core::ProjectId;

use crate::event::Event;

/// Envelope for an event, carrying project + stream metadata.
///
/// - `sequence_number` is monotonically increasing per project stream, which
///   lets consumers drop redeliveries.
/// - `payload` is the event itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: Uuid,
    project_id: ProjectId,
    stream: String,

    /// Monotonically increasing position in the project stream.
    sequence_number: u64,

    payload: E,
}

impl<E> EventEnvelope<E> {
    pub fn new(
        event_id: Uuid,
        project_id: ProjectId,
        stream: impl Into<String>,
        sequence_number: u64,
        payload: E,
    ) -> Self {
        Self {
            event_id,
            project_id,
            stream: stream.into(),
            sequence_number,
            payload,
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn project_id(&self) -> ProjectId {
        self.project_id
    }

    pub fn stream(&self) -> &str {
        &self.stream
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn into_payload(self) -> E {
        self.payload
    }
}

impl<E: Event> EventEnvelope<E> {
    /// Wrap an event, taking the project id from the event itself.
    pub fn wrap(stream: impl Into<String>, sequence_number: u64, payload: E) -> Self {
        Self::new(
            Uuid::now_v7(),
            payload.project_id(),
            stream,
            sequence_number,
            payload,
        )
    }

    /// Whether the envelope's project matches the payload's project.
    pub fn is_consistent(&self) -> bool {
        self.project_id == self.payload.project_id()
    }
}
