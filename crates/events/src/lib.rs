//! Project change events.
//!
//! Structural WBS edits and leaf-level record ingestion are described as
//! immutable, versioned events; the recompute layer consumes them wrapped in
//! a project-scoped [`EventEnvelope`].

pub mod envelope;
pub mod event;

pub use envelope::EventEnvelope;
pub use event::Event;
