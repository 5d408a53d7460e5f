//! Event contracts shared by the order aggregate and the warehouse journal.

pub mod envelope;
pub mod event;

pub use envelope::EventEnvelope;
pub use event::Event;
