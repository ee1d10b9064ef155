//! Change notifications for note mutations
//!
//! A broadcast channel injected into the store as an optional collaborator.
//! Delivery is best-effort and at-most-once; subscribers that lag simply
//! miss events.

use tokio::sync::broadcast;

use crate::models::Note;

const CHANNEL_CAPACITY: usize = 64;

/// A note mutation that completed successfully
#[derive(Debug, Clone)]
pub enum NoteEvent {
    Created(Note),
    Updated(Note),
    Deleted(String),
}

/// Publisher handle for note change events
#[derive(Clone)]
pub struct NoteEvents {
    tx: broadcast::Sender<NoteEvent>,
}

impl NoteEvents {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Publish an event; a send with no live subscribers is not an error
    pub fn publish(&self, event: NoteEvent) {
        let _ = self.tx.send(event);
    }

    /// Subscribe to future events
    pub fn subscribe(&self) -> broadcast::Receiver<NoteEvent> {
        self.tx.subscribe()
    }
}

impl Default for NoteEvents {
    fn default() -> Self {
        Self::new()
    }
}
