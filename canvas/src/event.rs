//! Change notifications emitted by the engine, coalesced per batch.
//!
//! Consumers poll [`EventQueue::take`] once per batch (or per frame) instead
//! of reacting to every command; a batch of a thousand dabs on one layer
//! yields a single `LayerModified` for it.

#[cfg(test)]
#[path = "event_test.rs"]
mod event_test;

use commands::{LayerId, Point, Rect, UserId};

use crate::doc::Size;

/// A state change worth telling the embedding application about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Canvas dimensions changed; carries the previous size and the offset
    /// at which old content now sits.
    Resized { old: Size, offset: Point },
    /// Something on the canvas changed this batch.
    CanvasModified,
    /// A specific layer's content or attributes changed.
    LayerModified(LayerId),
    /// The selection region changed.
    SelectionChanged(Option<Rect>),
    /// The background color changed.
    BackgroundChanged,
    /// Annotations were created, edited or removed.
    AnnotationsChanged,
    /// The session title changed.
    TitleChanged(String),
    /// The pinned chat message changed (empty string clears it).
    PinnedMessageChanged(String),
    /// A chat message arrived.
    ChatReceived { from: UserId, recipient: Option<UserId>, message: String },
    /// A user joined the session.
    UserJoined { id: UserId, name: String },
    /// A user left the session.
    UserLeft { id: UserId, name: String },
    /// A command was dropped by access control or local validation; `reason`
    /// is the payload's stable name.
    CommandRejected { user: UserId, reason: &'static str },
    /// Recording started (`true`) or stopped (`false`).
    RecorderStateChanged(bool),
}

/// Collects events during a batch and publishes a deduplicated, ordered set
/// when the batch ends.
///
/// Ordering contract for canvas events within a batch: `Resized` first (a
/// consumer must reallocate before repainting), then per-layer and other
/// canvas changes, then a single `CanvasModified`. Non-canvas events keep
/// their arrival order after that.
#[derive(Debug, Default)]
pub struct EventQueue {
    batch: Vec<Event>,
    ready: Vec<Event>,
}

impl EventQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an event for the current batch.
    pub fn push(&mut self, event: Event) {
        self.batch.push(event);
    }

    /// Whether any event has been recorded but not yet taken.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.batch.is_empty() && self.ready.is_empty()
    }

    /// Close the current batch: coalesce duplicates and move the result to
    /// the ready list.
    pub fn end_batch(&mut self) {
        if self.batch.is_empty() {
            return;
        }
        let batch = std::mem::take(&mut self.batch);

        let mut resized = None;
        let mut layer_order: Vec<LayerId> = Vec::new();
        let mut selection: Option<Option<Rect>> = None;
        let mut background = false;
        let mut annotations = false;
        let mut canvas_modified = false;
        let mut passthrough = Vec::new();

        for event in batch {
            match event {
                Event::Resized { .. } => {
                    if resized.is_none() {
                        resized = Some(event);
                    }
                    canvas_modified = true;
                }
                Event::CanvasModified => canvas_modified = true,
                Event::LayerModified(id) => {
                    if !layer_order.contains(&id) {
                        layer_order.push(id);
                    }
                    canvas_modified = true;
                }
                Event::SelectionChanged(rect) => {
                    selection = Some(rect);
                    canvas_modified = true;
                }
                Event::BackgroundChanged => {
                    background = true;
                    canvas_modified = true;
                }
                Event::AnnotationsChanged => {
                    annotations = true;
                    canvas_modified = true;
                }
                other => passthrough.push(other),
            }
        }

        if let Some(event) = resized {
            self.ready.push(event);
        }
        for id in layer_order {
            self.ready.push(Event::LayerModified(id));
        }
        if background {
            self.ready.push(Event::BackgroundChanged);
        }
        if annotations {
            self.ready.push(Event::AnnotationsChanged);
        }
        if let Some(rect) = selection {
            self.ready.push(Event::SelectionChanged(rect));
        }
        if canvas_modified {
            self.ready.push(Event::CanvasModified);
        }
        self.ready.extend(passthrough);
    }

    /// Drain every published event, oldest batch first.
    pub fn take(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.ready)
    }

    /// Whether anything is waiting in the ready list.
    #[must_use]
    pub fn has_ready(&self) -> bool {
        !self.ready.is_empty()
    }
}
