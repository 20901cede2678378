//! Event channel implementation using crossbeam-channel.

use crossbeam_channel::{unbounded, Receiver, Sender};

use super::{Event, PipelineEvent, StageEvent};

/// Publishes the events of a run.
///
/// Cheap to clone; the executor and every stage thread hold their own copy.
/// A sender made by [`null_sender`] has no channel and drops everything.
#[derive(Clone)]
pub struct EventSender {
    inner: Option<Sender<Event>>,
}

impl EventSender {
    /// Publish an event. A listener that has gone away is not an error.
    pub fn send(&self, event: Event) {
        if let Some(inner) = &self.inner {
            let _ = inner.send(event);
        }
    }

    pub fn stage(&self, event: StageEvent) {
        self.send(Event::Stage(event));
    }

    pub fn pipeline(&self, event: PipelineEvent) {
        self.send(Event::Pipeline(event));
    }
}

/// Listening end of an [`EventChannel`].
pub struct EventReceiver {
    inner: Receiver<Event>,
}

impl EventReceiver {
    /// Next event if one is already queued
    pub fn try_recv(&self) -> Option<Event> {
        self.inner.try_recv().ok()
    }

    /// Block for events until every sender is dropped
    pub fn iter(&self) -> impl Iterator<Item = Event> + '_ {
        self.inner.iter()
    }
}

/// Factory for sender/receiver pairs.
pub struct EventChannel;

impl EventChannel {
    /// Create an unbounded channel, so a slow listener never stalls a stage.
    pub fn new() -> (EventSender, EventReceiver) {
        let (sender, receiver) = unbounded();
        (
            EventSender {
                inner: Some(sender),
            },
            EventReceiver { inner: receiver },
        )
    }
}

/// A sender nobody listens to.
pub fn null_sender() -> EventSender {
    EventSender { inner: None }
}
