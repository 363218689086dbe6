//! Event fan-out.
//!
//! A [`Hub`] is a handle to a coordinator task that owns every subscriber
//! sink. Registration, removal, broadcast and shutdown are all messages to
//! that task, so they are applied one at a time in arrival order and the
//! subscriber set never needs a lock. A subscriber that stops while an event
//! is being broadcast either gets the event (broadcast processed first) or
//! never sees it (removal processed first).

use std::{
    collections::HashMap,
    pin::Pin,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    task::{Context, Poll},
};

use futures::Stream;
use tokio::sync::mpsc;
use tracing::debug;

use crate::message::Event;

pub type SubscriberId = u64;

#[derive(Debug)]
enum HubCommand {
    Register {
        id: SubscriberId,
        sink: mpsc::UnboundedSender<Event>,
    },
    Unregister(SubscriberId),
    Broadcast(Event),
    Close,
}

#[derive(Debug, Clone)]
pub struct Hub {
    commands: mpsc::UnboundedSender<HubCommand>,
    next_id: Arc<AtomicU64>,
}

impl Hub {
    /// Starts the coordinator on the current tokio runtime.
    pub fn spawn() -> Self {
        Self::with_id_counter(Arc::new(AtomicU64::new(1)))
    }

    /// Like [`spawn`](Self::spawn), but draws subscriber ids from `next_id`
    /// so ids stay unique across hubs sharing the counter.
    pub fn with_id_counter(next_id: Arc<AtomicU64>) -> Self {
        let (commands, inbox) = mpsc::unbounded_channel();
        tokio::spawn(run(inbox));
        Self { commands, next_id }
    }

    /// Registers a new subscriber.
    ///
    /// The stream sees every event broadcast after this call returns. If the
    /// hub is already closed the stream ends immediately.
    pub fn subscribe(&self) -> (EventStream, StopHandle) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sink, events) = mpsc::unbounded_channel();

        if self
            .commands
            .send(HubCommand::Register { id, sink })
            .is_err()
        {
            debug!(subscriber = id, "hub closed, subscription ends immediately");
        }

        (
            EventStream { id, events },
            StopHandle {
                id,
                commands: Some(self.commands.clone()),
            },
        )
    }

    /// Queues `event` for every current subscriber. Returns `false` once the
    /// hub has shut down.
    pub fn broadcast(&self, event: Event) -> bool {
        self.commands.send(HubCommand::Broadcast(event)).is_ok()
    }

    /// Stops the coordinator after it has handled everything queued so far.
    /// Every remaining subscriber stream ends.
    pub fn close(&self) {
        let _ = self.commands.send(HubCommand::Close);
    }

    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }
}

async fn run(mut inbox: mpsc::UnboundedReceiver<HubCommand>) {
    let mut subscribers: HashMap<SubscriberId, mpsc::UnboundedSender<Event>> = HashMap::new();

    while let Some(command) = inbox.recv().await {
        match command {
            HubCommand::Register { id, sink } => {
                debug!(subscriber = id, "subscriber registered");
                subscribers.insert(id, sink);
            }
            HubCommand::Unregister(id) => {
                if subscribers.remove(&id).is_some() {
                    debug!(subscriber = id, "subscriber stopped");
                }
            }
            HubCommand::Broadcast(event) => broadcast(&mut subscribers, &event),
            HubCommand::Close => break,
        }
    }
    drop(inbox);

    // Dropping the sinks ends every remaining stream.
    debug!(remaining = subscribers.len(), "hub stopped");
}

fn broadcast(subscribers: &mut HashMap<SubscriberId, mpsc::UnboundedSender<Event>>, event: &Event) {
    // Sinks are unbounded, so a subscriber that stops reading never holds up
    // the others.
    subscribers.retain(|id, sink| {
        let delivered = sink.send(event.clone()).is_ok();
        if !delivered {
            debug!(subscriber = *id, "subscriber stream dropped, removing");
        }
        delivered
    });
}

/// Events delivered to one subscriber, in stream order.
///
/// Ends when the subscriber is stopped or the hub closes.
#[derive(Debug)]
pub struct EventStream {
    id: SubscriberId,
    events: mpsc::UnboundedReceiver<Event>,
}

impl EventStream {
    /// A stream that has already ended.
    pub(crate) fn ended(id: SubscriberId) -> Self {
        let (_, events) = mpsc::unbounded_channel();
        Self { id, events }
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub async fn next_event(&mut self) -> Option<Event> {
        self.events.recv().await
    }
}

impl Stream for EventStream {
    type Item = Event;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Event>> {
        self.get_mut().events.poll_recv(cx)
    }
}

/// One-shot handle that ends a subscription early.
#[derive(Debug)]
pub struct StopHandle {
    id: SubscriberId,
    commands: Option<mpsc::UnboundedSender<HubCommand>>,
}

impl StopHandle {
    pub(crate) fn detached(id: SubscriberId) -> Self {
        Self { id, commands: None }
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn stop(self) {
        if let Some(commands) = self.commands {
            // A closed hub has already dropped the sink.
            let _ = commands.send(HubCommand::Unregister(self.id));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::StreamExt;
    use tokio::time::timeout;

    use super::*;

    const WAIT: Duration = Duration::from_secs(1);

    async fn next(stream: &mut EventStream) -> Option<Event> {
        timeout(WAIT, stream.next_event())
            .await
            .expect("timed out waiting for the hub")
    }

    #[tokio::test]
    async fn broadcast_reaches_every_subscriber() {
        let hub = Hub::spawn();
        let (mut first, _stop_first) = hub.subscribe();
        let (mut second, _stop_second) = hub.subscribe();
        assert_ne!(first.id(), second.id());

        assert!(hub.broadcast(Event::named("pause")));

        assert_eq!(next(&mut first).await, Some(Event::named("pause")));
        assert_eq!(next(&mut second).await, Some(Event::named("pause")));
    }

    #[tokio::test]
    async fn events_arrive_in_broadcast_order() {
        let hub = Hub::spawn();
        let (mut events, _stop) = hub.subscribe();

        for name in ["start-file", "file-loaded", "playback-restart"] {
            hub.broadcast(Event::named(name));
        }

        let received: Vec<Event> = timeout(WAIT, (&mut events).take(3).collect::<Vec<Event>>())
            .await
            .expect("timed out collecting events");
        let names: Vec<&str> = received.iter().map(|event| event.name.as_str()).collect();
        assert_eq!(names, ["start-file", "file-loaded", "playback-restart"]);
    }

    #[tokio::test]
    async fn late_subscribers_miss_earlier_events() {
        let hub = Hub::spawn();
        hub.broadcast(Event::named("idle"));
        let (mut events, _stop) = hub.subscribe();
        hub.broadcast(Event::named("pause"));

        assert_eq!(next(&mut events).await, Some(Event::named("pause")));
    }

    #[tokio::test]
    async fn stopped_subscriber_receives_nothing_further() {
        let hub = Hub::spawn();
        let (mut stopped, stop) = hub.subscribe();
        let (mut active, _stop_active) = hub.subscribe();

        hub.broadcast(Event::named("pause"));
        stop.stop();
        hub.broadcast(Event::named("unpause"));

        assert_eq!(next(&mut stopped).await, Some(Event::named("pause")));
        assert_eq!(next(&mut stopped).await, None);

        assert_eq!(next(&mut active).await, Some(Event::named("pause")));
        assert_eq!(next(&mut active).await, Some(Event::named("unpause")));
    }

    #[tokio::test]
    async fn dropped_streams_do_not_block_others() {
        let hub = Hub::spawn();
        let (dropped, _stop_dropped) = hub.subscribe();
        let (mut kept, _stop_kept) = hub.subscribe();
        drop(dropped);

        hub.broadcast(Event::named("seek"));
        hub.broadcast(Event::named("playback-restart"));

        assert_eq!(next(&mut kept).await, Some(Event::named("seek")));
        assert_eq!(next(&mut kept).await, Some(Event::named("playback-restart")));
    }

    #[tokio::test]
    async fn close_ends_every_stream() {
        let hub = Hub::spawn();
        let (mut first, _stop_first) = hub.subscribe();
        let (mut second, _stop_second) = hub.subscribe();

        hub.broadcast(Event::named("shutdown"));
        hub.close();

        assert_eq!(next(&mut first).await, Some(Event::named("shutdown")));
        assert_eq!(next(&mut first).await, None);
        assert_eq!(next(&mut second).await, Some(Event::named("shutdown")));
        assert_eq!(next(&mut second).await, None);
    }

    #[tokio::test]
    async fn subscribing_to_a_closed_hub_yields_an_ended_stream() {
        let hub = Hub::spawn();
        let (mut witness, _stop) = hub.subscribe();
        hub.close();
        assert_eq!(next(&mut witness).await, None);
        assert!(hub.is_closed());

        let (mut events, stop) = hub.subscribe();
        assert_eq!(next(&mut events).await, None);
        assert!(!hub.broadcast(Event::named("pause")));
        stop.stop();
    }

    #[tokio::test]
    async fn hubs_sharing_a_counter_never_reuse_ids() {
        let counter = Arc::new(AtomicU64::new(1));
        let first = Hub::with_id_counter(Arc::clone(&counter));
        let (a, _stop_a) = first.subscribe();
        first.close();

        let second = Hub::with_id_counter(Arc::clone(&counter));
        let (b, _stop_b) = second.subscribe();

        assert_eq!(a.id(), 1);
        assert_eq!(b.id(), 2);
        assert_eq!(counter.load(Ordering::Relaxed), 3);
    }
}
