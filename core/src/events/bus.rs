use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastDirection {
    /// Delivered on the publishing bus only.
    None,
    /// Delivered on the publishing bus, then re-published on each ancestor.
    ToParent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Topic {
    pub name: &'static str,
    pub direction: BroadcastDirection,
}

/// Synchronous callback registered on a topic.
pub trait Listener<E>: Send + Sync {
    fn on_event(&self, event: &E);
}

impl<E, F> Listener<E> for F
where
    F: Fn(&E) + Send + Sync,
{
    fn on_event(&self, event: &E) {
        self(event)
    }
}

struct TopicChannel<E> {
    sender: broadcast::Sender<E>,
    listeners: Vec<Arc<dyn Listener<E>>>,
}

struct BusNode<E> {
    parent: Option<MessageBus<E>>,
    capacity: usize,
    topics: RwLock<HashMap<&'static str, TopicChannel<E>>>,
}

/// A node in a tree of buses. Each node links to its parent explicitly;
/// `ToParent` topics are re-published node by node up to the root.
pub struct MessageBus<E> {
    inner: Arc<BusNode<E>>,
}

impl<E> Clone for MessageBus<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E> std::fmt::Debug for MessageBus<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageBus")
            .field("has_parent", &self.inner.parent.is_some())
            .field("capacity", &self.inner.capacity)
            .finish()
    }
}

impl<E> MessageBus<E>
where
    E: Clone + Send + 'static,
{
    /// Creates a root bus; `capacity` bounds each topic's broadcast buffer.
    pub fn new(capacity: usize) -> Self {
        Self::with_parent(None, capacity)
    }

    fn with_parent(parent: Option<MessageBus<E>>, capacity: usize) -> Self {
        Self {
            inner: Arc::new(BusNode {
                parent,
                capacity: capacity.max(1),
                topics: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Creates a bus whose `ToParent` traffic is forwarded to `self`.
    pub fn child(&self) -> Self {
        Self::with_parent(Some(self.clone()), self.inner.capacity)
    }

    pub fn parent(&self) -> Option<&MessageBus<E>> {
        self.inner.parent.as_ref()
    }

    pub fn subscribe(&self, topic: &Topic) -> broadcast::Receiver<E> {
        let mut topics = self.inner.topics.write();
        topics
            .entry(topic.name)
            .or_insert_with(|| self.new_channel())
            .sender
            .subscribe()
    }

    pub fn connect(&self, topic: &Topic, listener: Arc<dyn Listener<E>>) {
        let mut topics = self.inner.topics.write();
        topics
            .entry(topic.name)
            .or_insert_with(|| self.new_channel())
            .listeners
            .push(listener);
    }

    /// Publishes `event` and returns how many subscribers and listeners
    /// received it across every node it reached.
    pub fn publish(&self, topic: &Topic, event: E) -> usize {
        let mut delivered = 0;
        let mut node = Some(self.clone());
        while let Some(bus) = node {
            delivered += bus.deliver_local(topic, &event);
            node = match topic.direction {
                BroadcastDirection::ToParent => bus.inner.parent.clone(),
                BroadcastDirection::None => None,
            };
        }
        delivered
    }

    fn deliver_local(&self, topic: &Topic, event: &E) -> usize {
        let (received, listeners) = {
            let topics = self.inner.topics.read();
            let Some(channel) = topics.get(topic.name) else {
                return 0;
            };
            // send() only fails when there are no receivers.
            let received = channel.sender.send(event.clone()).unwrap_or(0);
            (received, channel.listeners.clone())
        };

        // Listeners run without the lock so they may subscribe or publish.
        for listener in &listeners {
            listener.on_event(event);
        }
        received + listeners.len()
    }

    fn new_channel(&self) -> TopicChannel<E> {
        let (sender, _) = broadcast::channel(self.inner.capacity);
        TopicChannel {
            sender,
            listeners: Vec::new(),
        }
    }
}
