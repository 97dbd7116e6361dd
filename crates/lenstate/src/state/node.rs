#![forbid(unsafe_code)]

//! The state node.
//!
//! # Architecture
//!
//! A [`StateNode`] is a cheap handle over shared, single-threaded interior
//! (`Rc` plus `RefCell`s). The interior holds:
//!
//! - the cached value,
//! - the ordered list of sinks listening to the node's change stream,
//! - the single downstream connection (generation number and talkback),
//! - the downstream source and upstream sink it was built from.
//!
//! Writes leave through the upstream as [`Change`]s. Accepted changes come
//! back through the downstream, are refined with [`post_trace`], cached and
//! broadcast.
//!
//! # Invariants
//!
//! 1. The downstream is opened at most once per connection, when the first
//!    sink attaches, and closed when the last sink leaves.
//! 2. Sinks are notified in attachment order.
//! 3. No `RefCell` borrow is held while a sink, source or upstream runs, so
//!    every handler may re-enter the node.
//! 4. Termination is irreversible. A terminated node ignores writes and
//!    answers new subscribers with `Open` followed by `Close`.
//!
//! # Failure Modes
//!
//! - **Reading inside `with`**: calling a writing method on the same node
//!   from within the [`StateNode::with`] closure panics on the `RefCell`.
//! - **Dropped handles**: open subscriptions keep a node alive. Dropping
//!   every handle while subscribed leaks nothing once the subscriptions
//!   close.

use std::borrow::Cow;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::{debug, trace};

use crate::error::Reason;
use crate::state::lens::{SubDownstream, SubUpstream};
use crate::stream::{
    ConnectionGuard, Downstream, Message, RecipientId, Recipients, Sink, SinkRef, Source,
    Talkback, Upstream, broadcast,
};
use crate::trace::{Change, Trace, post_trace};
use crate::value::{Key, Traceable};

#[derive(Debug, Clone)]
enum Phase {
    Live,
    Terminated(Option<Reason>),
}

pub(crate) struct NodeInner<T: Traceable> {
    value: RefCell<Option<T>>,
    sinks: RefCell<Recipients<Change<T>>>,
    /// Generation of the open (or opening) downstream connection.
    connection: Cell<Option<u64>>,
    generations: Cell<u64>,
    talkback: RefCell<Option<Talkback>>,
    /// Talkback of an external producer feeding values into the node.
    feed: RefCell<Option<Talkback>>,
    phase: RefCell<Phase>,
    downstream: Downstream<T>,
    upstream: Upstream<T>,
}

impl<T: Traceable> NodeInner<T> {
    fn new(initial: Option<T>, downstream: Downstream<T>, upstream: Upstream<T>) -> Self {
        Self {
            value: RefCell::new(initial),
            sinks: RefCell::new(Recipients::new()),
            connection: Cell::new(None),
            generations: Cell::new(0),
            talkback: RefCell::new(None),
            feed: RefCell::new(None),
            phase: RefCell::new(Phase::Live),
            downstream,
            upstream,
        }
    }

    fn terminal_reason(&self) -> Option<Option<Reason>> {
        match &*self.phase.borrow() {
            Phase::Live => None,
            Phase::Terminated(reason) => Some(reason.clone()),
        }
    }

    fn is_terminated(&self) -> bool {
        matches!(*self.phase.borrow(), Phase::Terminated(_))
    }

    /// Mark the node terminated. Returns `false` if it already was.
    fn begin_termination(&self, reason: &Option<Reason>) -> bool {
        let mut phase = self.phase.borrow_mut();
        if matches!(*phase, Phase::Terminated(_)) {
            return false;
        }
        *phase = Phase::Terminated(reason.clone());
        true
    }

    /// Attach a sink to the change stream, connecting downstream if it is
    /// the first one.
    fn attach(self: &Rc<Self>, sink: SinkRef<Change<T>>) {
        if let Some(reason) = self.terminal_reason() {
            sink.send(Message::Open(Talkback::noop()));
            sink.send(Message::Close(reason));
            return;
        }

        let id = self.sinks.borrow_mut().add(Rc::clone(&sink));
        let node = Rc::downgrade(self);
        sink.send(Message::Open(Talkback::new(move |_| {
            if let Some(node) = node.upgrade() {
                node.detach(id);
            }
        })));

        let wanted = !self.sinks.borrow().is_empty() && !self.is_terminated();
        if wanted {
            self.connect();
        }
    }

    fn detach(&self, id: RecipientId) {
        let emptied = {
            let mut sinks = self.sinks.borrow_mut();
            sinks.remove(id) && sinks.is_empty()
        };
        if emptied {
            self.disconnect();
        }
    }

    fn connect(self: &Rc<Self>) {
        if self.connection.get().is_some() {
            return;
        }
        let generation = self.generations.get() + 1;
        self.generations.set(generation);
        self.connection.set(Some(generation));
        debug!(
            message = "state.connect",
            generation,
            subscribers = self.sinks.borrow().len()
        );

        let node = Rc::clone(self);
        let connector: SinkRef<Change<T>> =
            Rc::new(move |message: Message<Change<T>>| node.on_downstream(generation, message));
        self.downstream.open(connector);
    }

    fn disconnect(&self) {
        let Some(generation) = self.connection.take() else {
            return;
        };
        let talkback = self.talkback.borrow_mut().take();
        debug!(message = "state.disconnect", generation);
        if let Some(talkback) = talkback {
            talkback.close(None);
        }
    }

    fn on_downstream(&self, generation: u64, message: Message<Change<T>>) {
        if self.connection.get() != Some(generation) {
            if let Message::Open(stale) = message {
                stale.close(None);
            }
            return;
        }
        match message {
            Message::Open(talkback) => *self.talkback.borrow_mut() = Some(talkback),
            Message::Emit(change) => self.accept(change),
            Message::Close(reason) => {
                if self.begin_termination(&reason) {
                    self.talkback.borrow_mut().take();
                    self.connection.set(None);
                    self.teardown(&reason);
                    self.upstream.send(Message::Close(reason));
                }
            }
        }
    }

    /// Cache and broadcast one change echoed back from downstream.
    fn accept(&self, change: Change<T>) {
        if self.is_terminated() {
            return;
        }
        let change = post_trace(change);
        {
            let mut cached = self.value.borrow_mut();
            let unchanged = match (cached.as_ref(), change.value.as_ref()) {
                (Some(a), Some(b)) => a.identical(b),
                (None, None) => true,
                _ => false,
            };
            if !unchanged {
                *cached = change.value.clone();
            }
        }
        broadcast(&Message::Emit(change), &self.sinks);
    }

    /// Release the connection and close every sink.
    fn teardown(&self, reason: &Option<Reason>) {
        debug!(message = "state.terminate", reason = ?reason);
        broadcast(&Message::Close(reason.clone()), &self.sinks);
        self.sinks.borrow_mut().clear();
        let feed = self.feed.borrow_mut().take();
        if let Some(feed) = feed {
            feed.close(None);
        }
    }

    /// Overwrite the child at `key` in place, returning the new composite.
    pub(crate) fn write_child(&self, key: &Key, value: Option<T>) -> Option<T> {
        let mut cached = self.value.borrow_mut();
        if let Some(target) = cached.as_mut() {
            target.set_child(key, value);
        }
        cached.clone()
    }

    /// Whether `value` is the cached value.
    pub(crate) fn holds(&self, value: Option<&T>) -> bool {
        crate::value::same(self.value.borrow().as_ref(), value)
    }
}

/// Weak reference to a node's interior, used by its own lens downstream.
pub(crate) struct WeakNode<T: Traceable>(Weak<NodeInner<T>>);

impl<T: Traceable> Clone for WeakNode<T> {
    fn clone(&self) -> Self {
        Self(Weak::clone(&self.0))
    }
}

impl<T: Traceable> WeakNode<T> {
    /// Whether `value` is the node's current value. A dropped node holds
    /// nothing.
    pub(crate) fn holds(&self, value: Option<&T>) -> bool {
        self.0
            .upgrade()
            .is_some_and(|node| node.holds(value))
    }
}

/// The change stream endpoint of a node.
struct NodeDownstream<T: Traceable>(Rc<NodeInner<T>>);

impl<T: Traceable> Source<Change<T>> for NodeDownstream<T> {
    fn open(&self, sink: SinkRef<Change<T>>) {
        self.0.attach(sink);
    }
}

/// Reactive container for one value.
///
/// Cloning a `StateNode` creates a new handle to the **same** node.
pub struct StateNode<T: Traceable> {
    inner: Rc<NodeInner<T>>,
}

impl<T: Traceable> Clone for StateNode<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Traceable> fmt::Debug for StateNode<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateNode")
            .field("value", &*self.inner.value.borrow())
            .field("subscribers", &self.inner.sinks.borrow().len())
            .field("connected", &self.inner.connection.get().is_some())
            .field("phase", &*self.inner.phase.borrow())
            .finish()
    }
}

impl<T: Traceable> StateNode<T> {
    /// Build a node from explicit endpoints.
    ///
    /// `downstream` dictates accepted changes to the node, `upstream`
    /// receives the changes the node requests.
    pub fn new(initial: Option<T>, downstream: Downstream<T>, upstream: Upstream<T>) -> Self {
        Self {
            inner: Rc::new(NodeInner::new(initial, downstream, upstream)),
        }
    }

    /// Root node whose upstream loops straight back into its downstream.
    pub fn root(initial: Option<T>) -> Self {
        let guard = Rc::new(ConnectionGuard::<Change<T>>::new());
        Self::new(initial, guard.clone(), guard)
    }

    /// Current value.
    #[must_use]
    pub fn get(&self) -> Option<T> {
        self.inner.value.borrow().clone()
    }

    /// Access the current value by reference without cloning.
    ///
    /// # Panics
    ///
    /// Panics if the closure writes to this node.
    pub fn with<R>(&self, f: impl FnOnce(Option<&T>) -> R) -> R {
        f(self.inner.value.borrow().as_ref())
    }

    /// Request `value` as the node's new value.
    pub fn set(&self, value: T) {
        self.assign(Some(value));
    }

    /// Request `value` (possibly absent) as the node's new value.
    ///
    /// The cache reflects the write immediately. The change travels
    /// upstream as a leaf transition from the previous value, and the echo
    /// coming back downstream refines it before subscribers see it.
    pub fn assign(&self, value: Option<T>) {
        if self.inner.is_terminated() {
            trace!(message = "state.write_after_close");
            return;
        }
        let from = self.inner.value.replace(value.clone());
        let change = Change::new(value.clone(), Some(Trace::leaf(from, value)));
        self.inner.upstream.send(Message::Emit(change));
    }

    /// Terminate normally. Equivalent to `close(None)`.
    pub fn clear(&self) {
        self.close(None);
    }

    /// Terminate, sending `Close(reason)` upstream, to every subscriber and
    /// to the downstream connection.
    pub fn close(&self, reason: Option<Reason>) {
        let inner = &self.inner;
        if !inner.begin_termination(&reason) {
            return;
        }
        inner.upstream.send(Message::Close(reason.clone()));

        inner.connection.set(None);
        let talkback = inner.talkback.borrow_mut().take();
        inner.teardown(&reason);
        if let Some(talkback) = talkback {
            talkback.close(reason);
        }
    }

    /// Change stream of this node.
    #[must_use]
    pub fn downstream(&self) -> Downstream<T> {
        Rc::new(NodeDownstream(Rc::clone(&self.inner)))
    }

    /// Sink this node sends its requested changes to.
    #[must_use]
    pub fn upstream(&self) -> Upstream<T> {
        Rc::clone(&self.inner.upstream)
    }

    /// Derive the node for `key` of this node's value.
    ///
    /// The derived node only hears about changes that address `key`, and
    /// its writes are merged into this node's value before being forwarded
    /// upstream, so siblings are never clobbered.
    pub fn sub(&self, key: impl Into<Key>) -> Self {
        let key = key.into();
        let initial = self.with(|value| value.and_then(|v| v.child(&key)).map(Cow::into_owned));
        let upstream: Upstream<T> = Rc::new(SubUpstream::new(self.clone(), key.clone()));
        let parent = self.downstream();

        let inner = Rc::new_cyclic(|weak: &Weak<NodeInner<T>>| {
            let downstream: Downstream<T> =
                Rc::new(SubDownstream::new(parent, key, WeakNode(weak.clone())));
            NodeInner::new(initial, downstream, upstream)
        });
        Self { inner }
    }

    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.inner.is_terminated()
    }

    /// Reason the node terminated with, if it has terminated.
    #[must_use]
    pub fn terminal_reason(&self) -> Option<Reason> {
        self.inner.terminal_reason().flatten()
    }

    /// Whether the downstream connection is open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.connection.get().is_some()
    }

    /// Number of sinks attached to the change stream.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.sinks.borrow().len()
    }

    pub(crate) fn interior(&self) -> &NodeInner<T> {
        &self.inner
    }
}

/// The value stream: `Open`, the current value, then one value per
/// accepted change.
impl<T: Traceable> Source<Option<T>> for StateNode<T> {
    fn open(&self, sink: SinkRef<Option<T>>) {
        if let Some(reason) = self.inner.terminal_reason() {
            sink.send(Message::Open(Talkback::noop()));
            sink.send(Message::Close(reason));
            return;
        }

        let node = Rc::downgrade(&self.inner);
        let adapter: SinkRef<Change<T>> = Rc::new(move |message: Message<Change<T>>| match message {
            Message::Open(talkback) => {
                sink.send(Message::Open(talkback));
                let current = node.upgrade().and_then(|node| node.value.borrow().clone());
                sink.send(Message::Emit(current));
            }
            Message::Emit(change) => sink.send(Message::Emit(change.value)),
            Message::Close(reason) => sink.send(Message::Close(reason)),
        });
        self.inner.attach(adapter);
    }
}

/// Values pushed into a node are written with [`StateNode::set`]; a
/// `Close` terminates it.
impl<T: Traceable> Sink<T> for StateNode<T> {
    fn send(&self, message: Message<T>) {
        match message {
            Message::Open(feed) => {
                if self.is_terminated() {
                    feed.close(None);
                } else {
                    let previous = self.inner.feed.replace(Some(feed));
                    if let Some(previous) = previous {
                        previous.close(None);
                    }
                }
            }
            Message::Emit(value) => self.set(value),
            Message::Close(reason) => self.close(reason),
        }
    }
}

/// Build a node from explicit endpoints.
pub fn make_state<T: Traceable>(
    initial: Option<T>,
    downstream: Downstream<T>,
    upstream: Upstream<T>,
) -> StateNode<T> {
    StateNode::new(initial, downstream, upstream)
}

/// Root node holding `initial`, looped back through its own
/// [`ConnectionGuard`].
pub fn state<T: Traceable>(initial: T) -> StateNode<T> {
    StateNode::root(Some(initial))
}
