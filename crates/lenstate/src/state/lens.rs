#![forbid(unsafe_code)]

//! Key-addressed adapters between a parent node and a derived node.
//!
//! [`SubDownstream`] narrows the parent's change stream to the changes that
//! address one key. [`SubUpstream`] widens a child's write into a write of
//! the parent's whole value, merged in place so sibling keys survive.
//!
//! # Invariants
//!
//! 1. A change whose node trace does not mention the key is never
//!    forwarded to the child.
//! 2. The parent's cache is mutated before the widened change is sent, and
//!    the change carries that mutated composite.
//! 3. A child unsubscribing (`Close` without a reason) never terminates the
//!    parent. A `Close` with a reason does.

use std::borrow::Cow;
use std::cell::RefCell;
use std::rc::Rc;

use tracing::trace;

use crate::state::node::{StateNode, WeakNode};
use crate::stream::{Downstream, Message, Sink, SinkRef, Source, Talkback};
use crate::trace::{Change, Trace};
use crate::value::{Key, Traceable};

/// Narrow `change` to `key`.
///
/// Node traces forward exactly their sub-trace at `key`. Leaf or missing
/// traces forward the child value, untraced, unless `is_current` reports
/// the child already holds it.
pub(crate) fn narrow<T: Traceable>(
    key: &Key,
    change: Change<T>,
    is_current: impl FnOnce(Option<&T>) -> bool,
) -> Option<Change<T>> {
    let Change { value, trace } = change;
    let pick = |value: Option<&T>| value.and_then(|v| v.child(key)).map(Cow::into_owned);

    match trace {
        Some(Trace::Node { mut subs }) => {
            let sub = subs.remove(key)?;
            Some(Change::new(pick(value.as_ref()), Some(sub)))
        }
        _ => {
            let child = pick(value.as_ref());
            if is_current(child.as_ref()) {
                None
            } else {
                Some(Change::new(child, None))
            }
        }
    }
}

/// Change stream of a derived node: the parent's stream narrowed to one key.
pub struct SubDownstream<T: Traceable> {
    parent: Downstream<T>,
    key: Key,
    child: WeakNode<T>,
}

impl<T: Traceable> SubDownstream<T> {
    pub(crate) fn new(parent: Downstream<T>, key: Key, child: WeakNode<T>) -> Self {
        Self { parent, key, child }
    }
}

impl<T: Traceable> Source<Change<T>> for SubDownstream<T> {
    fn open(&self, sink: SinkRef<Change<T>>) {
        let held: Rc<RefCell<Option<Talkback>>> = Rc::default();

        let narrowing: SinkRef<Change<T>> = {
            let held = Rc::clone(&held);
            let sink = Rc::clone(&sink);
            let key = self.key.clone();
            let child = self.child.clone();
            Rc::new(move |message: Message<Change<T>>| match message {
                Message::Open(talkback) => *held.borrow_mut() = Some(talkback),
                Message::Emit(change) => {
                    if let Some(narrowed) = narrow(&key, change, |value| child.holds(value)) {
                        sink.send(Message::Emit(narrowed));
                    }
                }
                Message::Close(reason) => sink.send(Message::Close(reason)),
            })
        };
        self.parent.open(narrowing);

        sink.send(Message::Open(Talkback::new(move |_| {
            let talkback = held.borrow_mut().take();
            if let Some(talkback) = talkback {
                talkback.close(None);
            }
        })));
    }
}

/// Write path of a derived node: merges the child's value into the parent
/// at one key and forwards the parent's composite upstream.
pub struct SubUpstream<T: Traceable> {
    parent: StateNode<T>,
    key: Key,
}

impl<T: Traceable> SubUpstream<T> {
    pub(crate) fn new(parent: StateNode<T>, key: Key) -> Self {
        Self { parent, key }
    }
}

impl<T: Traceable> Sink<Change<T>> for SubUpstream<T> {
    fn send(&self, message: Message<Change<T>>) {
        match message {
            Message::Emit(Change { value, trace: inner }) => {
                if self.parent.is_terminated() {
                    return;
                }
                let inner = inner.unwrap_or_else(|| Trace::leaf(None, value.clone()));
                let composite = self.parent.interior().write_child(&self.key, value);
                trace!(message = "lens.write", key = %self.key);

                let widened = Change::new(composite, Some(Trace::wrap(self.key.clone(), inner)));
                self.parent.upstream().send(Message::Emit(widened));
            }
            Message::Close(Some(reason)) => {
                if !self.parent.is_terminated() {
                    self.parent.upstream().send(Message::Close(Some(reason)));
                }
            }
            // Unsubscribing children leave the parent alone.
            Message::Close(None) | Message::Open(_) => {}
        }
    }
}
