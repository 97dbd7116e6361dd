#![forbid(unsafe_code)]

//! Ordered recipient lists and re-entrancy tolerant delivery.
//!
//! # Invariants
//!
//! 1. Recipients are delivered to in the order they were added.
//! 2. A recipient removed during a broadcast, before its turn, is skipped.
//! 3. A recipient added during a broadcast is not part of that broadcast.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use super::{Message, SinkRef};

/// Stable identity of a recipient within one [`Recipients`] list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecipientId(u64);

/// Insertion-ordered list of sinks.
pub struct Recipients<T> {
    next_id: u64,
    entries: Vec<(RecipientId, SinkRef<T>)>,
}

impl<T> Default for Recipients<T> {
    fn default() -> Self {
        Self {
            next_id: 0,
            entries: Vec::new(),
        }
    }
}

impl<T> fmt::Debug for Recipients<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Recipients")
            .field("len", &self.entries.len())
            .finish()
    }
}

impl<T> Recipients<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a sink, returning the id it is tracked under.
    pub fn add(&mut self, sink: SinkRef<T>) -> RecipientId {
        let id = RecipientId(self.next_id);
        self.next_id += 1;
        self.entries.push((id, sink));
        id
    }

    /// Remove a sink. Returns `false` if it was already gone.
    pub fn remove(&mut self, id: RecipientId) -> bool {
        match self.entries.iter().position(|(entry, _)| *entry == id) {
            Some(index) => {
                self.entries.remove(index);
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn contains(&self, id: RecipientId) -> bool {
        self.entries.iter().any(|(entry, _)| *entry == id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Shallow copy of the current list.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(RecipientId, SinkRef<T>)> {
        self.entries
            .iter()
            .map(|(id, sink)| (*id, Rc::clone(sink)))
            .collect()
    }
}

/// Deliver `message` to every recipient present when the call starts and
/// still present when its turn comes.
///
/// No borrow of `recipients` is held while a sink runs, so sinks may add
/// or remove recipients (themselves included) freely.
pub fn broadcast<T: Clone>(message: &Message<T>, recipients: &RefCell<Recipients<T>>) {
    let snapshot = recipients.borrow().snapshot();
    for (id, sink) in snapshot {
        if recipients.borrow().contains(id) {
            sink.send(message.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::sink;
    use std::cell::Cell;

    fn counter(hits: &Rc<Cell<u32>>) -> SinkRef<u32> {
        let hits = Rc::clone(hits);
        sink(move |m: Message<u32>| {
            if let Message::Emit(n) = m {
                hits.set(hits.get() + n);
            }
        })
    }

    #[test]
    fn delivers_in_insertion_order() {
        let order = Rc::new(RefCell::new(Vec::new()));
        let list = RefCell::new(Recipients::new());
        for tag in ["a", "b", "c"] {
            let order = Rc::clone(&order);
            list.borrow_mut().add(sink(move |_: Message<()>| order.borrow_mut().push(tag)));
        }
        broadcast(&Message::Emit(()), &list);
        assert_eq!(*order.borrow(), vec!["a", "b", "c"]);
    }

    #[test]
    fn skips_recipients_removed_mid_broadcast() {
        let list = Rc::new(RefCell::new(Recipients::new()));
        let late_hits = Rc::new(Cell::new(0));
        let victim = Rc::new(Cell::new(None));

        let remover = {
            let list = Rc::clone(&list);
            let victim = Rc::clone(&victim);
            sink(move |_: Message<u32>| {
                if let Some(id) = victim.get() {
                    list.borrow_mut().remove(id);
                }
            })
        };
        list.borrow_mut().add(remover);
        victim.set(Some(list.borrow_mut().add(counter(&late_hits))));

        broadcast(&Message::Emit(1), &list);
        assert_eq!(late_hits.get(), 0);
        assert_eq!(list.borrow().len(), 1);
    }

    #[test]
    fn recipients_added_mid_broadcast_wait_for_the_next_one() {
        let list = Rc::new(RefCell::new(Recipients::new()));
        let late_hits = Rc::new(Cell::new(0));

        let adder = {
            let list = Rc::clone(&list);
            let late_hits = Rc::clone(&late_hits);
            let added = Cell::new(false);
            sink(move |_: Message<u32>| {
                if !added.replace(true) {
                    list.borrow_mut().add(counter(&late_hits));
                }
            })
        };
        list.borrow_mut().add(adder);

        broadcast(&Message::Emit(1), &list);
        assert_eq!(late_hits.get(), 0);
        broadcast(&Message::Emit(1), &list);
        assert_eq!(late_hits.get(), 1);
    }

    #[test]
    fn remove_is_idempotent() {
        let mut list = Recipients::new();
        let id = list.add(sink(|_: Message<()>| {}));
        assert!(list.remove(id));
        assert!(!list.remove(id));
        assert!(list.is_empty());
    }
}
